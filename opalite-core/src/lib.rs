//! Core of the opalite Ruby-to-JavaScript toolchain.
//!
//! The pipeline is roughly:
//!
//!   source .rb
//!     -> lexer      (tokens)
//!     -> parser     (AST, locals resolved)
//!     -> codegen_js (JavaScript text + dependency declarations)
//!     -> builder    (require graph walk, stubs / prerequired / preload)
//!     -> bundle     (one artifact)
//!
//! Higher-level tools (the CLI, embedders) should depend on this crate
//! rather than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod error;
pub mod span;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod ast;
pub mod lexer;
pub mod parser;

// ---------------------------------------------------------------------
// Unit compilation
// ---------------------------------------------------------------------

pub mod builtins;
pub mod codegen_js;
pub mod compiler;
pub mod requires;

// ---------------------------------------------------------------------
// Resolution, bundling and the bundled library
// ---------------------------------------------------------------------

pub mod builder;
pub mod bundle;
pub mod resolver;
pub mod source;
pub mod stdlib;
pub mod unit;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use builder::{BuildOptions, Builder};
pub use bundle::Artifact;
pub use compiler::{CompiledUnit, CompilerOptions, compile};
pub use error::{CoreError, ParseError};
pub use requires::{DependencyEdge, EdgeKind};
pub use resolver::{Processor, SearchPaths};
pub use source::{FileSystem, MemoryReader, SourceReader};
