//! One source unit and its memoised parse and compile results.

use std::cell::OnceCell;
use std::path::PathBuf;

use crate::ast::Program;
use crate::compiler::{CompiledUnit, CompilerOptions, compile_program};
use crate::error::CoreError;
use crate::parser::parse;
use crate::resolver::{Processor, ResolvedUnit};

#[derive(Debug)]
pub struct SourceUnit {
    pub logical: String,
    pub path: PathBuf,
    pub source: String,
    pub processor: Processor,
    ast: OnceCell<Program>,
    compiled: OnceCell<CompiledUnit>,
}

impl SourceUnit {
    pub fn new(resolved: ResolvedUnit, source: String) -> Self {
        SourceUnit {
            logical: resolved.logical,
            path: resolved.path,
            source,
            processor: resolved.processor,
            ast: OnceCell::new(),
            compiled: OnceCell::new(),
        }
    }

    /// Empty Ruby unit standing in for a stubbed name.
    pub fn stub(logical: impl Into<String>) -> Self {
        let logical = logical.into();
        SourceUnit {
            path: PathBuf::from(&logical),
            logical,
            source: String::new(),
            processor: Processor::Ruby,
            ast: OnceCell::new(),
            compiled: OnceCell::new(),
        }
    }

    pub fn ast(&self) -> Result<&Program, CoreError> {
        if let Some(ast) = self.ast.get() {
            return Ok(ast);
        }
        let program = parse(&self.logical, &self.source)?;
        Ok(self.ast.get_or_init(|| program))
    }

    /// Compile as a requirable module registered under the logical name.
    /// Computed once; later calls return the cached result.
    pub fn compiled(&self, banner: bool) -> Result<&CompiledUnit, CoreError> {
        if let Some(compiled) = self.compiled.get() {
            return Ok(compiled);
        }
        let options = CompilerOptions {
            file: self.logical.clone(),
            requirable: true,
            banner,
        };
        let compiled = compile_program(self.ast()?, &options)?;
        Ok(self.compiled.get_or_init(|| compiled))
    }

    /// Compile as the anonymous entry of a bundle. Not cached.
    pub fn compile_entry(&self, banner: bool) -> Result<CompiledUnit, CoreError> {
        let options = CompilerOptions {
            file: self.logical.clone(),
            requirable: false,
            banner,
        };
        compile_program(self.ast()?, &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(source: &str) -> SourceUnit {
        SourceUnit::new(
            ResolvedUnit {
                logical: "lib/thing".into(),
                path: PathBuf::from("lib/thing.rb"),
                processor: Processor::Ruby,
            },
            source.to_string(),
        )
    }

    #[test]
    fn compiles_once() {
        let unit = unit("require 'other'");
        let first = unit.compiled(false).expect("compile") as *const CompiledUnit;
        let second = unit.compiled(false).expect("compile") as *const CompiledUnit;
        assert_eq!(first, second);
        assert!(
            unit.compiled(false)
                .expect("compile")
                .javascript
                .starts_with("Opal.modules[\"lib/thing\"] = function(Opal) {")
        );
    }

    #[test]
    fn entry_compilation_is_anonymous() {
        let entry = unit("1").compile_entry(false).expect("compile");
        assert!(entry.javascript.starts_with("(function(Opal) {"));
    }

    #[test]
    fn stubs_compile_to_empty_modules() {
        let stub = SourceUnit::stub("pippo");
        let compiled = stub.compiled(false).expect("compile");
        assert!(compiled.javascript.starts_with("Opal.modules[\"pippo\"]"));
        assert!(compiled.declarations.is_empty());
    }

    #[test]
    fn parse_errors_name_the_unit() {
        let err = unit("def").ast().unwrap_err();
        assert!(matches!(err, CoreError::Parse(ref parse) if parse.file == "lib/thing"));
    }
}
