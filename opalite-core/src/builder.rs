//! Dependency traversal and bundling policy.
//!
//! A build walks the require graph depth first from the entry, compiling
//! every reachable unit at most once and emitting dependencies before the
//! units that need them. Preloaded units are walked first, then the entry;
//! the entry itself is always the last record of the artifact.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use tracing::{debug, info, instrument};

use crate::bundle::{Artifact, BundleUnit, UnitKind, assemble};
use crate::error::CoreError;
use crate::requires::{DependencyEdge, EdgeKind};
use crate::resolver::{Processor, ResolvedUnit, Resolver, SearchPaths, normalize_logical};
use crate::source::{FileSystem, SourceReader};
use crate::unit::SourceUnit;

const ENTRY_REQUESTER: &str = "(entry)";
const PRELOAD_REQUESTER: &str = "(preload)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Emitted as empty modules whatever their real source.
    pub stubs: BTreeSet<String>,
    /// Already loaded by the host: satisfied, never emitted.
    pub prerequired: BTreeSet<String>,
    /// Emitted and run before the entry's dependencies, in this order.
    pub preload: Vec<String>,
    /// Processor for files with neither `.rb` nor `.js`, and for `build_str`.
    pub default_processor: Processor,
    /// Prefix the bundle with an `/* opalite bundle */` comment. Off by
    /// default, so a bundle starts with its first unit.
    pub banner: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            stubs: BTreeSet::new(),
            prerequired: BTreeSet::new(),
            preload: Vec::new(),
            default_processor: Processor::Ruby,
            banner: false,
        }
    }
}

pub struct Builder<R: SourceReader = FileSystem> {
    options: BuildOptions,
    paths: SearchPaths,
    reader: R,
}

impl Builder<FileSystem> {
    pub fn new(options: BuildOptions) -> Self {
        Builder::with_reader(options, FileSystem)
    }
}

impl<R: SourceReader> Builder<R> {
    pub fn with_reader(options: BuildOptions, reader: R) -> Self {
        Builder {
            options,
            paths: SearchPaths::new(),
            reader,
        }
    }

    pub fn append_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.append(path);
    }

    pub fn prepend_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.prepend(path);
    }

    pub fn reset_paths(&mut self) {
        self.paths.reset();
    }

    pub fn paths(&self) -> &SearchPaths {
        &self.paths
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Bundle the closure of the unit named `entry`.
    #[instrument(skip(self))]
    pub fn build(&self, entry: &str) -> Result<Artifact, CoreError> {
        info!(paths = self.paths.len(), "building bundle");
        let mut session = Session::new(self);
        session.preload()?;
        let resolved = session.resolver.resolve(entry, ENTRY_REQUESTER)?;
        if session.visited.contains_key(&resolved.logical) {
            debug!(logical = %resolved.logical, "entry already included by preload");
        } else {
            let source = self.reader.read_to_string(&resolved.path)?;
            session.visit(SourceUnit::new(resolved, source), Role::Entry)?;
        }
        Ok(session.finish())
    }

    /// Bundle an in-memory entry named `filename`.
    #[instrument(skip(self, source))]
    pub fn build_str(&self, source: &str, filename: &str) -> Result<Artifact, CoreError> {
        info!(paths = self.paths.len(), "building bundle from source");
        let mut session = Session::new(self);
        session.preload()?;
        let resolved = ResolvedUnit {
            logical: normalize_logical(filename),
            path: PathBuf::from(filename),
            processor: self.options.default_processor,
        };
        session.visit(SourceUnit::new(resolved, source.to_string()), Role::Entry)?;
        Ok(session.finish())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Module { preload: bool },
    Entry,
}

/// A dependency not yet entered: a name to resolve, or a tree child that
/// already has its file.
enum Pending {
    Name(String),
    Unit(ResolvedUnit),
}

/// State of one build.
struct Session<'a, R: SourceReader> {
    options: &'a BuildOptions,
    reader: &'a R,
    resolver: Resolver<'a, R>,
    stubs: BTreeSet<String>,
    prerequired: BTreeSet<String>,
    visited: HashMap<String, Visit>,
    units: Vec<BundleUnit>,
    edges: Vec<DependencyEdge>,
}

impl<'a, R: SourceReader> Session<'a, R> {
    fn new(builder: &'a Builder<R>) -> Self {
        let options = &builder.options;
        Session {
            options,
            reader: &builder.reader,
            resolver: Resolver::new(&builder.reader, &builder.paths, options.default_processor),
            stubs: options.stubs.iter().map(|name| normalize_logical(name)).collect(),
            prerequired: options
                .prerequired
                .iter()
                .map(|name| normalize_logical(name))
                .collect(),
            visited: HashMap::new(),
            units: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn preload(&mut self) -> Result<(), CoreError> {
        let mut seen = BTreeSet::new();
        for name in &self.options.preload {
            if !seen.insert(normalize_logical(name)) {
                continue;
            }
            self.enter(
                Pending::Name(name.clone()),
                PRELOAD_REQUESTER,
                EdgeKind::Direct,
                true,
            )?;
        }
        Ok(())
    }

    fn enter(
        &mut self,
        pending: Pending,
        from: &str,
        kind: EdgeKind,
        preload: bool,
    ) -> Result<(), CoreError> {
        let logical = match &pending {
            Pending::Name(name) => normalize_logical(name),
            Pending::Unit(unit) => unit.logical.clone(),
        };
        let edge = DependencyEdge {
            from: from.to_string(),
            to: logical.clone(),
            kind,
        };
        debug!(%edge, "dependency");
        self.edges.push(edge);

        if self.visited.contains_key(&logical) {
            return Ok(());
        }
        if self.prerequired.contains(&logical) {
            debug!(%logical, "prerequired, not emitted");
            self.visited.insert(logical, Visit::Done);
            return Ok(());
        }
        if self.stubs.contains(&logical) {
            debug!(%logical, "stubbed");
            let stub = SourceUnit::stub(logical.clone());
            let compiled = stub.compiled(false)?;
            self.units.push(BundleUnit {
                logical: logical.clone(),
                kind: UnitKind::Module,
                javascript: compiled.javascript.clone(),
                preload,
            });
            self.visited.insert(logical, Visit::Done);
            return Ok(());
        }

        let resolved = match pending {
            Pending::Name(name) => self.resolver.resolve(&name, from)?,
            Pending::Unit(unit) => unit,
        };
        let source = self.reader.read_to_string(&resolved.path)?;
        self.visit(SourceUnit::new(resolved, source), Role::Module { preload })
    }

    fn visit(&mut self, unit: SourceUnit, role: Role) -> Result<(), CoreError> {
        self.visited.insert(unit.logical.clone(), Visit::InProgress);

        let (kind, preload) = match role {
            Role::Module { preload } => (UnitKind::Module, preload),
            Role::Entry => (UnitKind::Entry, false),
        };

        let javascript = match unit.processor {
            Processor::Javascript => {
                debug!(logical = %unit.logical, path = %unit.path.display(), "native unit");
                let kind = if kind == UnitKind::Entry {
                    UnitKind::Entry
                } else {
                    UnitKind::Native
                };
                self.units.push(BundleUnit {
                    logical: unit.logical.clone(),
                    kind,
                    javascript: unit.source,
                    preload,
                });
                self.visited.insert(unit.logical, Visit::Done);
                return Ok(());
            }
            Processor::Ruby => {
                debug!(logical = %unit.logical, path = %unit.path.display(), "compiling unit");
                let compiled = match role {
                    Role::Entry => unit.compile_entry(false)?,
                    Role::Module { .. } => unit.compiled(false)?.clone(),
                };
                for decl in &compiled.declarations {
                    match decl.kind {
                        EdgeKind::Direct | EdgeKind::Autoload => {
                            self.enter(
                                Pending::Name(decl.name.clone()),
                                &unit.logical,
                                decl.kind,
                                false,
                            )?;
                        }
                        EdgeKind::Tree => {
                            for child in self.resolver.expand_tree(&decl.name, &unit.logical)? {
                                self.enter(Pending::Unit(child), &unit.logical, EdgeKind::Tree, false)?;
                            }
                        }
                    }
                }
                compiled.javascript
            }
        };

        self.units.push(BundleUnit {
            logical: unit.logical.clone(),
            kind,
            javascript,
            preload,
        });
        self.visited.insert(unit.logical, Visit::Done);
        Ok(())
    }

    fn finish(self) -> Artifact {
        let done = self
            .visited
            .values()
            .filter(|state| **state == Visit::Done)
            .count();
        info!(units = self.units.len(), resolved = done, "bundle assembled");
        assemble(self.units, self.edges, self.options.banner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryReader;

    fn builder(files: &[(&str, &str)], options: BuildOptions) -> Builder<MemoryReader> {
        let mut reader = MemoryReader::new();
        for (path, source) in files {
            reader.insert(*path, *source);
        }
        let mut builder = Builder::with_reader(options, reader);
        builder.append_path("app");
        builder.append_path("lib");
        builder
    }

    fn names(artifact: &Artifact) -> Vec<&str> {
        artifact.units().iter().map(String::as_str).collect()
    }

    #[test]
    fn emits_dependencies_before_dependents() {
        let builder = builder(
            &[
                ("app/main.rb", "require 'a'\nrequire 'b'"),
                ("lib/a.rb", "require 'c'"),
                ("lib/b.rb", "require 'c'"),
                ("lib/c.rb", "C = 1"),
            ],
            BuildOptions::default(),
        );
        let artifact = builder.build("main").expect("build");
        assert_eq!(names(&artifact), vec!["c", "a", "b", "main"]);
        assert_eq!(artifact.text().matches("Opal.modules[\"c\"]").count(), 1);
        assert!(artifact.text().ends_with("})(Opal);\n"));
    }

    #[test]
    fn terminates_on_cycles() {
        let builder = builder(
            &[
                ("app/main.rb", "require 'a'"),
                ("lib/a.rb", "require 'b'"),
                ("lib/b.rb", "require 'a'"),
            ],
            BuildOptions::default(),
        );
        let artifact = builder.build("main").expect("build");
        assert_eq!(names(&artifact), vec!["b", "a", "main"]);
        assert_eq!(artifact.edges().len(), 3);
    }

    #[test]
    fn stubs_replace_real_source() {
        let options = BuildOptions {
            stubs: ["pippo".to_string(), "ghost".to_string()].into(),
            ..BuildOptions::default()
        };
        let builder = builder(
            &[
                ("app/main.rb", "require 'pippo'\nrequire './ghost.rb'"),
                ("lib/pippo.rb", "require 'never'\nraise 'real source'"),
            ],
            options,
        );
        let artifact = builder.build("main").expect("build");
        assert_eq!(names(&artifact), vec!["pippo", "ghost", "main"]);
        assert!(artifact.text().contains("Opal.modules[\"pippo\"] = function(Opal) {"));
        assert!(!artifact.text().contains("real source"));
        assert!(!artifact.contains("never"));
    }

    #[test]
    fn prerequired_units_are_satisfied_but_not_emitted() {
        let options = BuildOptions {
            prerequired: ["corelib/runtime".to_string()].into(),
            ..BuildOptions::default()
        };
        let builder = builder(&[("app/main.rb", "require 'corelib/runtime'")], options);
        let artifact = builder.build("main").expect("build");
        assert_eq!(names(&artifact), vec!["main"]);
        assert!(!artifact.text().contains("Opal.modules[\"corelib/runtime\"]"));
    }

    #[test]
    fn preloads_come_first_in_declared_order() {
        let options = BuildOptions {
            preload: vec!["p2".into(), "p1".into(), "./p2.rb".into()],
            ..BuildOptions::default()
        };
        let builder = builder(
            &[
                ("app/main.rb", "require 'a'"),
                ("lib/a.rb", ""),
                ("lib/p1.rb", ""),
                ("lib/p2.rb", "require 'a'"),
            ],
            options,
        );
        let artifact = builder.build("main").expect("build");
        assert_eq!(names(&artifact), vec!["a", "p2", "p1", "main"]);
        let text = artifact.text();
        let run_p2 = text.find("Opal.require(\"p2\");").expect("p2 runs");
        let run_p1 = text.find("Opal.require(\"p1\");").expect("p1 runs");
        assert!(run_p2 < run_p1);
        assert!(run_p1 < text.find("(function(Opal) {").expect("entry"));
    }

    #[test]
    fn native_units_pass_through_verbatim() {
        let native = "window.native = function() { return 42; };\n";
        let builder = builder(
            &[
                ("app/main.rb", "require 'native'\nrequire 'native.js'"),
                ("lib/native.js", native),
            ],
            BuildOptions::default(),
        );
        let artifact = builder.build("main").expect("build");
        assert_eq!(names(&artifact), vec!["native", "main"]);
        assert_eq!(artifact.text().matches(native).count(), 1);
        assert!(!artifact.text().contains("Opal.modules[\"native\"]"));
    }

    #[test]
    fn expands_trees_into_sorted_edges() {
        let builder = builder(
            &[
                ("app/main.rb", "require_tree './tree'"),
                ("app/tree/c.rb", ""),
                ("app/tree/a.rb", ""),
                ("app/tree/sub/b.js", ""),
            ],
            BuildOptions::default(),
        );
        let artifact = builder.build("main").expect("build");
        let tree: Vec<_> = artifact
            .edges()
            .iter()
            .filter(|edge| edge.kind == EdgeKind::Tree)
            .map(|edge| edge.to.as_str())
            .collect();
        assert_eq!(tree, vec!["tree/a", "tree/c", "tree/sub/b"]);
        assert_eq!(artifact.unit_count(), 4);
    }

    #[test]
    fn units_without_requires_have_no_edges() {
        let builder = builder(&[("app/main.rb", "puts 1")], BuildOptions::default());
        let artifact = builder.build("main").expect("build");
        assert!(artifact.edges().is_empty());
    }

    #[test]
    fn autoload_edges_are_followed() {
        let builder = builder(
            &[
                ("app/main.rb", "module App\n  autoload :Widget, 'app/widget'\nend"),
                ("lib/app/widget.rb", ""),
            ],
            BuildOptions::default(),
        );
        let artifact = builder.build("main").expect("build");
        assert_eq!(names(&artifact), vec!["app/widget", "main"]);
        assert_eq!(artifact.edges()[0].kind, EdgeKind::Autoload);
    }

    #[test]
    fn reports_unresolved_dependencies_with_requester() {
        let builder = builder(&[("app/main.rb", "require 'missing'")], BuildOptions::default());
        let err = builder.build("main").unwrap_err();
        let CoreError::UnresolvedDependency { name, requested_by } = err else {
            panic!("expected unresolved dependency, got {err:?}");
        };
        assert_eq!(name, "missing");
        assert_eq!(requested_by, "main");
    }

    #[test]
    fn reports_unresolved_entry() {
        let builder = builder(&[], BuildOptions::default());
        let err = builder.build("main").unwrap_err();
        assert!(err.to_string().contains("required by (entry)"));
    }

    #[test]
    fn ruby_source_shadows_native_sibling() {
        let builder = builder(
            &[
                ("app/main.rb", "require 'dup'"),
                ("lib/dup.rb", "module Dup; end"),
                ("lib/dup.js", "native_dup();"),
            ],
            BuildOptions::default(),
        );
        let artifact = builder.build("main").expect("build");
        assert_eq!(artifact.units(), ["dup", "main"]);
        assert!(artifact.text().contains("Opal.modules[\"dup\"] = function(Opal) {"));
        assert!(!artifact.text().contains("native_dup"));
    }

    #[test]
    fn parse_errors_abort_the_build() {
        let builder = builder(
            &[("app/main.rb", "require 'bad'"), ("lib/bad.rb", "def (")],
            BuildOptions::default(),
        );
        let err = builder.build("main").unwrap_err();
        assert!(matches!(err, CoreError::Parse(ref parse) if parse.file == "bad"));
    }

    #[test]
    fn builds_from_in_memory_source() {
        let builder = builder(&[("lib/a.rb", "")], BuildOptions::default());
        let artifact = builder
            .build_str("require 'a'\n3.142", "./inline.rb")
            .expect("build");
        assert_eq!(names(&artifact), vec!["a", "inline"]);
        assert!(artifact.text().contains("return 3.142;"));
    }

    #[test]
    fn bundles_start_with_the_first_unit_by_default() {
        let options = BuildOptions {
            preload: vec!["corelib/runtime".into()],
            ..BuildOptions::default()
        };
        let builder = builder(
            &[
                ("app/main.rb", ""),
                ("lib/corelib/runtime.js", "(function(undefined) {\n})();\n"),
            ],
            options,
        );
        let artifact = builder.build("main").expect("build");
        assert!(artifact.text().starts_with("(function(undefined) {"));
        assert!(!artifact.text().contains("opalite bundle"));
    }

    #[test]
    fn prefixes_banner_when_enabled() {
        let options = BuildOptions {
            banner: true,
            ..BuildOptions::default()
        };
        let builder = builder(&[("app/main.rb", "")], options);
        let artifact = builder.build("main").expect("build");
        assert!(artifact.text().starts_with("/* opalite bundle: 1 units */\n(function(Opal) {"));
    }

    #[test]
    fn builds_from_the_file_system() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("main.rb"), "require 'helper'").expect("write");
        std::fs::write(dir.path().join("helper.rb"), "HELPER = true").expect("write");
        let mut builder = Builder::new(BuildOptions::default());
        builder.append_path(dir.path());
        let artifact = builder.build("main").expect("build");
        assert_eq!(artifact.units(), ["helper", "main"]);
    }
}
