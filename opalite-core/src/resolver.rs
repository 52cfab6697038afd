//! Logical-name resolution through an ordered search-path list.

use std::path::{Component, Path, PathBuf};

use tracing::trace;

use crate::error::CoreError;
use crate::source::SourceReader;

/// How a resolved unit is turned into output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Processor {
    /// Compiled from `.rb` source.
    #[default]
    Ruby,
    /// Native `.js`, emitted verbatim.
    Javascript,
}

impl Processor {
    pub fn extension(self) -> &'static str {
        match self {
            Processor::Ruby => "rb",
            Processor::Javascript => "js",
        }
    }

    /// Processor implied by a file extension, if it is one we know.
    pub fn from_path(path: &Path) -> Option<Processor> {
        match path.extension()?.to_str()? {
            "rb" => Some(Processor::Ruby),
            "js" => Some(Processor::Javascript),
            _ => None,
        }
    }
}

/// Ordered base directories; the first one that yields a match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPaths {
    paths: Vec<PathBuf>,
}

impl SearchPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn prepend(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(0, path.into());
    }

    pub fn reset(&mut self) {
        self.paths.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for SearchPaths {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        SearchPaths {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// A logical name bound to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUnit {
    /// Normalised logical name; the runtime module-table key.
    pub logical: String,
    pub path: PathBuf,
    pub processor: Processor,
}

pub struct Resolver<'a, R: SourceReader> {
    reader: &'a R,
    paths: &'a SearchPaths,
    default_processor: Processor,
}

impl<'a, R: SourceReader> Resolver<'a, R> {
    pub fn new(reader: &'a R, paths: &'a SearchPaths, default_processor: Processor) -> Self {
        Resolver {
            reader,
            paths,
            default_processor,
        }
    }

    /// Resolve `name`, required by the unit `requested_by`.
    ///
    /// Per search path: the exact file when `name` carries `.rb` or `.js`,
    /// otherwise `name` itself, then `name.rb`, then `name.js`. The first
    /// hit wins, so `.rb` shadows a `.js` sibling.
    pub fn resolve(&self, name: &str, requested_by: &str) -> Result<ResolvedUnit, CoreError> {
        let cleaned = fold_segments(name);
        let (logical, explicit) = split_extension(&cleaned);

        for base in self.paths.iter() {
            let exact = base.join(&cleaned);
            trace!(path = %exact.display(), "probing");
            if let Some(processor) = explicit {
                if self.reader.is_file(&exact) {
                    return Ok(self.found(logical, exact, processor));
                }
                continue;
            }
            if self.reader.is_file(&exact) {
                return Ok(self.found(logical, exact, self.default_processor));
            }

            let ruby = base.join(format!("{cleaned}.rb"));
            if self.reader.is_file(&ruby) {
                return Ok(self.found(logical, ruby, Processor::Ruby));
            }
            let native = base.join(format!("{cleaned}.js"));
            if self.reader.is_file(&native) {
                return Ok(self.found(logical, native, Processor::Javascript));
            }
        }

        Err(CoreError::UnresolvedDependency {
            name: logical.to_string(),
            requested_by: requested_by.to_string(),
        })
    }

    /// Every compilable unit below `dir` in the first search path that has
    /// it as a directory, sorted by path.
    pub fn expand_tree(&self, dir: &str, requested_by: &str) -> Result<Vec<ResolvedUnit>, CoreError> {
        let cleaned = fold_segments(dir);
        for base in self.paths.iter() {
            let root = base.join(&cleaned);
            if !self.reader.is_dir(&root) {
                continue;
            }
            let mut units: Vec<ResolvedUnit> = Vec::new();
            for path in self.reader.walk_files(&root)? {
                let Some(processor) = Processor::from_path(&path) else {
                    continue;
                };
                let Ok(relative) = path.strip_prefix(base) else {
                    continue;
                };
                let logical = normalize_logical(&path_to_logical(relative));
                if let Some(previous) = units.iter().find(|unit| unit.logical == logical) {
                    return Err(CoreError::AmbiguousExtension {
                        name: logical,
                        candidates: vec![previous.path.clone(), path],
                    });
                }
                units.push(ResolvedUnit {
                    logical,
                    path,
                    processor,
                });
            }
            units.sort_by(|a, b| a.path.cmp(&b.path));
            trace!(dir = %cleaned, count = units.len(), "expanded tree");
            return Ok(units);
        }
        Err(CoreError::UnresolvedDependency {
            name: cleaned,
            requested_by: requested_by.to_string(),
        })
    }

    fn found(&self, logical: &str, path: PathBuf, processor: Processor) -> ResolvedUnit {
        trace!(logical, path = %path.display(), "resolved");
        ResolvedUnit {
            logical: logical.to_string(),
            path,
            processor,
        }
    }
}

/// Normalise a logical name: drop `./`, fold `.` and `..`, strip a trailing
/// `.rb` or `.js`.
pub fn normalize_logical(name: &str) -> String {
    let folded = fold_segments(name);
    split_extension(&folded).0.to_string()
}

/// Normalised logical name of `name` relative to the directory of `file`.
pub fn join_relative(file: &str, name: &str) -> String {
    match file.rsplit_once('/') {
        Some((dir, _)) => normalize_logical(&format!("{dir}/{name}")),
        None => normalize_logical(name),
    }
}

fn fold_segments(name: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if name.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}

fn split_extension(name: &str) -> (&str, Option<Processor>) {
    if let Some(stem) = name.strip_suffix(".rb") {
        (stem, Some(Processor::Ruby))
    } else if let Some(stem) = name.strip_suffix(".js") {
        (stem, Some(Processor::Javascript))
    } else {
        (name, None)
    }
}

fn path_to_logical(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
