//! Storage capability used by the resolver and builder.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::CoreError;

/// Read access to unit sources.
pub trait SourceReader {
    fn is_file(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> Result<String, CoreError>;

    /// Every file below `dir`, recursively, sorted by path.
    fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>, CoreError>;
}

/// The real file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystem;

impl SourceReader for FileSystem {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_to_string(&self, path: &Path) -> Result<String, CoreError> {
        fs::read_to_string(path).map_err(|source| CoreError::SourceIo {
            path: path.to_path_buf(),
            source,
        })
    }

    fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|err| CoreError::SourceIo {
                path: dir.to_path_buf(),
                source: io::Error::from(err),
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Sources held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, source: impl Into<String>) {
        self.files.insert(path.into(), source.into());
    }

    /// Builder-style [`MemoryReader::insert`].
    pub fn with_file(mut self, path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }
}

impl SourceReader for MemoryReader {
    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }

    fn read_to_string(&self, path: &Path) -> Result<String, CoreError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| CoreError::SourceIo {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such in-memory source"),
            })
    }

    fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
        Ok(self
            .files
            .keys()
            .filter(|file| *file != dir && file.starts_with(dir))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn walks_the_file_system_in_sorted_order() {
        let dir = tempdir().expect("tempdir");
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("nested")).expect("mkdir");
        fs::write(tree.join("b.rb"), "").expect("write");
        fs::write(tree.join("a.rb"), "").expect("write");
        fs::write(tree.join("nested/c.js"), "").expect("write");

        let files = FileSystem.walk_files(&tree).expect("walk");
        let relative: Vec<_> = files
            .iter()
            .map(|path| path.strip_prefix(&tree).expect("prefix").to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("a.rb"),
                PathBuf::from("b.rb"),
                PathBuf::from("nested/c.js")
            ]
        );
    }

    #[test]
    fn reports_unreadable_files() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("missing.rb");
        let err = FileSystem.read_to_string(&missing).unwrap_err();
        assert!(matches!(err, CoreError::SourceIo { path, .. } if path == missing));
    }

    #[test]
    fn memory_reader_infers_directories() {
        let reader = MemoryReader::new()
            .with_file("lib/a.rb", "1")
            .with_file("lib/sub/b.rb", "2")
            .with_file("other.rb", "3");
        assert!(reader.is_dir(Path::new("lib")));
        assert!(reader.is_dir(Path::new("lib/sub")));
        assert!(!reader.is_dir(Path::new("lib/a.rb")));
        assert!(!reader.is_dir(Path::new("li")));
        assert_eq!(
            reader.walk_files(Path::new("lib")).expect("walk"),
            vec![PathBuf::from("lib/a.rb"), PathBuf::from("lib/sub/b.rb")]
        );
        assert_eq!(
            reader.read_to_string(Path::new("other.rb")).expect("read"),
            "3"
        );
    }
}
