use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Logical name of the runtime support library, preloaded ahead of
/// everything else when the bundled library is on the search path.
pub const RUNTIME_UNIT: &str = "corelib/runtime";

pub fn default_stdlib_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../stdlib")
}

/// Check that `root` is a directory holding the runtime library.
pub fn ensure_root(root: impl AsRef<Path>) -> Result<PathBuf, CoreError> {
    let root = root.as_ref();
    if root.join(format!("{RUNTIME_UNIT}.js")).is_file() {
        Ok(root.to_path_buf())
    } else {
        Err(CoreError::MissingStdlib(root.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildOptions, Builder};

    #[test]
    fn default_root_holds_the_runtime() {
        let root = ensure_root(default_stdlib_root()).expect("stdlib should exist");
        assert!(root.join("opal.rb").is_file());
    }

    #[test]
    fn reports_missing_stdlib_root() {
        let missing_root = PathBuf::from("./path/that/does/not/exist");
        let err = ensure_root(&missing_root).unwrap_err();
        assert!(matches!(err, CoreError::MissingStdlib(path) if path == missing_root));
    }

    #[test]
    fn bundled_library_builds() {
        let mut builder = Builder::new(BuildOptions {
            preload: vec![RUNTIME_UNIT.to_string()],
            ..BuildOptions::default()
        });
        builder.append_path(default_stdlib_root());
        let artifact = builder
            .build_str("require 'opal'\nputs true", "main")
            .expect("build");
        assert_eq!(artifact.units()[0], RUNTIME_UNIT);
        assert!(artifact.contains("corelib/boolean"));
        assert!(!artifact.contains("nodejs/process"));
        assert_eq!(artifact.units().last().map(String::as_str), Some("main"));
    }
}
