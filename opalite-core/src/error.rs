use std::path::PathBuf;

use thiserror::Error;

use crate::span::line_col;

/// Malformed unit source, located by line and column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{file}:{line}:{column}: {message}")]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn at(file: &str, source: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_col(source, offset);
        ParseError {
            file: file.to_string(),
            line,
            column,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source {path}: {source}")]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("standard library directory was not found at {0}")]
    MissingStdlib(PathBuf),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// Well-formed source using a construct that has no translation.
    #[error("cannot compile {file}: {message}")]
    Unsupported { file: String, message: String },
    #[error("cannot load such file -- {name} (required by {requested_by})")]
    UnresolvedDependency { name: String, requested_by: String },
    #[error("ambiguous require of {name}: {}", display_candidates(.candidates))]
    AmbiguousExtension {
        name: String,
        candidates: Vec<PathBuf>,
    },
}

fn display_candidates(candidates: &[PathBuf]) -> String {
    candidates
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_reports_position() {
        let err = ParseError::at("foo.rb", "a = 1\nb = )", 10, "unexpected ')'");
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 5);
        assert_eq!(err.to_string(), "foo.rb:2:5: unexpected ')'");
    }

    #[test]
    fn ambiguous_error_lists_candidates() {
        let err = CoreError::AmbiguousExtension {
            name: "foo".to_string(),
            candidates: vec![PathBuf::from("lib/foo.rb"), PathBuf::from("lib/foo.js")],
        };
        assert_eq!(
            err.to_string(),
            "ambiguous require of foo: lib/foo.rb, lib/foo.js"
        );
    }
}
