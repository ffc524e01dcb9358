//! Error types for getdp-io

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IoError>;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Parse error in ${section} (line {line}): {message}")]
    Parse {
        section: String,
        line: usize,
        message: String,
    },

    #[error("Section ${0} is not closed by $End{0}")]
    UnterminatedSection(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Element {element} references node {node}, which is not defined")]
    DanglingNode { element: u64, node: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by callers to decide between retrying,
/// skipping an input set, or aborting a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Malformed,
    Precondition,
    Io,
}

impl IoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IoError::FileNotFound(_) => ErrorKind::NotFound,
            IoError::Parse { .. }
            | IoError::UnterminatedSection(_)
            | IoError::UnsupportedFormat(_)
            | IoError::Json(_) => ErrorKind::Malformed,
            IoError::Precondition(_) | IoError::DanglingNode { .. } => ErrorKind::Precondition,
            IoError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn parse(section: &str, line: usize, message: impl Into<String>) -> Self {
        IoError::Parse {
            section: section.to_string(),
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_separate_not_found_from_malformed_and_precondition() {
        assert_eq!(
            IoError::FileNotFound(PathBuf::from("a.msh")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(IoError::parse("Nodes", 3, "bad").kind(), ErrorKind::Malformed);
        assert_eq!(
            IoError::UnterminatedSection("Nodes".into()).kind(),
            ErrorKind::Malformed
        );
        assert_eq!(
            IoError::Precondition("no geometry".into()).kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            IoError::DanglingNode { element: 1, node: 9 }.kind(),
            ErrorKind::Precondition
        );
    }

    #[test]
    fn parse_error_names_section_and_line() {
        let err = IoError::parse("Elements", 12, "invalid element type: x");
        assert_eq!(
            err.to_string(),
            "Parse error in $Elements (line 12): invalid element type: x"
        );
    }
}
