//! Error types for configuration compilation

use std::path::PathBuf;
use thiserror::Error;

/// A zone or widget description file could not be read to the end.
///
/// Malformed lines never produce this; they are skipped. Only I/O failures
/// (unreadable file, invalid UTF-8) abort a file.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Trouble in {}, around line {line}", .path.display())]
    Io {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn line(&self) -> usize {
        match self {
            CompileError::Io { line, .. } => *line,
        }
    }
}
