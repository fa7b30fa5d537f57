//! Error types shared by the decoders and the coordination protocol

use std::path::PathBuf;

/// Failures that abort a file-level operation.
///
/// Problems inside a single record or line never show up here; decoders
/// skip them and keep going.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("not a Jw_cad drawing (bad header): {}", .0.display())]
    UnrecognizedFormat(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
}

impl BridgeError {
    /// Map a read error, turning `NotFound` into [`BridgeError::MissingFile`]
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::MissingFile(path)
        } else {
            Self::Io { path, source }
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailure {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
