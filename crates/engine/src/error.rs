//! Common error type for the engine crate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while populating, verifying, or merging.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The filesystem walk failed.
    #[error(transparent)]
    Traverse(#[from] walk::TraverseError),
    /// The manifest store failed.
    #[error(transparent)]
    Manifest(#[from] manifest::ManifestError),
    /// A name failed to round-trip through the locale charset.
    #[error(transparent)]
    Encoding(#[from] encoding::EncodingError),
    /// A filesystem operation outside the walk failed.
    #[error("failed to {action} '{path}': {source}")]
    Io {
        /// What the engine was doing.
        action: &'static str,
        /// The path involved.
        path: PathBuf,
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },
}

impl EngineError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
