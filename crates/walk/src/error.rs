use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Error returned when traversal fails.
#[derive(Debug)]
pub struct TraverseError {
    kind: TraverseErrorKind,
}

impl TraverseError {
    fn new(kind: TraverseErrorKind) -> Self {
        Self { kind }
    }

    pub(crate) fn root(path: PathBuf, source: io::Error) -> Self {
        Self::new(TraverseErrorKind::Root { path, source })
    }

    pub(crate) fn directory(path: PathBuf, source: io::Error) -> Self {
        Self::new(TraverseErrorKind::Directory { path, source })
    }

    pub(crate) fn read_dir(path: PathBuf, source: io::Error) -> Self {
        Self::new(TraverseErrorKind::ReadDir { path, source })
    }

    pub(crate) fn entry(path: PathBuf, source: io::Error) -> Self {
        Self::new(TraverseErrorKind::Entry { path, source })
    }

    pub(crate) fn metadata(path: PathBuf, source: io::Error) -> Self {
        Self::new(TraverseErrorKind::Metadata { path, source })
    }

    /// Returns the specific failure that terminated traversal.
    #[must_use]
    pub fn kind(&self) -> &TraverseErrorKind {
        &self.kind
    }

    /// Returns the filesystem path associated with the error.
    ///
    /// Traversal failures always name the offending path, so callers can
    /// forward the returned value directly into higher-level diagnostics
    /// without pattern matching on [`TraverseErrorKind`].
    #[must_use]
    pub fn path(&self) -> &Path {
        self.kind.path()
    }
}

impl fmt::Display for TraverseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TraverseErrorKind::Root { path, source } => {
                write!(
                    f,
                    "failed to open traversal root '{}': {}",
                    path.display(),
                    source
                )
            }
            TraverseErrorKind::Directory { path, source } => {
                write!(
                    f,
                    "failed to open directory '{}': {}",
                    path.display(),
                    source
                )
            }
            TraverseErrorKind::ReadDir { path, source } => {
                write!(
                    f,
                    "failed to read directory '{}': {}",
                    path.display(),
                    source
                )
            }
            TraverseErrorKind::Entry { path, source } => {
                write!(f, "failed to open entry '{}': {}", path.display(), source)
            }
            TraverseErrorKind::Metadata { path, source } => {
                write!(
                    f,
                    "failed to inspect metadata for '{}': {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl Error for TraverseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            TraverseErrorKind::Root { source, .. }
            | TraverseErrorKind::Directory { source, .. }
            | TraverseErrorKind::ReadDir { source, .. }
            | TraverseErrorKind::Entry { source, .. }
            | TraverseErrorKind::Metadata { source, .. } => Some(source),
        }
    }
}

/// Classification of traversal failures.
#[derive(Debug)]
pub enum TraverseErrorKind {
    /// Failed to open the traversal root directory.
    Root {
        /// Root path that could not be opened.
        path: PathBuf,
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },
    /// Failed to open a subdirectory for reading its entries.
    Directory {
        /// Directory that could not be opened.
        path: PathBuf,
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },
    /// Failed to obtain a directory entry during iteration.
    ReadDir {
        /// Directory containing the problematic entry.
        path: PathBuf,
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },
    /// Failed to open an entry relative to its parent directory.
    Entry {
        /// Path of the entry that could not be opened.
        path: PathBuf,
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },
    /// Failed to retrieve metadata for an entry.
    Metadata {
        /// Path whose metadata could not be retrieved.
        path: PathBuf,
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },
}

impl TraverseErrorKind {
    /// Returns the filesystem path tied to the failure.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            TraverseErrorKind::Root { path, .. }
            | TraverseErrorKind::Directory { path, .. }
            | TraverseErrorKind::ReadDir { path, .. }
            | TraverseErrorKind::Entry { path, .. }
            | TraverseErrorKind::Metadata { path, .. } => path,
        }
    }
}
