//! The visitor behind `create-db`.

use manifest::Manifest;
use tracing::debug;
use walk::{Descend, Entry, Visitor, WalkPath};

use crate::error::EngineError;
use crate::record::{file_record, manifest_key};

/// Records every regular file and directory of the walked tree into the
/// manifest.
///
/// The caller owns the transaction: all `put`s issued here stay reversible
/// until the surrounding tool commits.
pub struct PopulateVisitor<'a> {
    manifest: &'a Manifest,
}

impl<'a> PopulateVisitor<'a> {
    /// Creates a visitor writing into `manifest`.
    #[must_use]
    pub fn new(manifest: &'a Manifest) -> Self {
        Self { manifest }
    }
}

impl Visitor for PopulateVisitor<'_> {
    type Error = EngineError;

    fn enter_dir(&mut self, path: &WalkPath) -> Result<(), EngineError> {
        debug!(
            "recording directory '{}'",
            String::from_utf8_lossy(path.relative())
        );
        Ok(())
    }

    fn entry(&mut self, entry: &Entry<'_>) -> Result<Descend, EngineError> {
        let record = file_record(entry)?;
        let (dir, name) = manifest_key(entry)?;
        self.manifest.put(&dir, &name, &record)?;
        Ok(Descend::Into)
    }

    fn leave_dir(&mut self, _path: &WalkPath) -> Result<(), EngineError> {
        Ok(())
    }
}
