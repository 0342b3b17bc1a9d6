//! The comparison state machine shared by `verify-dir` and `merge-dir`.

use std::collections::{HashMap, HashSet};

use manifest::{FileRecord, Manifest};
use tracing::{debug, warn};
use walk::{Descend, Entry, EntryKind, Visitor, WalkPath};

use crate::error::{EngineError, EngineResult};
use crate::record::{file_record, join_rel, manifest_key, record_kind};
use crate::reporter::MismatchReporter;

/// Walks a tree and compares what it finds against the manifest,
/// delivering every divergence to the reporter.
///
/// The visitor keeps one expected-children map per directory on a stack
/// that mirrors the walk. Entries found on the filesystem are removed
/// from the map as they are checked; whatever remains when the directory
/// is left exists only in the manifest.
pub struct CheckVisitor<'a, R> {
    manifest: &'a Manifest,
    reporter: &'a mut R,
    remaining_dirs: HashSet<String>,
    expected: Vec<HashMap<String, FileRecord>>,
}

impl<'a, R: MismatchReporter> CheckVisitor<'a, R> {
    /// Creates a visitor comparing against `manifest`.
    pub fn new(manifest: &'a Manifest, reporter: &'a mut R) -> EngineResult<Self> {
        Ok(Self {
            remaining_dirs: manifest.dirs()?,
            manifest,
            reporter,
            expected: Vec::new(),
        })
    }

    /// Emits a diagnostic for every manifest directory the walk never
    /// reached. Call after the walk completes.
    pub fn finish(self) {
        for dir in &self.remaining_dirs {
            warn!("directory recorded in the manifest was not found in the file system: '{dir}'");
        }
    }
}

impl<R: MismatchReporter> Visitor for CheckVisitor<'_, R> {
    type Error = EngineError;

    fn enter_dir(&mut self, path: &WalkPath) -> Result<(), EngineError> {
        let dir = encoding::to_utf8(path.relative())?;
        debug!("checking directory '{dir}'");
        self.remaining_dirs.remove(dir.as_ref());
        self.expected.push(self.manifest.list(&dir)?);
        Ok(())
    }

    fn entry(&mut self, entry: &Entry<'_>) -> Result<Descend, EngineError> {
        let (dir, name) = manifest_key(entry)?;
        let rel_path = join_rel(&dir, &name);

        let expected = self
            .expected
            .last_mut()
            .and_then(|children| children.remove(&name));
        let Some(expected) = expected else {
            self.reporter.new_file(entry.kind(), &rel_path);
            // Unknown directories are reported once, not explored.
            return Ok(Descend::Skip);
        };

        let actual = file_record(entry)?;
        let equal = self.reporter.check_mismatch(&rel_path, &expected, &actual);
        if equal && entry.kind() == EntryKind::Dir {
            Ok(Descend::Into)
        } else {
            Ok(Descend::Skip)
        }
    }

    fn leave_dir(&mut self, path: &WalkPath) -> Result<(), EngineError> {
        let dir = encoding::to_utf8(path.relative())?;
        if let Some(children) = self.expected.pop() {
            for (name, record) in &children {
                let rel_path = join_rel(&dir, name);
                self.reporter.file_not_found(record_kind(record), &rel_path);
            }
        }
        Ok(())
    }
}
