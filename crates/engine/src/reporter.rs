//! Mismatch reporting strategies for verification and merging.

use manifest::FileRecord;
use tracing::{error, warn};
use walk::EntryKind;

use crate::copy::CopyEngine;

/// Receives the typed mismatch events produced while a tree is checked
/// against the manifest.
///
/// Implementations decide what to log, repair, or ignore; any method may
/// be a no-op.
pub trait MismatchReporter {
    /// The manifest expects an entry the filesystem lacks.
    fn file_not_found(&mut self, kind: EntryKind, rel_path: &str);

    /// The filesystem has an entry the manifest lacks.
    fn new_file(&mut self, kind: EntryKind, rel_path: &str);

    /// Compares `expected` against `actual` and returns whether they are
    /// equal under the mirror rule. Callers use the verdict to decide
    /// whether to descend into a matched directory.
    fn check_mismatch(&mut self, rel_path: &str, expected: &FileRecord, actual: &FileRecord)
        -> bool;
}

/// Counts of the events a check produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckCounts {
    /// Entries missing from the filesystem.
    pub missing: u64,
    /// Entries missing from the manifest.
    pub unexpected: u64,
    /// Entries present in both but differing.
    pub mismatched: u64,
}

impl CheckCounts {
    /// Whether the checked tree matched the manifest exactly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Reporter used by `verify-dir`: every divergence becomes a diagnostic
/// on the error stream, listing each differing field separately.
#[derive(Debug, Default)]
pub struct VerifyReporter {
    counts: CheckCounts,
}

impl VerifyReporter {
    /// Creates a reporter with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Event counts accumulated so far.
    #[must_use]
    pub fn counts(&self) -> CheckCounts {
        self.counts
    }
}

impl MismatchReporter for VerifyReporter {
    fn file_not_found(&mut self, kind: EntryKind, rel_path: &str) {
        self.counts.missing += 1;
        error!("{kind} not found in the file system: '{rel_path}'");
    }

    fn new_file(&mut self, kind: EntryKind, rel_path: &str) {
        self.counts.unexpected += 1;
        error!("new {kind} found in the file system: '{rel_path}'");
    }

    fn check_mismatch(
        &mut self,
        rel_path: &str,
        expected: &FileRecord,
        actual: &FileRecord,
    ) -> bool {
        if expected == actual {
            return true;
        }
        self.counts.mismatched += 1;

        match (expected, actual) {
            (
                FileRecord::File {
                    size: expected_size,
                    mtime: expected_mtime,
                    digest: expected_digest,
                },
                FileRecord::File {
                    size: actual_size,
                    mtime: actual_mtime,
                    digest: actual_digest,
                },
            ) => {
                if expected_size != actual_size {
                    error!(
                        "file size mismatch for '{rel_path}': manifest {expected_size}, \
                         file system {actual_size}"
                    );
                }
                if expected_mtime != actual_mtime {
                    error!(
                        "last modified mismatch for '{rel_path}': manifest {expected_mtime}, \
                         file system {actual_mtime}"
                    );
                }
                if expected_digest != actual_digest {
                    error!(
                        "content digest mismatch for '{rel_path}': manifest {}, file system {}",
                        hex(expected_digest),
                        hex(actual_digest)
                    );
                }
            }
            (expected, actual) => {
                error!(
                    "entry type mismatch for '{rel_path}': manifest records a {}, \
                     file system has a {}",
                    crate::record::record_kind(expected),
                    crate::record::record_kind(actual)
                );
            }
        }
        false
    }
}

/// Reporter used by `merge-dir`.
///
/// Divergences are reported exactly as `verify-dir` would, and entries the
/// destination lacks are additionally copied over from the source tree.
/// Entries present only in the destination are reported but never
/// deleted.
#[derive(Debug)]
pub struct MergeReporter {
    inner: VerifyReporter,
    copier: CopyEngine,
    copy_failures: u64,
}

impl MergeReporter {
    /// Creates a reporter copying missing entries out of `copier`'s
    /// source root.
    #[must_use]
    pub fn new(copier: CopyEngine) -> Self {
        Self {
            inner: VerifyReporter::new(),
            copier,
            copy_failures: 0,
        }
    }

    /// Event counts accumulated so far.
    #[must_use]
    pub fn counts(&self) -> CheckCounts {
        self.inner.counts()
    }

    /// Number of repairs that failed; the events remain reported.
    #[must_use]
    pub fn copy_failures(&self) -> u64 {
        self.copy_failures
    }
}

impl MismatchReporter for MergeReporter {
    fn file_not_found(&mut self, kind: EntryKind, rel_path: &str) {
        self.inner.file_not_found(kind, rel_path);
        let copied = match kind {
            EntryKind::File => self.copier.copy_file(rel_path),
            EntryKind::Dir => self.copier.copy_subtree(rel_path),
        };
        if !copied {
            self.copy_failures += 1;
            warn!("'{rel_path}' was not merged into the destination");
        }
    }

    fn new_file(&mut self, kind: EntryKind, rel_path: &str) {
        self.inner.new_file(kind, rel_path);
    }

    fn check_mismatch(
        &mut self,
        rel_path: &str,
        expected: &FileRecord,
        actual: &FileRecord,
    ) -> bool {
        self.inner.check_mismatch(rel_path, expected, actual)
    }
}

fn hex(digest: &checksums::Digest) -> String {
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}
