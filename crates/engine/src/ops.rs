//! The three tool operations built on one walk implementation.

use std::path::Path;

use manifest::Manifest;
use tracing::warn;
use walk::{WalkOptions, Walker};

use crate::check::CheckVisitor;
use crate::copy::CopyEngine;
use crate::error::EngineResult;
use crate::populate::PopulateVisitor;
use crate::reporter::{CheckCounts, MergeReporter, MismatchReporter};

/// Records the tree rooted at `root` into the manifest.
///
/// The whole walk runs inside one transaction: if it fails for any
/// reason, the manifest reverts to its state before the call.
pub fn create_manifest(
    root: &Path,
    manifest: &Manifest,
    options: &WalkOptions,
) -> EngineResult<()> {
    manifest.begin()?;
    let mut visitor = PopulateVisitor::new(manifest);
    match Walker::new(root).options(options.clone()).run(&mut visitor) {
        Ok(()) => {
            manifest.commit()?;
            Ok(())
        }
        Err(error) => {
            if let Err(rollback_error) = manifest.rollback() {
                warn!("rollback after a failed walk also failed: {rollback_error}");
            }
            Err(error)
        }
    }
}

/// Compares the tree rooted at `root` against the manifest, delivering
/// every divergence to `reporter`.
pub fn verify_tree<R: MismatchReporter>(
    root: &Path,
    manifest: &Manifest,
    reporter: &mut R,
    options: &WalkOptions,
) -> EngineResult<()> {
    let mut visitor = CheckVisitor::new(manifest, reporter)?;
    Walker::new(root).options(options.clone()).run(&mut visitor)?;
    visitor.finish();
    Ok(())
}

/// Compares the tree rooted at `dest_root` against the manifest and
/// copies entries missing there from `src_root`.
///
/// Entries present only in the destination are reported, never deleted.
/// Returns the event counts the comparison produced.
pub fn merge_tree(
    src_root: &Path,
    dest_root: &Path,
    manifest: &Manifest,
    options: &WalkOptions,
) -> EngineResult<CheckCounts> {
    let copier = CopyEngine::new(src_root, dest_root)?;
    let mut reporter = MergeReporter::new(copier);
    verify_tree(dest_root, manifest, &mut reporter, options)?;
    Ok(reporter.counts())
}
