#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `engine` hosts the three mirror tools over the single walk
//! implementation of the [`walk`] crate: populating a manifest from a
//! tree, verifying a tree against a manifest, and merging a source tree
//! into a destination so it converges toward the recorded state.
//!
//! # Design
//!
//! - [`PopulateVisitor`] fills the manifest; the digest of every regular
//!   file is streamed straight off the descriptor the walker opened.
//! - [`CheckVisitor`] is the comparison state machine shared by verify
//!   and merge. What distinguishes the two tools is purely the
//!   [`MismatchReporter`] they plug in: [`VerifyReporter`] only logs,
//!   [`MergeReporter`] additionally drives the [`CopyEngine`].
//! - The top-level operations [`create_manifest`], [`verify_tree`], and
//!   [`merge_tree`] wire the pieces together; `create_manifest` wraps its
//!   walk in the manifest transaction so a failed run leaves no partial
//!   state behind.
//!
//! Mismatch events are diagnostics, not errors: an operation only fails
//! when the walk, the store, or the encoding layer does.

mod check;
mod copy;
mod error;
mod ops;
mod populate;
mod record;
mod reporter;

pub use check::CheckVisitor;
pub use copy::CopyEngine;
pub use error::{EngineError, EngineResult};
pub use ops::{create_manifest, merge_tree, verify_tree};
pub use populate::PopulateVisitor;
pub use reporter::{CheckCounts, MergeReporter, MismatchReporter, VerifyReporter};
