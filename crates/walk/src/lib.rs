#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `walk` provides the filesystem traversal underneath the mirror tools.
//! The walker enumerates regular files and directories in depth-first
//! order and reports them to a [`Visitor`], which receives paired
//! [`enter_dir`](Visitor::enter_dir)/[`leave_dir`](Visitor::leave_dir)
//! events around the entries of every directory. Trees supplied by users
//! are treated as hostile: every directory is opened relative to its
//! parent descriptor with `O_NOFOLLOW`, recursion lives on an explicit
//! heap-allocated stack, and symbolic links are never followed.
//!
//! # Design
//!
//! - [`Walker`] configures and runs a traversal. It owns the growing
//!   [`WalkPath`] buffer and an explicit stack of directory frames, each
//!   holding the open descriptor and directory stream for one level.
//! - [`Visitor`] is the event protocol. Each [`Entry`] hands the visitor
//!   the entry's open descriptor and `fstat` result, so callers can read
//!   file contents without resolving the path a second time.
//! - [`WalkOptions`] selects the [`DenyPolicy`] applied when the
//!   operating system refuses access below the root.
//!
//! # Invariants
//!
//! - A parent directory's `enter_dir` precedes every event concerning its
//!   descendants, and a subdirectory's `leave_dir` precedes the parent's.
//! - Entries named `.` or `..` are never reported. Entry order inside a
//!   directory follows the underlying directory stream.
//! - Every descriptor the walk opens is closed when [`Walker::run`]
//!   returns, whether it returns `Ok` or propagates an error.
//! - The walk never escapes the root: descriptors are opened relative to
//!   the parent with `O_NOFOLLOW`, so a symbolic link placed anywhere in
//!   the tree is skipped rather than traversed.
//!
//! # Errors
//!
//! Filesystem failures surface as [`TraverseError`] values carrying the
//! offending path; visitor callbacks propagate their own error type, which
//! must be able to absorb a [`TraverseError`].
//!
//! # Examples
//!
//! Collect the relative paths of a small tree:
//!
//! ```
//! use walk::{Descend, Entry, TraverseError, Visitor, WalkPath, Walker};
//!
//! struct Collector(Vec<String>);
//!
//! impl Visitor for Collector {
//!     type Error = TraverseError;
//!
//!     fn enter_dir(&mut self, _path: &WalkPath) -> Result<(), TraverseError> {
//!         Ok(())
//!     }
//!
//!     fn entry(&mut self, entry: &Entry<'_>) -> Result<Descend, TraverseError> {
//!         self.0
//!             .push(String::from_utf8_lossy(entry.relative()).into_owned());
//!         Ok(Descend::Into)
//!     }
//!
//!     fn leave_dir(&mut self, _path: &WalkPath) -> Result<(), TraverseError> {
//!         Ok(())
//!     }
//! }
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let temp = tempfile::tempdir()?;
//! std::fs::create_dir(temp.path().join("nested"))?;
//! std::fs::write(temp.path().join("nested/file.txt"), b"data")?;
//!
//! let mut collector = Collector(Vec::new());
//! Walker::new(temp.path()).run(&mut collector)?;
//! collector.0.sort();
//! assert_eq!(collector.0, vec!["nested", "nested/file.txt"]);
//! # Ok(())
//! # }
//! # demo().unwrap();
//! ```

mod entry;
mod error;
mod visitor;
mod walker;

pub use entry::{Descend, Entry, EntryKind, WalkPath};
pub use error::{TraverseError, TraverseErrorKind};
pub use visitor::Visitor;
pub use walker::{DenyPolicy, WalkOptions, Walker};
