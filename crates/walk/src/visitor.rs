use crate::entry::{Descend, Entry, WalkPath};
use crate::error::TraverseError;

/// Receives the event stream produced by a walk.
///
/// For every directory, including the root, the walker calls
/// [`enter_dir`](Visitor::enter_dir) before any event concerning its
/// contents and [`leave_dir`](Visitor::leave_dir) after the last of them.
/// Every regular file and subdirectory inside produces one
/// [`entry`](Visitor::entry) call; returning [`Descend::Into`] for a
/// directory entry makes it the next active directory.
///
/// Callback errors abort the walk and propagate to the caller unchanged;
/// the walker releases all pending directory descriptors before returning.
/// The `From<TraverseError>` bound lets the walker surface its own
/// filesystem failures through the same error channel.
pub trait Visitor {
    /// Error type produced by the visitor's callbacks.
    type Error: From<TraverseError>;

    /// Called when a directory becomes the active directory.
    fn enter_dir(&mut self, path: &WalkPath) -> Result<(), Self::Error>;

    /// Called once per regular file or subdirectory entry.
    fn entry(&mut self, entry: &Entry<'_>) -> Result<Descend, Self::Error>;

    /// Called after the last entry of the active directory.
    fn leave_dir(&mut self, path: &WalkPath) -> Result<(), Self::Error>;
}
