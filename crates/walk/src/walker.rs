use std::ffi::{CString, OsString};
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::PathBuf;

use rustix::fs::{self, Dir, FileType, Mode, OFlags};
use rustix::io::Errno;
use tracing::{debug, warn};

use crate::entry::{Descend, Entry, EntryKind, WalkPath};
use crate::error::TraverseError;
use crate::visitor::Visitor;

/// Policy applied when the operating system denies access to an entry or
/// subdirectory during descent.
///
/// Denied access to the traversal root is always fatal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DenyPolicy {
    /// Log a warning and skip the entry or subtree.
    #[default]
    Warn,
    /// Abort the walk with a [`TraverseError`].
    Fail,
}

/// Configuration for a traversal.
#[derive(Clone, Debug, Default)]
pub struct WalkOptions {
    /// How to react to `EACCES` below the root.
    pub access_denied: DenyPolicy,
}

/// Depth-first traversal over an explicit frame stack.
///
/// Recursion depth is bounded only by memory; the call stack never grows
/// with tree depth. Every directory is opened relative to its parent
/// descriptor with `O_NOFOLLOW`, so a symbolic link introduced anywhere in
/// the tree cannot redirect the walk outside the root.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    options: WalkOptions,
}

struct Frame {
    fd: OwnedFd,
    dir: Dir,
    parent_len: usize,
}

impl Walker {
    /// Creates a walker rooted at the provided directory.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            options: WalkOptions::default(),
        }
    }

    /// Replaces the traversal options.
    #[must_use]
    pub fn options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the traversal, delivering events to `visitor`.
    ///
    /// Frames own their directory descriptors, so every descriptor opened
    /// by the walk is closed when this function returns, on the error path
    /// as much as on success.
    pub fn run<V: Visitor>(&self, visitor: &mut V) -> Result<(), V::Error> {
        let mut path = WalkPath::new(self.root.as_os_str().as_bytes());
        debug!("walking '{}'", self.root.display());

        let dir_flags = OFlags::RDONLY | OFlags::DIRECTORY | OFlags::NOFOLLOW | OFlags::CLOEXEC;
        let root_fd = match fs::openat(fs::CWD, &self.root, dir_flags, Mode::empty()) {
            Ok(fd) => fd,
            Err(errno) => {
                return Err(TraverseError::root(self.root.clone(), errno.into()).into());
            }
        };
        let root_dir = match Dir::read_from(&root_fd) {
            Ok(dir) => dir,
            Err(errno) => {
                return Err(TraverseError::directory(self.root.clone(), errno.into()).into());
            }
        };

        visitor.enter_dir(&path)?;
        let mut stack = vec![Frame {
            parent_len: path.len(),
            fd: root_fd,
            dir: root_dir,
        }];

        while let Some(frame) = stack.last_mut() {
            // Pull the next entry name, skipping `.` and `..`.
            let name = loop {
                match frame.dir.next() {
                    None => break None,
                    Some(Err(errno)) => {
                        return Err(TraverseError::read_dir(
                            path.as_os_path().to_path_buf(),
                            errno.into(),
                        )
                        .into());
                    }
                    Some(Ok(dirent)) => {
                        let bytes = dirent.file_name().to_bytes();
                        if bytes == b"." || bytes == b".." {
                            continue;
                        }
                        break Some(dirent.file_name().to_owned());
                    }
                }
            };

            let Some(name) = name else {
                visitor.leave_dir(&path)?;
                if let Some(finished) = stack.pop() {
                    path.truncate_to(finished.parent_len);
                }
                continue;
            };

            // O_NONBLOCK keeps the open from stalling on fifos and devices;
            // it has no effect on the regular files and directories that
            // survive the fstat check below.
            let entry_flags =
                OFlags::RDONLY | OFlags::NOFOLLOW | OFlags::CLOEXEC | OFlags::NONBLOCK;
            let fd = match fs::openat(&frame.fd, &name, entry_flags, Mode::empty()) {
                Ok(fd) => fd,
                Err(errno) if errno == Errno::LOOP => {
                    debug!(
                        "'{}' is a symbolic link, skipping it",
                        lossy_entry_name(&path, &name)
                    );
                    continue;
                }
                Err(errno) if errno == Errno::NXIO => {
                    debug!(
                        "'{}' is neither a directory nor a regular file, skipping it",
                        lossy_entry_name(&path, &name)
                    );
                    continue;
                }
                Err(errno)
                    if errno == Errno::ACCESS
                        && self.options.access_denied == DenyPolicy::Warn =>
                {
                    warn!("no access to '{}', skipping it", lossy_entry_name(&path, &name));
                    continue;
                }
                Err(errno) => {
                    return Err(
                        TraverseError::entry(entry_path(&path, &name), errno.into()).into()
                    );
                }
            };

            let stat = match fs::fstat(&fd) {
                Ok(stat) => stat,
                Err(errno) => {
                    return Err(
                        TraverseError::metadata(entry_path(&path, &name), errno.into()).into()
                    );
                }
            };
            let kind = match FileType::from_raw_mode(stat.st_mode) {
                FileType::RegularFile => EntryKind::File,
                FileType::Directory => EntryKind::Dir,
                _ => {
                    debug!(
                        "'{}' is neither a directory nor a regular file, skipping it",
                        lossy_entry_name(&path, &name)
                    );
                    continue;
                }
            };

            let name_offset = path.push_name(name.to_bytes());
            let parent_len = name_offset - 1;
            let descend = {
                let entry = Entry {
                    kind,
                    stat,
                    fd: fd.as_fd(),
                    path: &path,
                    name_offset,
                };
                visitor.entry(&entry)?
            };

            if kind == EntryKind::Dir && descend == Descend::Into {
                let dir = match Dir::read_from(&fd) {
                    Ok(dir) => dir,
                    Err(errno)
                        if errno == Errno::ACCESS
                            && self.options.access_denied == DenyPolicy::Warn =>
                    {
                        warn!(
                            "no access to '{}', skipping it",
                            path.as_os_path().display()
                        );
                        path.truncate_to(parent_len);
                        continue;
                    }
                    Err(errno) => {
                        return Err(TraverseError::directory(
                            path.as_os_path().to_path_buf(),
                            errno.into(),
                        )
                        .into());
                    }
                };
                visitor.enter_dir(&path)?;
                stack.push(Frame {
                    fd,
                    dir,
                    parent_len,
                });
            } else {
                path.truncate_to(parent_len);
            }
        }

        Ok(())
    }
}

fn entry_path(path: &WalkPath, name: &CString) -> PathBuf {
    let mut full = path.full().to_vec();
    full.push(b'/');
    full.extend_from_slice(name.to_bytes());
    PathBuf::from(OsString::from_vec(full))
}

fn lossy_entry_name(path: &WalkPath, name: &CString) -> String {
    entry_path(path, name).display().to_string()
}
