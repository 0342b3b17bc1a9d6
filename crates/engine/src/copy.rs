//! File and subtree copying between a source and destination root.

use std::ffi::{CString, OsStr};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use rustix::fs::{self, Mode, OFlags};
use tracing::{debug, error};
use walk::{Descend, Entry, EntryKind, Visitor, WalkPath, Walker};

use crate::error::{EngineError, EngineResult};

const COPY_CHUNK: usize = 4096;
const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

/// Copies entries from a source root into a destination root.
///
/// Both roots are held as open directory descriptors for the lifetime of
/// the engine, and every path handed to the copy operations is opened
/// relative to them with `O_NOFOLLOW` on the final component, so a
/// symbolic link swapped in for the target is an error rather than a
/// traversal.
///
/// Copies carry the source's bytes and mtime; mode, ownership, and
/// extended attributes are not preserved.
#[derive(Debug)]
pub struct CopyEngine {
    src: OwnedFd,
    src_path: PathBuf,
    dest: OwnedFd,
    dest_path: PathBuf,
}

impl CopyEngine {
    /// Opens both roots. Fails if either is not an accessible directory.
    pub fn new(src_root: &Path, dest_root: &Path) -> EngineResult<Self> {
        Ok(Self {
            src: open_root(src_root)?,
            src_path: src_root.to_path_buf(),
            dest: open_root(dest_root)?,
            dest_path: dest_root.to_path_buf(),
        })
    }

    /// Copies one regular file at `rel_path` from the source root into
    /// the destination root.
    ///
    /// The destination is created with `O_CREAT | O_EXCL`; an entry
    /// already present there is an error, not an overwrite. Returns
    /// `false` after logging on any failure.
    pub fn copy_file(&self, rel_path: &str) -> bool {
        match self.copy_file_inner(rel_path) {
            Ok(()) => {
                debug!("copied '{rel_path}'");
                true
            }
            Err(error) => {
                error!("failed to copy '{rel_path}': {error}");
                false
            }
        }
    }

    fn copy_file_inner(&self, rel_path: &str) -> EngineResult<()> {
        let rel = rel_cstring(rel_path)?;
        let src_display = self.src_path.join(rel_path);
        let dest_display = self.dest_path.join(rel_path);

        let src_fd = fs::openat(
            &self.src,
            &rel,
            OFlags::RDONLY | OFlags::NOFOLLOW | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .map_err(|errno| EngineError::io("open source file", &src_display, errno.into()))?;
        let dest_fd = fs::openat(
            &self.dest,
            &rel,
            OFlags::WRONLY | OFlags::CREATE | OFlags::EXCL | OFlags::CLOEXEC,
            Mode::from_bits_truncate(FILE_MODE),
        )
        .map_err(|errno| EngineError::io("create", &dest_display, errno.into()))?;

        let mut reader = File::from(src_fd);
        let mut writer = File::from(dest_fd);
        stream_copy(&mut reader, &mut writer)
            .map_err(|error| EngineError::io("copy", &dest_display, error))?;

        let metadata = reader
            .metadata()
            .map_err(|error| EngineError::io("inspect metadata for", &src_display, error))?;
        let mtime = FileTime::from_last_modification_time(&metadata);
        filetime::set_file_handle_times(&writer, None, Some(mtime))
            .map_err(|error| EngineError::io("set times on", &dest_display, error))?;
        Ok(())
    }

    /// Copies the directory subtree at `rel_path` from the source root
    /// into the destination root, creating directories as it goes.
    ///
    /// Returns `false` after logging on any failure; directories created
    /// before the failure are left in place.
    pub fn copy_subtree(&self, rel_path: &str) -> bool {
        match self.copy_subtree_inner(rel_path) {
            Ok(()) => {
                debug!("copied subtree '{rel_path}'");
                true
            }
            Err(error) => {
                error!("failed to copy subtree '{rel_path}': {error}");
                false
            }
        }
    }

    fn copy_subtree_inner(&self, rel_path: &str) -> EngineResult<()> {
        let rel = rel_cstring(rel_path)?;
        let dest_display = self.dest_path.join(rel_path);

        fs::mkdirat(&self.dest, &rel, Mode::from_bits_truncate(DIR_MODE))
            .map_err(|errno| EngineError::io("create directory", &dest_display, errno.into()))?;
        let dest_root = fs::openat(
            &self.dest,
            &rel,
            OFlags::RDONLY | OFlags::DIRECTORY | OFlags::NOFOLLOW | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .map_err(|errno| EngineError::io("open directory", &dest_display, errno.into()))?;

        let src_bytes = encoding::from_utf8(rel_path)?;
        let src_subtree = self
            .src_path
            .join(OsStr::from_bytes(src_bytes.as_ref()));
        let mut visitor = SubtreeCopyVisitor {
            dest: vec![dest_root],
            pending: None,
            dest_display,
        };
        Walker::new(src_subtree).run(&mut visitor)
    }
}

fn open_root(root: &Path) -> EngineResult<OwnedFd> {
    fs::openat(
        fs::CWD,
        root,
        OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
        Mode::empty(),
    )
    .map_err(|errno| EngineError::io("open directory", root, errno.into()))
}

/// Converts a manifest-relative path back to locale octets for the
/// syscall boundary.
fn rel_cstring(rel_path: &str) -> EngineResult<CString> {
    let bytes = encoding::from_utf8(rel_path)?;
    CString::new(bytes.into_owned()).map_err(|_| {
        EngineError::io(
            "resolve",
            rel_path,
            io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL octet"),
        )
    })
}

fn stream_copy(reader: &mut File, writer: &mut File) -> io::Result<()> {
    let mut buf = [0u8; COPY_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => writer.write_all(&buf[..n])?,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
}

/// Mirrors one source subtree into an already-created destination
/// directory, frame by frame.
///
/// The destination descriptor stack tracks the walk: the top entry is the
/// destination counterpart of the walker's active source directory.
struct SubtreeCopyVisitor {
    dest: Vec<OwnedFd>,
    pending: Option<OwnedFd>,
    dest_display: PathBuf,
}

impl SubtreeCopyVisitor {
    fn dest_dir(&self) -> &OwnedFd {
        self.dest
            .last()
            .expect("destination stack is primed before the walk begins")
    }

    fn display_path(&self, entry: &Entry<'_>) -> PathBuf {
        self.dest_display
            .join(OsStr::from_bytes(entry.relative()))
    }
}

impl Visitor for SubtreeCopyVisitor {
    type Error = EngineError;

    fn enter_dir(&mut self, _path: &WalkPath) -> Result<(), EngineError> {
        if let Some(fd) = self.pending.take() {
            self.dest.push(fd);
        }
        Ok(())
    }

    fn entry(&mut self, entry: &Entry<'_>) -> Result<Descend, EngineError> {
        let name = CString::new(entry.file_name()).map_err(|_| {
            EngineError::io(
                "resolve",
                self.display_path(entry),
                io::Error::new(io::ErrorKind::InvalidInput, "name contains a NUL octet"),
            )
        })?;

        match entry.kind() {
            EntryKind::Dir => {
                fs::mkdirat(self.dest_dir(), &name, Mode::from_bits_truncate(DIR_MODE)).map_err(
                    |errno| {
                        EngineError::io("create directory", self.display_path(entry), errno.into())
                    },
                )?;
                let fd = fs::openat(
                    self.dest_dir(),
                    &name,
                    OFlags::RDONLY | OFlags::DIRECTORY | OFlags::NOFOLLOW | OFlags::CLOEXEC,
                    Mode::empty(),
                )
                .map_err(|errno| {
                    EngineError::io("open directory", self.display_path(entry), errno.into())
                })?;
                self.pending = Some(fd);
                Ok(Descend::Into)
            }
            EntryKind::File => {
                let dest_fd = fs::openat(
                    self.dest_dir(),
                    &name,
                    OFlags::WRONLY | OFlags::CREATE | OFlags::EXCL | OFlags::CLOEXEC,
                    Mode::from_bits_truncate(FILE_MODE),
                )
                .map_err(|errno| {
                    EngineError::io("create", self.display_path(entry), errno.into())
                })?;

                let src_fd = entry.fd().try_clone_to_owned().map_err(|error| {
                    EngineError::io("duplicate descriptor for", self.display_path(entry), error)
                })?;
                let mut reader = File::from(src_fd);
                let mut writer = File::from(dest_fd);
                stream_copy(&mut reader, &mut writer)
                    .map_err(|error| EngineError::io("copy", self.display_path(entry), error))?;

                let mtime = FileTime::from_unix_time(
                    entry.mtime_seconds(),
                    entry.mtime_nanoseconds(),
                );
                filetime::set_file_handle_times(&writer, None, Some(mtime)).map_err(|error| {
                    EngineError::io("set times on", self.display_path(entry), error)
                })?;
                Ok(Descend::Skip)
            }
        }
    }

    fn leave_dir(&mut self, _path: &WalkPath) -> Result<(), EngineError> {
        self.dest.pop();
        Ok(())
    }
}
