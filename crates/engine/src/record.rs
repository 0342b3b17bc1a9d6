//! Assembling [`FileRecord`]s from live filesystem entries.

use std::fs::File;

use manifest::FileRecord;
use walk::{Entry, EntryKind};

use crate::error::{EngineError, EngineResult};

/// Builds the record the manifest would store for `entry`.
///
/// Directories carry no attributes. For regular files the size and mtime
/// come from the entry's `fstat` result and the digest is computed by
/// streaming the entry's descriptor, so the record describes the same
/// object the walker opened even if the path has been swapped since.
pub(crate) fn file_record(entry: &Entry<'_>) -> EngineResult<FileRecord> {
    match entry.kind() {
        EntryKind::Dir => Ok(FileRecord::Dir),
        EntryKind::File => Ok(FileRecord::File {
            size: entry.size(),
            mtime: entry.mtime_seconds(),
            digest: digest_entry(entry)?,
        }),
    }
}

fn digest_entry(entry: &Entry<'_>) -> EngineResult<checksums::Digest> {
    let os_path = entry.path().as_os_path();
    let fd = entry
        .fd()
        .try_clone_to_owned()
        .map_err(|error| EngineError::io("duplicate descriptor for", os_path, error))?;
    let mut file = File::from(fd);
    checksums::digest_reader(&mut file)
        .map_err(|error| EngineError::io("read", os_path, error))
}

/// Splits an entry's relative path into the manifest key, converting both
/// halves to UTF-8.
pub(crate) fn manifest_key(entry: &Entry<'_>) -> EngineResult<(String, String)> {
    let dir = encoding::to_utf8(entry.dir_relative())?.into_owned();
    let name = encoding::to_utf8(entry.file_name())?.into_owned();
    Ok((dir, name))
}

/// Joins a manifest key back into the `/`-separated relative path used in
/// diagnostics and by the copy engine.
pub(crate) fn join_rel(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_owned()
    } else {
        format!("{dir}/{name}")
    }
}

/// Maps a stored record to the entry kind it describes.
pub(crate) fn record_kind(record: &FileRecord) -> EntryKind {
    match record {
        FileRecord::File { .. } => EntryKind::File,
        FileRecord::Dir => EntryKind::Dir,
    }
}
