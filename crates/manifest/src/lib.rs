#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `manifest` is the persistent store of recorded filesystem state. One
//! SQLite file holds a single logical table keyed by `(file, dir)`, where
//! `dir` is the `/`-joined path from the manifest root (the root itself is
//! the empty string) and `file` is a name with no separator in it. Both
//! are UTF-8; callers convert locale-encoded names before they reach this
//! crate, and equality is octet-wise with no Unicode normalization.
//!
//! # Design
//!
//! - [`FileRecord`] is an enum, so a directory row structurally cannot
//!   carry size, mtime, or digest values; the columns are bound as NULL.
//! - All statements go through rusqlite's cached-statement API, giving
//!   each connection one prepared statement per query shape.
//! - Transactions are explicit [`begin`](Manifest::begin) /
//!   [`commit`](Manifest::commit) / [`rollback`](Manifest::rollback)
//!   calls rather than scoped guards: a walk holds `&Manifest` across
//!   many mutations, and the enclosing tool decides the outcome once the
//!   walk is over. Nesting is not supported.
//!
//! # Errors
//!
//! Every operation surfaces [`ManifestError`], wrapping the engine
//! diagnostic. A `FILE` row with NULL value columns reports
//! [`ManifestError::Corrupt`] instead of panicking.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use checksums::{Digest, DIGEST_LEN};
use rusqlite::types::Null;
use rusqlite::{params, Connection, OpenFlags};
use tracing::debug;

/// Value stored per filesystem entry.
///
/// Comparing records follows the mirror rule: directories are equal on
/// type alone, files additionally compare size, mtime, and digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileRecord {
    /// A regular file with its recorded attributes.
    File {
        /// File size in octets.
        size: u64,
        /// Last modification time, in whole seconds since the Unix epoch.
        mtime: i64,
        /// Content fingerprint of the file's bytes.
        digest: Digest,
    },
    /// A directory.
    Dir,
}

const TYPE_FILE: i64 = 0;
const TYPE_DIR: i64 = 1;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS files (
    file TEXT NOT NULL,
    dir TEXT NOT NULL,
    type INTEGER NOT NULL,
    size INTEGER,
    last_modified INTEGER,
    digest BLOB,
    PRIMARY KEY (file, dir));
CREATE INDEX IF NOT EXISTS dir_idx ON files (dir);
";

const PUT_SQL: &str = "INSERT OR REPLACE INTO files \
    (file, dir, type, size, last_modified, digest) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
const LIST_SQL: &str =
    "SELECT file, type, size, last_modified, digest FROM files WHERE dir = ?1";
const DIRS_SQL: &str = "SELECT DISTINCT dir FROM files";

/// Error returned by manifest operations.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Opening or initializing the backing file failed.
    #[error("failed to open manifest '{path}': {source}")]
    Open {
        /// Path of the backing file.
        path: String,
        /// Underlying engine diagnostic.
        source: rusqlite::Error,
    },
    /// A mutation or transaction statement failed.
    #[error("manifest write failed: {0}")]
    Write(#[source] rusqlite::Error),
    /// A query failed.
    #[error("manifest read failed: {0}")]
    Read(#[source] rusqlite::Error),
    /// Closing the connection failed.
    #[error("failed to close manifest: {0}")]
    Close(#[source] rusqlite::Error),
    /// A row violates the record invariants.
    #[error("manifest row for '{dir}'/'{file}' is malformed: {reason}")]
    Corrupt {
        /// Directory key of the offending row.
        dir: String,
        /// File key of the offending row.
        file: String,
        /// What was wrong with the row.
        reason: &'static str,
    },
}

/// Transactional store of [`FileRecord`]s keyed by `(dir, file)`.
///
/// The manifest exclusively owns its connection and prepared statements.
/// It is not safe for concurrent use from multiple threads and offers no
/// sharing contract.
#[derive(Debug)]
pub struct Manifest {
    conn: Connection,
}

impl Manifest {
    /// Opens the store, creating the backing file and schema if `create`
    /// is set.
    pub fn open(path: &Path, create: bool) -> Result<Self, ManifestError> {
        let open_error = |source| ManifestError::Open {
            path: path.display().to_string(),
            source,
        };

        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if create {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        debug!("opening manifest '{}'", path.display());
        let conn = Connection::open_with_flags(path, flags).map_err(open_error)?;
        conn.busy_timeout(Duration::from_secs(10)).map_err(open_error)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(open_error)?;
        conn.execute_batch(SCHEMA).map_err(open_error)?;

        Ok(Self { conn })
    }

    /// Starts the surrounding transaction. Nesting is not supported.
    pub fn begin(&self) -> Result<(), ManifestError> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(ManifestError::Write)
    }

    /// Makes every mutation since [`begin`](Manifest::begin) durable.
    pub fn commit(&self) -> Result<(), ManifestError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(ManifestError::Write)
    }

    /// Reverts every mutation since [`begin`](Manifest::begin).
    pub fn rollback(&self) -> Result<(), ManifestError> {
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(ManifestError::Write)
    }

    /// Inserts or replaces the record stored under `(dir, file)`.
    pub fn put(&self, dir: &str, file: &str, record: &FileRecord) -> Result<(), ManifestError> {
        let mut statement = self
            .conn
            .prepare_cached(PUT_SQL)
            .map_err(ManifestError::Write)?;
        match record {
            FileRecord::File {
                size,
                mtime,
                digest,
            } => statement.execute(params![
                file,
                dir,
                TYPE_FILE,
                i64::try_from(*size).unwrap_or(i64::MAX),
                mtime,
                &digest[..],
            ]),
            FileRecord::Dir => {
                statement.execute(params![file, dir, TYPE_DIR, Null, Null, Null])
            }
        }
        .map_err(ManifestError::Write)?;
        Ok(())
    }

    /// Returns the children of `dir` as a flat name-to-record mapping.
    ///
    /// Subdirectories appear as [`FileRecord::Dir`] rows; an empty result
    /// is valid.
    pub fn list(&self, dir: &str) -> Result<HashMap<String, FileRecord>, ManifestError> {
        let mut statement = self
            .conn
            .prepare_cached(LIST_SQL)
            .map_err(ManifestError::Read)?;
        let mut rows = statement.query([dir]).map_err(ManifestError::Read)?;

        let mut children = HashMap::new();
        while let Some(row) = rows.next().map_err(ManifestError::Read)? {
            let file: String = row.get(0).map_err(ManifestError::Read)?;
            let record = decode_record(dir, &file, row)?;
            children.insert(file, record);
        }
        Ok(children)
    }

    /// Returns the distinct directory keys across all rows.
    pub fn dirs(&self) -> Result<HashSet<String>, ManifestError> {
        let mut statement = self
            .conn
            .prepare_cached(DIRS_SQL)
            .map_err(ManifestError::Read)?;
        let rows = statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(ManifestError::Read)?;

        let mut dirs = HashSet::new();
        for dir in rows {
            dirs.insert(dir.map_err(ManifestError::Read)?);
        }
        Ok(dirs)
    }

    /// Finalizes all prepared statements and releases the connection.
    pub fn close(self) -> Result<(), ManifestError> {
        self.conn
            .close()
            .map_err(|(_conn, error)| ManifestError::Close(error))
    }
}

fn decode_record(
    dir: &str,
    file: &str,
    row: &rusqlite::Row<'_>,
) -> Result<FileRecord, ManifestError> {
    let corrupt = |reason| ManifestError::Corrupt {
        dir: dir.to_owned(),
        file: file.to_owned(),
        reason,
    };

    let kind: i64 = row.get(1).map_err(ManifestError::Read)?;
    match kind {
        TYPE_DIR => Ok(FileRecord::Dir),
        TYPE_FILE => {
            let size: Option<i64> = row.get(2).map_err(ManifestError::Read)?;
            let mtime: Option<i64> = row.get(3).map_err(ManifestError::Read)?;
            let digest: Option<Vec<u8>> = row.get(4).map_err(ManifestError::Read)?;

            let size = size.ok_or_else(|| corrupt("file row without size"))?;
            let mtime = mtime.ok_or_else(|| corrupt("file row without last_modified"))?;
            let digest = digest.ok_or_else(|| corrupt("file row without digest"))?;
            let digest: Digest = digest
                .try_into()
                .map_err(|_| corrupt("digest is not 8 octets"))?;

            Ok(FileRecord::File {
                size: u64::try_from(size).map_err(|_| corrupt("negative size"))?,
                mtime,
                digest,
            })
        }
        _ => Err(corrupt("unknown entry type")),
    }
}
