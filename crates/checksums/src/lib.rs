#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Content fingerprint primitives for the mirror manifest.
//!
//! The manifest stores one fixed-width fingerprint per regular file and
//! compares it octet-wise, so the only requirement on the function is that
//! it stays fixed for the lifetime of a manifest. The crate wraps XXH64
//! (seed 0) behind a streaming interface and exposes the 8-octet
//! little-endian digest the store persists.

use std::io;
use std::io::Read;

/// Length of a content fingerprint in octets.
pub const DIGEST_LEN: usize = 8;

/// A finalized content fingerprint.
pub type Digest = [u8; DIGEST_LEN];

/// Chunk size used when fingerprinting a stream.
pub const READ_CHUNK: usize = 4096;

/// Streaming XXH64 hasher producing the manifest fingerprint.
#[derive(Clone)]
pub struct ContentHasher {
    inner: xxhash_rust::xxh64::Xxh64,
}

impl ContentHasher {
    /// Creates a hasher with an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: xxhash_rust::xxh64::Xxh64::new(0),
        }
    }

    /// Feeds additional bytes into the digest state.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalises the digest and returns the little-endian XXH64 output.
    #[must_use]
    pub fn finalize(self) -> Digest {
        self.inner.digest().to_le_bytes()
    }

    /// Convenience helper that fingerprints `data` in one shot.
    #[must_use]
    pub fn digest(data: &[u8]) -> Digest {
        xxhash_rust::xxh64::xxh64(data, 0).to_le_bytes()
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprints everything `reader` yields, in [`READ_CHUNK`] chunks.
///
/// The first read error aborts the computation; there is no partial
/// result to recover.
pub fn digest_reader<R: Read>(reader: &mut R) -> io::Result<Digest> {
    let mut hasher = ContentHasher::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
    Ok(hasher.finalize())
}
