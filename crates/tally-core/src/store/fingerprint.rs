//! Optimistic file fingerprints.
//!
//! A [`Fingerprint`] is captured at read time and compared against the file
//! on disk right before a write. Size is compared first since it needs only
//! a `stat`; when sizes agree the BLAKE3 content hash decides. Modification
//! time is recorded for display and logging but never decides a match on its
//! own, since coarse mtime granularity lets two writes share a timestamp.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Snapshot of a file's identity at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub modified: Option<SystemTime>,
    pub len: u64,
    /// `blake3:<hex>` of the full contents. Empty when only `stat` was needed.
    pub hash: String,
}

impl Fingerprint {
    /// Fingerprint of in-memory bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8], modified: Option<SystemTime>) -> Self {
        Self {
            modified,
            len: bytes.len() as u64,
            hash: content_hash(bytes),
        }
    }

    /// Read and fingerprint `path`. `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns any I/O error other than not-found.
    pub fn capture(path: &Path) -> io::Result<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => {
                let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
                Ok(Some(Self::of_bytes(&bytes, modified)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Same size and same content hash.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.len == other.len && self.hash == other.hash
    }

    /// First eight hex digits of the content hash.
    #[must_use]
    pub fn short_hash(&self) -> &str {
        let hex = self.hash.strip_prefix("blake3:").unwrap_or(&self.hash);
        &hex[..hex.len().min(8)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hash.is_empty() {
            write!(f, "{} bytes", self.len)
        } else {
            write!(f, "{} bytes, {}", self.len, self.short_hash())
        }
    }
}

/// `blake3:<hex>` digest used for fingerprints and backup manifests.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(bytes).to_hex())
}

/// How the file on disk relates to an expected fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    Unchanged,
    Changed(Fingerprint),
    Missing,
}

/// Compare `expected` with what is on disk now.
///
/// The hash is only computed when the sizes agree.
///
/// # Errors
///
/// Propagates I/O errors from `stat` or `read`.
pub fn check_unchanged(path: &Path, expected: &Fingerprint) -> io::Result<Drift> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Drift::Missing),
        Err(e) => return Err(e),
    };
    if meta.len() != expected.len {
        let modified = meta.modified().ok();
        return Ok(Drift::Changed(Fingerprint {
            modified,
            len: meta.len(),
            hash: String::new(),
        }));
    }
    Ok(match Fingerprint::capture(path)? {
        Some(current) if current.matches(expected) => Drift::Unchanged,
        Some(current) => Drift::Changed(current),
        None => Drift::Missing,
    })
}
