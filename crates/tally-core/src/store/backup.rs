//! Rotating snapshots of the ledger file.
//!
//! Each snapshot is a byte copy named `<timestamp>_<hash8>.md` plus a small
//! `.manifest` sidecar recording when it was taken, its size, its BLAKE3
//! hash and why it was taken. The sidecar lets a snapshot be listed and
//! verified without trusting its file name.
//!
//! Snapshots are addressed by relative index (`0` is the most recent) or by
//! a prefix of the timestamp in their name, e.g. `20260301T12`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};

use super::atomic::replace_file;
use super::fingerprint::content_hash;
use crate::error::ErrorCode;
use crate::writer::timestamp;

/// Default backup directory name, created next to the ledger.
pub const DEFAULT_DIR: &str = ".tally-backups";

const MANIFEST_EXT: &str = "manifest";
const NAME_TS_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during backup operations.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// No snapshot matches the selector.
    #[error("no backup matches '{selector}'")]
    NotFound { selector: String },

    /// Snapshot bytes no longer match the recorded hash.
    #[error("backup {name} is corrupt: expected {expected}, found {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Reading or writing the backup directory failed.
    #[error("backup I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BackupError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::BackupNotFound,
            Self::HashMismatch { .. } => ErrorCode::BackupCorrupt,
            Self::Io { .. } => ErrorCode::BackupWriteFailed,
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> BackupError + '_ {
    move |source| BackupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Integrity metadata for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// Snapshot file name (e.g. `"20260301T120000.000Z_1a2b3c4d.md"`).
    pub name: String,
    pub path: PathBuf,
    pub created: DateTime<Utc>,
    pub byte_len: u64,
    /// `blake3:<hex>` of the snapshot contents.
    pub file_hash: String,
    /// Operation that triggered the snapshot (`delete`, `archive`, ...).
    pub reason: String,
}

impl BackupEntry {
    /// Serialize manifest to a human-readable format.
    #[must_use]
    pub fn to_string_repr(&self) -> String {
        format!(
            "snapshot: {}\ncreated: {}\nbyte_len: {}\nfile_hash: {}\nreason: {}\n",
            self.name,
            timestamp(self.created),
            self.byte_len,
            self.file_hash,
            self.reason
        )
    }

    /// Parse a manifest from its string representation.
    ///
    /// Returns `None` if required fields are missing or unparseable.
    #[must_use]
    pub fn from_string_repr(s: &str, dir: &Path) -> Option<Self> {
        let mut name = None;
        let mut created = None;
        let mut byte_len = None;
        let mut file_hash = None;
        let mut reason = String::new();

        for line in s.lines() {
            if let Some(val) = line.strip_prefix("snapshot: ") {
                name = Some(val.to_string());
            } else if let Some(val) = line.strip_prefix("created: ") {
                created = DateTime::parse_from_rfc3339(val)
                    .ok()
                    .map(|ts| ts.with_timezone(&Utc));
            } else if let Some(val) = line.strip_prefix("byte_len: ") {
                byte_len = val.parse().ok();
            } else if let Some(val) = line.strip_prefix("file_hash: ") {
                file_hash = Some(val.to_string());
            } else if let Some(val) = line.strip_prefix("reason: ") {
                reason = val.to_string();
            }
        }

        let name: String = name?;
        Some(Self {
            path: dir.join(&name),
            name,
            created: created?,
            byte_len: byte_len?,
            file_hash: file_hash?,
            reason,
        })
    }

    /// Timestamp portion of the file name.
    #[must_use]
    pub fn stamp(&self) -> &str {
        self.name.split('_').next().unwrap_or(&self.name)
    }

    fn manifest_path(&self) -> PathBuf {
        manifest_path(&self.path)
    }
}

fn manifest_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot.as_os_str().to_owned();
    name.push(".");
    name.push(MANIFEST_EXT);
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// A directory of snapshots with a retention bound.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    retention: usize,
}

impl BackupStore {
    /// Keep at most `retention` snapshots (at least one) in `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            dir: dir.into(),
            retention: retention.max(1),
        }
    }

    /// Store in `dir`, or in [`DEFAULT_DIR`] next to `ledger` when `dir` is `None`.
    ///
    /// A relative `dir` is resolved against the ledger's directory.
    #[must_use]
    pub fn for_ledger(ledger: &Path, dir: Option<&Path>, retention: usize) -> Self {
        let base = ledger.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        let dir = match dir {
            Some(d) if d.is_absolute() => d.to_path_buf(),
            Some(d) => base.join(d),
            None => base.join(DEFAULT_DIR),
        };
        Self::new(dir, retention)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub const fn retention(&self) -> usize {
        self.retention
    }

    /// Save `bytes` as a new snapshot and prune beyond the retention bound.
    ///
    /// # Errors
    ///
    /// [`BackupError::Io`] if the directory or either file cannot be written.
    pub fn snapshot(
        &self,
        bytes: &[u8],
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<BackupEntry, BackupError> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let file_hash = content_hash(bytes);
        let short = file_hash.trim_start_matches("blake3:");
        let name = format!(
            "{}_{}.md",
            now.format(NAME_TS_FORMAT),
            &short[..short.len().min(8)]
        );
        let entry = BackupEntry {
            path: self.dir.join(&name),
            name,
            created: now,
            byte_len: bytes.len() as u64,
            file_hash,
            reason: reason.to_string(),
        };

        replace_file(&entry.path, bytes, |_| Ok(())).map_err(|e| BackupError::Io {
            path: entry.path.clone(),
            source: e.source,
        })?;
        let manifest = entry.manifest_path();
        replace_file(&manifest, entry.to_string_repr().as_bytes(), |_| Ok(())).map_err(|e| {
            BackupError::Io {
                path: manifest.clone(),
                source: e.source,
            }
        })?;

        tracing::info!(
            snapshot = %entry.name,
            bytes = entry.byte_len,
            reason,
            "saved ledger backup"
        );
        self.prune()?;
        Ok(entry)
    }

    /// All snapshots, newest first. A missing directory is an empty list.
    ///
    /// Manifests that do not parse are skipped with a warning.
    ///
    /// # Errors
    ///
    /// [`BackupError::Io`] if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<BackupEntry>, BackupError> {
        let reader = match fs::read_dir(&self.dir) {
            Ok(reader) => reader,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.dir)(e)),
        };

        let mut entries = Vec::new();
        for item in reader {
            let item = item.map_err(io_err(&self.dir))?;
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXT) {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(io_err(&path))?;
            match BackupEntry::from_string_repr(&text, &self.dir) {
                Some(entry) => entries.push(entry),
                None => {
                    tracing::warn!(manifest = %path.display(), "skipping unreadable backup manifest");
                }
            }
        }

        entries.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| b.name.cmp(&a.name)));
        Ok(entries)
    }

    /// Resolve an index (`0` = newest) or timestamp prefix to a snapshot.
    ///
    /// # Errors
    ///
    /// [`BackupError::NotFound`] if nothing matches.
    pub fn select(&self, selector: &str) -> Result<BackupEntry, BackupError> {
        let selector = selector.trim();
        let entries = self.list()?;
        // Short all-digit selectors are indexes; longer ones are dates.
        let index = (selector.len() < 8)
            .then(|| selector.parse::<usize>().ok())
            .flatten();
        let found = if let Some(index) = index {
            entries.into_iter().nth(index)
        } else {
            let wanted = compact_stamp(selector);
            entries
                .into_iter()
                .find(|e| !wanted.is_empty() && e.stamp().starts_with(&wanted))
        };
        found.ok_or_else(|| BackupError::NotFound {
            selector: selector.to_string(),
        })
    }

    /// Read a snapshot and check it against its manifest.
    ///
    /// # Errors
    ///
    /// [`BackupError::HashMismatch`] if the bytes changed, or an I/O error.
    pub fn read_verified(&self, entry: &BackupEntry) -> Result<Vec<u8>, BackupError> {
        let bytes = fs::read(&entry.path).map_err(io_err(&entry.path))?;
        let actual = content_hash(&bytes);
        if actual != entry.file_hash || bytes.len() as u64 != entry.byte_len {
            return Err(BackupError::HashMismatch {
                name: entry.name.clone(),
                expected: entry.file_hash.clone(),
                actual,
            });
        }
        Ok(bytes)
    }

    /// Verify every snapshot; returns the names that failed.
    ///
    /// # Errors
    ///
    /// Only listing errors; per-snapshot failures are collected.
    pub fn verify_all(&self) -> Result<Vec<(String, BackupError)>, BackupError> {
        let mut failures = Vec::new();
        for entry in self.list()? {
            if let Err(err) = self.read_verified(&entry) {
                failures.push((entry.name.clone(), err));
            }
        }
        Ok(failures)
    }

    /// Delete the oldest snapshots beyond the retention bound.
    ///
    /// # Errors
    ///
    /// [`BackupError::Io`] if a file cannot be removed.
    pub fn prune(&self) -> Result<Vec<BackupEntry>, BackupError> {
        let entries = self.list()?;
        let stale: Vec<BackupEntry> = entries.into_iter().skip(self.retention).collect();
        for entry in &stale {
            remove_if_present(&entry.path)?;
            remove_if_present(&entry.manifest_path())?;
        }
        if !stale.is_empty() {
            tracing::warn!(
                removed = stale.len(),
                retention = self.retention,
                "pruned old ledger backups"
            );
        }
        Ok(stale)
    }
}

fn remove_if_present(path: &Path) -> Result<(), BackupError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(io_err(path)(e)),
        _ => Ok(()),
    }
}

/// Accept `2026-03-01T12:00` as well as the compact `20260301T1200` form.
fn compact_stamp(selector: &str) -> String {
    if let Ok(ts) = DateTime::parse_from_rfc3339(selector) {
        return ts.with_timezone(&Utc).format(NAME_TS_FORMAT).to_string();
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(selector, "%Y-%m-%dT%H:%M:%S") {
        return ts.format("%Y%m%dT%H%M%S").to_string();
    }
    selector.chars().filter(|c| !matches!(c, '-' | ':')).collect()
}
