//! Everything that touches the filesystem.
//!
//! - [`fingerprint`]: size + content hash used to detect concurrent edits.
//! - [`atomic`]: temp-file-and-rename replacement.
//! - [`backup`]: timestamped, hash-verified snapshots with retention.
//! - [`ledger`]: the read → apply → write cycle built from the three above.

pub mod atomic;
pub mod backup;
pub mod fingerprint;
pub mod ledger;

pub use atomic::{write_atomic, write_atomic_with_hook};
pub use backup::{BackupEntry, BackupError, BackupStore};
pub use fingerprint::{Drift, Fingerprint, check_unchanged, content_hash};
pub use ledger::{
    Ledger, LedgerOptions, Snapshot, read_document_with_fingerprint, write_document_atomic,
};
