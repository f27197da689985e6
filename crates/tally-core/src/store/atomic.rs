//! Crash-safe file replacement.
//!
//! The new contents go to a uniquely named temp file in the target's
//! directory, are flushed to disk, and then renamed over the target. A reader
//! sees either the old file or the new one, never a prefix of the new one.
//! Any failure before the rename removes the temp file and leaves the target
//! untouched.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{LedgerError, WriteStage};

/// A failed replacement and the step it failed at.
#[derive(Debug)]
pub(crate) struct StageError {
    pub stage: WriteStage,
    pub source: io::Error,
}

impl StageError {
    pub(crate) fn into_ledger(self, path: &Path) -> LedgerError {
        LedgerError::io(path, self.stage, self.source)
    }
}

/// Atomically replace `path` with `bytes`.
///
/// # Errors
///
/// [`LedgerError::Io`] tagged with the failing stage. Temp-write failures
/// leave the original intact; a rename failure is flagged for attention.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    write_atomic_with_hook(path, bytes, |_| Ok(()))
}

/// [`write_atomic`] with a hook that runs after the temp file is durable and
/// before the rename.
///
/// The hook receives the temp path. Returning an error aborts the write as a
/// temp-write failure, which is how callers (and tests) can inspect or veto
/// the staged bytes.
///
/// # Errors
///
/// Same as [`write_atomic`], plus whatever the hook returns.
pub fn write_atomic_with_hook<F>(path: &Path, bytes: &[u8], before_rename: F) -> Result<(), LedgerError>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    replace_file(path, bytes, before_rename).map_err(|e| e.into_ledger(path))
}

pub(crate) fn replace_file<F>(path: &Path, bytes: &[u8], before_rename: F) -> Result<(), StageError>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let tmp = temp_sibling(path);
    let staged = stage(path, &tmp, bytes).and_then(|()| before_rename(&tmp));
    if let Err(source) = staged {
        discard(&tmp);
        return Err(StageError {
            stage: WriteStage::TempWrite,
            source,
        });
    }

    if let Err(source) = fs::rename(&tmp, path) {
        discard(&tmp);
        return Err(StageError {
            stage: WriteStage::Rename,
            source,
        });
    }

    sync_dir(path);
    Ok(())
}

fn stage(target: &Path, tmp: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    if let Ok(meta) = fs::metadata(target) {
        fs::set_permissions(tmp, meta.permissions())?;
    }
    Ok(())
}

fn discard(tmp: &Path) {
    if let Err(err) = fs::remove_file(tmp) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %tmp.display(), error = %err, "failed to remove temp file");
        }
    }
}

/// Flush the rename itself. Not every platform can open a directory, so
/// failures here are ignored.
fn sync_dir(path: &Path) {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }
    }
}

/// `.<name>.<pid>.<nanos>.<seq>.tmp` next to `path`, unique per call.
fn temp_sibling(path: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let name = path
        .file_name()
        .map_or_else(|| "ledger".into(), |n| n.to_string_lossy());
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(
        ".{name}.{}.{nanos}.{seq}.tmp",
        std::process::id()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("TASKS.md");
        fs::write(&path, "old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("TASKS.md");
        write_atomic(&path, b"fresh").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh");
    }

    #[test]
    fn failure_before_rename_keeps_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("TASKS.md");
        fs::write(&path, "original bytes").unwrap();

        let mut staged = None;
        let err = write_atomic_with_hook(&path, b"replacement", |tmp| {
            staged = Some(fs::read(tmp)?);
            Err(io::Error::other("power cut"))
        })
        .unwrap_err();

        assert_eq!(staged.as_deref(), Some(&b"replacement"[..]));
        assert!(matches!(
            err,
            LedgerError::Io {
                stage: WriteStage::TempWrite,
                ..
            }
        ));
        assert!(!err.requires_attention());
        assert_eq!(fs::read(&path).unwrap(), b"original bytes");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn rename_failure_is_flagged() {
        let dir = TempDir::new().unwrap();
        // Renaming a file over a non-empty directory fails on every platform.
        let target = dir.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), "x").unwrap();

        let err = write_atomic(&target, b"data").unwrap_err();
        assert!(err.requires_attention());
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn temp_names_do_not_collide() {
        let path = Path::new("/tmp/TASKS.md");
        assert_ne!(temp_sibling(path), temp_sibling(path));
    }
}
