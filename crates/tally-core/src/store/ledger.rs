//! The concurrency-safe read/modify/write cycle.
//!
//! ```text
//! ACQUIRE_READ → PRECONDITION_CHECK → APPLY → WRITE_ATOMIC → DONE
//!                      │                          │
//!                   FAILED                     CONFLICT
//! ```
//!
//! Every mutation re-reads the ledger, captures a [`Fingerprint`], runs one
//! operation from [`crate::ops`] on the parsed document, and writes the
//! result through [`write_atomic`]. Before the rename the on-disk file is
//! compared against the fingerprint; a mismatch is a
//! [`LedgerError::Conflict`] and nothing is written.
//!
//! There is no lock. If another process renames its own write into place in
//! the instant between our check and our rename, the later rename wins.
//! The fingerprint check narrows that window to a `stat` + hash; it does not
//! close it.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::atomic::write_atomic;
use super::backup::{BackupEntry, BackupStore};
use super::fingerprint::{Drift, Fingerprint, check_unchanged};
use crate::config::ProjectConfig;
use crate::error::{LedgerError, PreconditionError, WriteStage};
use crate::model::{Agent, Document, Task};
use crate::ops::{self, AgentUpdate, NewTask, TaskEdit};
use crate::parse::{IssueKind, ParseIssue, parse_document};
use crate::validate::validate_document;
use crate::writer::serialize_document;

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// A parsed ledger plus the fingerprint of the bytes it came from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub document: Document,
    pub issues: Vec<ParseIssue>,
    pub fingerprint: Fingerprint,
    /// Raw bytes as read, kept for backups.
    pub bytes: Vec<u8>,
    /// Offset of the first byte that is not UTF-8, if any.
    pub invalid_utf8_at: Option<usize>,
}

impl Snapshot {
    /// Refuse to rewrite a ledger whose bytes were not all decodable.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidEncoding`] when the read replaced bytes.
    pub fn ensure_writable(&self, path: &Path) -> Result<(), LedgerError> {
        match self.invalid_utf8_at {
            Some(offset) => Err(LedgerError::InvalidEncoding {
                path: path.to_path_buf(),
                offset,
            }),
            None => Ok(()),
        }
    }
}

/// Read and parse `path`, fingerprinting the exact bytes parsed.
///
/// # Errors
///
/// [`LedgerError::NotInitialized`] if the file does not exist, or a
/// read-stage [`LedgerError::Io`].
pub fn read_document_with_fingerprint(path: &Path) -> Result<Snapshot, LedgerError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(LedgerError::NotInitialized {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(LedgerError::io(path, WriteStage::Read, e)),
    };
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
    let fingerprint = Fingerprint::of_bytes(&bytes, modified);

    let (text, invalid_utf8_at) = match std::str::from_utf8(&bytes) {
        Ok(text) => (Cow::Borrowed(text), None),
        Err(e) => (String::from_utf8_lossy(&bytes), Some(e.valid_up_to())),
    };
    let (document, mut issues) = parse_document(&text);
    if let Some(offset) = invalid_utf8_at {
        tracing::warn!(path = %path.display(), offset, "ledger is not valid UTF-8");
        issues.insert(
            0,
            ParseIssue::new(
                IssueKind::Encoding,
                format!("bytes from offset {offset} are not UTF-8 and were replaced"),
            )
            .lossy(),
        );
    }
    tracing::debug!(
        path = %path.display(),
        tasks = document.tasks.len(),
        issues = issues.len(),
        fingerprint = %fingerprint,
        "read ledger"
    );
    Ok(Snapshot {
        document,
        issues,
        fingerprint,
        bytes,
        invalid_utf8_at,
    })
}

/// Serialize `doc` and atomically replace `path` with it.
///
/// With `expected`, the file on disk must still match that fingerprint (a
/// missing file counts as changed). Without it the write is unconditional.
/// Returns the fingerprint of what was written.
///
/// # Errors
///
/// [`LedgerError::Conflict`] on a fingerprint mismatch, or a
/// serialization / I/O error.
pub fn write_document_atomic(
    doc: &Document,
    path: &Path,
    expected: Option<&Fingerprint>,
) -> Result<Fingerprint, LedgerError> {
    let text = serialize_document(doc)?;

    if let Some(expected) = expected {
        let drift =
            check_unchanged(path, expected).map_err(|e| LedgerError::io(path, WriteStage::Read, e))?;
        let actual = match drift {
            Drift::Unchanged => None,
            Drift::Changed(current) => Some(Some(current)),
            Drift::Missing => Some(None),
        };
        if let Some(actual) = actual {
            tracing::warn!(
                path = %path.display(),
                expected = %expected,
                actual = ?actual.as_ref().map(ToString::to_string),
                "ledger changed since read; refusing to write"
            );
            return Err(LedgerError::Conflict {
                path: path.to_path_buf(),
                expected: Box::new(expected.clone()),
                actual: actual.map(Box::new),
            });
        }
    }

    write_atomic(path, text.as_bytes())?;
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
    let written = Fingerprint::of_bytes(text.as_bytes(), modified);
    tracing::info!(path = %path.display(), fingerprint = %written, "wrote ledger");
    Ok(written)
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Knobs for a [`Ledger`], usually taken from [`ProjectConfig`].
#[derive(Debug, Clone)]
pub struct LedgerOptions {
    pub check_fingerprint: bool,
    pub validate: bool,
    pub backup_dir: Option<PathBuf>,
    pub retention: usize,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self::from(&ProjectConfig::default())
    }
}

impl From<&ProjectConfig> for LedgerOptions {
    fn from(config: &ProjectConfig) -> Self {
        Self {
            check_fingerprint: config.write.check_fingerprint,
            validate: config.write.validate,
            backup_dir: config.backup.dir.clone(),
            retention: config.backup.retention,
        }
    }
}

/// Whether a mutation snapshots the file before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Safety {
    Plain,
    BackupFirst(&'static str),
}

/// Handle to one ledger file and its backup directory.
///
/// Not reentrant: run one mutation at a time per handle.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    options: LedgerOptions,
    backups: BackupStore,
}

impl Ledger {
    #[must_use]
    pub fn open(path: impl Into<PathBuf>, options: LedgerOptions) -> Self {
        let path = path.into();
        let backups = BackupStore::for_ledger(&path, options.backup_dir.as_deref(), options.retention);
        Self {
            path,
            options,
            backups,
        }
    }

    /// Open the ledger configured for `project_root`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Config`] if `.tally/config.toml` cannot be loaded.
    pub fn from_project(project_root: &Path) -> Result<Self, LedgerError> {
        let config = crate::config::load_project_config(project_root)
            .map_err(|e| LedgerError::Config(format!("{e:#}")))?;
        Ok(Self::open(config.ledger_path(project_root), LedgerOptions::from(&config)))
    }

    /// Write a fresh, empty ledger. Refuses to overwrite an existing file.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AlreadyExists`] or an I/O error.
    pub fn init(&self, project: &str, id_prefix: &str, now: DateTime<Utc>) -> Result<Document, LedgerError> {
        if self.path.exists() {
            return Err(LedgerError::AlreadyExists {
                path: self.path.clone(),
            });
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(&self.path, WriteStage::TempWrite, e))?;
        }
        let mut doc = Document::new(project, now);
        doc.meta.id_prefix = id_prefix.to_string();
        write_document_atomic(&doc, &self.path, None)?;
        Ok(doc)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn backups(&self) -> &BackupStore {
        &self.backups
    }

    #[must_use]
    pub const fn options(&self) -> &LedgerOptions {
        &self.options
    }

    /// Read the current state.
    ///
    /// # Errors
    ///
    /// See [`read_document_with_fingerprint`].
    pub fn read(&self) -> Result<Snapshot, LedgerError> {
        read_document_with_fingerprint(&self.path)
    }

    /// Write a document previously obtained from [`Ledger::read`].
    ///
    /// # Errors
    ///
    /// See [`write_document_atomic`].
    pub fn write(&self, doc: &Document, expected: &Fingerprint) -> Result<Fingerprint, LedgerError> {
        let expected = self.options.check_fingerprint.then_some(expected);
        write_document_atomic(doc, &self.path, expected)
    }

    /// Run one read/apply/write cycle.
    ///
    /// `apply` receives the freshly read document and the cycle's timestamp.
    /// A precondition error aborts before anything is written.
    ///
    /// # Errors
    ///
    /// Precondition, conflict, backup, serialization or I/O errors.
    pub fn mutate<T, F>(&self, apply: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Document, DateTime<Utc>) -> Result<T, PreconditionError>,
    {
        self.cycle(Safety::Plain, apply)
    }

    /// [`Ledger::mutate`] that re-reads and re-applies on conflict, up to
    /// `attempts` tries in total.
    ///
    /// # Errors
    ///
    /// The last conflict once attempts run out, or the first other error.
    pub fn mutate_with_retry<T, F>(&self, attempts: usize, mut apply: F) -> Result<T, LedgerError>
    where
        F: FnMut(&mut Document, DateTime<Utc>) -> Result<T, PreconditionError>,
    {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.cycle(Safety::Plain, &mut apply) {
                Err(err) if err.is_conflict() && attempt < attempts => {
                    tracing::warn!(attempt, attempts, "write conflict; retrying against fresh state");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn cycle<T, F>(&self, safety: Safety, apply: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Document, DateTime<Utc>) -> Result<T, PreconditionError>,
    {
        let snapshot = self.read()?;
        snapshot.ensure_writable(&self.path)?;
        let Snapshot {
            mut document,
            fingerprint,
            bytes,
            ..
        } = snapshot;
        let now = Utc::now();

        let value = apply(&mut document, now)?;
        if let Some(previous) = document.raise_next_id() {
            tracing::debug!(from = previous, to = document.meta.next_id, "raised next_id");
        }

        if self.options.validate {
            let report = validate_document(&document);
            for finding in &report.errors {
                tracing::warn!(kind = finding.kind.as_str(), "{finding}");
            }
        }

        if let Safety::BackupFirst(reason) = safety {
            self.backups.snapshot(&bytes, reason, now)?;
        }

        self.write(&document, &fingerprint)?;
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// See [`ops::create_task`] and [`Ledger::mutate`].
    pub fn create_task(&self, new: NewTask, actor: &str) -> Result<String, LedgerError> {
        self.mutate(|doc, now| ops::create_task(doc, new, actor, now))
    }

    /// # Errors
    ///
    /// See [`ops::claim_task`] and [`Ledger::mutate`].
    pub fn claim_task(&self, id: &str, actor: &str) -> Result<(), LedgerError> {
        self.mutate(|doc, now| ops::claim_task(doc, id, actor, now))
    }

    /// # Errors
    ///
    /// See [`ops::release_task`] and [`Ledger::mutate`].
    pub fn release_task(&self, id: &str, actor: &str, note: Option<&str>) -> Result<(), LedgerError> {
        self.mutate(|doc, now| ops::release_task(doc, id, actor, note, now))
    }

    /// Returns the ids unblocked by the completion.
    ///
    /// # Errors
    ///
    /// See [`ops::complete_task`] and [`Ledger::mutate`].
    pub fn complete_task(
        &self,
        id: &str,
        actor: &str,
        note: Option<&str>,
    ) -> Result<Vec<String>, LedgerError> {
        self.mutate(|doc, now| ops::complete_task(doc, id, actor, note, now))
    }

    /// # Errors
    ///
    /// See [`ops::edit_task`] and [`Ledger::mutate`].
    pub fn edit_task(&self, id: &str, edit: TaskEdit, actor: &str) -> Result<(), LedgerError> {
        self.mutate(|doc, now| ops::edit_task(doc, id, edit, actor, now))
    }

    /// # Errors
    ///
    /// See [`ops::reopen_task`] and [`Ledger::mutate`].
    pub fn reopen_task(&self, id: &str, actor: &str, reason: Option<&str>) -> Result<(), LedgerError> {
        self.mutate(|doc, now| ops::reopen_task(doc, id, actor, reason, now))
    }

    /// Snapshots the file first.
    ///
    /// # Errors
    ///
    /// See [`ops::delete_task`] and [`Ledger::mutate`].
    pub fn delete_task(&self, id: &str, actor: &str, force: bool) -> Result<Task, LedgerError> {
        self.cycle(Safety::BackupFirst("delete"), |doc, now| {
            ops::delete_task(doc, id, actor, force, now)
        })
    }

    /// # Errors
    ///
    /// See [`ops::comment_on_task`] and [`Ledger::mutate`].
    pub fn comment_on_task(&self, id: &str, actor: &str, text: &str) -> Result<(), LedgerError> {
        self.mutate(|doc, now| ops::comment_on_task(doc, id, actor, text, now))
    }

    /// # Errors
    ///
    /// See [`ops::set_deliverable`] and [`Ledger::mutate`].
    pub fn set_deliverable(
        &self,
        id: &str,
        name: &str,
        done: bool,
        actor: &str,
    ) -> Result<(), LedgerError> {
        self.mutate(|doc, now| ops::set_deliverable(doc, id, name, done, actor, now))
    }

    /// Returns `true` when the agent was new.
    ///
    /// # Errors
    ///
    /// See [`ops::register_agent`] and [`Ledger::mutate`].
    pub fn register_agent(&self, agent: Agent) -> Result<bool, LedgerError> {
        self.mutate(|doc, now| ops::register_agent(doc, agent, now))
    }

    /// # Errors
    ///
    /// See [`ops::set_agent_status`] and [`Ledger::mutate`].
    pub fn set_agent_status(&self, name: &str, update: AgentUpdate) -> Result<(), LedgerError> {
        self.mutate(|doc, now| ops::set_agent_status(doc, name, update, now))
    }

    /// Remove finished tasks, snapshotting first. Nothing is written when
    /// there is nothing to archive.
    ///
    /// # Errors
    ///
    /// See [`Ledger::mutate`].
    pub fn archive_completed(&self) -> Result<Vec<Task>, LedgerError> {
        let snapshot = self.read()?;
        let mut trial = snapshot.document;
        if ops::archive_completed(&mut trial, Utc::now()).is_empty() {
            return Ok(Vec::new());
        }
        self.cycle(Safety::BackupFirst("archive"), |doc, now| {
            Ok(ops::archive_completed(doc, now))
        })
    }

    /// Returns `(old, new)` when `next_id` had to move.
    ///
    /// # Errors
    ///
    /// See [`Ledger::mutate`].
    pub fn repair_next_id(&self) -> Result<Option<(u64, u64)>, LedgerError> {
        self.mutate(|doc, now| Ok(ops::repair_next_id(doc, now)))
    }

    // -----------------------------------------------------------------------
    // Backups
    // -----------------------------------------------------------------------

    /// Snapshot the current file on demand.
    ///
    /// # Errors
    ///
    /// Read or backup errors.
    pub fn backup_now(&self, reason: &str) -> Result<BackupEntry, LedgerError> {
        let snapshot = self.read()?;
        Ok(self.backups.snapshot(&snapshot.bytes, reason, Utc::now())?)
    }

    /// Replace the ledger with a verified snapshot.
    ///
    /// Unless `snapshot_first` is false, the current file is itself backed up
    /// first, so a restore can be undone by restoring index `1`.
    ///
    /// # Errors
    ///
    /// [`crate::store::BackupError`] for unknown or corrupt snapshots, or
    /// write errors.
    pub fn restore(&self, selector: &str, snapshot_first: bool) -> Result<BackupEntry, LedgerError> {
        let entry = self.backups.select(selector)?;
        let bytes = self.backups.read_verified(&entry)?;

        if snapshot_first {
            match fs::read(&self.path) {
                Ok(current) => {
                    self.backups.snapshot(&current, "pre-restore", Utc::now())?;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(LedgerError::io(&self.path, WriteStage::Read, e)),
            }
        }

        write_atomic(&self.path, &bytes)?;
        tracing::info!(snapshot = %entry.name, path = %self.path.display(), "restored ledger");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::model::Status;
    use tempfile::TempDir;

    fn ledger(dir: &TempDir) -> Ledger {
        let ledger = Ledger::open(dir.path().join("TASKS.md"), LedgerOptions::default());
        ledger.init("acme", "TASK", Utc::now()).unwrap();
        ledger
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let err = ledger.init("acme", "TASK", Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists { .. }));
    }

    #[test]
    fn missing_file_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("nope.md"), LedgerOptions::default());
        let err = ledger.read().unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotInitialized);
    }

    #[test]
    fn precondition_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let before = fs::read(ledger.path()).unwrap();
        let err = ledger.claim_task("TASK-999", "@alice").unwrap_err();
        assert_eq!(err.code(), ErrorCode::TaskNotFound);
        assert_eq!(fs::read(ledger.path()).unwrap(), before);
    }

    #[test]
    fn mutations_persist() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let id = ledger.create_task(NewTask::titled("Build auth"), "@alice").unwrap();
        ledger.claim_task(&id, "@alice").unwrap();

        let doc = ledger.read().unwrap().document;
        let task = doc.task(&id).unwrap();
        assert_eq!(task.status, Status::InProgress);
        assert_eq!(task.claimed_by.as_deref(), Some("@alice"));
        assert_eq!(doc.meta.next_id, 2);
    }

    #[test]
    fn stale_write_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let stale = ledger.read().unwrap();
        ledger.create_task(NewTask::titled("someone else"), "@bob").unwrap();

        let err = ledger.write(&stale.document, &stale.fingerprint).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(ledger.read().unwrap().document.tasks.len(), 1);
    }

    #[test]
    fn retry_gives_up_after_attempts() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let path = ledger.path().to_path_buf();
        let mut calls = 0;
        let err = ledger
            .mutate_with_retry(3, |doc, _now| {
                calls += 1;
                // Another writer sneaks in after every read.
                let mut current = fs::read_to_string(&path).unwrap();
                current.push_str(&format!("\n<!-- writer {calls} -->\n"));
                fs::write(&path, current).unwrap();
                doc.meta.project = format!("acme-{calls}");
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(calls, 3);
    }

    #[test]
    fn delete_takes_a_backup_and_restore_undoes_it() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let id = ledger.create_task(NewTask::titled("doomed"), "@alice").unwrap();
        let before = fs::read(ledger.path()).unwrap();

        ledger.delete_task(&id, "@alice", false).unwrap();
        assert!(ledger.read().unwrap().document.tasks.is_empty());
        assert_eq!(ledger.backups().list().unwrap().len(), 1);

        ledger.restore("0", true).unwrap();
        assert_eq!(fs::read(ledger.path()).unwrap(), before);
        let backups = ledger.backups().list().unwrap();
        assert_eq!(backups.len(), 2);
        assert!(backups.iter().any(|b| b.reason == "pre-restore"));
    }

    #[test]
    fn archive_without_done_tasks_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        ledger.create_task(NewTask::titled("open"), "@alice").unwrap();
        assert!(ledger.archive_completed().unwrap().is_empty());
        assert!(ledger.backups().list().unwrap().is_empty());
    }

    #[test]
    fn undecodable_bytes_are_reported_and_never_rewritten() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let mut bytes = fs::read(ledger.path()).unwrap();
        bytes.extend_from_slice(b"\nPreamble with a stray byte: \xff\n");
        fs::write(ledger.path(), &bytes).unwrap();

        let snapshot = ledger.read().unwrap();
        assert_eq!(snapshot.issues[0].kind, IssueKind::Encoding);
        assert!(!snapshot.issues[0].recoverable);
        assert!(snapshot.invalid_utf8_at.is_some());

        let err = ledger.create_task(NewTask::titled("x"), "@alice").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidEncoding);
        assert_eq!(fs::read(ledger.path()).unwrap(), bytes);
    }

    #[test]
    fn ids_at_the_top_of_the_range_do_not_break_writes() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let id = ledger.create_task(NewTask::titled("anchor"), "@alice").unwrap();
        let text = fs::read_to_string(ledger.path())
            .unwrap()
            .replace(&id, &format!("TASK-{}", u64::MAX));
        fs::write(ledger.path(), text).unwrap();

        let err = ledger.create_task(NewTask::titled("overflow"), "@alice").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Precondition(PreconditionError::IdSpaceExhausted { .. })
        ));
        ledger
            .comment_on_task(&format!("TASK-{}", u64::MAX), "@alice", "still writable")
            .unwrap();
        assert_eq!(ledger.read().unwrap().document.meta.next_id, u64::MAX);
    }
}
