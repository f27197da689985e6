use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::store::backup::BackupError;
use crate::store::fingerprint::Fingerprint;
use crate::writer::WriteError;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    AlreadyInitialized,
    TaskNotFound,
    AgentNotFound,
    AlreadyClaimed,
    NotClaimant,
    InvalidStateTransition,
    CycleDetected,
    HasDependents,
    UnknownReference,
    InvalidInput,
    WriteConflict,
    BackupNotFound,
    BackupCorrupt,
    ReadFailed,
    TempWriteFailed,
    RenameFailed,
    BackupWriteFailed,
    SerializeFailed,
    InvalidEncoding,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::AlreadyInitialized => "E1003",
            Self::TaskNotFound => "E2001",
            Self::AgentNotFound => "E2002",
            Self::AlreadyClaimed => "E2003",
            Self::NotClaimant => "E2004",
            Self::InvalidStateTransition => "E2005",
            Self::CycleDetected => "E2006",
            Self::HasDependents => "E2007",
            Self::UnknownReference => "E2008",
            Self::InvalidInput => "E2009",
            Self::WriteConflict => "E3001",
            Self::BackupNotFound => "E4001",
            Self::BackupCorrupt => "E4002",
            Self::ReadFailed => "E5001",
            Self::TempWriteFailed => "E5002",
            Self::RenameFailed => "E5003",
            Self::BackupWriteFailed => "E5004",
            Self::SerializeFailed => "E5005",
            Self::InvalidEncoding => "E5006",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Ledger not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::AlreadyInitialized => "Ledger already exists",
            Self::TaskNotFound => "Task not found",
            Self::AgentNotFound => "Agent not found",
            Self::AlreadyClaimed => "Task already claimed",
            Self::NotClaimant => "Task not claimed by this agent",
            Self::InvalidStateTransition => "Invalid state transition",
            Self::CycleDetected => "Dependency cycle would be created",
            Self::HasDependents => "Task has dependents",
            Self::UnknownReference => "Reference to unknown task",
            Self::InvalidInput => "Invalid input",
            Self::WriteConflict => "Ledger changed since it was read",
            Self::BackupNotFound => "Backup not found",
            Self::BackupCorrupt => "Backup failed integrity check",
            Self::ReadFailed => "Ledger read failed",
            Self::TempWriteFailed => "Temporary file write failed",
            Self::RenameFailed => "Atomic rename failed",
            Self::BackupWriteFailed => "Backup write failed",
            Self::SerializeFailed => "Ledger serialization failed",
            Self::InvalidEncoding => "Ledger is not valid UTF-8",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `tally init` to create the ledger."),
            Self::ConfigParseError => Some("Fix syntax in .tally/config.toml and retry."),
            Self::AlreadyInitialized => Some("Use the existing ledger or point --file elsewhere."),
            Self::TaskNotFound | Self::AgentNotFound => None,
            Self::AlreadyClaimed => Some("Wait for the claimant to release the task."),
            Self::NotClaimant => Some("Only the agent holding the claim can release it."),
            Self::InvalidStateTransition => {
                Some("Reopen a done task before claiming or editing its status.")
            }
            Self::CycleDetected => Some("Remove or adjust depends_on links to keep the graph acyclic."),
            Self::HasDependents => Some("Edit the dependents first or pass --force."),
            Self::UnknownReference => Some("Create the referenced task first."),
            Self::InvalidInput => None,
            Self::WriteConflict => Some("Re-read the ledger and retry the operation."),
            Self::BackupNotFound => Some("Run `tally backup list` to see available snapshots."),
            Self::BackupCorrupt => Some("Pick an older snapshot; this one no longer matches its hash."),
            Self::ReadFailed | Self::TempWriteFailed | Self::BackupWriteFailed => {
                Some("Check disk space and write permissions.")
            }
            Self::RenameFailed => {
                Some("Inspect the ledger file by hand; restore from backup if it is damaged.")
            }
            Self::SerializeFailed => Some("Retry once. If persistent, report a bug with logs."),
            Self::InvalidEncoding => {
                Some("Re-save the ledger as UTF-8 or restore a backup before editing.")
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

/// An operation refused before touching the document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    #[error("task {id} not found")]
    TaskNotFound { id: String },

    #[error("agent {name} not found")]
    AgentNotFound { name: String },

    #[error("task {id} is already claimed by {by}")]
    AlreadyClaimed { id: String, by: String },

    #[error("task {id} is not claimed")]
    NotClaimed { id: String },

    #[error("task {id} is claimed by {by}, not {actor}")]
    ClaimedByOther { id: String, by: String, actor: String },

    #[error("task {id} is already done")]
    AlreadyDone { id: String },

    #[error("task {id} is not done")]
    NotDone { id: String },

    #[error("task {id} has dependents: {}", dependents.join(", "))]
    HasDependents { id: String, dependents: Vec<String> },

    #[error("task {id} is actively claimed by {by}")]
    ActiveClaim { id: String, by: String },

    #[error("task {id} references unknown task {reference}")]
    UnknownReference { id: String, reference: String },

    #[error("{0}")]
    CycleDetected(String),

    #[error("title must not be empty")]
    EmptyTitle,

    #[error("comment on {id} must not be empty")]
    EmptyComment { id: String },

    #[error("nothing to change on {id}")]
    NothingToChange { id: String },

    #[error("task {id} has no deliverable named {name}")]
    DeliverableNotFound { id: String, name: String },

    #[error("actor must not be empty")]
    EmptyActor,

    #[error("{field} must be a finite, non-negative number of hours")]
    InvalidHours { field: String },

    #[error("no more {prefix} ids can be minted")]
    IdSpaceExhausted { prefix: String },
}

impl PreconditionError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::TaskNotFound { .. } | Self::DeliverableNotFound { .. } => ErrorCode::TaskNotFound,
            Self::AgentNotFound { .. } => ErrorCode::AgentNotFound,
            Self::AlreadyClaimed { .. } | Self::ActiveClaim { .. } => ErrorCode::AlreadyClaimed,
            Self::NotClaimed { .. } | Self::ClaimedByOther { .. } => ErrorCode::NotClaimant,
            Self::AlreadyDone { .. } | Self::NotDone { .. } => ErrorCode::InvalidStateTransition,
            Self::HasDependents { .. } => ErrorCode::HasDependents,
            Self::UnknownReference { .. } => ErrorCode::UnknownReference,
            Self::CycleDetected(_) => ErrorCode::CycleDetected,
            Self::EmptyTitle
            | Self::EmptyComment { .. }
            | Self::NothingToChange { .. }
            | Self::EmptyActor
            | Self::InvalidHours { .. }
            | Self::IdSpaceExhausted { .. } => ErrorCode::InvalidInput,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger I/O
// ---------------------------------------------------------------------------

/// Where in the read/write cycle an I/O failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    Read,
    TempWrite,
    Rename,
    Backup,
}

impl WriteStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::TempWrite => "temp_write",
            Self::Rename => "rename",
            Self::Backup => "backup",
        }
    }
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is known about the ledger file after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    /// The original bytes are still in place.
    Intact,
    /// The failure happened at the replace step; inspect the file.
    Unknown,
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Intact => "intact",
            Self::Unknown => "unknown",
        })
    }
}

/// Errors surfaced by the mutator and the ledger store.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("{} changed since it was read (expected {expected}, found {})", path.display(), describe(actual.as_deref()))]
    Conflict {
        path: PathBuf,
        expected: Box<Fingerprint>,
        actual: Option<Box<Fingerprint>>,
    },

    #[error("{stage} failed for {} (original {integrity}): {source}", path.display())]
    Io {
        path: PathBuf,
        stage: WriteStage,
        integrity: Integrity,
        #[source]
        source: io::Error,
    },

    #[error("no ledger at {}", path.display())]
    NotInitialized { path: PathBuf },

    #[error("ledger already exists at {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Serialize(#[from] WriteError),

    #[error("config error: {0}")]
    Config(String),

    #[error("{} is not valid UTF-8 (first bad byte at offset {offset}); refusing to rewrite it", path.display())]
    InvalidEncoding { path: PathBuf, offset: usize },
}

fn describe(actual: Option<&Fingerprint>) -> String {
    actual.map_or_else(|| "no file".to_string(), ToString::to_string)
}

impl LedgerError {
    pub(crate) fn io(path: &std::path::Path, stage: WriteStage, source: io::Error) -> Self {
        let integrity = if stage == WriteStage::Rename {
            Integrity::Unknown
        } else {
            Integrity::Intact
        };
        Self::Io {
            path: path.to_path_buf(),
            stage,
            integrity,
            source,
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Precondition(e) => e.code(),
            Self::Conflict { .. } => ErrorCode::WriteConflict,
            Self::Io { stage, .. } => match stage {
                WriteStage::Read => ErrorCode::ReadFailed,
                WriteStage::TempWrite => ErrorCode::TempWriteFailed,
                WriteStage::Rename => ErrorCode::RenameFailed,
                WriteStage::Backup => ErrorCode::BackupWriteFailed,
            },
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::AlreadyExists { .. } => ErrorCode::AlreadyInitialized,
            Self::Backup(e) => e.code(),
            Self::Serialize(_) => ErrorCode::SerializeFailed,
            Self::Config(_) => ErrorCode::ConfigParseError,
            Self::InvalidEncoding { .. } => ErrorCode::InvalidEncoding,
        }
    }

    /// Only a failed replace step leaves the file in a state someone should look at.
    #[must_use]
    pub const fn requires_attention(&self) -> bool {
        matches!(
            self,
            Self::Io {
                stage: WriteStage::Rename,
                ..
            }
        )
    }

    /// Safe to re-read and try again.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;

    const ALL: [ErrorCode; 21] = [
        ErrorCode::NotInitialized,
        ErrorCode::ConfigParseError,
        ErrorCode::AlreadyInitialized,
        ErrorCode::TaskNotFound,
        ErrorCode::AgentNotFound,
        ErrorCode::AlreadyClaimed,
        ErrorCode::NotClaimant,
        ErrorCode::InvalidStateTransition,
        ErrorCode::CycleDetected,
        ErrorCode::HasDependents,
        ErrorCode::UnknownReference,
        ErrorCode::InvalidInput,
        ErrorCode::WriteConflict,
        ErrorCode::BackupNotFound,
        ErrorCode::BackupCorrupt,
        ErrorCode::ReadFailed,
        ErrorCode::TempWriteFailed,
        ErrorCode::RenameFailed,
        ErrorCode::BackupWriteFailed,
        ErrorCode::SerializeFailed,
        ErrorCode::InvalidEncoding,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let code = code.code();
            assert_eq!(code.len(), 5);
            assert!(code.starts_with('E'));
            assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn only_rename_failures_need_attention() {
        let path = Path::new("TASKS.md");
        let temp = LedgerError::io(path, WriteStage::TempWrite, io::Error::other("disk full"));
        let rename = LedgerError::io(path, WriteStage::Rename, io::Error::other("EXDEV"));
        assert!(!temp.requires_attention());
        assert!(rename.requires_attention());
        assert!(matches!(temp, LedgerError::Io { integrity: Integrity::Intact, .. }));
        assert!(matches!(rename, LedgerError::Io { integrity: Integrity::Unknown, .. }));
        assert_eq!(rename.code(), ErrorCode::RenameFailed);
    }

    #[test]
    fn precondition_messages_carry_context() {
        let err = PreconditionError::AlreadyClaimed {
            id: "TASK-001".into(),
            by: "@bob".into(),
        };
        assert_eq!(err.to_string(), "task TASK-001 is already claimed by @bob");
        assert_eq!(LedgerError::from(err).code(), ErrorCode::AlreadyClaimed);
    }
}
