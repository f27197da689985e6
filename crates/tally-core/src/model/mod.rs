//! In-memory ledger entities. No I/O happens here.

pub mod agent;
pub mod document;
pub mod task;

pub use agent::{Agent, AgentKind, AgentStatus, TrustLevel, normalize_agent_name};
pub use document::{DEFAULT_ID_PREFIX, Document, ProjectMeta, SCHEMA_VERSION};
pub use task::{Deliverable, History, HistoryEntry, Priority, Status, Task};
