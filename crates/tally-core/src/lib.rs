//! tally-core: a markdown task ledger shared by humans and bots.
//!
//! The ledger is one file (usually `TASKS.md`): YAML front matter, an
//! `## Agents` table and an `## Tasks` section. Tasks may be written in the
//! strict dialect (a heading plus a fenced YAML block) or the loose freeform
//! one (`**Key:** value` lines). The reader accepts both and never fails; the
//! writer always emits the strict dialect.
//!
//! Layers, bottom up:
//!
//! - [`model`]: plain data types.
//! - [`parse`] / [`writer`]: text ⇄ [`model::Document`].
//! - [`graph`] / [`validate`]: dependency analysis and integrity checks.
//! - [`ops`]: in-memory operations with precondition checks.
//! - [`store`]: fingerprinted reads, atomic writes and backups.
//!
//! # Conventions
//!
//! - **Errors**: typed errors ([`error::LedgerError`], [`error::PreconditionError`])
//!   inside the library; `anyhow::Result` only for config loading and in the CLI.
//! - **Logging**: `tracing` macros. Mutations log at `info!`, conflicts and
//!   pruning at `warn!`, reads at `debug!`.

pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod ops;
pub mod parse;
pub mod store;
pub mod validate;
pub mod writer;

pub use error::{ErrorCode, LedgerError, PreconditionError};
pub use model::{Agent, Document, Status, Task};
pub use parse::parse_document;
pub use store::{Ledger, LedgerOptions};
pub use validate::{ValidationReport, validate_document};
pub use writer::serialize_document;
