//! `tally backup` — list, take, verify and restore ledger snapshots.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::io::{self, Write};

use tally_core::LedgerError;
use tally_core::store::BackupEntry;
use tally_core::writer::timestamp;

use super::Context;
use crate::output::{CliError, Renderable, render_error, render_list, render_mode};

#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// List snapshots, newest first.
    List,
    /// Snapshot the ledger now.
    Create(CreateArgs),
    /// Check every snapshot against its recorded hash.
    Verify,
    /// Replace the ledger with a snapshot.
    Restore(RestoreArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Recorded in the snapshot manifest.
    #[arg(long, default_value = "manual")]
    pub reason: String,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Index from `backup list` (0 = newest) or a timestamp prefix
    /// such as `2026-03-01T12:00` or `20260301T1200`.
    pub selector: String,

    /// Skip snapshotting the current ledger before restoring.
    #[arg(long)]
    pub no_snapshot: bool,
}

#[derive(Debug, Serialize)]
struct BackupRow {
    index: usize,
    name: String,
    created: String,
    bytes: u64,
    reason: String,
}

impl BackupRow {
    fn new(index: usize, entry: &BackupEntry) -> Self {
        Self {
            index,
            name: entry.name.clone(),
            created: timestamp(entry.created),
            bytes: entry.byte_len,
            reason: entry.reason.clone(),
        }
    }
}

impl Renderable for BackupRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{:>3}  {}  {:>8} B  {}",
            self.index, self.created, self.bytes, self.reason
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self).map_err(io::Error::other)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}",
            self.index, self.name, self.bytes, self.reason
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["INDEX", "NAME", "BYTES", "REASON"]
    }
}

#[derive(Debug, Serialize)]
struct VerifyResult {
    checked: usize,
    failures: Vec<VerifyFailure>,
}

#[derive(Debug, Serialize)]
struct VerifyFailure {
    name: String,
    error: String,
}

/// Dispatch a `backup` subcommand.
///
/// # Errors
///
/// Backup or ledger errors. `verify` fails when any snapshot is corrupt.
pub fn run_backup(command: &BackupCommand, ctx: &Context) -> Result<()> {
    let ledger = ctx.ledger();
    let store = ledger.backups();
    match command {
        BackupCommand::List => {
            let entries = store.list().map_err(|e| ctx.fail(&LedgerError::from(e)))?;
            let rows: Vec<BackupRow> = entries
                .iter()
                .enumerate()
                .map(|(i, e)| BackupRow::new(i, e))
                .collect();
            render_list(&rows, ctx.output)?;
            Ok(())
        }
        BackupCommand::Create(args) => {
            let entry = ledger.backup_now(&args.reason).map_err(|e| ctx.fail(&e))?;
            let row = BackupRow::new(0, &entry);
            render_mode(
                ctx.output,
                &row,
                |r, w| writeln!(w, "{}", r.name),
                |r, w| writeln!(w, "✓ Saved {}", r.name),
            )
        }
        BackupCommand::Verify => {
            let checked = store.list().map_err(|e| ctx.fail(&LedgerError::from(e)))?.len();
            let failures: Vec<VerifyFailure> = store
                .verify_all()
                .map_err(|e| ctx.fail(&LedgerError::from(e)))?
                .into_iter()
                .map(|(name, err)| VerifyFailure {
                    name,
                    error: err.to_string(),
                })
                .collect();
            let result = VerifyResult { checked, failures };
            render_mode(
                ctx.output,
                &result,
                |r, w| {
                    for f in &r.failures {
                        writeln!(w, "corrupt {}  {}", f.name, f.error)?;
                    }
                    writeln!(w, "checked {} corrupt {}", r.checked, r.failures.len())
                },
                |r, w| {
                    if r.failures.is_empty() {
                        return writeln!(w, "✓ {} snapshot(s) verified", r.checked);
                    }
                    for f in &r.failures {
                        writeln!(w, "✗ {}: {}", f.name, f.error)?;
                    }
                    Ok(())
                },
            )?;
            if !result.failures.is_empty() {
                render_error(
                    ctx.output,
                    &CliError::with_details(
                        format!("{} corrupt snapshot(s)", result.failures.len()),
                        "Restore from a snapshot that verifies",
                        "E4002",
                    ),
                )?;
                anyhow::bail!("corrupt backups");
            }
            Ok(())
        }
        BackupCommand::Restore(args) => {
            let entry = ledger
                .restore(&args.selector, !args.no_snapshot)
                .map_err(|e| ctx.fail(&e))?;
            let row = BackupRow::new(0, &entry);
            render_mode(
                ctx.output,
                &row,
                |r, w| writeln!(w, "restored {}", r.name),
                |r, w| writeln!(w, "✓ Restored ledger from {} ({})", r.name, r.created),
            )
        }
    }
}
