//! `tally validate` — parse issues plus integrity findings; `tally fmt` —
//! rewrite the ledger in the canonical dialect.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;

use tally_core::parse::ParseIssue;
use tally_core::validate::{ValidationReport, validate_document};

use super::Context;
use super::show::read_snapshot;
use crate::output::{CliError, render_error, render_mode};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Move `next_id` past the highest existing id if it has fallen behind.
    #[arg(long)]
    pub repair: bool,

    /// Treat warnings as failures.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Serialize)]
struct ValidateResult {
    valid: bool,
    parse_issues: Vec<ParseIssue>,
    #[serde(flatten)]
    report: ValidationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    repaired_next_id: Option<(u64, u64)>,
}

/// Check the ledger.
///
/// # Errors
///
/// Fails when there are validation errors (or warnings with `--strict`).
pub fn run_validate(args: &ValidateArgs, ctx: &Context) -> Result<()> {
    let repaired_next_id = if args.repair {
        ctx.ledger().repair_next_id().map_err(|e| ctx.fail(&e))?
    } else {
        None
    };

    let snapshot = ctx.ledger().read().map_err(|e| ctx.fail(&e))?;
    let report = validate_document(&snapshot.document);
    let valid = report.is_valid() && (!args.strict || report.warnings.is_empty());
    let result = ValidateResult {
        valid,
        parse_issues: snapshot.issues,
        report,
        repaired_next_id,
    };

    render_mode(
        ctx.output,
        &result,
        |r, w| {
            for issue in &r.parse_issues {
                writeln!(w, "parse  {issue}")?;
            }
            for f in &r.report.errors {
                writeln!(w, "error  {}  {f}", f.kind.as_str())?;
            }
            for f in &r.report.warnings {
                writeln!(w, "warn   {}  {f}", f.kind.as_str())?;
            }
            if let Some((old, new)) = r.repaired_next_id {
                writeln!(w, "repaired next_id {old} -> {new}")?;
            }
            writeln!(w, "valid {}", r.valid)
        },
        |r, w| {
            if let Some((old, new)) = r.repaired_next_id {
                writeln!(w, "✓ Repaired next_id: {old} → {new}")?;
            }
            for issue in &r.parse_issues {
                writeln!(w, "  ~ {issue}")?;
            }
            for f in &r.report.errors {
                writeln!(w, "  ✗ {f}")?;
            }
            for f in &r.report.warnings {
                writeln!(w, "  ! {f}")?;
            }
            if r.valid {
                writeln!(w, "✓ Ledger is valid")
            } else {
                writeln!(w, "✗ Ledger has problems")
            }
        },
    )?;

    if !result.valid {
        render_error(
            ctx.output,
            &CliError::with_details(
                format!(
                    "{} error(s), {} warning(s)",
                    result.report.errors.len(),
                    result.report.warnings.len()
                ),
                "Fix the listed tasks, or run `tally validate --repair` for next_id drift",
                "validation_failed",
            ),
        )?;
        anyhow::bail!("ledger failed validation");
    }
    Ok(())
}

#[derive(Args, Debug, Default)]
pub struct FmtArgs {}

#[derive(Debug, Serialize)]
struct Formatted {
    path: String,
    tasks: usize,
}

/// Rewrite the ledger canonically. Freeform tasks come out in the strict
/// dialect; content is otherwise unchanged.
///
/// # Errors
///
/// Any ledger error.
pub fn run_fmt(_args: &FmtArgs, ctx: &Context) -> Result<()> {
    let snapshot = read_snapshot(ctx)?;
    let ledger = ctx.ledger();
    snapshot
        .ensure_writable(ledger.path())
        .map_err(|e| ctx.fail(&e))?;
    ledger
        .write(&snapshot.document, &snapshot.fingerprint)
        .map_err(|e| ctx.fail(&e))?;
    render_mode(
        ctx.output,
        &Formatted {
            path: ledger.path().display().to_string(),
            tasks: snapshot.document.tasks.len(),
        },
        |r, w| writeln!(w, "formatted {}", r.path),
        |r, w| writeln!(w, "✓ Rewrote {} ({} tasks)", r.path, r.tasks),
    )
}
