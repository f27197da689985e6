//! `tally next` — tasks whose dependencies are all done and nobody holds.

use anyhow::Result;
use clap::Args;

use tally_core::graph::DependencyGraph;

use super::Context;
use super::show::{TaskRow, read_snapshot};
use crate::output::render_list;

#[derive(Args, Debug)]
pub struct NextArgs {
    /// How many tasks to show.
    #[arg(short = 'n', long, default_value = "5")]
    pub limit: usize,
}

/// List ready, unclaimed tasks: most urgent first, then ledger order.
///
/// # Errors
///
/// Fails if the ledger cannot be read.
pub fn run_next(args: &NextArgs, ctx: &Context) -> Result<()> {
    let snapshot = read_snapshot(ctx)?;
    let doc = &snapshot.document;
    let graph = DependencyGraph::from_document(doc);
    let ready = graph.ready_tasks(doc);

    let mut tasks: Vec<_> = doc
        .tasks
        .iter()
        .filter(|t| t.claimed_by.is_none() && ready.contains(&t.id.as_str()))
        .collect();
    tasks.sort_by_key(|t| t.priority);

    let rows: Vec<TaskRow> = tasks.into_iter().take(args.limit).map(TaskRow::from).collect();
    render_list(&rows, ctx.output)?;
    Ok(())
}
