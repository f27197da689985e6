//! `tally list` — list tasks with filtering.

use anyhow::Result;
use clap::Args;

use tally_core::model::{Status, Task, normalize_agent_name};

use super::Context;
use super::show::{TaskRow, read_snapshot};
use crate::output::render_list;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only tasks in this status (repeatable).
    #[arg(short, long)]
    pub status: Vec<Status>,

    /// Only tasks carrying this tag.
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Only tasks claimed by this agent.
    #[arg(long)]
    pub claimed_by: Option<String>,

    /// Include done tasks (hidden by default).
    #[arg(short, long)]
    pub all: bool,

    /// Maximum tasks to show.
    #[arg(short = 'n', long, default_value = "100")]
    pub limit: usize,
}

impl ListArgs {
    fn matches(&self, task: &Task) -> bool {
        let status_ok = if self.status.is_empty() {
            self.all || task.status != Status::Done
        } else {
            self.status.contains(&task.status)
        };
        let tag_ok = self
            .tag
            .as_deref()
            .is_none_or(|tag| task.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)));
        let claim_ok = self.claimed_by.as_deref().is_none_or(|who| {
            task.claimed_by.as_deref() == Some(normalize_agent_name(who).as_str())
        });
        status_ok && tag_ok && claim_ok
    }
}

/// List tasks in ledger order.
///
/// # Errors
///
/// Fails if the ledger cannot be read.
pub fn run_list(args: &ListArgs, ctx: &Context) -> Result<()> {
    let snapshot = read_snapshot(ctx)?;
    let rows: Vec<TaskRow> = snapshot
        .document
        .tasks
        .iter()
        .filter(|t| args.matches(t))
        .take(args.limit)
        .map(TaskRow::from)
        .collect();
    render_list(&rows, ctx.output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ListArgs,
    }

    fn task(status: Status) -> Task {
        let mut t = Task::minimal("TASK-001", "x", Utc::now());
        t.status = status;
        t
    }

    #[test]
    fn list_args_defaults() {
        let w = Wrapper::parse_from(["test"]);
        assert!(w.args.status.is_empty());
        assert!(!w.args.all);
        assert_eq!(w.args.limit, 100);
    }

    #[test]
    fn done_hidden_unless_asked() {
        let w = Wrapper::parse_from(["test"]);
        assert!(!w.args.matches(&task(Status::Done)));
        assert!(w.args.matches(&task(Status::Todo)));

        let w = Wrapper::parse_from(["test", "--all"]);
        assert!(w.args.matches(&task(Status::Done)));

        let w = Wrapper::parse_from(["test", "--status", "done"]);
        assert!(w.args.matches(&task(Status::Done)));
        assert!(!w.args.matches(&task(Status::Todo)));
    }

    #[test]
    fn status_aliases_parse() {
        let w = Wrapper::parse_from(["test", "-s", "wip", "-s", "blocked"]);
        assert_eq!(w.args.status, vec![Status::InProgress, Status::Blocked]);
    }

    #[test]
    fn claim_filter_normalizes_name() {
        let w = Wrapper::parse_from(["test", "--claimed-by", "alice"]);
        let mut t = task(Status::InProgress);
        t.claimed_by = Some("@alice".into());
        assert!(w.args.matches(&t));
        t.claimed_by = None;
        assert!(!w.args.matches(&t));
    }
}
