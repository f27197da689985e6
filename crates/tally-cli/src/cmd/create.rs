//! `tally create` — append a new task.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;
use std::io::Write;

use tally_core::model::{Priority, Status, normalize_agent_name};
use tally_core::ops::NewTask;

use super::show::resolve_task_id;
use super::{Context, split_list};
use crate::output::render_mode;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Title of the new task.
    #[arg(short, long)]
    pub title: String,

    /// Initial status (default: todo).
    #[arg(short, long)]
    pub status: Option<Status>,

    /// Priority: urgent, high, medium, low.
    #[arg(short, long, default_value = "medium")]
    pub priority: Priority,

    /// Agent the task is assigned to.
    #[arg(long)]
    pub assign: Option<String>,

    /// Due date (YYYY-MM-DD).
    #[arg(long)]
    pub due: Option<NaiveDate>,

    /// Tags (comma-separated or repeated).
    #[arg(long)]
    pub tag: Vec<String>,

    /// Tasks this one depends on (comma-separated or repeated).
    #[arg(long)]
    pub depends_on: Vec<String>,

    /// Tasks this one blocks.
    #[arg(long)]
    pub blocks: Vec<String>,

    /// Estimated hours.
    #[arg(long)]
    pub estimate: Option<f64>,

    /// Description text.
    #[arg(short, long, default_value = "")]
    pub description: String,

    /// Deliverables (repeatable).
    #[arg(long)]
    pub deliverable: Vec<String>,
}

impl CreateArgs {
    fn to_new_task(&self, prefix: &str) -> NewTask {
        let ids = |values: &[String]| -> Vec<String> {
            split_list(values)
                .iter()
                .map(|v| resolve_task_id(v, prefix))
                .collect()
        };
        NewTask {
            title: self.title.clone(),
            status: self.status,
            priority: self.priority,
            assigned_to: self.assign.as_deref().map(normalize_agent_name),
            due: self.due,
            tags: split_list(&self.tag),
            depends_on: ids(&self.depends_on),
            blocks: ids(&self.blocks),
            estimated_hours: self.estimate,
            description: self.description.clone(),
            deliverables: self.deliverable.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Created {
    id: String,
    title: String,
}

/// Create a task and print its id.
///
/// # Errors
///
/// Fails without an actor, on unknown references, or on any ledger error.
pub fn run_create(args: &CreateArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let new = args.to_new_task(&ctx.project().ledger.id_prefix);
    let id = ctx
        .ledger()
        .create_task(new, &actor)
        .map_err(|e| ctx.fail(&e))?;

    let created = Created {
        id,
        title: args.title.clone(),
    };
    render_mode(
        ctx.output,
        &created,
        |c, w| writeln!(w, "{}", c.id),
        |c, w| writeln!(w, "✓ Created {} · {}", c.id, c.title),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: CreateArgs,
    }

    #[test]
    fn create_args_defaults() {
        let w = Wrapper::parse_from(["test", "--title", "Hello"]);
        assert_eq!(w.args.title, "Hello");
        assert_eq!(w.args.priority, Priority::Medium);
        assert!(w.args.status.is_none());
        assert!(w.args.tag.is_empty());
    }

    #[test]
    fn references_expand_and_split() {
        let w = Wrapper::parse_from([
            "test",
            "--title",
            "Deploy",
            "--depends-on",
            "1,TASK-002",
            "--tag",
            "ops, infra",
            "--assign",
            "alice",
            "--due",
            "2026-11-01",
        ]);
        let new = w.args.to_new_task("TASK");
        assert_eq!(new.depends_on, vec!["TASK-001", "TASK-002"]);
        assert_eq!(new.tags, vec!["ops", "infra"]);
        assert_eq!(new.assigned_to.as_deref(), Some("@alice"));
        assert_eq!(new.due, NaiveDate::from_ymd_opt(2026, 11, 1));
    }
}
