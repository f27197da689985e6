//! `tally show` — full detail for one task, plus shared task renderers.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::{self, Write};

use tally_core::graph::DependencyGraph;
use tally_core::model::task::format_task_id;
use tally_core::model::{Document, Task};
use tally_core::store::Snapshot;
use tally_core::writer::timestamp;

use super::Context;
use crate::output::{CliError, Renderable, pretty_kv, pretty_section, render_error, render_item};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Task id. A bare number (`7`) expands to the project prefix.
    pub id: String,
}

/// Expand a bare number to `PREFIX-NNN`; anything else is used verbatim.
pub fn resolve_task_id(input: &str, prefix: &str) -> String {
    let input = input.trim();
    match input.parse::<u64>() {
        Ok(n) => format_task_id(prefix, n),
        Err(_) => input.to_string(),
    }
}

/// Read the ledger, logging any parse issues at `warn!`.
pub fn read_snapshot(ctx: &Context) -> Result<Snapshot> {
    let snapshot = ctx.ledger().read().map_err(|e| ctx.fail(&e))?;
    for issue in &snapshot.issues {
        tracing::warn!(kind = ?issue.kind, "{issue}");
    }
    Ok(snapshot)
}

/// One-line summary used by `list` and `next`.
#[derive(Debug, Serialize)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub status: String,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status.to_string(),
            priority: task.priority.to_string(),
            claimed_by: task.claimed_by.clone(),
            tags: task.tags.clone(),
            depends_on: task.depends_on.clone(),
        }
    }
}

impl Renderable for TaskRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let claim = self
            .claimed_by
            .as_deref()
            .map_or_else(String::new, |c| format!("  ({c})"));
        writeln!(
            w,
            "{:<10} {:<12} {:<7} {}{claim}",
            self.id, self.status, self.priority, self.title
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self).map_err(io::Error::other)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}  {}",
            self.id,
            self.status,
            self.priority,
            self.claimed_by.as_deref().unwrap_or("-"),
            self.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "STATUS", "PRIORITY", "CLAIMED", "TITLE"]
    }
}

/// Everything about one task, plus graph facts that are not stored.
#[derive(Debug, Serialize)]
struct TaskDetail<'a> {
    #[serde(flatten)]
    task: &'a Task,
    dependents: Vec<String>,
    ready: bool,
}

impl<'a> TaskDetail<'a> {
    fn new(doc: &'a Document, task: &'a Task) -> Self {
        let graph = DependencyGraph::from_document(doc);
        let dependents = graph
            .dependents_of(&task.id)
            .into_iter()
            .map(str::to_string)
            .collect();
        let ready = graph.ready_tasks(doc).contains(&task.id.as_str());
        Self {
            task,
            dependents,
            ready,
        }
    }
}

fn join_or_dash(values: &[String]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join(", ")
    }
}

impl Renderable for TaskDetail<'_> {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let t = self.task;
        pretty_section(w, &format!("{} · {}", t.id, t.title))?;
        pretty_kv(w, "Status", t.status.as_str())?;
        pretty_kv(w, "Priority", t.priority.as_str())?;
        pretty_kv(w, "Assigned", t.assigned_to.as_deref().unwrap_or("-"))?;
        pretty_kv(w, "Claimed", t.claimed_by.as_deref().unwrap_or("-"))?;
        pretty_kv(w, "Created", format!("{} by {}", timestamp(t.created), t.created_by))?;
        pretty_kv(w, "Updated", timestamp(t.updated))?;
        if let Some(due) = t.due {
            pretty_kv(w, "Due", due.to_string())?;
        }
        pretty_kv(w, "Tags", join_or_dash(&t.tags))?;
        pretty_kv(w, "Depends on", join_or_dash(&t.depends_on))?;
        pretty_kv(w, "Blocks", join_or_dash(&t.blocks))?;
        pretty_kv(w, "Dependents", join_or_dash(&self.dependents))?;
        if let Some(hours) = t.estimated_hours {
            let actual = t.actual_hours.map_or_else(String::new, |a| format!(" (actual {a})"));
            pretty_kv(w, "Estimate", format!("{hours}h{actual}"))?;
        }
        if !t.description.is_empty() {
            writeln!(w)?;
            for line in t.description.lines() {
                writeln!(w, "  {line}")?;
            }
        }
        if !t.deliverables.is_empty() {
            writeln!(w)?;
            pretty_section(w, "Deliverables")?;
            for d in &t.deliverables {
                writeln!(w, "  [{}] {}", if d.done { "x" } else { " " }, d.name)?;
            }
        }
        writeln!(w)?;
        pretty_section(w, "History")?;
        for entry in &t.history {
            let transition = match (&entry.from, &entry.to) {
                (Some(from), Some(to)) => format!(" {from} → {to}"),
                _ => String::new(),
            };
            let note = entry.note.as_deref().map_or_else(String::new, |n| format!(": {n}"));
            writeln!(
                w,
                "  {}  {}  {}{transition}{note}",
                timestamp(entry.ts),
                entry.who,
                entry.action
            )?;
        }
        Ok(())
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *w, self).map_err(io::Error::other)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let t = self.task;
        writeln!(w, "id: {}", t.id)?;
        writeln!(w, "title: {}", t.title)?;
        writeln!(w, "status: {}", t.status)?;
        writeln!(w, "priority: {}", t.priority)?;
        writeln!(w, "claimed_by: {}", t.claimed_by.as_deref().unwrap_or("-"))?;
        writeln!(w, "depends_on: {}", join_or_dash(&t.depends_on))?;
        writeln!(w, "dependents: {}", join_or_dash(&self.dependents))?;
        writeln!(w, "ready: {}", self.ready)?;
        writeln!(w, "history: {}", t.history.len())
    }
}

/// Show one task.
///
/// # Errors
///
/// Fails if the ledger cannot be read or the task does not exist.
pub fn run_show(args: &ShowArgs, ctx: &Context) -> Result<()> {
    let snapshot = read_snapshot(ctx)?;
    let doc = &snapshot.document;
    let id = resolve_task_id(&args.id, &doc.meta.id_prefix);
    let Some(task) = doc.task(&id) else {
        render_error(
            ctx.output,
            &CliError::with_details(
                format!("task {id} not found"),
                "Run `tally list` to see task ids",
                "E2001",
            ),
        )?;
        anyhow::bail!("task {id} not found");
    };
    render_item(&TaskDetail::new(doc, task), ctx.output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn bare_numbers_expand_to_prefix() {
        assert_eq!(resolve_task_id("7", "TASK"), "TASK-007");
        assert_eq!(resolve_task_id(" 42 ", "WEB"), "WEB-042");
        assert_eq!(resolve_task_id("TASK-003", "TASK"), "TASK-003");
    }

    #[test]
    fn detail_lists_dependents_and_readiness() {
        let now = Utc::now();
        let mut doc = Document::new("acme", now);
        let base = Task::minimal("TASK-001", "base", now);
        let mut top = Task::minimal("TASK-002", "top", now);
        top.depends_on.push("TASK-001".into());
        doc.tasks = vec![base, top];

        let detail = TaskDetail::new(&doc, &doc.tasks[0]);
        assert_eq!(detail.dependents, vec!["TASK-002".to_string()]);

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["id"], "TASK-001");
        assert_eq!(json["dependents"][0], "TASK-002");
    }

    #[test]
    fn text_row_has_dash_for_unclaimed() {
        let task = Task::minimal("TASK-001", "Build auth", Utc::now());
        let mut buf = Vec::new();
        TaskRow::from(&task).render_table(&mut buf).unwrap();
        let line = String::from_utf8(buf).unwrap();
        assert!(line.starts_with("TASK-001  "));
        assert!(line.contains("  -  Build auth"));
    }
}
