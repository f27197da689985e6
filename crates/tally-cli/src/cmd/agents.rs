//! `tally agents` — the roster: list, register, report presence.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::io::{self, Write};

use tally_core::model::{Agent, AgentKind, AgentStatus, TrustLevel};
use tally_core::ops::AgentUpdate;
use tally_core::writer::timestamp;

use super::show::{read_snapshot, resolve_task_id};
use super::{Context, split_list};
use crate::output::{Renderable, render_list, render_mode};

#[derive(Subcommand, Debug)]
pub enum AgentsCommand {
    /// List registered agents.
    List,
    /// Add an agent or refresh its kind, roles and trust.
    Register(RegisterArgs),
    /// Report the current actor's presence.
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Agent name (`@` is added if missing).
    pub name: String,

    #[arg(long, default_value = "human")]
    pub kind: AgentKind,

    /// Roles (comma-separated or repeated).
    #[arg(long)]
    pub role: Vec<String>,

    #[arg(long, default_value = "trusted")]
    pub trust: TrustLevel,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// working, idle or offline.
    pub status: AgentStatus,

    /// Task being worked on.
    #[arg(long, conflicts_with = "clear")]
    pub on: Option<String>,

    /// Clear the current task.
    #[arg(long)]
    pub clear: bool,
}

#[derive(Debug, Serialize)]
struct AgentRow {
    name: String,
    kind: AgentKind,
    status: AgentStatus,
    working_on: Option<String>,
    last_active: Option<String>,
}

impl From<&Agent> for AgentRow {
    fn from(agent: &Agent) -> Self {
        Self {
            name: agent.name.clone(),
            kind: agent.kind,
            status: agent.status,
            working_on: agent.working_on.clone(),
            last_active: agent.last_active.map(timestamp),
        }
    }
}

impl Renderable for AgentRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let on = self
            .working_on
            .as_deref()
            .map_or_else(String::new, |t| format!(" on {t}"));
        writeln!(w, "{:<16} {:<6} {}{on}", self.name, self.kind, self.status)
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self).map_err(io::Error::other)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}",
            self.name,
            self.kind,
            self.status,
            self.working_on.as_deref().unwrap_or("-")
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["NAME", "KIND", "STATUS", "WORKING_ON"]
    }
}

#[derive(Debug, Serialize)]
struct Presence {
    name: String,
    status: AgentStatus,
    working_on: Option<String>,
}

#[derive(Debug, Serialize)]
struct Registered {
    name: String,
    created: bool,
}

/// Dispatch an `agents` subcommand.
///
/// # Errors
///
/// Ledger errors, or a missing actor for `status`.
pub fn run_agents(command: &AgentsCommand, ctx: &Context) -> Result<()> {
    match command {
        AgentsCommand::List => {
            let snapshot = read_snapshot(ctx)?;
            let rows: Vec<AgentRow> = snapshot.document.agents.iter().map(AgentRow::from).collect();
            render_list(&rows, ctx.output)?;
            Ok(())
        }
        AgentsCommand::Register(args) => {
            let mut agent = Agent::new(&args.name, args.kind);
            agent.roles = split_list(&args.role);
            agent.trust = args.trust;
            let name = agent.name.clone();
            let created = ctx
                .ledger()
                .register_agent(agent)
                .map_err(|e| ctx.fail(&e))?;
            render_mode(
                ctx.output,
                &Registered { name, created },
                |r, w| writeln!(w, "{} {}", if r.created { "registered" } else { "updated" }, r.name),
                |r, w| {
                    let verb = if r.created { "Registered" } else { "Updated" };
                    writeln!(w, "✓ {verb} {}", r.name)
                },
            )
        }
        AgentsCommand::Status(args) => {
            let actor = ctx.actor()?;
            let working_on = if args.clear {
                Some(None)
            } else {
                args.on
                    .as_deref()
                    .map(|id| Some(resolve_task_id(id, &ctx.project().ledger.id_prefix)))
            };
            let update = AgentUpdate {
                status: Some(args.status),
                working_on: working_on.clone(),
            };
            ctx.ledger()
                .set_agent_status(&actor, update)
                .map_err(|e| ctx.fail(&e))?;
            let presence = Presence {
                name: actor,
                status: args.status,
                working_on: working_on.flatten(),
            };
            render_mode(
                ctx.output,
                &presence,
                |r, w| writeln!(w, "{} {}", r.name, r.status),
                |r, w| writeln!(w, "✓ {} is {}", r.name, r.status),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(subcommand)]
        command: AgentsCommand,
    }

    #[test]
    fn register_defaults() {
        let w = Wrapper::parse_from(["test", "register", "claude"]);
        let AgentsCommand::Register(args) = w.command else {
            panic!("expected register");
        };
        assert_eq!(args.kind, AgentKind::Human);
        assert_eq!(args.trust, TrustLevel::Trusted);
    }

    #[test]
    fn status_takes_task() {
        let w = Wrapper::parse_from(["test", "status", "working", "--on", "4"]);
        let AgentsCommand::Status(args) = w.command else {
            panic!("expected status");
        };
        assert_eq!(args.status, AgentStatus::Working);
        assert_eq!(args.on.as_deref(), Some("4"));
    }
}
