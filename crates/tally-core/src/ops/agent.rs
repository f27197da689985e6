//! Roster operations.

use chrono::{DateTime, Utc};

use super::OpResult;
use crate::error::PreconditionError;
use crate::model::{Agent, AgentStatus, Document, normalize_agent_name};

/// Add an agent, or refresh the kind, roles and trust of an existing one.
///
/// Returns `true` when the agent was new. Status and `working_on` of an
/// existing entry are kept.
///
/// # Errors
///
/// An agent with an empty name.
pub fn register_agent(doc: &mut Document, agent: Agent, now: DateTime<Utc>) -> OpResult<bool> {
    let name = normalize_agent_name(&agent.name);
    if name.is_empty() {
        return Err(PreconditionError::EmptyActor);
    }

    let created = if let Some(existing) = doc.agent_mut(&name) {
        existing.kind = agent.kind;
        existing.roles = agent.roles;
        existing.trust = agent.trust;
        existing.last_active = Some(now);
        false
    } else {
        doc.agents.push(Agent {
            name: name.clone(),
            last_active: Some(now),
            ..agent
        });
        true
    };
    doc.touch(now);
    tracing::debug!(agent = %name, created, "registered agent");
    Ok(created)
}

/// Presence change for [`set_agent_status`].
#[derive(Debug, Clone, Default)]
pub struct AgentUpdate {
    pub status: Option<AgentStatus>,
    /// `Some(None)` clears the current task.
    pub working_on: Option<Option<String>>,
}

/// Update an agent's presence and stamp its last-active time.
///
/// # Errors
///
/// Unknown agent, or a `working_on` naming a task that does not exist.
pub fn set_agent_status(
    doc: &mut Document,
    name: &str,
    update: AgentUpdate,
    now: DateTime<Utc>,
) -> OpResult<()> {
    let name = normalize_agent_name(name);
    if doc.agent(&name).is_none() {
        return Err(PreconditionError::AgentNotFound { name });
    }
    if let Some(Some(task)) = &update.working_on {
        if doc.task(task).is_none() {
            return Err(PreconditionError::TaskNotFound { id: task.clone() });
        }
    }

    if let Some(agent) = doc.agent_mut(&name) {
        if let Some(status) = update.status {
            agent.status = status;
        }
        if let Some(working_on) = update.working_on {
            agent.working_on = working_on;
        }
        agent.last_active = Some(now);
    }
    doc.touch(now);
    Ok(())
}
