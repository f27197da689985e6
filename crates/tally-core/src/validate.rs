//! Integrity checks over a parsed [`Document`].
//!
//! Every check runs independently and all findings are collected, so one bad
//! task never hides another. Errors mean the ledger is unhealthy; warnings are
//! informational and never block a read or a write.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::graph::{DependencyGraph, find_all_cycles};
use crate::model::{Document, Status};

/// What a finding is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    MissingProject,
    MissingVersion,
    EmptyId,
    EmptyTitle,
    DuplicateId,
    DanglingDependency,
    DanglingBlock,
    Cycle,
    UnknownAgent,
    ClaimedWhileDone,
    NoHistory,
    CostOverrun,
    StaleNextId,
}

impl FindingKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingProject => "missing_project",
            Self::MissingVersion => "missing_version",
            Self::EmptyId => "empty_id",
            Self::EmptyTitle => "empty_title",
            Self::DuplicateId => "duplicate_id",
            Self::DanglingDependency => "dangling_dependency",
            Self::DanglingBlock => "dangling_block",
            Self::Cycle => "cycle",
            Self::UnknownAgent => "unknown_agent",
            Self::ClaimedWhileDone => "claimed_while_done",
            Self::NoHistory => "no_history",
            Self::CostOverrun => "cost_overrun",
            Self::StaleNextId => "stale_next_id",
        }
    }
}

/// One validation error or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub message: String,
}

impl Finding {
    fn doc(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            task_id: None,
            message: message.into(),
        }
    }

    fn task(kind: FindingKind, task_id: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            task_id: Some(task_id.to_string()),
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.task_id {
            Some(id) if !id.is_empty() => write!(f, "{id}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Result of [`validate_document`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl ValidationReport {
    /// No errors. Warnings do not count.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    fn error(&mut self, finding: Finding) {
        self.errors.push(finding);
    }

    fn warn(&mut self, finding: Finding) {
        self.warnings.push(finding);
    }
}

/// Run every structural and semantic check.
#[must_use]
pub fn validate_document(doc: &Document) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_meta(doc, &mut report);
    check_identity(doc, &mut report);
    check_references(doc, &mut report);
    check_cycles(doc, &mut report);
    check_agents(doc, &mut report);
    check_consistency(doc, &mut report);

    tracing::debug!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "validated document"
    );
    report
}

fn check_meta(doc: &Document, report: &mut ValidationReport) {
    if doc.meta.project.trim().is_empty() {
        report.error(Finding::doc(FindingKind::MissingProject, "project name is missing"));
    }
    if doc.meta.version.trim().is_empty() {
        report.warn(Finding::doc(FindingKind::MissingVersion, "schema version is missing"));
    }
    if let Some(max) = doc.max_id_number() {
        if doc.meta.next_id <= max {
            report.warn(Finding::doc(
                FindingKind::StaleNextId,
                format!(
                    "next_id {} does not exceed the largest task number {max}",
                    doc.meta.next_id
                ),
            ));
        }
    }
}

fn check_identity(doc: &Document, report: &mut ValidationReport) {
    let mut seen: HashSet<&str> = HashSet::new();
    for (idx, task) in doc.tasks.iter().enumerate() {
        let has_id = !task.id.trim().is_empty();
        if !has_id {
            report.error(Finding::doc(
                FindingKind::EmptyId,
                format!("task #{} has no id", idx + 1),
            ));
        }
        if task.title.trim().is_empty() {
            let message = format!("task #{} has no title", idx + 1);
            report.error(if has_id {
                Finding::task(FindingKind::EmptyTitle, &task.id, message)
            } else {
                Finding::doc(FindingKind::EmptyTitle, message)
            });
        }
        if has_id && !seen.insert(task.id.as_str()) {
            report.error(Finding::task(
                FindingKind::DuplicateId,
                &task.id,
                format!("duplicate task id {}", task.id),
            ));
        }
    }
}

fn check_references(doc: &Document, report: &mut ValidationReport) {
    let ids: HashSet<&str> = doc.tasks.iter().map(|t| t.id.as_str()).collect();
    for task in &doc.tasks {
        for dep in &task.depends_on {
            if !ids.contains(dep.as_str()) {
                report.error(Finding::task(
                    FindingKind::DanglingDependency,
                    &task.id,
                    format!("depends on non-existent task {dep}"),
                ));
            }
        }
        for blocked in &task.blocks {
            if !ids.contains(blocked.as_str()) {
                report.error(Finding::task(
                    FindingKind::DanglingBlock,
                    &task.id,
                    format!("blocks non-existent task {blocked}"),
                ));
            }
        }
    }
}

fn check_cycles(doc: &Document, report: &mut ValidationReport) {
    let graph = DependencyGraph::from_document(doc);
    for cycle in find_all_cycles(&graph) {
        let head = cycle.path.first().cloned().unwrap_or_default();
        report.error(Finding::task(FindingKind::Cycle, &head, cycle.to_string()));
    }
}

fn check_agents(doc: &Document, report: &mut ValidationReport) {
    let roster: HashSet<&str> = doc.agents.iter().map(|a| a.name.as_str()).collect();
    for task in &doc.tasks {
        for (field, value) in [
            ("assigned_to", task.assigned_to.as_deref()),
            ("claimed_by", task.claimed_by.as_deref()),
        ] {
            let Some(name) = value else { continue };
            if roster.contains(name) {
                continue;
            }
            report.warn(Finding::task(
                FindingKind::UnknownAgent,
                &task.id,
                format!("{field} names unregistered agent {name}"),
            ));
        }
    }
}

fn check_consistency(doc: &Document, report: &mut ValidationReport) {
    for task in &doc.tasks {
        if task.status == Status::Done {
            if let Some(who) = &task.claimed_by {
                report.warn(Finding::task(
                    FindingKind::ClaimedWhileDone,
                    &task.id,
                    format!("task is done but still claimed by {who}"),
                ));
            }
        }
        if task.history.is_empty() {
            report.warn(Finding::task(FindingKind::NoHistory, &task.id, "task has no history"));
        }
        if let (Some(estimate), Some(actual)) = (task.estimated_hours, task.actual_hours) {
            if actual > estimate * 2.0 {
                report.warn(Finding::task(
                    FindingKind::CostOverrun,
                    &task.id,
                    format!("actual {actual}h is more than double the {estimate}h estimate"),
                ));
            }
        }
    }
}
