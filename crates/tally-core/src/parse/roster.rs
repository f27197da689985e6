//! Agent roster table extraction.
//!
//! The roster is one pipe table under a recognised heading. Rows before the
//! header row are ignored; every later row with at least six cells becomes an
//! [`Agent`]. Column order is fixed: name, type, roles, status, working-on,
//! last-active, trust.

use super::values::{is_none_marker, parse_timestamp};
use super::{IssueKind, ParseIssue, is_heading};
use crate::model::{Agent, AgentKind, AgentStatus, TrustLevel, normalize_agent_name};

/// Headings (after `## `) that introduce the roster, compared case-insensitively.
pub const ROSTER_HEADINGS: &[&str] = &["agents", "agent roster", "team"];

/// Column headers in write order.
pub const COLUMNS: [&str; 7] = [
    "Name",
    "Type",
    "Roles",
    "Status",
    "Working On",
    "Last Active",
    "Trust",
];

const MIN_CELLS: usize = 6;

/// Read the first roster table found in `lines`.
pub fn extract_agents(lines: &[&str], issues: &mut Vec<ParseIssue>) -> Vec<Agent> {
    let Some(start) = lines.iter().position(|line| is_roster_heading(line)) else {
        return Vec::new();
    };

    let mut agents = Vec::new();
    let mut header_seen = false;

    for line in &lines[start + 1..] {
        let trimmed = line.trim();
        if is_heading(trimmed) {
            break;
        }
        if !trimmed.starts_with('|') {
            if header_seen && !agents.is_empty() {
                break;
            }
            continue;
        }

        let cells = split_row(trimmed);
        if !header_seen {
            header_seen = is_header_row(&cells);
            continue;
        }
        if is_separator_row(&cells) {
            continue;
        }
        if let Some(agent) = decode_row(&cells, issues) {
            agents.push(agent);
        }
    }

    agents
}

fn is_roster_heading(line: &str) -> bool {
    line.strip_prefix("## ").is_some_and(|rest| {
        let rest = rest.trim().to_ascii_lowercase();
        ROSTER_HEADINGS.contains(&rest.as_str())
    })
}

fn is_header_row(cells: &[String]) -> bool {
    let lowered: Vec<String> = cells.iter().map(|c| c.to_ascii_lowercase()).collect();
    lowered.iter().any(|c| c == "name") && lowered.iter().any(|c| c == "type")
}

fn is_separator_row(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells
            .iter()
            .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
}

/// Split a table row on unescaped pipes and unescape `\|` inside cells.
pub(crate) fn split_row(row: &str) -> Vec<String> {
    let inner = row.trim();
    let inner = inner.strip_prefix('|').unwrap_or(inner);
    let inner = match inner.strip_suffix('|') {
        Some(rest) if !rest.ends_with('\\') => rest,
        _ => inner,
    };

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(ch),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

/// Split the roles cell on unescaped commas. A role may contain spaces;
/// `\,` stands for a literal comma.
pub(crate) fn split_roles(cell: &str) -> Vec<String> {
    if is_none_marker(cell) {
        return Vec::new();
    }
    let mut roles = Vec::new();
    let mut current = String::new();
    let mut chars = cell.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => roles.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    roles.push(current);
    roles
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect()
}

fn decode_row(cells: &[String], issues: &mut Vec<ParseIssue>) -> Option<Agent> {
    if cells.len() < MIN_CELLS {
        issues.push(
            ParseIssue::new(
                IssueKind::AgentRow,
                format!("agent row has {} cells, expected at least {MIN_CELLS}", cells.len()),
            )
            .lossy(),
        );
        return None;
    }

    let name = normalize_agent_name(&cells[0]);
    if name.is_empty() {
        issues.push(ParseIssue::new(IssueKind::AgentRow, "agent row without a name").lossy());
        return None;
    }

    let mut field_issue = |field: &str, raw: &str| {
        issues.push(ParseIssue::new(
            IssueKind::AgentRow,
            format!("agent {name}: invalid {field} '{raw}'; using default"),
        ));
    };

    let kind = cells[1].parse().unwrap_or_else(|_| {
        field_issue("type", &cells[1]);
        AgentKind::Human
    });
    let status = cells[3].parse().unwrap_or_else(|_| {
        field_issue("status", &cells[3]);
        AgentStatus::Idle
    });
    let working_on = (!is_none_marker(&cells[4])).then(|| cells[4].clone());
    let last_active = if is_none_marker(&cells[5]) {
        None
    } else {
        parse_timestamp(&cells[5]).or_else(|| {
            field_issue("last-active", &cells[5]);
            None
        })
    };
    let trust = match cells.get(6) {
        Some(raw) if !is_none_marker(raw) => raw.parse().unwrap_or_else(|_| {
            field_issue("trust", raw);
            TrustLevel::Trusted
        }),
        _ => TrustLevel::Trusted,
    };

    Some(Agent {
        name,
        kind,
        roles: split_roles(&cells[2]),
        status,
        working_on,
        last_active,
        trust,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(text: &str) -> (Vec<Agent>, Vec<ParseIssue>) {
        let lines: Vec<&str> = text.lines().collect();
        let mut issues = Vec::new();
        let agents = extract_agents(&lines, &mut issues);
        (agents, issues)
    }

    #[test]
    fn reads_rows_after_header() {
        let (agents, issues) = read(
            "## Agents\n\n| junk |\n| Name | Type | Roles | Status | Working On | Last Active | Trust |\n|---|---|---|---|---|---|---|\n| alice | human | dev, review | working | TASK-001 | 2026-01-01T00:00:00Z | owner |\n| @ci | bot | - | idle | - | - | restricted |\n",
        );
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].name, "@alice");
        assert_eq!(agents[0].roles, vec!["dev", "review"]);
        assert_eq!(agents[0].working_on.as_deref(), Some("TASK-001"));
        assert!(agents[0].last_active.is_some());
        assert_eq!(agents[1].kind, AgentKind::Bot);
        assert!(agents[1].working_on.is_none());
        assert!(agents[1].roles.is_empty());
        assert_eq!(agents[1].trust, TrustLevel::Restricted);
    }

    #[test]
    fn short_rows_are_reported() {
        let (agents, issues) =
            read("## Team\n| Name | Type | Roles | Status | Working On | Last Active |\n|-|-|-|-|-|-|\n| x | bot |\n");
        assert!(agents.is_empty());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::AgentRow);
    }

    #[test]
    fn six_cell_rows_default_trust() {
        let (agents, _) =
            read("## Agents\n| Name | Type | Roles | Status | Working On | Last Active |\n|-|-|-|-|-|-|\n| x | bot | | idle | - | - |\n");
        assert_eq!(agents[0].trust, TrustLevel::Trusted);
    }

    #[test]
    fn roles_split_on_commas_only() {
        assert_eq!(split_roles("code review"), vec!["code review"]);
        assert_eq!(split_roles("code review, ops"), vec!["code review", "ops"]);
        assert_eq!(split_roles(r"R\, D, qa"), vec!["R, D", "qa"]);
        assert!(split_roles("-").is_empty());
        assert!(split_roles(" , ").is_empty());
    }

    #[test]
    fn escaped_pipes_stay_in_cell() {
        assert_eq!(split_row(r"| a\|b | c |"), vec!["a|b", "c"]);
    }

    #[test]
    fn no_heading_no_agents() {
        let (agents, issues) = read("| Name | Type |\n| a | b |\n");
        assert!(agents.is_empty());
        assert!(issues.is_empty());
    }
}
