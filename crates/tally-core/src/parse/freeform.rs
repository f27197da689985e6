//! Freeform-dialect scanner for hand- and bot-written task sections.
//!
//! ```text
//! ## TASK-004: Fix login redirect 🚧
//! **Priority:** High
//! **Owner:** alice
//! **Depends on:** TASK-001, TASK-002
//! - [ ] regression test
//!
//! Everything from here to the next `##` heading is the description,
//! ### including sub-headings.
//! ```
//!
//! A trailing status glyph on the heading beats a `**Status:**` line.

use chrono::{DateTime, Utc};

use super::values::{
    dedup_ordered, is_none_marker, parse_date, parse_hours, parse_timestamp, split_list,
};
use super::{IssueKind, ParseIssue, strict};
use crate::model::task::normalize;
use crate::model::{Deliverable, Priority, Status, Task, normalize_agent_name};

/// Parse `## <ID>: <Title> [glyph]`.
#[must_use]
pub fn parse_heading(line: &str) -> Option<(&str, &str, Option<Status>)> {
    let rest = line.strip_prefix("## ")?.trim();
    let (id, title) = rest.split_once(':')?;
    let id = id.trim();
    if !looks_like_task_id(id) {
        return None;
    }

    let title = title.trim();
    if let Some(status) = Status::from_glyph(title) {
        return Some((id, "", Some(status)));
    }
    if let Some((head, last)) = title.rsplit_once(char::is_whitespace) {
        if let Some(status) = Status::from_glyph(last) {
            return Some((id, head.trim_end(), Some(status)));
        }
    }
    Some((id, title, None))
}

/// `<letters/digits>-<digits>`, e.g. `TASK-012` or `WEB2-7`.
#[must_use]
pub fn looks_like_task_id(id: &str) -> bool {
    let Some((prefix, number)) = id.rsplit_once('-') else {
        return false;
    };
    !prefix.is_empty()
        && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !number.is_empty()
        && number.chars().all(|c| c.is_ascii_digit())
}

/// Scan every freeform task section in `lines`.
#[must_use]
pub fn scan(lines: &[&str], fallback_ts: DateTime<Utc>) -> (Vec<Task>, Vec<ParseIssue>) {
    let mut tasks = Vec::new();
    let mut issues = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let Some((id, title, glyph)) = parse_heading(lines[i]) else {
            i += 1;
            continue;
        };

        let end = (i + 1..lines.len())
            .find(|&k| ends_section(lines[k]))
            .unwrap_or(lines.len());
        tasks.push(read_section(id, title, glyph, &lines[i + 1..end], fallback_ts, &mut issues));
        i = end;
    }

    (tasks, issues)
}

fn ends_section(line: &str) -> bool {
    line.starts_with("## ") || strict::parse_heading(line).is_some()
}

/// Extract a bold `**Key:** value` line (optionally bulleted).
fn key_line(line: &str) -> Option<(String, &str)> {
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line)
        .trim_start();
    let rest = line.strip_prefix("**")?;
    let (key, value) = if let Some((key, value)) = rest.split_once(":**") {
        (key, value)
    } else {
        let (key, value) = rest.split_once("**")?;
        (key, value.strip_prefix(':')?)
    };
    Some((normalize(key), value.trim()))
}

/// Extract a `- [ ] name` / `- [x] name` checkbox line.
fn checkbox_line(line: &str) -> Option<Deliverable> {
    let line = line.trim();
    let rest = line.strip_prefix("- ").or_else(|| line.strip_prefix("* "))?;
    let (done, name) = if let Some(name) = rest.strip_prefix("[ ]") {
        (false, name)
    } else if let Some(name) = rest.strip_prefix("[x]").or_else(|| rest.strip_prefix("[X]")) {
        (true, name)
    } else {
        return None;
    };
    let name = name.trim();
    (!name.is_empty()).then(|| Deliverable {
        name: name.to_string(),
        done,
    })
}

fn read_section(
    id: &str,
    title: &str,
    glyph: Option<Status>,
    section: &[&str],
    fallback_ts: DateTime<Utc>,
    issues: &mut Vec<ParseIssue>,
) -> Task {
    let mut task = Task::minimal(id, title, fallback_ts);
    let mut text_status = None;
    let mut updated = None;

    let mut issue = |field: &str, raw: &str| {
        issues.push(
            ParseIssue::new(
                IssueKind::TaskField,
                format!("invalid {field} '{raw}'; using default"),
            )
            .for_task(id)
            .lossy(),
        );
    };

    let mut body_start = section.len();
    for (idx, line) in section.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(deliverable) = checkbox_line(line) {
            task.deliverables.push(deliverable);
            continue;
        }
        let Some((key, value)) = key_line(line) else {
            body_start = idx;
            break;
        };
        match key.as_str() {
            "status" | "state" => match value.parse::<Status>() {
                Ok(s) => text_status = Some(s),
                Err(_) => issue("status", value),
            },
            "priority" => match value.parse::<Priority>() {
                Ok(p) => task.priority = p,
                Err(_) => issue("priority", value),
            },
            "owner" | "claimed_by" | "claimed" | "claimant" => {
                task.claimed_by = agent_ref(value);
            }
            "assignee" | "assigned_to" | "assigned" => task.assigned_to = agent_ref(value),
            "created_by" | "creator" | "author" => {
                task.created_by = agent_ref(value).unwrap_or_default();
            }
            "created" => match parse_timestamp(value) {
                Some(ts) => task.created = ts,
                None => issue("created", value),
            },
            "updated" | "last_updated" => match parse_timestamp(value) {
                Some(ts) => updated = Some(ts),
                None => issue("updated", value),
            },
            "due" | "due_date" | "deadline" => {
                if !is_none_marker(value) {
                    match parse_date(value) {
                        Some(d) => task.due = Some(d),
                        None => issue("due", value),
                    }
                }
            }
            "tags" | "labels" => {
                let tags = split_list(value)
                    .into_iter()
                    .map(|t| t.trim_start_matches('#').to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                task.tags = dedup_ordered(tags);
            }
            "depends_on" | "dependencies" | "depends" | "blocked_by" => {
                task.depends_on = split_list(value);
            }
            "blocks" => task.blocks = split_list(value),
            "estimate" | "estimated" | "estimated_hours" => {
                if !is_none_marker(value) {
                    task.estimated_hours = parse_hours(value);
                    if task.estimated_hours.is_none() {
                        issue("estimate", value);
                    }
                }
            }
            "actual" | "actual_hours" | "spent" => {
                if !is_none_marker(value) {
                    task.actual_hours = parse_hours(value);
                    if task.actual_hours.is_none() {
                        issue("actual", value);
                    }
                }
            }
            _ => {
                body_start = idx;
                break;
            }
        }
    }

    task.status = glyph.or(text_status).unwrap_or_default();
    task.updated = updated.unwrap_or(task.created);
    task.description = trim_blank_lines(&section[body_start.min(section.len())..]);
    task
}

fn agent_ref(raw: &str) -> Option<String> {
    if is_none_marker(raw) {
        return None;
    }
    let name = normalize_agent_name(raw);
    (!name.is_empty()).then_some(name)
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e].join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_text(text: &str) -> (Vec<Task>, Vec<ParseIssue>) {
        let lines: Vec<&str> = text.lines().collect();
        scan(&lines, DateTime::<Utc>::UNIX_EPOCH)
    }

    #[test]
    fn heading_with_and_without_glyph() {
        assert_eq!(
            parse_heading("## TASK-004: Fix login ✅"),
            Some(("TASK-004", "Fix login", Some(Status::Done)))
        );
        assert_eq!(parse_heading("## BUG-12: Crash"), Some(("BUG-12", "Crash", None)));
        assert_eq!(parse_heading("## Agents"), None);
        assert_eq!(parse_heading("## Notes: misc"), None);
    }

    #[test]
    fn glyph_beats_status_line() {
        let (tasks, _) = scan_text("## TASK-001: Thing ✅\n**Status:** in progress\n");
        assert_eq!(tasks[0].status, Status::Done);
    }

    #[test]
    fn key_lines_and_description() {
        let (tasks, issues) = scan_text(
            "## TASK-010: Wire up webhooks\n- **Status:** Review\n**Priority:** urgent\n**Owner:** alice\n**Assignee:** @bob\n**Due:** 2026-02-01\n**Tags:** #infra, api\n**Depends on:** TASK-001, TASK-002\n**Estimate:** 6h\n- [x] design\n- [ ] rollout\n\nFirst paragraph.\n\n### Notes\nkept verbatim\n\n## TASK-011: Next\n",
        );
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(tasks.len(), 2);
        let t = &tasks[0];
        assert_eq!(t.status, Status::Review);
        assert_eq!(t.priority, Priority::Urgent);
        assert_eq!(t.claimed_by.as_deref(), Some("@alice"));
        assert_eq!(t.assigned_to.as_deref(), Some("@bob"));
        assert_eq!(t.tags, vec!["infra", "api"]);
        assert_eq!(t.depends_on, vec!["TASK-001", "TASK-002"]);
        assert_eq!(t.estimated_hours, Some(6.0));
        assert_eq!(t.deliverables.len(), 2);
        assert!(t.deliverables[0].done);
        assert_eq!(t.description, "First paragraph.\n\n### Notes\nkept verbatim");
    }

    #[test]
    fn unknown_bold_key_starts_description() {
        let (tasks, _) = scan_text("## TASK-020: x\n**Priority:** low\n**Context:** long story\nmore\n");
        assert_eq!(tasks[0].priority, Priority::Low);
        assert_eq!(tasks[0].description, "**Context:** long story\nmore");
    }

    #[test]
    fn bad_values_are_reported() {
        let (tasks, issues) = scan_text("## TASK-030: x\n**Status:** sideways\n**Priority:** meh\n");
        assert_eq!(tasks[0].status, Status::Backlog);
        assert_eq!(tasks[0].priority, Priority::Medium);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn strict_heading_ends_a_freeform_section() {
        let (tasks, _) = scan_text("## TASK-040: x\nbody\n### TASK-041 · strict\n```yaml\n```\n");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "body");
    }

    #[test]
    fn task_id_shape() {
        assert!(looks_like_task_id("TASK-001"));
        assert!(looks_like_task_id("web2-7"));
        assert!(!looks_like_task_id("TASK"));
        assert!(!looks_like_task_id("-1"));
        assert!(!looks_like_task_id("TASK-1a"));
    }
}
