//! Strict-dialect scanner.
//!
//! ````text
//! ### TASK-001 · Title
//!
//! ```yaml
//! status: todo
//! priority: high
//! ```
//!
//! > Description, one quoted line per line.
//! ````
//!
//! The first fenced block tagged `yaml`/`yml` after the heading (and before the
//! next heading) carries the fields. A block that cannot be decoded still yields
//! a task with the heading's id and title and safe defaults.

use chrono::{DateTime, Utc};
use serde_yaml::{Mapping, Value};

use super::values::{
    dedup_ordered, is_none_marker, parse_date, parse_timestamp, scalar_f64, scalar_string,
    string_list,
};
use super::{IssueKind, ParseIssue, is_heading};
use crate::model::{Deliverable, History, HistoryEntry, Task};

/// Separator between id and title in a strict heading (U+00B7).
pub const TITLE_SEPARATOR: char = '·';

/// Fence info strings that mark a structured task block.
pub const BLOCK_TAGS: &[&str] = &["yaml", "yml"];

/// Keys understood inside a structured block, in write order.
pub const KNOWN_KEYS: &[&str] = &[
    "status",
    "priority",
    "assigned_to",
    "claimed_by",
    "created_by",
    "created",
    "updated",
    "due",
    "tags",
    "depends_on",
    "blocks",
    "estimated_hours",
    "actual_hours",
    "deliverables",
    "history",
];

/// Parse `### <ID> · <Title>` into `(id, title)`.
#[must_use]
pub fn parse_heading(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("### ")?.trim();
    let (id, title) = rest.split_once(TITLE_SEPARATOR)?;
    let id = id.trim();
    if id.contains(char::is_whitespace) {
        return None;
    }
    Some((id, title.trim()))
}

/// Scan every strict task block in `lines`.
///
/// `fallback_ts` stands in for a missing `created` timestamp.
#[must_use]
pub fn scan(lines: &[&str], fallback_ts: DateTime<Utc>) -> (Vec<Task>, Vec<ParseIssue>) {
    let mut tasks = Vec::new();
    let mut issues = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let Some((id, title)) = parse_heading(lines[i]) else {
            i += 1;
            continue;
        };

        let (block, after_block) = locate_block(lines, i + 1);
        let (description, next) = read_blockquote(lines, after_block);

        let mut task = match block {
            Block::Payload(payload) => match serde_yaml::from_str::<Value>(&payload) {
                Ok(Value::Mapping(map)) => decode_task(&map, id, title, fallback_ts, &mut issues),
                Ok(Value::Null) => {
                    decode_task(&Mapping::new(), id, title, fallback_ts, &mut issues)
                }
                Ok(_) => {
                    issues.push(malformed(id, "structured block is not a key-value mapping"));
                    Task::minimal(id, title, fallback_ts)
                }
                Err(err) => {
                    issues.push(malformed(id, &format!("structured block is not valid YAML: {err}")));
                    Task::minimal(id, title, fallback_ts)
                }
            },
            Block::Unterminated => {
                issues.push(malformed(id, "structured block is missing its closing fence"));
                Task::minimal(id, title, fallback_ts)
            }
            Block::Missing => {
                issues.push(malformed(id, "heading has no structured block"));
                Task::minimal(id, title, fallback_ts)
            }
        };
        task.description = description;
        tasks.push(task);

        i = next.max(i + 1);
    }

    (tasks, issues)
}

fn malformed(id: &str, message: &str) -> ParseIssue {
    ParseIssue::new(IssueKind::TaskBlock, message).for_task(id).lossy()
}

enum Block {
    Payload(String),
    Unterminated,
    Missing,
}

/// Find the first structured fenced block starting at `from`.
///
/// Returns the block and the index just past it.
fn locate_block(lines: &[&str], from: usize) -> (Block, usize) {
    let mut j = from;
    while j < lines.len() {
        let line = lines[j].trim();
        if is_heading(line) {
            return (Block::Missing, j);
        }
        if let Some(tag) = line.strip_prefix("```") {
            let close = (j + 1..lines.len()).find(|&k| lines[k].trim() == "```");
            let Some(close) = close else {
                return if is_structured_tag(tag) {
                    (Block::Unterminated, j + 1)
                } else {
                    (Block::Missing, j + 1)
                };
            };
            if is_structured_tag(tag) {
                return (Block::Payload(lines[j + 1..close].join("\n")), close + 1);
            }
            j = close + 1;
            continue;
        }
        j += 1;
    }
    (Block::Missing, j)
}

fn is_structured_tag(tag: &str) -> bool {
    let tag = tag.trim().to_ascii_lowercase();
    BLOCK_TAGS.contains(&tag.as_str())
}

/// Read the `>` quoted description following a block.
///
/// Blank lines between quoted runs become empty description lines; the quote
/// ends at the first other line.
fn read_blockquote(lines: &[&str], from: usize) -> (String, usize) {
    let mut out: Vec<&str> = Vec::new();
    let mut k = from;

    loop {
        let mut next = k;
        while next < lines.len() && lines[next].trim().is_empty() {
            next += 1;
        }
        if next >= lines.len() || !lines[next].trim_start().starts_with('>') {
            break;
        }
        if !out.is_empty() {
            out.extend(std::iter::repeat_n("", next - k));
        }
        while next < lines.len() {
            let Some(quoted) = lines[next].trim_start().strip_prefix('>') else {
                break;
            };
            out.push(quoted.strip_prefix(' ').unwrap_or(quoted));
            next += 1;
        }
        k = next;
    }

    (out.join("\n"), k)
}

// ---------------------------------------------------------------------------
// Field decoding
// ---------------------------------------------------------------------------

struct Fields<'a> {
    map: &'a Mapping,
    id: &'a str,
    issues: &'a mut Vec<ParseIssue>,
}

impl Fields<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn invalid(&mut self, key: &str, raw: &Value) {
        self.issues.push(
            ParseIssue::new(
                IssueKind::TaskField,
                format!("invalid `{key}` value {raw:?}; using default"),
            )
            .for_task(self.id)
            .lossy(),
        );
    }

    fn parsed<T: std::str::FromStr + Default>(&mut self, key: &str) -> T {
        let Some(raw) = self.get(key).cloned() else {
            return T::default();
        };
        match scalar_string(&raw).and_then(|s| s.parse().ok()) {
            Some(v) => v,
            None => {
                self.invalid(key, &raw);
                T::default()
            }
        }
    }

    fn optional_string(&mut self, key: &str) -> Option<String> {
        let raw = self.get(key)?.clone();
        match scalar_string(&raw) {
            Some(s) if is_none_marker(&s) => None,
            Some(s) => Some(s),
            None => {
                self.invalid(key, &raw);
                None
            }
        }
    }

    fn timestamp(&mut self, key: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
        let Some(raw) = self.get(key).cloned() else {
            return fallback;
        };
        scalar_string(&raw)
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(|| {
                self.invalid(key, &raw);
                fallback
            })
    }

    fn list(&mut self, key: &str) -> Vec<String> {
        let Some(raw) = self.get(key).cloned() else {
            return Vec::new();
        };
        string_list(&raw).unwrap_or_else(|| {
            self.invalid(key, &raw);
            Vec::new()
        })
    }

    fn hours(&mut self, key: &str) -> Option<f64> {
        let raw = self.get(key)?.clone();
        scalar_f64(&raw).or_else(|| {
            self.invalid(key, &raw);
            None
        })
    }
}

/// Decode one structured block. Every field falls back on its own.
pub(crate) fn decode_task(
    map: &Mapping,
    id: &str,
    title: &str,
    fallback_ts: DateTime<Utc>,
    issues: &mut Vec<ParseIssue>,
) -> Task {
    let mut f = Fields { map, id, issues };

    for key in map.keys() {
        let known = key.as_str().is_some_and(|k| KNOWN_KEYS.contains(&k));
        if !known {
            f.issues.push(
                ParseIssue::new(IssueKind::TaskField, format!("unknown field {key:?} dropped"))
                    .for_task(id)
                    .lossy(),
            );
        }
    }

    let created = f.timestamp("created", fallback_ts);
    let due = match f.optional_string("due") {
        Some(raw) => parse_date(&raw).or_else(|| {
            f.invalid("due", &Value::String(raw));
            None
        }),
        None => None,
    };

    Task {
        id: id.to_string(),
        title: title.to_string(),
        status: f.parsed("status"),
        priority: f.parsed("priority"),
        assigned_to: f.optional_string("assigned_to"),
        claimed_by: f.optional_string("claimed_by"),
        created_by: f.optional_string("created_by").unwrap_or_default(),
        created,
        updated: f.timestamp("updated", created),
        due,
        tags: dedup_ordered(f.list("tags")),
        depends_on: f.list("depends_on"),
        blocks: f.list("blocks"),
        estimated_hours: f.hours("estimated_hours"),
        actual_hours: f.hours("actual_hours"),
        description: String::new(),
        deliverables: decode_deliverables(&mut f),
        history: decode_history(&mut f),
    }
}

fn decode_deliverables(f: &mut Fields<'_>) -> Vec<Deliverable> {
    let Some(raw) = f.get("deliverables").cloned() else {
        return Vec::new();
    };
    let Value::Sequence(items) = &raw else {
        f.invalid("deliverables", &raw);
        return Vec::new();
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let decoded = match item {
            Value::Mapping(m) => m.get("name").and_then(scalar_string).map(|name| Deliverable {
                name,
                done: m.get("done").and_then(Value::as_bool).unwrap_or(false),
            }),
            other => scalar_string(other).map(|name| Deliverable { name, done: false }),
        };
        match decoded {
            Some(d) => out.push(d),
            None => f.invalid("deliverables", item),
        }
    }
    out
}

fn decode_history(f: &mut Fields<'_>) -> History {
    let Some(raw) = f.get("history").cloned() else {
        return History::new();
    };
    let Value::Sequence(items) = &raw else {
        f.invalid("history", &raw);
        return History::new();
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        match decode_history_entry(item) {
            Some(entry) => entries.push(entry),
            None => f.invalid("history", item),
        }
    }
    History::from(entries)
}

fn decode_history_entry(item: &Value) -> Option<HistoryEntry> {
    let m = item.as_mapping()?;
    let text = |key: &str| m.get(key).and_then(scalar_string);

    let ts = text("ts").as_deref().and_then(parse_timestamp)?;
    let action = text("action").filter(|a| !a.trim().is_empty())?;
    Some(HistoryEntry {
        ts,
        who: text("who").unwrap_or_default(),
        action,
        note: text("note"),
        from: text("from"),
        to: text("to"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, Status};

    fn scan_text(text: &str) -> (Vec<Task>, Vec<ParseIssue>) {
        let lines: Vec<&str> = text.lines().collect();
        scan(&lines, DateTime::<Utc>::UNIX_EPOCH)
    }

    #[test]
    fn heading_forms() {
        assert_eq!(parse_heading("### TASK-001 · Build auth"), Some(("TASK-001", "Build auth")));
        assert_eq!(parse_heading("### TASK-001 · a · b"), Some(("TASK-001", "a · b")));
        assert_eq!(parse_heading("### TASK-001 ·"), Some(("TASK-001", "")));
        assert_eq!(parse_heading("### Notes"), None);
        assert_eq!(parse_heading("## TASK-001: x"), None);
    }

    #[test]
    fn decodes_full_block() {
        let (tasks, issues) = scan_text(
            "### TASK-002 · Ship it\n\n```yaml\nstatus: In Progress\npriority: P1\nclaimed_by: '@bob'\ntags: [api, api, web]\ndepends_on: [TASK-001]\nestimated_hours: 3\ndeliverables:\n- name: docs\n  done: true\n- tests\nhistory:\n- ts: 2026-01-01T00:00:00Z\n  who: '@bob'\n  action: created\n```\n\n> line one\n>\n> line three\n\n## Next\n",
        );
        assert!(issues.is_empty(), "{issues:?}");
        let t = &tasks[0];
        assert_eq!(t.status, Status::InProgress);
        assert_eq!(t.priority, Priority::High);
        assert_eq!(t.claimed_by.as_deref(), Some("@bob"));
        assert_eq!(t.tags, vec!["api", "web"]);
        assert_eq!(t.depends_on, vec!["TASK-001"]);
        assert_eq!(t.estimated_hours, Some(3.0));
        assert_eq!(t.deliverables.len(), 2);
        assert!(t.deliverables[0].done);
        assert_eq!(t.history.len(), 1);
        assert_eq!(t.description, "line one\n\nline three");
    }

    #[test]
    fn malformed_block_still_yields_task() {
        let (tasks, issues) = scan_text("### TASK-009 · Broken\n```yaml\nstatus: [oops\n```\n");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "TASK-009");
        assert_eq!(tasks[0].title, "Broken");
        assert_eq!(tasks[0].status, Status::Backlog);
        assert_eq!(tasks[0].priority, Priority::Medium);
        assert_eq!(issues[0].kind, IssueKind::TaskBlock);
        assert_eq!(issues[0].task_id.as_deref(), Some("TASK-009"));
    }

    #[test]
    fn bad_values_default_per_field() {
        let (tasks, issues) =
            scan_text("### TASK-003 · x\n```yaml\nstatus: sideways\npriority: high\ndue: whenever\n```\n");
        assert_eq!(tasks[0].status, Status::Backlog);
        assert_eq!(tasks[0].priority, Priority::High);
        assert!(tasks[0].due.is_none());
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.kind == IssueKind::TaskField));
    }

    #[test]
    fn missing_block_and_unterminated_fence() {
        let (tasks, issues) =
            scan_text("### TASK-004 · no block\n\n### TASK-005 · open fence\n```yaml\nstatus: done\n");
        assert_eq!(tasks.len(), 2);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn other_fences_are_skipped() {
        let (tasks, issues) =
            scan_text("### TASK-006 · code first\n```rust\n# not a heading\n```\n```yaml\npriority: low\n```\n");
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(tasks[0].priority, Priority::Low);
    }

    #[test]
    fn dangling_references_are_preserved() {
        let (tasks, _) = scan_text("### TASK-007 · x\n```yaml\ndepends_on: [TASK-404]\nblocks: [TASK-405]\n```\n");
        assert_eq!(tasks[0].depends_on, vec!["TASK-404"]);
        assert_eq!(tasks[0].blocks, vec!["TASK-405"]);
    }
}
