//! Front-matter split and tolerant [`ProjectMeta`] decoding.

use chrono::{DateTime, Utc};
use serde_yaml::{Mapping, Value};

use super::values::{parse_timestamp, scalar_string, scalar_u64, string_list};
use super::{IssueKind, ParseIssue};
use crate::model::ProjectMeta;
use crate::model::document::default_states;

/// The line that opens and closes the front matter.
pub const DELIMITER: &str = "---";

/// Split `text` into decoded metadata and the remaining body.
///
/// Falls back to defaults (and records a [`IssueKind::Frontmatter`] issue)
/// when the block is missing, unterminated, or not a YAML mapping.
pub fn split<'a>(text: &'a str, issues: &mut Vec<ParseIssue>) -> (ProjectMeta, &'a str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let Some(after_open) = strip_delimiter_line(text) else {
        issues.push(ParseIssue::new(
            IssueKind::Frontmatter,
            "no front matter found; using default project metadata",
        ));
        return (ProjectMeta::default(), text);
    };

    let Some((yaml, body)) = find_closing(after_open) else {
        issues.push(
            ParseIssue::new(
                IssueKind::Frontmatter,
                "front matter is not terminated; treating the rest as body",
            )
            .lossy(),
        );
        return (ProjectMeta::default(), after_open);
    };

    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(map)) => (decode_meta(&map, issues), body),
        Ok(Value::Null) => (decode_meta(&Mapping::new(), issues), body),
        Ok(_) => {
            issues.push(
                ParseIssue::new(IssueKind::Frontmatter, "front matter is not a key-value mapping")
                    .lossy(),
            );
            (ProjectMeta::default(), body)
        }
        Err(err) => {
            issues.push(
                ParseIssue::new(IssueKind::Frontmatter, format!("front matter is not valid YAML: {err}"))
                    .lossy(),
            );
            (ProjectMeta::default(), body)
        }
    }
}

fn strip_delimiter_line(text: &str) -> Option<&str> {
    let (first, rest) = text.split_once('\n').unwrap_or((text, ""));
    (first.trim_end() == DELIMITER).then_some(rest)
}

/// Scan for the closing delimiter line. Returns `(yaml, body)`.
fn find_closing(text: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            return Some((&text[..offset], &text[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn decode_meta(map: &Mapping, issues: &mut Vec<ParseIssue>) -> ProjectMeta {
    let defaults = ProjectMeta::default();
    let mut meta_issue = |field: &str, raw: &Value| {
        issues.push(ParseIssue::new(
            IssueKind::MetaField,
            format!("invalid `{field}` value {raw:?}; using default"),
        ));
    };

    let project = match map.get("project") {
        None | Some(Value::Null) => defaults.project,
        Some(v) => scalar_string(v).unwrap_or_else(|| {
            meta_issue("project", v);
            String::new()
        }),
    };

    let title = map.get("title").and_then(scalar_string);

    let version = match map.get("version") {
        None | Some(Value::Null) => defaults.version,
        Some(v) => scalar_string(v).unwrap_or_else(|| {
            meta_issue("version", v);
            String::new()
        }),
    };

    let mut timestamp = |field: &str, fallback: DateTime<Utc>| match map.get(field) {
        None | Some(Value::Null) => fallback,
        Some(v) => scalar_string(v).as_deref().and_then(parse_timestamp).unwrap_or_else(|| {
            meta_issue(field, v);
            fallback
        }),
    };
    let created = timestamp("created", defaults.created);
    let updated = timestamp("updated", created);

    let states = match map.get("states") {
        None | Some(Value::Null) => default_states(),
        Some(v) => match string_list(v) {
            Some(list) if !list.is_empty() => list,
            _ => {
                meta_issue("states", v);
                default_states()
            }
        },
    };

    let id_prefix = match map.get("id_prefix") {
        None | Some(Value::Null) => defaults.id_prefix,
        Some(v) => match scalar_string(v) {
            Some(p) if !p.trim().is_empty() => p.trim().to_string(),
            _ => {
                meta_issue("id_prefix", v);
                defaults.id_prefix
            }
        },
    };

    let next_id = match map.get("next_id") {
        None | Some(Value::Null) => defaults.next_id,
        Some(v) => match scalar_u64(v) {
            Some(n) if n > 0 => n,
            _ => {
                meta_issue("next_id", v);
                defaults.next_id
            }
        },
    };

    ProjectMeta {
        project,
        title,
        version,
        created,
        updated,
        states,
        id_prefix,
        next_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_valid_block() {
        let mut issues = Vec::new();
        let text = "---\nproject: acme\nnext_id: 12\nid_prefix: ACME\n---\nbody line\n";
        let (meta, body) = split(text, &mut issues);
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(meta.project, "acme");
        assert_eq!(meta.next_id, 12);
        assert_eq!(meta.id_prefix, "ACME");
        assert_eq!(body, "body line\n");
    }

    #[test]
    fn invalid_fields_fall_back_individually() {
        let mut issues = Vec::new();
        let text = "---\nproject: acme\nnext_id: lots\ncreated: someday\nstates: 3\n---\n";
        let (meta, _) = split(text, &mut issues);
        assert_eq!(meta.project, "acme");
        assert_eq!(meta.next_id, 1);
        assert_eq!(meta.states, default_states());
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().all(|i| i.kind == IssueKind::MetaField));
    }

    #[test]
    fn broken_yaml_still_yields_body() {
        let mut issues = Vec::new();
        let text = "---\nproject: [unclosed\n---\n## Agents\n";
        let (meta, body) = split(text, &mut issues);
        assert_eq!(meta, ProjectMeta::default());
        assert_eq!(body, "## Agents\n");
        assert_eq!(issues[0].kind, IssueKind::Frontmatter);
        assert!(!issues[0].recoverable);
    }

    #[test]
    fn unterminated_block_keeps_remaining_text() {
        let mut issues = Vec::new();
        let (_, body) = split("---\nproject: x\n## Tasks\n", &mut issues);
        assert_eq!(body, "project: x\n## Tasks\n");
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn missing_block_uses_defaults() {
        let mut issues = Vec::new();
        let (meta, body) = split("# Just prose\n", &mut issues);
        assert_eq!(meta.next_id, 1);
        assert_eq!(body, "# Just prose\n");
        assert!(issues[0].recoverable);
    }
}
