//! Parsers for `alembic` text output
//!
//! Handles `history`, `current`, `heads` and `list_templates`. Lines that
//! don't match the expected shape are skipped; an empty history is an empty
//! list, not an error.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::revision::Revision;

lazy_static! {
    // <parents> -> <id> (head) (branchpoint), <message>
    static ref HISTORY_LINE: Regex =
        Regex::new(r"^(?P<parents>.+?) -> (?P<id>[0-9A-Za-z_\-]+)(?P<tags>(?:\s+\([a-z ]+\))*),\s?(?P<message>.*)$")
            .expect("history pattern is valid");
    static ref TAG: Regex = Regex::new(r"\(([a-z ]+)\)").expect("tag pattern is valid");
    static ref REVISION_ID: Regex = Regex::new(r"^[0-9A-Za-z_\-]+$").expect("id pattern is valid");
    static ref TEMPLATE_LINE: Regex =
        Regex::new(r"^(?P<name>[A-Za-z0-9_\-]+) - (?P<description>.+)$").expect("template pattern is valid");
}

/// Parent markers alembic prints for root revisions
const ROOT_MARKERS: [&str; 2] = ["None", "<base>"];

/// Parse `alembic history` output into revisions.
///
/// `is_current` is left false and `is_applied` true; `resolve` settles both.
pub fn parse_history(text: &str) -> Vec<Revision> {
    let mut seen = HashSet::new();
    let mut revisions = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(rev) = parse_history_line(line) else {
            tracing::debug!(line, "skipping unrecognised history line");
            continue;
        };
        if seen.insert(rev.id.clone()) {
            revisions.push(rev);
        }
    }

    revisions
}

fn parse_history_line(line: &str) -> Option<Revision> {
    let caps = HISTORY_LINE.captures(line)?;
    let parents = parse_parents(caps.name("parents")?.as_str())?;
    let id = caps.name("id")?.as_str();
    let message = caps.name("message").map_or("", |m| m.as_str()).trim();

    let mut rev = Revision::new(id, parents, message);
    if let Some(tags) = caps.name("tags") {
        for tag in TAG.captures_iter(tags.as_str()) {
            match tag.get(1).map(|m| m.as_str()) {
                Some("head") | Some("effective head") => rev.is_head = true,
                Some("branchpoint") => rev.is_branch_point = true,
                Some("mergepoint") => rev.is_merge_point = true,
                _ => {}
            }
        }
    }
    Some(rev)
}

/// `None`, `<base>`, `abc`, `abc, def` or `(abc, def)`.
/// Anything else (such as a log prefix) rejects the line.
fn parse_parents(raw: &str) -> Option<Vec<String>> {
    let raw = raw.trim();
    if ROOT_MARKERS.contains(&raw) {
        return Some(Vec::new());
    }
    let raw = raw
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(raw);

    raw.split(',')
        .map(str::trim)
        .map(|p| REVISION_ID.is_match(p).then(|| p.to_string()))
        .collect()
}

/// Every revision id reported by `alembic current`
pub fn parse_current_ids(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_log_line(line))
        .filter_map(|line| line.split_whitespace().next())
        .filter(|token| REVISION_ID.is_match(token))
        .map(str::to_string)
        .collect()
}

/// The revision the database is at, if any
pub fn parse_current(text: &str) -> Option<String> {
    let mut ids = parse_current_ids(text).into_iter();
    let first = ids.next();
    let extra = ids.count();
    if extra > 0 {
        tracing::debug!(extra, "database reports several current heads, using the first");
    }
    first
}

fn is_log_line(line: &str) -> bool {
    ["INFO", "WARNING", "WARN", "ERROR", "DEBUG"]
        .iter()
        .any(|level| line.starts_with(level))
}

/// Parse `alembic heads` (plain or `-v`) output
pub fn parse_heads(text: &str) -> Vec<String> {
    let verbose: Vec<String> = text
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Rev:"))
        .filter_map(|rest| rest.split_whitespace().next())
        .map(str::to_string)
        .collect();
    if !verbose.is_empty() {
        return verbose;
    }

    text.lines()
        .filter(|line| !line.starts_with(char::is_whitespace))
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_log_line(line))
        .filter_map(|line| line.split_whitespace().next())
        .filter(|token| REVISION_ID.is_match(token))
        .map(str::to_string)
        .collect()
}

/// A project template offered by `alembic init`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    pub name: String,
    pub description: String,
}

/// Parse `alembic list_templates` output
pub fn parse_templates(text: &str) -> Vec<Template> {
    text.lines()
        .filter_map(|line| TEMPLATE_LINE.captures(line.trim()))
        .filter_map(|caps| {
            Some(Template {
                name: caps.name("name")?.as_str().to_string(),
                description: caps.name("description")?.as_str().trim().to_string(),
            })
        })
        .collect()
}

/// Parse history, then flag the revision named by `current` output
pub fn parse_revisions(history: &str, current: &str) -> Vec<Revision> {
    let current = parse_current(current);
    let mut revisions = parse_history(history);
    mark_current(&mut revisions, current.as_deref());
    revisions
}

pub fn mark_current(revisions: &mut [Revision], current: Option<&str>) {
    for rev in revisions.iter_mut() {
        rev.is_current = current == Some(rev.id.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HISTORY: &str = "\
ae1027a6acf -> 27c6a30d7c24 (head), add shopping cart
1975ea83b712 -> ae1027a6acf, add a column
<base> -> 1975ea83b712, create account table
";

    #[test]
    fn test_parse_history_basic() {
        let revs = parse_history(HISTORY);
        assert_eq!(revs.len(), 3);
        assert_eq!(revs[0].id, "27c6a30d7c24");
        assert_eq!(revs[0].parents, vec!["ae1027a6acf".to_string()]);
        assert_eq!(revs[0].message, "add shopping cart");
        assert!(revs[0].is_head);
        assert!(revs[2].is_root());
        assert!(revs.iter().all(|r| r.is_applied && !r.is_current));
    }

    #[test]
    fn test_parse_history_none_parent() {
        let revs = parse_history("None -> aaa111, init schema\naaa111 -> bbb222, add users");
        assert_eq!(revs.len(), 2);
        assert!(revs[0].parents.is_empty());
        assert_eq!(revs[1].down_revision(), Some("aaa111"));
    }

    #[test]
    fn test_parse_history_empty() {
        assert!(parse_history("").is_empty());
        assert!(parse_history("\n\n").is_empty());
    }

    #[test]
    fn test_parse_history_skips_noise() {
        let text = "Rev history:\n\nNone -> aaa111, init\nsomething odd\n";
        let revs = parse_history(text);
        assert_eq!(revs.len(), 1);
        assert_eq!(revs[0].id, "aaa111");
    }

    #[test]
    fn test_parse_history_rejects_log_lines() {
        let text = "INFO  [alembic.runtime.migration] Running upgrade aaa -> bbb, add users";
        assert!(parse_history(text).is_empty());
    }

    #[test]
    fn test_parse_history_message_with_arrow() {
        let revs = parse_history("aaa111 -> bbb222, rename a -> b, then c");
        assert_eq!(revs.len(), 1);
        assert_eq!(revs[0].id, "bbb222");
        assert_eq!(revs[0].message, "rename a -> b, then c");
    }

    #[test]
    fn test_parse_history_merge_revision() {
        let text = "\
bbb222, ccc333 -> ddd444 (head) (mergepoint), merge heads
aaa111 -> ccc333, branch two
aaa111 -> bbb222, branch one
<base> -> aaa111 (branchpoint), init
";
        let revs = parse_history(text);
        assert_eq!(revs.len(), 4);
        assert_eq!(revs[0].parents, vec!["bbb222".to_string(), "ccc333".to_string()]);
        assert!(revs[0].is_merge_point);
        assert!(revs[0].is_head);
        assert!(revs[3].is_branch_point);
    }

    #[test]
    fn test_parse_history_parenthesised_parents() {
        let revs = parse_history("(bbb222, ccc333) -> ddd444, merge");
        assert_eq!(revs[0].parents.len(), 2);
    }

    #[test]
    fn test_parse_history_dedupes_ids() {
        let revs = parse_history("None -> aaa111, first\nNone -> aaa111, again");
        assert_eq!(revs.len(), 1);
        assert_eq!(revs[0].message, "first");
    }

    #[test]
    fn test_parse_current() {
        assert_eq!(parse_current("bbb222 (head)\n"), Some("bbb222".to_string()));
        assert_eq!(parse_current(""), None);
        assert_eq!(
            parse_current("INFO  [alembic.runtime.migration] Context impl SQLiteImpl.\n"),
            None
        );
        assert_eq!(
            parse_current("INFO  [alembic] Will assume transactional DDL.\naaa111\n"),
            Some("aaa111".to_string())
        );
    }

    #[test]
    fn test_parse_current_several_heads() {
        let ids = parse_current_ids("bbb222 (head)\nccc333 (head)\n");
        assert_eq!(ids, vec!["bbb222", "ccc333"]);
        assert_eq!(parse_current("bbb222 (head)\nccc333 (head)\n"), Some("bbb222".to_string()));
    }

    #[test]
    fn test_parse_heads_plain_and_verbose() {
        assert_eq!(parse_heads("bbb222 (head)\nccc333 (head)\n"), vec!["bbb222", "ccc333"]);

        let verbose = "\
Rev: bbb222 (head)
Parent: aaa111
Path: /proj/alembic/versions/bbb222_add_users.py

    add users

    Revision ID: bbb222
";
        assert_eq!(parse_heads(verbose), vec!["bbb222"]);
    }

    #[test]
    fn test_parse_templates() {
        let text = "\
Available templates:

generic - Generic single-database configuration.
async - Generic single-database configuration with an async dbapi.
multidb - Rudimentary multi-database configuration.

Templates are used via the 'init' command, e.g.:

  alembic init --template generic ./scripts
";
        let templates = parse_templates(text);
        assert_eq!(templates.len(), 3);
        assert_eq!(templates[0].name, "generic");
        assert_eq!(templates[2].description, "Rudimentary multi-database configuration.");
    }

    #[test]
    fn test_parse_revisions_end_to_end() {
        let history = "None -> aaa111, init schema\naaa111 -> bbb222, add users";
        let revs = parse_revisions(history, "bbb222");
        assert!(!revs[0].is_current);
        assert!(revs[1].is_current);
    }

    proptest! {
        #[test]
        fn prop_history_ids_unique(
            lines in proptest::collection::vec(("[a-f0-9]{4}", "[a-f0-9]{4}", "[a-z ]{0,12}"), 0..20)
        ) {
            let text: String = lines
                .iter()
                .map(|(p, id, msg)| format!("{} -> {}, {}\n", p, id, msg))
                .collect();
            let revs = parse_history(&text);
            let ids: HashSet<_> = revs.iter().map(|r| r.id.clone()).collect();
            prop_assert_eq!(ids.len(), revs.len());
        }
    }
}
