//! INI file reading and surgical patching
//!
//! `alembic.ini` belongs to the user. We read it into a plain mapping and, when
//! settings change, rewrite only the lines for the keys being set. Comments,
//! blank lines, ordering and untouched keys come out byte-identical.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    static ref SECTION_HEADER: Regex = Regex::new(r"^\[([^\]]+)\]\s*$").expect("section pattern is valid");
    static ref ENTRY: Regex =
        Regex::new(r"^(?P<key>[^=:\s;#\[][^=:]*?)(?P<sep>\s*[=:]\s*)(?P<value>.*)$").expect("entry pattern is valid");
}

/// section -> key -> value
pub type Sections = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Error)]
pub enum IniError {
    #[error("cannot access {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("invalid section name '{0}'")]
    InvalidSection(String),
}

impl IniError {
    /// The caller asked for something that can't be written, as opposed to
    /// the file being unreadable.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, IniError::InvalidKey { .. } | IniError::InvalidSection(_))
    }
}

pub type Result<T> = std::result::Result<T, IniError>;

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Blank,
    Comment,
    Section(&'a str),
    Entry {
        key: &'a str,
        sep: &'a str,
        value: &'a str,
    },
    Continuation(&'a str),
    Other,
}

/// Indented lines, whitespace-only ones included, continue the previous
/// value. Only a truly empty line ends it.
fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    if line.starts_with(char::is_whitespace) {
        return Line::Continuation(trimmed);
    }
    if trimmed.starts_with(';') || trimmed.starts_with('#') {
        return Line::Comment;
    }
    if let Some(caps) = SECTION_HEADER.captures(line) {
        if let Some(name) = caps.get(1) {
            return Line::Section(name.as_str().trim());
        }
    }
    match ENTRY.captures(line) {
        Some(caps) => match (caps.name("key"), caps.name("sep"), caps.name("value")) {
            (Some(key), Some(sep), Some(value)) => Line::Entry {
                key: key.as_str().trim_end(),
                sep: sep.as_str(),
                value: value.as_str().trim_end(),
            },
            _ => Line::Other,
        },
        None => Line::Other,
    }
}

/// Parse INI text. Later keys win; entries before the first header are ignored.
pub fn parse(text: &str) -> Sections {
    let mut sections = Sections::new();
    let mut current: Option<String> = None;
    let mut last_key: Option<String> = None;

    for line in text.lines() {
        match classify(line) {
            Line::Section(name) => {
                sections.entry(name.to_string()).or_default();
                current = Some(name.to_string());
                last_key = None;
            }
            Line::Entry { key, value, .. } => {
                if let Some(section) = current.as_ref().and_then(|s| sections.get_mut(s)) {
                    section.insert(key.to_string(), value.to_string());
                    last_key = Some(key.to_string());
                }
            }
            Line::Continuation(more) => {
                let section = current.as_ref().and_then(|s| sections.get_mut(s));
                if let (Some(section), Some(key)) = (section, last_key.as_ref()) {
                    if let Some(value) = section.get_mut(key) {
                        if !value.is_empty() {
                            value.push('\n');
                        }
                        value.push_str(more);
                    }
                }
            }
            Line::Blank => last_key = None,
            Line::Comment | Line::Other => {}
        }
    }

    // Whitespace-only continuation lines at the end of a value carry nothing
    for value in sections.values_mut().flat_map(|s| s.values_mut()) {
        let kept = value.trim_end_matches('\n').len();
        value.truncate(kept);
    }

    sections
}

/// Trim keys and reject anything that would read back as a different key, a
/// comment or a section header. Carriage returns in values become line breaks.
fn normalize_updates(section: &str, updates: &[(String, String)]) -> Result<Vec<(String, String)>> {
    if section.is_empty()
        || section != section.trim()
        || section.contains(|c: char| matches!(c, ']' | '\n' | '\r'))
    {
        return Err(IniError::InvalidSection(section.to_string()));
    }

    updates
        .iter()
        .map(|(key, value)| {
            let trimmed = key.trim();
            let invalid = |reason| IniError::InvalidKey {
                key: key.clone(),
                reason,
            };
            if trimmed.is_empty() {
                return Err(invalid("empty"));
            }
            if trimmed.contains(|c: char| matches!(c, '=' | ':')) {
                return Err(invalid("contains a separator"));
            }
            if trimmed.contains(|c: char| matches!(c, '\n' | '\r')) {
                return Err(invalid("contains a line break"));
            }
            if trimmed.starts_with(|c: char| matches!(c, ';' | '#' | '[')) {
                return Err(invalid("starts with a comment or header character"));
            }
            let value = value.replace("\r\n", "\n").replace('\r', "\n");
            Ok((trimmed.to_string(), value))
        })
        .collect()
}

/// Set `updates` in `section`, leaving every other line alone.
///
/// Existing keys are rewritten in place, missing keys are added after the
/// section's last entry, and a missing section is appended at the end.
/// Applying the same updates twice gives the same text.
pub fn update_section(text: &str, section: &str, updates: &[(String, String)]) -> Result<String> {
    if updates.is_empty() {
        return Ok(text.to_string());
    }
    let updates = normalize_updates(section, updates)?;

    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let lookup: BTreeMap<&str, &str> = updates
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let mut order: Vec<&str> = Vec::new();
    for (key, _) in &updates {
        if !order.contains(&key.as_str()) {
            order.push(key.as_str());
        }
    }

    let mut out: Vec<String> = Vec::new();
    let mut written: HashSet<&str> = HashSet::new();
    let mut in_target = false;
    let mut found = false;
    let mut insert_at = 0usize;
    let mut dropping_continuation = false;

    for line in text.lines() {
        let kind = classify(line);
        if !matches!(kind, Line::Continuation(_)) {
            dropping_continuation = false;
        }

        match kind {
            Line::Section(name) => {
                if in_target {
                    insert_missing(&mut out, insert_at, &order, &lookup, &mut written, newline);
                }
                in_target = name == section;
                found |= in_target;
                out.push(line.to_string());
                insert_at = out.len();
            }
            Line::Entry { key, sep, value } if in_target => {
                match lookup.get(key) {
                    Some(&new_value) => {
                        if value == new_value {
                            out.push(line.to_string());
                        } else {
                            out.push(render_entry(key, sep, new_value, newline));
                        }
                        written.insert(key);
                        dropping_continuation = true;
                    }
                    None => out.push(line.to_string()),
                }
                insert_at = out.len();
            }
            Line::Continuation(_) if in_target => {
                if !dropping_continuation {
                    out.push(line.to_string());
                    insert_at = out.len();
                }
            }
            _ => out.push(line.to_string()),
        }
    }

    if in_target {
        insert_missing(&mut out, insert_at, &order, &lookup, &mut written, newline);
    }

    let mut trailing_newline = text.ends_with('\n');
    if !found {
        if out.last().is_some_and(|l| !l.trim().is_empty()) {
            out.push(String::new());
        }
        out.push(format!("[{}]", section));
        for key in &order {
            out.push(render_entry(key, " = ", lookup[key], newline));
        }
        trailing_newline = true;
    }

    let mut result = out.join(newline);
    if trailing_newline {
        result.push_str(newline);
    }
    Ok(result)
}

fn insert_missing<'a>(
    out: &mut Vec<String>,
    at: usize,
    order: &[&'a str],
    lookup: &BTreeMap<&str, &str>,
    written: &mut HashSet<&'a str>,
    newline: &str,
) {
    let missing: Vec<String> = order
        .iter()
        .copied()
        .filter(|key| written.insert(*key))
        .map(|key| render_entry(key, " = ", lookup[key], newline))
        .collect();
    let at = at.min(out.len());
    out.splice(at..at, missing);
}

/// `key = value`, keeping the original separator style. Multi-line values are
/// written as indented continuation lines.
fn render_entry(key: &str, sep: &str, value: &str, newline: &str) -> String {
    let sep = if sep.trim() == sep || sep.ends_with(char::is_whitespace) {
        sep.to_string()
    } else {
        format!("{} ", sep)
    };
    let value = value
        .lines()
        .collect::<Vec<_>>()
        .join(&format!("{}    ", newline));
    format!("{}{}{}", key, sep, value)
}

pub fn read_file(path: &Path) -> Result<Sections> {
    let text = fs::read_to_string(path).map_err(|source| IniError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse(&text))
}

/// Read, patch and write back `path`. Returns the new text.
pub fn patch_file(path: &Path, section: &str, updates: &[(String, String)]) -> Result<String> {
    let text = fs::read_to_string(path).map_err(|source| IniError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    let patched = update_section(&text, section, updates)?;
    if patched != text {
        fs::write(path, &patched).map_err(|source| IniError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), section, keys = updates.len(), "patched config file");
    }
    Ok(patched)
}
