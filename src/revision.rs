//! Revision model
//!
//! A `Revision` is one migration script as reported by `alembic history`.
//! Lists of revisions are rebuilt from scratch on every refresh.

use serde::{Deserialize, Serialize};

/// Default number of characters shown for a revision id
pub const SHORT_ID_LEN: usize = 8;

/// Default maximum message length before truncation
pub const DEFAULT_MESSAGE_MAX_LEN: usize = 60;

/// A single migration step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: String,
    /// Zero parents for a root, two or more for a merge revision
    pub parents: Vec<String>,
    pub message: String,
    pub is_current: bool,
    pub is_applied: bool,
    #[serde(default)]
    pub is_head: bool,
    #[serde(default)]
    pub is_branch_point: bool,
    #[serde(default)]
    pub is_merge_point: bool,
}

/// Where a revision stands relative to the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionStatus {
    Current,
    Applied,
    Pending,
}

impl RevisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionStatus::Current => "current",
            RevisionStatus::Applied => "applied",
            RevisionStatus::Pending => "pending",
        }
    }
}

impl std::fmt::Display for RevisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Revision {
    pub fn new(id: impl Into<String>, parents: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parents,
            message: message.into(),
            is_current: false,
            is_applied: true,
            is_head: false,
            is_branch_point: false,
            is_merge_point: false,
        }
    }

    /// First parent, for callers that only care about the linear chain
    pub fn down_revision(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn status(&self) -> RevisionStatus {
        if self.is_current {
            RevisionStatus::Current
        } else if self.is_applied {
            RevisionStatus::Applied
        } else {
            RevisionStatus::Pending
        }
    }

    pub fn short_id(&self, display: &DisplayOptions) -> String {
        if display.full_hash {
            self.id.clone()
        } else {
            self.id.chars().take(SHORT_ID_LEN).collect()
        }
    }

    pub fn display_message(&self, display: &DisplayOptions) -> String {
        truncate(&self.message, display.message_max_len)
    }
}

/// How ids and messages are shortened for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayOptions {
    pub full_hash: bool,
    pub message_max_len: usize,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            full_hash: false,
            message_max_len: DEFAULT_MESSAGE_MAX_LEN,
        }
    }
}

/// Truncate on character boundaries, marking the cut with "..."
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}
