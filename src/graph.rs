//! Graph projection and export
//!
//! Turns a resolved revision list into the `{nodes, edges}` payload consumed
//! by the browser viewer, plus DOT export and the row layout used by the
//! terminal tree.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::revision::{DisplayOptions, Revision, RevisionStatus};

pub const CURRENT_COLOR: &str = "#2e7d32";
pub const APPLIED_COLOR: &str = "#1565c0";
pub const PENDING_COLOR: &str = "#9e9e9e";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    /// Tooltip text
    pub title: String,
    pub color: String,
}

/// Directed parent -> child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

pub fn status_color(status: RevisionStatus) -> &'static str {
    match status {
        RevisionStatus::Current => CURRENT_COLOR,
        RevisionStatus::Applied => APPLIED_COLOR,
        RevisionStatus::Pending => PENDING_COLOR,
    }
}

/// One node per revision, one edge per parent pointer
pub fn project(revisions: &[Revision], display: &DisplayOptions) -> RevisionGraph {
    let nodes = revisions
        .iter()
        .map(|rev| GraphNode {
            id: rev.id.clone(),
            label: rev.short_id(display),
            title: rev.message.clone(),
            color: status_color(rev.status()).to_string(),
        })
        .collect();

    let edges = revisions
        .iter()
        .flat_map(|rev| {
            rev.parents.iter().map(move |parent| GraphEdge {
                from: parent.clone(),
                to: rev.id.clone(),
            })
        })
        .collect();

    RevisionGraph { nodes, edges }
}

/// Configuration for DOT export
#[derive(Debug, Clone)]
pub struct DotConfig {
    pub title: Option<String>,
    /// "TB" (top-bottom) or "LR" (left-right)
    pub rankdir: String,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            title: None,
            rankdir: "BT".to_string(),
        }
    }
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Render a projected graph in Graphviz DOT format
pub fn graph_to_dot(graph: &RevisionGraph, config: &DotConfig) -> String {
    let mut dot = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(dot, "digraph Migrations {{");
    let _ = writeln!(dot, "  rankdir={};", config.rankdir);
    let _ = writeln!(dot, "  node [fontname=\"Arial\" fontsize=10 shape=box style=\"rounded,filled\" fontcolor=\"white\"];");
    if let Some(title) = &config.title {
        let _ = writeln!(dot, "  label=\"{}\";", escape_dot(title));
        let _ = writeln!(dot, "  labelloc=t;");
    }
    let _ = writeln!(dot);

    for node in &graph.nodes {
        let _ = writeln!(
            dot,
            "  \"{}\" [label=\"{}\" tooltip=\"{}\" fillcolor=\"{}\"];",
            escape_dot(&node.id),
            escape_dot(&node.label),
            escape_dot(&node.title),
            node.color
        );
    }

    if !graph.edges.is_empty() {
        let _ = writeln!(dot);
    }
    for edge in &graph.edges {
        let _ = writeln!(
            dot,
            "  \"{}\" -> \"{}\";",
            escape_dot(&edge.from),
            escape_dot(&edge.to)
        );
    }

    let _ = writeln!(dot, "}}");
    dot
}

/// A revision placed in the terminal tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeRow {
    /// Index into the revision list
    pub index: usize,
    /// Indentation level; side branches of a merge sit one level deeper
    pub depth: usize,
}

/// Lay revisions out newest-first, walking from each head down its parents.
///
/// First parents continue at the same depth, other parents of a merge are
/// indented. Each revision appears once; anything unreachable from a head
/// (a cycle, for instance) is appended at depth 0.
pub fn tree_rows(revisions: &[Revision]) -> Vec<TreeRow> {
    let index: HashMap<&str, usize> = revisions
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.as_str(), i))
        .collect();
    let referenced: HashSet<&str> = revisions
        .iter()
        .flat_map(|r| r.parents.iter().map(String::as_str))
        .collect();

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(revisions.len());

    let heads = revisions
        .iter()
        .enumerate()
        .filter(|(_, r)| !referenced.contains(r.id.as_str()));

    for (head, _) in heads {
        let mut stack = vec![(head, 0usize)];
        while let Some((i, depth)) = stack.pop() {
            if !seen.insert(i) {
                continue;
            }
            rows.push(TreeRow { index: i, depth });
            for (n, parent) in revisions[i].parents.iter().enumerate().rev() {
                if let Some(&p) = index.get(parent.as_str()) {
                    stack.push((p, if n == 0 { depth } else { depth + 1 }));
                }
            }
        }
    }

    for i in 0..revisions.len() {
        if seen.insert(i) {
            rows.push(TreeRow { index: i, depth: 0 });
        }
    }

    rows
}
