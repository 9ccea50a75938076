//! Migration state snapshots
//!
//! `MigrationSource` is the narrow seam between "where revisions come from"
//! and everything that renders them. The alembic text parser is one source;
//! tests use in-memory ones.

use crate::error::{Error, Result};
use crate::graph::{self, RevisionGraph};
use crate::history;
use crate::resolve;
use crate::revision::{DisplayOptions, Revision};
use crate::runner::AlembicCli;

pub trait MigrationSource {
    /// Every known revision, current/applied flags not yet settled
    fn list_revisions(&self) -> Result<Vec<Revision>>;

    /// Revision the database is at, `None` for an unmigrated database
    fn current_revision(&self) -> Result<Option<String>>;
}

impl MigrationSource for AlembicCli {
    fn list_revisions(&self) -> Result<Vec<Revision>> {
        Ok(history::parse_history(&self.history(false)?))
    }

    fn current_revision(&self) -> Result<Option<String>> {
        Ok(history::parse_current(&self.current()?))
    }
}

/// One refresh worth of revisions, with current and applied flags resolved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationState {
    pub revisions: Vec<Revision>,
    pub current: Option<String>,
}

impl MigrationState {
    pub fn load(source: &dyn MigrationSource) -> Result<Self> {
        let revisions = source.list_revisions()?;
        let current = source.current_revision()?;
        Ok(Self::from_parts(revisions, current))
    }

    pub fn from_parts(mut revisions: Vec<Revision>, current: Option<String>) -> Self {
        history::mark_current(&mut revisions, current.as_deref());
        let revisions = resolve::resolve_or_pending(revisions, current.as_deref());
        tracing::debug!(
            revisions = revisions.len(),
            current = current.as_deref().unwrap_or("<none>"),
            "migration state loaded"
        );
        Self { revisions, current }
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Revisions nothing else builds on
    pub fn heads(&self) -> Vec<&Revision> {
        let referenced: std::collections::HashSet<&str> = self
            .revisions
            .iter()
            .flat_map(|r| r.parents.iter().map(String::as_str))
            .collect();
        self.revisions
            .iter()
            .filter(|r| !referenced.contains(r.id.as_str()))
            .collect()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.iter().filter(|r| !r.is_applied)
    }

    /// Look a revision up by full id or unambiguous prefix
    pub fn find(&self, id_or_prefix: &str) -> Result<&Revision> {
        if let Some(rev) = self.revisions.iter().find(|r| r.id == id_or_prefix) {
            return Ok(rev);
        }
        let mut matches = self
            .revisions
            .iter()
            .filter(|r| !id_or_prefix.is_empty() && r.id.starts_with(id_or_prefix));
        match (matches.next(), matches.next()) {
            (Some(rev), None) => Ok(rev),
            _ => Err(Error::UnknownRevision(id_or_prefix.to_string())),
        }
    }

    pub fn graph(&self, display: &DisplayOptions) -> RevisionGraph {
        graph::project(&self.revisions, display)
    }
}
