//! Registry of open views
//!
//! Views are created and torn down explicitly by whoever owns the registry
//! (the terminal UI's `App`). Nothing is lazily shared behind a global.

use std::collections::BTreeMap;

use thiserror::Error;

/// Stable view identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewId {
    Tree,
    Settings,
    Output,
}

impl ViewId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewId::Tree => "tree",
            ViewId::Settings => "settings",
            ViewId::Output => "output",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ViewId::Tree => "Revisions",
            ViewId::Settings => "Settings",
            ViewId::Output => "Output",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("view '{}' is already open", .0.as_str())]
    AlreadyOpen(ViewId),
}

#[derive(Debug)]
pub struct ViewRegistry<V> {
    views: BTreeMap<ViewId, V>,
}

impl<V> Default for ViewRegistry<V> {
    fn default() -> Self {
        Self {
            views: BTreeMap::new(),
        }
    }
}

impl<V> ViewRegistry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, id: ViewId, view: V) -> Result<&mut V, ViewError> {
        use std::collections::btree_map::Entry;
        match self.views.entry(id) {
            Entry::Occupied(_) => Err(ViewError::AlreadyOpen(id)),
            Entry::Vacant(slot) => {
                tracing::debug!(view = id.as_str(), "view opened");
                Ok(slot.insert(view))
            }
        }
    }

    pub fn close(&mut self, id: ViewId) -> Option<V> {
        let view = self.views.remove(&id);
        if view.is_some() {
            tracing::debug!(view = id.as_str(), "view closed");
        }
        view
    }

    pub fn get(&self, id: ViewId) -> Option<&V> {
        self.views.get(&id)
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut V> {
        self.views.get_mut(&id)
    }

    pub fn is_open(&self, id: ViewId) -> bool {
        self.views.contains_key(&id)
    }

    /// Open views in a stable order
    pub fn ids(&self) -> Vec<ViewId> {
        self.views.keys().copied().collect()
    }

    /// The open view after `id`, wrapping around
    pub fn next_after(&self, id: ViewId) -> Option<ViewId> {
        let ids = self.ids();
        let pos = ids.iter().position(|v| *v == id)?;
        ids.get((pos + 1) % ids.len()).copied()
    }

    pub fn close_all(&mut self) -> Vec<(ViewId, V)> {
        std::mem::take(&mut self.views).into_iter().collect()
    }
}
