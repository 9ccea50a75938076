//! Applied-set resolution
//!
//! A revision is applied when it can be reached from the current revision by
//! following parent pointers. Merge revisions contribute every parent.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::revision::Revision;

/// The parent pointers loop back on themselves
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("revision history contains a cycle through '{revision}'")]
pub struct CyclicHistoryError {
    pub revision: String,
}

/// Ids reachable from `current`, including `current` itself.
///
/// Empty when there is no current revision or it isn't in the list.
/// Parents missing from the list end that branch of the walk.
pub fn applied_set(
    revisions: &[Revision],
    current: Option<&str>,
) -> Result<HashSet<String>, CyclicHistoryError> {
    let parents: HashMap<&str, &[String]> = revisions
        .iter()
        .map(|r| (r.id.as_str(), r.parents.as_slice()))
        .collect();

    let Some(start) = current.filter(|id| parents.contains_key(id)) else {
        return Ok(HashSet::new());
    };

    // Depth-first over parents; `on_path` holds the active chain so an edge
    // back into it is a cycle rather than a shared ancestor.
    let mut on_path: HashSet<&str> = HashSet::from([start]);
    let mut done: HashSet<&str> = HashSet::new();
    let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
    let mut visits = 1usize;

    while let Some(frame) = stack.last_mut() {
        let (id, next) = *frame;
        match parents.get(id).and_then(|ps| ps.get(next)) {
            Some(parent) => {
                frame.1 += 1;
                let parent = parent.as_str();
                if on_path.contains(parent) {
                    return Err(CyclicHistoryError {
                        revision: parent.to_string(),
                    });
                }
                if done.contains(parent) || !parents.contains_key(parent) {
                    continue;
                }
                visits += 1;
                if visits > revisions.len() {
                    return Err(CyclicHistoryError {
                        revision: parent.to_string(),
                    });
                }
                on_path.insert(parent);
                stack.push((parent, 0));
            }
            None => {
                stack.pop();
                on_path.remove(id);
                done.insert(id);
            }
        }
    }

    Ok(done.into_iter().map(str::to_string).collect())
}

/// Populate `is_applied` on every revision
pub fn resolve(
    mut revisions: Vec<Revision>,
    current: Option<&str>,
) -> Result<Vec<Revision>, CyclicHistoryError> {
    let applied = applied_set(&revisions, current)?;
    for rev in &mut revisions {
        rev.is_applied = applied.contains(&rev.id);
    }
    Ok(revisions)
}

/// Like `resolve`, but a cyclic history is logged and every revision is
/// treated as pending instead of failing the refresh.
pub fn resolve_or_pending(revisions: Vec<Revision>, current: Option<&str>) -> Vec<Revision> {
    let applied = match applied_set(&revisions, current) {
        Ok(applied) => applied,
        Err(e) => {
            tracing::warn!(error = %e, "cannot resolve applied revisions");
            HashSet::new()
        }
    };
    revisions
        .into_iter()
        .map(|mut rev| {
            rev.is_applied = applied.contains(&rev.id);
            rev
        })
        .collect()
}
