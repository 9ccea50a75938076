//! Revision id naming
//!
//! By default alembic picks random hex ids. Projects that prefer ordered file
//! names can switch to sequential, zero-padded ids (`0001`, `0002`, ...).

use crate::config::NamingConfig;
use crate::revision::Revision;

/// Next sequential id after the highest numeric id in `revisions`
pub fn next_sequential_id(revisions: &[Revision], padding: usize) -> String {
    let next = revisions
        .iter()
        .filter_map(|r| r.id.parse::<u64>().ok())
        .max()
        .map_or(1, |n| n + 1);
    format!("{:0width$}", next, width = padding)
}

/// Id to pass as `--rev-id`, or `None` to let alembic choose
pub fn rev_id_for(naming: &NamingConfig, revisions: &[Revision]) -> Option<String> {
    naming
        .sequential_ids
        .then(|| next_sequential_id(revisions, naming.padding))
}
