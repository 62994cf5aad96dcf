//! Canonical list ordering
//!
//! Unfinished workflows come first, newest creation first. Finished workflows follow,
//! most recently finished first, ties broken by creation time (newest first) and then
//! by name.

use std::cmp::Ordering;

use super::Workflow;

pub fn canonical_order(a: &Workflow, b: &Workflow) -> Ordering {
    match (a.status.finished_at, b.status.finished_at) {
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(fa), Some(fb)) if fa != fb => fb.cmp(&fa),
        _ => b
            .metadata
            .creation_timestamp
            .cmp(&a.metadata.creation_timestamp)
            .then_with(|| a.metadata.name.cmp(&b.metadata.name)),
    }
}

pub fn sort_workflows(items: &mut [Workflow]) {
    items.sort_by(canonical_order);
}
