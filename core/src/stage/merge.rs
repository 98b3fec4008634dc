use std::collections::{HashMap, HashSet};

use crate::error::MergeError;

use super::types::Stage;

impl Stage {
    /// Merge `other` into this stage.
    ///
    /// The receiver becomes (or stays) a composite whose leaves are the union of
    /// both sides. `other` is appended after the existing children, so leaf order
    /// (and the default run name) follows call order.
    ///
    /// Duplicate ids are resolved as follows:
    /// - identical definitions: the copy from `other` is dropped
    /// - differing definitions: `MergeError::Conflict`, and the receiver is left untouched
    pub fn merge_with(&mut self, mut other: Stage) -> Result<(), MergeError> {
        let known: HashMap<&str, &Stage> =
            self.flatten().into_iter().map(|s| (s.id.as_str(), s)).collect();

        let mut duplicates = HashSet::new();
        let mut seen_in_other: HashMap<&str, &Stage> = HashMap::new();
        for leaf in other.flatten() {
            if let Some(existing) = known.get(leaf.id.as_str()) {
                if !existing.same_definition(leaf) {
                    return Err(conflict(existing, leaf));
                }
                duplicates.insert(leaf.id.clone());
                continue;
            }
            if let Some(existing) = seen_in_other.get(leaf.id.as_str()) {
                if !existing.same_definition(leaf) {
                    return Err(conflict(existing, leaf));
                }
                continue;
            }
            seen_in_other.insert(leaf.id.as_str(), leaf);
        }
        drop(known);

        if !duplicates.is_empty() {
            tracing::debug!(
                ids = ?duplicates,
                origin = %other.origin(),
                "dropping identical duplicate stage definitions"
            );
            other.prune_leaves(&duplicates);
        }

        if self.is_leaf() {
            let leaf = std::mem::take(self);
            self.children.push(leaf);
        }

        if other.is_leaf() || !other.children.is_empty() {
            self.children.push(other);
        }
        Ok(())
    }

    /// Remove leaves whose id is in `ids`. Composites left empty stay in place.
    fn prune_leaves(&mut self, ids: &HashSet<String>) {
        if self.is_leaf() {
            if ids.contains(&self.id) {
                *self = Stage::composite(self.source.take());
            }
            return;
        }
        self.children.retain(|c| !(c.is_leaf() && ids.contains(&c.id)));
        for child in &mut self.children {
            child.prune_leaves(ids);
        }
    }
}

fn conflict(first: &Stage, second: &Stage) -> MergeError {
    MergeError::Conflict {
        id: first.id.clone(),
        first: first.origin(),
        second: second.origin(),
    }
}
