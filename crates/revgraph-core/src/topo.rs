//! Full-graph orderings: parent-first topological order and the stable,
//! prefix-grouped reverse order used for packing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{GraphError, Result};
use crate::graph::{KnownGraph, Node, distinct};
use crate::key::Key;

impl KnownGraph {
    /// Every non-ghost node, each after all of its present parents.
    ///
    /// Kahn's algorithm; when several nodes are ready at once the smallest
    /// key goes first, so the order is reproducible. Ghosts are omitted and
    /// impose no ordering constraint.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::GraphCycle`] naming the nodes that could not be
    /// ordered if the graph contains a cycle.
    pub fn topo_sort(&self) -> Result<Vec<Key>> {
        let mut in_degree: HashMap<&Key, usize> = HashMap::with_capacity(self.nodes.len());
        let mut ready: BTreeSet<&Key> = BTreeSet::new();
        for node in self.nodes.values().filter(|node| !node.is_ghost()) {
            let parents = distinct(&node.parent_keys)
                .into_iter()
                .filter(|parent| self.nodes.get(*parent).is_some_and(|p| !p.is_ghost()))
                .count();
            if parents == 0 {
                ready.insert(node.key());
            } else {
                in_degree.insert(node.key(), parents);
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(current) = ready.pop_first() {
            order.push(current.clone());
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for child in &node.child_keys {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        in_degree.remove(child);
                        ready.insert(child);
                    }
                }
            }
        }

        if !in_degree.is_empty() {
            let mut keys: Vec<Key> = in_degree.into_keys().cloned().collect();
            keys.sort();
            return Err(GraphError::GraphCycle { keys });
        }
        Ok(order)
    }

    /// Reverse topological order (children before parents), grouped by key
    /// prefix and stable under the addition of unrelated nodes.
    ///
    /// Groups are visited in ascending prefix order, plain keys first. Within
    /// a group the walk starts from that group's tips; whenever the choice is
    /// free the smallest key is taken next. A parent is emitted only once all
    /// of its children have been. Ghosts are skipped.
    #[must_use]
    pub fn gc_sort(&self) -> Vec<Key> {
        let mut tips_by_prefix: BTreeMap<Option<&str>, Vec<&Node>> = BTreeMap::new();
        for node in self.nodes.values() {
            if node.child_keys.is_empty() {
                tips_by_prefix
                    .entry(node.key.prefix())
                    .or_default()
                    .push(node);
            }
        }

        let mut seen_children: HashMap<&Key, usize> = HashMap::new();
        let mut result = Vec::with_capacity(self.nodes.len());

        for (_, mut pending) in tips_by_prefix {
            pending.sort_by(|a, b| b.key.cmp(&a.key));
            while let Some(node) = pending.pop() {
                if node.is_ghost() {
                    continue;
                }
                result.push(node.key.clone());

                let mut parents = distinct(&node.parent_keys);
                parents.sort_by(|a, b| b.cmp(a));
                for parent_key in parents {
                    let Some(parent) = self.nodes.get(parent_key) else {
                        continue;
                    };
                    let seen = seen_children.entry(parent_key).or_insert(0);
                    *seen += 1;
                    if *seen == parent.child_keys.len() {
                        seen_children.remove(parent_key);
                        pending.push(parent);
                    }
                }
            }
        }

        result
    }
}
