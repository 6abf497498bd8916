//! Heads resolution and ancestry checks.
//!
//! A *head* of a candidate set is a member that is not an ancestor of any
//! other member. [`KnownGraph::heads`] walks the parents of every candidate at
//! once, highest GDFO first, and never expands a node whose GDFO is at or below
//! the lowest candidate's: nothing down there can be a candidate.
//!
//! # Caching
//!
//! With `heads_cache` enabled, results are memoized per candidate set in a
//! cache owned by the graph. Filling in a ghost clears it.

use std::collections::{BTreeSet, BinaryHeap, HashSet, VecDeque};
use std::sync::PoisonError;

use tracing::trace;

use crate::error::{GraphError, Result};
use crate::graph::{HeadsCache, KnownGraph};
use crate::key::Key;

impl KnownGraph {
    /// Return the members of `keys` that no other member descends from.
    ///
    /// The sentinel key is dropped unless it is the only candidate. It does
    /// not need to be present in the graph.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownKey`] for any other candidate that is not
    /// in the graph.
    pub fn heads<I, K>(&self, keys: I) -> Result<BTreeSet<Key>>
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        let mut candidates: BTreeSet<Key> = BTreeSet::new();
        let mut saw_null = false;
        for key in keys {
            let key = key.into();
            if key.is_null() {
                saw_null = true;
                continue;
            }
            if !self.nodes.contains_key(&key) {
                return Err(GraphError::UnknownKey(key));
            }
            candidates.insert(key);
        }

        if candidates.is_empty() {
            return Ok(if saw_null {
                BTreeSet::from([Key::null()])
            } else {
                BTreeSet::new()
            });
        }
        if candidates.len() < 2 {
            return Ok(candidates);
        }

        if self.config.heads_cache {
            if let Some(heads) = self.lock_cache().get(&candidates) {
                trace!(candidates = candidates.len(), "heads cache hit");
                return Ok(heads.clone());
            }
        }

        let heads = self.find_heads(&candidates);

        if self.config.heads_cache {
            let mut cache = self.lock_cache();
            if cache.len() >= self.config.heads_cache_limit {
                cache.clear();
            }
            cache.insert(candidates, heads.clone());
        }
        Ok(heads)
    }

    fn find_heads(&self, candidates: &BTreeSet<Key>) -> BTreeSet<Key> {
        let min_gdfo = candidates
            .iter()
            .filter_map(|key| self.nodes.get(key))
            .map(|node| node.gdfo)
            .min()
            .unwrap_or(1);

        let mut seen: HashSet<&Key> = HashSet::new();
        let mut pending: BinaryHeap<(u32, &Key)> = BinaryHeap::new();
        for key in candidates {
            self.push_parents(key, &mut pending);
        }

        while let Some((gdfo, key)) = pending.pop() {
            if !seen.insert(key) {
                continue;
            }
            if gdfo <= min_gdfo {
                continue;
            }
            self.push_parents(key, &mut pending);
        }

        candidates
            .iter()
            .filter(|key| !seen.contains(key))
            .cloned()
            .collect()
    }

    fn push_parents<'g>(&'g self, key: &Key, pending: &mut BinaryHeap<(u32, &'g Key)>) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        for parent in &node.parent_keys {
            if let Some(parent_node) = self.nodes.get(parent) {
                pending.push((parent_node.gdfo, parent_node.key()));
            }
        }
    }

    /// Number of memoized `heads` results.
    #[must_use]
    pub fn heads_cache_len(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HeadsCache> {
        self.heads_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if `ancestor` is reachable from `descendant` through
    /// parent links. A key is not its own ancestor. The sentinel is an
    /// ancestor of every other key.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownKey`] if a non-sentinel key is not in the
    /// graph.
    pub fn is_ancestor(&self, ancestor: &Key, descendant: &Key) -> Result<bool> {
        if ancestor == descendant {
            return Ok(false);
        }
        if descendant.is_null() {
            return Ok(false);
        }
        let start = self.node(descendant)?;
        if ancestor.is_null() {
            return Ok(true);
        }
        let target_gdfo = self.node(ancestor)?.gdfo;

        let mut seen: HashSet<&Key> = HashSet::new();
        let mut queue: VecDeque<&Key> = VecDeque::new();
        queue.push_back(start.key());
        while let Some(current) = queue.pop_front() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for parent in &node.parent_keys {
                if parent == ancestor {
                    return Ok(true);
                }
                let above_target = self.nodes.get(parent).is_some_and(|p| p.gdfo > target_gdfo);
                if above_target && seen.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        Ok(false)
    }

    /// Every key reachable from `key` through parent links, ghosts included,
    /// not including `key` itself.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownKey`] if the key is not in the graph.
    pub fn ancestors(&self, key: &Key) -> Result<BTreeSet<Key>> {
        let start = self.node(key)?;
        let mut visited: BTreeSet<Key> = BTreeSet::new();
        let mut queue: VecDeque<&Key> = VecDeque::new();
        queue.push_back(start.key());

        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.nodes.get(current) {
                for parent in &node.parent_keys {
                    if visited.insert(parent.clone()) {
                        queue.push_back(parent);
                    }
                }
            }
        }

        Ok(visited)
    }
}
