//! Merge-sorted history with merge depths and dotted revision numbers.
//!
//! Starting from a tip, the sorter walks the left-hand (mainline) parent chain
//! depth first and drops into merged parents one level deeper. The result is
//! newest first: the tip, then each merged branch (rightmost merge last in
//! the walk, so it is shown first) before the mainline revision it was merged
//! into.
//!
//! # Numbering
//!
//! - Mainline revisions count up from `1`.
//! - The first child of a revision continues its number (`1.2.1` → `1.2.2`).
//! - Any other child opens a new branch off the first component of its
//!   left parent's number: `(base, n, 1)`, with `n` counted per `base`
//!   across the whole result.
//! - A revision whose left parent is missing or a ghost starts a new root:
//!   the first gets `1`, later ones `0.n.1`, sharing the counter for base `0`.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::graph::KnownGraph;
use crate::key::Key;

/// A dotted revision number: `3` on the mainline, `1.2.1` on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revno(Vec<u32>);

impl Revno {
    /// The numeric components.
    #[must_use]
    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Returns `true` for a single-component (mainline) number.
    #[must_use]
    pub fn is_mainline(&self) -> bool {
        self.0.len() == 1
    }

    fn first_root() -> Self {
        Self(vec![1])
    }

    fn branch(base: u32, branch: u32) -> Self {
        Self(vec![base, branch, 1])
    }

    /// Branches are opened off the first component.
    fn base(&self) -> u32 {
        self.0.first().copied().unwrap_or(0)
    }

    fn successor(&self) -> Self {
        let mut components = self.0.clone();
        if let Some(last) = components.last_mut() {
            *last += 1;
        }
        Self(components)
    }
}

impl<const N: usize> From<[u32; N]> for Revno {
    fn from(value: [u32; N]) -> Self {
        Self(value.to_vec())
    }
}

impl fmt::Display for Revno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

/// One entry of [`KnownGraph::merge_sort`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSortNode {
    pub key: Key,
    /// Number of merges between this revision and the mainline.
    pub merge_depth: usize,
    pub revno: Revno,
    /// The last revision of a merged line of development.
    pub end_of_merge: bool,
}

impl KnownGraph {
    /// Merge-sort the ancestry of `tip`, newest first.
    ///
    /// The sentinel tip yields an empty list. Ghost parents are skipped.
    ///
    /// # Errors
    ///
    /// - [`GraphError::UnknownKey`] if `tip` is not in the graph or is a
    ///   ghost.
    /// - [`GraphError::GraphCycle`] if the ancestry of `tip` has a cycle.
    pub fn merge_sort(&self, tip: &Key) -> Result<Vec<MergeSortNode>> {
        if tip.is_null() {
            return Ok(Vec::new());
        }
        let tip = self.node(tip)?.key();
        let mut sorter = MergeSorter::new(self);
        sorter.push(tip, 0)?;
        sorter.run()
    }
}

/// Per-node DFS state while it sits on the stack.
struct Frame<'g> {
    key: &'g Key,
    parents: &'g [Key],
    merge_depth: usize,
    /// Present (non-ghost) left parent, if any.
    left_parent: Option<&'g Key>,
    left_pending: Option<&'g Key>,
    /// Present right parents; popped from the end.
    right_pending: Vec<&'g Key>,
    /// Whether this node took its left parent's first-child slot.
    first_child: bool,
}

struct MergeSorter<'g> {
    graph: &'g KnownGraph,
    stack: Vec<Frame<'g>>,
    on_stack: HashSet<&'g Key>,
    claimed: HashSet<&'g Key>,
    completed: HashMap<&'g Key, Revno>,
    branch_counts: HashMap<u32, u32>,
    scheduled: Vec<MergeSortNode>,
}

impl<'g> MergeSorter<'g> {
    fn new(graph: &'g KnownGraph) -> Self {
        Self {
            graph,
            stack: Vec::new(),
            on_stack: HashSet::new(),
            claimed: HashSet::new(),
            completed: HashMap::new(),
            branch_counts: HashMap::new(),
            scheduled: Vec::new(),
        }
    }

    fn is_present(&self, key: &Key) -> bool {
        self.graph.nodes.get(key).is_some_and(|node| !node.is_ghost())
    }

    fn push(&mut self, key: &'g Key, merge_depth: usize) -> Result<()> {
        let node = self.graph.node(key)?;
        let Some(parents) = node.parent_keys() else {
            return Err(GraphError::UnknownKey(key.clone()));
        };

        let left_parent = parents.first().filter(|parent| self.is_present(parent));
        let right_pending = parents
            .iter()
            .skip(1)
            .filter(|parent| self.is_present(parent))
            .collect();
        let first_child = left_parent.is_none_or(|parent| self.claimed.insert(parent));

        self.on_stack.insert(key);
        self.stack.push(Frame {
            key,
            parents,
            merge_depth,
            left_parent,
            left_pending: left_parent,
            right_pending,
            first_child,
        });
        Ok(())
    }

    fn run(mut self) -> Result<Vec<MergeSortNode>> {
        while let Some(top) = self.stack.last_mut() {
            let next = match top.left_pending.take() {
                Some(left) => Some((left, top.merge_depth)),
                None => top
                    .right_pending
                    .pop()
                    .map(|right| (right, top.merge_depth + 1)),
            };

            let Some((parent, merge_depth)) = next else {
                self.pop();
                continue;
            };
            if self.completed.contains_key(parent) {
                continue;
            }
            if self.on_stack.contains(parent) {
                return Err(self.cycle_through(parent));
            }
            self.push(parent, merge_depth)?;
        }

        self.scheduled.reverse();
        Ok(self.scheduled)
    }

    fn pop(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        self.on_stack.remove(frame.key);

        let parent_revno = frame.left_parent.and_then(|parent| self.completed.get(parent));
        let revno = match parent_revno {
            Some(parent_revno) if frame.first_child => parent_revno.successor(),
            Some(parent_revno) => {
                let base = parent_revno.base();
                let count = self.branch_counts.entry(base).or_insert(0);
                *count += 1;
                Revno::branch(base, *count)
            }
            None => match self.branch_counts.get(&0).copied() {
                None => {
                    self.branch_counts.insert(0, 0);
                    Revno::first_root()
                }
                Some(count) => {
                    self.branch_counts.insert(0, count + 1);
                    Revno::branch(0, count + 1)
                }
            },
        };

        // `scheduled` is in completion order, so its last entry is the node
        // that will follow this one in the output.
        let end_of_merge = self.scheduled.last().is_none_or(|next| {
            next.merge_depth < frame.merge_depth
                || (next.merge_depth == frame.merge_depth && !frame.parents.contains(&next.key))
        });

        self.completed.insert(frame.key, revno.clone());
        self.scheduled.push(MergeSortNode {
            key: frame.key.clone(),
            merge_depth: frame.merge_depth,
            revno,
            end_of_merge,
        });
    }

    /// The stacked nodes from `key` upward form the cycle.
    fn cycle_through(&self, key: &Key) -> GraphError {
        let start = self
            .stack
            .iter()
            .position(|frame| frame.key == key)
            .unwrap_or(0);
        let mut keys: Vec<Key> = self.stack[start..]
            .iter()
            .map(|frame| frame.key.clone())
            .collect();
        keys.sort();
        GraphError::GraphCycle { keys }
    }
}
