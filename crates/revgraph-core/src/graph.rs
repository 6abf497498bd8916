//! Node store and incremental builder.
//!
//! [`KnownGraph`] owns one [`Node`] per revision key, including *ghosts*:
//! keys referenced as a parent whose own parents are unknown. Every node
//! carries its GDFO (global distance from origin), the length of the longest
//! parent chain from any tail, which the query modules use to prune walks.
//!
//! # Construction
//!
//! - [`KnownGraph::from_parent_map`] builds the whole store at once and assigns
//!   GDFO in a single Kahn pass from the tails. The map may contain cycles;
//!   they are reported by the ordering queries, not here.
//! - [`KnownGraph::add_node`] extends the store one revision at a time. Filling
//!   in a ghost renumbers every descendant whose longest path grew, and resets
//!   the heads cache.
//!
//! # Invariants
//!
//! - Every parent key has a node (ghost or real) after a successful mutation.
//! - `gdfo(child) == 1 + max(gdfo(parent))` for every node outside a cycle.
//! - Child links are unique per (parent, child) pair.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::key::Key;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// What is known about a node's ancestry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Added explicitly with no parents.
    Root,
    /// Referenced as a parent but never added; ancestry unknown.
    Ghost,
    /// Added explicitly with at least one parent.
    Normal,
}

/// A revision in the graph with its bidirectional links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub(crate) key: Key,
    pub(crate) state: NodeState,
    pub(crate) parent_keys: Vec<Key>,
    pub(crate) child_keys: Vec<Key>,
    pub(crate) gdfo: u32,
}

impl Node {
    fn ghost(key: Key) -> Self {
        Self {
            key,
            state: NodeState::Ghost,
            parent_keys: Vec::new(),
            child_keys: Vec::new(),
            gdfo: 1,
        }
    }

    /// The node's key.
    #[must_use]
    pub const fn key(&self) -> &Key {
        &self.key
    }

    /// Root, ghost or normal.
    #[must_use]
    pub const fn state(&self) -> NodeState {
        self.state
    }

    /// Returns `true` if the node's ancestry is unknown.
    #[must_use]
    pub fn is_ghost(&self) -> bool {
        self.state == NodeState::Ghost
    }

    /// Parents exactly as supplied, or `None` for a ghost.
    #[must_use]
    pub fn parent_keys(&self) -> Option<&[Key]> {
        match self.state {
            NodeState::Ghost => None,
            NodeState::Root | NodeState::Normal => Some(&self.parent_keys),
        }
    }

    /// Children in link-creation order.
    #[must_use]
    pub fn child_keys(&self) -> &[Key] {
        &self.child_keys
    }

    /// Global distance from origin.
    #[must_use]
    pub const fn gdfo(&self) -> u32 {
        self.gdfo
    }
}

/// Result of a successful [`KnownGraph::add_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new node was created.
    Inserted,
    /// The node already existed with the same parent set.
    Unchanged,
    /// A ghost received its parents; `renumbered` descendants changed GDFO.
    GhostFilled { renumbered: usize },
}

// ---------------------------------------------------------------------------
// KnownGraph
// ---------------------------------------------------------------------------

/// Memoized `heads` results keyed by candidate set.
pub(crate) type HeadsCache = HashMap<BTreeSet<Key>, BTreeSet<Key>>;

/// An in-memory revision graph with cached GDFO values.
#[derive(Debug)]
pub struct KnownGraph {
    pub(crate) nodes: HashMap<Key, Node>,
    pub(crate) config: GraphConfig,
    pub(crate) heads_cache: Mutex<HeadsCache>,
}

impl KnownGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new(config: GraphConfig) -> Self {
        Self {
            nodes: HashMap::new(),
            config,
            heads_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build a graph from a revision → parents map.
    ///
    /// Later entries for the same key replace earlier ones, as in a map.
    /// Cycles are accepted here and rejected by the ordering queries.
    pub fn from_parent_map<I, K, P>(parent_map: I, config: GraphConfig) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<Key>,
        P: IntoIterator,
        P::Item: Into<Key>,
    {
        let parent_map: BTreeMap<Key, Vec<Key>> = parent_map
            .into_iter()
            .map(|(key, parents)| (key.into(), parents.into_iter().map(Into::into).collect()))
            .collect();

        let mut graph = Self::new(config);
        graph.nodes.reserve(parent_map.len());
        for (key, parent_keys) in parent_map {
            graph.initialize_node(key, parent_keys);
        }
        graph.assign_gdfo();
        graph
    }

    /// Create or complete a node and link it to its parents, without GDFO.
    fn initialize_node(&mut self, key: Key, parent_keys: Vec<Key>) {
        let state = if parent_keys.is_empty() {
            NodeState::Root
        } else {
            NodeState::Normal
        };

        for parent_key in distinct(&parent_keys) {
            self.nodes
                .entry(parent_key.clone())
                .or_insert_with(|| Node::ghost(parent_key.clone()))
                .child_keys
                .push(key.clone());
        }

        let node = self
            .nodes
            .entry(key.clone())
            .or_insert_with(|| Node::ghost(key));
        node.state = state;
        node.parent_keys = parent_keys;
    }

    /// Kahn pass from the tails assigning GDFO to every node.
    fn assign_gdfo(&mut self) {
        let mut remaining: HashMap<Key, usize> = HashMap::with_capacity(self.nodes.len());
        let mut tails: Vec<Key> = Vec::new();
        for (key, node) in &self.nodes {
            let parents = distinct(&node.parent_keys).len();
            if parents == 0 {
                tails.push(key.clone());
            } else {
                remaining.insert(key.clone(), parents);
            }
        }
        tails.sort();

        let mut pending: Vec<Key> = tails;
        for key in &pending {
            if let Some(node) = self.nodes.get_mut(key) {
                node.gdfo = 1;
            }
        }

        while let Some(key) = pending.pop() {
            let (gdfo, children) = match self.nodes.get(&key) {
                Some(node) => (node.gdfo, node.child_keys.clone()),
                None => continue,
            };
            for child_key in children {
                if let Some(child) = self.nodes.get_mut(&child_key) {
                    child.gdfo = child.gdfo.max(gdfo + 1);
                }
                if let Some(count) = remaining.get_mut(&child_key) {
                    *count -= 1;
                    if *count == 0 {
                        remaining.remove(&child_key);
                        pending.push(child_key);
                    }
                }
            }
        }

        if !remaining.is_empty() {
            warn!(
                unresolved = remaining.len(),
                "parent map contains a cycle; GDFO is provisional for affected nodes"
            );
        }
    }

    /// Add a revision with its ordered parents.
    ///
    /// - New key: creates the node, ghosts for unknown parents, and links.
    /// - Existing key with the same parent set (order-insensitive): no-op.
    /// - Existing ghost: fills in its parents, renumbers descendants, and
    ///   clears the heads cache.
    ///
    /// # Errors
    ///
    /// - [`GraphError::InconsistentParentage`] if the key already has a
    ///   different parent set.
    /// - [`GraphError::GraphCycle`] if the new links would make the key its
    ///   own ancestor.
    ///
    /// On error the graph is unchanged.
    pub fn add_node<K, P>(&mut self, key: K, parent_keys: P) -> Result<AddOutcome>
    where
        K: Into<Key>,
        P: IntoIterator,
        P::Item: Into<Key>,
    {
        let key = key.into();
        let parent_keys: Vec<Key> = parent_keys.into_iter().map(Into::into).collect();

        let filling_ghost = match self.nodes.get(&key) {
            Some(node) if !node.is_ghost() => {
                return if same_parent_set(&node.parent_keys, &parent_keys) {
                    Ok(AddOutcome::Unchanged)
                } else {
                    Err(GraphError::InconsistentParentage {
                        key,
                        existing: node.parent_keys.clone(),
                        requested: parent_keys,
                    })
                };
            }
            Some(_) => true,
            None => false,
        };

        if parent_keys.contains(&key) {
            return Err(GraphError::GraphCycle { keys: vec![key] });
        }
        let renumbering = if filling_ghost {
            self.check_fill_is_acyclic(&key, &parent_keys)?;
            Some(self.plan_renumbering(&key, &parent_keys)?)
        } else {
            None
        };

        self.initialize_node(key.clone(), parent_keys);
        let gdfo = self.computed_gdfo(&key);
        if let Some(node) = self.nodes.get_mut(&key) {
            node.gdfo = gdfo;
        }

        let Some(renumbering) = renumbering else {
            return Ok(AddOutcome::Inserted);
        };

        self.heads_cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        let renumbered = renumbering.len();
        for (descendant, raised) in renumbering {
            if let Some(node) = self.nodes.get_mut(&descendant) {
                node.gdfo = raised;
            }
        }
        debug!(%key, gdfo, renumbered, "filled in ghost");
        Ok(AddOutcome::GhostFilled { renumbered })
    }

    /// Reject a ghost fill whose new parents already descend from the ghost.
    fn check_fill_is_acyclic(&self, key: &Key, parent_keys: &[Key]) -> Result<()> {
        let targets: HashSet<&Key> = parent_keys
            .iter()
            .filter(|parent| self.nodes.contains_key(*parent))
            .collect();
        let Some(ceiling) = targets.iter().filter_map(|t| self.nodes.get(*t)).map(Node::gdfo).max()
        else {
            return Ok(());
        };

        // Descendants of the ghost have larger GDFO than it, so anything above
        // the highest target cannot lead back to one.
        let mut seen: HashSet<&Key> = HashSet::new();
        let mut queue: VecDeque<&Key> = VecDeque::new();
        queue.push_back(key);
        while let Some(current) = queue.pop_front() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for child in &node.child_keys {
                if targets.contains(child) {
                    return Err(GraphError::GraphCycle {
                        keys: vec![key.clone(), child.clone()],
                    });
                }
                let below_ceiling = self.nodes.get(child).is_some_and(|c| c.gdfo < ceiling);
                if below_ceiling && seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        Ok(())
    }

    /// `1 + max(gdfo(parent))`, or 1 for a node without parents.
    fn computed_gdfo(&self, key: &Key) -> u32 {
        self.nodes.get(key).map_or(1, |node| {
            node.parent_keys
                .iter()
                .filter_map(|parent| self.nodes.get(parent))
                .map(|parent| parent.gdfo + 1)
                .max()
                .unwrap_or(1)
        })
    }

    /// GDFO increases that filling ghost `key` with `parent_keys` would push
    /// down the child links, lowest GDFO first. Nothing is modified.
    ///
    /// Returns the new GDFO of every descendant that grows. In an acyclic
    /// graph no node can grow more than `len()` times; one that does sits on
    /// a cycle left behind by bulk construction, whose GDFO is provisional.
    fn plan_renumbering(&self, key: &Key, parent_keys: &[Key]) -> Result<HashMap<Key, u32>> {
        let fill_gdfo = parent_keys
            .iter()
            .map(|parent| self.nodes.get(parent).map_or(1, Node::gdfo) + 1)
            .max()
            .unwrap_or(1);
        let mut raised: HashMap<Key, u32> = HashMap::from([(key.clone(), fill_gdfo)]);
        let mut relaxations: HashMap<Key, usize> = HashMap::new();
        let mut worklist: BinaryHeap<Reverse<(u32, Key)>> = BinaryHeap::new();
        self.schedule_children(key, fill_gdfo, key, parent_keys, &mut worklist);

        while let Some(Reverse((_, child_key))) = worklist.pop() {
            let parents: &[Key] = if child_key == *key {
                parent_keys
            } else {
                self.nodes
                    .get(&child_key)
                    .map_or(&[][..], |node| node.parent_keys.as_slice())
            };
            let gdfo = parents
                .iter()
                .map(|parent| current_gdfo(self, &raised, parent) + 1)
                .max()
                .unwrap_or(1);
            if gdfo <= current_gdfo(self, &raised, &child_key) {
                continue;
            }

            let count = relaxations.entry(child_key.clone()).or_insert(0);
            *count += 1;
            if *count > self.nodes.len() {
                let mut keys = vec![key.clone(), child_key];
                keys.sort();
                keys.dedup();
                return Err(GraphError::GraphCycle { keys });
            }
            self.schedule_children(&child_key, gdfo, key, parent_keys, &mut worklist);
            raised.insert(child_key, gdfo);
        }

        raised.remove(key);
        Ok(raised)
    }

    /// Queue the children of `parent`, including the ghost being filled when
    /// `parent` is one of its new parents.
    fn schedule_children(
        &self,
        parent: &Key,
        gdfo: u32,
        filled: &Key,
        filled_parents: &[Key],
        worklist: &mut BinaryHeap<Reverse<(u32, Key)>>,
    ) {
        if let Some(node) = self.nodes.get(parent) {
            for child in &node.child_keys {
                worklist.push(Reverse((gdfo + 1, child.clone())));
            }
        }
        if filled_parents.contains(parent) {
            worklist.push(Reverse((gdfo + 1, filled.clone())));
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The configuration this graph was built with.
    #[must_use]
    pub const fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Number of nodes, ghosts included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if the key has a node (ghost or real).
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.nodes.contains_key(key)
    }

    /// Look up a node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownKey`] if the key was never seen.
    pub fn node(&self, key: &Key) -> Result<&Node> {
        self.nodes
            .get(key)
            .ok_or_else(|| GraphError::UnknownKey(key.clone()))
    }

    /// Parents of a node: `None` for a ghost, `Some(&[])` for a root.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownKey`] if the key was never seen.
    pub fn parent_keys(&self, key: &Key) -> Result<Option<&[Key]>> {
        self.node(key).map(Node::parent_keys)
    }

    /// Children of a node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownKey`] if the key was never seen.
    pub fn child_keys(&self, key: &Key) -> Result<&[Key]> {
        self.node(key).map(Node::child_keys)
    }

    /// GDFO of a node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownKey`] if the key was never seen.
    pub fn gdfo(&self, key: &Key) -> Result<u32> {
        self.node(key).map(Node::gdfo)
    }

    /// Iterate all keys in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.nodes.keys()
    }

    /// Iterate all nodes in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Nodes no other node names as a parent, sorted.
    #[must_use]
    pub fn tips(&self) -> Vec<&Key> {
        self.sorted_keys(|node| node.child_keys.is_empty())
    }

    /// Roots and ghosts, sorted.
    #[must_use]
    pub fn tails(&self) -> Vec<&Key> {
        self.sorted_keys(|node| node.parent_keys.is_empty())
    }

    /// Keys whose ancestry is still unknown, sorted.
    #[must_use]
    pub fn ghosts(&self) -> Vec<&Key> {
        self.sorted_keys(Node::is_ghost)
    }

    fn sorted_keys(&self, predicate: impl Fn(&Node) -> bool) -> Vec<&Key> {
        let mut keys: Vec<&Key> = self
            .nodes
            .values()
            .filter(|node| predicate(node))
            .map(Node::key)
            .collect();
        keys.sort();
        keys
    }
}

impl Default for KnownGraph {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

impl Clone for KnownGraph {
    /// Clones the nodes; the clone starts with an empty heads cache.
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            config: self.config.clone(),
            heads_cache: Mutex::new(HashMap::new()),
        }
    }
}

/// GDFO of `key` with pending increases applied; unknown keys are new ghosts.
fn current_gdfo(graph: &KnownGraph, raised: &HashMap<Key, u32>, key: &Key) -> u32 {
    raised
        .get(key)
        .copied()
        .or_else(|| graph.nodes.get(key).map(Node::gdfo))
        .unwrap_or(1)
}

/// Unique keys in first-occurrence order.
pub(crate) fn distinct(keys: &[Key]) -> Vec<&Key> {
    let mut seen: HashSet<&Key> = HashSet::with_capacity(keys.len());
    keys.iter().filter(|key| seen.insert(*key)).collect()
}

fn same_parent_set(existing: &[Key], requested: &[Key]) -> bool {
    let existing: BTreeSet<&Key> = existing.iter().collect();
    let requested: BTreeSet<&Key> = requested.iter().collect();
    existing == requested
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
