//! Random branch-and-merge histories.
//!
//! The generator keeps one mainline and a handful of open feature branches.
//! Each step either forks a branch, commits on a branch, merges branches
//! back (one at a time or all at once), syncs the mainline into a branch, or
//! commits on the mainline. Every parent index is smaller than its child's,
//! so a generated history is always acyclic.

use std::collections::BTreeSet;

use anyhow::{Result, bail};
use revgraph_core::Key;
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Shape parameters for a generated history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Number of revisions to generate.
    pub revisions: usize,
    /// Maximum number of feature branches open at once, new roots included.
    pub max_branches: usize,
    /// Chance per step to fork a new branch (percent, 0–100).
    pub branch_percent: u8,
    /// Chance per step to merge open branches into the mainline.
    pub merge_percent: u8,
    /// Chance that a merge takes every open branch at once.
    pub octopus_percent: u8,
    /// Chance per step to merge the mainline into a branch (criss-cross).
    pub sync_percent: u8,
    /// Chance that a revision references a never-defined ghost parent.
    pub ghost_percent: u8,
    /// Chance that a new root starts an unrelated line of history.
    pub new_root_percent: u8,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            revisions: 200,
            max_branches: 4,
            branch_percent: 15,
            merge_percent: 15,
            octopus_percent: 20,
            sync_percent: 5,
            ghost_percent: 3,
            new_root_percent: 2,
        }
    }
}

impl HistoryConfig {
    /// Validate configuration before generating.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.revisions == 0 {
            bail!("revisions must be > 0");
        }
        for (name, percent) in [
            ("branch_percent", self.branch_percent),
            ("merge_percent", self.merge_percent),
            ("octopus_percent", self.octopus_percent),
            ("sync_percent", self.sync_percent),
            ("ghost_percent", self.ghost_percent),
            ("new_root_percent", self.new_root_percent),
        ] {
            if percent > 100 {
                bail!("{name} must be <= 100, got {percent}");
            }
        }
        Ok(())
    }
}

/// One generated revision and its ordered parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub key: Key,
    pub parents: Vec<Key>,
}

/// A generated history in creation (topological) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedHistory {
    pub revisions: Vec<Revision>,
    /// The last mainline revision.
    pub tip: Key,
    /// Parent keys that are never defined.
    pub ghosts: BTreeSet<Key>,
}

impl SimulatedHistory {
    /// `(key, parents)` pairs for bulk construction.
    #[must_use = "iterators are lazy"]
    pub fn parent_map(&self) -> impl Iterator<Item = (Key, Vec<Key>)> + '_ {
        self.revisions
            .iter()
            .map(|revision| (revision.key.clone(), revision.parents.clone()))
    }
}

fn revision_key(index: usize) -> Key {
    Key::from(format!("rev-{index:05}"))
}

fn ghost_key(index: usize) -> Key {
    Key::from(format!("ghost-{index:05}"))
}

/// Generate a history from `config` using `rng`.
#[must_use]
pub fn generate(config: &HistoryConfig, rng: &mut DeterministicRng) -> SimulatedHistory {
    let mut revisions: Vec<Revision> = Vec::with_capacity(config.revisions);
    let mut ghosts = BTreeSet::new();
    let mut mainline: Option<usize> = None;
    let mut branches: Vec<usize> = Vec::new();

    for index in 0..config.revisions {
        let mut parents: Vec<usize> = Vec::new();
        let mut on_mainline = true;

        match mainline {
            None => {}
            Some(_) if branches.len() < config.max_branches
                && rng.hit_rate_percent(config.new_root_percent) =>
            {
                // An unrelated root, merged into the mainline later like a
                // branch, so it takes a branch slot.
                on_mainline = false;
            }
            Some(main) if branches.len() < config.max_branches
                && rng.hit_rate_percent(config.branch_percent) =>
            {
                let fork_point = if rng.hit_rate_percent(70) {
                    main
                } else {
                    rng.next_index(index)
                };
                parents.push(fork_point);
                on_mainline = false;
            }
            Some(main) if !branches.is_empty() && rng.hit_rate_percent(config.merge_percent) => {
                parents.push(main);
                if rng.hit_rate_percent(config.octopus_percent) {
                    parents.append(&mut branches);
                } else {
                    let slot = rng.next_index(branches.len());
                    parents.push(branches.swap_remove(slot));
                }
            }
            Some(main) if !branches.is_empty() && rng.hit_rate_percent(config.sync_percent) => {
                let slot = rng.next_index(branches.len());
                parents.push(branches[slot]);
                parents.push(main);
                branches[slot] = index;
                on_mainline = false;
            }
            Some(_) if !branches.is_empty() && rng.hit_rate_percent(50) => {
                let slot = rng.next_index(branches.len());
                parents.push(branches[slot]);
                branches[slot] = index;
                on_mainline = false;
            }
            Some(main) => parents.push(main),
        }

        let mut parent_keys: Vec<Key> = parents.into_iter().map(revision_key).collect();
        if !parent_keys.is_empty() && rng.hit_rate_percent(config.ghost_percent) {
            let ghost = ghost_key(index);
            ghosts.insert(ghost.clone());
            parent_keys.push(ghost);
        }

        if on_mainline {
            mainline = Some(index);
        } else if !branches.contains(&index) {
            branches.push(index);
        }
        revisions.push(Revision {
            key: revision_key(index),
            parents: parent_keys,
        });
    }

    SimulatedHistory {
        revisions,
        tip: revision_key(mainline.unwrap_or(0)),
        ghosts,
    }
}
