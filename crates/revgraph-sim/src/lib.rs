//! revgraph-sim library.
//!
//! Deterministic simulation harness for the revision graph. A seed drives a
//! random branch-and-merge history, which is replayed into a graph the way a
//! repository sees it in practice: most revisions arrive in order, some are
//! withheld and only arrive once their descendants have referenced them as
//! ghosts, and some are re-sent. Oracles then check the final graph.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod campaign;
pub mod history;
pub mod oracle;
pub mod rng;

use std::collections::BTreeSet;

use anyhow::{Result, bail};
use revgraph_core::{AddOutcome, GraphConfig, Key, KnownGraph};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::history::{HistoryConfig, Revision, SimulatedHistory};
use crate::rng::DeterministicRng;

/// Configuration for a single simulated replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub history: HistoryConfig,
    /// Chance that a revision is held back until the end (percent, 0–100).
    pub withhold_percent: u8,
    /// Chance that a revision is sent a second time with its parents reversed.
    pub resend_percent: u8,
    /// Number of heads probes issued before and after the withheld revisions
    /// arrive.
    pub heads_probes: usize,
    /// Configuration of the graph under test.
    pub graph: GraphConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            history: HistoryConfig::default(),
            withhold_percent: 10,
            resend_percent: 5,
            heads_probes: 8,
            graph: GraphConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        self.history.validate()?;
        if self.withhold_percent > 100 {
            bail!("withhold_percent must be <= 100");
        }
        if self.resend_percent > 100 {
            bail!("resend_percent must be <= 100");
        }
        if self.graph.heads_cache && self.graph.heads_cache_limit == 0 {
            bail!("heads_cache_limit must be > 0 when the heads cache is enabled");
        }
        Ok(())
    }
}

/// When during the replay a trace event happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Revisions arriving in creation order.
    Initial,
    /// A revision sent again.
    Resend,
    /// Heads probes before the withheld revisions arrive.
    ProbeBefore,
    /// Withheld revisions arriving late.
    Late,
    /// Heads probes after every revision has arrived.
    ProbeAfter,
}

/// What happened at one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEventKind {
    Inserted { key: Key },
    Unchanged { key: Key },
    GhostFilled { key: Key, renumbered: usize },
    Rejected { key: Key, error: String },
    Heads { candidates: Vec<Key>, heads: BTreeSet<Key> },
    HeadsFailed { candidates: Vec<Key>, error: String },
}

/// One step of the replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub step: usize,
    pub phase: Phase,
    pub kind: TraceEventKind,
}

/// A heads query issued twice: once with revisions still withheld, once at
/// the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadsProbe {
    pub candidates: Vec<Key>,
    pub before: Option<BTreeSet<Key>>,
    pub after: Option<BTreeSet<Key>>,
}

/// Output of [`Simulator::run`].
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub seed: u64,
    pub history: SimulatedHistory,
    /// The graph built incrementally by the replay.
    pub graph: KnownGraph,
    pub trace: Vec<TraceEvent>,
    pub probes: Vec<HeadsProbe>,
    /// At least one late revision renumbered existing descendants.
    pub interesting_state_reached: bool,
}

/// Replays one generated history into a graph.
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    graph: KnownGraph,
    trace: Vec<TraceEvent>,
}

impl Simulator {
    /// Create a simulator for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rng: DeterministicRng::new(config.seed),
            graph: KnownGraph::new(config.graph.clone()),
            trace: Vec::new(),
            config,
        })
    }

    /// Generate the history and replay it.
    ///
    /// # Errors
    ///
    /// Returns an error if the simulator has already been run.
    pub fn run(&mut self) -> Result<SimulationResult> {
        if !self.trace.is_empty() || !self.graph.is_empty() {
            bail!("simulator for seed {} has already run", self.config.seed);
        }

        let history = history::generate(&self.config.history, &mut self.rng);
        let mut withheld: Vec<&Revision> = Vec::new();
        let mut resend: Vec<&Revision> = Vec::new();

        for revision in &history.revisions {
            if self.rng.hit_rate_percent(self.config.withhold_percent) {
                withheld.push(revision);
                continue;
            }
            self.add(Phase::Initial, &revision.key, revision.parents.clone());
            if self.rng.hit_rate_percent(self.config.resend_percent) {
                resend.push(revision);
            }
        }

        for revision in resend {
            let mut parents = revision.parents.clone();
            parents.reverse();
            self.add(Phase::Resend, &revision.key, parents);
        }

        let mut probes = self.pick_probes(&history);
        for probe in &mut probes {
            probe.before = self.query_heads(Phase::ProbeBefore, &probe.candidates);
        }

        self.rng.shuffle(&mut withheld);
        debug!(seed = self.config.seed, late = withheld.len(), "delivering withheld revisions");
        for revision in withheld {
            self.add(Phase::Late, &revision.key, revision.parents.clone());
        }

        for probe in &mut probes {
            probe.after = self.query_heads(Phase::ProbeAfter, &probe.candidates);
        }

        let interesting_state_reached = self.trace.iter().any(|event| {
            matches!(event.kind, TraceEventKind::GhostFilled { renumbered, .. } if renumbered > 0)
        });
        info!(
            seed = self.config.seed,
            revisions = history.revisions.len(),
            steps = self.trace.len(),
            interesting_state_reached,
            "simulation complete"
        );

        Ok(SimulationResult {
            seed: self.config.seed,
            history,
            graph: self.graph.clone(),
            trace: std::mem::take(&mut self.trace),
            probes,
            interesting_state_reached,
        })
    }

    fn add(&mut self, phase: Phase, key: &Key, parents: Vec<Key>) {
        let kind = match self.graph.add_node(key.clone(), parents) {
            Ok(AddOutcome::Inserted) => TraceEventKind::Inserted { key: key.clone() },
            Ok(AddOutcome::Unchanged) => TraceEventKind::Unchanged { key: key.clone() },
            Ok(AddOutcome::GhostFilled { renumbered }) => TraceEventKind::GhostFilled {
                key: key.clone(),
                renumbered,
            },
            Err(err) => TraceEventKind::Rejected {
                key: key.clone(),
                error: err.to_string(),
            },
        };
        self.record(phase, kind);
    }

    fn query_heads(&mut self, phase: Phase, candidates: &[Key]) -> Option<BTreeSet<Key>> {
        match self.graph.heads(candidates) {
            Ok(heads) => {
                self.record(
                    phase,
                    TraceEventKind::Heads {
                        candidates: candidates.to_vec(),
                        heads: heads.clone(),
                    },
                );
                Some(heads)
            }
            Err(err) => {
                self.record(
                    phase,
                    TraceEventKind::HeadsFailed {
                        candidates: candidates.to_vec(),
                        error: err.to_string(),
                    },
                );
                None
            }
        }
    }

    /// Candidate sets drawn from keys the graph already knows, ghosts
    /// included, so late revisions can change the answer.
    fn pick_probes(&mut self, history: &SimulatedHistory) -> Vec<HeadsProbe> {
        let known: Vec<&Key> = history
            .revisions
            .iter()
            .map(|revision| &revision.key)
            .filter(|key| self.graph.contains(key))
            .collect();
        if known.len() < 2 {
            return Vec::new();
        }

        (0..self.config.heads_probes)
            .map(|_| {
                let size = 2 + self.rng.next_index(3);
                let mut candidates: Vec<Key> = (0..size)
                    .filter_map(|_| self.rng.pick(&known).map(|key| (*key).clone()))
                    .collect();
                candidates.sort();
                candidates.dedup();
                HeadsProbe {
                    candidates,
                    before: None,
                    after: None,
                }
            })
            .collect()
    }

    fn record(&mut self, phase: Phase, kind: TraceEventKind) {
        let step = self.trace.len();
        self.trace.push(TraceEvent { step, phase, kind });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_cache_limit_rejected() {
        let config = SimulationConfig {
            graph: GraphConfig {
                heads_cache: true,
                heads_cache_limit: 0,
            },
            ..SimulationConfig::default()
        };
        assert!(Simulator::new(config).is_err());
    }

    #[test]
    fn run_replays_every_revision() {
        let mut simulator = Simulator::new(SimulationConfig {
            seed: 3,
            ..SimulationConfig::default()
        })
        .expect("valid config");
        let result = simulator.run().expect("run");

        for revision in &result.history.revisions {
            let node = result.graph.node(&revision.key).expect("revision present");
            assert!(!node.is_ghost(), "{} left as ghost", revision.key);
        }
        assert_eq!(
            result.graph.ghosts().into_iter().cloned().collect::<BTreeSet<_>>(),
            result.history.ghosts
        );
    }

    #[test]
    fn run_twice_is_an_error() {
        let mut simulator = Simulator::new(SimulationConfig::default()).expect("valid config");
        simulator.run().expect("first run");
        assert!(simulator.run().is_err());
    }

    #[test]
    fn withholding_everything_fills_ghosts() {
        let mut simulator = Simulator::new(SimulationConfig {
            seed: 9,
            withhold_percent: 100,
            ..SimulationConfig::default()
        })
        .expect("valid config");
        let result = simulator.run().expect("run");
        assert!(result.trace.iter().all(|event| event.phase != Phase::Initial));
        assert!(
            result
                .trace
                .iter()
                .any(|event| matches!(event.kind, TraceEventKind::GhostFilled { .. }))
        );
    }
}
