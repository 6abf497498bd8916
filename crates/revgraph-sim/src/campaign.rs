//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds across configurable history shapes, collecting
//! pass/fail results and identifying the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use revgraph_core::GraphConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::history::HistoryConfig;
use crate::oracle::{GraphOracle, InvariantViolation, OracleResult};
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration controlling how many seeds to run and
/// what simulation parameters to use for each seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    /// Shape of every generated history.
    pub history: HistoryConfig,
    /// Chance that a revision arrives late (percent, 0–100).
    pub withhold_percent: u8,
    /// Chance that a revision is sent twice (percent, 0–100).
    pub resend_percent: u8,
    /// Heads probes per seed.
    pub heads_probes: usize,
    /// Memoize heads answers in the graph under test.
    pub heads_cache: bool,
    /// Cache size before reset. Small values exercise the reset path.
    pub heads_cache_limit: usize,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            history: sim.history,
            withhold_percent: sim.withhold_percent,
            resend_percent: sim.resend_percent,
            heads_probes: sim.heads_probes,
            heads_cache: sim.graph.heads_cache,
            heads_cache_limit: sim.graph.heads_cache_limit,
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub const fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            history: self.history,
            withhold_percent: self.withhold_percent,
            resend_percent: self.resend_percent,
            heads_probes: self.heads_probes,
            graph: GraphConfig {
                heads_cache: self.heads_cache,
                heads_cache_limit: self.heads_cache_limit,
            },
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    /// The seed that failed.
    pub seed: u64,
    /// Invariant violations found.
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    /// Total seeds executed.
    pub seeds_run: usize,
    /// Seeds that passed all invariants.
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    /// All seed failures with violation details.
    pub failures: Vec<SeedFailure>,
    /// Seeds where a late revision renumbered existing descendants.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Detailed trace produced by replaying a single seed.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    /// The simulation result including the full trace and final graph.
    pub result: SimulationResult,
    /// Oracle check result with violation details.
    pub oracle: OracleResult,
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut seeds_run = 0_usize;
    let mut seeds_passed = 0_usize;
    let mut first_failure: Option<u64> = None;
    let mut failures = Vec::new();
    let mut interesting_states_reached = 0_usize;

    for seed in config.seed_range.clone() {
        seeds_run += 1;

        let trace = replay_seed(seed, config)?;
        if trace.result.interesting_state_reached {
            interesting_states_reached += 1;
        }

        if trace.oracle.passed {
            seeds_passed += 1;
        } else {
            warn!(seed, violations = trace.oracle.violations.len(), "seed failed");
            if first_failure.is_none() {
                first_failure = Some(seed);
            }
            failures.push(SeedFailure {
                seed,
                violations: trace.oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    info!(seeds_run, seeds_passed, interesting_states_reached, "campaign complete");
    Ok(CampaignReport {
        seeds_run,
        seeds_passed,
        first_failure,
        failures,
        interesting_states_reached,
    })
}

/// Run a single seed and return Ok(()) on pass, Err(violations) on failure.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the simulation itself encounters an internal
/// error (invalid config, etc). The inner `Result` distinguishes pass from
/// invariant violations.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let trace = replay_seed(seed, config)?;
    if trace.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(trace.oracle.violations))
    }
}

/// Replay a single seed with full trace details for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;

    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;
    let oracle = GraphOracle::check_all(&result);

    Ok(DetailedTrace { result, oracle })
}

/// Format an invariant violation into a human-readable string.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::UnexpectedOutcome { step, phase, event } => {
            format!("UnexpectedOutcome: step {step} ({phase:?}) recorded {event}")
        }
        InvariantViolation::GdfoRecurrence {
            key,
            gdfo,
            expected,
        } => format!("GdfoRecurrence: {key} has gdfo {gdfo}, expected {expected}"),
        InvariantViolation::BulkDivergence {
            key,
            incremental,
            bulk,
        } => format!(
            "BulkDivergence: {key} differs (incremental={}, bulk={})",
            incremental.as_deref().unwrap_or("absent"),
            bulk.as_deref().unwrap_or("absent"),
        ),
        InvariantViolation::SortOrder {
            sort,
            parent,
            child,
        } => format!("SortOrder: {sort} emitted {parent} and {child} out of order"),
        InvariantViolation::SortCoverage {
            sort,
            missing,
            extra,
        } => format!(
            "SortCoverage: {sort} missing {} keys, {} unexpected (missing={missing:?}, extra={extra:?})",
            missing.len(),
            extra.len()
        ),
        InvariantViolation::HeadsMismatch {
            candidates,
            heads,
            expected,
        } => format!(
            "HeadsMismatch: heads of {candidates:?} were {heads:?}, expected {expected:?}"
        ),
        InvariantViolation::DuplicateRevno { revno } => {
            format!("DuplicateRevno: {revno} assigned twice")
        }
        InvariantViolation::MainlineNumbering { revnos } => {
            format!("MainlineNumbering: mainline revnos {}", revnos.join(", "))
        }
        InvariantViolation::EndOfMerge { key } => {
            format!("EndOfMerge: {key} has the wrong end_of_merge flag")
        }
        InvariantViolation::QueryFailed { query, error } => {
            format!("QueryFailed: {query} returned an error: {error}")
        }
    }
}

#[cfg(test)]
mod tests {
    use revgraph_core::Key;

    use super::*;

    fn small(seeds: Range<u64>) -> CampaignConfig {
        CampaignConfig {
            seed_range: seeds,
            history: HistoryConfig {
                revisions: 120,
                ..HistoryConfig::default()
            },
            ..CampaignConfig::default()
        }
    }

    #[test]
    fn campaign_config_default_is_valid() {
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn campaign_config_empty_seed_range_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn campaign_config_bad_percent_rejected() {
        let config = CampaignConfig {
            withhold_percent: 150,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sim_config_for_seed_uses_correct_seed() {
        let config = CampaignConfig::default();
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.history, config.history);
        assert_eq!(sim.graph.heads_cache_limit, config.heads_cache_limit);
    }

    #[test]
    fn run_single_seed_passes() {
        let result = run_single_seed(0, &small(0..1)).expect("sim should not error");
        assert!(result.is_ok(), "seed 0 should pass: {result:?}");
    }

    #[test]
    fn run_campaign_all_seeds_pass() {
        let report = run_campaign(&small(0..25)).expect("campaign should not error");
        assert_eq!(report.seeds_run, 25);
        assert_eq!(report.seeds_passed, 25);
        assert!(report.all_passed());
        assert!(report.first_failure.is_none());
    }

    #[test]
    fn tiny_heads_cache_still_passes() {
        let config = CampaignConfig {
            heads_cache_limit: 1,
            heads_probes: 16,
            ..small(0..10)
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert!(report.all_passed(), "failures: {:?}", report.failures);
    }

    #[test]
    fn uncached_campaign_passes() {
        let config = CampaignConfig {
            heads_cache: false,
            ..small(0..10)
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert!(report.all_passed(), "failures: {:?}", report.failures);
    }

    #[test]
    fn replay_is_deterministic() {
        let config = small(0..1);
        let first = replay_seed(7, &config).expect("replay 1");
        let second = replay_seed(7, &config).expect("replay 2");

        assert_eq!(first.result.trace, second.result.trace);
        assert_eq!(first.result.history, second.result.history);
        assert_eq!(first.result.probes, second.result.probes);
    }

    #[test]
    fn campaign_reaches_interesting_states() {
        let config = CampaignConfig {
            withhold_percent: 30,
            ..small(0..20)
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert!(
            report.interesting_states_reached > 0,
            "expected some seeds to fill ghosts with descendants"
        );
    }

    #[test]
    fn campaign_report_serializes_to_json() {
        let report = CampaignReport {
            seeds_run: 10,
            seeds_passed: 9,
            first_failure: Some(7),
            failures: vec![SeedFailure {
                seed: 7,
                violations: vec!["EndOfMerge: rev-00003 has the wrong end_of_merge flag".into()],
            }],
            interesting_states_reached: 5,
        };
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"seeds_run\":10"));
        assert!(json.contains("\"first_failure\":7"));
    }

    #[test]
    fn format_violation_produces_readable_strings() {
        let v = InvariantViolation::GdfoRecurrence {
            key: Key::from("rev-00004"),
            gdfo: 3,
            expected: 5,
        };
        let s = format_violation(&v);
        assert!(s.starts_with("GdfoRecurrence"));
        assert!(s.contains("rev-00004 has gdfo 3, expected 5"));
    }
}
