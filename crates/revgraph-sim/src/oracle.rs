use std::collections::{BTreeSet, HashMap};

use revgraph_core::{GraphConfig, GraphError, Key, KnownGraph, MergeSortNode, Node, NodeState};

use crate::history::SimulatedHistory;
use crate::{HeadsProbe, Phase, SimulationResult, TraceEvent, TraceEventKind};

// ── Core result types ─────────────────────────────────────────────────────────

/// Oracle result for an invariant check.
///
/// Returned by each checker and by [`GraphOracle::check_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    /// Every invariant that was violated.
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

/// Diagnostic information for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// An `add_node` call produced the wrong outcome for its phase.
    ///
    /// Emitted by `check_trace`.
    UnexpectedOutcome {
        step: usize,
        phase: Phase,
        /// Debug rendering of the recorded event.
        event: String,
    },

    /// A node's GDFO does not follow from its parents.
    ///
    /// Emitted by `check_gdfo`.
    GdfoRecurrence {
        key: Key,
        gdfo: u32,
        expected: u32,
    },

    /// The incrementally built graph differs from a bulk build of the same
    /// history.
    ///
    /// Emitted by `check_matches_bulk`.
    BulkDivergence {
        key: Key,
        /// Debug rendering of the incremental node, if present.
        incremental: Option<String>,
        /// Debug rendering of the bulk node, if present.
        bulk: Option<String>,
    },

    /// A sort emitted a child and its parent in the wrong order.
    ///
    /// Emitted by `check_topo_sort` and `check_gc_sort`.
    SortOrder {
        sort: &'static str,
        parent: Key,
        child: Key,
    },

    /// A sort emitted the wrong set of keys.
    SortCoverage {
        sort: &'static str,
        missing: Vec<Key>,
        extra: Vec<Key>,
    },

    /// A final `heads` answer disagrees with brute-force reachability.
    ///
    /// Emitted by `check_heads`.
    HeadsMismatch {
        candidates: Vec<Key>,
        heads: BTreeSet<Key>,
        expected: BTreeSet<Key>,
    },

    /// The same revno was handed out twice.
    ///
    /// Emitted by `check_merge_sort`.
    DuplicateRevno { revno: String },

    /// Mainline revnos are not `n, n-1, .., 1`.
    MainlineNumbering { revnos: Vec<String> },

    /// An `end_of_merge` flag disagrees with the entry that follows it.
    EndOfMerge { key: Key },

    /// A query returned an error on an acyclic graph.
    QueryFailed { query: &'static str, error: String },
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Oracle for verifying graph invariants after a simulated replay.
///
/// # Invariants checked
///
/// 1. **Trace outcomes** (`check_trace`): first arrivals insert or fill,
///    resends are no-ops, nothing is rejected.
/// 2. **GDFO** (`check_gdfo`): one more than the largest parent GDFO.
/// 3. **Order independence** (`check_matches_bulk`): the replayed graph equals
///    a bulk build.
/// 4. **Sorts** (`check_topo_sort`, `check_gc_sort`): parents and children
///    appear in the promised order.
/// 5. **Heads** (`check_heads`): answers after late arrivals match
///    reachability, so no stale cached answer survives.
/// 6. **Merge sort** (`check_merge_sort`): coverage, unique revnos, mainline
///    numbering and `end_of_merge` marks.
pub struct GraphOracle;

impl GraphOracle {
    /// Run every check against a simulation result.
    #[must_use]
    pub fn check_all(result: &SimulationResult) -> OracleResult {
        OracleResult::pass()
            .merge(Self::check_trace(&result.trace))
            .merge(Self::check_gdfo(&result.graph))
            .merge(Self::check_matches_bulk(&result.graph, &result.history))
            .merge(Self::check_topo_sort(&result.graph))
            .merge(Self::check_gc_sort(&result.graph))
            .merge(Self::check_heads(&result.graph, &result.probes))
            .merge(Self::check_merge_sort(&result.graph, &result.history.tip))
    }

    /// Check each recorded event against what its phase allows.
    #[must_use]
    pub fn check_trace(trace: &[TraceEvent]) -> OracleResult {
        let violations = trace
            .iter()
            .filter(|event| {
                let allowed = match (event.phase, &event.kind) {
                    (Phase::Initial, TraceEventKind::Inserted { .. })
                    | (Phase::Resend, TraceEventKind::Unchanged { .. })
                    | (
                        Phase::Late,
                        TraceEventKind::Inserted { .. } | TraceEventKind::GhostFilled { .. },
                    )
                    | (Phase::ProbeBefore | Phase::ProbeAfter, TraceEventKind::Heads { .. }) => {
                        true
                    }
                    _ => false,
                };
                !allowed
            })
            .map(|event| InvariantViolation::UnexpectedOutcome {
                step: event.step,
                phase: event.phase,
                event: format!("{:?}", event.kind),
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// Check `gdfo(n) = 1 + max(gdfo(parent))` for every node.
    #[must_use]
    pub fn check_gdfo(graph: &KnownGraph) -> OracleResult {
        let mut nodes: Vec<&Node> = graph.nodes().collect();
        nodes.sort_by_key(|node| node.key());

        let mut violations = Vec::new();
        for node in nodes {
            let expected = node
                .parent_keys()
                .unwrap_or_default()
                .iter()
                .filter_map(|parent| graph.gdfo(parent).ok())
                .max()
                .map_or(1, |deepest| deepest + 1);
            if node.gdfo() != expected {
                violations.push(InvariantViolation::GdfoRecurrence {
                    key: node.key().clone(),
                    gdfo: node.gdfo(),
                    expected,
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Check the replayed graph against a bulk build of `history`.
    #[must_use]
    pub fn check_matches_bulk(graph: &KnownGraph, history: &SimulatedHistory) -> OracleResult {
        let bulk = KnownGraph::from_parent_map(history.parent_map(), GraphConfig::uncached());
        let keys: BTreeSet<&Key> = graph.keys().chain(bulk.keys()).collect();

        let describe = |graph: &KnownGraph, key: &Key| {
            graph.node(key).ok().map(|node| {
                let mut children = node.child_keys().to_vec();
                children.sort();
                format!(
                    "{:?} gdfo={} parents={:?} children={children:?}",
                    node.state(),
                    node.gdfo(),
                    node.parent_keys(),
                )
            })
        };

        let violations = keys
            .into_iter()
            .filter_map(|key| {
                let incremental = describe(graph, key);
                let bulk = describe(&bulk, key);
                (incremental != bulk).then(|| InvariantViolation::BulkDivergence {
                    key: key.clone(),
                    incremental,
                    bulk,
                })
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// Check that `topo_sort` emits every non-ghost node after its parents.
    #[must_use]
    pub fn check_topo_sort(graph: &KnownGraph) -> OracleResult {
        let order = match graph.topo_sort() {
            Ok(order) => order,
            Err(err) => return query_failed("topo_sort", &err),
        };
        let position = positions(&order);
        let mut violations = coverage("topo_sort", graph, &order);

        for child in &order {
            for parent in present_parents(graph, child) {
                if position.get(parent).is_some_and(|p| *p > position[child]) {
                    violations.push(InvariantViolation::SortOrder {
                        sort: "topo_sort",
                        parent: parent.clone(),
                        child: child.clone(),
                    });
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Check that `gc_sort` emits every non-ghost node before its parents.
    #[must_use]
    pub fn check_gc_sort(graph: &KnownGraph) -> OracleResult {
        let order = graph.gc_sort();
        let position = positions(&order);
        let mut violations = coverage("gc_sort", graph, &order);

        for child in &order {
            for parent in present_parents(graph, child) {
                if position.get(parent).is_some_and(|p| *p < position[child]) {
                    violations.push(InvariantViolation::SortOrder {
                        sort: "gc_sort",
                        parent: parent.clone(),
                        child: child.clone(),
                    });
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Check final heads answers against brute-force reachability.
    #[must_use]
    pub fn check_heads(graph: &KnownGraph, probes: &[HeadsProbe]) -> OracleResult {
        let mut violations = Vec::new();
        for probe in probes {
            let Some(heads) = &probe.after else {
                violations.push(InvariantViolation::QueryFailed {
                    query: "heads",
                    error: format!("no answer for {:?}", probe.candidates),
                });
                continue;
            };
            let expected = brute_force_heads(graph, &probe.candidates);
            if *heads != expected {
                violations.push(InvariantViolation::HeadsMismatch {
                    candidates: probe.candidates.clone(),
                    heads: heads.clone(),
                    expected,
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Check the merge-sorted ancestry of `tip`.
    #[must_use]
    pub fn check_merge_sort(graph: &KnownGraph, tip: &Key) -> OracleResult {
        let sorted = match graph.merge_sort(tip) {
            Ok(sorted) => sorted,
            Err(err) => return query_failed("merge_sort", &err),
        };
        let mut violations = Vec::new();

        let mut expected: BTreeSet<Key> = reachable(graph, tip)
            .into_iter()
            .filter(|key| graph.node(key).is_ok_and(|node| !node.is_ghost()))
            .collect();
        expected.insert(tip.clone());
        let emitted: BTreeSet<Key> = sorted.iter().map(|entry| entry.key.clone()).collect();
        if emitted != expected || emitted.len() != sorted.len() {
            violations.push(InvariantViolation::SortCoverage {
                sort: "merge_sort",
                missing: expected.difference(&emitted).cloned().collect(),
                extra: emitted.difference(&expected).cloned().collect(),
            });
        }

        let mut seen = BTreeSet::new();
        for entry in &sorted {
            if !seen.insert(&entry.revno) {
                violations.push(InvariantViolation::DuplicateRevno {
                    revno: entry.revno.to_string(),
                });
            }
        }

        let mainline: Vec<&MergeSortNode> =
            sorted.iter().filter(|entry| entry.merge_depth == 0).collect();
        let numbered = mainline.iter().rev().enumerate().all(|(i, entry)| {
            entry.revno.components() == [u32::try_from(i + 1).unwrap_or(u32::MAX)]
        });
        if !numbered {
            violations.push(InvariantViolation::MainlineNumbering {
                revnos: mainline.iter().map(|entry| entry.revno.to_string()).collect(),
            });
        }

        violations.extend(end_of_merge_violations(graph, &sorted));

        OracleResult::from_violations(violations)
    }
}

/// Entries whose `end_of_merge` flag disagrees with the entry after them.
fn end_of_merge_violations(graph: &KnownGraph, sorted: &[MergeSortNode]) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    for pair in sorted.windows(2) {
        let (node, next) = (&pair[0], &pair[1]);
        let is_parent = present_or_ghost_parents(graph, &node.key).contains(&&next.key);
        let expected = next.merge_depth < node.merge_depth
            || (next.merge_depth == node.merge_depth && !is_parent);
        if node.end_of_merge != expected {
            violations.push(InvariantViolation::EndOfMerge {
                key: node.key.clone(),
            });
        }
    }
    if let Some(last) = sorted.last().filter(|entry| !entry.end_of_merge) {
        violations.push(InvariantViolation::EndOfMerge {
            key: last.key.clone(),
        });
    }
    violations
}

fn query_failed(query: &'static str, err: &GraphError) -> OracleResult {
    OracleResult::from_violations(vec![InvariantViolation::QueryFailed {
        query,
        error: err.to_string(),
    }])
}

fn positions(order: &[Key]) -> HashMap<&Key, usize> {
    order.iter().enumerate().map(|(i, key)| (key, i)).collect()
}

fn present_parents<'g>(graph: &'g KnownGraph, key: &Key) -> impl Iterator<Item = &'g Key> {
    graph
        .parent_keys(key)
        .ok()
        .flatten()
        .unwrap_or_default()
        .iter()
        .filter(|parent| graph.node(parent).is_ok_and(|node| node.state() != NodeState::Ghost))
}

fn coverage(sort: &'static str, graph: &KnownGraph, order: &[Key]) -> Vec<InvariantViolation> {
    let expected: BTreeSet<&Key> = graph
        .nodes()
        .filter(|node| !node.is_ghost())
        .map(|node| node.key())
        .collect();
    let emitted: BTreeSet<&Key> = order.iter().collect();
    if emitted == expected && emitted.len() == order.len() {
        return Vec::new();
    }
    vec![InvariantViolation::SortCoverage {
        sort,
        missing: expected.difference(&emitted).map(|key| (*key).clone()).collect(),
        extra: emitted.difference(&expected).map(|key| (*key).clone()).collect(),
    }]
}

/// Strict ancestors of `key`, found by walking parent links.
fn reachable(graph: &KnownGraph, key: &Key) -> BTreeSet<Key> {
    let mut seen = BTreeSet::new();
    let mut pending: Vec<&Key> = present_or_ghost_parents(graph, key);
    while let Some(next) = pending.pop() {
        if seen.insert(next.clone()) {
            pending.extend(present_or_ghost_parents(graph, next));
        }
    }
    seen
}

fn present_or_ghost_parents<'g>(graph: &'g KnownGraph, key: &Key) -> Vec<&'g Key> {
    graph
        .parent_keys(key)
        .ok()
        .flatten()
        .map(|parents| parents.iter().collect())
        .unwrap_or_default()
}

fn brute_force_heads(graph: &KnownGraph, candidates: &[Key]) -> BTreeSet<Key> {
    let ancestors: Vec<BTreeSet<Key>> = candidates
        .iter()
        .map(|candidate| reachable(graph, candidate))
        .collect();
    candidates
        .iter()
        .filter(|candidate| !ancestors.iter().any(|set| set.contains(*candidate)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Revision;
    use crate::{SimulationConfig, Simulator};

    fn k(key: &str) -> Key {
        Key::from(key)
    }

    fn history(revisions: &[(&str, &[&str])], tip: &str) -> SimulatedHistory {
        SimulatedHistory {
            revisions: revisions
                .iter()
                .map(|(key, parents)| Revision {
                    key: k(key),
                    parents: parents.iter().map(|parent| k(parent)).collect(),
                })
                .collect(),
            tip: k(tip),
            ghosts: BTreeSet::new(),
        }
    }

    fn diamond() -> SimulatedHistory {
        history(
            &[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])],
            "d",
        )
    }

    fn build(history: &SimulatedHistory) -> KnownGraph {
        KnownGraph::from_parent_map(history.parent_map(), GraphConfig::default())
    }

    #[test]
    fn check_all_passes_for_simulated_runs() {
        for seed in 0..8 {
            let mut simulator = Simulator::new(SimulationConfig {
                seed,
                ..SimulationConfig::default()
            })
            .expect("valid config");
            let result = simulator.run().expect("run");
            let report = GraphOracle::check_all(&result);
            assert!(report.passed, "seed {seed}: {:?}", report.violations);
        }
    }

    #[test]
    fn diamond_passes_every_check() {
        let history = diamond();
        let graph = build(&history);
        assert!(GraphOracle::check_gdfo(&graph).passed);
        assert!(GraphOracle::check_matches_bulk(&graph, &history).passed);
        assert!(GraphOracle::check_topo_sort(&graph).passed);
        assert!(GraphOracle::check_gc_sort(&graph).passed);
        assert!(GraphOracle::check_merge_sort(&graph, &k("d")).passed);
    }

    #[test]
    fn check_matches_bulk_detects_missing_revision() {
        let history = diamond();
        let partial = KnownGraph::from_parent_map(
            history.parent_map().filter(|(key, _)| *key != k("c")),
            GraphConfig::default(),
        );
        let result = GraphOracle::check_matches_bulk(&partial, &history);
        assert!(!result.passed);
        assert!(result.violations.iter().any(|violation| matches!(
            violation,
            InvariantViolation::BulkDivergence { key, .. } if *key == k("c")
        )));
    }

    #[test]
    fn check_heads_detects_wrong_answer() {
        let graph = build(&diamond());
        let stale = HeadsProbe {
            candidates: vec![k("b"), k("d")],
            before: None,
            after: Some(BTreeSet::from([k("b"), k("d")])),
        };
        let result = GraphOracle::check_heads(&graph, &[stale]);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::HeadsMismatch {
                candidates: vec![k("b"), k("d")],
                heads: BTreeSet::from([k("b"), k("d")]),
                expected: BTreeSet::from([k("d")]),
            }]
        );
    }

    #[test]
    fn check_heads_reports_missing_answer() {
        let graph = build(&diamond());
        let unanswered = HeadsProbe {
            candidates: vec![k("a"), k("b")],
            before: None,
            after: None,
        };
        let result = GraphOracle::check_heads(&graph, &[unanswered]);
        assert!(matches!(
            result.violations.as_slice(),
            [InvariantViolation::QueryFailed { query: "heads", .. }]
        ));
    }

    #[test]
    fn check_trace_flags_rejection_and_non_noop_resend() {
        let trace = vec![
            TraceEvent {
                step: 0,
                phase: Phase::Initial,
                kind: TraceEventKind::Inserted { key: k("a") },
            },
            TraceEvent {
                step: 1,
                phase: Phase::Initial,
                kind: TraceEventKind::Rejected {
                    key: k("b"),
                    error: "cycle".to_string(),
                },
            },
            TraceEvent {
                step: 2,
                phase: Phase::Resend,
                kind: TraceEventKind::Inserted { key: k("c") },
            },
        ];
        let result = GraphOracle::check_trace(&trace);
        let steps: Vec<usize> = result
            .violations
            .iter()
            .filter_map(|violation| match violation {
                InvariantViolation::UnexpectedOutcome { step, .. } => Some(*step),
                _ => None,
            })
            .collect();
        assert_eq!(steps, vec![1, 2]);
    }

    #[test]
    fn cycles_surface_as_failed_queries() {
        let graph = KnownGraph::from_parent_map(
            [("x", vec!["y"]), ("y", vec!["x"])],
            GraphConfig::default(),
        );
        let result = GraphOracle::check_topo_sort(&graph);
        assert!(matches!(
            result.violations.as_slice(),
            [InvariantViolation::QueryFailed { query: "topo_sort", .. }]
        ));
        assert!(!GraphOracle::check_merge_sort(&graph, &k("x")).passed);
    }

    #[test]
    fn end_of_merge_marks_branches_merged_together() {
        let graph = build(&history(
            &[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["a", "b", "c"])],
            "d",
        ));
        let mut sorted = graph.merge_sort(&k("d")).expect("acyclic");
        assert!(GraphOracle::check_merge_sort(&graph, &k("d")).passed);
        assert!(end_of_merge_violations(&graph, &sorted).is_empty());

        // `b` is followed by `c` at the same depth, and `c` is not its parent.
        let keys: Vec<Key> = sorted.iter().map(|entry| entry.key.clone()).collect();
        assert_eq!(keys, vec![k("d"), k("b"), k("c"), k("a")]);
        let b = sorted.iter_mut().find(|entry| entry.key == k("b")).expect("b");
        assert!(b.end_of_merge);
        b.end_of_merge = false;
        assert_eq!(
            end_of_merge_violations(&graph, &sorted),
            vec![InvariantViolation::EndOfMerge { key: k("b") }]
        );
    }

    #[test]
    fn merge_results_accumulate() {
        let failing = OracleResult::from_violations(vec![InvariantViolation::EndOfMerge {
            key: k("a"),
        }]);
        let merged = OracleResult::pass().merge(failing.clone()).merge(failing);
        assert!(!merged.passed);
        assert_eq!(merged.violations.len(), 2);
        assert!(OracleResult::pass().merge(OracleResult::pass()).passed);
    }
}
