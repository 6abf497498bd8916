//! revgraph-core library.
//!
//! An in-memory revision ancestry graph. Nodes are revisions keyed by
//! [`Key`]; edges point from a revision to its ordered parents. Each node
//! carries a GDFO (global distance from origin) that the queries use to prune
//! their walks.
//!
//! - [`graph`]: node store, bulk construction and incremental `add_node`.
//! - [`heads`]: heads of a candidate set, with an optional per-graph cache.
//! - [`topo`]: parent-first `topo_sort` and the prefix-grouped `gc_sort`.
//! - [`merge_sort`]: merge-sorted history with dotted revision numbers.
//!
//! # Conventions
//!
//! - **Errors**: Graph operations return [`error::Result`]; configuration
//!   loading uses `anyhow::Result` with context.
//! - **Logging**: Use `tracing` macros (`warn!`, `debug!`, `trace!`).

extern crate self as revgraph_core;

pub mod config;
pub mod error;
pub mod graph;
pub mod heads;
pub mod key;
pub mod merge_sort;
pub mod topo;

#[cfg(test)]
mod fixtures;

pub use config::{GraphConfig, load_graph_config, parse_graph_config};
pub use error::{ErrorCode, GraphError, Result};
pub use graph::{AddOutcome, KnownGraph, Node, NodeState};
pub use key::{Key, NULL_REVISION};
pub use merge_sort::{MergeSortNode, Revno};
