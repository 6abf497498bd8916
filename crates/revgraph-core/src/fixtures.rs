//! Named history shapes shared by unit and integration tests.
//!
//! Integration tests pull this file in with `#[path]`, so it only uses the
//! public API.

#![allow(dead_code)]

use revgraph_core::{GraphConfig, Key, KnownGraph};

/// A history as `(revision, parents)` pairs.
pub type History = Vec<(&'static str, Vec<&'static str>)>;

const NULL: &str = "null:";

/// Shorthand for a single-component key.
pub fn k(name: &str) -> Key {
    Key::from(name)
}

/// Build a caching graph from a history.
pub fn graph(history: &[(&str, Vec<&str>)]) -> KnownGraph {
    graph_with(history, GraphConfig::default())
}

/// Build a graph from a history with an explicit configuration.
pub fn graph_with(history: &[(&str, Vec<&str>)], config: GraphConfig) -> KnownGraph {
    KnownGraph::from_parent_map(
        history
            .iter()
            .map(|(key, parents)| (*key, parents.iter().copied().collect::<Vec<_>>())),
        config,
    )
}

//     rev1
//     /  \
//  rev2a rev2b
//    |     |
//  rev3   /
//    |   /
//   rev4
pub fn ancestry_1() -> History {
    vec![
        ("rev1", vec![NULL]),
        ("rev2a", vec!["rev1"]),
        ("rev2b", vec!["rev1"]),
        ("rev3", vec!["rev2a"]),
        ("rev4", vec!["rev3", "rev2b"]),
    ]
}

pub fn feature_branch() -> History {
    vec![
        ("rev1", vec![NULL]),
        ("rev2b", vec!["rev1"]),
        ("rev3b", vec!["rev2b"]),
    ]
}

//     rev1
//     /  \
//  rev2a rev2b
//    |\  /|
//    | \/ |
//    | /\ |
//  rev3a rev3b
pub fn criss_cross() -> History {
    vec![
        ("rev1", vec![NULL]),
        ("rev2a", vec!["rev1"]),
        ("rev2b", vec!["rev1"]),
        ("rev3a", vec!["rev2a", "rev2b"]),
        ("rev3b", vec!["rev2b", "rev2a"]),
    ]
}

//         rev1
//       /  |  \
//   rev2a rev2b rev2c
//     |  /   \   /
//   rev3a     rev3b
pub fn history_shortcut() -> History {
    vec![
        ("rev1", vec![NULL]),
        ("rev2a", vec!["rev1"]),
        ("rev2b", vec!["rev1"]),
        ("rev2c", vec!["rev1"]),
        ("rev3a", vec!["rev2a", "rev2b"]),
        ("rev3b", vec!["rev2b", "rev2c"]),
    ]
}

//  a
//  |\
//  b |
//  | |
//  c |
//  | |
//  d |
//  |\|
//  e f
pub fn extended_history_shortcut() -> History {
    vec![
        ("a", vec![NULL]),
        ("b", vec!["a"]),
        ("c", vec!["b"]),
        ("d", vec!["c"]),
        ("e", vec!["d"]),
        ("f", vec!["a", "d"]),
    ]
}

// A long chain with two shortcuts racing down its middle; `z` reaches the
// chain through both `x` and `q`.
pub fn racing_shortcuts() -> History {
    vec![
        ("a", vec![NULL]),
        ("b", vec!["a"]),
        ("c", vec!["b"]),
        ("d", vec!["c"]),
        ("e", vec!["d"]),
        ("f", vec!["e"]),
        ("g", vec!["f"]),
        ("h", vec!["g"]),
        ("i", vec!["h", "o"]),
        ("j", vec!["i", "y"]),
        ("k", vec!["d"]),
        ("l", vec!["k"]),
        ("m", vec!["l"]),
        ("n", vec!["m"]),
        ("o", vec!["n", "g"]),
        ("p", vec!["f"]),
        ("q", vec!["p", "m"]),
        ("r", vec!["o"]),
        ("s", vec!["r"]),
        ("t", vec!["s"]),
        ("u", vec!["t"]),
        ("v", vec!["u"]),
        ("w", vec!["v"]),
        ("x", vec!["w"]),
        ("y", vec!["x"]),
        ("z", vec!["x", "q"]),
    ]
}

//     null:
//       |
//       f
//       |
//       e g
//      / \/
//     b   d
//     | \ |
//     a   c
//
// `g` is a ghost.
pub fn with_ghost() -> History {
    vec![
        ("a", vec!["b"]),
        ("c", vec!["b", "d"]),
        ("b", vec!["e"]),
        ("d", vec!["e", "g"]),
        ("e", vec!["f"]),
        ("f", vec![NULL]),
        (NULL, vec![]),
    ]
}

//  a
//  |\
//  b |
//  | |
//  c |
//   \|
//    d
pub fn alt_merge() -> History {
    vec![
        ("a", vec![]),
        ("b", vec!["a"]),
        ("c", vec!["b"]),
        ("d", vec!["a", "c"]),
    ]
}
