#![no_main]

use libfuzzer_sys::fuzz_target;
use revgraph_core::{GraphConfig, Key, KnownGraph};

const ALPHABET: u8 = 24;

fn key(byte: u8) -> Key {
    Key::from(format!("r{}", byte % ALPHABET))
}

// Each chunk is `[key, parent count, parents..]`. Arbitrary bytes produce
// cycles and redefinitions; every call must return instead of panicking.
fuzz_target!(|data: &[u8]| {
    let mut graph = KnownGraph::new(GraphConfig {
        heads_cache: true,
        heads_cache_limit: 8,
    });
    let mut rest = data;
    while let [node, count, tail @ ..] = rest {
        let count = usize::from(*count % 4).min(tail.len());
        let (parents, tail) = tail.split_at(count);
        let _ = graph.add_node(key(*node), parents.iter().map(|byte| key(*byte)));
        rest = tail;

        let candidates: Vec<Key> = parents.iter().map(|byte| key(*byte)).collect();
        let _ = graph.heads(&candidates);
    }

    let tips: Vec<Key> = graph.tips().into_iter().cloned().collect();
    let _ = graph.topo_sort();
    let _ = graph.gc_sort();
    for tip in &tips {
        let _ = graph.merge_sort(tip);
    }
});
