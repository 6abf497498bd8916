use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tuning knobs for a [`KnownGraph`](crate::KnownGraph).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Memoize `heads` results per candidate set.
    #[serde(default = "default_true")]
    pub heads_cache: bool,
    /// Number of memoized `heads` results kept before the cache is reset.
    #[serde(default = "default_heads_cache_limit")]
    pub heads_cache_limit: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            heads_cache: default_true(),
            heads_cache_limit: default_heads_cache_limit(),
        }
    }
}

impl GraphConfig {
    /// Configuration with `heads` memoization turned off.
    #[must_use]
    pub fn uncached() -> Self {
        Self {
            heads_cache: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    graph: GraphConfig,
}

/// Parse the `[graph]` table out of a TOML document.
///
/// # Errors
///
/// Returns an error if the text is not valid TOML or a field has the wrong type.
pub fn parse_graph_config(text: &str) -> Result<GraphConfig> {
    let file: ConfigFile = toml::from_str(text).context("Failed to parse graph config")?;
    Ok(file.graph)
}

/// Load graph configuration from a TOML file. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_graph_config(path: &Path) -> Result<GraphConfig> {
    if !path.exists() {
        return Ok(GraphConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_graph_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_true() -> bool {
    true
}

const fn default_heads_cache_limit() -> usize {
    4096
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir must be created");
        let cfg = load_graph_config(&dir.path().join("revgraph.toml")).expect("load should succeed");
        assert_eq!(cfg, GraphConfig::default());
        assert!(cfg.heads_cache);
        assert_eq!(cfg.heads_cache_limit, 4096);
    }

    #[test]
    fn partial_table_fills_defaults() {
        let cfg = parse_graph_config("[graph]\nheads_cache = false\n").expect("parse");
        assert!(!cfg.heads_cache);
        assert_eq!(cfg.heads_cache_limit, 4096);
    }

    #[test]
    fn empty_document_is_default() {
        let cfg = parse_graph_config("").expect("parse");
        assert_eq!(cfg, GraphConfig::default());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir must be created");
        let path = dir.path().join("revgraph.toml");
        std::fs::write(&path, "[graph]\nheads_cache_limit = 16\n").expect("write config");

        let cfg = load_graph_config(&path).expect("load should succeed");
        assert!(cfg.heads_cache);
        assert_eq!(cfg.heads_cache_limit, 16);
    }

    #[test]
    fn bad_type_is_reported_with_path() {
        let dir = tempfile::tempdir().expect("temp dir must be created");
        let path = dir.path().join("revgraph.toml");
        std::fs::write(&path, "[graph]\nheads_cache = \"yes\"\n").expect("write config");

        let err = load_graph_config(&path).expect_err("bad type must fail");
        assert!(format!("{err:#}").contains("revgraph.toml"));
    }
}
