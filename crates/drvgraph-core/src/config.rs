//! Analysis configuration.
//!
//! Every bound the engine applies to a search lives here. Values come from an
//! optional `drvgraph.toml`, then `DRVGRAPH_*` environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub redundancy: RedundancyConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub comparison: ComparisonConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundancyConfig {
    /// Longest bypass (in hops) searched when deciding an edge is redundant.
    #[serde(default = "default_redundancy_depth")]
    pub max_depth: usize,
    /// Edges examined per run before the result is marked truncated.
    #[serde(default = "default_redundancy_edges")]
    pub max_edges: usize,
}

impl Default for RedundancyConfig {
    fn default() -> Self {
        Self {
            max_depth: default_redundancy_depth(),
            max_edges: default_redundancy_edges(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionConfig {
    #[serde(default = "default_attribution_depth")]
    pub max_depth: usize,
    #[serde(default = "default_attribution_paths")]
    pub max_paths: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            max_depth: default_attribution_depth(),
            max_paths: default_attribution_paths(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

const fn default_redundancy_depth() -> usize {
    5
}

const fn default_redundancy_edges() -> usize {
    500_000
}

const fn default_attribution_depth() -> usize {
    32
}

const fn default_attribution_paths() -> usize {
    256
}

const fn default_top_n() -> usize {
    10
}

/// Load configuration from `path`; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<AnalysisConfig> {
    if !path.exists() {
        return Ok(AnalysisConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<AnalysisConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load configuration from an optional file and apply `DRVGRAPH_*`
/// environment overrides on top.
pub fn resolve_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => AnalysisConfig::default(),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn apply_overrides(
    config: &mut AnalysisConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let fields: [(&str, &mut usize); 5] = [
        (
            "DRVGRAPH_REDUNDANCY_MAX_DEPTH",
            &mut config.redundancy.max_depth,
        ),
        (
            "DRVGRAPH_REDUNDANCY_MAX_EDGES",
            &mut config.redundancy.max_edges,
        ),
        (
            "DRVGRAPH_ATTRIBUTION_MAX_DEPTH",
            &mut config.attribution.max_depth,
        ),
        (
            "DRVGRAPH_ATTRIBUTION_MAX_PATHS",
            &mut config.attribution.max_paths,
        ),
        ("DRVGRAPH_COMPARISON_TOP_N", &mut config.comparison.top_n),
    ];

    for (key, slot) in fields {
        if let Some(raw) = lookup(key) {
            *slot = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for {key}: '{raw}'"))?;
        }
    }

    Ok(())
}
