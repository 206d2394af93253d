//! Configuration module for chunkgraph.
//!
//! Handles loading, validating, and providing default configuration values.

use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "chunkgraph.json";

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./chunkgraph.db".to_string()
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "target/**".to_string(),
        "node_modules/**".to_string(),
        ".git/**".to_string(),
    ]
}

fn default_dimensions() -> usize {
    384
}

fn default_seed_count() -> usize {
    5
}

fn default_max_hops() -> usize {
    2
}

fn default_max_neighbors() -> usize {
    16
}

fn default_top_k() -> usize {
    10
}

fn default_token_budget() -> usize {
    4000
}

fn default_damping() -> f64 {
    0.85
}

fn default_max_iterations() -> usize {
    100
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_path_seeds() -> usize {
    4
}

fn default_max_paths_per_pair() -> usize {
    64
}

fn default_max_reported_paths() -> usize {
    32
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Globs (relative to the indexed directory) skipped during indexing.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub retrieval: GraphRagConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

/// Knobs for graph-augmented retrieval.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GraphRagConfig {
    /// Chunks pulled from similarity search to anchor expansion.
    #[serde(default = "default_seed_count")]
    pub seed_count: usize,

    /// Bound on expansion depth and on simple-path length.
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    /// Persisted edges followed per frontier node.
    #[serde(default = "default_max_neighbors")]
    pub max_neighbors: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    #[serde(default = "default_damping")]
    pub damping: f64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Highest-centrality seeds whose pairs are searched for paths.
    #[serde(default = "default_path_seeds")]
    pub path_seeds: usize,

    #[serde(default = "default_max_paths_per_pair")]
    pub max_paths_per_pair: usize,

    #[serde(default = "default_max_reported_paths")]
    pub max_reported_paths: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            exclude_patterns: default_exclude_patterns(),
            embedding: EmbeddingConfig::default(),
            retrieval: GraphRagConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
        }
    }
}

impl Default for GraphRagConfig {
    fn default() -> Self {
        Self {
            seed_count: default_seed_count(),
            max_hops: default_max_hops(),
            max_neighbors: default_max_neighbors(),
            top_k: default_top_k(),
            token_budget: default_token_budget(),
            damping: default_damping(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            path_seeds: default_path_seeds(),
            max_paths_per_pair: default_max_paths_per_pair(),
            max_reported_paths: default_max_reported_paths(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to [`DEFAULT_CONFIG_PATH`].
    /// If the file does not exist, returns a default config and generates a
    /// template when the default path was used.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        let r = &self.retrieval;
        anyhow::ensure!(r.seed_count > 0, "retrieval.seed_count must be positive");
        anyhow::ensure!(r.top_k > 0, "retrieval.top_k must be positive");
        anyhow::ensure!(r.token_budget > 0, "retrieval.token_budget must be positive");
        anyhow::ensure!(
            r.damping > 0.0 && r.damping < 1.0,
            "retrieval.damping must be in (0, 1)"
        );
        anyhow::ensure!(r.tolerance > 0.0, "retrieval.tolerance must be positive");
        self.exclude_set()?;
        Ok(())
    }

    /// Compile `exclude_patterns` into a matcher.
    pub fn exclude_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude_patterns {
            let glob = Glob::new(pattern).with_context(|| format!("invalid exclude pattern: {pattern}"))?;
            builder.add(glob);
        }
        builder.build().context("failed to build exclude set")
    }
}

// ── Tests ────────────────────────────────────────────────────────────
