//! Fuzzing configuration recognized by the core (spec §3, §6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Mutation/generation strategy requested for a run.
///
/// Unknown strings fall back to [`FuzzingStrategy::Hybrid`] rather than
/// erroring, matching the "invalid request options are silently ignored"
/// policy in spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuzzingStrategy {
    BitFlip,
    Mutation,
    Hybrid,
}

impl FuzzingStrategy {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "bit_flip" | "bitflip" => Self::BitFlip,
            "mutation" => Self::Mutation,
            "hybrid" => Self::Hybrid,
            _ => Self::Hybrid,
        }
    }
}

impl Default for FuzzingStrategy {
    fn default() -> Self {
        Self::Hybrid
    }
}

/// Immutable configuration for a bounded hybrid workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzingConfig {
    pub max_iterations: u32,
    pub timeout_seconds: u32,
    pub max_input_size: usize,
    pub strategy: FuzzingStrategy,
    pub enable_coverage: bool,
    pub enable_taint: bool,
    pub enable_symbolic: bool,
    pub crash_dir: String,
    pub corpus_dir: String,
    pub seed: Option<u64>,
    pub parallel_jobs: u32,
}

impl Default for FuzzingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 128,
            timeout_seconds: 2,
            max_input_size: 4096,
            strategy: FuzzingStrategy::Hybrid,
            enable_coverage: true,
            enable_taint: true,
            enable_symbolic: true,
            crash_dir: "crashes".to_owned(),
            corpus_dir: "corpus".to_owned(),
            seed: None,
            parallel_jobs: 1,
        }
    }
}

/// A loosely-typed bag of orchestrator options, as accepted at the external
/// boundary (`configure`, `AnalysisRequest::options`).
pub type OptionMap = HashMap<String, serde_json::Value>;

impl FuzzingConfig {
    /// Build a [`FuzzingConfig`] from the `fuzzing.*` keys of an option map,
    /// the way the Python original's `_create_fuzzing_config` reads
    /// `self.config.get("fuzzing", {})`.
    pub fn from_options(options: &OptionMap) -> Self {
        let defaults = Self::default();
        let Some(fuzzing) = options.get("fuzzing").and_then(|v| v.as_object()) else {
            return defaults;
        };

        let max_iterations = fuzzing
            .get("max_iterations")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(defaults.max_iterations);
        let timeout_seconds = fuzzing
            .get("timeout_seconds")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(defaults.timeout_seconds);
        let max_input_size = fuzzing
            .get("max_input_size")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(defaults.max_input_size);
        let strategy = fuzzing
            .get("strategy")
            .and_then(|v| v.as_str())
            .map(FuzzingStrategy::parse)
            .unwrap_or(defaults.strategy);
        let crash_dir = fuzzing
            .get("crash_dir")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .unwrap_or(defaults.crash_dir);
        let corpus_dir = fuzzing
            .get("corpus_dir")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .unwrap_or(defaults.corpus_dir);
        let seed = fuzzing.get("seed").and_then(|v| v.as_u64());
        let parallel_jobs = fuzzing
            .get("parallel_jobs")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(defaults.parallel_jobs);

        Self {
            max_iterations,
            timeout_seconds,
            max_input_size,
            strategy,
            enable_coverage: true,
            enable_taint: true,
            enable_symbolic: true,
            crash_dir,
            corpus_dir,
            seed,
            parallel_jobs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = FuzzingConfig::default();
        assert_eq!(cfg.max_iterations, 128);
        assert_eq!(cfg.timeout_seconds, 2);
        assert_eq!(cfg.max_input_size, 4096);
        assert_eq!(cfg.strategy, FuzzingStrategy::Hybrid);
    }

    #[test]
    fn unknown_strategy_falls_back_to_hybrid() {
        assert_eq!(FuzzingStrategy::parse("quantum"), FuzzingStrategy::Hybrid);
        assert_eq!(FuzzingStrategy::parse("BIT_FLIP"), FuzzingStrategy::BitFlip);
    }

    #[test]
    fn from_options_reads_nested_fuzzing_map() {
        let mut options = OptionMap::new();
        options.insert(
            "fuzzing".to_owned(),
            serde_json::json!({
                "max_iterations": 16,
                "strategy": "mutation",
            }),
        );
        let cfg = FuzzingConfig::from_options(&options);
        assert_eq!(cfg.max_iterations, 16);
        assert_eq!(cfg.strategy, FuzzingStrategy::Mutation);
        assert_eq!(cfg.max_input_size, 4096);
    }
}
