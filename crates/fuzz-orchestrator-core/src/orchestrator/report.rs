//! Tagged report types assembled by the hybrid planner, serialized to a
//! neutral structured format only at the crate's external boundary
//! ([`crate::types::AnalysisResult::results`]).

use serde::Serialize;

/// Status of a pipeline step or staged phase.
///
/// The vocabulary spans both spec §4.1 uses: stages report
/// success/ready/skipped/error/disabled, pipeline steps report
/// pending/ready/skipped/waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Ready,
    Skipped,
    Error,
    Disabled,
    Pending,
    Waiting,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: &'static str,
    pub status: StageStatus,
    pub duration_seconds: f64,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStep {
    pub name: &'static str,
    pub status: StageStatus,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolicTargetSummary {
    pub branch: u64,
    pub constraints: Vec<String>,
    pub feasible: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaintSummary {
    pub tainted_bytes: Vec<usize>,
    pub tainted_addresses: Vec<u64>,
    pub influence_branches: Vec<u64>,
    pub operations: Vec<String>,
}

impl From<&crate::taint::TaintInfo> for TaintSummary {
    fn from(info: &crate::taint::TaintInfo) -> Self {
        let mut tainted_bytes: Vec<usize> = info.tainted_bytes.iter().copied().collect();
        tainted_bytes.sort_unstable();
        let mut tainted_addresses: Vec<u64> = info.tainted_addresses.iter().copied().collect();
        tainted_addresses.sort_unstable();
        let mut influence_branches: Vec<u64> = info.influence_branches.iter().copied().collect();
        influence_branches.sort_unstable();
        Self {
            tainted_bytes,
            tainted_addresses,
            influence_branches,
            operations: info.influence_operations.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IterationSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    pub origin: crate::types::CandidateOrigin,
    pub input_size: usize,
    pub input_preview: String,
    pub coverage_gain: usize,
    pub crashed: bool,
    pub execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<crate::config::OptionMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taint_flow: Option<crate::config::OptionMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_info: Option<CrashInfoPreview>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub spawned: Vec<SpawnedCandidate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrashInfoPreview {
    pub has_taint: bool,
    pub address: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpawnedCandidate {
    pub origin: crate::types::CandidateOrigin,
    pub detail: crate::config::OptionMap,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CandidateCounts {
    pub seed_cases: u32,
    pub mutations: u32,
    pub symbolic_cases: u32,
    pub dictionary_injections: u32,
    pub generated_cases: u32,
    pub other_cases: u32,
}

impl CandidateCounts {
    pub fn bump(&mut self, origin: crate::types::CandidateOrigin) {
        use crate::types::CandidateOrigin as O;
        match origin {
            O::Seed => self.seed_cases += 1,
            O::TaintMutation => self.mutations += 1,
            O::Symbolic => self.symbolic_cases += 1,
            O::Dictionary => self.dictionary_injections += 1,
            O::Generated => self.generated_cases += 1,
            O::Other => self.other_cases += 1,
        }
    }

    pub fn subtract_added(&self, initial: &CandidateCounts) -> serde_json::Value {
        serde_json::json!({
            "mutations": self.mutations.saturating_sub(initial.mutations),
            "symbolic_cases": self.symbolic_cases.saturating_sub(initial.symbolic_cases),
            "dictionary_injections": self.dictionary_injections.saturating_sub(initial.dictionary_injections),
            "generated_cases": self.generated_cases.saturating_sub(initial.generated_cases),
            "other_cases": self.other_cases.saturating_sub(initial.other_cases),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewSummary {
    pub iterations: Vec<IterationSummary>,
    pub stats: PreviewStats,
    pub notes: Vec<String>,
    pub final_coverage: usize,
    pub corpus_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewStats {
    pub total_cases: usize,
    pub crashes: usize,
    pub new_coverage: usize,
    pub seed_cases: u32,
    pub mutations: u32,
    pub symbolic_cases: u32,
    pub dictionary_injections: u32,
    pub generated_cases: u32,
    pub other_cases: u32,
    pub inputs_considered: usize,
    pub remaining_queue: usize,
    pub avg_execution_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub iterations: Vec<IterationSummary>,
    pub stats: RunStats,
    pub notes: Vec<String>,
    pub final_coverage: usize,
    pub corpus_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub iterations_requested: u32,
    pub iterations_completed: u32,
    pub crashes: usize,
    pub new_coverage: usize,
    pub seed_cases: u32,
    pub mutations: u32,
    pub symbolic_cases: u32,
    pub dictionary_injections: u32,
    pub generated_cases: u32,
    pub other_cases: u32,
    pub initial_candidates: usize,
    pub queue_remaining: usize,
    pub coverage_before: usize,
    pub coverage_after: usize,
    pub avg_execution_time: f64,
    pub new_cases_added: serde_json::Value,
}

pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
