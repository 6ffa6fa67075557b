//! The external execution facade the orchestrator consumes (spec §6).
//!
//! Everything in this module is a *contract*: the process launcher,
//! instrumentation, coverage tracker, corpus manager, and crash analyzer
//! live outside this crate (spec §1 Out Of Scope). The orchestrator is
//! simulation-capable by construction — any [`Fuzzer`] implementation,
//! including an in-memory fake, drives the same hybrid loop.

use ahash::AHashSet;

use crate::config::OptionMap;

/// Outcome of a single [`Fuzzer::execute_target`] call.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub coverage: AHashSet<u64>,
    pub crashed: bool,
    pub execution_time: f64,
    pub taint_flow: Option<OptionMap>,
    pub crash_info: Option<OptionMap>,
}

/// Outcome of [`Fuzzer::analyze_target`].
#[derive(Debug, Clone, Default)]
pub struct TargetAnalysis {
    pub details: OptionMap,
    pub error: Option<String>,
}

/// Aggregate counters from the external corpus manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusStats {
    pub total_inputs: usize,
}

/// Execution facade contract consumed by the [`crate::Orchestrator`].
///
/// A real implementation launches a process and attaches instrumentation; a
/// test or simulation implementation can be a pure in-memory fake — the
/// orchestrator never distinguishes between the two (spec Non-goals:
/// "the core must remain simulation-capable with pluggable execution").
pub trait Fuzzer {
    /// Detect and describe the target at `path`, or report an error via
    /// [`TargetAnalysis::error`].
    fn analyze_target(&mut self, path: &str) -> TargetAnalysis;

    /// Run the target against `input` and report coverage/crash/timing.
    ///
    /// Treated as a blocking call bounded by
    /// [`crate::config::FuzzingConfig::timeout_seconds`] from the core's
    /// point of view (spec §5); a timeout is reported through
    /// `crashed = false` with an engine-specific exit marker in
    /// `crash_info`, not as an error.
    fn execute_target(&mut self, input: &[u8]) -> ExecutionOutcome;

    /// Produce a fallback input when the candidate queue runs dry.
    fn generate_input(&mut self) -> Option<Vec<u8>>;

    /// Current coverage set, as seen by the external coverage tracker.
    fn coverage_set(&self) -> AHashSet<u64>;

    /// Add `input` to the external corpus, tagged with the coverage it
    /// produced and the time it was observed.
    fn add_to_corpus(&mut self, input: &[u8], coverage: &AHashSet<u64>, observed_at: f64);

    /// Aggregate corpus statistics.
    fn corpus_stats(&self) -> CorpusStats;

    /// Known VM dispatch handler addresses, when the target is a VM (spec
    /// SPEC_FULL §3, `_execute_vm`).
    fn vm_handlers(&self) -> &[u64] {
        &[]
    }

    /// VM dispatcher entry address, when known.
    fn dispatcher_address(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A minimal, deterministic [`Fuzzer`] used across orchestrator tests.
    ///
    /// Coverage grows monotonically with execution count so that repeated
    /// executions against distinct payloads keep reporting new coverage,
    /// exercising the orchestrator's re-enqueue logic.
    #[derive(Debug, Default)]
    pub struct FakeFuzzer {
        pub executions: usize,
        pub coverage: AHashSet<u64>,
        pub corpus: Vec<Vec<u8>>,
        pub generated_inputs: Vec<Vec<u8>>,
    }

    impl FakeFuzzer {
        pub fn with_generated(mut self, inputs: Vec<Vec<u8>>) -> Self {
            self.generated_inputs = inputs;
            self
        }
    }

    impl Fuzzer for FakeFuzzer {
        fn analyze_target(&mut self, path: &str) -> TargetAnalysis {
            let mut details = OptionMap::new();
            details.insert("path".into(), serde_json::json!(path));
            TargetAnalysis {
                details,
                error: None,
            }
        }

        fn execute_target(&mut self, input: &[u8]) -> ExecutionOutcome {
            self.executions += 1;
            let new_block = self.executions as u64 * 10 + input.first().copied().unwrap_or(0) as u64;
            let mut coverage = AHashSet::default();
            coverage.insert(new_block);
            ExecutionOutcome {
                coverage,
                crashed: false,
                execution_time: 0.01,
                taint_flow: None,
                crash_info: None,
            }
        }

        fn generate_input(&mut self) -> Option<Vec<u8>> {
            if self.generated_inputs.is_empty() {
                None
            } else {
                Some(self.generated_inputs.remove(0))
            }
        }

        fn coverage_set(&self) -> AHashSet<u64> {
            self.coverage.clone()
        }

        fn add_to_corpus(&mut self, input: &[u8], coverage: &AHashSet<u64>, _observed_at: f64) {
            self.coverage.extend(coverage.iter().copied());
            self.corpus.push(input.to_vec());
        }

        fn corpus_stats(&self) -> CorpusStats {
            CorpusStats {
                total_inputs: self.corpus.len(),
            }
        }
    }
}
