//! The five fixed hybrid stages and the five-step pipeline description
//! (spec §4.1 steps 5-6, SPEC_FULL §3 `_build_hybrid_stages`/
//! `_build_hybrid_pipeline`).

use ahash::AHashSet;

use super::candidates::CandidateQueue;
use super::report::{PipelineStep, StageReport, StageStatus, SymbolicTargetSummary};
use super::Components;
use crate::fuzzer::Fuzzer;
use crate::types::CandidateOrigin;

const MAX_SYMBOLIC_STAGE_TARGETS: usize = 5;
const TAINT_STAGE_EXEC_TIME: f64 = 0.1;
const SYMBOLIC_STAGE_EXEC_TIME: f64 = 0.2;

/// Run the five fixed stages, updating scheduler scores for the taint and
/// symbolic candidates as a side effect (spec §4.4 consults these scores on
/// the next iteration).
pub fn build_stages<F: Fuzzer>(
    fuzzer: &mut F,
    components: &mut Components,
    queue: &CandidateQueue,
    symbolic_targets: &[SymbolicTargetSummary],
) -> Vec<StageReport> {
    let mut stages = Vec::with_capacity(5);

    let analysis = fuzzer.analyze_target("");
    let vm_handlers = fuzzer.vm_handlers().len();
    stages.push(StageReport {
        name: "vm_detection",
        status: if analysis.error.is_some() {
            StageStatus::Error
        } else {
            StageStatus::Success
        },
        duration_seconds: 0.0,
        details: serde_json::json!({
            "vm_handlers": vm_handlers,
            "dispatcher_address": fuzzer.dispatcher_address(),
            "error": analysis.error,
        }),
    });

    let seed_count = queue.counts.seed_cases;
    stages.push(StageReport {
        name: "seed_corpus",
        status: if seed_count > 0 { StageStatus::Success } else { StageStatus::Skipped },
        duration_seconds: 0.0,
        details: serde_json::json!({ "seed_cases": seed_count }),
    });

    let mutation_payloads: Vec<&Vec<u8>> = queue
        .iter()
        .filter(|c| matches!(c.origin, CandidateOrigin::TaintMutation))
        .map(|c| &c.payload)
        .collect();
    for payload in &mutation_payloads {
        components.scheduler.update_score(payload, true, TAINT_STAGE_EXEC_TIME);
    }
    stages.push(StageReport {
        name: "taint_guided_mutation",
        status: if mutation_payloads.is_empty() { StageStatus::Skipped } else { StageStatus::Success },
        duration_seconds: 0.0,
        details: serde_json::json!({ "mutations": mutation_payloads.len() }),
    });

    let stage_targets: Vec<&SymbolicTargetSummary> =
        symbolic_targets.iter().take(MAX_SYMBOLIC_STAGE_TARGETS).collect();
    let feasible_count = stage_targets.iter().filter(|t| t.feasible).count();
    for target in stage_targets.iter().filter(|t| t.feasible) {
        if let Some(solution) = components.symbolic.generate_input_for_path(&[target.branch]) {
            components.scheduler.update_score(&solution, false, SYMBOLIC_STAGE_EXEC_TIME);
        }
    }
    stages.push(StageReport {
        name: "symbolic_guidance",
        status: if stage_targets.is_empty() { StageStatus::Skipped } else { StageStatus::Success },
        duration_seconds: 0.0,
        details: serde_json::json!({
            "targets_considered": stage_targets.len(),
            "feasible": feasible_count,
        }),
    });

    stages.push(StageReport {
        name: "power_scheduler_snapshot",
        status: StageStatus::Success,
        duration_seconds: 0.0,
        details: serde_json::json!({
            "tracked_inputs": components.scheduler.tracked_count(),
            "top_inputs_preview": components
                .scheduler
                .get_top_inputs(4)
                .iter()
                .map(|payload| payload.len())
                .collect::<Vec<_>>(),
        }),
    });

    stages
}

/// Descriptive, non-executing pipeline steps (spec §4.1 step 6: "a
/// descriptive pipeline, not a promise of execution").
pub fn build_pipeline(
    queue: &CandidateQueue,
    coverage: &AHashSet<u64>,
    crash_info_present: bool,
) -> Vec<PipelineStep> {
    vec![
        PipelineStep {
            name: "vm_detection",
            status: StageStatus::Ready,
            details: serde_json::json!({}),
        },
        PipelineStep {
            name: "coverage_guided_fuzzing",
            status: if coverage.is_empty() { StageStatus::Pending } else { StageStatus::Ready },
            details: serde_json::json!({ "coverage_hint_size": coverage.len() }),
        },
        PipelineStep {
            name: "taint_guided_mutation",
            status: if queue.counts.mutations > 0 { StageStatus::Ready } else { StageStatus::Skipped },
            details: serde_json::json!({ "mutations": queue.counts.mutations }),
        },
        PipelineStep {
            name: "symbolic_constraint_solving",
            status: if queue.counts.symbolic_cases > 0 { StageStatus::Ready } else { StageStatus::Skipped },
            details: serde_json::json!({ "symbolic_cases": queue.counts.symbolic_cases }),
        },
        PipelineStep {
            name: "crash_triage",
            status: if crash_info_present { StageStatus::Ready } else { StageStatus::Waiting },
            details: serde_json::json!({ "crash_info_present": crash_info_present }),
        },
    ]
}
