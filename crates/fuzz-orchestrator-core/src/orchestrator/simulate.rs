//! Dry-run preview of a hybrid execution: pops from the prepared queue and
//! calls into the [`Fuzzer`] facade, but never re-enqueues (spec §4.1 step
//! 8 "execution preview", SPEC_FULL §3 `_simulate_hybrid_execution`).

use ahash::AHashSet;

use super::candidates::CandidateQueue;
use super::report::{round6, CrashInfoPreview, IterationSummary, PreviewStats, PreviewSummary};
use super::Components;
use crate::fuzzer::Fuzzer;
use crate::types::CandidateOrigin;

const DEFAULT_PREVIEW_ITERATIONS: u32 = 3;
const PREVIEW_BYTES: usize = 16;

fn hex_preview(payload: &[u8]) -> String {
    payload.iter().take(PREVIEW_BYTES).map(|b| format!("{b:02x}")).collect()
}

/// Execute up to `requested_iterations` queued candidates against `fuzzer`
/// without launching a real run loop. `requested_iterations <= 0` clamps to
/// [`DEFAULT_PREVIEW_ITERATIONS`] (spec SPEC_FULL §3).
pub fn simulate_hybrid<F: Fuzzer>(
    fuzzer: &mut F,
    components: &mut Components,
    queue: &mut CandidateQueue,
    coverage_hint: &AHashSet<u64>,
    target_path: Option<String>,
    requested_iterations: i64,
) -> PreviewSummary {
    let preview_iterations = if requested_iterations <= 0 {
        DEFAULT_PREVIEW_ITERATIONS
    } else {
        requested_iterations as u32
    };

    let mut seen_coverage = coverage_hint.clone();
    seen_coverage.extend(fuzzer.coverage_set());
    let baseline_size = seen_coverage.len();

    let mut iterations = Vec::new();
    let mut per_origin = [0u32; 6];
    let mut exec_times = Vec::new();
    let mut crashes = 0usize;

    for _ in 0..preview_iterations {
        let Some(candidate) = queue.pop_front() else { break };
        let outcome = fuzzer.execute_target(&candidate.payload);

        let gained: Vec<u64> = outcome.coverage.difference(&seen_coverage).copied().collect();
        let coverage_gain = gained.len();
        seen_coverage.extend(outcome.coverage.iter().copied());
        if outcome.crashed {
            crashes += 1;
        }
        exec_times.push(outcome.execution_time);

        per_origin[origin_index(candidate.origin)] += 1;

        components
            .scheduler
            .update_score(&candidate.payload, coverage_gain > 0, outcome.execution_time);
        fuzzer.add_to_corpus(&candidate.payload, &outcome.coverage, outcome.execution_time);

        iterations.push(IterationSummary {
            iteration: None,
            origin: candidate.origin,
            input_size: candidate.payload.len(),
            input_preview: hex_preview(&candidate.payload),
            coverage_gain,
            crashed: outcome.crashed,
            execution_time: outcome.execution_time,
            detail: if candidate.detail.is_empty() { None } else { Some(candidate.detail) },
            coverage: if outcome.coverage.is_empty() {
                None
            } else {
                let mut v: Vec<u64> = outcome.coverage.iter().copied().collect();
                v.sort_unstable();
                Some(v)
            },
            taint_flow: outcome.taint_flow,
            crash_info: outcome.crash_info.as_ref().map(|info| CrashInfoPreview {
                has_taint: info.contains_key("tainted_offsets"),
                address: info.get("address").and_then(|v| v.as_u64()),
            }),
            spawned: Vec::new(),
        });
    }

    let avg_execution_time = if exec_times.is_empty() {
        0.0
    } else {
        round6(exec_times.iter().sum::<f64>() / exec_times.len() as f64)
    };

    let stats = PreviewStats {
        total_cases: iterations.len(),
        crashes,
        new_coverage: seen_coverage.len().saturating_sub(baseline_size),
        seed_cases: per_origin[origin_index(CandidateOrigin::Seed)],
        mutations: per_origin[origin_index(CandidateOrigin::TaintMutation)],
        symbolic_cases: per_origin[origin_index(CandidateOrigin::Symbolic)],
        dictionary_injections: per_origin[origin_index(CandidateOrigin::Dictionary)],
        generated_cases: per_origin[origin_index(CandidateOrigin::Generated)],
        other_cases: per_origin[origin_index(CandidateOrigin::Other)],
        inputs_considered: iterations.len(),
        remaining_queue: queue.len(),
        avg_execution_time,
    };

    PreviewSummary {
        iterations,
        stats,
        notes: vec!["Simulation executed without launching external binaries.".to_owned()],
        final_coverage: seen_coverage.len(),
        corpus_size: fuzzer.corpus_stats().total_inputs,
        target_path,
    }
}

fn origin_index(origin: CandidateOrigin) -> usize {
    match origin {
        CandidateOrigin::Seed => 0,
        CandidateOrigin::TaintMutation => 1,
        CandidateOrigin::Symbolic => 2,
        CandidateOrigin::Dictionary => 3,
        CandidateOrigin::Generated => 4,
        CandidateOrigin::Other => 5,
    }
}
