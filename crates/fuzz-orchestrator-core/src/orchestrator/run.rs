//! Bounded, stateful hybrid run loop: pops the prepared queue, spawns new
//! candidates on coverage gain in a fixed taint → dictionary → symbolic
//! order, and falls back to the fuzzer's own generator when the queue runs
//! dry (spec §4.1 step 8 "the live run", SPEC_FULL §3
//! `_run_hybrid_execution`).

use ahash::AHashSet;

use super::candidates::CandidateQueue;
use super::report::{round6, CrashInfoPreview, IterationSummary, RunStats, RunSummary, SpawnedCandidate};
use super::Components;
use crate::config::OptionMap;
use crate::fuzzer::Fuzzer;
use crate::types::{Candidate, CandidateOrigin};

const MIN_ITERATIONS: u32 = 1;
const DEFAULT_ITERATION_CAP: u32 = 8;
const SPAWN_TAINT_BYTES: usize = 8;
const PREVIEW_BYTES: usize = 16;

fn hex_preview(payload: &[u8]) -> String {
    payload.iter().take(PREVIEW_BYTES).map(|b| format!("{b:02x}")).collect()
}

/// Execute the live, bounded hybrid loop.
///
/// `run_iterations` (when positive) overrides the derived default cap
/// outright, matching `request.options.get("run_iterations", default_iterations)`
/// in the original; a value `<= 0` falls back to
/// `max(1, min(8, max_iterations), len(queue))`.
pub fn run_hybrid<F: Fuzzer>(
    fuzzer: &mut F,
    components: &mut Components,
    mut queue: CandidateQueue,
    coverage_hint: &AHashSet<u64>,
    max_iterations: u32,
    run_iterations: i64,
    target_path: Option<String>,
) -> RunSummary {
    let initial_candidates = queue.len();
    let default_iterations = max_iterations.clamp(MIN_ITERATIONS, DEFAULT_ITERATION_CAP).max(initial_candidates as u32);
    let iterations_requested = if run_iterations > 0 {
        run_iterations as u32
    } else {
        default_iterations
    };
    let initial_counts = queue.counts.clone();

    let mut seen_coverage = coverage_hint.clone();
    seen_coverage.extend(fuzzer.coverage_set());
    let coverage_before = seen_coverage.len();

    let mut iterations = Vec::new();
    let mut per_origin = [0u32; 6];
    let mut exec_times = Vec::new();
    let mut crashes = 0usize;
    let mut notes = Vec::new();
    let mut completed = 0u32;

    for i in 0..iterations_requested {
        let candidate = match queue.pop_front() {
            Some(c) => c,
            None => match fuzzer.generate_input() {
                Some(payload) => Candidate::new(payload, CandidateOrigin::Generated),
                None => {
                    notes.push("Queue exhausted; no fallback input available.".to_owned());
                    break;
                }
            },
        };

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

        let mut spawned = Vec::new();
        if coverage_gain > 0 {
            tracing::debug!(iteration = i, coverage_gain, "new coverage, spawning follow-up candidates");
            spawn_taint_mutation(components, &candidate.payload, &outcome.coverage, &mut queue, &mut spawned);
            spawn_dictionary_injection(components, &candidate.payload, &mut queue, &mut spawned);
            spawn_symbolic_followup(components, &seen_coverage, &mut queue, &mut spawned);
        }

        iterations.push(IterationSummary {
            iteration: Some(i),
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
            spawned,
        });
        completed += 1;
    }

    let avg_execution_time = if exec_times.is_empty() {
        0.0
    } else {
        round6(exec_times.iter().sum::<f64>() / exec_times.len() as f64)
    };

    let stats = RunStats {
        iterations_requested,
        iterations_completed: completed,
        crashes,
        new_coverage: seen_coverage.len().saturating_sub(coverage_before),
        seed_cases: per_origin[origin_index(CandidateOrigin::Seed)],
        mutations: per_origin[origin_index(CandidateOrigin::TaintMutation)],
        symbolic_cases: per_origin[origin_index(CandidateOrigin::Symbolic)],
        dictionary_injections: per_origin[origin_index(CandidateOrigin::Dictionary)],
        generated_cases: per_origin[origin_index(CandidateOrigin::Generated)],
        other_cases: per_origin[origin_index(CandidateOrigin::Other)],
        initial_candidates,
        queue_remaining: queue.len(),
        coverage_before,
        coverage_after: seen_coverage.len(),
        avg_execution_time,
        new_cases_added: queue.counts.subtract_added(&initial_counts),
    };

    RunSummary {
        iterations,
        stats,
        notes,
        final_coverage: seen_coverage.len(),
        corpus_size: fuzzer.corpus_stats().total_inputs,
        target_path,
    }
}

fn spawn_taint_mutation(
    components: &mut Components,
    payload: &[u8],
    coverage: &AHashSet<u64>,
    queue: &mut CandidateQueue,
    spawned: &mut Vec<SpawnedCandidate>,
) {
    let info = components.taint.track_execution(payload, coverage);
    let offsets: ahash::AHashSet<usize> =
        info.tainted_bytes_sorted().into_iter().take(SPAWN_TAINT_BYTES).collect();
    if offsets.is_empty() {
        return;
    }
    let mutated = components.taint.mutate_critical_bytes(payload, &offsets);
    if mutated == payload {
        return;
    }
    let mut detail = OptionMap::new();
    detail.insert("critical_offsets".into(), serde_json::json!(offsets.len()));
    if queue.enqueue(Candidate::new(mutated, CandidateOrigin::TaintMutation).with_detail(detail.clone())) {
        spawned.push(SpawnedCandidate { origin: CandidateOrigin::TaintMutation, detail });
    }
}

fn spawn_dictionary_injection(
    components: &mut Components,
    payload: &[u8],
    queue: &mut CandidateQueue,
    spawned: &mut Vec<SpawnedCandidate>,
) {
    let injected = components.dictionary.inject_tokens(payload);
    if injected == payload {
        return;
    }
    if queue.enqueue(Candidate::new(injected, CandidateOrigin::Dictionary)) {
        spawned.push(SpawnedCandidate { origin: CandidateOrigin::Dictionary, detail: OptionMap::new() });
    }
}

fn spawn_symbolic_followup(
    components: &mut Components,
    coverage: &AHashSet<u64>,
    queue: &mut CandidateQueue,
    spawned: &mut Vec<SpawnedCandidate>,
) {
    for branch in components.symbolic.get_interesting_branches(coverage) {
        if let Some(solution) = components.symbolic.generate_input_for_path(&[branch]) {
            let mut detail = OptionMap::new();
            detail.insert("target_branch".into(), serde_json::json!(branch));
            if queue.enqueue(Candidate::new(solution, CandidateOrigin::Symbolic).with_detail(detail.clone())) {
                spawned.push(SpawnedCandidate { origin: CandidateOrigin::Symbolic, detail });
            }
            break;
        }
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
