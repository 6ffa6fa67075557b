//! Candidate preparation: turn a request's seeds, taint mutations, symbolic
//! solutions, and dictionary tokens into a deduplicated execution queue
//! (spec §4.1 steps 4-7).

use std::collections::VecDeque;

use ahash::AHashSet;

use super::report::{CandidateCounts, SymbolicTargetSummary};
use super::Components;
use crate::config::OptionMap;
use crate::types::{Candidate, CandidateOrigin};

const MAX_SEEDS: usize = 8;
const MAX_TAINT_SEEDS: usize = 4;
const MAX_CRITICAL_OFFSETS: usize = 16;
const MAX_SYMBOLIC_TARGETS: usize = 3;
const MAX_DICTIONARY_SOURCES: usize = 2;

/// A FIFO of pending candidates, deduplicated by payload bytes.
///
/// Mirrors the original's `_enqueue_input`: the same bytes proposed twice
/// (e.g. a taint mutation that happens to reproduce a seed) are only
/// executed once.
#[derive(Debug, Default, Clone)]
pub struct CandidateQueue {
    items: VecDeque<Candidate>,
    seen: AHashSet<Vec<u8>>,
    pub counts: CandidateCounts,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `candidate`, returning `false` (and dropping it) when its
    /// payload was already seen.
    pub fn enqueue(&mut self, candidate: Candidate) -> bool {
        if !self.seen.insert(candidate.payload.clone()) {
            return false;
        }
        self.counts.bump(candidate.origin);
        self.items.push_back(candidate);
        true
    }

    pub fn pop_front(&mut self) -> Option<Candidate> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.items.iter()
    }
}

/// Targets worth symbolically solving: the request's explicit
/// `target_branches`, falling back to whatever the bridge already finds
/// interesting against the current coverage hint (spec §4.2).
pub fn collect_symbolic_targets(
    components: &mut Components,
    requested: &[u64],
    coverage: &AHashSet<u64>,
) -> Vec<SymbolicTargetSummary> {
    let branches: Vec<u64> = if requested.is_empty() {
        components.symbolic.get_interesting_branches(coverage)
    } else {
        requested.to_vec()
    };

    branches
        .into_iter()
        .take(MAX_SYMBOLIC_TARGETS * 2)
        .map(|branch| {
            let path = components.symbolic.analyze_branch(branch, &[]);
            SymbolicTargetSummary {
                branch,
                constraints: path.constraints.iter().map(|c| c.expression.clone()).collect(),
                feasible: path.is_feasible(),
            }
        })
        .collect()
}

/// Build the deduplicated candidate queue for a hybrid run (spec §4.1 steps
/// 4-7, SPEC_FULL §3).
pub fn prepare_candidates(
    components: &mut Components,
    seed_inputs: &[Vec<u8>],
    coverage: &AHashSet<u64>,
    symbolic_targets: &[SymbolicTargetSummary],
) -> CandidateQueue {
    let mut queue = CandidateQueue::new();

    for seed in seed_inputs.iter().take(MAX_SEEDS) {
        queue.enqueue(Candidate::new(seed.clone(), CandidateOrigin::Seed));
    }

    for seed in seed_inputs.iter().take(MAX_TAINT_SEEDS) {
        let info = components.taint.track_execution(seed, coverage);
        let offsets: AHashSet<usize> = info.tainted_bytes_sorted().into_iter().take(MAX_CRITICAL_OFFSETS).collect();
        if offsets.is_empty() {
            continue;
        }
        let mutated = components.taint.mutate_critical_bytes(seed, &offsets);
        let mut detail = OptionMap::new();
        detail.insert("source_seed_len".into(), serde_json::json!(seed.len()));
        detail.insert("critical_offsets".into(), serde_json::json!(offsets.len()));
        queue.enqueue(Candidate::new(mutated, CandidateOrigin::TaintMutation).with_detail(detail));
    }

    for target in symbolic_targets.iter().filter(|t| t.feasible).take(MAX_SYMBOLIC_TARGETS) {
        if let Some(solution) = components.symbolic.generate_input_for_path(&[target.branch]) {
            let mut detail = OptionMap::new();
            detail.insert("target_branch".into(), serde_json::json!(target.branch));
            queue.enqueue(Candidate::new(solution, CandidateOrigin::Symbolic).with_detail(detail));
        }
    }

    let dictionary_sources: Vec<Vec<u8>> = queue
        .iter()
        .filter(|c| matches!(c.origin, CandidateOrigin::Seed | CandidateOrigin::TaintMutation))
        .take(MAX_DICTIONARY_SOURCES)
        .map(|c| c.payload.clone())
        .collect();
    for source in dictionary_sources {
        let injected = components.dictionary.inject_tokens(&source);
        queue.enqueue(Candidate::new(injected, CandidateOrigin::Dictionary));
    }

    queue
}
