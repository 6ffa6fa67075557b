//! Power scheduling feedback the orchestrator consults each iteration (spec
//! §4.4).

use indexmap::IndexMap;

/// Exponential-average weight applied to execution time on each update.
const EXEC_TIME_ALPHA: f64 = 0.3;
/// Additive score boost when an execution produced new coverage.
const COVERAGE_BOOST: f64 = 1.0;

/// Per-input scheduling state.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub payload: Vec<u8>,
    pub score: f64,
    pub last_exec_time: f64,
    pub last_new_coverage: bool,
}

/// Maintains a per-input exponential score, ranking candidates by how worth
/// re-fuzzing they are.
///
/// Entries are keyed by payload and stored in an [`IndexMap`] so iteration
/// order (and therefore insertion-order tie-breaking in
/// [`PowerScheduler::select_input`]) is stable.
#[derive(Debug, Default)]
pub struct PowerScheduler {
    entries: IndexMap<Vec<u8>, ScheduleEntry>,
}

impl PowerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update (or create) the entry for `payload`.
    pub fn update_score(&mut self, payload: &[u8], found_new_coverage: bool, exec_time: f64) {
        let entry = self
            .entries
            .entry(payload.to_vec())
            .or_insert_with(|| ScheduleEntry {
                payload: payload.to_vec(),
                score: 1.0,
                last_exec_time: exec_time,
                last_new_coverage: found_new_coverage,
            });

        entry.last_exec_time =
            EXEC_TIME_ALPHA * exec_time + (1.0 - EXEC_TIME_ALPHA) * entry.last_exec_time;
        entry.last_new_coverage = found_new_coverage;

        let time_penalty = 1.0 / (1.0 + entry.last_exec_time);
        entry.score = entry.score * 0.5 + time_penalty;
        if found_new_coverage {
            entry.score += COVERAGE_BOOST;
        }
    }

    /// Up to `k` payloads, ranked by descending score.
    pub fn get_top_inputs(&self, k: usize) -> Vec<Vec<u8>> {
        let mut entries: Vec<&ScheduleEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        entries.into_iter().take(k).map(|e| e.payload.clone()).collect()
    }

    /// The highest-scoring choice, ties broken by insertion (queue) order.
    pub fn select_input<'a>(&self, choices: &'a [Vec<u8>]) -> Option<&'a Vec<u8>> {
        let mut best: Option<(&'a Vec<u8>, f64)> = None;
        for choice in choices {
            let score = self.entries.get(choice).map(|e| e.score).unwrap_or(0.0);
            match &best {
                Some((_, best_score)) if score <= *best_score => {}
                _ => best = Some((choice, score)),
            }
        }
        best.map(|(payload, _)| payload)
    }

    /// Counts-only snapshot (spec §4.4 "exposes counts only").
    pub fn tracked_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_score_boosts_new_coverage() {
        let mut scheduler = PowerScheduler::new();
        scheduler.update_score(b"a", false, 0.1);
        let plain_score = scheduler.entries[b"a".as_slice()].score;
        scheduler.update_score(b"b", true, 0.1);
        let boosted_score = scheduler.entries[b"b".as_slice()].score;
        assert!(boosted_score > plain_score);
    }

    #[test]
    fn select_input_breaks_ties_by_insertion_order() {
        let mut scheduler = PowerScheduler::new();
        scheduler.update_score(b"first", false, 0.0);
        scheduler.update_score(b"second", false, 0.0);
        let choices = vec![b"first".to_vec(), b"second".to_vec()];
        assert_eq!(scheduler.select_input(&choices), Some(&b"first".to_vec()));
    }

    #[test]
    fn get_top_inputs_respects_k() {
        let mut scheduler = PowerScheduler::new();
        for i in 0..5u8 {
            scheduler.update_score(&[i], i % 2 == 0, 0.05);
        }
        assert_eq!(scheduler.get_top_inputs(2).len(), 2);
    }
}
