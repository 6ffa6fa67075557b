//! Cheap, deterministic stand-in for a dynamic taint tracker (spec §4.3).

use std::collections::HashMap;

use ahash::AHashSet;
use libafl_bolts::rands::{Rand, StdRand};
use serde::{Deserialize, Serialize};

use crate::config::OptionMap;

/// Bound on how many leading input bytes are ever considered tainted (spec
/// §3 invariant).
pub const MAX_TRACKED_BYTES: usize = 256;

/// Result of a single [`TaintMutator::track_execution`] call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaintInfo {
    pub tainted_bytes: AHashSet<usize>,
    pub tainted_addresses: AHashSet<u64>,
    pub influence_branches: AHashSet<u64>,
    pub influence_operations: Vec<String>,
}

impl TaintInfo {
    pub fn tainted_bytes_sorted(&self) -> Vec<usize> {
        let mut v: Vec<_> = self.tainted_bytes.iter().copied().collect();
        v.sort_unstable();
        v
    }
}

/// Confidence attached to a [`CrashTaintAnalysis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// One offset's contribution to a crash, as surfaced by
/// [`TaintMutator::analyze_crash_taint`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaintFlowEntry {
    pub input_offset: Option<usize>,
    pub influenced_branches: Vec<u64>,
    pub operations: Vec<String>,
}

/// Exploitability assessment derived from crash metadata and the influence
/// map (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashTaintAnalysis {
    pub crash_address: u64,
    pub critical_bytes: Vec<usize>,
    pub taint_flow: Vec<TaintFlowEntry>,
    pub exploitable: bool,
    pub confidence: Confidence,
}

/// Per-VM-handler critical-byte profile, supplementing the spec's taint
/// mutator with the original's VM-handler-aware bookkeeping (SPEC_FULL §3).
#[derive(Debug, Clone, Default)]
pub struct VmHandlerProfile {
    critical_bytes: HashMap<u64, AHashSet<usize>>,
}

impl VmHandlerProfile {
    pub fn critical_bytes_for(&self, handler: u64) -> Option<&AHashSet<usize>> {
        self.critical_bytes.get(&handler)
    }
}

/// Maintains an input-offset → branch influence map and produces
/// taint-guided mutations and crash analyses.
#[derive(Debug)]
pub struct TaintMutator {
    influence_map: HashMap<usize, AHashSet<u64>>,
    last_taint_info: Option<TaintInfo>,
    last_crash_analysis: Option<CrashTaintAnalysis>,
    vm_handlers: VmHandlerProfile,
    rand: StdRand,
}

impl TaintMutator {
    pub fn new(seed: u64) -> Self {
        Self {
            influence_map: HashMap::new(),
            last_taint_info: None,
            last_crash_analysis: None,
            vm_handlers: VmHandlerProfile::default(),
            rand: StdRand::with_seed(seed),
        }
    }

    pub fn last_taint_info(&self) -> Option<&TaintInfo> {
        self.last_taint_info.as_ref()
    }

    pub fn last_crash_analysis(&self) -> Option<&CrashTaintAnalysis> {
        self.last_crash_analysis.as_ref()
    }

    /// Track how `input` influences `coverage`, merging the result into the
    /// influence map (spec §4.3).
    pub fn track_execution(&mut self, input: &[u8], coverage: &AHashSet<u64>) -> TaintInfo {
        let limit = input.len().min(MAX_TRACKED_BYTES);
        let tainted_bytes: AHashSet<usize> = (0..limit).collect();

        let branches = coverage.clone();
        let mut sorted_branches: Vec<_> = branches.iter().copied().collect();
        sorted_branches.sort_unstable();
        let operations: Vec<String> = sorted_branches
            .into_iter()
            .take(16)
            .map(|b| format!("branch_hit_{b:x}"))
            .collect();

        let info = TaintInfo {
            tainted_bytes,
            tainted_addresses: AHashSet::default(),
            influence_branches: branches.clone(),
            influence_operations: operations,
        };

        for &offset in &info.tainted_bytes {
            self.influence_map
                .entry(offset)
                .or_default()
                .extend(branches.iter().copied());
        }

        self.last_taint_info = Some(info.clone());
        info
    }

    /// Offsets whose influence map entry contains `target_block` (spec
    /// §4.3).
    pub fn identify_critical_bytes(&self, target_block: u64) -> AHashSet<usize> {
        self.influence_map
            .iter()
            .filter(|(_, blocks)| blocks.contains(&target_block))
            .map(|(&offset, _)| offset)
            .collect()
    }

    /// Replace each offset in `offsets` (that is in range) with a random
    /// byte, using the mutator's own seeded RNG for determinism in tests
    /// (spec §4.3, DESIGN NOTES "inject a seedable RNG per component").
    pub fn mutate_critical_bytes(&mut self, input: &[u8], offsets: &AHashSet<usize>) -> Vec<u8> {
        let mut result = input.to_vec();
        for &offset in offsets {
            if offset < result.len() {
                result[offset] = self.rand.below_or_zero(256) as u8;
            }
        }
        result
    }

    /// Infer exploitability and confidence from crash metadata (spec §4.3).
    pub fn analyze_crash_taint(
        &mut self,
        crash_info: &OptionMap,
        input: &[u8],
    ) -> CrashTaintAnalysis {
        let crash_address = crash_info
            .get("address")
            .or_else(|| crash_info.get("crash_address"))
            .or_else(|| crash_info.get("fault_address"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let coverage_set: AHashSet<u64> = crash_info
            .get("coverage")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_u64()).collect())
            .unwrap_or_default();

        let taint_info = self.track_execution(input, &coverage_set);

        let mut critical_bytes: AHashSet<usize> = AHashSet::default();
        if let Some(offsets) = crash_info.get("tainted_offsets").and_then(|v| v.as_array()) {
            critical_bytes.extend(offsets.iter().filter_map(|v| v.as_u64()).map(|v| v as usize));
        }
        if let Some(offset) = crash_info.get("faulting_offset").and_then(|v| v.as_u64()) {
            critical_bytes.insert(offset as usize);
        }
        if crash_address != 0 && !coverage_set.is_empty() {
            for &block in &coverage_set {
                critical_bytes.extend(self.identify_critical_bytes(block));
            }
        }
        if critical_bytes.is_empty() && !taint_info.tainted_bytes.is_empty() {
            critical_bytes.extend(taint_info.tainted_bytes_sorted().into_iter().take(8));
        }

        let mut sorted_critical: Vec<usize> = critical_bytes.iter().copied().collect();
        sorted_critical.sort_unstable();

        let mut taint_flow: Vec<TaintFlowEntry> = sorted_critical
            .iter()
            .take(16)
            .map(|&offset| {
                let mut influenced: Vec<u64> = self
                    .influence_map
                    .get(&offset)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                influenced.sort_unstable();
                TaintFlowEntry {
                    input_offset: Some(offset),
                    influenced_branches: influenced,
                    operations: taint_info.influence_operations.clone(),
                }
            })
            .collect();
        if taint_flow.is_empty() && !taint_info.influence_branches.is_empty() {
            let mut influenced: Vec<u64> = taint_info.influence_branches.iter().copied().collect();
            influenced.sort_unstable();
            taint_flow.push(TaintFlowEntry {
                input_offset: None,
                influenced_branches: influenced,
                operations: taint_info.influence_operations.clone(),
            });
        }

        let crash_type = crash_info
            .get("type")
            .or_else(|| crash_info.get("crash_type"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let mut exploitable = crash_info
            .get("write_operation")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !exploitable {
            if ["overflow", "heap", "use-after", "stack"]
                .iter()
                .any(|kw| crash_type.contains(kw))
            {
                exploitable = true;
            } else if crash_type.contains("access") || crash_type.contains("segfault") {
                exploitable = crash_address > 0x10000;
            } else if crash_type.contains("division") || crash_type.contains("assert") {
                exploitable = false;
            }
        }
        if let Some(explicit) = crash_info.get("exploitable").and_then(|v| v.as_bool()) {
            exploitable = explicit;
        }

        let mut confidence = Confidence::Low;
        if !coverage_set.is_empty() && !sorted_critical.is_empty() {
            confidence = Confidence::Medium;
        }
        if exploitable {
            confidence = if sorted_critical.is_empty() {
                Confidence::Medium
            } else {
                Confidence::High
            };
        }

        let analysis = CrashTaintAnalysis {
            crash_address,
            critical_bytes: sorted_critical,
            taint_flow,
            exploitable,
            confidence,
        };
        self.last_crash_analysis = Some(analysis.clone());
        analysis
    }

    /// Keep only bytes whose offset is tainted by a fresh tracking pass; if
    /// that would shrink the input to nothing, return it unchanged (spec
    /// §4.3, DESIGN NOTES open question on zero-length shrink).
    pub fn minimize_input(&mut self, input: &[u8]) -> Vec<u8> {
        let taint_info = self.track_execution(input, &AHashSet::default());
        let result: Vec<u8> = input
            .iter()
            .enumerate()
            .filter(|(i, _)| taint_info.tainted_bytes.contains(i))
            .map(|(_, &b)| b)
            .collect();
        if result.is_empty() {
            input.to_vec()
        } else {
            result
        }
    }

    /// Analyze which input bytes influence a VM handler, caching the result
    /// per handler address (SPEC_FULL §3, ported from the original's
    /// `VMTaintFuzzer.analyze_vm_handler`).
    pub fn analyze_vm_handler(&mut self, handler: u64, input: &[u8]) -> AHashSet<usize> {
        let coverage: AHashSet<u64> = [handler].into_iter().collect();
        let info = self.track_execution(input, &coverage);
        let critical = if info.influence_branches.contains(&handler) {
            info.tainted_bytes
        } else {
            AHashSet::default()
        };
        self.vm_handlers
            .critical_bytes
            .insert(handler, critical.clone());
        critical
    }

    /// Mutate toward exercising a specific VM handler, analyzing it first
    /// when no profile is cached yet.
    pub fn mutate_for_vm_handler(&mut self, input: &[u8], handler: u64) -> Vec<u8> {
        let critical = match self.vm_handlers.critical_bytes_for(handler) {
            Some(bytes) => bytes.clone(),
            None => self.analyze_vm_handler(handler, input),
        };
        if critical.is_empty() {
            input.to_vec()
        } else {
            self.mutate_critical_bytes(input, &critical)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_execution_taints_leading_bytes_up_to_bound() {
        let mut mutator = TaintMutator::new(1);
        let input = vec![0u8; 300];
        let info = mutator.track_execution(&input, &AHashSet::default());
        assert_eq!(info.tainted_bytes.len(), MAX_TRACKED_BYTES);
        assert!(info.tainted_bytes.contains(&0));
        assert!(info.tainted_bytes.contains(&(MAX_TRACKED_BYTES - 1)));
        assert!(!info.tainted_bytes.contains(&MAX_TRACKED_BYTES));
    }

    #[test]
    fn mutate_critical_bytes_only_touches_in_range_offsets() {
        let mut mutator = TaintMutator::new(42);
        let input = vec![0u8; 4];
        let offsets: AHashSet<usize> = [0, 2, 100].into_iter().collect();
        let mutated = mutator.mutate_critical_bytes(&input, &offsets);
        assert_eq!(mutated.len(), 4);
        assert_eq!(mutated[1], 0);
        assert_eq!(mutated[3], 0);
    }

    #[test]
    fn heap_overflow_crash_is_exploitable_with_high_confidence() {
        let mut mutator = TaintMutator::new(7);
        let mut crash_info = OptionMap::new();
        crash_info.insert("type".into(), serde_json::json!("heap_overflow"));
        crash_info.insert("address".into(), serde_json::json!(0x7fff0000u64));
        let analysis = mutator.analyze_crash_taint(&crash_info, b"AAAA");
        assert!(analysis.exploitable);
        assert!(matches!(analysis.confidence, Confidence::High | Confidence::Medium));
        assert!(!analysis.critical_bytes.is_empty());
    }

    #[test]
    fn explicit_exploitable_flag_overrides_heuristics() {
        let mut mutator = TaintMutator::new(7);
        let mut crash_info = OptionMap::new();
        crash_info.insert("type".into(), serde_json::json!("division_by_zero"));
        crash_info.insert("exploitable".into(), serde_json::json!(true));
        let analysis = mutator.analyze_crash_taint(&crash_info, b"AAAA");
        assert!(analysis.exploitable);
    }

    #[test]
    fn minimize_input_returns_original_when_nothing_tainted() {
        let mut mutator = TaintMutator::new(3);
        let result = mutator.minimize_input(b"");
        assert_eq!(result, Vec::<u8>::new());
    }
}
