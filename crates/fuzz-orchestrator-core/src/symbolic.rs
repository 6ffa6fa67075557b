//! Deterministic, bounded approximation of a symbolic executor (spec §4.2).
//!
//! This is explicitly *not* an SMT solver: constraints are derived from a
//! branch address fingerprint and solved by direct byte assignment. See
//! spec §1 Non-goals.

use std::collections::HashMap;
use std::rc::Rc;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// Upper bound on any buffer the bridge allocates or indexes into.
///
/// Deliberately independent from [`crate::config::FuzzingConfig::max_input_size`]
/// (spec DESIGN NOTES: "treat them as independent constants unless the
/// caller reconciles them").
pub const MAX_INPUT_SIZE: usize = 64;

const FILLER_BYTE: u8 = 0x41;

/// Kind of byte-level constraint a [`SymbolicConstraint`] expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Eq,
    Mask,
    Range,
}

/// A single, human-readable byte-level constraint derived from a branch
/// fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolicConstraint {
    pub expression: String,
    pub variables: AHashSet<String>,
    pub relation: Relation,
    pub offset: Option<usize>,
    pub value: Option<u8>,
    pub mask: Option<u8>,
    pub range: Option<(u8, u8)>,
    pub source_branch: Option<u64>,
    pub solvable: bool,
}

/// A synthetic path through the target, assembled from heuristic
/// constraints and cached per branch address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolicPath {
    pub target_branch: Option<u64>,
    pub constraints: Vec<SymbolicConstraint>,
    pub blocks: Vec<u64>,
    pub input_bytes: HashMap<usize, u8>,
    pub priority: f64,
}

impl SymbolicPath {
    fn new(target_branch: u64) -> Self {
        Self {
            target_branch: Some(target_branch),
            constraints: Vec::new(),
            blocks: Vec::new(),
            input_bytes: HashMap::new(),
            priority: 0.0,
        }
    }

    fn add_constraint(&mut self, constraint: SymbolicConstraint) {
        if let (Some(offset), Some(value)) = (constraint.offset, constraint.value) {
            self.input_bytes.entry(offset).or_insert(value);
        }
        self.constraints.push(constraint);
    }

    fn add_block(&mut self, block: u64) {
        if !self.blocks.contains(&block) {
            self.blocks.push(block);
        }
    }

    /// A path is feasible when every constraint along it is still
    /// marked solvable (spec §3 invariant).
    pub fn is_feasible(&self) -> bool {
        self.constraints.iter().all(|c| c.solvable)
    }

    fn covers(&self, target_blocks: &[u64]) -> bool {
        target_blocks.iter().all(|b| self.blocks.contains(b))
    }
}

/// Bridge between a caller-supplied branch fingerprint and a solved, concrete
/// input.
#[derive(Debug)]
pub struct SymbolicBridge {
    explored_paths: Vec<Rc<SymbolicPath>>,
    pending_constraints: Vec<SymbolicConstraint>,
    branch_cache: HashMap<u64, Rc<SymbolicPath>>,
}

impl Default for SymbolicBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolicBridge {
    pub fn new() -> Self {
        Self {
            explored_paths: Vec::new(),
            pending_constraints: Vec::new(),
            branch_cache: HashMap::new(),
        }
    }

    /// Analyze a branch, returning a cached path when one already exists for
    /// this branch address (spec §3 invariant: "exactly one path per
    /// branch").
    pub fn analyze_branch(&mut self, branch_address: u64, input: &[u8]) -> Rc<SymbolicPath> {
        if let Some(cached) = self.branch_cache.get(&branch_address) {
            return Rc::clone(cached);
        }

        let mut path = SymbolicPath::new(branch_address);
        path.add_block(branch_address.saturating_sub(4));
        path.add_block(branch_address.saturating_sub(2));
        path.add_block(branch_address);

        for constraint in derive_constraints(branch_address, input) {
            self.register_pending(constraint.clone());
            path.add_constraint(constraint);
        }
        path.priority = 1.0 + path.constraints.len() as f64 * 0.25;

        let path = Rc::new(path);
        self.branch_cache.insert(branch_address, Rc::clone(&path));
        self.explored_paths.push(Rc::clone(&path));
        path
    }

    /// Solve a constraint list into concrete bytes, or `None` if the list is
    /// empty or any constraint is already infeasible (spec §4.2).
    pub fn solve_constraints(&self, constraints: &mut [SymbolicConstraint]) -> Option<Vec<u8>> {
        if constraints.is_empty() {
            return None;
        }
        let max_offset = constraints.iter().filter_map(|c| c.offset).max().unwrap_or(0);
        let size = MAX_INPUT_SIZE.min((max_offset + 1).max(1));
        let mut model = vec![FILLER_BYTE; size];

        for constraint in constraints.iter_mut() {
            if !constraint.solvable {
                return None;
            }
            let Some(offset) = constraint.offset else {
                continue;
            };
            if offset >= MAX_INPUT_SIZE || offset >= model.len() {
                continue;
            }

            let current = model[offset];
            match constraint.relation {
                Relation::Eq => {
                    let Some(value) = constraint.value else {
                        continue;
                    };
                    if current != FILLER_BYTE && current != value {
                        constraint.solvable = false;
                        return None;
                    }
                    model[offset] = value;
                }
                Relation::Mask => {
                    let (Some(mask), Some(value)) = (constraint.mask, constraint.value) else {
                        continue;
                    };
                    model[offset] = (current & !mask) | (value & mask);
                }
                Relation::Range => {
                    let Some((low, high)) = constraint.range else {
                        continue;
                    };
                    if !(low..=high).contains(&current) {
                        model[offset] = low;
                    }
                }
            }
        }

        Some(model)
    }

    /// Generate an input that reaches all of `target_blocks`, searching
    /// cached paths first, then analyzing each target block in turn (spec
    /// §4.2).
    pub fn generate_input_for_path(&mut self, target_blocks: &[u64]) -> Option<Vec<u8>> {
        let mut path = self
            .explored_paths
            .iter()
            .find(|p| p.covers(target_blocks))
            .cloned();

        if path.is_none() {
            for &block in target_blocks {
                let candidate = self.analyze_branch(block, &[]);
                if candidate.covers(target_blocks) {
                    path = Some(candidate);
                    break;
                }
            }
        }

        let path = path?;
        if !path.is_feasible() {
            return None;
        }

        let mut constraints = path.constraints.clone();
        let solution = self.solve_constraints(&mut constraints)?;

        // Record which concrete byte each constrained offset resolved to, on
        // the live cached path.
        if let Some(branch) = path.target_branch {
            if let Some(cached) = self.branch_cache.get(&branch) {
                let mut updated = (**cached).clone();
                for constraint in &constraints {
                    if let Some(offset) = constraint.offset {
                        if offset < solution.len() {
                            updated.input_bytes.insert(offset, solution[offset]);
                        }
                    }
                }
                let updated = Rc::new(updated);
                self.branch_cache.insert(branch, Rc::clone(&updated));
                if let Some(slot) = self
                    .explored_paths
                    .iter_mut()
                    .find(|p| p.target_branch == Some(branch))
                {
                    *slot = updated;
                }
            }
        }

        Some(solution)
    }

    /// Branches from explored paths (falling back to pending constraints)
    /// that are not yet in `coverage`, sorted and deduplicated (spec §4.2,
    /// §8).
    pub fn get_interesting_branches(&self, coverage: &AHashSet<u64>) -> Vec<u64> {
        let mut interesting: Vec<u64> = self
            .explored_paths
            .iter()
            .filter_map(|p| p.target_branch)
            .filter(|b| !coverage.contains(b))
            .collect();

        if interesting.is_empty() {
            interesting = self
                .pending_constraints
                .iter()
                .filter_map(|c| c.source_branch)
                .filter(|b| !coverage.contains(b))
                .collect();
        }

        interesting.sort_unstable();
        interesting.dedup();
        interesting
    }

    /// Mutate `input` toward `branch`: overlay a synthesized input at the
    /// head when shorter, else replace wholesale, else XOR-flip the first
    /// constrained offset (spec §4.2).
    pub fn mutate_for_branch(&mut self, input: &[u8], branch: u64) -> Vec<u8> {
        let current_path = self.analyze_branch(branch, input);

        if let Some(generated) = self.generate_input_for_path(&[branch]) {
            if generated.len() < input.len() {
                let mut padded = input.to_vec();
                padded[..generated.len()].copy_from_slice(&generated);
                return padded;
            }
            return generated;
        }

        let mut mutated = input.to_vec();
        if let Some(constraint) = current_path.constraints.first() {
            if let Some(offset) = constraint.offset {
                if offset >= mutated.len() {
                    mutated.resize(offset + 1, FILLER_BYTE);
                }
                mutated[offset] ^= 0xFF;
            }
        }
        mutated
    }

    fn register_pending(&mut self, constraint: SymbolicConstraint) {
        let exists = self.pending_constraints.iter().any(|c| {
            c.expression == constraint.expression && c.source_branch == constraint.source_branch
        });
        if !exists {
            self.pending_constraints.push(constraint);
        }
    }
}

/// Derive the three synthetic constraints for a branch fingerprint (spec
/// §4.2 `analyze_branch`).
fn derive_constraints(branch: u64, input: &[u8]) -> Vec<SymbolicConstraint> {
    let bound = MAX_INPUT_SIZE.min(32) as u64;
    let base_offset = (branch % bound) as usize;
    let eq_value = ((branch >> 8) & 0xFF) as u8;

    let eq = SymbolicConstraint {
        expression: format!("byte[{base_offset}] == 0x{eq_value:02x}"),
        variables: [format!("input[{base_offset}]")].into_iter().collect(),
        relation: Relation::Eq,
        offset: Some(base_offset),
        value: Some(eq_value),
        mask: None,
        range: None,
        source_branch: Some(branch),
        solvable: true,
    };
    let _ = input;

    let mask = 0xF0u8;
    let masked_value = eq_value & mask;
    let mask_constraint = SymbolicConstraint {
        expression: format!("byte[{base_offset}] & 0x{mask:02x} == 0x{masked_value:02x}"),
        variables: [format!("input[{base_offset}]")].into_iter().collect(),
        relation: Relation::Mask,
        offset: Some(base_offset),
        value: Some(masked_value),
        mask: Some(mask),
        range: None,
        source_branch: Some(branch),
        solvable: true,
    };

    let secondary_offset = ((branch >> 4) % bound) as usize;
    let low = ((branch >> 12) & 0x7F) as u8;
    let high = low.saturating_add(0x20).min(0xFF);
    let range_constraint = SymbolicConstraint {
        expression: format!("0x{low:02x} <= byte[{secondary_offset}] <= 0x{high:02x}"),
        variables: [format!("input[{secondary_offset}]")].into_iter().collect(),
        relation: Relation::Range,
        offset: Some(secondary_offset),
        value: None,
        mask: None,
        range: Some((low, high)),
        source_branch: Some(branch),
        solvable: true,
    };

    vec![eq, mask_constraint, range_constraint]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_branch_caches_by_identity() {
        let mut bridge = SymbolicBridge::new();
        let first = bridge.analyze_branch(0x1000, b"seed");
        let second = bridge.analyze_branch(0x1000, b"different-seed-entirely");
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn derived_constraints_follow_fingerprint_formula() {
        let constraints = derive_constraints(0x1000, b"");
        assert_eq!(constraints.len(), 3);
        assert_eq!(constraints[0].relation, Relation::Eq);
        assert_eq!(constraints[0].offset, Some(0x1000 % 32));
        assert_eq!(constraints[0].value, Some(((0x1000u64 >> 8) & 0xFF) as u8));
    }

    #[test]
    fn solver_respects_eq_mask_and_range_constraints() {
        let mut bridge = SymbolicBridge::new();
        let path = bridge.analyze_branch(0x4242, b"");
        let mut constraints = path.constraints.clone();
        let solution = bridge.solve_constraints(&mut constraints).expect("solvable");

        for constraint in &constraints {
            let Some(offset) = constraint.offset else { continue };
            if offset >= MAX_INPUT_SIZE {
                continue;
            }
            match constraint.relation {
                Relation::Eq => assert_eq!(solution[offset], constraint.value.unwrap()),
                Relation::Mask => {
                    let mask = constraint.mask.unwrap();
                    assert_eq!(solution[offset] & mask, constraint.value.unwrap() & mask);
                }
                Relation::Range => {
                    let (low, high) = constraint.range.unwrap();
                    assert!(solution[offset] >= low && solution[offset] <= high);
                }
            }
        }
    }

    #[test]
    fn conflicting_eq_constraints_are_infeasible() {
        let mut bridge = SymbolicBridge::new();
        let mut constraints = vec![
            SymbolicConstraint {
                expression: "byte[0] == 0x01".into(),
                variables: Default::default(),
                relation: Relation::Eq,
                offset: Some(0),
                value: Some(1),
                mask: None,
                range: None,
                source_branch: Some(1),
                solvable: true,
            },
            SymbolicConstraint {
                expression: "byte[0] == 0x02".into(),
                variables: Default::default(),
                relation: Relation::Eq,
                offset: Some(0),
                value: Some(2),
                mask: None,
                range: None,
                source_branch: Some(1),
                solvable: true,
            },
        ];
        let result = bridge.solve_constraints(&mut constraints);
        assert!(result.is_none());
        assert!(!constraints[1].solvable);
    }

    #[test]
    fn empty_constraints_solve_to_none() {
        let bridge = SymbolicBridge::new();
        assert!(bridge.solve_constraints(&mut []).is_none());
    }

    #[test]
    fn get_interesting_branches_excludes_covered_and_sorts() {
        let mut bridge = SymbolicBridge::new();
        bridge.analyze_branch(0x2000, b"");
        bridge.analyze_branch(0x1000, b"");
        let coverage: AHashSet<u64> = [0x2000].into_iter().collect();
        assert_eq!(bridge.get_interesting_branches(&coverage), vec![0x1000]);
    }

    #[test]
    fn generate_input_for_path_reuses_cached_path() {
        let mut bridge = SymbolicBridge::new();
        let generated = bridge.generate_input_for_path(&[0x3000]);
        assert!(generated.is_some());
    }
}
