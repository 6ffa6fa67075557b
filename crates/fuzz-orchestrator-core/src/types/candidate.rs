use serde::{Deserialize, Serialize};

use crate::config::OptionMap;

/// Where a [`Candidate`] payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    Seed,
    TaintMutation,
    Symbolic,
    Dictionary,
    Generated,
    Other,
}

impl CandidateOrigin {
    /// Bucket name used by the aggregate counters in stage/iteration
    /// reports (spec §4.1 "counts per origin are recorded").
    pub fn counter_key(self) -> &'static str {
        match self {
            Self::Seed => "seed_cases",
            Self::TaintMutation => "mutations",
            Self::Symbolic => "symbolic_cases",
            Self::Dictionary => "dictionary_injections",
            Self::Generated => "generated_cases",
            Self::Other => "other_cases",
        }
    }
}

/// A single payload awaiting execution, tagged with its origin.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub payload: Vec<u8>,
    pub origin: CandidateOrigin,
    pub detail: OptionMap,
}

impl Candidate {
    pub fn new(payload: Vec<u8>, origin: CandidateOrigin) -> Self {
        Self {
            payload,
            origin,
            detail: OptionMap::new(),
        }
    }

    pub fn with_detail(mut self, detail: OptionMap) -> Self {
        self.detail = detail;
        self
    }
}
