//! Data model shared across the orchestrator core (spec §3).

mod candidate;
mod request;
mod result;

pub use candidate::{Candidate, CandidateOrigin};
pub use request::{AnalysisKind, AnalysisRequest};
pub use result::AnalysisResult;
