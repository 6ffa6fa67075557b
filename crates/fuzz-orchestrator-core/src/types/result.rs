use serde::{Deserialize, Serialize};

use super::request::AnalysisKind;
use crate::config::OptionMap;

/// Metrics attached to every [`AnalysisResult`] (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    pub duration_seconds: f64,
    pub success: bool,
    pub analysis_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rss_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
}

/// Outcome of a single [`crate::Orchestrator::execute`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub request_id: String,
    pub analysis_type: AnalysisKind,
    pub success: bool,
    pub results: OptionMap,
    pub errors: Vec<String>,
    pub metrics: AnalysisMetrics,
    pub notes: Vec<String>,
}
