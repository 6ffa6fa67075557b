use derive_new::new as New;
use serde::{Deserialize, Serialize};

use crate::config::OptionMap;

/// Analysis kind requested of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Static,
    Dynamic,
    Fuzzing,
    Vm,
    Hybrid,
}

impl AnalysisKind {
    /// Parse a free-form kind string, defaulting to [`AnalysisKind::Static`]
    /// when the value is unrecognized (the original treats an unknown
    /// `analysis_type` as the conservative, side-effect-free branch).
    pub fn from_value(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "dynamic" => Self::Dynamic,
            "fuzzing" => Self::Fuzzing,
            "vm" => Self::Vm,
            "hybrid" => Self::Hybrid,
            _ => Self::Static,
        }
    }
}

/// A single call into the orchestrator.
///
/// Immutable once constructed; built per external call (spec §3).
#[derive(Debug, Clone, New)]
pub struct AnalysisRequest {
    pub id: String,
    #[new(default)]
    pub binary_path: Option<String>,
    #[new(default)]
    pub binary_data: Option<Vec<u8>>,
    pub kind: AnalysisKind,
    #[new(default)]
    pub seed_inputs: Vec<Vec<u8>>,
    #[new(default)]
    pub options: OptionMap,
    #[new(default)]
    pub crash_info: Option<OptionMap>,
}

impl AnalysisRequest {
    /// Select the representative input for analysis bootstrap (spec §4.1
    /// step 2): first seed, else `options.sample_input`, else the first 256
    /// bytes of `binary_data`, else empty.
    pub fn pick_analysis_input(&self) -> Vec<u8> {
        if let Some(first) = self.seed_inputs.first() {
            return first.clone();
        }
        if let Some(sample) = self.options.get("sample_input") {
            if let Some(s) = sample.as_str() {
                return s.as_bytes().to_vec();
            }
            if let Some(arr) = sample.as_array() {
                return arr
                    .iter()
                    .filter_map(|v| v.as_u64())
                    .map(|v| v as u8)
                    .collect();
            }
        }
        if let Some(data) = &self.binary_data {
            return data.iter().copied().take(256).collect();
        }
        Vec::new()
    }

    /// Normalize `options.coverage` into a set of branch ids, discarding
    /// anything that isn't representable as an integer (spec §4.1 step 3).
    pub fn coverage_hint(&self) -> ahash::AHashSet<u64> {
        let mut result = ahash::AHashSet::default();
        let Some(coverage) = self.options.get("coverage") else {
            return result;
        };
        match coverage {
            serde_json::Value::Array(items) => {
                for item in items {
                    if let Some(n) = item.as_u64() {
                        result.insert(n);
                    }
                }
            }
            serde_json::Value::Number(n) => {
                if let Some(n) = n.as_u64() {
                    result.insert(n);
                }
            }
            _ => {}
        }
        result
    }

    /// Read `options.target_branches`, discarding non-integer entries
    /// (spec §7: "invalid request options ... silently ignored").
    pub fn target_branches(&self) -> Vec<u64> {
        match self.options.get("target_branches") {
            Some(serde_json::Value::Array(items)) => {
                items.iter().filter_map(|v| v.as_u64()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn option_bool(&self, key: &str) -> bool {
        self.options
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn option_i64(&self, key: &str) -> Option<i64> {
        self.options.get(key).and_then(|v| v.as_i64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_seed_before_sample_input() {
        let mut req = AnalysisRequest::new("r1".into(), AnalysisKind::Hybrid);
        req.seed_inputs.push(b"seed".to_vec());
        req.options
            .insert("sample_input".into(), serde_json::json!("ignored"));
        assert_eq!(req.pick_analysis_input(), b"seed".to_vec());
    }

    #[test]
    fn falls_back_to_binary_data_prefix() {
        let mut req = AnalysisRequest::new("r1".into(), AnalysisKind::Hybrid);
        req.binary_data = Some(vec![1; 512]);
        let picked = req.pick_analysis_input();
        assert_eq!(picked.len(), 256);
    }

    #[test]
    fn target_branches_discards_non_integers() {
        let mut req = AnalysisRequest::new("r1".into(), AnalysisKind::Hybrid);
        req.options.insert(
            "target_branches".into(),
            serde_json::json!([0x1000, "nope", 0x2000]),
        );
        assert_eq!(req.target_branches(), vec![0x1000, 0x2000]);
    }
}
