//! Top-level hybrid planner (spec §4.1, §5).
//!
//! [`Orchestrator`] owns every internal component outright; there is no
//! `Option` scattered through the hot path. The one legitimate lazy-init
//! slot is [`Orchestrator::components`] itself, which is built once on first
//! use from whatever configuration has been set by then. Every method that
//! mutates orchestrator state takes `&mut self`, which is the single-writer
//! guard: the borrow checker rejects concurrent calls the way the original
//! needed an explicit lock for.

mod candidates;
mod report;
mod stages;

mod run;
mod simulate;

use std::collections::VecDeque;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::config::{FuzzingConfig, OptionMap};
use crate::dictionary::Dictionary;
use crate::error::OrchestrationError;
use crate::fuzzer::Fuzzer;
use crate::scheduler::PowerScheduler;
use crate::symbolic::SymbolicBridge;
use crate::taint::TaintMutator;
use crate::types::{AnalysisKind, AnalysisMetrics, AnalysisRequest, AnalysisResult};

use candidates::{collect_symbolic_targets, prepare_candidates};
use report::round6;
use run::run_hybrid;
use simulate::simulate_hybrid;

const HISTORY_CAPACITY: usize = 5;
const DICTIONARY_PREVIEW_TOKENS: usize = 8;

/// Lazily-built internal components, seeded from whatever
/// [`FuzzingConfig::seed`] is in effect the first time they're needed.
#[derive(Debug)]
pub(crate) struct Components {
    pub(crate) fuzzing_config: FuzzingConfig,
    pub(crate) symbolic: SymbolicBridge,
    pub(crate) taint: TaintMutator,
    pub(crate) scheduler: PowerScheduler,
    pub(crate) dictionary: Dictionary,
}

impl Components {
    fn build(config: &OptionMap) -> Self {
        let fuzzing_config = FuzzingConfig::from_options(config);
        let seed = fuzzing_config.seed.unwrap_or(0xC0FFEE);
        Self {
            fuzzing_config,
            symbolic: SymbolicBridge::new(),
            taint: TaintMutator::new(seed),
            scheduler: PowerScheduler::new(),
            dictionary: Dictionary::new(seed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub request_id: String,
    pub analysis_type: AnalysisKind,
    pub success: bool,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub components_ready: bool,
    pub analysis_count: u32,
    pub history: Vec<HistoryRecord>,
    pub uptime_seconds: f64,
    pub created_at_unix: f64,
}

/// Coordinates coverage, taint, symbolic, and dictionary feedback into a
/// single hybrid fuzzing plan per request (spec §4.1).
#[derive(Debug)]
pub struct Orchestrator<F: Fuzzer> {
    fuzzer: F,
    config: OptionMap,
    components: Option<Components>,
    created_at: SystemTime,
    started_at: Instant,
    analysis_count: u32,
    history: VecDeque<HistoryRecord>,
}

impl<F: Fuzzer> Orchestrator<F> {
    pub fn new(fuzzer: F) -> Self {
        Self::with_config(fuzzer, OptionMap::new())
    }

    pub fn with_config(fuzzer: F, config: OptionMap) -> Self {
        Self {
            fuzzer,
            config,
            components: None,
            created_at: SystemTime::now(),
            started_at: Instant::now(),
            analysis_count: 0,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Merge `options` into the orchestrator's live configuration. Takes
    /// effect the next time components are (re-)built, i.e. after
    /// [`Orchestrator::shutdown`] or on first use (spec §4.1 `configure`).
    pub fn configure(&mut self, options: OptionMap) {
        for (key, value) in options {
            self.config.insert(key, value);
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            components_ready: self.components.is_some(),
            analysis_count: self.analysis_count,
            history: self.history.iter().cloned().collect(),
            uptime_seconds: round6(self.started_at.elapsed().as_secs_f64()),
            created_at_unix: self
                .created_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        }
    }

    /// Release the lazily-built components; the next [`Orchestrator::execute`]
    /// rebuilds them from the current configuration (spec §4.1 `shutdown`).
    pub fn shutdown(&mut self) {
        self.components = None;
    }

    /// Build components from the current configuration if they don't exist
    /// yet. Returns `()` rather than a reference so callers can still take
    /// disjoint `&mut self.fuzzer` / `&mut self.components` borrows
    /// afterwards instead of going through a method that would otherwise
    /// borrow all of `self`.
    fn ensure_components_initialized(&mut self) {
        if self.components.is_none() {
            self.components = Some(Components::build(&self.config));
        }
    }

    /// Run a single analysis request end to end.
    ///
    /// Per-iteration and per-stage faults inside the hybrid planner never
    /// reach this boundary as an `Err` — they are folded into `errors` and
    /// `success = false` on the returned [`AnalysisResult`] (spec §7).
    #[tracing::instrument(skip(self, request), fields(request_id = %request.id, kind = ?request.kind))]
    pub fn execute(&mut self, request: AnalysisRequest) -> AnalysisResult {
        let start = Instant::now();
        let mut errors = Vec::new();
        let mut notes = Vec::new();
        let mut results = OptionMap::new();
        let mut success = true;

        let outcome = match request.kind {
            AnalysisKind::Hybrid => self.execute_hybrid(&request),
            _ => self.plan_non_hybrid(&request),
        };

        match outcome {
            Ok((plan, note)) => {
                tracing::debug!(note, "analysis planned");
                results = plan;
                notes.push(note);
                notes.extend(self.next_actions(request.kind));
            }
            Err(err) => {
                tracing::warn!(error = %err, "analysis failed to plan");
                success = false;
                errors.push(err.to_string());
            }
        }

        let duration_seconds = round6(start.elapsed().as_secs_f64());
        let analysis_type = format!("{:?}", request.kind).to_ascii_lowercase();
        self.analysis_count += 1;
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(HistoryRecord {
            request_id: request.id.clone(),
            analysis_type: request.kind,
            success,
            duration_seconds,
        });

        AnalysisResult {
            request_id: request.id,
            analysis_type: request.kind,
            success,
            results,
            errors,
            metrics: AnalysisMetrics {
                duration_seconds,
                success,
                analysis_type,
                rss_mb: None,
                cpu_percent: None,
            },
            notes,
        }
    }

    /// The full hybrid plan: candidate preparation, the five fixed stages,
    /// the five-step pipeline description, and two independent, optional
    /// executions gated on `request.options.simulate_execution` and
    /// `request.options.run_workflow` — either, both, or neither may run
    /// (spec §4.1 steps 9-10, §6, SPEC_FULL §3 `_execute_hybrid`).
    #[tracing::instrument(skip(self, request))]
    fn execute_hybrid(&mut self, request: &AnalysisRequest) -> Result<(OptionMap, String), OrchestrationError> {
        let analysis_input = request.pick_analysis_input();
        let coverage_hint = request.coverage_hint();
        let target_branches = request.target_branches();
        let crash_info = request.crash_info.clone();
        let target_path = request.binary_path.clone();
        let simulate_execution = request.option_bool("simulate_execution");
        let run_workflow = request.option_bool("run_workflow");
        let preview_iterations = request.option_i64("preview_iterations").unwrap_or(0);
        let run_iterations = request.option_i64("run_iterations").unwrap_or(0);

        self.ensure_components_initialized();
        let components = self.components.as_mut().expect("just initialized");
        let fuzzer = &mut self.fuzzer;

        let taint_summary = components.taint.track_execution(&analysis_input, &coverage_hint);
        let crash_analysis = match &crash_info {
            Some(info) => Some(components.taint.analyze_crash_taint(info, &analysis_input)),
            None => None,
        };

        let symbolic_targets = collect_symbolic_targets(components, &target_branches, &coverage_hint);

        let mut seed_inputs = request.seed_inputs.clone();
        if seed_inputs.is_empty() && !analysis_input.is_empty() {
            seed_inputs.push(analysis_input.clone());
        }
        let mut queue = prepare_candidates(components, &seed_inputs, &coverage_hint, &symbolic_targets);

        let stage_reports = stages::build_stages(fuzzer, components, &queue, &symbolic_targets);
        let pipeline_steps = stages::build_pipeline(&queue, &coverage_hint, crash_info.is_some());
        let dictionary_preview = components.dictionary.preview(DICTIONARY_PREVIEW_TOKENS);
        let fuzzing_config = components.fuzzing_config.clone();

        let mut plan = OptionMap::new();
        plan.insert("analysis_input_size".into(), serde_json::json!(analysis_input.len()));
        plan.insert("coverage_hint_size".into(), serde_json::json!(coverage_hint.len()));
        plan.insert("taint_summary".into(), to_value(&report::TaintSummary::from(&taint_summary)));
        if let Some(crash) = &crash_analysis {
            plan.insert("crash_analysis".into(), to_value(crash));
        }
        plan.insert("symbolic_targets".into(), to_value(&symbolic_targets));
        plan.insert("stages".into(), to_value(&stage_reports));
        plan.insert("pipeline".into(), to_value(&pipeline_steps));
        plan.insert("candidate_counts".into(), to_value(&queue.counts));
        plan.insert("dictionary_preview".into(), to_value(&dictionary_preview));
        plan.insert("fuzzing_config".into(), to_value(&fuzzing_config));

        let mut notes = Vec::new();

        if simulate_execution {
            // Each execution branch gets its own copy of the prepared queue,
            // mirroring the original's independent `_prepare_candidate_inputs`
            // call per branch: a preview run never starves the live run.
            let mut sim_queue = queue.clone();
            let summary = simulate_hybrid(
                fuzzer,
                components,
                &mut sim_queue,
                &coverage_hint,
                target_path.clone(),
                preview_iterations,
            );
            plan.insert("execution_preview".into(), to_value(&summary));
            notes.push("Hybrid plan assembled with an execution preview (no live run).".to_owned());
        }

        if run_workflow {
            let max_iterations = fuzzing_config.max_iterations;
            let summary = run_hybrid(
                fuzzer,
                components,
                queue,
                &coverage_hint,
                max_iterations,
                run_iterations,
                target_path,
            );
            plan.insert("run_summary".into(), to_value(&summary));
            notes.push("Hybrid plan executed as a bounded live run.".to_owned());
        }

        if notes.is_empty() {
            notes.push("Hybrid plan assembled without execution.".to_owned());
        }
        Ok((plan, notes.join(" ")))
    }

    /// Small, descriptive plans for the non-hybrid analysis kinds (spec §4.1
    /// "For non-hybrid kinds returns a small descriptive plan", SPEC_FULL §3
    /// `_execute_dynamic`/`_execute_vm`/`_execute_static`).
    fn plan_non_hybrid(&mut self, request: &AnalysisRequest) -> Result<(OptionMap, String), OrchestrationError> {
        let analysis_input = request.pick_analysis_input();
        self.ensure_components_initialized();
        let components = self.components.as_mut().expect("just initialized");
        let fuzzer = &mut self.fuzzer;
        let mut plan = OptionMap::new();

        let note = match request.kind {
            AnalysisKind::Dynamic => {
                let coverage_hint = request.coverage_hint();
                let taint = components.taint.track_execution(&analysis_input, &coverage_hint);
                plan.insert("taint_summary".into(), to_value(&report::TaintSummary::from(&taint)));
                "Dynamic analysis tracked taint against the supplied coverage hint.".to_owned()
            }
            AnalysisKind::Fuzzing => {
                let target_path = request.binary_path.clone();
                let analysis = fuzzer.analyze_target(target_path.as_deref().unwrap_or(""));
                plan.insert("target_details".into(), serde_json::to_value(&analysis.details).unwrap_or_default());
                if let Some(err) = &analysis.error {
                    plan.insert("target_error".into(), serde_json::json!(err));
                }
                "Fuzzing analysis inspected the target without scheduling a hybrid run.".to_owned()
            }
            AnalysisKind::Vm => {
                let handlers = fuzzer.vm_handlers().to_vec();
                let mut profiles = Vec::new();
                for handler in handlers.iter().take(8) {
                    let critical = components.taint.analyze_vm_handler(*handler, &analysis_input);
                    profiles.push(serde_json::json!({
                        "handler": handler,
                        "critical_bytes": critical.len(),
                    }));
                }
                plan.insert("vm_handler_profiles".into(), serde_json::json!(profiles));
                "VM analysis profiled known dispatch handlers.".to_owned()
            }
            AnalysisKind::Static | AnalysisKind::Hybrid => {
                plan.insert("analysis_input_size".into(), serde_json::json!(analysis_input.len()));
                "Static analysis inspected the request without executing the target.".to_owned()
            }
        };

        Ok((plan, note))
    }

    /// Advisory next steps, consistent per analysis kind (spec §4.1 step 8
    /// "next-action hints", SPEC_FULL §3 `_next_actions`).
    fn next_actions(&self, kind: AnalysisKind) -> Vec<String> {
        match kind {
            AnalysisKind::Hybrid => vec![
                "Re-run with the updated coverage hint to check for further gains.".to_owned(),
                "Escalate any high-confidence crash analyses for manual triage.".to_owned(),
                "Expand the seed corpus if new_coverage stayed flat across iterations.".to_owned(),
            ],
            AnalysisKind::Vm => vec![
                "Feed discovered critical bytes back into a hybrid run targeting the same handlers.".to_owned(),
            ],
            _ => vec!["Promote this request to a hybrid run for deeper coverage feedback.".to_owned()],
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzer::test_support::FakeFuzzer;
    use crate::types::AnalysisRequest;

    fn orchestrator() -> Orchestrator<FakeFuzzer> {
        Orchestrator::new(FakeFuzzer::default())
    }

    #[test]
    fn status_reports_not_ready_before_first_execute() {
        let orch = orchestrator();
        assert!(!orch.status().components_ready);
        assert_eq!(orch.status().analysis_count, 0);
    }

    #[test]
    fn execute_hybrid_marks_components_ready_and_records_history() {
        let mut orch = orchestrator();
        let mut request = AnalysisRequest::new("r1".into(), AnalysisKind::Hybrid);
        request.seed_inputs.push(b"AAAA".to_vec());
        request.options.insert("run_workflow".into(), serde_json::json!(true));

        let result = orch.execute(request);
        assert!(result.success);
        assert!(result.results.contains_key("stages"));
        assert!(result.results.contains_key("pipeline"));
        assert!(result.results.contains_key("run_summary"));
        assert!(orch.status().components_ready);
        assert_eq!(orch.status().analysis_count, 1);
        assert_eq!(orch.status().history.len(), 1);
    }

    #[test]
    fn execute_hybrid_preview_mode_never_mutates_corpus_via_run_summary() {
        let mut orch = orchestrator();
        let mut request = AnalysisRequest::new("r2".into(), AnalysisKind::Hybrid);
        request.seed_inputs.push(b"seed-bytes".to_vec());
        request
            .options
            .insert("simulate_execution".into(), serde_json::json!(true));

        let result = orch.execute(request);
        assert!(result.success);
        assert!(result.results.contains_key("execution_preview"));
        assert!(!result.results.contains_key("run_summary"));
    }

    #[test]
    fn iterations_completed_never_exceeds_iterations_requested() {
        let mut orch = orchestrator();
        let mut request = AnalysisRequest::new("r3".into(), AnalysisKind::Hybrid);
        request.seed_inputs.push(b"x".to_vec());
        request
            .options
            .insert("fuzzing".into(), serde_json::json!({ "max_iterations": 2 }));
        request.options.insert("run_workflow".into(), serde_json::json!(true));
        orch.configure(request.options.clone());

        let result = orch.execute(request);
        let run_summary = result.results.get("run_summary").expect("run summary present");
        let requested = run_summary["stats"]["iterations_requested"].as_u64().unwrap();
        let completed = run_summary["stats"]["iterations_completed"].as_u64().unwrap();
        assert!(completed <= requested);
    }

    #[test]
    fn shutdown_forces_component_rebuild_on_next_execute() {
        let mut orch = orchestrator();
        let request = AnalysisRequest::new("r4".into(), AnalysisKind::Static);
        orch.execute(request);
        assert!(orch.status().components_ready);

        orch.shutdown();
        assert!(!orch.status().components_ready);

        let request2 = AnalysisRequest::new("r5".into(), AnalysisKind::Static);
        orch.execute(request2);
        assert!(orch.status().components_ready);
    }

    #[test]
    fn non_hybrid_kinds_produce_small_descriptive_plans() {
        let mut orch = orchestrator();
        let request = AnalysisRequest::new("r6".into(), AnalysisKind::Dynamic);
        let result = orch.execute(request);
        assert!(result.success);
        assert!(result.results.contains_key("taint_summary"));
        assert!(!result.results.contains_key("run_summary"));
    }

    #[test]
    fn history_is_capped_at_five_entries() {
        let mut orch = orchestrator();
        for i in 0..8 {
            orch.execute(AnalysisRequest::new(format!("r{i}"), AnalysisKind::Static));
        }
        assert_eq!(orch.status().history.len(), HISTORY_CAPACITY);
        assert_eq!(orch.status().analysis_count, 8);
    }

    #[test]
    fn hybrid_without_either_switch_executes_nothing() {
        let mut orch = orchestrator();
        let mut request = AnalysisRequest::new("r7".into(), AnalysisKind::Hybrid);
        request.seed_inputs.push(b"AAAA".to_vec());

        let result = orch.execute(request);
        assert!(result.success);
        assert!(!result.results.contains_key("execution_preview"));
        assert!(!result.results.contains_key("run_summary"));
    }

    #[test]
    fn hybrid_with_both_switches_attaches_both_summaries() {
        let mut orch = orchestrator();
        let mut request = AnalysisRequest::new("r8".into(), AnalysisKind::Hybrid);
        request.seed_inputs.push(b"AAAA".to_vec());
        request
            .options
            .insert("simulate_execution".into(), serde_json::json!(true));
        request.options.insert("run_workflow".into(), serde_json::json!(true));
        request.options.insert("preview_iterations".into(), serde_json::json!(2));

        let result = orch.execute(request);
        assert!(result.success);
        let preview = result.results.get("execution_preview").expect("preview present");
        assert!(preview["stats"]["total_cases"].as_u64().unwrap() <= 2);
        assert!(result.results.contains_key("run_summary"));
    }

    #[test]
    fn run_iterations_overrides_derived_default() {
        let mut orch = orchestrator();
        let mut request = AnalysisRequest::new("r9".into(), AnalysisKind::Hybrid);
        request.seed_inputs.push(b"AAAA".to_vec());
        request.options.insert("run_workflow".into(), serde_json::json!(true));
        request.options.insert("run_iterations".into(), serde_json::json!(3));

        let result = orch.execute(request);
        let run_summary = result.results.get("run_summary").expect("run summary present");
        let requested = run_summary["stats"]["iterations_requested"].as_u64().unwrap();
        let completed = run_summary["stats"]["iterations_completed"].as_u64().unwrap();
        assert_eq!(requested, 3);
        assert!((1..=3).contains(&completed));
    }
}
