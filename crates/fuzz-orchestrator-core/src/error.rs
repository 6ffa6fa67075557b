//! Error taxonomy for the orchestrator core.
//!
//! Per-iteration and per-stage faults never surface as [`OrchestrationError`];
//! they are folded into the structured reports the orchestrator returns.
//! Only initialization failures that prevent a hybrid run from starting at
//! all reach this type.

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("component {component} is not initialized")]
    ComponentNotReady { component: &'static str },

    #[error("failed to initialize components: {reason}")]
    InitializationFailed { reason: String },

    #[error("external fuzzer reported a fatal error: {0}")]
    Fuzzer(String),
}
