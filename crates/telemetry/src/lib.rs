//! Run tracing for weft agents.
//!
//! Records one trace per agent run, with spans for every node execution,
//! LLM request and tool call. Install [`TracingFeature`] into an agent to
//! fill a [`TelemetryEngine`]; query the engine for traces and summaries.

pub mod engine;
pub mod feature;
pub mod model;

pub use engine::TelemetryEngine;
pub use feature::{TracingConfig, TracingFeature};
pub use model::{Span, SpanKind, TelemetrySummary, Trace};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown trace id: {0}")]
    UnknownTrace(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
