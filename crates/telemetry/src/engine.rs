//! Thread-safe telemetry engine: collects run traces and serves summaries.

use crate::TelemetryError;
use crate::model::*;
use chrono::{DateTime, Utc};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default number of traces kept before the oldest finished ones are pruned.
pub const DEFAULT_MAX_TRACES: usize = 1_000;

/// Collects traces in memory, most recent last.
pub struct TelemetryEngine {
    traces: RwLock<Vec<Trace>>,
    max_traces: usize,
}

impl TelemetryEngine {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_TRACES)
    }

    /// An engine retaining at most `max_traces` finished traces.
    pub fn with_capacity(max_traces: usize) -> Self {
        Self {
            traces: RwLock::new(Vec::new()),
            max_traces: max_traces.max(1),
        }
    }

    // A panic while holding the lock leaves plain data behind; keep serving it.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Trace>> {
        self.traces.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Trace>> {
        self.traces.write().unwrap_or_else(|e| e.into_inner())
    }

    // ── Trace management ──────────────────────────────────────────────

    /// Start a trace for one agent run and return its id.
    pub fn start_trace(&self, agent_id: impl Into<String>, run_id: impl Into<String>) -> String {
        let trace = Trace::new(agent_id, run_id);
        let id = trace.id.clone();
        let mut traces = self.write();

        if traces.len() >= self.max_traces {
            // Drop the oldest finished traces first; running ones stay.
            let drain = (self.max_traces / 10).max(1);
            let mut removed = 0;
            traces.retain(|t| {
                if removed >= drain || t.ended_at.is_none() {
                    return true;
                }
                removed += 1;
                false
            });
            tracing::debug!(removed, "Pruned finished traces");
        }

        traces.push(trace);
        id
    }

    pub fn end_trace(&self, trace_id: &str, success: bool) -> Result<(), TelemetryError> {
        let mut traces = self.write();
        let trace = traces
            .iter_mut()
            .find(|t| t.id == trace_id)
            .ok_or_else(|| TelemetryError::UnknownTrace(trace_id.to_string()))?;
        trace.end(success);
        Ok(())
    }

    /// Attach a (usually finished) span to a trace.
    pub fn record_span(&self, trace_id: &str, span: Span) -> Result<(), TelemetryError> {
        let mut traces = self.write();
        let trace = traces
            .iter_mut()
            .find(|t| t.id == trace_id)
            .ok_or_else(|| TelemetryError::UnknownTrace(trace_id.to_string()))?;
        trace.add_span(span);
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        self.read().iter().find(|t| t.id == trace_id).cloned()
    }

    pub fn trace_for_run(&self, run_id: &str) -> Option<Trace> {
        self.read().iter().find(|t| t.run_id == run_id).cloned()
    }

    pub fn traces_for_agent(&self, agent_id: &str) -> Vec<Trace> {
        self.read().iter().filter(|t| t.agent_id == agent_id).cloned().collect()
    }

    /// Most recent first.
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        self.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn trace_count(&self) -> usize {
        self.read().len()
    }

    pub fn summary(&self) -> TelemetrySummary {
        let traces = self.read();
        let mut summary = TelemetrySummary {
            traces: traces.len() as u64,
            ..Default::default()
        };

        for trace in traces.iter() {
            if trace.success == Some(false) {
                summary.failed_runs += 1;
            }
            for span in &trace.spans {
                match span.kind {
                    SpanKind::Node => summary.node_executions += 1,
                    SpanKind::LlmCall => summary.llm_calls += 1,
                    SpanKind::ToolCall => {
                        summary.tool_calls += 1;
                        if span.success == Some(false) {
                            summary.failed_tool_calls += 1;
                        }
                    }
                    SpanKind::Run => {}
                }
            }
        }
        summary
    }

    /// Export every retained trace as pretty JSON.
    pub fn export_json(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string_pretty(&*self.read())?)
    }

    /// Drop traces started before `cutoff`; returns how many were removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut traces = self.write();
        let before = traces.len();
        traces.retain(|t| t.started_at >= cutoff);
        before - traces.len()
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn start_and_end_trace() {
        let engine = TelemetryEngine::new();
        let trace_id = engine.start_trace("agent", "run-1");
        assert_eq!(engine.trace_count(), 1);

        engine.end_trace(&trace_id, true).unwrap();
        let trace = engine.get_trace(&trace_id).unwrap();
        assert!(trace.ended_at.is_some());
        assert_eq!(trace.success, Some(true));
        assert_eq!(engine.trace_for_run("run-1").unwrap().id, trace_id);
    }

    #[test]
    fn unknown_trace_is_an_error() {
        let engine = TelemetryEngine::new();
        let err = engine.record_span("missing", Span::new(SpanKind::Node, "n")).unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownTrace(_)));
        assert!(engine.end_trace("missing", false).is_err());
    }

    #[test]
    fn summary_counts_spans() {
        let engine = TelemetryEngine::new();
        let ok = engine.start_trace("agent", "r1");
        engine.record_span(&ok, Span::new(SpanKind::Node, "call_llm")).unwrap();
        engine.record_span(&ok, Span::new(SpanKind::LlmCall, "model")).unwrap();
        let mut failed_tool = Span::new(SpanKind::ToolCall, "echo");
        failed_tool.fail("boom");
        engine.record_span(&ok, failed_tool).unwrap();
        engine.end_trace(&ok, true).unwrap();

        let bad = engine.start_trace("agent", "r2");
        engine.end_trace(&bad, false).unwrap();

        let summary = engine.summary();
        assert_eq!(summary.traces, 2);
        assert_eq!(summary.failed_runs, 1);
        assert_eq!(summary.node_executions, 1);
        assert_eq!(summary.llm_calls, 1);
        assert_eq!(summary.tool_calls, 1);
        assert_eq!(summary.failed_tool_calls, 1);
        assert_eq!(engine.traces_for_agent("agent").len(), 2);
    }

    #[test]
    fn prunes_finished_traces_at_capacity() {
        let engine = TelemetryEngine::with_capacity(10);
        let running = engine.start_trace("agent", "still-running");
        for i in 0..9 {
            let id = engine.start_trace("agent", format!("r{i}"));
            engine.end_trace(&id, true).unwrap();
        }
        assert_eq!(engine.trace_count(), 10);

        engine.start_trace("agent", "overflow");
        assert_eq!(engine.trace_count(), 10);
        assert!(engine.get_trace(&running).is_some());
        assert!(engine.trace_for_run("r0").is_none());
    }

    #[test]
    fn recent_and_prune() {
        let engine = TelemetryEngine::new();
        engine.start_trace("a", "1");
        engine.start_trace("a", "2");
        assert_eq!(engine.recent_traces(1)[0].run_id, "2");

        assert_eq!(engine.prune_before(Utc::now() - Duration::hours(1)), 0);
        assert_eq!(engine.prune_before(Utc::now() + Duration::hours(1)), 2);
        assert!(engine.export_json().unwrap().starts_with('['));
    }
}
