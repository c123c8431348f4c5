//! Data model for run traces and spans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Span ──────────────────────────────────────────────────────────────────

/// The kind of work a span represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// A whole agent run; the root of its trace.
    Run,
    /// One strategy node execution.
    Node,
    /// An LLM request.
    LlmCall,
    /// A single tool call.
    ToolCall,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::Node => write!(f, "node"),
            Self::LlmCall => write!(f, "llm_call"),
            Self::ToolCall => write!(f, "tool_call"),
        }
    }
}

/// A single traced unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    /// Parent span id (None for the run span).
    pub parent_id: Option<String>,
    pub kind: SpanKind,
    /// Node name, model id or tool name.
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Computed on end.
    pub duration_ms: Option<u64>,
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Span {
    pub fn new(kind: SpanKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            kind,
            label: label.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            success: None,
            error: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn end(&mut self, success: bool) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(now.signed_duration_since(self.started_at).num_milliseconds().max(0) as u64);
        self.success = Some(success);
    }

    /// End as failed, recording the error text.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.end(false);
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// All spans recorded for one agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub agent_id: String,
    pub run_id: String,
    pub spans: Vec<Span>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
}

impl Trace {
    pub fn new(agent_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            run_id: run_id.into(),
            spans: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            success: None,
        }
    }

    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    pub fn end(&mut self, success: bool) {
        self.ended_at = Some(Utc::now());
        self.success = Some(success);
    }

    pub fn count(&self, kind: SpanKind) -> usize {
        self.spans.iter().filter(|s| s.kind == kind).count()
    }

    pub fn failed_spans(&self) -> impl Iterator<Item = &Span> {
        self.spans.iter().filter(|s| s.success == Some(false))
    }

    /// Node labels in the order their spans started.
    pub fn node_path(&self) -> Vec<&str> {
        let mut nodes: Vec<&Span> = self.spans.iter().filter(|s| s.kind == SpanKind::Node).collect();
        nodes.sort_by_key(|s| s.started_at);
        nodes.into_iter().map(|s| s.label.as_str()).collect()
    }

    pub fn root(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.kind == SpanKind::Run)
    }
}

// ── Aggregated views ──────────────────────────────────────────────────────

/// Totals across every retained trace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TelemetrySummary {
    pub traces: u64,
    pub failed_runs: u64,
    pub node_executions: u64,
    pub llm_calls: u64,
    pub tool_calls: u64,
    pub failed_tool_calls: u64,
}
