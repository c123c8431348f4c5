//! Features: Pluggable cross-cutting concerns installed into the pipeline.
//!
//! A feature owns a typed configuration and a stable key. Installing it
//! registers its handlers on the agent's [`Pipeline`] and yields the feature
//! instance, which every run can reach through
//! [`AgentContext::feature`](crate::context::AgentContext::feature).

use std::any::Any;
use std::sync::Arc;

use crate::error::AgentError;
use crate::pipeline::Pipeline;

pub trait Feature: Any + Send + Sync + Sized {
    type Config: Default + Send;

    /// Stable identity of the feature; unique per agent.
    const KEY: &'static str;

    /// Register handlers and build the shared instance.
    fn install(config: Self::Config, pipeline: &mut Pipeline) -> Result<Arc<Self>, AgentError>;
}
