//! The agent execution core.
//!
//! A run walks a [`Strategy`] graph node by node:
//!
//! 1. **Start** at `__start__` (or at a restored [`ExecutionPoint`])
//! 2. **Run** the node body against the per-run [`AgentContext`]
//! 3. **Route** the output along the first edge whose condition accepts it
//! 4. **Repeat** until the output reaches `__finish__`
//!
//! Every step fires typed events on the [`Pipeline`], where installed
//! [`Feature`]s (persistence, tracing) hook in. Tool calls go through the
//! core crate's tool environment, which is the only place tools run.

pub mod context;
pub mod error;
pub mod feature;
pub mod patterns;
pub mod pipeline;
pub mod runner;
pub mod strategy;
pub mod value;

pub use context::{AgentContext, ContextStorage, ExecutionPoint, FeatureSet, StorageKey};
pub use error::AgentError;
pub use feature::Feature;
pub use pipeline::Pipeline;
pub use runner::{Agent, AgentBuilder};
pub use strategy::{FINISH, START, Strategy, StrategyBuilder, StrategyMetadata};
pub use strategy::single_run::single_run_strategy;
pub use value::NodeValue;
