//! Strategy: The execution graph of an agent.
//!
//! A strategy is a set of named nodes joined by conditional edges. A run
//! starts at `__start__` (or at an execution point restored into the
//! context) and advances one node at a time, feeding each node's output to
//! the first outgoing edge whose condition accepts it, until `__finish__` is
//! reached. The value arriving at `__finish__` is the run's result.
//!
//! Per step the engine:
//!
//! 1. records the node as the context's current node,
//! 2. fires `BeforeNode`,
//! 3. runs the node body (firing `NodeExecutionError` if it fails),
//! 4. resolves the successor,
//! 5. fires `AfterNode` with the successor as the next execution point,
//! 6. moves on, unless a feature or node set a different execution point.

mod builder;
pub mod nodes;
pub mod single_run;

pub use builder::StrategyBuilder;

use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::{AgentContext, ExecutionPoint};
use crate::error::AgentError;
use crate::pipeline::{AfterNode, BeforeNode, NodeExecutionError, StrategyFinished, StrategyStarted};
use crate::value::NodeValue;

/// Name of the entry node of every strategy.
pub const START: &str = "__start__";

/// Name of the terminal node of every strategy.
pub const FINISH: &str = "__finish__";

/// A node body.
pub type NodeFn =
    Arc<dyn for<'a> Fn(&'a mut AgentContext, NodeValue) -> BoxFuture<'a, Result<NodeValue, AgentError>> + Send + Sync>;

/// An edge condition: `Some(input for the target)` to take the edge.
pub type EdgeCondition = Arc<dyn Fn(&NodeValue) -> Option<NodeValue> + Send + Sync>;

#[derive(Clone)]
pub struct Node {
    name: String,
    body: NodeFn,
}

fn passthrough_body(_ctx: &mut AgentContext, input: NodeValue) -> BoxFuture<'_, Result<NodeValue, AgentError>> {
    Box::pin(async move { Ok(input) })
}

impl Node {
    fn passthrough(name: &str) -> Self {
        Self {
            name: name.to_string(),
            body: Arc::new(passthrough_body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone)]
struct Edge {
    from: String,
    to: String,
    condition: EdgeCondition,
}

/// Facts about a strategy established when it was built.
#[derive(Debug, Clone, Default)]
pub struct StrategyMetadata {
    /// Whether every node name is unique. Strategies without this refuse to run.
    pub unique_names: bool,
    pub duplicate_names: Vec<String>,
}

/// An immutable node graph, executable any number of times.
#[derive(Clone)]
pub struct Strategy {
    name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    metadata: StrategyMetadata,
}

impl Strategy {
    pub fn builder(name: impl Into<String>) -> StrategyBuilder {
        StrategyBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    /// Node names in declaration order, `__start__` first.
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    fn node(&self, name: &str) -> Result<&Node, AgentError> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| AgentError::UnknownNode {
                strategy: self.name.clone(),
                node: name.to_string(),
            })
    }

    fn successor(&self, node: &str, output: &NodeValue) -> Result<ExecutionPoint, AgentError> {
        self.edges
            .iter()
            .filter(|e| e.from == node)
            .find_map(|e| (e.condition)(output).map(|input| ExecutionPoint::new(e.to.clone(), input)))
            .ok_or_else(|| AgentError::NoSuccessor {
                strategy: self.name.clone(),
                node: node.to_string(),
            })
    }

    /// Run the graph to completion.
    ///
    /// If the context carries an execution point (e.g. restored from a
    /// checkpoint), the run resumes there and `input` is ignored.
    pub async fn execute(&self, ctx: &mut AgentContext, input: NodeValue) -> Result<NodeValue, AgentError> {
        if !self.metadata.unique_names {
            return Err(AgentError::DuplicateNodeNames {
                strategy: self.name.clone(),
                names: self.metadata.duplicate_names.clone(),
            });
        }

        let pipeline = ctx.pipeline();
        let started = StrategyStarted {
            strategy: self.name.clone(),
        };
        pipeline.fire(ctx, &started).await?;

        let (mut node_id, mut input) = match ctx.take_execution_point() {
            Some(point) => {
                info!(strategy = %self.name, node = %point.node_id, "Resuming from execution point");
                (point.node_id, point.input)
            }
            None => (START.to_string(), input),
        };

        let limit = ctx.config().max_iterations;
        let mut steps = 0usize;

        while node_id != FINISH {
            steps += 1;
            if steps > limit {
                warn!(strategy = %self.name, limit, "Node execution limit reached");
                return Err(AgentError::IterationLimit {
                    strategy: self.name.clone(),
                    limit,
                });
            }

            let node = self.node(&node_id)?;
            ctx.enter_node(&node_id, &input);

            let before = BeforeNode {
                node: node_id.clone(),
                input: input.clone(),
            };
            pipeline.fire(ctx, &before).await?;

            debug!(strategy = %self.name, node = %node_id, input = input.kind(), "Executing node");
            let output = match (node.body)(&mut *ctx, input.clone()).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(strategy = %self.name, node = %node_id, error = %e, "Node failed");
                    let failed = NodeExecutionError {
                        node: node_id.clone(),
                        input,
                        error: e.to_string(),
                    };
                    pipeline.fire(ctx, &failed).await?;
                    return Err(e);
                }
            };

            let next = self.successor(&node_id, &output)?;
            let after = AfterNode {
                node: node_id,
                input,
                output,
                next: next.clone(),
            };
            pipeline.fire(ctx, &after).await?;

            let point = match ctx.take_execution_point() {
                Some(forced) => {
                    debug!(strategy = %self.name, node = %forced.node_id, "Jumping to forced execution point");
                    forced
                }
                None => next,
            };
            node_id = point.node_id;
            input = point.input;
        }

        let finished = StrategyFinished {
            strategy: self.name.clone(),
            result: input.clone(),
        };
        pipeline.fire(ctx, &finished).await?;
        Ok(input)
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("name", &self.name)
            .field("nodes", &self.node_names())
            .field("edges", &self.edges.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::test_helpers::test_context;
    use crate::pipeline::Pipeline;
    use nodes::{always, when_text};
    use std::sync::Mutex;

    fn tagged(builder: StrategyBuilder, name: &str, tag: &'static str) -> StrategyBuilder {
        builder.node(name, move |_ctx, input| {
            Box::pin(async move {
                let text = input.as_text().unwrap_or_default();
                Ok(NodeValue::text(format!("{text}{tag}")))
            })
        })
    }

    fn linear() -> Strategy {
        let builder = Strategy::builder("linear");
        let builder = tagged(builder, "A", "a");
        let builder = tagged(builder, "B", "b");
        tagged(builder, "C", "c")
            .edge(START, "A", always)
            .edge("A", "B", always)
            .edge("B", "C", always)
            .edge("C", FINISH, always)
            .build()
            .unwrap()
    }

    fn recording_pipeline(log: Arc<Mutex<Vec<String>>>) -> Pipeline {
        let mut pipeline = Pipeline::new();
        let l = log.clone();
        pipeline.intercept::<BeforeNode, _>(move |_ctx, e| {
            let l = l.clone();
            Box::pin(async move {
                l.lock().unwrap().push(format!("before({})", e.node));
                Ok(())
            })
        });
        let l = log;
        pipeline.intercept::<AfterNode, _>(move |_ctx, e| {
            let l = l.clone();
            Box::pin(async move {
                l.lock().unwrap().push(format!("after({})", e.node));
                Ok(())
            })
        });
        pipeline
    }

    #[tokio::test]
    async fn linear_run_feeds_outputs_forward() {
        let mut ctx = test_context(vec![]);
        let result = linear().execute(&mut ctx, NodeValue::text("x")).await.unwrap();
        assert_eq!(result, NodeValue::text("xabc"));
        assert_eq!(ctx.current_node_id(), Some("C"));
        assert_eq!(ctx.last_input(), Some(&NodeValue::text("xab")));
    }

    #[tokio::test]
    async fn hooks_wrap_each_node_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = test_context(vec![]).with_pipeline(Arc::new(recording_pipeline(log.clone())));

        linear().execute(&mut ctx, NodeValue::text("x")).await.unwrap();

        let events: Vec<String> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| !e.contains(START))
            .cloned()
            .collect();
        assert_eq!(
            events,
            vec!["before(A)", "after(A)", "before(B)", "after(B)", "before(C)", "after(C)"]
        );
    }

    #[tokio::test]
    async fn duplicate_names_refuse_to_run_before_any_node() {
        let ran = Arc::new(Mutex::new(0));
        let counter = ran.clone();
        let builder = Strategy::builder("dup").node("A", move |_ctx, input| {
            let counter = counter.clone();
            Box::pin(async move {
                *counter.lock().unwrap() += 1;
                Ok(input)
            })
        });
        let strategy = tagged(builder, "A", "a")
            .edge(START, "A", always)
            .edge("A", FINISH, always)
            .build()
            .unwrap();

        let mut ctx = test_context(vec![]);
        let err = strategy.execute(&mut ctx, NodeValue::Unit).await.unwrap_err();

        assert!(matches!(err, AgentError::DuplicateNodeNames { .. }));
        assert_eq!(*ran.lock().unwrap(), 0);
        assert!(ctx.current_node_id().is_none());
    }

    #[tokio::test]
    async fn missing_successor_is_an_error() {
        let strategy = tagged(Strategy::builder("stuck"), "A", "a")
            .edge(START, "A", always)
            .edge("A", FINISH, when_text("done"))
            .build()
            .unwrap();

        let mut ctx = test_context(vec![]);
        let err = strategy.execute(&mut ctx, NodeValue::text("x")).await.unwrap_err();
        assert!(matches!(err, AgentError::NoSuccessor { ref node, .. } if node == "A"));
    }

    #[tokio::test]
    async fn first_matching_edge_wins_and_transforms_input() {
        let builder = tagged(Strategy::builder("route"), "A", "a");
        let strategy = tagged(builder, "B", "b")
            .edge(START, "A", always)
            .edge("A", "B", |v| v.as_text().filter(|t| t.len() > 10).map(NodeValue::text))
            .edge("A", FINISH, |v| v.as_text().map(|t| NodeValue::text(t.to_uppercase())))
            .edge("B", FINISH, always)
            .build()
            .unwrap();

        let mut ctx = test_context(vec![]);
        let result = strategy.execute(&mut ctx, NodeValue::text("x")).await.unwrap();
        assert_eq!(result, NodeValue::text("XA"));
    }

    #[tokio::test]
    async fn cycles_are_bounded_by_iteration_limit() {
        let strategy = tagged(Strategy::builder("loop"), "A", "a")
            .edge(START, "A", always)
            .edge("A", "A", always)
            .build()
            .unwrap();

        let mut ctx = test_context(vec![])
            .with_config(weft_core::AgentConfig::default().with_max_iterations(5));
        let err = strategy.execute(&mut ctx, NodeValue::text("")).await.unwrap_err();
        assert!(matches!(err, AgentError::IterationLimit { limit: 5, .. }));
    }

    #[tokio::test]
    async fn node_failure_fires_error_hook_and_propagates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        let l = log.clone();
        pipeline.intercept::<NodeExecutionError, _>(move |_ctx, e| {
            let l = l.clone();
            Box::pin(async move {
                l.lock().unwrap().push(format!("{}: {}", e.node, e.error));
                Ok(())
            })
        });

        let strategy = Strategy::builder("failing")
            .node("A", |_ctx, _input| {
                Box::pin(async move { Err(AgentError::Configuration("broken node".into())) })
            })
            .edge(START, "A", always)
            .edge("A", FINISH, always)
            .build()
            .unwrap();

        let mut ctx = test_context(vec![]).with_pipeline(Arc::new(pipeline));
        let err = strategy.execute(&mut ctx, NodeValue::Unit).await.unwrap_err();

        assert!(err.to_string().contains("broken node"));
        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(log.lock().unwrap()[0].starts_with("A: "));
    }

    #[tokio::test]
    async fn forced_execution_point_redirects_after_current_node() {
        let builder = Strategy::builder("jump").node("A", |ctx, input| {
            Box::pin(async move {
                let history = ctx.history().to_vec();
                ctx.set_execution_point("C", history, NodeValue::text("forced"));
                Ok(input)
            })
        });
        let builder = tagged(builder, "B", "b");
        let strategy = tagged(builder, "C", "c")
            .edge(START, "A", always)
            .edge("A", "B", always)
            .edge("B", FINISH, always)
            .edge("C", FINISH, always)
            .build()
            .unwrap();

        let mut ctx = test_context(vec![]);
        let result = strategy.execute(&mut ctx, NodeValue::text("x")).await.unwrap();
        assert_eq!(result, NodeValue::text("forcedc"));
    }

    #[tokio::test]
    async fn restored_execution_point_skips_earlier_nodes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = test_context(vec![]).with_pipeline(Arc::new(recording_pipeline(log.clone())));
        ctx.set_execution_point("B", vec![], NodeValue::text("resumed-"));

        let result = linear().execute(&mut ctx, NodeValue::text("ignored")).await.unwrap();

        assert_eq!(result, NodeValue::text("resumed-bc"));
        assert_eq!(log.lock().unwrap()[0], "before(B)");
    }
}
