//! Building strategies.

use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;

use super::{Edge, FINISH, Node, START, Strategy, StrategyMetadata};
use crate::context::AgentContext;
use crate::error::AgentError;
use crate::value::NodeValue;

/// Collects nodes and edges, then freezes them into a [`Strategy`].
///
/// `__start__` and `__finish__` are implicit. Node names should be unique;
/// duplicates are recorded in the strategy's metadata and make it refuse to
/// run.
pub struct StrategyBuilder {
    name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl StrategyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Add a node.
    ///
    /// ```ignore
    /// builder.node("shout", |_ctx, input| Box::pin(async move {
    ///     Ok(NodeValue::text(input.as_text().unwrap_or_default().to_uppercase()))
    /// }))
    /// ```
    pub fn node<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a mut AgentContext, NodeValue) -> BoxFuture<'a, Result<NodeValue, AgentError>>
            + Send
            + Sync
            + 'static,
    {
        self.nodes.push(Node {
            name: name.into(),
            body: Arc::new(body),
        });
        self
    }

    /// Add an edge taken when `condition` yields a value; that value becomes
    /// the target's input. Edges are tried in the order they were added.
    pub fn edge<C>(mut self, from: impl Into<String>, to: impl Into<String>, condition: C) -> Self
    where
        C: Fn(&NodeValue) -> Option<NodeValue> + Send + Sync + 'static,
    {
        self.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            condition: Arc::new(condition),
        });
        self
    }

    /// Validate edges and freeze the graph.
    pub fn build(self) -> Result<Strategy, AgentError> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        let reserved = [START, FINISH];
        for node in &self.nodes {
            if reserved.contains(&node.name.as_str()) || !seen.insert(node.name.as_str()) {
                duplicates.push(node.name.clone());
            }
        }

        let known = |name: &str| reserved.contains(&name) || seen.contains(name);
        for edge in &self.edges {
            if edge.from == FINISH {
                return Err(AgentError::Configuration(format!(
                    "strategy `{}`: edges cannot leave `{FINISH}`",
                    self.name
                )));
            }
            for end in [&edge.from, &edge.to] {
                if !known(end) {
                    return Err(AgentError::Configuration(format!(
                        "strategy `{}`: edge {} -> {} references unknown node `{end}`",
                        self.name, edge.from, edge.to
                    )));
                }
            }
        }

        let mut nodes = vec![Node::passthrough(START)];
        nodes.extend(self.nodes);

        Ok(Strategy {
            metadata: StrategyMetadata {
                unique_names: duplicates.is_empty(),
                duplicate_names: duplicates,
            },
            name: self.name,
            nodes,
            edges: self.edges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::nodes::always;

    fn noop(_ctx: &mut AgentContext, input: NodeValue) -> BoxFuture<'_, Result<NodeValue, AgentError>> {
        Box::pin(async move { Ok(input) })
    }

    #[test]
    fn unknown_edge_target_is_rejected() {
        let err = StrategyBuilder::new("s")
            .node("a", noop)
            .edge(START, "a", always)
            .edge("a", "b", always)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown node `b`"));
    }

    #[test]
    fn duplicates_are_recorded_not_rejected() {
        let strategy = StrategyBuilder::new("s")
            .node("a", noop)
            .node("a", noop)
            .edge(START, "a", always)
            .edge("a", FINISH, always)
            .build()
            .unwrap();
        assert!(!strategy.metadata().unique_names);
        assert_eq!(strategy.metadata().duplicate_names, vec!["a"]);
    }

    #[test]
    fn reserved_names_count_as_duplicates() {
        let strategy = StrategyBuilder::new("s")
            .node(FINISH, noop)
            .edge(START, FINISH, always)
            .build()
            .unwrap();
        assert!(!strategy.metadata().unique_names);
    }
}
