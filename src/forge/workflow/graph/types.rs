// SPDX-License-Identifier: MIT

//! Graph topology type definitions
//!
//! Topology is plain data: node names plus edges. Conditional edges carry a
//! named predicate value and a label → target table; the predicate is only
//! consulted by the runner, never by the topology itself.

use crate::adk::error::WorkflowError;
use serde::Serialize;
use std::collections::HashSet;

/// Target name that terminates a path
pub const END: &str = "__end__";

/// State threaded through a graph. Nodes never mutate it directly; they
/// return an update that the runner merges between node boundaries.
pub trait GraphState: Send + Sync {
    type Update: Send;

    /// Merge one node's update using each field's reducer
    fn apply(&mut self, update: Self::Update);
}

/// A named transition predicate. Returns the label of the branch to take.
pub trait Transition<S>: Send + Sync {
    fn name(&self) -> &'static str;
    fn route(&self, state: &S) -> &'static str;
}

/// An edge in the workflow graph
#[derive(Debug, Clone, PartialEq)]
pub enum Edge<P> {
    /// Always taken. Several direct edges from one node fan out.
    Direct { from: String, to: String },
    /// Taken through exactly one branch chosen by the predicate
    Conditional {
        from: String,
        predicate: P,
        branches: Vec<(String, String)>,
    },
}

impl<P> Edge<P> {
    pub fn from(&self) -> &str {
        match self {
            Edge::Direct { from, .. } | Edge::Conditional { from, .. } => from,
        }
    }

    fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct { to, .. } => vec![to.as_str()],
            Edge::Conditional { branches, .. } => branches.iter().map(|(_, t)| t.as_str()).collect(),
        }
    }
}

/// Graph definition: entry point, declared nodes, edges
#[derive(Debug, Clone)]
pub struct GraphSpec<P> {
    pub name: String,
    pub entry: String,
    pub nodes: Vec<String>,
    pub edges: Vec<Edge<P>>,
}

impl<P> GraphSpec<P> {
    pub fn new(name: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Declare a node
    pub fn node(mut self, name: impl Into<String>) -> Self {
        self.nodes.push(name.into());
        self
    }

    /// Add an unconditional edge
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(Edge::Direct {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Add a conditional edge with `(label, target)` branches
    pub fn conditional(
        mut self,
        from: impl Into<String>,
        predicate: P,
        branches: &[(&str, &str)],
    ) -> Self {
        self.edges.push(Edge::Conditional {
            from: from.into(),
            predicate,
            branches: branches
                .iter()
                .map(|(l, t)| (l.to_string(), t.to_string()))
                .collect(),
        });
        self
    }

    /// Outgoing edges of a node in declaration order
    pub fn outgoing<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a Edge<P>> + 'a {
        self.edges.iter().filter(move |e| e.from() == node)
    }

    /// Check that every name the topology mentions is declared exactly once
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let mut declared = HashSet::new();
        for node in &self.nodes {
            if node == END || !declared.insert(node.as_str()) {
                return Err(WorkflowError::DuplicateNode(node.clone()));
            }
        }

        if !declared.contains(self.entry.as_str()) {
            return Err(WorkflowError::MissingEntry(self.entry.clone()));
        }

        for edge in &self.edges {
            if !declared.contains(edge.from()) {
                return Err(WorkflowError::UnknownNode(edge.from().to_string()));
            }
            for target in edge.targets() {
                if target != END && !declared.contains(target) {
                    return Err(WorkflowError::UnknownNode(target.to_string()));
                }
            }
        }

        Ok(())
    }
}

/// Progress notifications emitted while a graph runs
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GraphEvent {
    NodeStarted {
        graph: String,
        node: String,
    },
    NodeFinished {
        graph: String,
        node: String,
    },
    Routed {
        graph: String,
        from: String,
        predicate: String,
        label: String,
        to: String,
    },
    Finished {
        graph: String,
        steps: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> GraphSpec<&'static str> {
        GraphSpec::new("demo", "a")
            .node("a")
            .node("b")
            .node("c")
            .edge("a", "b")
            .conditional("b", "p", &[("yes", "c"), ("no", END)])
            .edge("c", END)
    }

    #[test]
    fn test_valid_spec() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn test_unknown_target_rejected() {
        let spec = spec().edge("c", "ghost");
        assert!(matches!(
            spec.validate(),
            Err(WorkflowError::UnknownNode(n)) if n == "ghost"
        ));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let spec = spec().node("a");
        assert!(matches!(spec.validate(), Err(WorkflowError::DuplicateNode(_))));
    }

    #[test]
    fn test_missing_entry_rejected() {
        let spec: GraphSpec<&str> = GraphSpec::new("demo", "start").node("a");
        assert!(matches!(spec.validate(), Err(WorkflowError::MissingEntry(_))));
    }

    #[test]
    fn test_outgoing_in_declaration_order() {
        let spec = spec().edge("a", "c");
        let targets: Vec<_> = spec
            .outgoing("a")
            .map(|e| match e {
                Edge::Direct { to, .. } => to.as_str(),
                Edge::Conditional { .. } => "cond",
            })
            .collect();
        assert_eq!(targets, vec!["b", "c"]);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = GraphEvent::NodeStarted {
            graph: "g".to_string(),
            node: "validate".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "node_started");
        assert_eq!(json["node"], "validate");
    }
}
