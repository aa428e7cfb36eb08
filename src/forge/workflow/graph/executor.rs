// SPDX-License-Identifier: MIT

//! Graph workflow executor
//!
//! Runs a `GraphSpec` in supersteps. Nodes of one superstep execute one after
//! another in declaration order and each update is merged before the next node
//! starts, so no two nodes ever write the state at the same time. Fan-out
//! branches are therefore logically parallel but sequential in practice.
//!
//! A failing node ends its own branch only. Sibling branches still run to
//! terminal, then the first failure is returned tagged with its stage.

use super::types::{Edge, GraphEvent, GraphSpec, GraphState, Transition, END};
use crate::adk::error::{ForgeError, WorkflowError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default guard against runaway cycles
pub const DEFAULT_STEP_LIMIT: usize = 64;

/// A unit of work in a graph
#[async_trait]
pub trait Node<S: GraphState>: Send + Sync {
    async fn run(&self, state: &S) -> Result<S::Update, ForgeError>;
}

/// Result of a completed run
#[derive(Debug)]
pub struct RunOutcome<S> {
    pub state: S,
    /// Node names in execution order
    pub trace: Vec<String>,
}

/// A topology bound to node implementations
pub struct CompiledGraph<S: GraphState, P> {
    spec: GraphSpec<P>,
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    step_limit: usize,
}

impl<S, P> CompiledGraph<S, P>
where
    S: GraphState,
    P: Transition<S>,
{
    /// Bind implementations to a validated topology. Every declared node must
    /// have exactly one implementation.
    pub fn compile(
        spec: GraphSpec<P>,
        nodes: Vec<(&str, Arc<dyn Node<S>>)>,
    ) -> Result<Self, WorkflowError> {
        spec.validate()?;

        let mut bound = HashMap::new();
        for (name, node) in nodes {
            if !spec.nodes.iter().any(|n| n == name) {
                return Err(WorkflowError::UnknownNode(name.to_string()));
            }
            if bound.insert(name.to_string(), node).is_some() {
                return Err(WorkflowError::DuplicateNode(name.to_string()));
            }
        }

        if let Some(missing) = spec.nodes.iter().find(|n| !bound.contains_key(*n)) {
            return Err(WorkflowError::UnknownNode(missing.clone()));
        }

        Ok(Self {
            spec,
            nodes: bound,
            step_limit: DEFAULT_STEP_LIMIT,
        })
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn spec(&self) -> &GraphSpec<P> {
        &self.spec
    }

    /// Run to terminal
    pub async fn run(&self, state: S) -> Result<RunOutcome<S>, ForgeError> {
        self.run_with_events(state, None).await
    }

    /// Run to terminal, reporting progress on `events`
    pub async fn run_with_events(
        &self,
        mut state: S,
        events: Option<&mpsc::Sender<GraphEvent>>,
    ) -> Result<RunOutcome<S>, ForgeError> {
        let graph = self.spec.name.clone();
        let mut frontier = vec![self.spec.entry.clone()];
        let mut trace = Vec::new();
        let mut iteration = 0;
        let mut failure: Option<ForgeError> = None;

        while !frontier.is_empty() {
            iteration += 1;
            log::debug!(
                "Graph {} iteration {}: executing {:?}",
                graph,
                iteration,
                frontier
            );

            let mut next: Vec<String> = Vec::new();

            for node_id in frontier {
                if trace.len() >= self.step_limit {
                    log::error!("Graph {} exceeded {} steps", graph, self.step_limit);
                    return Err(WorkflowError::StepLimit {
                        graph,
                        limit: self.step_limit,
                    }
                    .into());
                }

                let node = &self.nodes[&node_id];

                emit(
                    events,
                    GraphEvent::NodeStarted {
                        graph: graph.clone(),
                        node: node_id.clone(),
                    },
                )
                .await;
                log::info!("Executing node: {}", node_id);

                let update = match node.run(&state).await {
                    Ok(update) => update,
                    Err(e) => {
                        log::error!("Node {} failed: {}", node_id, e);
                        if failure.is_none() {
                            failure = Some(ForgeError::stage(node_id.as_str(), e.to_string()));
                        }
                        continue;
                    }
                };
                state.apply(update);
                trace.push(node_id.clone());

                emit(
                    events,
                    GraphEvent::NodeFinished {
                        graph: graph.clone(),
                        node: node_id.clone(),
                    },
                )
                .await;

                for target in self.successors(&node_id, &state, events).await? {
                    if target != END && !next.contains(&target) {
                        next.push(target);
                    }
                }
            }

            frontier = next;
        }

        if let Some(err) = failure {
            log::error!("Graph {} failed after {} steps", graph, trace.len());
            return Err(err);
        }

        emit(
            events,
            GraphEvent::Finished {
                graph: graph.clone(),
                steps: trace.len(),
            },
        )
        .await;
        log::info!("Graph {} finished after {} steps", graph, trace.len());

        Ok(RunOutcome { state, trace })
    }

    /// Resolve the nodes that follow `node_id` given the merged state
    async fn successors(
        &self,
        node_id: &str,
        state: &S,
        events: Option<&mpsc::Sender<GraphEvent>>,
    ) -> Result<Vec<String>, WorkflowError> {
        let mut targets = Vec::new();

        for edge in self.spec.outgoing(node_id) {
            match edge {
                Edge::Direct { to, .. } => targets.push(to.clone()),
                Edge::Conditional {
                    predicate,
                    branches,
                    ..
                } => {
                    let label = predicate.route(state);
                    let target = branches
                        .iter()
                        .find(|(l, _)| l == label)
                        .map(|(_, t)| t.clone())
                        .ok_or_else(|| WorkflowError::UnroutableLabel {
                            node: node_id.to_string(),
                            label: label.to_string(),
                        })?;

                    log::info!(
                        "{} routed '{}' via {} -> {}",
                        node_id,
                        label,
                        predicate.name(),
                        target
                    );
                    emit(
                        events,
                        GraphEvent::Routed {
                            graph: self.spec.name.clone(),
                            from: node_id.to_string(),
                            predicate: predicate.name().to_string(),
                            label: label.to_string(),
                            to: target.clone(),
                        },
                    )
                    .await;

                    targets.push(target);
                }
            }
        }

        Ok(targets)
    }
}

async fn emit(events: Option<&mpsc::Sender<GraphEvent>>, event: GraphEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Counter {
        value: i64,
        visits: Vec<String>,
    }

    struct CounterUpdate {
        add: i64,
        visit: String,
    }

    impl GraphState for Counter {
        type Update = CounterUpdate;

        fn apply(&mut self, update: CounterUpdate) {
            self.value += update.add;
            self.visits.push(update.visit);
        }
    }

    struct AddNode {
        name: &'static str,
        add: i64,
    }

    #[async_trait]
    impl Node<Counter> for AddNode {
        async fn run(&self, _state: &Counter) -> Result<CounterUpdate, ForgeError> {
            Ok(CounterUpdate {
                add: self.add,
                visit: self.name.to_string(),
            })
        }
    }

    struct FailingNode;

    #[async_trait]
    impl Node<Counter> for FailingNode {
        async fn run(&self, _state: &Counter) -> Result<CounterUpdate, ForgeError> {
            Err(ForgeError::api("stub", "service unavailable"))
        }
    }

    /// Node that records the value it observed
    struct ObservingNode {
        seen: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl Node<Counter> for ObservingNode {
        async fn run(&self, state: &Counter) -> Result<CounterUpdate, ForgeError> {
            self.seen.lock().unwrap().push(state.value);
            Ok(CounterUpdate {
                add: 0,
                visit: "observe".to_string(),
            })
        }
    }

    #[derive(Debug, Clone)]
    enum Pred {
        BelowTen,
        Bogus,
    }

    impl Transition<Counter> for Pred {
        fn name(&self) -> &'static str {
            match self {
                Pred::BelowTen => "below_ten",
                Pred::Bogus => "bogus",
            }
        }

        fn route(&self, state: &Counter) -> &'static str {
            match self {
                Pred::BelowTen if state.value < 10 => "again",
                Pred::BelowTen => "done",
                Pred::Bogus => "nowhere",
            }
        }
    }

    fn add(name: &'static str, add: i64) -> Arc<dyn Node<Counter>> {
        Arc::new(AddNode { name, add })
    }

    #[tokio::test]
    async fn test_sequential_execution() {
        let spec = GraphSpec::new("seq", "a")
            .node("a")
            .node("b")
            .edge("a", "b")
            .edge("b", END);
        let graph: CompiledGraph<Counter, Pred> =
            CompiledGraph::compile(spec, vec![("a", add("a", 1)), ("b", add("b", 2))]).unwrap();

        let outcome = graph.run(Counter::default()).await.unwrap();
        assert_eq!(outcome.state.value, 3);
        assert_eq!(outcome.trace, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_conditional_loop_terminates() {
        let spec = GraphSpec::new("loop", "inc")
            .node("inc")
            .conditional("inc", Pred::BelowTen, &[("again", "inc"), ("done", END)]);
        let graph = CompiledGraph::compile(spec, vec![("inc", add("inc", 4))]).unwrap();

        let outcome = graph.run(Counter::default()).await.unwrap();
        assert_eq!(outcome.state.value, 12);
        assert_eq!(outcome.trace.len(), 3);
    }

    #[tokio::test]
    async fn test_fan_out_runs_both_branches_in_order() {
        let spec = GraphSpec::new("fan", "root")
            .node("root")
            .node("left")
            .node("right")
            .node("left_tail")
            .edge("root", "left")
            .edge("root", "right")
            .edge("left", "left_tail")
            .edge("right", END)
            .edge("left_tail", END);
        let graph: CompiledGraph<Counter, Pred> = CompiledGraph::compile(
            spec,
            vec![
                ("root", add("root", 1)),
                ("left", add("left", 10)),
                ("right", add("right", 100)),
                ("left_tail", add("left_tail", 1000)),
            ],
        )
        .unwrap();

        let outcome = graph.run(Counter::default()).await.unwrap();
        assert_eq!(outcome.state.value, 1111);
        assert_eq!(outcome.trace, vec!["root", "left", "right", "left_tail"]);
    }

    #[tokio::test]
    async fn test_updates_merged_before_next_node() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let spec = GraphSpec::new("merge", "a")
            .node("a")
            .node("observe")
            .edge("a", "observe");
        let graph: CompiledGraph<Counter, Pred> = CompiledGraph::compile(
            spec,
            vec![
                ("a", add("a", 5)),
                ("observe", Arc::new(ObservingNode { seen: seen.clone() })),
            ],
        )
        .unwrap();

        graph.run(Counter::default()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_node_failure_propagates_with_stage() {
        let spec = GraphSpec::new("fail", "a")
            .node("a")
            .node("boom")
            .node("never")
            .edge("a", "boom")
            .edge("boom", "never");
        let graph: CompiledGraph<Counter, Pred> = CompiledGraph::compile(
            spec,
            vec![
                ("a", add("a", 1)),
                ("boom", Arc::new(FailingNode)),
                ("never", add("never", 1)),
            ],
        )
        .unwrap();

        let err = graph.run(Counter::default()).await.unwrap_err();
        assert_eq!(err.failed_stage(), Some("boom"));
        assert!(err.to_string().contains("service unavailable"));
    }

    #[tokio::test]
    async fn test_failure_lets_sibling_branch_finish() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let spec = GraphSpec::new("fan_fail", "root")
            .node("root")
            .node("boom")
            .node("right")
            .node("observe")
            .edge("root", "boom")
            .edge("root", "right")
            .edge("boom", END)
            .edge("right", "observe");
        let graph: CompiledGraph<Counter, Pred> = CompiledGraph::compile(
            spec,
            vec![
                ("root", add("root", 1)),
                ("boom", Arc::new(FailingNode)),
                ("right", add("right", 100)),
                ("observe", Arc::new(ObservingNode { seen: seen.clone() })),
            ],
        )
        .unwrap();

        let err = graph.run(Counter::default()).await.unwrap_err();
        assert_eq!(err.failed_stage(), Some("boom"));
        assert_eq!(*seen.lock().unwrap(), vec![101]);
    }

    #[tokio::test]
    async fn test_unmapped_label_is_error() {
        let spec = GraphSpec::new("bad", "a")
            .node("a")
            .conditional("a", Pred::Bogus, &[("somewhere", END)]);
        let graph = CompiledGraph::compile(spec, vec![("a", add("a", 1))]).unwrap();

        let err = graph.run(Counter::default()).await.unwrap_err();
        assert!(matches!(
            err,
            ForgeError::Workflow(WorkflowError::UnroutableLabel { .. })
        ));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let spec = GraphSpec::new("spin", "a")
            .node("a")
            .edge("a", "a");
        let graph: CompiledGraph<Counter, Pred> = CompiledGraph::compile(spec, vec![("a", add("a", 1))])
            .unwrap()
            .with_step_limit(5);

        let err = graph.run(Counter::default()).await.unwrap_err();
        assert!(matches!(
            err,
            ForgeError::Workflow(WorkflowError::StepLimit { limit: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let spec = GraphSpec::new("ev", "inc")
            .node("inc")
            .conditional("inc", Pred::BelowTen, &[("again", "inc"), ("done", END)]);
        let graph = CompiledGraph::compile(spec, vec![("inc", add("inc", 10))]).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        graph
            .run_with_events(Counter::default(), Some(&tx))
            .await
            .unwrap();
        drop(tx);

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }

        assert!(matches!(events[0], GraphEvent::NodeStarted { .. }));
        assert!(events.iter().any(|e| matches!(
            e,
            GraphEvent::Routed { label, to, .. } if label == "done" && to == END
        )));
        assert!(matches!(
            events.last(),
            Some(GraphEvent::Finished { steps: 1, .. })
        ));
    }

    #[test]
    fn test_compile_requires_every_node() {
        let spec: GraphSpec<Pred> = GraphSpec::new("g", "a").node("a").node("b");
        let result = CompiledGraph::compile(spec, vec![("a", add("a", 1))]);
        assert!(matches!(result, Err(WorkflowError::UnknownNode(n)) if n == "b"));
    }
}
