// SPDX-License-Identifier: MIT

//! Orchestrator topology as plain data

use crate::forge::config::OptimizationSettings;
use crate::forge::workflow::graph::{GraphSpec, END};
use crate::forge::workflow::predicate::{label, Predicate};

/// Node names
pub mod node {
    pub const START: &str = "start";
    pub const RETRIEVE_CONTEXT: &str = "retrieve_context";
    pub const GENERATE_CONTENT: &str = "generate_content";
    pub const SCORE_CONTENT: &str = "score_content";
    pub const OPTIMIZE: &str = "optimize";
    pub const VALIDATE: &str = "validate";
    pub const PERSIST_PRIMARY: &str = "persist_primary";
    pub const COMPILE_PRIMARY: &str = "compile_primary";
    pub const CONVERT_FORMAT: &str = "convert_format";
    pub const PERSIST_CONVERTED: &str = "persist_converted";
    pub const RESOLVE_ASSETS: &str = "resolve_assets";
    pub const NARRATE: &str = "narrate";
}

pub const GRAPH_NAME: &str = "content_pipeline";

/// Build the orchestrator graph
pub fn topology(optimization: &OptimizationSettings, narrator_available: bool) -> GraphSpec<Predicate> {
    use node::*;

    GraphSpec::new(GRAPH_NAME, START)
        .node(START)
        .node(RETRIEVE_CONTEXT)
        .node(GENERATE_CONTENT)
        .node(SCORE_CONTENT)
        .node(OPTIMIZE)
        .node(VALIDATE)
        .node(PERSIST_PRIMARY)
        .node(COMPILE_PRIMARY)
        .node(CONVERT_FORMAT)
        .node(PERSIST_CONVERTED)
        .node(RESOLVE_ASSETS)
        .node(NARRATE)
        .conditional(
            START,
            Predicate::HasDocument,
            &[(label::RETRIEVE, RETRIEVE_CONTEXT), (label::GENERATE, GENERATE_CONTENT)],
        )
        .edge(RETRIEVE_CONTEXT, GENERATE_CONTENT)
        .edge(GENERATE_CONTENT, SCORE_CONTENT)
        .conditional(
            SCORE_CONTENT,
            Predicate::CheckEfficiency {
                threshold: optimization.score_threshold,
                max_optimizations: optimization.max_optimizations,
            },
            &[(label::OPTIMIZE, OPTIMIZE), (label::VALIDATE, VALIDATE)],
        )
        .edge(OPTIMIZE, VALIDATE)
        // Both branches run; neither excludes the other
        .edge(VALIDATE, PERSIST_PRIMARY)
        .edge(VALIDATE, CONVERT_FORMAT)
        .edge(PERSIST_PRIMARY, COMPILE_PRIMARY)
        .edge(COMPILE_PRIMARY, END)
        .edge(CONVERT_FORMAT, PERSIST_CONVERTED)
        .edge(PERSIST_CONVERTED, RESOLVE_ASSETS)
        .conditional(
            RESOLVE_ASSETS,
            Predicate::WantsAudio { narrator_available },
            &[(label::NARRATE, NARRATE), (label::DONE, END)],
        )
        .edge(NARRATE, END)
}

#[cfg(test)]
mod tests {
    use super::node::*;
    use super::*;
    use crate::forge::workflow::graph::Edge;

    fn spec() -> GraphSpec<Predicate> {
        topology(&OptimizationSettings::default(), true)
    }

    #[test]
    fn test_topology_is_valid() {
        assert!(spec().validate().is_ok());
        assert_eq!(spec().entry, START);
    }

    #[test]
    fn test_validate_fans_out_to_both_branches() {
        let spec = spec();
        let targets: Vec<&str> = spec
            .outgoing(VALIDATE)
            .filter_map(|e| match e {
                Edge::Direct { to, .. } => Some(to.as_str()),
                Edge::Conditional { .. } => None,
            })
            .collect();
        assert_eq!(targets, vec![PERSIST_PRIMARY, CONVERT_FORMAT]);
    }

    #[test]
    fn test_optimize_always_validates() {
        let spec = spec();
        let edges: Vec<_> = spec.outgoing(OPTIMIZE).collect();
        assert_eq!(edges.len(), 1);
        assert!(matches!(edges[0], Edge::Direct { to, .. } if to == VALIDATE));
    }

    #[test]
    fn test_gate_uses_configured_constants() {
        let settings = OptimizationSettings {
            score_threshold: 6,
            max_optimizations: 2,
        };
        let spec = topology(&settings, false);
        let gate = spec
            .outgoing(SCORE_CONTENT)
            .find_map(|e| match e {
                Edge::Conditional { predicate, .. } => Some(predicate.clone()),
                Edge::Direct { .. } => None,
            })
            .unwrap();
        assert_eq!(
            gate,
            Predicate::CheckEfficiency {
                threshold: 6,
                max_optimizations: 2
            }
        );
    }
}
