// SPDX-License-Identifier: MIT

//! Named transition predicates of the orchestrator graph

use super::graph::Transition;
use super::state::{OutputKind, WorkflowState};

/// Branch labels
pub mod label {
    pub const RETRIEVE: &str = "retrieve";
    pub const GENERATE: &str = "generate";
    pub const OPTIMIZE: &str = "optimize";
    pub const VALIDATE: &str = "validate";
    pub const NARRATE: &str = "narrate";
    pub const DONE: &str = "done";
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Retrieval runs only when a document was supplied
    HasDocument,
    /// One-shot optimization gate
    CheckEfficiency { threshold: i64, max_optimizations: u32 },
    /// Narration runs when the route asked for audio and a narrator exists
    WantsAudio { narrator_available: bool },
}

impl Transition<WorkflowState> for Predicate {
    fn name(&self) -> &'static str {
        match self {
            Predicate::HasDocument => "has_document",
            Predicate::CheckEfficiency { .. } => "check_efficiency",
            Predicate::WantsAudio { .. } => "wants_audio",
        }
    }

    fn route(&self, state: &WorkflowState) -> &'static str {
        match self {
            Predicate::HasDocument => {
                if state.has_document() {
                    label::RETRIEVE
                } else {
                    label::GENERATE
                }
            }
            Predicate::CheckEfficiency {
                threshold,
                max_optimizations,
            } => {
                if state.score < *threshold && state.retry_count < *max_optimizations {
                    label::OPTIMIZE
                } else {
                    label::VALIDATE
                }
            }
            Predicate::WantsAudio { narrator_available } => {
                let requested = state
                    .route
                    .as_ref()
                    .map(|r| r.wants(OutputKind::Audio))
                    .unwrap_or(false);
                if *narrator_available && requested {
                    label::NARRATE
                } else {
                    label::DONE
                }
            }
        }
    }
}
