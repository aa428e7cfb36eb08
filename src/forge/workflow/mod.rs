// SPDX-License-Identifier: MIT

pub mod graph;
pub mod orchestrator;
pub mod predicate;
pub mod state;

pub use orchestrator::{Collaborators, Orchestrator, TaskHandle, TaskOutcome};
