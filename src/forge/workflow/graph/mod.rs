// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! This module provides the graph workflow executor that runs nodes along
//! direct and conditional edges until every path reaches `END`.

pub mod executor;
pub mod types;

pub use executor::{CompiledGraph, Node, RunOutcome, DEFAULT_STEP_LIMIT};
pub use types::{Edge, GraphEvent, GraphSpec, GraphState, Transition, END};
