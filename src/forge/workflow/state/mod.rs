// SPDX-License-Identifier: MIT

//! State management for the orchestrator
//!
//! This module provides:
//! - `WorkflowState` - the typed record threaded through one task
//! - `StateUpdate` - a node's partial contribution
//! - `schema()` - the reducer declared for each field

mod record;
mod schema;
mod store;

pub use record::{Message, OutputKind, RouteDecision, RouteType};
pub use schema::{reducer_for, schema, ReducerType, StateFieldDef};
pub use store::{StateUpdate, WorkflowState};
