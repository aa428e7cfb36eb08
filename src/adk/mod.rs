// SPDX-License-Identifier: MIT

//! Agent kit: typed errors, model clients and instruction-bound agents

pub mod agent;
pub mod error;
pub mod model;
