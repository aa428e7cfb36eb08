// SPDX-License-Identifier: MIT

pub mod assets;
pub mod audio;
pub mod compile;
pub mod config;
pub mod convert;
pub mod generate;
pub mod persist;
pub mod placeholder;
pub mod retrieval;
pub mod scoring;
pub mod server;
pub mod validate;
pub mod workflow;
