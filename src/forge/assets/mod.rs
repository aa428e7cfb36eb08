// SPDX-License-Identifier: MIT

//! Asset generation for placeholders
//!
//! - `code` - graph and diagram synthesis with a self-repairing retry loop
//! - `image` - image acquisition through a search service
//! - `sandbox` - time-boxed execution of generated programs
//! - `static_check` - pre-execution rejection of malformed programs

pub mod code;
pub mod image;
pub mod sandbox;
pub mod static_check;

use crate::adk::error::{AssetError, ForgeError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use code::CodeAssetGenerator;
pub use image::GoogleImageSearch;
pub use sandbox::{CodeLanguage, ExecutionOutput, ExecutionRequest, ProcessSandbox, Sandbox};

/// Result of one asset sub-workflow. Failures are reported, never raised.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub success: bool,
    /// Programs executed
    pub attempts: u32,
    /// Fix cycles taken
    pub retries: u32,
    pub error: Option<AssetError>,
}

impl GenerationOutcome {
    pub fn failed(error: AssetError) -> Self {
        Self {
            success: false,
            attempts: 0,
            retries: 0,
            error: Some(error),
        }
    }
}

/// Synthesizes one asset at an exact path
#[async_trait]
pub trait AssetGenerator: Send + Sync {
    async fn generate(&self, description: &str, index: usize, output_path: &Path) -> GenerationOutcome;
}

/// Image search result
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    Saved(PathBuf),
    /// Nothing usable was found; the caller rolls back the reference
    NoResults,
}

/// Finds an image for a description and saves it at `target`
#[async_trait]
pub trait ImageSearch: Send + Sync {
    async fn fetch(&self, description: &str, target: &Path) -> Result<ImageOutcome, ForgeError>;
}
