// SPDX-License-Identifier: MIT

//! Placeholder manifest and asset report files

use super::{AssetKind, Placeholder};
use crate::adk::error::ForgeError;
use crate::forge::persist::{write_json, TaskLayout};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persist the manifest. Must happen before any asset is generated.
pub async fn write_manifest(layout: &TaskLayout, placeholders: &[Placeholder]) -> Result<(), ForgeError> {
    write_json(&layout.manifest_path(), &placeholders).await
}

/// Load a manifest written by `write_manifest`
pub async fn read_manifest(path: &Path) -> Result<Vec<Placeholder>, ForgeError> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Final state of one placeholder's asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Generated,
    /// Retries exhausted or service failed; reference left in place
    Failed,
    /// Image search found nothing; reference removed
    NoResults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub kind: AssetKind,
    pub index: usize,
    pub description: String,
    pub status: AssetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Code executions, for synthesized assets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssetRecord {
    pub fn new(placeholder: &Placeholder, status: AssetStatus) -> Self {
        Self {
            kind: placeholder.kind,
            index: placeholder.index,
            description: placeholder.description.clone(),
            status,
            path: None,
            attempts: None,
            error: None,
        }
    }
}

/// Outcome of every placeholder of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetReport {
    pub task_id: String,
    pub generated_at: DateTime<Utc>,
    /// Ordered by placeholder index
    pub records: Vec<AssetRecord>,
}

impl AssetReport {
    pub fn new(task_id: impl Into<String>, mut records: Vec<AssetRecord>) -> Self {
        records.sort_by_key(|r| r.index);
        Self {
            task_id: task_id.into(),
            generated_at: Utc::now(),
            records,
        }
    }

    pub fn count(&self, kind: AssetKind, status: AssetStatus) -> usize {
        self.records
            .iter()
            .filter(|r| r.kind == kind && r.status == status)
            .count()
    }

    pub async fn write(&self, layout: &TaskLayout) -> Result<(), ForgeError> {
        write_json(&layout.asset_report_path(), self).await
    }
}
