// SPDX-License-Identifier: MIT

//! Per-task output layout and writers
//!
//! Everything a task produces lives under `<output_root>/<task_id>/`, where
//! `task_id` is the sanitized topic:
//!
//! ```text
//! <task_id>/
//!   latex/<task_id>.tex, latex/<task_id>.pdf
//!   markdown/<task_id>.md
//!   graphs/graph_<i>.png, images/image_<i>.png, diagrams/diagram_<i>.png
//!   audio/narration.wav
//!   extracted_placeholders.json, processed_document.md, asset_report.json
//! ```

use crate::adk::error::ForgeError;
use crate::forge::config::LayoutSettings;
use crate::forge::placeholder::AssetKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s-]").expect("Failed to compile filename regex"));

pub const MANIFEST_FILE: &str = "extracted_placeholders.json";
pub const PROCESSED_DOCUMENT_FILE: &str = "processed_document.md";
pub const ASSET_REPORT_FILE: &str = "asset_report.json";
pub const NARRATION_FILE: &str = "narration.wav";

/// Truncate to `max_chars`, drop everything but word characters, whitespace
/// and dashes, then join words with underscores
pub fn sanitize(text: &str, max_chars: usize) -> String {
    let prefix: String = text.chars().take(max_chars).collect();
    let cleaned = UNSAFE_CHARS.replace_all(&prefix, "");
    cleaned
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Paths and URLs of one task's artifacts
#[derive(Debug, Clone)]
pub struct TaskLayout {
    task_id: String,
    root: PathBuf,
    url_prefix: String,
}

impl TaskLayout {
    pub fn new(settings: &LayoutSettings, topic: &str) -> Self {
        let mut task_id = sanitize(topic, settings.task_dir_prefix_len);
        if task_id.is_empty() {
            task_id = "task".to_string();
        }
        Self {
            root: settings.output_root.join(&task_id),
            url_prefix: settings.asset_url_prefix.trim_end_matches('/').to_string(),
            task_id,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn primary_source(&self) -> PathBuf {
        self.root.join("latex").join(format!("{}.tex", self.task_id))
    }

    pub fn converted_source(&self) -> PathBuf {
        self.root.join("markdown").join(format!("{}.md", self.task_id))
    }

    pub fn asset_dir(&self, kind: AssetKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn asset_path(&self, kind: AssetKind, index: usize) -> PathBuf {
        self.asset_dir(kind).join(kind.file_name(index))
    }

    /// URL the rewritten document uses for an asset
    pub fn asset_url(&self, kind: AssetKind, index: usize) -> String {
        format!(
            "{}/{}/{}/{}",
            self.url_prefix,
            self.task_id,
            kind.dir_name(),
            kind.file_name(index)
        )
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn processed_document_path(&self) -> PathBuf {
        self.root.join(PROCESSED_DOCUMENT_FILE)
    }

    pub fn asset_report_path(&self) -> PathBuf {
        self.root.join(ASSET_REPORT_FILE)
    }

    pub fn narration_path(&self) -> PathBuf {
        self.root.join("audio").join(NARRATION_FILE)
    }
}

/// Write `content`, creating parent directories
pub async fn write_text(path: &Path, content: &str) -> Result<(), ForgeError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    log::info!("Saved {} ({} bytes)", path.display(), content.len());
    Ok(())
}

/// Write `value` as pretty JSON, creating parent directories
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ForgeError> {
    let json = serde_json::to_string_pretty(value)?;
    write_text(path, &json).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(root: &Path) -> LayoutSettings {
        LayoutSettings {
            output_root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_sanitize_strips_and_truncates() {
        assert_eq!(sanitize("What is photosynthesis?", 30), "What_is_photosynthesis");
        assert_eq!(
            sanitize("Explain steam engines with relevant graphs and images.", 30),
            "Explain_steam_engines_with_rel"
        );
        assert_eq!(sanitize("  a/b\\c:d  ", 30), "abcd");
        assert_eq!(sanitize("x-ray   tubes", 30), "x-ray___tubes");
    }

    #[test]
    fn test_sanitize_counts_characters_not_bytes() {
        assert_eq!(sanitize("ćwiczenie z fizyki", 5), "ćwicz");
    }

    #[test]
    fn test_layout_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = TaskLayout::new(&settings(tmp.path()), "What is photosynthesis?");

        assert_eq!(layout.task_id(), "What_is_photosynthesis");
        assert_eq!(layout.root(), tmp.path().join("What_is_photosynthesis"));
        assert!(layout
            .primary_source()
            .ends_with("What_is_photosynthesis/latex/What_is_photosynthesis.tex"));
        assert!(layout
            .asset_path(AssetKind::Graph, 2)
            .ends_with("graphs/graph_2.png"));
        assert_eq!(
            layout.asset_url(AssetKind::Image, 0),
            "/artifacts/processed_files/What_is_photosynthesis/images/image_0.png"
        );
    }

    #[test]
    fn test_empty_topic_gets_fallback_id() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = TaskLayout::new(&settings(tmp.path()), "???");
        assert_eq!(layout.task_id(), "task");
    }

    #[tokio::test]
    async fn test_write_text_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a/b/c.md");
        write_text(&path, "# Title").await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# Title");
    }
}
