// SPDX-License-Identifier: MIT

//! Asset generation for the placeholders of one converted document

use super::manifest::{write_manifest, AssetRecord, AssetReport, AssetStatus};
use super::{remove_reference, resolve, AssetKind, Placeholder};
use crate::adk::error::ForgeError;
use crate::forge::assets::{AssetGenerator, ImageOutcome, ImageSearch};
use crate::forge::persist::{write_text, TaskLayout};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Final document and the fate of each of its placeholders
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub document: String,
    pub placeholders: Vec<Placeholder>,
    pub report: AssetReport,
    /// Generated assets keyed by `"{kind}_{index}"`
    pub media_assets: BTreeMap<String, String>,
    pub processed_path: PathBuf,
}

pub struct PlaceholderResolver {
    graphs: Arc<dyn AssetGenerator>,
    diagrams: Arc<dyn AssetGenerator>,
    images: Arc<dyn ImageSearch>,
    concurrency: usize,
}

impl PlaceholderResolver {
    pub fn new(
        graphs: Arc<dyn AssetGenerator>,
        diagrams: Arc<dyn AssetGenerator>,
        images: Arc<dyn ImageSearch>,
        concurrency: usize,
    ) -> Self {
        Self {
            graphs,
            diagrams,
            images,
            concurrency: concurrency.max(1),
        }
    }

    /// Rewrite directives, checkpoint, generate every asset, then roll back
    /// image references that found nothing
    pub async fn process(&self, markdown: &str, layout: &TaskLayout) -> Result<ResolvedDocument, ForgeError> {
        tokio::fs::create_dir_all(layout.root()).await?;

        let (mut document, placeholders) = resolve(markdown, layout);

        // Manifest and checkpoint land before any asset work starts
        write_manifest(layout, &placeholders).await?;
        write_text(&layout.processed_document_path(), &document).await?;

        let mut records: Vec<AssetRecord> = stream::iter(placeholders.clone())
            .map(|p| async move { self.generate_one(&p, layout).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        records.sort_by_key(|r| r.index);

        let mut media_assets = BTreeMap::new();
        for record in &records {
            let placeholder = &placeholders[record.index];
            match record.status {
                AssetStatus::Generated => {
                    if let Some(path) = &record.path {
                        media_assets.insert(record.kind.asset_key(record.index), path.clone());
                    }
                }
                AssetStatus::NoResults => {
                    log::error!("No image results found for placeholder {}", record.index);
                    document = remove_reference(&document, placeholder, layout);
                }
                AssetStatus::Failed => {
                    log::warn!(
                        "Asset {} ({}) failed: {}",
                        record.index,
                        record.kind,
                        record.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }

        let processed_path = layout.processed_document_path();
        write_text(&processed_path, &document).await?;

        let report = AssetReport::new(layout.task_id(), records);
        report.write(layout).await?;

        Ok(ResolvedDocument {
            document,
            placeholders,
            report,
            media_assets,
            processed_path,
        })
    }

    async fn generate_one(&self, placeholder: &Placeholder, layout: &TaskLayout) -> AssetRecord {
        let target = layout.asset_path(placeholder.kind, placeholder.index);
        let mut record = AssetRecord::new(placeholder, AssetStatus::Failed);

        match placeholder.kind {
            AssetKind::Graph | AssetKind::Diagram => {
                let generator = match placeholder.kind {
                    AssetKind::Graph => &self.graphs,
                    _ => &self.diagrams,
                };
                let outcome = generator
                    .generate(&placeholder.description, placeholder.index, &target)
                    .await;
                record.attempts = Some(outcome.attempts);
                if outcome.success {
                    record.status = AssetStatus::Generated;
                    record.path = Some(target.to_string_lossy().to_string());
                } else {
                    record.error = outcome.error.map(|e| e.to_string());
                }
            }
            AssetKind::Image => match self.images.fetch(&placeholder.description, &target).await {
                Ok(ImageOutcome::Saved(path)) => {
                    record.status = AssetStatus::Generated;
                    record.path = Some(path.to_string_lossy().to_string());
                }
                Ok(ImageOutcome::NoResults) => record.status = AssetStatus::NoResults,
                Err(e) => record.error = Some(e.to_string()),
            },
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::AssetError;
    use crate::forge::assets::GenerationOutcome;
    use crate::forge::config::LayoutSettings;
    use crate::forge::placeholder::manifest::read_manifest;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes the asset, or fails for the listed indices
    struct StubGenerator {
        fail: Vec<usize>,
        calls: AtomicUsize,
        manifest: PathBuf,
    }

    #[async_trait]
    impl AssetGenerator for StubGenerator {
        async fn generate(&self, _description: &str, index: usize, output_path: &Path) -> GenerationOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(self.manifest.exists(), "manifest must be written first");
            if self.fail.contains(&index) {
                return GenerationOutcome {
                    success: false,
                    attempts: 5,
                    retries: 5,
                    error: Some(AssetError::Timeout { secs: 15 }),
                };
            }
            tokio::fs::create_dir_all(output_path.parent().unwrap()).await.unwrap();
            tokio::fs::write(output_path, b"png").await.unwrap();
            GenerationOutcome {
                success: true,
                attempts: 1,
                retries: 0,
                error: None,
            }
        }
    }

    struct NoImages;

    #[async_trait]
    impl ImageSearch for NoImages {
        async fn fetch(&self, _description: &str, _target: &Path) -> Result<ImageOutcome, ForgeError> {
            Ok(ImageOutcome::NoResults)
        }
    }

    struct BrokenImages;

    #[async_trait]
    impl ImageSearch for BrokenImages {
        async fn fetch(&self, _description: &str, _target: &Path) -> Result<ImageOutcome, ForgeError> {
            Err(ForgeError::api("google_cse", "quota exceeded"))
        }
    }

    fn setup(root: &Path) -> TaskLayout {
        let settings = LayoutSettings {
            output_root: root.to_path_buf(),
            ..Default::default()
        };
        TaskLayout::new(&settings, "Steam engines")
    }

    fn stub(layout: &TaskLayout, fail: Vec<usize>) -> Arc<StubGenerator> {
        Arc::new(StubGenerator {
            fail,
            calls: AtomicUsize::new(0),
            manifest: layout.manifest_path(),
        })
    }

    const DOC: &str = "# Engines\n<graph: pressure curve>\n<image: locomotive photo>\n<graph: efficiency>\n<diagram: cycle>\n";

    #[tokio::test]
    async fn test_image_without_results_is_rolled_back() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = setup(tmp.path());
        let graphs = stub(&layout, vec![]);
        let diagrams = stub(&layout, vec![]);
        let resolver = PlaceholderResolver::new(graphs.clone(), diagrams.clone(), Arc::new(NoImages), 2);

        let resolved = resolver.process(DOC, &layout).await.unwrap();

        assert!(!resolved.document.contains("image_1.png"));
        assert!(resolved.document.contains("graph_0.png"));
        assert!(resolved.document.contains("graph_2.png"));
        assert!(resolved.document.contains("diagram_3.png"));
        assert_eq!(graphs.calls.load(Ordering::SeqCst), 2);
        assert_eq!(diagrams.calls.load(Ordering::SeqCst), 1);

        assert_eq!(resolved.media_assets.len(), 3);
        assert!(resolved.media_assets.contains_key("graph_2"));
        assert_eq!(resolved.report.count(AssetKind::Image, AssetStatus::NoResults), 1);

        let on_disk = std::fs::read_to_string(layout.processed_document_path()).unwrap();
        assert_eq!(on_disk, resolved.document);
        let manifest = read_manifest(&layout.manifest_path()).await.unwrap();
        assert_eq!(manifest.len(), 4);
        assert!(layout.asset_report_path().exists());
    }

    #[tokio::test]
    async fn test_failed_graph_is_reported_and_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = setup(tmp.path());
        let resolver = PlaceholderResolver::new(
            stub(&layout, vec![0]),
            stub(&layout, vec![]),
            Arc::new(NoImages),
            1,
        );

        let resolved = resolver.process(DOC, &layout).await.unwrap();

        let first = &resolved.report.records[0];
        assert_eq!(first.status, AssetStatus::Failed);
        assert_eq!(first.attempts, Some(5));
        assert!(first.error.as_deref().unwrap().contains("timed out"));
        assert!(resolved.document.contains("graph_0.png"));
        assert!(!resolved.media_assets.contains_key("graph_0"));
    }

    #[tokio::test]
    async fn test_image_service_error_does_not_abort() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = setup(tmp.path());
        let resolver = PlaceholderResolver::new(
            stub(&layout, vec![]),
            stub(&layout, vec![]),
            Arc::new(BrokenImages),
            2,
        );

        let resolved = resolver.process(DOC, &layout).await.unwrap();
        assert_eq!(resolved.report.records[1].status, AssetStatus::Failed);
        assert!(resolved.document.contains("image_1.png"));
    }

    #[tokio::test]
    async fn test_document_without_placeholders() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = setup(tmp.path());
        let resolver = PlaceholderResolver::new(
            stub(&layout, vec![]),
            stub(&layout, vec![]),
            Arc::new(NoImages),
            2,
        );

        let resolved = resolver.process("# Plain\ntext", &layout).await.unwrap();
        assert_eq!(resolved.document, "# Plain\ntext");
        assert!(resolved.report.records.is_empty());
        assert!(!layout.asset_dir(AssetKind::Graph).exists());
    }
}
