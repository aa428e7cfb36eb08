// SPDX-License-Identifier: MIT

//! Placeholder protocol
//!
//! Converted documents carry inline directives such as `<graph: sine wave>`.
//! `resolve` numbers them in order of appearance and rewrites each one to an
//! image reference pointing at the asset's deterministic path. The
//! `PlaceholderResolver` then generates the assets and rolls back references
//! whose image search found nothing.

pub mod manifest;
pub mod resolver;

use crate::forge::persist::{sanitize, TaskLayout};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

pub use manifest::{AssetRecord, AssetReport, AssetStatus};
pub use resolver::{PlaceholderResolver, ResolvedDocument};

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*(graph|image|diagram|mermaid)\s*:\s*([^>]+?)\s*>")
        .expect("Failed to compile placeholder regex")
});

/// Alt text is sanitized like a directory name
const ALT_TEXT_LEN: usize = 30;

/// Kind of auxiliary asset a directive asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Graph,
    Image,
    Diagram,
}

impl AssetKind {
    /// Parse a directive marker; `mermaid` is an alias for diagram
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker.to_ascii_lowercase().as_str() {
            "graph" => Some(AssetKind::Graph),
            "image" => Some(AssetKind::Image),
            "diagram" | "mermaid" => Some(AssetKind::Diagram),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Graph => "graph",
            AssetKind::Image => "image",
            AssetKind::Diagram => "diagram",
        }
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            AssetKind::Graph => "graphs",
            AssetKind::Image => "images",
            AssetKind::Diagram => "diagrams",
        }
    }

    pub fn file_name(&self, index: usize) -> String {
        format!("{}_{}.png", self.as_str(), index)
    }

    /// Key under which a generated asset is recorded in `media_assets`
    pub fn asset_key(&self, index: usize) -> String {
        format!("{}_{}", self.as_str(), index)
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An extracted directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub kind: AssetKind,
    /// 0-based position in order of appearance
    pub index: usize,
    pub description: String,
}

/// Reference text substituted for a placeholder
pub fn reference(placeholder: &Placeholder, layout: &TaskLayout) -> String {
    format!(
        "![{}]({})\n",
        sanitize(&placeholder.description, ALT_TEXT_LEN),
        layout.asset_url(placeholder.kind, placeholder.index)
    )
}

/// Rewrite every directive in one left-to-right pass
pub fn resolve(document: &str, layout: &TaskLayout) -> (String, Vec<Placeholder>) {
    let mut placeholders = Vec::new();

    let rewritten = DIRECTIVE.replace_all(document, |caps: &Captures| {
        let Some(kind) = AssetKind::from_marker(&caps[1]) else {
            return caps[0].to_string();
        };
        let placeholder = Placeholder {
            kind,
            index: placeholders.len(),
            description: caps[2].trim().to_string(),
        };
        let text = reference(&placeholder, layout);
        placeholders.push(placeholder);
        text
    });

    log::info!("{} placeholders found", placeholders.len());
    (rewritten.into_owned(), placeholders)
}

/// Compensating edit: drop the reference of one placeholder
pub fn remove_reference(document: &str, placeholder: &Placeholder, layout: &TaskLayout) -> String {
    document.replacen(&reference(placeholder, layout), "", 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::config::LayoutSettings;

    fn layout() -> TaskLayout {
        TaskLayout::new(&LayoutSettings::default(), "Steam engines")
    }

    const DOC: &str = "# Steam\nIntro <graph: pressure vs volume> then\n<IMAGE : a locomotive>\n\
and < mermaid: boiler to piston > plus <graph:efficiency curve>.";

    #[test]
    fn test_indices_dense_in_appearance_order() {
        let (_, placeholders) = resolve(DOC, &layout());
        let indices: Vec<_> = placeholders.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);

        let kinds: Vec<_> = placeholders.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AssetKind::Graph,
                AssetKind::Image,
                AssetKind::Diagram,
                AssetKind::Graph
            ]
        );
        assert_eq!(placeholders[1].description, "a locomotive");
    }

    #[test]
    fn test_rewrite_uses_asset_urls() {
        let (doc, _) = resolve(DOC, &layout());
        assert!(doc.contains(
            "![pressure_vs_volume](/artifacts/processed_files/Steam_engines/graphs/graph_0.png)\n"
        ));
        assert!(doc.contains("/Steam_engines/images/image_1.png"));
        assert!(doc.contains("/Steam_engines/diagrams/diagram_2.png"));
        assert!(doc.contains("/Steam_engines/graphs/graph_3.png"));
    }

    #[test]
    fn test_rewritten_document_has_no_directives() {
        let (doc, _) = resolve(DOC, &layout());
        let (again, placeholders) = resolve(&doc, &layout());
        assert!(placeholders.is_empty());
        assert_eq!(again, doc);
    }

    #[test]
    fn test_duplicate_directives_get_distinct_indices() {
        let (doc, placeholders) = resolve("<graph: x> <graph: x>", &layout());
        assert_eq!(placeholders.len(), 2);
        assert!(doc.contains("graph_0.png"));
        assert!(doc.contains("graph_1.png"));
    }

    #[test]
    fn test_remove_reference_only_touches_one() {
        let layout = layout();
        let (doc, placeholders) = resolve(DOC, &layout);
        let rolled_back = remove_reference(&doc, &placeholders[1], &layout);

        assert!(!rolled_back.contains("image_1.png"));
        assert!(rolled_back.contains("graph_0.png"));
        assert!(rolled_back.contains("diagram_2.png"));
        assert!(rolled_back.contains("graph_3.png"));
    }

    #[test]
    fn test_unknown_marker_left_alone() {
        let (doc, placeholders) = resolve("<video: nope> <b>bold</b>", &layout());
        assert!(placeholders.is_empty());
        assert_eq!(doc, "<video: nope> <b>bold</b>");
    }
}
