// SPDX-License-Identifier: MIT

//! Records carried inside workflow state

use serde::{Deserialize, Serialize};

/// One entry of the append-only history log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request classification produced by the router
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RouteType {
    /// Plain question, all outputs
    #[serde(rename = "type_1", alias = "general")]
    General,
    /// User asked for particular formats only
    #[serde(rename = "type_2", alias = "specific_formats")]
    SpecificFormats,
    /// Answer must be grounded in the supplied document
    #[serde(rename = "type_3", alias = "document_grounded")]
    DocumentGrounded,
}

/// Deliverables a request may ask for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Text,
    Audio,
    Image,
    Video,
    Diagram,
}

impl OutputKind {
    pub const ALL: [OutputKind; 5] = [
        OutputKind::Text,
        OutputKind::Audio,
        OutputKind::Image,
        OutputKind::Video,
        OutputKind::Diagram,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteDecision {
    pub route_type: RouteType,
    pub required_outputs: Vec<OutputKind>,
}

impl RouteDecision {
    /// Used when the classifier reply cannot be understood
    pub fn fallback() -> Self {
        Self {
            route_type: RouteType::General,
            required_outputs: OutputKind::ALL.to_vec(),
        }
    }

    pub fn wants(&self, kind: OutputKind) -> bool {
        self.required_outputs.contains(&kind)
    }
}
