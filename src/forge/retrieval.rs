// SPDX-License-Identifier: MIT

//! Retrieval of document context for a query
//!
//! The corpus handle is a path to a text file or, when no such file exists,
//! the document text itself. It is split into overlapping chunks, ranked by
//! query-term overlap, and the best chunks are condensed by an agent.

use crate::adk::agent::{Agent, LLMAgent};
use crate::adk::error::ForgeError;
use crate::adk::model::Model;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;
pub const TOP_K: usize = 4;

const CONDENSER_INSTRUCTION: &str = "You are a retrieval assistant. Using only the excerpts \
provided, write a condensed summary of everything relevant to the user's query. Do not add \
facts that are not in the excerpts.";

/// Condenses a corpus into context for a query
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, corpus: &str) -> Result<String, ForgeError>;
}

/// Split into windows of `size` characters that overlap by `overlap`
pub fn chunk(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

/// Indices of the `k` chunks sharing the most terms with `query`, in
/// document order
pub fn rank(query: &str, chunks: &[String], k: usize) -> Vec<usize> {
    let wanted = terms(query);
    let mut scored: Vec<(usize, usize)> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (i, terms(c).intersection(&wanted).count()))
        .collect();
    // Stable: ties keep document order
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let mut picked: Vec<usize> = scored.into_iter().take(k).map(|(i, _)| i).collect();
    picked.sort_unstable();
    picked
}

pub struct ChunkRetriever {
    condenser: Arc<dyn Agent>,
    chunk_size: usize,
    overlap: usize,
    top_k: usize,
}

impl ChunkRetriever {
    pub fn new(condenser: Arc<dyn Agent>) -> Self {
        Self {
            condenser,
            chunk_size: CHUNK_SIZE,
            overlap: CHUNK_OVERLAP,
            top_k: TOP_K,
        }
    }

    pub fn from_model(model: Arc<dyn Model>) -> Self {
        Self::new(Arc::new(LLMAgent::new("retriever", CONDENSER_INSTRUCTION, model)))
    }

    async fn load(corpus: &str) -> Result<String, ForgeError> {
        let path = Path::new(corpus);
        // Long inline documents are not paths
        if corpus.len() < 4096 && !corpus.contains('\n') && tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false) {
            log::info!("Loading corpus from {}", path.display());
            let bytes = tokio::fs::read(path).await?;
            return Ok(String::from_utf8_lossy(&bytes).to_string());
        }
        Ok(corpus.to_string())
    }
}

#[async_trait]
impl Retriever for ChunkRetriever {
    async fn retrieve(&self, query: &str, corpus: &str) -> Result<String, ForgeError> {
        let text = Self::load(corpus).await?;
        let chunks = chunk(&text, self.chunk_size, self.overlap);
        if chunks.is_empty() {
            return Ok(String::new());
        }

        let picked = rank(query, &chunks, self.top_k);
        log::info!("Retrieved {} of {} chunks for '{}'", picked.len(), chunks.len(), query);

        let excerpts = picked
            .iter()
            .enumerate()
            .map(|(n, &i)| format!("[{}] {}", n + 1, chunks[i]))
            .collect::<Vec<_>>()
            .join("\n\n");

        self.condenser
            .run(format!("Query: {}\n\nExcerpts:\n{}", query, excerpts))
            .await
    }
}
