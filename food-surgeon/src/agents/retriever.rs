// Retriever: embeds the query, finds the nearest dishes and builds the context block

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::llm::{ChatMessage, ChatRole};
use crate::models::RetrievedDocument;
use crate::vector::{EmbeddingProvider, VectorIndex};

/// Number of earlier user turns folded into the search text.
const HISTORY_TURNS: usize = 2;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_score: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_score: None,
        }
    }
}

#[derive(Clone)]
pub struct RetrieverAgent {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl RetrieverAgent {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        history: &[ChatMessage],
    ) -> Result<Vec<RetrievedDocument>> {
        let search_text = search_text(query, history);
        info!(query, top_k = self.config.top_k, "Retriever: searching dishes");

        let embedding = self.embedder.embed_query(&search_text).await?;
        let hits = self.index.query(&embedding, self.config.top_k).await?;

        let mut seen = HashSet::new();
        let documents: Vec<RetrievedDocument> = hits
            .into_iter()
            .filter(|doc| self.config.min_score.map_or(true, |min| doc.score >= min))
            .filter(|doc| seen.insert(doc.id.clone()))
            .collect();

        info!(
            retrieved = documents.len(),
            ids = ?documents.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            "Retriever: done"
        );
        Ok(documents)
    }
}

/// Query text prefixed by the most recent earlier user turns, oldest first.
fn search_text(query: &str, history: &[ChatMessage]) -> String {
    let mut turns: Vec<&str> = history
        .iter()
        .rev()
        .filter(|m| m.role == ChatRole::User)
        .map(|m| m.text_content())
        .filter(|text| !text.trim().is_empty() && *text != query)
        .take(HISTORY_TURNS)
        .collect();
    turns.reverse();
    turns.push(query);
    turns.join("\n")
}

/// Renders documents as `id: <id>\n<content>` blocks separated by blank lines.
pub fn format_docs(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .map(|doc| format!("id: {}\n{}", doc.id, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
