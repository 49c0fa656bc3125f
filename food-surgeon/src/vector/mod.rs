// Vector search: embedding provider and index seams, plus an in-process index

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::RetrievedDocument;

pub mod pinecone;

pub use pinecone::{PineconeEmbeddings, PineconeIndex};

/// Generates vector embeddings from text.
///
/// Queries and stored passages are embedded with different input types, which
/// asymmetric models such as `multilingual-e5-large` require.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// One dish text and its embedding, ready to be upserted.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub id: String,
    pub values: Vec<f32>,
    pub text: String,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, vectors: &[IndexedVector]) -> Result<()>;

    /// Nearest neighbors of `embedding`, best first.
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<RetrievedDocument>>;
}

/// Cosine similarity; 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    vectors: RwLock<HashMap<String, IndexedVector>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, vectors: &[IndexedVector]) -> Result<()> {
        let mut stored = self.vectors.write().await;
        for vector in vectors {
            stored.insert(vector.id.clone(), vector.clone());
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<RetrievedDocument>> {
        let stored = self.vectors.read().await;
        let mut scored: Vec<RetrievedDocument> = stored
            .values()
            .map(|v| RetrievedDocument {
                id: v.id.clone(),
                content: v.text.clone(),
                score: cosine_similarity(&v.values, embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}
