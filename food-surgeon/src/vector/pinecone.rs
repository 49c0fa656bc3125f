// Pinecone inference (embeddings) and index data plane (upsert/query)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use super::{EmbeddingProvider, IndexedVector, VectorIndex};
use crate::error::{upstream_error, ApiError, Result};
use crate::models::RetrievedDocument;

const PINECONE_EMBED_URL: &str = "https://api.pinecone.io/embed";
const PINECONE_API_VERSION: &str = "2024-10";

pub struct PineconeEmbeddings {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl PineconeEmbeddings {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn embed(&self, texts: &[String], input_type: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, input_type, batch_size = texts.len(), "embedding batch");

        let body = EmbedRequest {
            model: &self.model,
            parameters: json!({ "input_type": input_type, "truncate": "END" }),
            inputs: texts.iter().map(|text| EmbedInput { text: text.as_str() }).collect(),
        };

        let response = self
            .client
            .post(PINECONE_EMBED_URL)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "embedding request failed");
                embedding_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(upstream_error(response, embedding_error).await);
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| embedding_error(format!("failed to parse response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(embedding_error(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|d| d.values).collect())
    }
}

fn embedding_error(message: String) -> ApiError {
    ApiError::EmbeddingError {
        provider: "pinecone".into(),
        message,
    }
}

fn index_error(message: String) -> ApiError {
    ApiError::VectorIndexError {
        backend: "pinecone".into(),
        message,
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    parameters: Value,
    inputs: Vec<EmbedInput<'a>>,
}

#[derive(Serialize)]
struct EmbedInput<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for PineconeEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()], "query")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| embedding_error("API returned empty response".into()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed(texts, "passage").await
    }
}

pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    host: String,
    namespace: Option<String>,
}

impl PineconeIndex {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        host: impl Into<String>,
        namespace: Option<String>,
    ) -> Self {
        let host = host.into();
        let host = if host.starts_with("http") {
            host
        } else {
            format!("https://{host}")
        };
        Self {
            client,
            api_key: api_key.into(),
            host: host.trim_end_matches('/').to_string(),
            namespace,
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, path, "vector index request failed");
                index_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(upstream_error(response, index_error).await);
        }
        Ok(response)
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Value>,
}

impl From<QueryMatch> for RetrievedDocument {
    fn from(m: QueryMatch) -> Self {
        let metadata = m.metadata.unwrap_or(Value::Null);
        let id = metadata["id"]
            .as_str()
            .map(str::to_string)
            .unwrap_or(m.id);
        let content = metadata["text"].as_str().unwrap_or_default().to_string();
        RetrievedDocument {
            id,
            content,
            score: m.score,
        }
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, vectors: &[IndexedVector]) -> Result<()> {
        if vectors.is_empty() {
            return Ok(());
        }
        debug!(count = vectors.len(), "upserting vectors");

        let body = UpsertRequest {
            vectors: vectors
                .iter()
                .map(|v| UpsertVector {
                    id: &v.id,
                    values: &v.values,
                    metadata: json!({ "id": v.id, "text": v.text }),
                })
                .collect(),
            namespace: self.namespace.as_deref(),
        };
        self.post("/vectors/upsert", &body).await?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<RetrievedDocument>> {
        let body = QueryRequest {
            vector: embedding,
            top_k,
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };
        let response: QueryResponse = self
            .post("/query", &body)
            .await?
            .json()
            .await
            .map_err(|e| index_error(format!("failed to parse response: {e}")))?;

        Ok(response.matches.into_iter().map(RetrievedDocument::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_prefers_metadata_id() {
        let m: QueryMatch = serde_json::from_value(json!({
            "id": "vec-17",
            "score": 0.83,
            "metadata": {"id": "mlyntsi", "text": "name: Млинці"}
        }))
        .unwrap();
        let doc = RetrievedDocument::from(m);

        assert_eq!(doc.id, "mlyntsi");
        assert_eq!(doc.content, "name: Млинці");
        assert!((doc.score - 0.83).abs() < 1e-6);
    }

    #[test]
    fn test_match_without_metadata_falls_back_to_vector_id() {
        let m: QueryMatch = serde_json::from_value(json!({"id": "borshch"})).unwrap();
        let doc = RetrievedDocument::from(m);

        assert_eq!(doc.id, "borshch");
        assert!(doc.content.is_empty());
    }

    #[test]
    fn test_query_request_uses_camel_case() {
        let body = QueryRequest {
            vector: &[0.1, 0.2],
            top_k: 4,
            include_metadata: true,
            namespace: None,
        };
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["topK"], 4);
        assert_eq!(value["includeMetadata"], true);
        assert!(value.get("namespace").is_none());
    }

    #[test]
    fn test_index_host_gets_scheme() {
        let index = PineconeIndex::new(reqwest::Client::new(), "k", "dishes-abc.svc.pinecone.io/", None);
        assert_eq!(index.host, "https://dishes-abc.svc.pinecone.io");
    }
}
