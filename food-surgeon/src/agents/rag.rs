// Recipe RAG chain: retrieve -> format context -> structure

use std::sync::Arc;

use tracing::{info, warn};

use super::retriever::{format_docs, RetrieverAgent};
use super::structurer::{StructuredReply, StructuredResponder};
use crate::error::Result;
use crate::llm::ChatMessage;

pub struct RecipeRag {
    retriever: RetrieverAgent,
    responder: Arc<dyn StructuredResponder>,
}

impl RecipeRag {
    pub fn new(retriever: RetrieverAgent, responder: Arc<dyn StructuredResponder>) -> Self {
        Self {
            retriever,
            responder,
        }
    }

    pub async fn invoke(&self, query: &str, history: &[ChatMessage]) -> Result<StructuredReply> {
        let documents = self.retriever.retrieve(query, history).await?;
        if documents.is_empty() {
            info!(query, "RAG: nothing retrieved, skipping the model");
            return Ok(StructuredReply::empty());
        }

        let context = format_docs(&documents);
        let known: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        let reply = self
            .responder
            .respond(query, &context, history)
            .await?
            .retain_known(&known);

        match &reply {
            StructuredReply::Dishes(list) => {
                info!(outcome = reply.outcome(), dishes = list.len(), "RAG: structured reply ready")
            }
            StructuredReply::Unstructured(_) => {
                info!(outcome = reply.outcome(), "RAG: model returned unstructured text")
            }
            StructuredReply::Unverified { discarded } => {
                warn!(outcome = reply.outcome(), discarded, "RAG: no dish matched the context")
            }
        }
        Ok(reply)
    }
}
