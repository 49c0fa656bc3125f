pub mod dish_agent;
pub mod memory;
pub mod rag;
pub mod retriever;
pub mod structurer;

use tracing::info;

use crate::error::Result;
use crate::llm::ChatMessage;
use crate::models::SessionId;

use dish_agent::DishAgent;
use rag::RecipeRag;
use structurer::StructuredReply;

/// What answers a user turn: the fixed RAG chain or the tool-using agent.
pub enum Assistant {
    Pipeline {
        rag: RecipeRag,
        include_history: bool,
    },
    Agent(DishAgent),
}

impl Assistant {
    pub async fn answer(
        &self,
        session: SessionId,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<StructuredReply> {
        match self {
            Assistant::Pipeline {
                rag,
                include_history,
            } => {
                let history = if *include_history { history } else { &[] };
                rag.invoke(prompt, history).await
            }
            Assistant::Agent(agent) => agent.run(session, prompt).await,
        }
    }

    /// Drops whatever the assistant remembers about `session`.
    pub async fn forget(&self, session: SessionId) -> Result<()> {
        match self {
            Assistant::Pipeline { .. } => Ok(()),
            Assistant::Agent(agent) => {
                info!(%session, "Agent: clearing session memory");
                agent.forget(session).await
            }
        }
    }
}
