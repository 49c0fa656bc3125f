// Dish Agent: lets the model decide when to search, with memory per session

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::memory::SessionMemory;
use super::retriever::{format_docs, RetrieverAgent};
use super::structurer::{format_instructions, parse_structured_text, StructuredReply};
use crate::error::{ApiError, Result};
use crate::llm::{ChatMessage, ChatModel, CompletionRequest, ToolCall, ToolSpec};
use crate::models::SessionId;

pub const SEARCH_TOOL: &str = "search_dishes";

const NOTHING_FOUND: &str = "У базі немає страв за цим запитом.";

pub const AGENT_PROMPT: &str = r#"You are Food Surgeon, a cooking assistant. Always answer in Ukrainian.

Guidelines:
- Always call the search_dishes tool before answering a question about a dish, even if you think you know the recipe
- Use earlier turns of the conversation to understand follow-up questions
- Answer only with dishes the tool returned, keeping their ids
- If the tool returns nothing relevant, return an empty list of dishes
- Always rephrase and enrich the description; put your own opinion of the recipe in "comments""#;

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

pub struct DishAgent {
    model: Arc<dyn ChatModel>,
    retriever: RetrieverAgent,
    memory: Arc<dyn SessionMemory>,
    max_steps: usize,
}

impl DishAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        retriever: RetrieverAgent,
        memory: Arc<dyn SessionMemory>,
        max_steps: usize,
    ) -> Self {
        Self {
            model,
            retriever,
            memory,
            max_steps,
        }
    }

    pub fn search_tool() -> ToolSpec {
        ToolSpec {
            name: SEARCH_TOOL.into(),
            description: "Retrieve dish recipes from the database.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "What to search for, e.g. a dish name or ingredients"}
                },
                "required": ["query"]
            }),
        }
    }

    pub async fn forget(&self, session: SessionId) -> Result<()> {
        self.memory.clear(session).await
    }

    /// One user turn: loops model calls and tool executions until the model answers.
    pub async fn run(&self, session: SessionId, prompt: &str) -> Result<StructuredReply> {
        let remembered = self.memory.load(session).await?;
        info!(%session, remembered = remembered.len(), "Agent: new turn");

        let mut messages = Vec::with_capacity(remembered.len() + 2);
        messages.push(ChatMessage::system(format!(
            "{AGENT_PROMPT}\n\n{}",
            format_instructions()
        )));
        messages.extend(remembered);
        messages.push(ChatMessage::user(prompt));

        // Ids of every document the search tool returned this turn.
        let mut retrieved: Vec<String> = Vec::new();

        for step in 1..=self.max_steps {
            let request =
                CompletionRequest::new(messages.clone()).with_tools(vec![Self::search_tool()]);
            let reply = self.model.complete(request).await?;

            if reply.tool_calls.is_empty() {
                let answer = reply.text_content().to_string();
                info!(%session, step, "Agent: final answer");
                self.memory
                    .append(
                        session,
                        &[ChatMessage::user(prompt), ChatMessage::assistant(answer.clone())],
                    )
                    .await?;
                let known: Vec<&str> = retrieved.iter().map(String::as_str).collect();
                return Ok(parse_structured_text(&answer).retain_known(&known));
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in &calls {
                let output = self.execute(call, &mut retrieved).await?;
                messages.push(ChatMessage::tool_result(call.id.clone(), output));
            }
        }

        warn!(%session, max_steps = self.max_steps, "Agent: step limit reached");
        Err(ApiError::ModelError {
            provider: "agent".into(),
            message: format!("no final answer after {} steps", self.max_steps),
        })
    }

    async fn execute(&self, call: &ToolCall, retrieved: &mut Vec<String>) -> Result<String> {
        if call.function.name != SEARCH_TOOL {
            warn!(tool = %call.function.name, "Agent: unknown tool requested");
            return Ok(format!("Unknown tool: {}", call.function.name));
        }

        let args: SearchArgs = match serde_json::from_str(&call.function.arguments) {
            Ok(args) => args,
            Err(e) => return Ok(format!("Invalid arguments for {SEARCH_TOOL}: {e}")),
        };
        info!(query = %args.query, "Agent: searching dishes");

        let documents = self.retriever.retrieve(&args.query, &[]).await?;
        if documents.is_empty() {
            return Ok(NOTHING_FOUND.to_string());
        }
        retrieved.extend(documents.iter().map(|d| d.id.clone()));
        Ok(format_docs(&documents))
    }
}
