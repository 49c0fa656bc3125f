// Conversation memory checkpoints, one per session id

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::llm::ChatMessage;
use crate::models::SessionId;
use crate::redis_client::RedisClient;

/// Remembered messages per session. Older turns beyond this are forgotten.
pub const MEMORY_WINDOW: usize = 20;

#[async_trait]
pub trait SessionMemory: Send + Sync {
    async fn load(&self, session: SessionId) -> Result<Vec<ChatMessage>>;

    async fn append(&self, session: SessionId, messages: &[ChatMessage]) -> Result<()>;

    async fn clear(&self, session: SessionId) -> Result<()>;
}

fn trim_window(messages: &mut Vec<ChatMessage>) {
    if messages.len() > MEMORY_WINDOW {
        let excess = messages.len() - MEMORY_WINDOW;
        messages.drain(..excess);
    }
}

#[derive(Default)]
pub struct InMemorySessionMemory {
    sessions: Mutex<HashMap<SessionId, Vec<ChatMessage>>>,
}

impl InMemorySessionMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionMemory for InMemorySessionMemory {
    async fn load(&self, session: SessionId) -> Result<Vec<ChatMessage>> {
        Ok(self
            .sessions
            .lock()
            .await
            .get(&session)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, session: SessionId, messages: &[ChatMessage]) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let stored = sessions.entry(session).or_default();
        stored.extend_from_slice(messages);
        trim_window(stored);
        Ok(())
    }

    async fn clear(&self, session: SessionId) -> Result<()> {
        self.sessions.lock().await.remove(&session);
        Ok(())
    }
}

/// Checkpoints kept in Redis with a sliding expiry, so memory survives restarts.
pub struct RedisSessionMemory {
    client: RedisClient,
    ttl_secs: u64,
}

impl RedisSessionMemory {
    pub fn new(client: RedisClient, ttl_secs: u64) -> Self {
        Self { client, ttl_secs }
    }

    fn key(session: SessionId) -> String {
        format!("food-surgeon:memory:{session}")
    }
}

#[async_trait]
impl SessionMemory for RedisSessionMemory {
    async fn load(&self, session: SessionId) -> Result<Vec<ChatMessage>> {
        Ok(self
            .client
            .get::<Vec<ChatMessage>>(&Self::key(session))
            .await?
            .unwrap_or_default())
    }

    async fn append(&self, session: SessionId, messages: &[ChatMessage]) -> Result<()> {
        let mut stored = self.load(session).await?;
        stored.extend_from_slice(messages);
        trim_window(&mut stored);
        self.client
            .set_with_expiry(&Self::key(session), &stored, self.ttl_secs)
            .await
    }

    async fn clear(&self, session: SessionId) -> Result<()> {
        self.client.delete(&Self::key(session)).await
    }
}
