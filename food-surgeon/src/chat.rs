// Chat: per-session transcript, greeting, cached catalog and tabs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::structurer::StructuredReply;
use crate::agents::Assistant;
use crate::error::{ApiError, Result};
use crate::llm::ChatMessage;
use crate::models::{ConversationMessage, DishCard, DishRecord, DishTab, Role, SessionId};

pub const GREETING: &str = "Привіт! Я допоможу тобі з готовкою";
pub const NOT_FOUND: &str = "Вибач, не можу знайти рецепт";
pub const INPUT_HINT: &str = "Що хочеш приготувати?";
pub const DISHES_PER_ROW: usize = 3;

/// Groups dishes by type. Titles are sorted; each tab keeps catalog order.
pub fn group_by_type(dishes: &[DishRecord]) -> Vec<DishTab> {
    let mut groups: BTreeMap<&str, Vec<DishCard>> = BTreeMap::new();
    for dish in dishes {
        if let Some(kind) = dish.kind.as_deref() {
            groups.entry(kind).or_default().push(DishCard::from(dish));
        }
    }

    groups
        .into_iter()
        .map(|(title, dishes)| DishTab {
            title: title.to_string(),
            rows: dishes.chunks(DISHES_PER_ROW).map(<[DishCard]>::to_vec).collect(),
            dishes,
        })
        .collect()
}

/// Assistant messages for one structured reply. Dishes missing from the
/// session's catalog are dropped.
pub fn replies_for(reply: StructuredReply, catalog: &[DishRecord]) -> Vec<ConversationMessage> {
    match reply {
        StructuredReply::Dishes(list) if !list.is_empty() => {
            let messages: Vec<ConversationMessage> = list
                .dishes
                .into_iter()
                .filter_map(|dish| {
                    let Some(record) = catalog.iter().find(|r| r.id == dish.id) else {
                        warn!(dish_id = %dish.id, "dish is not in the session catalog");
                        return None;
                    };
                    Some(ConversationMessage::assistant_dish(DishCard::from_dish(
                        dish,
                        Some(record),
                    )))
                })
                .collect();
            if messages.is_empty() {
                vec![ConversationMessage::assistant(NOT_FOUND)]
            } else {
                messages
            }
        }
        StructuredReply::Dishes(_) | StructuredReply::Unverified { .. } => {
            vec![ConversationMessage::assistant(NOT_FOUND)]
        }
        StructuredReply::Unstructured(text) if !text.trim().is_empty() => {
            vec![ConversationMessage::assistant(text)]
        }
        StructuredReply::Unstructured(_) => {
            info!("model returned no object and no text");
            vec![ConversationMessage::assistant(NOT_FOUND)]
        }
    }
}

/// The assistant messages of one user turn and how the turn resolved.
#[derive(Debug)]
pub struct Turn {
    pub outcome: &'static str,
    pub messages: Vec<ConversationMessage>,
}

pub struct ChatSession {
    pub id: SessionId,
    pub messages: Vec<ConversationMessage>,
    pub greeted: bool,
    pub catalog: Vec<DishRecord>,
    last_active: Instant,
}

impl ChatSession {
    pub fn new(id: SessionId, catalog: Vec<DishRecord>) -> Self {
        Self {
            id,
            messages: Vec::new(),
            greeted: false,
            catalog,
            last_active: Instant::now(),
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    pub fn ensure_greeting(&mut self) {
        if !self.greeted {
            self.messages.push(ConversationMessage::assistant(GREETING));
            self.greeted = true;
        }
    }

    pub fn tabs(&self) -> Vec<DishTab> {
        group_by_type(&self.catalog)
    }

    pub fn reset(&mut self, catalog: Vec<DishRecord>) {
        self.last_active = Instant::now();
        self.messages.clear();
        self.greeted = false;
        self.catalog = catalog;
        self.ensure_greeting();
    }

    /// The transcript as model chat history (text turns only).
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter_map(|m| {
                let text = m.content.as_deref()?;
                Some(match m.role {
                    Role::User => ChatMessage::user(text),
                    Role::Assistant => ChatMessage::assistant(text),
                })
            })
            .collect()
    }

    /// Runs one user turn and returns the assistant messages it appended.
    ///
    /// The user message stays in the transcript even when the assistant fails.
    pub async fn submit(
        &mut self,
        prompt: &str,
        assistant: &Assistant,
    ) -> Result<Turn> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ApiError::BadRequest("message must not be empty".into()));
        }

        self.last_active = Instant::now();
        self.ensure_greeting();
        let history = self.history();
        self.messages.push(ConversationMessage::user(prompt));

        let reply = assistant.answer(self.id, prompt, &history).await?;
        let outcome = reply.outcome();
        info!(session = %self.id, outcome, "chat turn answered");

        let messages = replies_for(reply, &self.catalog);
        self.messages.extend(messages.iter().cloned());
        Ok(Turn { outcome, messages })
    }
}

/// Live sessions. Each session is locked for the duration of a turn.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<ChatSession>>>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_ttl,
        }
    }

    /// Drops sessions idle for longer than the TTL and returns their ids.
    /// A session whose lock is held is mid-turn and is kept.
    pub async fn sweep_idle(&self) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, session)| {
                session
                    .try_lock()
                    .map_or(false, |s| s.idle_for() >= self.idle_ttl)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            info!(expired = expired.len(), live = sessions.len(), "idle sessions dropped");
        }
        expired
    }

    pub async fn create(&self, catalog: Vec<DishRecord>) -> Arc<Mutex<ChatSession>> {
        let id = Uuid::new_v4();
        let mut session = ChatSession::new(id, catalog);
        session.ensure_greeting();
        let session = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, session.clone());
        info!(%id, "session created");
        session
    }

    pub async fn get(&self, id: SessionId) -> Result<Arc<Mutex<ChatSession>>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("session {id}")))
    }

    /// Waits for the session's lock. Fails if the session was removed while waiting.
    pub async fn lock(&self, id: SessionId) -> Result<OwnedMutexGuard<ChatSession>> {
        let session = self.get(id).await?.lock_owned().await;
        if !self.sessions.read().await.contains_key(&id) {
            return Err(ApiError::NotFound(format!("session {id}")));
        }
        Ok(session)
    }

    pub async fn remove(&self, id: SessionId) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| info!(%id, "session ended"))
            .ok_or_else(|| ApiError::NotFound(format!("session {id}")))
    }
}
