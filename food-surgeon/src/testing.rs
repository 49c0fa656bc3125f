// In-process stand-ins for the store, embedding model, vector index and chat model

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agents::retriever::{RetrievalConfig, RetrieverAgent};
use crate::error::{ApiError, Result};
use crate::ingest::index_dishes;
use crate::llm::{ChatMessage, ChatModel, ChatRole, CompletionRequest, ToolCall};
use crate::models::{Dish, DishList, DishRecord};
use crate::store::DocumentStore;
use crate::vector::{EmbeddingProvider, InMemoryVectorIndex};

pub fn sample_catalog_value() -> Value {
    json!({
        "borshch": {
            "name": "Борщ",
            "type": "Суп",
            "ingredients": "буряк, капуста, картопля, морква",
            "description": "Зварити бульйон, додати овочі та томлений буряк.",
            "src": "https://img.example/borshch.jpg"
        },
        "mlyntsi": {
            "name": "Млинці",
            "type": "Сніданок",
            "ingredients": "борошно, молоко, яйця, цукор",
            "description": "Замісити рідке тісто і смажити тонкі млинці на сковороді.",
            "src": "https://img.example/mlyntsi.jpg"
        },
        "olivier": {
            "name": "Олів'є",
            "type": "Салат",
            "ingredients": "картопля, морква, горошок, ковбаса, майонез",
            "description": "Відварити овочі, нарізати кубиками, заправити майонезом."
        },
        "syrnyky": {
            "name": "Сирники",
            "type": "Сніданок",
            "ingredients": "сир, яйце, борошно, цукор",
            "description": "Сформувати сирники і обсмажити з двох боків."
        }
    })
}

/// The sample catalog as records, sorted by id.
pub fn sample_catalog() -> Vec<DishRecord> {
    let Value::Object(map) = sample_catalog_value() else {
        unreachable!("sample catalog is an object")
    };
    let mut dishes: Vec<DishRecord> = map
        .into_iter()
        .map(|(id, raw)| {
            let mut record: DishRecord = serde_json::from_value(raw).unwrap();
            record.id = id;
            record
        })
        .collect();
    dishes.sort_by(|a, b| a.id.cmp(&b.id));
    dishes
}

/// A retriever over the sample catalog, fully indexed.
pub async fn indexed_catalog(config: RetrievalConfig) -> RetrieverAgent {
    let embedder = Arc::new(HashEmbedder::default());
    let index = Arc::new(InMemoryVectorIndex::new());
    index_dishes(&sample_catalog(), embedder.as_ref(), index.as_ref())
        .await
        .unwrap();
    RetrieverAgent::new(embedder, index, config)
}

/// JSON tree addressed by slash-separated paths.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    root: Mutex<Value>,
}

impl InMemoryDocumentStore {
    pub fn with_value(path: &str, value: Value) -> Self {
        let store = Self::default();
        store.write(path, value);
        store
    }

    fn write(&self, path: &str, value: Value) {
        let mut root = self.root.lock().unwrap();
        let mut node = &mut *root;
        for segment in segments(path) {
            if !node.is_object() {
                *node = json!({});
            }
            node = node
                .as_object_mut()
                .unwrap()
                .entry(segment.to_string())
                .or_insert(Value::Null);
        }
        *node = value;
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Value> {
        let root = self.root.lock().unwrap();
        let mut node = &*root;
        for segment in segments(path) {
            match node.get(segment) {
                Some(child) => node = child,
                None => return Ok(Value::Null),
            }
        }
        Ok(node.clone())
    }

    async fn set(&self, path: &str, value: &Value) -> Result<()> {
        self.write(path, value.clone());
        Ok(())
    }
}

/// Word features: lowercase alphanumeric words of 3+ chars, cut to a 4-char stem.
pub fn stems(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 3)
        .map(|word| word.to_lowercase().chars().take(4).collect())
        .collect()
}

/// Deterministic bag-of-stems embedding hashed into a fixed number of buckets.
pub struct HashEmbedder {
    dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimensions: 4096 }
    }
}

impl HashEmbedder {
    fn vector(&self, text: &str) -> Vec<f32> {
        let mut values = vec![0.0; self.dimensions];
        for stem in stems(text) {
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in stem.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            values[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        values
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<ChatMessage> + Send + Sync>;

/// Chat model driven by a closure; records every request it receives.
pub struct FakeChatModel {
    respond: Responder,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeChatModel {
    pub fn new(
        respond: impl Fn(&CompletionRequest) -> Result<ChatMessage> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies in order; fails once the script runs out.
    pub fn scripted(replies: Vec<ChatMessage>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            queue.lock().unwrap().pop_front().ok_or_else(|| ApiError::ModelError {
                provider: "fake".into(),
                message: "script exhausted".into(),
            })
        })
    }

    pub fn failing(message: &'static str) -> Self {
        Self::new(move |_| {
            Err(ApiError::ModelError {
                provider: "fake".into(),
                message: message.into(),
            })
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    async fn complete(&self, request: CompletionRequest) -> Result<ChatMessage> {
        let reply = (self.respond)(&request);
        self.requests.lock().unwrap().push(request);
        reply
    }
}

/// Parses `id: ...` blocks back out of a context string.
pub fn context_blocks(context: &str) -> Vec<(String, String)> {
    context
        .split("\n\n")
        .filter_map(|block| {
            let (head, body) = block.split_once('\n').unwrap_or((block, ""));
            head.strip_prefix("id: ")
                .map(|id| (id.to_string(), body.to_string()))
        })
        .collect()
}

/// The dishes a reasonable model would pick: context blocks sharing a word stem with the query.
pub fn relevant_dishes(context: &str, query: &str) -> DishList {
    let wanted = stems(query);
    let dishes = context_blocks(context)
        .into_iter()
        .filter(|(_, body)| !stems(body).is_disjoint(&wanted))
        .map(|(id, body)| {
            let field = |name: &str| {
                body.lines()
                    .find_map(|line| line.strip_prefix(&format!("{name}: ")).map(str::to_string))
                    .unwrap_or_default()
            };
            Dish {
                id,
                name: field("name"),
                kind: field("type"),
                ingredients: field("ingredients"),
                description: format!("Покроково: {}", field("description")),
                comments: "Чудовий вибір для родинної вечері.".into(),
            }
        })
        .collect();
    DishList { dishes }
}

/// Last user message of a request.
pub fn last_user_text(request: &CompletionRequest) -> String {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::User)
        .map(|m| m.text_content().to_string())
        .unwrap_or_default()
}

pub fn tool_call_reply(name: &str, arguments: Value) -> ChatMessage {
    ChatMessage {
        role: ChatRole::Assistant,
        content: None,
        tool_calls: vec![ToolCall::new(
            format!("call_{name}"),
            name,
            arguments.to_string(),
        )],
        tool_call_id: None,
    }
}
