use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type SessionId = Uuid;

/// A dish as stored in the document store. The id is the record key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DishRecord {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub ingredients: String,
    pub description: String,
    #[serde(rename = "src", default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A dish as produced by the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dish {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub ingredients: String,
    pub description: String,
    pub comments: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DishList {
    pub dishes: Vec<Dish>,
}

impl DishList {
    pub fn is_empty(&self) -> bool {
        self.dishes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dishes.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    pub score: f32,
}

/// What a browser renders for one dish, in a tab or attached to a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DishCard {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub ingredients: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl From<&DishRecord> for DishCard {
    fn from(record: &DishRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            kind: record.kind.clone(),
            ingredients: record.ingredients.clone(),
            description: record.description.clone(),
            image: record.image.clone(),
            comment: None,
        }
    }
}

impl DishCard {
    /// Card for a model-produced dish, taking the image from the catalog record when known.
    pub fn from_dish(dish: Dish, record: Option<&DishRecord>) -> Self {
        Self {
            id: dish.id,
            name: dish.name,
            kind: Some(dish.kind),
            ingredients: dish.ingredients,
            description: dish.description,
            image: record.and_then(|r| r.image.clone()),
            comment: Some(dish.comments),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dish: Option<DishCard>,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            dish: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            dish: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant_dish(dish: DishCard) -> Self {
        Self {
            role: Role::Assistant,
            content: dish.comment.clone(),
            dish: Some(dish),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DishTab {
    pub title: String,
    pub dishes: Vec<DishCard>,
    pub rows: Vec<Vec<DishCard>>,
}

// API Request/Response models
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: SessionId,
    pub messages: Vec<ConversationMessage>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub input_hint: &'static str,
    pub messages: Vec<ConversationMessage>,
    pub tabs: Vec<DishTab>,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub indexed: usize,
}
