// Document store: path-addressed JSON records and the typed dish catalog on top of it

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};
use crate::models::DishRecord;

pub mod firebase;

pub use firebase::FirebaseStore;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads the value at `path`. A missing path reads as `Value::Null`.
    async fn get(&self, path: &str) -> Result<Value>;

    /// Replaces the value at `path`.
    async fn set(&self, path: &str, value: &Value) -> Result<()>;
}

/// Joins a child segment onto a store path.
pub fn child(parent: &str, name: &str) -> String {
    let parent = parent.trim_matches('/');
    let name = name.trim_matches('/');
    match (parent.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => parent.to_string(),
        (false, false) => format!("{parent}/{name}"),
    }
}

/// Typed access to the dish collection.
#[derive(Clone)]
pub struct DishRepository {
    store: Arc<dyn DocumentStore>,
    path: String,
}

impl DishRepository {
    pub fn new(store: Arc<dyn DocumentStore>, path: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    /// Loads every valid dish, sorted by id. Malformed records are skipped.
    pub async fn load_all(&self) -> Result<Vec<DishRecord>> {
        let value = self.store.get(&self.path).await?;
        let mut dishes: Vec<DishRecord> = entries(value)?
            .into_iter()
            .filter_map(|(id, raw)| parse_record(id, raw))
            .collect();
        dishes.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(path = %self.path, count = dishes.len(), "loaded dish catalog");
        Ok(dishes)
    }

    pub async fn get(&self, id: &str) -> Result<DishRecord> {
        validate_key(id)?;
        let value = self.store.get(&child(&self.path, id)).await?;
        if value.is_null() {
            return Err(ApiError::NotFound(format!("dish {id}")));
        }
        parse_record(id.to_string(), value)
            .ok_or_else(|| ApiError::StoreError(format!("dish {id} is malformed")))
    }

    pub async fn put(&self, record: &DishRecord) -> Result<()> {
        validate_key(&record.id)?;
        let value = serde_json::to_value(record)?;
        self.store.set(&child(&self.path, &record.id), &value).await
    }
}

/// Keys the Realtime Database accepts as a single path segment.
fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(ApiError::BadRequest("dish id must not be empty".into()));
    }
    if let Some(c) = key
        .chars()
        .find(|c| matches!(c, '.' | '$' | '#' | '[' | ']' | '/') || c.is_control())
    {
        return Err(ApiError::BadRequest(format!("dish id must not contain {c:?}")));
    }
    if key.len() > 768 {
        return Err(ApiError::BadRequest("dish id is longer than 768 bytes".into()));
    }
    Ok(())
}

fn entries(value: Value) -> Result<Vec<(String, Value)>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        // Sequential integer keys come back from the store as an array with holes.
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter(|(_, item)| !item.is_null())
            .map(|(index, item)| (index.to_string(), item))
            .collect()),
        other => Err(ApiError::StoreError(format!(
            "expected a collection of dishes, got {other}"
        ))),
    }
}

fn parse_record(id: String, raw: Value) -> Option<DishRecord> {
    match serde_json::from_value::<DishRecord>(raw) {
        Ok(mut record) => {
            record.id = id;
            Some(record)
        }
        Err(e) => {
            warn!(dish_id = %id, error = %e, "skipping malformed dish record");
            None
        }
    }
}
