// Firebase Realtime Database over its REST interface

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

use super::DocumentStore;
use crate::error::{upstream_error, ApiError, Result};

pub struct FirebaseStore {
    client: reqwest::Client,
    base_url: String,
    auth: Option<String>,
}

impl FirebaseStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, auth: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn url(&self, path: &str) -> String {
        let path: Vec<_> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(urlencoding::encode)
            .collect();
        format!("{}/{}.json", self.base_url, path.join("/"))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some(token) => builder.query(&[("auth", token)]),
            None => builder,
        }
    }
}

#[async_trait]
impl DocumentStore for FirebaseStore {
    async fn get(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        debug!(%url, "store get");

        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "store request failed");
                ApiError::StoreError(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(upstream_error(response, ApiError::StoreError).await);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::StoreError(format!("failed to parse response: {e}")))
    }

    async fn set(&self, path: &str, value: &Value) -> Result<()> {
        let url = self.url(path);
        debug!(%url, "store set");

        let response = self
            .request(self.client.put(&url))
            .json(value)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "store request failed");
                ApiError::StoreError(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(upstream_error(response, ApiError::StoreError).await);
        }
        Ok(())
    }
}
