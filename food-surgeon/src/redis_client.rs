use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Clone)]
pub struct RedisClient {
    connection: ConnectionManager,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_tokio_connection_manager().await?;
        Ok(Self { connection })
    }

    pub async fn set_with_expiry<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        expiry_secs: u64,
    ) -> Result<()> {
        let json = serde_json::to_string(value)?;
        // The manager is a cheap handle onto one multiplexed connection.
        let mut connection = self.connection.clone();
        connection.set_ex::<_, _, ()>(key, json, expiry_secs).await?;
        Ok(())
    }

    pub async fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>> {
        let mut connection = self.connection.clone();
        let result: Option<String> = connection.get(key).await?;
        match result {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        connection.del::<_, ()>(key).await?;
        Ok(())
    }
}
