use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;

const MAX_ENTRIES: usize = 1024;

/// Short-lived cache of rendered JSON responses, keyed per user and URI.
/// Entries expire after the TTL and are never invalidated early. A zero TTL
/// disables caching.
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Value)>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(user_id: Uuid, uri: &axum::http::Uri) -> String {
        format!("{user_id}:{uri}")
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|(expires, _)| *expires > Instant::now())
            .map(|(_, v)| v.clone())
    }

    /// Serialize `body`, store it under `key` and return the JSON value.
    pub fn store<T: Serialize>(&self, key: String, body: &T) -> Result<Value, ApiError> {
        let value = serde_json::to_value(body).map_err(anyhow::Error::from)?;
        if self.ttl.is_zero() {
            return Ok(value);
        }

        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= MAX_ENTRIES {
            entries.retain(|_, (expires, _)| *expires > now);
        }
        entries.insert(key, (now + self.ttl, value.clone()));
        Ok(value)
    }
}
