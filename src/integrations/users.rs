//! Session-lifetime user cache with request coalescing.
//!
//! - A cached user is returned without a network call.
//! - Concurrent lookups of the same id share one in-flight fetch.
//! - Failed lookups are not cached; the next caller fetches again.
//!
//! Entries are never invalidated: a renamed user shows the old name until
//! the session restarts.

use crate::data::User;
use crate::integrations::client::PlatformClient;
use crate::integrations::ApiError;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

pub struct UserCache {
    client: PlatformClient,
    entries: Mutex<HashMap<String, Arc<OnceCell<User>>>>,
}

impl UserCache {
    pub fn new(client: PlatformClient) -> Self {
        Self {
            client,
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn cell(&self, user_id: &str) -> Arc<OnceCell<User>> {
        let mut guard = self.entries.lock().await;
        Arc::clone(guard.entry(user_id.to_string()).or_default())
    }

    pub async fn get(&self, user_id: &str) -> Result<User, ApiError> {
        let cell = self.cell(user_id).await;
        cell.get_or_try_init(|| self.client.get_user(user_id))
            .await
            .cloned()
    }

    /// Cached user without fetching
    pub async fn peek(&self, user_id: &str) -> Option<User> {
        let guard = self.entries.lock().await;
        guard.get(user_id).and_then(|cell| cell.get().cloned())
    }

    /// Resolve many ids concurrently; ids that fail to resolve are skipped.
    pub async fn resolve_all(&self, user_ids: &[String]) -> HashMap<String, User> {
        let lookups = user_ids.iter().map(|id| async move { (id, self.get(id).await) });

        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(user) => Some((id.clone(), user)),
                Err(e) => {
                    tracing::debug!("Failed to resolve user {}: {}", id, e);
                    None
                }
            })
            .collect()
    }
}
