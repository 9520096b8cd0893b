//! Request-scoped identity cache
//!
//! Memoizes user id -> identity and email -> user id lookups for the lifetime
//! of one search. Failed lookups are remembered as absent, so a user that
//! cannot be resolved costs one remote call per request, not one per message.

use crate::api::{ChatApi, UserProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Resolved identity of a workspace user
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: String,
    pub display_name: String,
    pub email: String,
}

impl From<UserProfile> for IdentityRecord {
    fn from(profile: UserProfile) -> Self {
        Self {
            display_name: profile.preferred_name(),
            email: profile.email.unwrap_or_default(),
            id: profile.id,
        }
    }
}

/// Identity cache shared by the tasks of one search request
pub struct IdentityCache {
    api: Arc<dyn ChatApi>,
    by_id: RwLock<HashMap<String, Option<IdentityRecord>>>,
    by_email: RwLock<HashMap<String, Option<String>>>,
}

impl IdentityCache {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self {
            api,
            by_id: RwLock::new(HashMap::new()),
            by_email: RwLock::new(HashMap::new()),
        }
    }

    /// Identity for `id`, fetched on first use
    pub async fn get(&self, id: &str) -> Option<IdentityRecord> {
        if let Some(cached) = self.by_id.read().await.get(id) {
            return cached.clone();
        }

        let record = match self.api.user_by_id(id).await {
            Ok(profile) => Some(IdentityRecord::from(profile)),
            Err(e) => {
                warn!("Identity lookup failed for {}: {}", id, e);
                None
            }
        };

        // Concurrent misses on the same id may both fetch; records are
        // identical so the last write wins.
        self.by_id.write().await.insert(id.to_string(), record.clone());
        record
    }

    /// Pre-populate an identity obtained through another lookup
    pub async fn set(&self, id: &str, record: IdentityRecord) {
        self.by_id.write().await.insert(id.to_string(), Some(record));
    }

    /// User id registered for `email`. A successful lookup also fills the
    /// id -> identity entry.
    pub async fn id_for_email(&self, email: &str) -> Option<String> {
        let key = email.trim().to_lowercase();
        if let Some(cached) = self.by_email.read().await.get(&key) {
            return cached.clone();
        }

        let id = match self.api.user_by_email(&key).await {
            Ok(profile) => {
                let record = IdentityRecord::from(profile);
                let id = record.id.clone();
                debug!("Resolved {} to {}", key, id);
                self.set(&id, record).await;
                Some(id)
            }
            Err(e) => {
                warn!("Email lookup failed for {}: {}", key, e);
                None
            }
        };

        self.by_email.write().await.insert(key, id.clone());
        id
    }

    /// Display name for `id`, or the raw id when it cannot be resolved
    pub async fn display_name(&self, id: &str) -> String {
        self.get(id)
            .await
            .map(|r| r.display_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| id.to_string())
    }
}
