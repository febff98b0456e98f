//! Concurrent cache of resolved display names.
//!
//! Resolution requests arrive from multiple rooms at once; the cache
//! serializes access with a single async mutex. A successful lookup (even one
//! that resolved to nothing) is cached; transport failures are not, so the
//! next request retries.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::sync::Mutex;

use super::LiveApi;

/// Only all-digit ids belong to resolvable accounts; anything else is an
/// anonymized hash that never resolves.
pub(crate) fn is_raw_user_id(user_id: &str) -> bool {
    static RAW_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());
    RAW_ID.is_match(user_id)
}

pub struct UserNameCache {
    api: Arc<dyn LiveApi>,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl UserNameCache {
    pub fn new(api: Arc<dyn LiveApi>) -> Self {
        Self {
            api,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a user id to a display name, consulting the cache first.
    pub async fn resolve(&self, user_id: &str) -> Option<String> {
        if !is_raw_user_id(user_id) {
            return None;
        }

        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(user_id) {
                return cached.clone();
            }
        }

        match self.api.resolve_username(user_id).await {
            Ok(resolved) => {
                let mut cache = self.cache.lock().await;
                cache.insert(user_id.to_string(), resolved.clone());
                resolved
            }
            Err(e) => {
                tracing::warn!("failed to resolve username for {}: {}", user_id, e);
                None
            }
        }
    }
}
