use std::time::Duration;
use moka::future::Cache;
use crate::api::CollectionDescriptor;
use crate::utils::generate_job_id;

/// Cache for resolved link metadata.
///
/// Only successful resolutions are stored; a failed lookup is retried on the
/// next request.
#[derive(Clone)]
pub struct MetadataCache {
    cache: Cache<String, CollectionDescriptor>,
}

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(1_024)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CollectionDescriptor> {
        self.cache.get(key).await
    }

    pub async fn set(&self, key: String, value: CollectionDescriptor) {
        self.cache.insert(key, value).await;
    }
}

/// Short-lived token store for values that do not fit into a button payload.
#[derive(Clone)]
pub struct TokenStore<V: Clone + Send + Sync + 'static> {
    cache: Cache<String, V>,
}

impl<V: Clone + Send + Sync + 'static> TokenStore<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Stores `value` and returns the token that retrieves it.
    pub async fn put(&self, value: V) -> String {
        // 12 hex chars keep callback payloads well under 64 bytes
        let token = generate_job_id()[..12].to_string();
        self.cache.insert(token.clone(), value).await;
        token
    }

    pub async fn get(&self, token: &str) -> Option<V> {
        self.cache.get(token).await
    }
}
