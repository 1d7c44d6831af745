//! In-process caching for embeddings and search results
//!
//! Uses moka async cache (Send + Sync, TTL-based eviction).
//! No external services required.

use crate::memory::{RankedFragment, RetrievalQuery};
use moka::future::Cache;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

/// Cache key helper: hash a string to u64
fn hash_key(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Search results are only valid for one exact parameter combination
fn search_key(query: &RetrievalQuery) -> u64 {
    let key = format!(
        "{}:{}:{}:{}:{}",
        query.owner_id,
        query.scope_id.as_deref().unwrap_or(""),
        query.similarity_threshold,
        query.match_count,
        query.text
    );
    hash_key(&key)
}

/// In-process memory cache
#[derive(Clone)]
pub struct MemoryCache {
    /// Embedding cache: hash(text) -> Vec<f32>
    embeddings: Cache<u64, Vec<f32>>,
    /// Search result cache: hash(owner + scope + query params) -> ranked fragments
    search_results: Cache<u64, Vec<RankedFragment>>,
}

impl MemoryCache {
    /// Create a new cache with default settings
    pub fn new() -> Self {
        MemoryCache {
            embeddings: Cache::builder()
                .max_capacity(1000)
                .time_to_live(Duration::from_secs(30 * 60)) // 30 min TTL
                .build(),
            search_results: Cache::builder()
                .max_capacity(500)
                .time_to_live(Duration::from_secs(5 * 60)) // 5 min TTL
                .build(),
        }
    }

    /// Get a cached embedding
    pub async fn get_embedding(&self, text: &str) -> Option<Vec<f32>> {
        self.embeddings.get(&hash_key(text)).await
    }

    /// Store an embedding in cache
    pub async fn put_embedding(&self, text: &str, embedding: Vec<f32>) {
        self.embeddings.insert(hash_key(text), embedding).await;
    }

    /// Get cached search results for an exact query
    pub async fn get_search_results(&self, query: &RetrievalQuery) -> Option<Vec<RankedFragment>> {
        self.search_results.get(&search_key(query)).await
    }

    /// Store search results in cache
    pub async fn put_search_results(&self, query: &RetrievalQuery, results: Vec<RankedFragment>) {
        self.search_results.insert(search_key(query), results).await;
    }

    /// Invalidate search caches after a write for an owner
    pub async fn invalidate_searches(&self, _owner_id: &str) {
        // Moka has no prefix-based invalidation, so every search entry goes.
        // The 5-minute TTL keeps the cost of this blunt approach small.
        self.search_results.invalidate_all();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embedding_cache() {
        let cache = MemoryCache::new();

        assert!(cache.get_embedding("hello").await.is_none());

        cache.put_embedding("hello", vec![0.1, 0.2, 0.3]).await;

        let result = cache.get_embedding("hello").await;
        assert!(result.is_some());
        assert_eq!(result.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_search_cache_keys_include_parameters() {
        let cache = MemoryCache::new();
        let query = RetrievalQuery::new("hiking", "user-1");
        cache.put_search_results(&query, vec![]).await;

        assert!(cache.get_search_results(&query).await.is_some());

        // Same text under a different owner or threshold is a different entry
        let other_owner = RetrievalQuery::new("hiking", "user-2");
        assert!(cache.get_search_results(&other_owner).await.is_none());

        let other_threshold = RetrievalQuery::new("hiking", "user-1").with_threshold(0.5);
        assert!(cache.get_search_results(&other_threshold).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidation_clears_search_results() {
        let cache = MemoryCache::new();
        let query = RetrievalQuery::new("hiking", "user-1");
        cache.put_search_results(&query, vec![]).await;

        cache.invalidate_searches("user-1").await;
        // Invalidation is processed asynchronously by moka
        cache.search_results.run_pending_tasks().await;

        assert!(cache.get_search_results(&query).await.is_none());
    }
}
