//! Memory read path
//!
//! Similarity retrieval, listing, and chat-context formatting. Retrieval
//! feeds live conversations, so it never propagates an error: any failure
//! is logged and degrades to "no memories".

use crate::database::{FragmentStore, MatchParams};
use crate::error::Result;
use crate::memory::cache::MemoryCache;
use crate::memory::embedding::EmbeddingService;
use crate::memory::optimizer::QueryOptimizer;
use crate::memory::{ListOptions, MemoryFragment, MemoryStats, RankedFragment, RetrievalQuery};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Reads memories back out of the store
#[derive(Clone)]
pub struct MemoryRetriever {
    store: Arc<dyn FragmentStore>,
    embeddings: EmbeddingService,
    cache: MemoryCache,
}

impl MemoryRetriever {
    /// Create a retriever over a store, an embedding service, and the shared cache
    pub fn new(
        store: Arc<dyn FragmentStore>,
        embeddings: EmbeddingService,
        cache: MemoryCache,
    ) -> Self {
        MemoryRetriever {
            store,
            embeddings,
            cache,
        }
    }

    /// Fetch the fragments most similar to a query, best first
    ///
    /// Returns an empty list on any failure. A blank query is not an error,
    /// it simply matches nothing.
    pub async fn retrieve_relevant(&self, query: &RetrievalQuery) -> Vec<RankedFragment> {
        match self.try_retrieve(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Memory retrieval failed, continuing without memories: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_retrieve(&self, query: &RetrievalQuery) -> Result<Vec<RankedFragment>> {
        query.validate()?;
        if query.text.trim().is_empty() {
            return Ok(Vec::new());
        }

        if let Some(cached) = self.cache.get_search_results(query).await {
            debug!("Search cache hit");
            return Ok(cached);
        }

        let embedding = self.embeddings.embed(&query.text).await?;
        let profile = self
            .store
            .corpus_profile(&query.owner_id, query.scope_id.as_deref())
            .await?;
        let plan = QueryOptimizer::plan(query.match_count, query.similarity_threshold, &profile);
        debug!(
            "Query plan: strategy={}, limit={}, threshold={:.2}",
            plan.strategy, plan.limit, plan.threshold
        );

        let results = self
            .store
            .match_fragments(MatchParams {
                embedding: &embedding,
                threshold: plan.threshold,
                count: plan.limit,
                owner_id: &query.owner_id,
                scope_id: query.scope_id.as_deref(),
                strategy: plan.strategy,
            })
            .await?;

        self.cache.put_search_results(query, results.clone()).await;
        Ok(results)
    }

    /// Retrieve and render memories as a chat context block
    ///
    /// Returns an empty string when nothing relevant is stored; callers can
    /// append the result to a prompt unconditionally.
    pub async fn format_for_chat(&self, query: &RetrievalQuery) -> String {
        let results = self.retrieve_relevant(query).await;
        render_chat_context(&results)
    }

    /// Plain paginated listing, no similarity involved
    pub async fn list(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        options: &ListOptions,
    ) -> Result<Vec<MemoryFragment>> {
        self.store.list(owner_id, scope_id, options, false).await
    }

    /// Fetch one fragment; Ok(None) when it does not exist for this owner
    pub async fn get_one(&self, id: Uuid, owner_id: &str) -> Result<Option<MemoryFragment>> {
        self.store.get(id, owner_id).await
    }

    /// Aggregate statistics for one owner
    pub async fn stats(&self, owner_id: &str, scope_id: Option<&str>) -> Result<MemoryStats> {
        self.store.stats(owner_id, scope_id).await
    }
}

/// Render ranked fragments into the block injected into chat prompts
pub fn render_chat_context(results: &[RankedFragment]) -> String {
    if results.is_empty() {
        return String::new();
    }
    let mut out = String::from("Relevant memories about the user:\n");
    for result in results {
        out.push_str("- ");
        out.push_str(&result.fragment.text);
        out.push('\n');
    }
    out
}
