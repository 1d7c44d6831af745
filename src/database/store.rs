//! Fragment store trait and shared storage types

use crate::error::Result;
use crate::memory::{
    DeleteFilter, FragmentContext, FragmentDraft, ListOptions, MemoryFragment, MemoryStats,
    RankedFragment,
};
use async_trait::async_trait;
use uuid::Uuid;

/// How a similarity search scans the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStrategy {
    /// Index-assisted approximate nearest neighbour scan
    #[default]
    Approximate,
    /// Exhaustive scan; recall over speed
    Exact,
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchStrategy::Approximate => write!(f, "approximate"),
            SearchStrategy::Exact => write!(f, "exact"),
        }
    }
}

/// Aggregate shape of one owner's corpus, consumed by the query optimizer
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusProfile {
    /// Number of fragments in scope
    pub fragment_count: i64,
    /// Average fragment text length in characters (0 for an empty corpus)
    pub avg_text_chars: f32,
}

/// Parameters for one similarity search
#[derive(Debug, Clone)]
pub struct MatchParams<'a> {
    /// Query embedding
    pub embedding: &'a [f32],
    /// Minimum similarity, inclusive
    pub threshold: f32,
    /// Maximum rows; 0 means unbounded
    pub count: usize,
    /// Owner whose fragments may match
    pub owner_id: &'a str,
    /// Optional persona/avatar scope
    pub scope_id: Option<&'a str>,
    /// Scan strategy
    pub strategy: SearchStrategy,
}

/// Persistence backend for memory fragments
///
/// Every method is scoped by `owner_id` (and `scope_id` where it appears):
/// implementations must never return or touch rows outside that scope.
#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// Insert one fragment; the store assigns id and timestamps
    async fn insert(&self, draft: &FragmentDraft, embedding: Vec<f32>) -> Result<MemoryFragment>;

    /// Insert a group of fragments in a single transaction (all-or-nothing)
    async fn insert_batch(
        &self,
        drafts: &[FragmentDraft],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Vec<MemoryFragment>>;

    /// Fetch one fragment; `None` when the id does not exist for this owner
    async fn get(&self, id: Uuid, owner_id: &str) -> Result<Option<MemoryFragment>>;

    /// Patch one fragment in place; returns whether a row matched.
    /// A `text` change must arrive together with its regenerated `embedding`.
    async fn update(
        &self,
        id: Uuid,
        owner_id: &str,
        text: Option<&str>,
        embedding: Option<Vec<f32>>,
        context: Option<&FragmentContext>,
    ) -> Result<bool>;

    /// Delete one fragment; returns whether a row was removed (idempotent)
    async fn delete(&self, id: Uuid, owner_id: &str) -> Result<bool>;

    /// Delete every fragment in scope; returns rows removed (idempotent)
    async fn delete_all(&self, owner_id: &str, scope_id: Option<&str>) -> Result<u64>;

    /// Delete fragments matching a filter; returns rows removed
    async fn delete_filtered(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        filter: &DeleteFilter,
    ) -> Result<u64>;

    /// Similarity search, ordered by similarity descending
    async fn match_fragments(&self, params: MatchParams<'_>) -> Result<Vec<RankedFragment>>;

    /// Paginated listing; `include_embeddings` populates the vector field
    async fn list(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        options: &ListOptions,
        include_embeddings: bool,
    ) -> Result<Vec<MemoryFragment>>;

    /// Aggregate statistics for one owner
    async fn stats(&self, owner_id: &str, scope_id: Option<&str>) -> Result<MemoryStats>;

    /// Corpus shape for the query optimizer
    async fn corpus_profile(&self, owner_id: &str, scope_id: Option<&str>)
        -> Result<CorpusProfile>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_display() {
        assert_eq!(SearchStrategy::Approximate.to_string(), "approximate");
        assert_eq!(SearchStrategy::Exact.to_string(), "exact");
    }

    #[test]
    fn test_default_profile_is_empty() {
        let profile = CorpusProfile::default();
        assert_eq!(profile.fragment_count, 0);
        assert_eq!(profile.avg_text_chars, 0.0);
    }
}
