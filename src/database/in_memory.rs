//! In-memory fragment store
//!
//! Backs tests and ephemeral single-process runs. Similarity search is an
//! exhaustive cosine scan, so results are exact regardless of the requested
//! strategy.

use crate::database::store::{CorpusProfile, FragmentStore, MatchParams};
use crate::error::{Error, Result};
use crate::memory::{
    DeleteFilter, FragmentContext, FragmentDraft, ListOptions, MemoryFragment, MemoryStats,
    OrderBy, OrderDirection, RankedFragment,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredFragment {
    fragment: MemoryFragment,
    embedding: Vec<f32>,
}

/// Fragment store held entirely in process memory
#[derive(Clone, Default)]
pub struct InMemoryFragmentStore {
    rows: Arc<RwLock<HashMap<Uuid, StoredFragment>>>,
}

impl InMemoryFragmentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fragments across all owners
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// True when no fragments are stored
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

/// Cosine similarity between two vectors; 0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn in_scope(fragment: &MemoryFragment, owner_id: &str, scope_id: Option<&str>) -> bool {
    fragment.owner_id == owner_id
        && match scope_id {
            Some(scope) => fragment.scope_id.as_deref() == Some(scope),
            None => true,
        }
}

fn matches_filter(fragment: &MemoryFragment, filter: &DeleteFilter) -> bool {
    match filter {
        DeleteFilter::All => true,
        DeleteFilter::Tone(tone) => fragment.context.emotional_tone == *tone,
        DeleteFilter::DateRange { from, to } => {
            from.map_or(true, |f| fragment.created_at >= f)
                && to.map_or(true, |t| fragment.created_at <= t)
        }
        DeleteFilter::TextContains(needle) => fragment
            .text
            .to_lowercase()
            .contains(&needle.to_lowercase()),
    }
}

#[async_trait]
impl FragmentStore for InMemoryFragmentStore {
    async fn insert(&self, draft: &FragmentDraft, embedding: Vec<f32>) -> Result<MemoryFragment> {
        let now = Utc::now();
        let fragment = MemoryFragment {
            id: Uuid::new_v4(),
            owner_id: draft.owner_id.clone(),
            scope_id: draft.scope_id.clone(),
            text: draft.text.clone(),
            embedding: None,
            context: draft.context.clone(),
            created_at: now,
            updated_at: now,
        };

        self.rows.write().await.insert(
            fragment.id,
            StoredFragment {
                fragment: fragment.clone(),
                embedding,
            },
        );
        Ok(fragment)
    }

    async fn insert_batch(
        &self,
        drafts: &[FragmentDraft],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Vec<MemoryFragment>> {
        if drafts.len() != embeddings.len() {
            return Err(Error::InvalidInput(format!(
                "got {} embeddings for {} drafts",
                embeddings.len(),
                drafts.len()
            )));
        }

        let mut stored = Vec::with_capacity(drafts.len());
        for (draft, embedding) in drafts.iter().zip(embeddings) {
            stored.push(self.insert(draft, embedding).await?);
        }
        Ok(stored)
    }

    async fn get(&self, id: Uuid, owner_id: &str) -> Result<Option<MemoryFragment>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&id)
            .filter(|r| r.fragment.owner_id == owner_id)
            .map(|r| r.fragment.clone()))
    }

    async fn update(
        &self,
        id: Uuid,
        owner_id: &str,
        text: Option<&str>,
        embedding: Option<Vec<f32>>,
        context: Option<&FragmentContext>,
    ) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(&id).filter(|r| r.fragment.owner_id == owner_id) else {
            return Ok(false);
        };

        if let Some(text) = text {
            row.fragment.text = text.to_string();
        }
        if let Some(embedding) = embedding {
            row.embedding = embedding;
        }
        if let Some(context) = context {
            row.fragment.context = context.clone();
        }
        row.fragment.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete(&self, id: Uuid, owner_id: &str) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let owned = rows
            .get(&id)
            .map(|r| r.fragment.owner_id == owner_id)
            .unwrap_or(false);
        if owned {
            rows.remove(&id);
        }
        Ok(owned)
    }

    async fn delete_all(&self, owner_id: &str, scope_id: Option<&str>) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, r| !in_scope(&r.fragment, owner_id, scope_id));
        Ok((before - rows.len()) as u64)
    }

    async fn delete_filtered(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        filter: &DeleteFilter,
    ) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, r| {
            !(in_scope(&r.fragment, owner_id, scope_id) && matches_filter(&r.fragment, filter))
        });
        Ok((before - rows.len()) as u64)
    }

    async fn match_fragments(&self, params: MatchParams<'_>) -> Result<Vec<RankedFragment>> {
        let rows = self.rows.read().await;
        let mut ranked: Vec<RankedFragment> = rows
            .values()
            .filter(|r| in_scope(&r.fragment, params.owner_id, params.scope_id))
            .filter_map(|r| {
                let similarity = cosine_similarity(params.embedding, &r.embedding);
                (similarity >= params.threshold).then(|| RankedFragment {
                    fragment: r.fragment.clone(),
                    similarity,
                })
            })
            .collect();

        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        if params.count > 0 {
            ranked.truncate(params.count);
        }
        Ok(ranked)
    }

    async fn list(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        options: &ListOptions,
        include_embeddings: bool,
    ) -> Result<Vec<MemoryFragment>> {
        let rows = self.rows.read().await;
        let mut selected: Vec<&StoredFragment> = rows
            .values()
            .filter(|r| in_scope(&r.fragment, owner_id, scope_id))
            .collect();

        selected.sort_by(|a, b| {
            let ord = match options.order_by {
                OrderBy::CreatedAt => a.fragment.created_at.cmp(&b.fragment.created_at),
                OrderBy::UpdatedAt => a.fragment.updated_at.cmp(&b.fragment.updated_at),
                OrderBy::Text => a.fragment.text.cmp(&b.fragment.text),
            };
            let ord = match options.direction {
                OrderDirection::Asc => ord,
                OrderDirection::Desc => ord.reverse(),
            };
            ord.then_with(|| a.fragment.id.cmp(&b.fragment.id))
        });

        let page = selected
            .into_iter()
            .skip(options.offset)
            .take(if options.limit > 0 {
                options.limit
            } else {
                usize::MAX
            })
            .map(|r| {
                let mut fragment = r.fragment.clone();
                if include_embeddings {
                    fragment.embedding = Some(r.embedding.clone());
                }
                fragment
            })
            .collect();

        Ok(page)
    }

    async fn stats(&self, owner_id: &str, scope_id: Option<&str>) -> Result<MemoryStats> {
        let rows = self.rows.read().await;
        let mut stats = MemoryStats::default();
        for r in rows.values() {
            if !in_scope(&r.fragment, owner_id, scope_id) {
                continue;
            }
            stats.total_fragments += 1;
            let created = r.fragment.created_at;
            stats.oldest_memory = Some(stats.oldest_memory.map_or(created, |o| o.min(created)));
            stats.newest_memory = Some(stats.newest_memory.map_or(created, |n| n.max(created)));
        }
        Ok(stats)
    }

    async fn corpus_profile(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
    ) -> Result<CorpusProfile> {
        let rows = self.rows.read().await;
        let mut count = 0i64;
        let mut total_chars = 0usize;
        for r in rows.values() {
            if in_scope(&r.fragment, owner_id, scope_id) {
                count += 1;
                total_chars += r.fragment.text.chars().count();
            }
        }
        Ok(CorpusProfile {
            fragment_count: count,
            avg_text_chars: if count > 0 {
                total_chars as f32 / count as f32
            } else {
                0.0
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::store::SearchStrategy;
    use crate::memory::EmotionalTone;

    fn draft(owner: &str, text: &str) -> FragmentDraft {
        FragmentDraft::new(owner, text, FragmentContext::default())
    }

    fn params<'a>(
        embedding: &'a [f32],
        threshold: f32,
        count: usize,
        owner_id: &'a str,
    ) -> MatchParams<'a> {
        MatchParams {
            embedding,
            threshold,
            count,
            owner_id,
            scope_id: None,
            strategy: SearchStrategy::Exact,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[0.6, 0.8]) - 0.6).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let store = InMemoryFragmentStore::new();
        let stored = store
            .insert(&draft("user-1", "User has a dog named Max"), vec![1.0, 0.0])
            .await
            .unwrap();

        let found = store.get(stored.id, "user-1").await.unwrap().unwrap();
        assert_eq!(found.text, "User has a dog named Max");
        assert_eq!(found.created_at, found.updated_at);

        // Another owner cannot see the fragment even with the right id
        assert!(store.get(stored.id, "user-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_respects_owner_isolation() {
        let store = InMemoryFragmentStore::new();
        store
            .insert(&draft("alice", "Alice loves hiking"), vec![1.0, 0.0])
            .await
            .unwrap();
        store
            .insert(&draft("bob", "Bob loves hiking"), vec![1.0, 0.0])
            .await
            .unwrap();

        let results = store
            .match_fragments(params(&[1.0, 0.0], 0.5, 10, "alice"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fragment.owner_id, "alice");
    }

    #[tokio::test]
    async fn test_match_respects_scope() {
        let store = InMemoryFragmentStore::new();
        store
            .insert(
                &draft("alice", "scoped fact").with_scope("companion-1"),
                vec![1.0, 0.0],
            )
            .await
            .unwrap();
        store
            .insert(&draft("alice", "unscoped fact"), vec![1.0, 0.0])
            .await
            .unwrap();

        let mut scoped = params(&[1.0, 0.0], 0.5, 10, "alice");
        scoped.scope_id = Some("companion-1");
        let results = store.match_fragments(scoped).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fragment.text, "scoped fact");

        // Without a scope the whole owner corpus is visible
        let results = store
            .match_fragments(params(&[1.0, 0.0], 0.5, 10, "alice"))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_raising_threshold_never_adds_results() {
        let store = InMemoryFragmentStore::new();
        store
            .insert(&draft("user-1", "exact match"), vec![1.0, 0.0])
            .await
            .unwrap();
        store
            .insert(&draft("user-1", "close match"), vec![0.8, 0.6])
            .await
            .unwrap();
        store
            .insert(&draft("user-1", "distant"), vec![0.0, 1.0])
            .await
            .unwrap();

        let mut previous = usize::MAX;
        for threshold in [0.0, 0.5, 0.9, 1.0] {
            let results = store
                .match_fragments(params(&[1.0, 0.0], threshold, 0, "user-1"))
                .await
                .unwrap();
            assert!(results.len() <= previous);
            previous = results.len();
        }
    }

    #[tokio::test]
    async fn test_match_orders_by_similarity_and_honors_count() {
        let store = InMemoryFragmentStore::new();
        store
            .insert(&draft("user-1", "far"), vec![0.6, 0.8])
            .await
            .unwrap();
        store
            .insert(&draft("user-1", "near"), vec![1.0, 0.0])
            .await
            .unwrap();
        store
            .insert(&draft("user-1", "middle"), vec![0.8, 0.6])
            .await
            .unwrap();

        let results = store
            .match_fragments(params(&[1.0, 0.0], 0.0, 2, "user-1"))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].fragment.text, "near");
        assert_eq!(results[1].fragment.text, "middle");
        assert!(results[0].similarity >= results[1].similarity);

        // count 0 lifts the limit
        let results = store
            .match_fragments(params(&[1.0, 0.0], 0.0, 0, "user-1"))
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_update_misses_return_false() {
        let store = InMemoryFragmentStore::new();
        let stored = store
            .insert(&draft("user-1", "original"), vec![1.0, 0.0])
            .await
            .unwrap();

        // Unknown id and wrong owner both miss without error
        assert!(!store
            .update(Uuid::new_v4(), "user-1", Some("x"), None, None)
            .await
            .unwrap());
        assert!(!store
            .update(stored.id, "user-2", Some("x"), None, None)
            .await
            .unwrap());

        assert!(store
            .update(stored.id, "user-1", Some("revised"), Some(vec![0.0, 1.0]), None)
            .await
            .unwrap());
        let found = store.get(stored.id, "user-1").await.unwrap().unwrap();
        assert_eq!(found.text, "revised");
        assert!(found.updated_at >= found.created_at);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryFragmentStore::new();
        let stored = store
            .insert(&draft("user-1", "ephemeral"), vec![1.0, 0.0])
            .await
            .unwrap();

        assert!(store.delete(stored.id, "user-1").await.unwrap());
        assert!(!store.delete(stored.id, "user-1").await.unwrap());
        assert_eq!(store.delete_all("user-1", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_filtered_by_tone() {
        let store = InMemoryFragmentStore::new();
        let positive = FragmentContext::new(EmotionalTone::Positive);
        let negative = FragmentContext::new(EmotionalTone::Negative);
        store
            .insert(
                &FragmentDraft::new("user-1", "happy fact", positive),
                vec![1.0, 0.0],
            )
            .await
            .unwrap();
        store
            .insert(
                &FragmentDraft::new("user-1", "sad fact", negative),
                vec![1.0, 0.0],
            )
            .await
            .unwrap();

        let removed = store
            .delete_filtered("user-1", None, &DeleteFilter::Tone(EmotionalTone::Negative))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_pages_union_to_full_set() {
        let store = InMemoryFragmentStore::new();
        for i in 0..7 {
            store
                .insert(&draft("user-1", &format!("fact {}", i)), vec![1.0, 0.0])
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut offset = 0;
        loop {
            let options = ListOptions::default()
                .with_limit(3)
                .with_offset(offset)
                .with_order(OrderBy::CreatedAt, OrderDirection::Asc);
            let page = store.list("user-1", None, &options, false).await.unwrap();
            if page.is_empty() {
                break;
            }
            offset += page.len();
            seen.extend(page.into_iter().map(|f| f.id));
        }

        assert_eq!(seen.len(), 7);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 7, "pages must not overlap");
    }

    #[tokio::test]
    async fn test_stats_and_profile() {
        let store = InMemoryFragmentStore::new();
        assert_eq!(store.stats("user-1", None).await.unwrap().total_fragments, 0);

        store
            .insert(&draft("user-1", "ab"), vec![1.0, 0.0])
            .await
            .unwrap();
        store
            .insert(&draft("user-1", "abcd"), vec![1.0, 0.0])
            .await
            .unwrap();
        store
            .insert(&draft("user-2", "other owner"), vec![1.0, 0.0])
            .await
            .unwrap();

        let stats = store.stats("user-1", None).await.unwrap();
        assert_eq!(stats.total_fragments, 2);
        assert!(stats.oldest_memory.unwrap() <= stats.newest_memory.unwrap());

        let profile = store.corpus_profile("user-1", None).await.unwrap();
        assert_eq!(profile.fragment_count, 2);
        assert!((profile.avg_text_chars - 3.0).abs() < 1e-6);
    }
}
