//! Memory write path
//!
//! Validates, embeds, and persists fragment drafts. Unlike the read path,
//! failures here propagate: a fragment is either fully persisted (text,
//! embedding, context) or not at all.

use crate::database::FragmentStore;
use crate::error::{Error, Result};
use crate::memory::cache::MemoryCache;
use crate::memory::embedding::EmbeddingService;
use crate::memory::optimizer::EMBED_CHUNK_SIZE;
use crate::memory::{
    validate_fragment_text, DeleteFilter, FragmentDraft, FragmentUpdate, MemoryFragment,
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Writes memory fragments through validation and embedding
#[derive(Clone)]
pub struct MemoryWriter {
    store: Arc<dyn FragmentStore>,
    embeddings: EmbeddingService,
    cache: MemoryCache,
}

impl MemoryWriter {
    /// Create a writer over a store, an embedding service, and the shared cache
    pub fn new(
        store: Arc<dyn FragmentStore>,
        embeddings: EmbeddingService,
        cache: MemoryCache,
    ) -> Self {
        MemoryWriter {
            store,
            embeddings,
            cache,
        }
    }

    /// Embed a text for storage; errors surface to the caller
    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        validate_fragment_text(text)?;
        self.embeddings.embed(text).await
    }

    /// Validate, embed, and persist one draft
    pub async fn store(&self, draft: &FragmentDraft) -> Result<MemoryFragment> {
        draft.validate()?;
        let embedding = self.embeddings.embed(&draft.text).await?;
        let fragment = self.store.insert(draft, embedding).await?;
        self.cache.invalidate_searches(&fragment.owner_id).await;
        info!("Stored memory fragment {} for owner {}", fragment.id, fragment.owner_id);
        Ok(fragment)
    }

    /// Validate, embed, and persist a group of drafts in fixed-size chunks
    ///
    /// Every draft is validated before any work starts. Each chunk is one
    /// batch-embed call plus one transaction, all-or-nothing. A chunk
    /// failure aborts the batch: earlier chunks stay persisted and the
    /// error propagates, so callers importing in bulk should treat an Err
    /// as "partially applied", not "nothing happened".
    pub async fn batch_store(&self, drafts: &[FragmentDraft]) -> Result<Vec<MemoryFragment>> {
        for draft in drafts {
            draft.validate()?;
        }
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let total = drafts.len();
        let mut stored = Vec::with_capacity(total);
        for chunk in drafts.chunks(EMBED_CHUNK_SIZE) {
            match self.store_chunk(chunk).await {
                Ok(fragments) => stored.extend(fragments),
                Err(e) => {
                    error!(
                        "Batch store aborted after committing {} of {} fragments: {}",
                        stored.len(),
                        total,
                        e
                    );
                    if !stored.is_empty() {
                        self.cache.invalidate_searches(&drafts[0].owner_id).await;
                    }
                    return Err(e);
                }
            }
        }

        self.cache.invalidate_searches(&drafts[0].owner_id).await;
        info!("Stored {} memory fragments in batch", stored.len());
        Ok(stored)
    }

    async fn store_chunk(&self, chunk: &[FragmentDraft]) -> Result<Vec<MemoryFragment>> {
        let texts: Vec<String> = chunk.iter().map(|d| d.text.clone()).collect();
        let embeddings = self.embeddings.embed_many(&texts).await?;
        self.store.insert_batch(chunk, embeddings).await
    }

    /// Patch one fragment; a text change regenerates its embedding
    ///
    /// Returns Ok(false) when the id does not exist for this owner.
    /// Fragments carry no version column, so concurrent updates to the same
    /// id are last-write-wins.
    pub async fn update(&self, id: Uuid, owner_id: &str, update: FragmentUpdate) -> Result<bool> {
        if update.is_empty() {
            return Err(Error::InvalidInput("update changes nothing".to_string()));
        }
        if let Some(text) = &update.text {
            validate_fragment_text(text)?;
        }

        let embedding = match &update.text {
            Some(text) => Some(self.embeddings.embed(text).await?),
            None => None,
        };

        let updated = self
            .store
            .update(id, owner_id, update.text.as_deref(), embedding, update.context.as_ref())
            .await?;
        if updated {
            self.cache.invalidate_searches(owner_id).await;
            info!("Updated memory fragment {} for owner {}", id, owner_id);
        }
        Ok(updated)
    }

    /// Delete one fragment; Ok(false) when there was nothing to delete
    pub async fn delete(&self, id: Uuid, owner_id: &str) -> Result<bool> {
        let deleted = self.store.delete(id, owner_id).await?;
        if deleted {
            self.cache.invalidate_searches(owner_id).await;
            info!("Deleted memory fragment {} for owner {}", id, owner_id);
        }
        Ok(deleted)
    }

    /// Delete every fragment in scope; returns rows removed
    pub async fn delete_all(&self, owner_id: &str, scope_id: Option<&str>) -> Result<u64> {
        let removed = self.store.delete_all(owner_id, scope_id).await?;
        if removed > 0 {
            self.cache.invalidate_searches(owner_id).await;
        }
        info!("Deleted {} memory fragments for owner {}", removed, owner_id);
        Ok(removed)
    }

    /// Delete fragments matching a filter; returns rows removed
    pub async fn delete_filtered(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        filter: &DeleteFilter,
    ) -> Result<u64> {
        let removed = self.store.delete_filtered(owner_id, scope_id, filter).await?;
        if removed > 0 {
            self.cache.invalidate_searches(owner_id).await;
        }
        info!("Deleted {} memory fragments for owner {} by filter", removed, owner_id);
        Ok(removed)
    }
}
