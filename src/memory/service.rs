//! Memory facade
//!
//! One injected dependency for callers: composes extraction, storage,
//! retrieval, and export behind owner-scoped methods. The capture entry
//! points swallow every error, because remembering is always optional and
//! the conversation it rides on is not.

use crate::database::FragmentStore;
use crate::error::Result;
use crate::memory::cache::MemoryCache;
use crate::memory::embedding::EmbeddingService;
use crate::memory::export::MemoryExporter;
use crate::memory::extraction::{CaptureRequest, MemoryExtractor};
use crate::memory::retrieval::MemoryRetriever;
use crate::memory::storage::MemoryWriter;
use crate::memory::{
    DeleteFilter, FragmentUpdate, ListOptions, MemoryFragment, MemoryStats, RankedFragment,
    RetrievalQuery,
};
use crate::provider::{ChatProvider, EmbeddingProvider};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Concurrent capture requests processed at once by `process_batch`
const CAPTURE_CONCURRENCY: usize = 4;

/// Entry point for everything the memory subsystem does
#[derive(Clone)]
pub struct MemoryService {
    extractor: MemoryExtractor,
    writer: MemoryWriter,
    retriever: MemoryRetriever,
    exporter: MemoryExporter,
}

impl MemoryService {
    /// Wire the full pipeline over a chat provider, an embedding provider,
    /// and a fragment store
    pub fn new(
        chat: Arc<dyn ChatProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn FragmentStore>,
    ) -> Self {
        let cache = MemoryCache::new();
        let embeddings = EmbeddingService::new(embedder, cache.clone());
        MemoryService {
            extractor: MemoryExtractor::new(chat),
            writer: MemoryWriter::new(store.clone(), embeddings.clone(), cache.clone()),
            retriever: MemoryRetriever::new(store.clone(), embeddings, cache),
            exporter: MemoryExporter::new(store),
        }
    }

    /// Extract facts from a message and persist them
    ///
    /// Swallows every error end to end and returns the fragments that made
    /// it to the store; on any stage failure the result is empty.
    pub async fn process_and_store_memories(&self, request: &CaptureRequest) -> Vec<MemoryFragment> {
        let drafts = self.extractor.extract(request).await;
        if drafts.is_empty() {
            return Vec::new();
        }

        match self.writer.batch_store(&drafts).await {
            Ok(stored) => {
                info!("Captured {} memories for owner {}", stored.len(), request.owner_id);
                stored
            }
            Err(e) => {
                warn!("Memory capture failed for owner {}: {}", request.owner_id, e);
                Vec::new()
            }
        }
    }

    /// Capture memories without blocking the caller
    ///
    /// The returned handle is only useful for tests and shutdown
    /// sequencing; dropping it detaches the task.
    pub fn capture_in_background(&self, request: CaptureRequest) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let stored = service.process_and_store_memories(&request).await;
            if !stored.is_empty() {
                debug!("Background capture stored {} fragments", stored.len());
            }
        })
    }

    /// Capture a group of messages with bounded concurrency
    pub async fn process_batch(&self, requests: &[CaptureRequest]) -> Vec<MemoryFragment> {
        stream::iter(requests)
            .map(|request| self.process_and_store_memories(request))
            .buffer_unordered(CAPTURE_CONCURRENCY)
            .collect::<Vec<Vec<MemoryFragment>>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Retrieve and render memories for a chat prompt; `""` when empty
    pub async fn memories_for_chat(&self, query: &RetrievalQuery) -> String {
        self.retriever.format_for_chat(query).await
    }

    /// Fetch the fragments most similar to a query, best first (never errors)
    pub async fn retrieve_relevant(&self, query: &RetrievalQuery) -> Vec<RankedFragment> {
        self.retriever.retrieve_relevant(query).await
    }

    /// Paginated listing
    pub async fn list(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        options: &ListOptions,
    ) -> Result<Vec<MemoryFragment>> {
        self.retriever.list(owner_id, scope_id, options).await
    }

    /// Fetch one fragment; Ok(None) when it does not exist for this owner
    pub async fn get_one(&self, id: Uuid, owner_id: &str) -> Result<Option<MemoryFragment>> {
        self.retriever.get_one(id, owner_id).await
    }

    /// Aggregate statistics for one owner
    pub async fn stats(&self, owner_id: &str, scope_id: Option<&str>) -> Result<MemoryStats> {
        self.retriever.stats(owner_id, scope_id).await
    }

    /// Store one already-drafted fragment (bulk import, manual entry)
    pub async fn store(&self, draft: &crate::memory::FragmentDraft) -> Result<MemoryFragment> {
        self.writer.store(draft).await
    }

    /// Store a group of drafts in chunks; see [`MemoryWriter::batch_store`]
    pub async fn batch_store(
        &self,
        drafts: &[crate::memory::FragmentDraft],
    ) -> Result<Vec<MemoryFragment>> {
        self.writer.batch_store(drafts).await
    }

    /// Patch one fragment; Ok(false) on a miss
    pub async fn update(&self, id: Uuid, owner_id: &str, update: FragmentUpdate) -> Result<bool> {
        self.writer.update(id, owner_id, update).await
    }

    /// Delete one fragment; Ok(false) when there was nothing to delete
    pub async fn delete(&self, id: Uuid, owner_id: &str) -> Result<bool> {
        self.writer.delete(id, owner_id).await
    }

    /// Delete every fragment in scope; returns rows removed
    pub async fn delete_all(&self, owner_id: &str, scope_id: Option<&str>) -> Result<u64> {
        self.writer.delete_all(owner_id, scope_id).await
    }

    /// Delete fragments matching a filter; returns rows removed
    pub async fn delete_filtered(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        filter: &DeleteFilter,
    ) -> Result<u64> {
        self.writer.delete_filtered(owner_id, scope_id, filter).await
    }

    /// JSON export of the full corpus in scope
    pub async fn export_json(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        include_embeddings: bool,
    ) -> Result<String> {
        self.exporter.export_json(owner_id, scope_id, include_embeddings).await
    }

    /// CSV export of the full corpus in scope
    pub async fn export_csv(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        include_embeddings: bool,
    ) -> Result<String> {
        self.exporter.export_csv(owner_id, scope_id, include_embeddings).await
    }
}
