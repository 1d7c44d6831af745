//! Embedding generation with read-through caching
//!
//! Wraps an embedding provider so repeated texts (common for recurring
//! queries) skip the network round trip, and verifies that returned vectors
//! match the configured dimensionality before they reach the store.

use crate::error::{Error, Result};
use crate::memory::cache::MemoryCache;
use crate::provider::EmbeddingProvider;
use std::sync::Arc;
use tracing::debug;

/// Embedding generator shared by the write and read paths
#[derive(Clone)]
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    cache: MemoryCache,
}

impl EmbeddingService {
    /// Create a service over a provider and a shared cache
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache: MemoryCache) -> Self {
        EmbeddingService { provider, cache }
    }

    /// Vector width produced by the underlying provider
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(embedding) = self.cache.get_embedding(text).await {
            debug!("Embedding cache hit");
            return Ok(embedding);
        }

        let mut embeddings = self.provider.embed_batch(&[text.to_string()]).await?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| Error::Provider("embedding response was empty".to_string()))?;
        self.check_dimensions(&embedding)?;

        self.cache.put_embedding(text, embedding.clone()).await;
        Ok(embedding)
    }

    /// Embed many texts in one provider call, reusing cached vectors
    ///
    /// Output order matches input order.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut resolved: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<usize> = Vec::new();

        for text in texts {
            match self.cache.get_embedding(text).await {
                Some(embedding) => resolved.push(Some(embedding)),
                None => {
                    misses.push(resolved.len());
                    resolved.push(None);
                }
            }
        }

        if !misses.is_empty() {
            debug!("Embedding {} of {} texts ({} cached)", misses.len(), texts.len(), texts.len() - misses.len());
            let miss_texts: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
            let fetched = self.provider.embed_batch(&miss_texts).await?;
            if fetched.len() != miss_texts.len() {
                return Err(Error::Provider(format!(
                    "expected {} embeddings, provider returned {}",
                    miss_texts.len(),
                    fetched.len()
                )));
            }

            for (&i, embedding) in misses.iter().zip(fetched) {
                self.check_dimensions(&embedding)?;
                self.cache.put_embedding(&texts[i], embedding.clone()).await;
                resolved[i] = Some(embedding);
            }
        }

        resolved
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::Internal("embedding slot left unresolved".to_string()))
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<()> {
        let expected = self.provider.dimensions();
        if expected > 0 && embedding.len() != expected {
            return Err(Error::Provider(format!(
                "embedding has {} dimensions, expected {}",
                embedding.len(),
                expected
            )));
        }
        Ok(())
    }
}
