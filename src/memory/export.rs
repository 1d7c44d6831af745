//! Fragment export for the management surface
//!
//! Serializes an owner's full corpus to pretty JSON or RFC-4180-style CSV.
//! Embedding vectors are heavy and mostly useless outside re-import, so
//! both formats include them only on request.

use crate::database::FragmentStore;
use crate::error::Result;
use crate::memory::{ListOptions, MemoryFragment};
use std::sync::Arc;

/// CSV header; `,Embedding (JSON)` is appended when embeddings are requested
pub const CSV_HEADER: &str =
    "ID,Fragment Text,Created At,Updated At,Conversation Timestamp,Message Context,Emotional Tone";

/// Exports fragments in portable formats
#[derive(Clone)]
pub struct MemoryExporter {
    store: Arc<dyn FragmentStore>,
}

impl MemoryExporter {
    /// Create an exporter over a store
    pub fn new(store: Arc<dyn FragmentStore>) -> Self {
        MemoryExporter { store }
    }

    /// Export every fragment in scope as a pretty-printed JSON array
    pub async fn export_json(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        include_embeddings: bool,
    ) -> Result<String> {
        let fragments = self.fetch_all(owner_id, scope_id, include_embeddings).await?;
        Ok(serde_json::to_string_pretty(&fragments)?)
    }

    /// Export every fragment in scope as CSV
    ///
    /// All fields are quoted and embedded quotes are doubled; timestamps are
    /// RFC-3339.
    pub async fn export_csv(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        include_embeddings: bool,
    ) -> Result<String> {
        let fragments = self.fetch_all(owner_id, scope_id, include_embeddings).await?;

        let mut out = String::from(CSV_HEADER);
        if include_embeddings {
            out.push_str(",Embedding (JSON)");
        }
        out.push('\n');

        for fragment in &fragments {
            out.push_str(&csv_row(fragment, include_embeddings)?);
            out.push('\n');
        }
        Ok(out)
    }

    async fn fetch_all(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        include_embeddings: bool,
    ) -> Result<Vec<MemoryFragment>> {
        // Unbounded chronological listing so exports are complete and stable
        self.store
            .list(owner_id, scope_id, &ListOptions::unbounded(), include_embeddings)
            .await
    }
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn csv_row(fragment: &MemoryFragment, include_embeddings: bool) -> Result<String> {
    let mut fields = vec![
        csv_field(&fragment.id.to_string()),
        csv_field(&fragment.text),
        csv_field(&fragment.created_at.to_rfc3339()),
        csv_field(&fragment.updated_at.to_rfc3339()),
        csv_field(&fragment.context.timestamp.to_rfc3339()),
        csv_field(fragment.context.message_context.as_deref().unwrap_or("")),
        csv_field(&fragment.context.emotional_tone.to_string()),
    ];
    if include_embeddings {
        let embedding = serde_json::to_string(&fragment.embedding.clone().unwrap_or_default())?;
        fields.push(csv_field(&embedding));
    }
    Ok(fields.join(","))
}
