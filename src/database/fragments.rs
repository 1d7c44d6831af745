//! PostgreSQL-backed fragment store

use crate::database::postgres::IVFFLAT_LISTS;
use crate::database::store::{CorpusProfile, FragmentStore, MatchParams, SearchStrategy};
use crate::error::{Error, Result};
use crate::memory::{
    DeleteFilter, FragmentContext, FragmentDraft, ListOptions, MemoryFragment, MemoryStats,
    RankedFragment,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

/// Fragment store backed by a `memory_fragments` table with pgvector
#[derive(Clone)]
pub struct PgFragmentStore {
    pool: PgPool,
}

impl PgFragmentStore {
    /// Create a store on top of an initialized pool
    pub fn new(pool: PgPool) -> Self {
        PgFragmentStore { pool }
    }
}

#[derive(sqlx::FromRow)]
struct InsertedRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct FragmentRow {
    id: Uuid,
    owner_id: String,
    scope_id: Option<String>,
    fragment_text: String,
    embedding: Option<Vector>,
    context: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FragmentRow {
    fn into_fragment(self) -> MemoryFragment {
        MemoryFragment {
            id: self.id,
            owner_id: self.owner_id,
            scope_id: self.scope_id,
            text: self.fragment_text,
            embedding: self.embedding.map(|v| v.to_vec()),
            context: context_from_json(self.context),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MatchRow {
    id: Uuid,
    owner_id: String,
    scope_id: Option<String>,
    fragment_text: String,
    context: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    similarity: f64,
}

impl MatchRow {
    fn into_ranked(self) -> RankedFragment {
        RankedFragment {
            fragment: MemoryFragment {
                id: self.id,
                owner_id: self.owner_id,
                scope_id: self.scope_id,
                text: self.fragment_text,
                embedding: None,
                context: context_from_json(self.context),
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            similarity: self.similarity as f32,
        }
    }
}

/// Decode a stored context blob, falling back to a default on rows written
/// before the current shape
fn context_from_json(value: serde_json::Value) -> FragmentContext {
    serde_json::from_value(value).unwrap_or_else(|e| {
        warn!("Malformed fragment context in database, substituting default: {}", e);
        FragmentContext::default()
    })
}

/// Escape LIKE metacharacters so a user needle matches literally
fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl FragmentStore for PgFragmentStore {
    async fn insert(&self, draft: &FragmentDraft, embedding: Vec<f32>) -> Result<MemoryFragment> {
        let mut stored = self
            .insert_batch(std::slice::from_ref(draft), vec![embedding])
            .await?;
        stored
            .pop()
            .ok_or_else(|| Error::Internal("insert returned no row".to_string()))
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
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(drafts.len());

        for (draft, embedding) in drafts.iter().zip(embeddings) {
            let context = serde_json::to_value(&draft.context)?;
            let row: InsertedRow = sqlx::query_as(
                r#"
                INSERT INTO memory_fragments (owner_id, scope_id, fragment_text, embedding, context)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, created_at, updated_at
                "#,
            )
            .bind(&draft.owner_id)
            .bind(&draft.scope_id)
            .bind(&draft.text)
            .bind(Vector::from(embedding))
            .bind(&context)
            .fetch_one(&mut *tx)
            .await?;

            stored.push(MemoryFragment {
                id: row.id,
                owner_id: draft.owner_id.clone(),
                scope_id: draft.scope_id.clone(),
                text: draft.text.clone(),
                embedding: None,
                context: draft.context.clone(),
                created_at: row.created_at,
                updated_at: row.updated_at,
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn get(&self, id: Uuid, owner_id: &str) -> Result<Option<MemoryFragment>> {
        let row: Option<FragmentRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, scope_id, fragment_text, NULL::vector AS embedding,
                   context, created_at, updated_at
            FROM memory_fragments
            WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FragmentRow::into_fragment))
    }

    async fn update(
        &self,
        id: Uuid,
        owner_id: &str,
        text: Option<&str>,
        embedding: Option<Vec<f32>>,
        context: Option<&FragmentContext>,
    ) -> Result<bool> {
        let context_json = match context {
            Some(c) => Some(serde_json::to_value(c)?),
            None => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE memory_fragments SET
                fragment_text = COALESCE($3, fragment_text),
                embedding = COALESCE($4, embedding),
                context = COALESCE($5, context),
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(text)
        .bind(embedding.map(Vector::from))
        .bind(context_json)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid, owner_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM memory_fragments WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, owner_id: &str, scope_id: Option<&str>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM memory_fragments
            WHERE owner_id = $1 AND ($2::text IS NULL OR scope_id = $2)
            "#,
        )
        .bind(owner_id)
        .bind(scope_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_filtered(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        filter: &DeleteFilter,
    ) -> Result<u64> {
        let result = match filter {
            DeleteFilter::All => return self.delete_all(owner_id, scope_id).await,
            DeleteFilter::Tone(tone) => {
                sqlx::query(
                    r#"
                    DELETE FROM memory_fragments
                    WHERE owner_id = $1 AND ($2::text IS NULL OR scope_id = $2)
                      AND context->>'emotional_tone' = $3
                    "#,
                )
                .bind(owner_id)
                .bind(scope_id)
                .bind(tone.to_string())
                .execute(&self.pool)
                .await?
            }
            DeleteFilter::DateRange { from, to } => {
                sqlx::query(
                    r#"
                    DELETE FROM memory_fragments
                    WHERE owner_id = $1 AND ($2::text IS NULL OR scope_id = $2)
                      AND ($3::timestamptz IS NULL OR created_at >= $3)
                      AND ($4::timestamptz IS NULL OR created_at <= $4)
                    "#,
                )
                .bind(owner_id)
                .bind(scope_id)
                .bind(from)
                .bind(to)
                .execute(&self.pool)
                .await?
            }
            DeleteFilter::TextContains(needle) => {
                sqlx::query(
                    r#"
                    DELETE FROM memory_fragments
                    WHERE owner_id = $1 AND ($2::text IS NULL OR scope_id = $2)
                      AND fragment_text ILIKE $3
                    "#,
                )
                .bind(owner_id)
                .bind(scope_id)
                .bind(format!("%{}%", escape_like(needle)))
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected())
    }

    async fn match_fragments(&self, params: MatchParams<'_>) -> Result<Vec<RankedFragment>> {
        let count = i32::try_from(params.count).unwrap_or(i32::MAX);

        let mut tx = self.pool.begin().await?;
        if params.strategy == SearchStrategy::Exact {
            // Probing every list degrades IVFFlat to a full scan
            sqlx::query(&format!("SET LOCAL ivfflat.probes = {IVFFLAT_LISTS}"))
                .execute(&mut *tx)
                .await?;
        }

        let rows: Vec<MatchRow> = sqlx::query_as("SELECT * FROM match_fragments($1, $2, $3, $4, $5)")
            .bind(Vector::from(params.embedding.to_vec()))
            .bind(params.threshold as f64)
            .bind(count)
            .bind(params.owner_id)
            .bind(params.scope_id)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(rows.into_iter().map(MatchRow::into_ranked).collect())
    }

    async fn list(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
        options: &ListOptions,
        include_embeddings: bool,
    ) -> Result<Vec<MemoryFragment>> {
        let embedding_column = if include_embeddings {
            "embedding"
        } else {
            "NULL::vector AS embedding"
        };
        let limit_clause = if options.limit > 0 {
            format!("LIMIT {}", options.limit)
        } else {
            String::new()
        };

        // The id tiebreak keeps pagination stable across equal sort keys
        let sql = format!(
            r#"
            SELECT id, owner_id, scope_id, fragment_text, {embedding_column},
                   context, created_at, updated_at
            FROM memory_fragments
            WHERE owner_id = $1 AND ($2::text IS NULL OR scope_id = $2)
            ORDER BY {} {}, id ASC
            {limit_clause} OFFSET $3
            "#,
            options.order_by.column(),
            options.direction.keyword(),
        );

        let rows: Vec<FragmentRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(scope_id)
            .bind(options.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(FragmentRow::into_fragment).collect())
    }

    async fn stats(&self, owner_id: &str, scope_id: Option<&str>) -> Result<MemoryStats> {
        #[derive(sqlx::FromRow)]
        struct StatsRow {
            total: i64,
            oldest: Option<DateTime<Utc>>,
            newest: Option<DateTime<Utc>>,
        }

        let row: StatsRow = sqlx::query_as(
            r#"
            SELECT count(*) AS total, min(created_at) AS oldest, max(created_at) AS newest
            FROM memory_fragments
            WHERE owner_id = $1 AND ($2::text IS NULL OR scope_id = $2)
            "#,
        )
        .bind(owner_id)
        .bind(scope_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(MemoryStats {
            total_fragments: row.total,
            oldest_memory: row.oldest,
            newest_memory: row.newest,
        })
    }

    async fn corpus_profile(
        &self,
        owner_id: &str,
        scope_id: Option<&str>,
    ) -> Result<CorpusProfile> {
        #[derive(sqlx::FromRow)]
        struct ProfileRow {
            total: i64,
            avg_chars: Option<f64>,
        }

        let row: ProfileRow = sqlx::query_as(
            r#"
            SELECT count(*) AS total,
                   avg(char_length(fragment_text))::double precision AS avg_chars
            FROM memory_fragments
            WHERE owner_id = $1 AND ($2::text IS NULL OR scope_id = $2)
            "#,
        )
        .bind(owner_id)
        .bind(scope_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(CorpusProfile {
            fragment_count: row.total,
            avg_text_chars: row.avg_chars.unwrap_or(0.0) as f32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::EmotionalTone;

    #[test]
    fn test_like_escaping() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("50%"), "50\\%");
        assert_eq!(escape_like("snake_case"), "snake\\_case");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_context_decoding_tolerates_legacy_rows() {
        let good = serde_json::json!({
            "timestamp": "2025-06-01T12:00:00Z",
            "emotional_tone": "positive"
        });
        let context = context_from_json(good);
        assert_eq!(context.emotional_tone, EmotionalTone::Positive);

        // Rows from before the context shape existed decode to a default
        // instead of failing the read.
        let legacy = serde_json::json!({ "mood": "grumpy" });
        let context = context_from_json(legacy);
        assert_eq!(context.emotional_tone, EmotionalTone::Neutral);
    }
}
