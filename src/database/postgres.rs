//! PostgreSQL connection pool and schema migrations

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// PostgreSQL connection pool type alias
pub type PostgresPool = PgPool;

/// IVFFlat list count, shared by the index DDL and exact-scan probes
pub(crate) const IVFFLAT_LISTS: u32 = 100;

/// Initialize the PostgreSQL connection pool
pub async fn init_pool(config: &DatabaseConfig) -> Result<PostgresPool> {
    init_pool_with_options(config, true).await
}

/// Initialize the PostgreSQL connection pool without the pgvector check
/// Use this for running migrations before pgvector is installed
pub async fn init_pool_for_migrations(config: &DatabaseConfig) -> Result<PostgresPool> {
    init_pool_with_options(config, false).await
}

async fn init_pool_with_options(
    config: &DatabaseConfig,
    require_pgvector: bool,
) -> Result<PostgresPool> {
    info!("Initializing PostgreSQL connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(config.url.expose_secret())
        .await?;

    verify_database(&pool, require_pgvector).await?;

    info!("PostgreSQL connection pool initialized successfully");
    Ok(pool)
}

/// Verify the connection and optionally check for the pgvector extension
async fn verify_database(pool: &PgPool, require_pgvector: bool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    if require_pgvector {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(pool)
                .await?;

        if result.is_none() {
            return Err(Error::Database(sqlx::Error::Configuration(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".into(),
            )));
        }
    }

    Ok(())
}

/// Database migrations
pub mod migrations {
    use super::*;
    use tracing::warn;

    /// Run all migrations
    ///
    /// `embedding_dimensions` fixes the width of the vector column and must
    /// match the configured embedding model. Changing it on an existing
    /// database requires dropping the table first.
    pub async fn run(pool: &PgPool, embedding_dimensions: usize) -> Result<()> {
        info!("Running database migrations");

        // Requires superuser unless the extension is already available
        match sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(pool)
            .await
        {
            Ok(_) => info!("pgvector extension enabled"),
            Err(e) => {
                warn!("Could not create pgvector extension: {}. Vector features may not work.", e);
                warn!("If you need vector support, run as superuser: CREATE EXTENSION vector;");
            }
        }

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS memory_fragments (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                owner_id TEXT NOT NULL,
                scope_id TEXT,
                fragment_text TEXT NOT NULL,
                embedding vector({embedding_dimensions}),
                context JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ))
        .execute(pool)
        .await?;

        // Indexes must each be a separate query for SQLx
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_memory_fragments_owner_id ON memory_fragments(owner_id)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_memory_fragments_owner_scope ON memory_fragments(owner_id, scope_id)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_memory_fragments_created_at ON memory_fragments(created_at)",
        )
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE INDEX IF NOT EXISTS idx_memory_fragments_embedding ON memory_fragments
            USING ivfflat (embedding vector_cosine_ops) WITH (lists = {IVFFLAT_LISTS})
            "#
        ))
        .execute(pool)
        .await
        .ok(); // Ignore if not enough data or vector type not available

        // Similarity search entry point. Cosine similarity is 1 - (a <=> b);
        // match_count <= 0 lifts the row limit.
        sqlx::query(&format!(
            r#"
            CREATE OR REPLACE FUNCTION match_fragments(
                query_embedding vector({embedding_dimensions}),
                match_threshold double precision,
                match_count integer,
                p_owner_id text,
                p_scope_id text DEFAULT NULL
            )
            RETURNS TABLE (
                id uuid,
                owner_id text,
                scope_id text,
                fragment_text text,
                context jsonb,
                created_at timestamptz,
                updated_at timestamptz,
                similarity double precision
            )
            LANGUAGE sql STABLE
            AS $$
                SELECT
                    f.id,
                    f.owner_id,
                    f.scope_id,
                    f.fragment_text,
                    f.context,
                    f.created_at,
                    f.updated_at,
                    1 - (f.embedding <=> query_embedding) AS similarity
                FROM memory_fragments f
                WHERE f.owner_id = p_owner_id
                  AND (p_scope_id IS NULL OR f.scope_id = p_scope_id)
                  AND f.embedding IS NOT NULL
                  AND 1 - (f.embedding <=> query_embedding) >= match_threshold
                ORDER BY f.embedding <=> query_embedding
                LIMIT CASE WHEN match_count <= 0 THEN NULL ELSE match_count END
            $$
            "#
        ))
        .execute(pool)
        .await?;

        info!("Database migrations completed");
        Ok(())
    }
}
