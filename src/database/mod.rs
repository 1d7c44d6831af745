//! Database layer
//!
//! PostgreSQL persistence for memory fragments (pgvector similarity search)
//! plus an in-memory store for tests and ephemeral runs.

pub mod fragments;
pub mod in_memory;
pub mod postgres;
pub mod store;

pub use fragments::PgFragmentStore;
pub use in_memory::{cosine_similarity, InMemoryFragmentStore};
pub use postgres::{init_pool, init_pool_for_migrations, migrations, PostgresPool};
pub use store::{CorpusProfile, FragmentStore, MatchParams, SearchStrategy};
