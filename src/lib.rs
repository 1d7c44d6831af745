//! Evermind: long-term semantic memory for AI companions.
//!
//! Companions only feel personal when they remember. This crate gives a
//! conversational backend a durable memory: it extracts personal facts from
//! chat messages with an LLM, embeds them, stores them per owner in
//! PostgreSQL (pgvector), and retrieves the most relevant ones at prompt
//! time.
//!
//! # Architecture
//!
//! - [`provider`]: OpenAI-compatible chat and embedding client
//! - [`memory`]: extraction, storage, retrieval, export, and the
//!   [`MemoryService`] facade that composes them
//! - [`database`]: the `FragmentStore` trait with PostgreSQL and
//!   in-memory backends
//! - [`config`]: environment-driven configuration
//! - [`error`]: the crate-wide error type
//!
//! # Example
//!
//! ```no_run
//! use evermind::config::Config;
//! use evermind::database::{init_pool, PgFragmentStore};
//! use evermind::memory::{CaptureRequest, MemoryService, RetrievalQuery};
//! use evermind::provider::OpenAiClient;
//! use std::sync::Arc;
//!
//! # async fn run() -> evermind::Result<()> {
//! let config = Config::from_env()?;
//! let client = Arc::new(OpenAiClient::new(config.provider.clone())?);
//! let pool = init_pool(&config.database).await?;
//! let store = Arc::new(PgFragmentStore::new(pool));
//! let service = MemoryService::new(client.clone(), client, store);
//!
//! // Capture runs detached so the chat reply is never delayed
//! service.capture_in_background(CaptureRequest::new(
//!     "user-1",
//!     "I love hiking with my dog Max every weekend",
//! ));
//!
//! // At prompt time, pull the relevant context block
//! let context = service
//!     .memories_for_chat(&RetrievalQuery::new("any plans outdoors?", "user-1"))
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod memory;
pub mod provider;

pub use config::Config;
pub use error::{Error, Result};
pub use memory::MemoryService;

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
