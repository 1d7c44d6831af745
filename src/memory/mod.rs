//! Memory subsystem
//!
//! Long-term semantic memory for companion conversations: facts are
//! extracted from chat text by the LLM, embedded, and persisted per owner;
//! retrieval embeds a query and ranks stored fragments by cosine
//! similarity. The write path is strict, the read path never fails, and
//! nothing crosses an owner boundary.

pub mod cache;
pub mod embedding;
pub mod export;
pub mod extraction;
pub mod optimizer;
pub mod retrieval;
pub mod service;
pub mod storage;
pub mod tone;
pub mod types;

pub use cache::MemoryCache;
pub use embedding::EmbeddingService;
pub use export::{MemoryExporter, CSV_HEADER};
pub use extraction::{CaptureRequest, MemoryExtractor};
pub use optimizer::{QueryOptimizer, QueryPlan, EMBED_CHUNK_SIZE};
pub use retrieval::{render_chat_context, MemoryRetriever};
pub use service::MemoryService;
pub use storage::MemoryWriter;
pub use types::{
    validate_fragment_text, DeleteFilter, EmotionalTone, FragmentContext, FragmentDraft,
    FragmentUpdate, ListOptions, MemoryFragment, MemoryStats, OrderBy, OrderDirection,
    RankedFragment, RetrievalQuery, MAX_FRAGMENT_CHARS,
};
