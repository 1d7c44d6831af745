//! Advisory query planning
//!
//! Pure logic that tunes retrieval parameters to the shape of an owner's
//! corpus before the search hits the database. Nothing here has side
//! effects; the facade consults it and the store executes the plan.

use crate::database::{CorpusProfile, SearchStrategy};

/// Batch-insert chunk size; bounds one embed call and one transaction
pub const EMBED_CHUNK_SIZE: usize = 100;

/// Requested limits above this scan exhaustively
const APPROXIMATE_LIMIT_CEILING: usize = 50;

/// Average fragment length above which similarity scores drift low
const LONG_TEXT_CHARS: f32 = 500.0;

/// Average fragment length below which scores cluster high
const SHORT_TEXT_CHARS: f32 = 50.0;

/// Threshold correction applied at either length extreme
const THRESHOLD_STEP: f32 = 0.05;

/// Advisory parameters for one retrieval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryPlan {
    /// Scan strategy for the store
    pub strategy: SearchStrategy,
    /// Result limit; 0 means unbounded
    pub limit: usize,
    /// Similarity threshold after corpus adjustment
    pub threshold: f32,
}

/// Chooses search parameters from corpus characteristics
pub struct QueryOptimizer;

impl QueryOptimizer {
    /// Pick a scan strategy for a requested result count
    ///
    /// Small result sets tolerate approximate recall; large or unbounded
    /// requests (limit 0) pay for an exhaustive scan.
    pub fn search_strategy(limit: usize) -> SearchStrategy {
        if limit == 0 || limit > APPROXIMATE_LIMIT_CEILING {
            SearchStrategy::Exact
        } else {
            SearchStrategy::Approximate
        }
    }

    /// Adjust a similarity threshold to the corpus text length
    ///
    /// Long fragments spread their meaning across more clauses, so cosine
    /// scores land lower; short fragments do the opposite. The result is
    /// clamped to [0, 1].
    pub fn adjusted_threshold(base: f32, avg_text_chars: f32) -> f32 {
        let adjusted = if avg_text_chars > LONG_TEXT_CHARS {
            base - THRESHOLD_STEP
        } else if avg_text_chars > 0.0 && avg_text_chars < SHORT_TEXT_CHARS {
            base + THRESHOLD_STEP
        } else {
            base
        };
        adjusted.clamp(0.0, 1.0)
    }

    /// Scale a result limit down for small corpora
    ///
    /// Returning five matches from a corpus of six pads the context with
    /// barely-relevant text. The limit is capped at a quarter of the corpus
    /// (at least one), and never raised above the request. Unbounded
    /// requests stay unbounded.
    pub fn adjusted_limit(requested: usize, fragment_count: i64) -> usize {
        if requested == 0 || fragment_count <= 0 {
            return requested;
        }
        let quarter = ((fragment_count as usize) + 3) / 4;
        requested.min(quarter.max(1))
    }

    /// Compose a full plan for one retrieval
    pub fn plan(requested_limit: usize, base_threshold: f32, profile: &CorpusProfile) -> QueryPlan {
        QueryPlan {
            strategy: Self::search_strategy(requested_limit),
            limit: Self::adjusted_limit(requested_limit, profile.fragment_count),
            threshold: Self::adjusted_threshold(base_threshold, profile.avg_text_chars),
        }
    }
}
