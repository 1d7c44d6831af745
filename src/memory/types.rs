//! Core types for the memory subsystem

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum fragment text length, in characters
pub const MAX_FRAGMENT_CHARS: usize = 2000;

/// Emotional tone attached to a fragment's context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalTone {
    /// Positive sentiment in the source message
    Positive,
    /// Negative sentiment in the source message
    Negative,
    /// No clear sentiment either way
    #[default]
    #[serde(other)]
    Neutral,
}

impl std::fmt::Display for EmotionalTone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmotionalTone::Positive => write!(f, "positive"),
            EmotionalTone::Negative => write!(f, "negative"),
            EmotionalTone::Neutral => write!(f, "neutral"),
        }
    }
}

impl std::str::FromStr for EmotionalTone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "positive" => Ok(EmotionalTone::Positive),
            "negative" => Ok(EmotionalTone::Negative),
            "neutral" => Ok(EmotionalTone::Neutral),
            _ => Err(Error::InvalidInput(format!(
                "Unknown emotional tone: {}. Valid options: positive, negative, neutral",
                s
            ))),
        }
    }
}

/// Conversational context captured alongside a fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentContext {
    /// When the source message was sent
    pub timestamp: DateTime<Utc>,
    /// Short description of the surrounding conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_context: Option<String>,
    /// Sentiment of the source message
    #[serde(default)]
    pub emotional_tone: EmotionalTone,
}

impl FragmentContext {
    /// Create a context stamped with the current time
    pub fn new(emotional_tone: EmotionalTone) -> Self {
        FragmentContext {
            timestamp: Utc::now(),
            message_context: None,
            emotional_tone,
        }
    }

    /// Set the message context description
    pub fn with_message(mut self, message_context: impl Into<String>) -> Self {
        self.message_context = Some(message_context.into());
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl Default for FragmentContext {
    fn default() -> Self {
        FragmentContext::new(EmotionalTone::Neutral)
    }
}

/// An extracted fact that has not been persisted yet (no id until stored)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentDraft {
    /// User who owns the fact
    pub owner_id: String,
    /// Optional persona/avatar scope within the owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    /// The fact itself
    pub text: String,
    /// Conversational context
    pub context: FragmentContext,
}

impl FragmentDraft {
    /// Create a new draft
    pub fn new(owner_id: impl Into<String>, text: impl Into<String>, context: FragmentContext) -> Self {
        FragmentDraft {
            owner_id: owner_id.into(),
            scope_id: None,
            text: text.into(),
            context,
        }
    }

    /// Set the scope
    pub fn with_scope(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    /// Validate the draft before it touches the provider or the store
    pub fn validate(&self) -> Result<()> {
        validate_fragment_text(&self.text)?;
        if self.owner_id.trim().is_empty() {
            return Err(Error::InvalidInput("owner_id must not be empty".to_string()));
        }
        Ok(())
    }
}

/// A persisted memory fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFragment {
    /// Unique fragment ID, assigned on persist
    pub id: Uuid,
    /// User who owns this fragment
    pub owner_id: String,
    /// Optional persona/avatar scope within the owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    /// The remembered fact
    pub text: String,
    /// Embedding vector; populated only when explicitly requested (export)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Conversational context
    pub context: FragmentContext,
    /// When the fragment was created
    pub created_at: DateTime<Utc>,
    /// When the fragment was last updated
    pub updated_at: DateTime<Utc>,
}

/// A fragment scored against a retrieval query
#[derive(Debug, Clone, Serialize)]
pub struct RankedFragment {
    /// The matched fragment
    pub fragment: MemoryFragment,
    /// Cosine similarity to the query, in [0, 1]
    pub similarity: f32,
}

/// A similarity-search request
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    /// Query text to embed and match against
    pub text: String,
    /// Owner whose fragments may be searched
    pub owner_id: String,
    /// Optional persona/avatar scope
    pub scope_id: Option<String>,
    /// Minimum similarity for a fragment to count as relevant
    pub similarity_threshold: f32,
    /// Maximum results; 0 means unbounded (export)
    pub match_count: usize,
}

impl RetrievalQuery {
    /// Create a query with library defaults
    pub fn new(text: impl Into<String>, owner_id: impl Into<String>) -> Self {
        RetrievalQuery {
            text: text.into(),
            owner_id: owner_id.into(),
            scope_id: None,
            similarity_threshold: 0.7,
            match_count: 5,
        }
    }

    /// Set the scope
    pub fn with_scope(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    /// Set the similarity threshold
    pub fn with_threshold(mut self, similarity_threshold: f32) -> Self {
        self.similarity_threshold = similarity_threshold;
        self
    }

    /// Set the result limit (0 = unbounded)
    pub fn with_limit(mut self, match_count: usize) -> Self {
        self.match_count = match_count;
        self
    }

    /// Validate query parameters
    pub fn validate(&self) -> Result<()> {
        if self.owner_id.trim().is_empty() {
            return Err(Error::InvalidInput("owner_id must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidInput(format!(
                "similarity_threshold must be between 0 and 1, got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Aggregate statistics over one owner's fragments (derived, never stored)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Number of fragments
    pub total_fragments: i64,
    /// Creation time of the oldest fragment
    pub oldest_memory: Option<DateTime<Utc>>,
    /// Creation time of the newest fragment
    pub newest_memory: Option<DateTime<Utc>>,
}

/// Patch accepted by the update operation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FragmentUpdate {
    /// New fragment text; triggers embedding regeneration
    pub text: Option<String>,
    /// New conversational context; leaves the embedding untouched
    pub context: Option<FragmentContext>,
}

impl FragmentUpdate {
    /// Update only the text
    pub fn text(text: impl Into<String>) -> Self {
        FragmentUpdate {
            text: Some(text.into()),
            context: None,
        }
    }

    /// Update only the context
    pub fn context(context: FragmentContext) -> Self {
        FragmentUpdate {
            text: None,
            context: Some(context),
        }
    }

    /// True when the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.context.is_none()
    }
}

/// Sort key for listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    /// Creation time (chronological)
    #[default]
    CreatedAt,
    /// Last update time
    UpdatedAt,
    /// Fragment text (alphabetical)
    Text,
}

impl OrderBy {
    /// Column name in the fragments table
    pub fn column(&self) -> &'static str {
        match self {
            OrderBy::CreatedAt => "created_at",
            OrderBy::UpdatedAt => "updated_at",
            OrderBy::Text => "fragment_text",
        }
    }
}

impl std::str::FromStr for OrderBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "created_at" | "created" => Ok(OrderBy::CreatedAt),
            "updated_at" | "updated" => Ok(OrderBy::UpdatedAt),
            "text" => Ok(OrderBy::Text),
            _ => Err(Error::InvalidInput(format!(
                "Unknown sort key: {}. Valid options: created_at, updated_at, text",
                s
            ))),
        }
    }
}

/// Sort direction for listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Oldest/smallest first
    Asc,
    /// Newest/largest first
    #[default]
    Desc,
}

impl OrderDirection {
    /// SQL keyword
    pub fn keyword(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Pagination and ordering for listing
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Page size; 0 means unbounded (export)
    pub limit: usize,
    /// Rows to skip
    pub offset: usize,
    /// Sort key
    pub order_by: OrderBy,
    /// Sort direction
    pub direction: OrderDirection,
}

impl Default for ListOptions {
    fn default() -> Self {
        ListOptions {
            limit: 50,
            offset: 0,
            order_by: OrderBy::CreatedAt,
            direction: OrderDirection::Desc,
        }
    }
}

impl ListOptions {
    /// Unbounded listing in stable chronological order (export)
    pub fn unbounded() -> Self {
        ListOptions {
            limit: 0,
            offset: 0,
            order_by: OrderBy::CreatedAt,
            direction: OrderDirection::Asc,
        }
    }

    /// Set the page size
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Set the sort key
    pub fn with_order(mut self, order_by: OrderBy, direction: OrderDirection) -> Self {
        self.order_by = order_by;
        self.direction = direction;
        self
    }
}

/// Selector for bulk deletion (management surface)
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteFilter {
    /// Every fragment in scope
    All,
    /// Fragments tagged with one emotional tone
    Tone(EmotionalTone),
    /// Fragments created inside a date window (either bound optional)
    DateRange {
        /// Inclusive lower bound
        from: Option<DateTime<Utc>>,
        /// Inclusive upper bound
        to: Option<DateTime<Utc>>,
    },
    /// Fragments whose text contains a substring (case-insensitive)
    TextContains(String),
}

/// Validate fragment text bounds (1 to [`MAX_FRAGMENT_CHARS`] characters)
pub fn validate_fragment_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::InvalidInput(
            "fragment text must not be empty".to_string(),
        ));
    }
    let chars = text.chars().count();
    if chars > MAX_FRAGMENT_CHARS {
        return Err(Error::InvalidInput(format!(
            "fragment text exceeds {} characters (got {})",
            MAX_FRAGMENT_CHARS, chars
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_validation_bounds() {
        assert!(validate_fragment_text("").is_err());
        assert!(validate_fragment_text("   ").is_err());
        assert!(validate_fragment_text("a").is_ok());
        assert!(validate_fragment_text(&"a".repeat(MAX_FRAGMENT_CHARS)).is_ok());
        assert!(validate_fragment_text(&"a".repeat(MAX_FRAGMENT_CHARS + 1)).is_err());
    }

    #[test]
    fn test_text_validation_counts_chars_not_bytes() {
        // 2000 multi-byte characters are within bounds even though the
        // byte length is larger.
        let text = "ü".repeat(MAX_FRAGMENT_CHARS);
        assert!(text.len() > MAX_FRAGMENT_CHARS);
        assert!(validate_fragment_text(&text).is_ok());
    }

    #[test]
    fn test_tone_parsing_and_display() {
        assert_eq!("positive".parse::<EmotionalTone>().unwrap(), EmotionalTone::Positive);
        assert_eq!("NEGATIVE".parse::<EmotionalTone>().unwrap(), EmotionalTone::Negative);
        assert!("joyful".parse::<EmotionalTone>().is_err());
        assert_eq!(EmotionalTone::Neutral.to_string(), "neutral");
    }

    #[test]
    fn test_tone_unknown_value_deserializes_to_neutral() {
        // Stored context blobs may predate the closed enum; unknown tones
        // fall back to neutral instead of failing the row.
        let tone: EmotionalTone = serde_json::from_str("\"melancholic\"").unwrap();
        assert_eq!(tone, EmotionalTone::Neutral);
    }

    #[test]
    fn test_context_default_tone() {
        let json = r#"{"timestamp": "2025-06-01T12:00:00Z"}"#;
        let context: FragmentContext = serde_json::from_str(json).unwrap();
        assert_eq!(context.emotional_tone, EmotionalTone::Neutral);
        assert!(context.message_context.is_none());
    }

    #[test]
    fn test_draft_validation() {
        let context = FragmentContext::new(EmotionalTone::Positive);
        let draft = FragmentDraft::new("user-1", "User has a dog named Max", context.clone());
        assert!(draft.validate().is_ok());

        let draft = FragmentDraft::new("", "User has a dog named Max", context.clone());
        assert!(draft.validate().is_err());

        let draft = FragmentDraft::new("user-1", "a".repeat(MAX_FRAGMENT_CHARS + 1), context);
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_retrieval_query_validation() {
        let query = RetrievalQuery::new("hiking", "user-1");
        assert!(query.validate().is_ok());

        let query = RetrievalQuery::new("hiking", "user-1").with_threshold(1.2);
        assert!(query.validate().is_err());

        let query = RetrievalQuery::new("hiking", "");
        assert!(query.validate().is_err());
    }

    #[test]
    fn test_fragment_update_emptiness() {
        assert!(FragmentUpdate::default().is_empty());
        assert!(!FragmentUpdate::text("new text").is_empty());
        assert!(!FragmentUpdate::context(FragmentContext::default()).is_empty());
    }

    #[test]
    fn test_fragment_serialization_skips_missing_embedding() {
        let fragment = MemoryFragment {
            id: Uuid::new_v4(),
            owner_id: "user-1".to_string(),
            scope_id: None,
            text: "User loves hiking".to_string(),
            embedding: None,
            context: FragmentContext::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&fragment).unwrap();
        assert!(!json.contains("embedding"));
        assert!(!json.contains("scope_id"));
    }
}
