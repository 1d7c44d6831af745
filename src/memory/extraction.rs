//! LLM-backed fact extraction
//!
//! Turns raw conversation text into standalone third-person facts ready for
//! embedding. Extraction sits on the capture path, which must never break
//! the surrounding chat: every failure here degrades to an empty list.

use crate::memory::tone;
use crate::memory::{FragmentContext, FragmentDraft};
use crate::provider::ChatProvider;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Concurrent provider calls during a batch extraction
const EXTRACT_CONCURRENCY: usize = 4;

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are a memory extraction system. Extract personal facts about the user from their message.

Rules:
- Return a JSON array of strings and nothing else.
- Each string is one standalone fact about the user, written in third person (for example \"User has a dog named Max\").
- Extract only lasting personal facts: preferences, relationships, life events, habits, biographical details.
- Skip transient states, small talk, and facts about other people unless they relate to the user.
- Return [] when the message contains no lasting personal facts.";

/// One piece of conversation text to capture memories from
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// User the facts belong to
    pub owner_id: String,
    /// Optional persona/avatar scope
    pub scope_id: Option<String>,
    /// Raw message text
    pub text: String,
    /// Short description of the surrounding conversation
    pub message_context: Option<String>,
    /// When the message was sent; defaults to now
    pub timestamp: Option<DateTime<Utc>>,
}

impl CaptureRequest {
    /// Create a request for one message
    pub fn new(owner_id: impl Into<String>, text: impl Into<String>) -> Self {
        CaptureRequest {
            owner_id: owner_id.into(),
            scope_id: None,
            text: text.into(),
            message_context: None,
            timestamp: None,
        }
    }

    /// Set the scope
    pub fn with_scope(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    /// Set the conversation description
    pub fn with_message_context(mut self, message_context: impl Into<String>) -> Self {
        self.message_context = Some(message_context.into());
        self
    }

    /// Set the message timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Extracts memory fragments from conversation text via the chat provider
#[derive(Clone)]
pub struct MemoryExtractor {
    provider: Arc<dyn ChatProvider>,
}

impl MemoryExtractor {
    /// Create an extractor over a chat provider
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        MemoryExtractor { provider }
    }

    /// Extract fragment drafts from one message
    ///
    /// Returns an empty list when the message holds no facts, the provider
    /// fails, or the response cannot be parsed.
    pub async fn extract(&self, request: &CaptureRequest) -> Vec<FragmentDraft> {
        if request.text.trim().is_empty() {
            return Vec::new();
        }

        let response = match self
            .provider
            .complete(EXTRACTION_SYSTEM_PROMPT, &request.text)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Fact extraction failed: {}", e);
                return Vec::new();
            }
        };

        let facts = parse_fact_array(&response);
        if facts.is_empty() {
            debug!("No facts extracted from message");
            return Vec::new();
        }

        // Tone describes the source message, so it is shared by every fact
        // extracted from it.
        let emotional_tone = tone::classify(&request.text);
        let timestamp = request.timestamp.unwrap_or_else(Utc::now);

        facts
            .into_iter()
            .filter_map(|fact| {
                let mut context = FragmentContext::new(emotional_tone).with_timestamp(timestamp);
                if let Some(message_context) = &request.message_context {
                    context = context.with_message(message_context.clone());
                }

                let mut draft = FragmentDraft::new(&request.owner_id, fact, context);
                if let Some(scope_id) = &request.scope_id {
                    draft = draft.with_scope(scope_id.clone());
                }

                match draft.validate() {
                    Ok(()) => Some(draft),
                    Err(e) => {
                        warn!("Dropping extracted fact: {}", e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Extract drafts from a group of messages with bounded concurrency
    ///
    /// Each message is processed independently and contributes nothing on
    /// failure, so one bad message never aborts the batch. Draft order
    /// follows the request order.
    pub async fn batch_extract(&self, requests: &[CaptureRequest]) -> Vec<FragmentDraft> {
        stream::iter(requests)
            .map(|request| self.extract(request))
            .buffered(EXTRACT_CONCURRENCY)
            .collect::<Vec<Vec<FragmentDraft>>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Pull a JSON string array out of a model response
///
/// Models wrap output in markdown fences or prose often enough that the
/// parser slices from the first `[` to the last `]` before deserializing.
/// Non-string entries are dropped.
fn parse_fact_array(response: &str) -> Vec<String> {
    let candidate = match (response.find('['), response.rfind(']')) {
        (Some(start), Some(end)) if start < end => &response[start..=end],
        _ => {
            warn!("Extraction response contained no JSON array");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<serde_json::Value>>(candidate) {
        Ok(values) => values
            .into_iter()
            .filter_map(|value| value.as_str().map(|s| s.trim().to_string()))
            .filter(|fact| !fact.is_empty())
            .collect(),
        Err(e) => {
            warn!("Extraction response was not a JSON array: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::memory::{EmotionalTone, MAX_FRAGMENT_CHARS};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedChat {
        response: Result<String>,
        calls: AtomicUsize,
    }

    impl ScriptedChat {
        fn replies(response: &str) -> Self {
            ScriptedChat {
                response: Ok(response.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn fails() -> Self {
            ScriptedChat {
                response: Err(Error::Provider("model unavailable".to_string())),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedChat {
        async fn complete(&self, _system_prompt: &str, _user_text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(response) => Ok(response.clone()),
                Err(e) => Err(Error::Provider(e.to_string())),
            }
        }
    }

    /// Echoes the message back as a single fact; fails on a marker word
    struct EchoChat;

    #[async_trait]
    impl ChatProvider for EchoChat {
        async fn complete(&self, _system_prompt: &str, user_text: &str) -> Result<String> {
            if user_text.contains("outage") {
                return Err(Error::Provider("model unavailable".to_string()));
            }
            Ok(format!(r#"["User mentioned {}"]"#, user_text))
        }
    }

    #[test]
    fn test_parse_plain_array() {
        let facts = parse_fact_array(r#"["User loves hiking", "User has a dog named Max"]"#);
        assert_eq!(facts, vec!["User loves hiking", "User has a dog named Max"]);
    }

    #[test]
    fn test_parse_fenced_array() {
        let facts = parse_fact_array("```json\n[\"User plays guitar\"]\n```");
        assert_eq!(facts, vec!["User plays guitar"]);
    }

    #[test]
    fn test_parse_rejects_prose_and_drops_non_strings() {
        assert!(parse_fact_array("I could not find any facts.").is_empty());
        assert!(parse_fact_array("").is_empty());

        let facts = parse_fact_array(r#"["User is a nurse", 42, {"fact": "ignored"}, "  "]"#);
        assert_eq!(facts, vec!["User is a nurse"]);
    }

    #[tokio::test]
    async fn test_extracts_facts_with_source_tone() {
        let provider = Arc::new(ScriptedChat::replies(
            r#"["User loves hiking", "User has a dog named Max"]"#,
        ));
        let extractor = MemoryExtractor::new(provider);

        let request = CaptureRequest::new("user-1", "I love hiking with my dog Max every weekend")
            .with_scope("companion-1")
            .with_message_context("weekend plans chat");
        let drafts = extractor.extract(&request).await;

        assert_eq!(drafts.len(), 2);
        for draft in &drafts {
            assert_eq!(draft.owner_id, "user-1");
            assert_eq!(draft.scope_id.as_deref(), Some("companion-1"));
            assert_eq!(draft.context.emotional_tone, EmotionalTone::Positive);
            assert_eq!(draft.context.message_context.as_deref(), Some("weekend plans chat"));
        }
        assert_eq!(drafts[0].text, "User loves hiking");
        assert_eq!(drafts[1].text, "User has a dog named Max");
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_to_empty() {
        let extractor = MemoryExtractor::new(Arc::new(ScriptedChat::fails()));
        let drafts = extractor
            .extract(&CaptureRequest::new("user-1", "I love hiking"))
            .await;
        assert!(drafts.is_empty());
    }

    #[tokio::test]
    async fn test_blank_input_skips_the_provider() {
        let provider = Arc::new(ScriptedChat::replies("[]"));
        let extractor = MemoryExtractor::new(provider.clone());

        let drafts = extractor.extract(&CaptureRequest::new("user-1", "   ")).await;
        assert!(drafts.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_overlong_facts_are_dropped() {
        let long_fact = "a".repeat(MAX_FRAGMENT_CHARS + 1);
        let response = format!(r#"["User is a nurse", "{}"]"#, long_fact);
        let extractor = MemoryExtractor::new(Arc::new(ScriptedChat::replies(&response)));

        let drafts = extractor
            .extract(&CaptureRequest::new("user-1", "Work has been busy"))
            .await;
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].text, "User is a nurse");
    }

    #[tokio::test]
    async fn test_batch_extract_isolates_failures_and_keeps_order() {
        let extractor = MemoryExtractor::new(Arc::new(EchoChat));

        let requests = vec![
            CaptureRequest::new("user-1", "my sister lives in Oslo"),
            CaptureRequest::new("user-1", "provider outage here"),
            CaptureRequest::new("user-1", "I started pottery classes"),
        ];
        let drafts = extractor.batch_extract(&requests).await;

        // The failing message contributes nothing; the rest stay in order
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].text, "User mentioned my sister lives in Oslo");
        assert_eq!(drafts[1].text, "User mentioned I started pottery classes");
    }

    #[tokio::test]
    async fn test_batch_extract_empty_input() {
        let extractor = MemoryExtractor::new(Arc::new(EchoChat));
        assert!(extractor.batch_extract(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_timestamp_carries_into_context() {
        let sent_at = chrono::DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let extractor = MemoryExtractor::new(Arc::new(ScriptedChat::replies(
            r#"["User works night shifts"]"#,
        )));

        let drafts = extractor
            .extract(&CaptureRequest::new("user-1", "Night shifts are exhausting").with_timestamp(sent_at))
            .await;
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].context.timestamp, sent_at);
    }
}
