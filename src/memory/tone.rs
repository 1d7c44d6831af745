//! Lexical emotional-tone classification
//!
//! Tags the sentiment of a source message from word-level cues. This is the
//! single tone method used everywhere fragments are created, so the tag is
//! deterministic and costs no extra provider call.

use crate::memory::types::EmotionalTone;

/// Words that signal positive sentiment
const POSITIVE_CUES: &[&str] = &[
    "love", "loves", "loved", "enjoy", "enjoys", "enjoyed", "like", "likes",
    "liked", "happy", "excited", "great", "wonderful", "amazing", "favorite",
    "fantastic", "glad", "fun", "awesome", "proud", "thrilled", "grateful",
    "adore", "adores", "delighted", "best",
];

/// Words that signal negative sentiment
const NEGATIVE_CUES: &[&str] = &[
    "hate", "hates", "hated", "sad", "angry", "upset", "terrible", "awful",
    "worried", "worries", "anxious", "stressed", "afraid", "scared", "annoyed",
    "frustrated", "frustrating", "horrible", "worst", "miserable", "lonely",
    "depressed", "dislike", "dislikes", "hurt", "cried", "crying",
];

/// Classify the emotional tone of a message from lexical cues
///
/// Counts positive and negative cue words at word boundaries; the majority
/// wins, and a tie (including zero cues) is neutral.
pub fn classify(text: &str) -> EmotionalTone {
    let mut positive = 0usize;
    let mut negative = 0usize;

    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let word = word.to_lowercase();
        if POSITIVE_CUES.contains(&word.as_str()) {
            positive += 1;
        } else if NEGATIVE_CUES.contains(&word.as_str()) {
            negative += 1;
        }
    }

    if positive > negative {
        EmotionalTone::Positive
    } else if negative > positive {
        EmotionalTone::Negative
    } else {
        EmotionalTone::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_cues() {
        assert_eq!(
            classify("I love hiking with my dog Max every weekend"),
            EmotionalTone::Positive
        );
        assert_eq!(classify("That was AMAZING, truly great"), EmotionalTone::Positive);
    }

    #[test]
    fn test_negative_cues() {
        assert_eq!(classify("I hate mornings"), EmotionalTone::Negative);
        assert_eq!(
            classify("Work has been terrible and I'm stressed"),
            EmotionalTone::Negative
        );
    }

    #[test]
    fn test_neutral_when_no_cues() {
        assert_eq!(classify("My sister lives in Berlin"), EmotionalTone::Neutral);
        assert_eq!(classify(""), EmotionalTone::Neutral);
    }

    #[test]
    fn test_tie_is_neutral() {
        assert_eq!(
            classify("I love my job but hate the commute"),
            EmotionalTone::Neutral
        );
    }

    #[test]
    fn test_word_boundaries() {
        // "sad" inside "saddle" must not fire
        assert_eq!(classify("He bought a new saddle"), EmotionalTone::Neutral);
        // punctuation does not hide a cue
        assert_eq!(classify("I love it! Really."), EmotionalTone::Positive);
    }

    #[test]
    fn test_majority_wins() {
        assert_eq!(
            classify("I was sad and worried, but talking helped a bit. Still sad."),
            EmotionalTone::Negative
        );
    }
}
