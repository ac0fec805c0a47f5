//! crates/vocab_tutor_core/src/envelope.rs
//!
//! The structured reply the language model must produce on every turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::progress::{Rejection, Stage};

/// Word limits for the three exercise levels.
pub const BASIC_WORD_LIMIT: usize = 5;
pub const INTERMEDIATE_WORD_LIMIT: usize = 9;
pub const ADVANCED_WORD_LIMIT: usize = 12;

/// Exercise sentences shorter than this are ordinary phrases, not leaks.
pub const MIN_LEAK_WORDS: usize = 3;

/// Lowercased words, split on anything that is not a letter or digit.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// True when `needle` occurs in `haystack` as a contiguous run of whole words.
fn contains_words(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("reply is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("reply is not a JSON object")]
    NotAnObject,
    #[error("reply is an error payload: {0}")]
    ErrorPayload(String),
    #[error("reply does not match the envelope shape: {0}")]
    Shape(String),
    #[error("currentWord is empty")]
    EmptyWord,
    #[error("currentWordProgress must be null exactly when currentWord is null")]
    WordStageMismatch,
    #[error("exercises must be present exactly when currentWordProgress is exerciseGenerated")]
    ExercisesMismatch,
    #[error("exercise attempt count must be at least 1")]
    InvalidAttemptCount,
}

/// One scrambled-sentence exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseLevel {
    pub unscrambled: String,
    pub scrambled: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercises {
    pub basic: ExerciseLevel,
    pub intermediate: ExerciseLevel,
    pub advanced: ExerciseLevel,
    /// Attempt counter shared by the three levels, starting at 1.
    pub count: u32,
}

impl Exercises {
    fn levels(&self) -> [(&'static str, &ExerciseLevel, usize); 3] {
        [
            ("basic", &self.basic, BASIC_WORD_LIMIT),
            ("intermediate", &self.intermediate, INTERMEDIATE_WORD_LIMIT),
            ("advanced", &self.advanced, ADVANCED_WORD_LIMIT),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub response: String,
    #[serde(default)]
    pub current_category: Option<String>,
    #[serde(default)]
    pub current_word: Option<String>,
    #[serde(default)]
    pub current_word_progress: Option<Stage>,
    #[serde(default)]
    pub exercises: Option<Exercises>,
}

impl Envelope {
    /// Parses and checks a complete reply.
    ///
    /// A reply that fails here is malformed: it must not be written to the
    /// conversation history.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|e| EnvelopeError::InvalidJson(e.to_string()))?;
        let object = value.as_object().ok_or(EnvelopeError::NotAnObject)?;
        if object.contains_key("error") {
            let detail = object
                .get("detail")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(EnvelopeError::ErrorPayload(detail));
        }

        let envelope: Envelope =
            serde_json::from_value(value).map_err(|e| EnvelopeError::Shape(e.to_string()))?;
        envelope.check()?;
        Ok(envelope)
    }

    fn check(&self) -> Result<(), EnvelopeError> {
        if self.current_word.as_deref().is_some_and(|w| w.trim().is_empty()) {
            return Err(EnvelopeError::EmptyWord);
        }
        if self.current_word.is_some() != self.current_word_progress.is_some() {
            return Err(EnvelopeError::WordStageMismatch);
        }
        let generated = self.current_word_progress == Some(Stage::ExerciseGenerated);
        if self.exercises.is_some() != generated {
            return Err(EnvelopeError::ExercisesMismatch);
        }
        if self.exercises.as_ref().is_some_and(|e| e.count < 1) {
            return Err(EnvelopeError::InvalidAttemptCount);
        }
        Ok(())
    }

    /// Exercise content problems that do not make the reply malformed but must
    /// stop it from advancing progress: sentences over the level's word limit,
    /// or exercise sentences repeated in the conversational `response`.
    pub fn exercise_problem(&self) -> Option<Rejection> {
        let exercises = self.exercises.as_ref()?;
        let response = words(&self.response);

        for (level, exercise, limit) in exercises.levels() {
            let words = exercise
                .unscrambled
                .split_whitespace()
                .count()
                .max(exercise.scrambled.split_whitespace().count());
            if words > limit {
                return Some(Rejection::ExerciseTooLong { level, words, limit });
            }
            let sentence = self::words(&exercise.unscrambled);
            if sentence.len() >= MIN_LEAK_WORDS && contains_words(&response, &sentence) {
                return Some(Rejection::ExerciseLeaked { level });
            }
        }
        None
    }
}
