//! crates/vocab_tutor_core/src/domain.rs
//!
//! Defines the core data structures for the tutor: learners, their
//! conversations and the role-tagged messages that make up a conversation.
//! These structs carry no knowledge of a particular database.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::Envelope;
use crate::progress::ProgressChange;

/// The author of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single record in a session's message history.
///
/// Assistant content is expected to be a serialized [`Envelope`], except for the
/// greeting that opens every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A learner, identified by a unique name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub source_language: String,
    pub target_language: String,
    /// Every word ever presented, in presentation order. Append-only.
    pub word_initiated: Vec<String>,
    /// Word -> stage tag. Keys always appear in `word_initiated`.
    pub word_progress: BTreeMap<String, String>,
    /// Word -> attempt counter of the last exercise set generated for it.
    pub exercise_attempts: BTreeMap<String, u32>,
}

impl User {
    pub fn new(name: &str, source_language: &str, target_language: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            word_initiated: Vec::new(),
            word_progress: BTreeMap::new(),
            exercise_attempts: BTreeMap::new(),
        }
    }

    /// The raw stage tag recorded for `word`, if the word was ever introduced.
    pub fn recorded_stage(&self, word: &str) -> Option<&str> {
        self.word_progress.get(word).map(String::as_str)
    }

    pub fn exercise_attempts_for(&self, word: &str) -> u32 {
        self.exercise_attempts.get(word).copied().unwrap_or(0)
    }

    pub fn last_initiated(&self) -> Option<&str> {
        self.word_initiated.last().map(String::as_str)
    }

    /// Writes an accepted progress change, keeping `word_initiated` and
    /// `word_progress` in step.
    pub fn apply_progress(&mut self, change: &ProgressChange) {
        if !self.word_initiated.iter().any(|w| w == &change.word) {
            self.word_initiated.push(change.word.clone());
        }
        self.word_progress
            .insert(change.word.clone(), change.stage.as_str().to_string());
        if let Some(count) = change.exercise_count {
            self.exercise_attempts.insert(change.word.clone(), count);
        }
    }
}

/// One learning conversation owned by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub message_history: Vec<ChatMessage>,
}

impl Session {
    /// A fresh session whose history holds only the opening greeting.
    pub fn new(user_id: Uuid, greeting: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            created_at: Utc::now(),
            message_history: vec![ChatMessage::assistant(greeting)],
        }
    }

    pub fn has_system_prompt(&self) -> bool {
        self.message_history.iter().any(|m| m.role == Role::System)
    }

    /// Appends one user/assistant pair. When `system_prompt` is given and the
    /// history has no system record yet, it is stored first.
    pub fn append_turn(
        &mut self,
        system_prompt: Option<&str>,
        user_message: &str,
        assistant_raw: &str,
    ) {
        if let Some(prompt) = system_prompt {
            if !self.has_system_prompt() {
                self.message_history.insert(0, ChatMessage::system(prompt));
            }
        }
        self.message_history.push(ChatMessage::user(user_message));
        self.message_history.push(ChatMessage::assistant(assistant_raw));
    }

    /// The most recent assistant reply that parses as a well-formed envelope.
    /// Only the last assistant record is considered.
    pub fn last_envelope(&self) -> Option<Envelope> {
        self.message_history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| Envelope::parse(&m.content).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Stage;

    #[test]
    fn test_new_session_starts_with_greeting() {
        let session = Session::new(Uuid::new_v4(), "Hi!");
        assert_eq!(session.message_history, vec![ChatMessage::assistant("Hi!")]);
        assert!(!session.has_system_prompt());
        assert!(session.last_envelope().is_none());
    }

    #[test]
    fn test_append_turn_stores_system_prompt_once_and_first() {
        let mut session = Session::new(Uuid::new_v4(), "Hi!");
        session.append_turn(Some("rules"), "hello", "{}");
        session.append_turn(Some("other rules"), "again", "{}");

        let roles: Vec<Role> = session.message_history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant
            ]
        );
        assert_eq!(session.message_history[0].content, "rules");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }

    #[test]
    fn test_apply_progress_keeps_initiated_and_progress_in_step() {
        let mut user = User::new("Aria", "English", "French");
        let change = ProgressChange {
            word: "baguette".into(),
            stage: Stage::Initiated,
            exercise_count: None,
        };
        user.apply_progress(&change);
        user.apply_progress(&ProgressChange { stage: Stage::Scenario, ..change });

        assert_eq!(user.word_initiated, vec!["baguette".to_string()]);
        assert_eq!(user.recorded_stage("baguette"), Some("scenario"));
        assert_eq!(user.exercise_attempts_for("baguette"), 0);
    }
}
