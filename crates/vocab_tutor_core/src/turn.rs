//! crates/vocab_tutor_core/src/turn.rs
//!
//! The unit written by a turn commit, and the shared routine every store runs
//! inside its atomic section.

use uuid::Uuid;

use crate::domain::{Session, User};
use crate::envelope::Envelope;
use crate::progress::{plan_progress, ProgressClaim, ProgressDecision, TrackedWord};

/// Everything needed to commit one turn.
#[derive(Debug, Clone)]
pub struct TurnCommit {
    pub session_id: Uuid,
    /// Instructional prompt used for this turn, stored if the session has none.
    pub system_prompt: Option<String>,
    pub user_message: String,
    /// The reply exactly as streamed; this is what the history keeps.
    pub assistant_raw: String,
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub history_len: usize,
    pub progress: ProgressDecision,
}

/// Applies a turn to in-memory copies of the session and its owner.
///
/// The tracked word is read before the new reply is appended. Callers persist
/// both values together or neither.
pub fn apply_turn(session: &mut Session, user: &mut User, turn: &TurnCommit) -> CommitReport {
    let tracked = TrackedWord::for_turn(session, user);
    let progress = match ProgressClaim::from_envelope(&turn.envelope) {
        Ok(claim) => plan_progress(user, tracked.as_ref(), &claim),
        Err(rejection) => ProgressDecision::Reject(rejection),
    };
    if let ProgressDecision::Apply(change) = &progress {
        user.apply_progress(change);
    }

    session.append_turn(
        turn.system_prompt.as_deref(),
        &turn.user_message,
        &turn.assistant_raw,
    );

    CommitReport {
        history_len: session.message_history.len(),
        progress,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{Rejection, Stage};

    fn turn(session_id: Uuid, raw: &str) -> TurnCommit {
        TurnCommit {
            session_id,
            system_prompt: Some("rules".into()),
            user_message: "hello".into(),
            assistant_raw: raw.into(),
            envelope: Envelope::parse(raw).unwrap(),
        }
    }

    #[test]
    fn test_apply_turn_appends_history_and_progress() {
        let mut user = User::new("Aria", "English", "French");
        let mut session = Session::new(user.id, "Hi Aria!");
        let raw = r#"{"response":"Choisis une catégorie","currentCategory":"Food","currentWord":"baguette","currentWordProgress":"initiated","exercises":null}"#;

        let commit = turn(session.id, raw);
        let report = apply_turn(&mut session, &mut user, &commit);

        assert_eq!(report.history_len, 4);
        assert!(matches!(report.progress, crate::progress::ProgressDecision::Apply(_)));
        assert_eq!(user.word_initiated, vec!["baguette".to_string()]);
        assert_eq!(user.recorded_stage("baguette"), Some(Stage::Initiated.as_str()));
        assert_eq!(session.message_history.last().unwrap().content, raw);
    }

    #[test]
    fn test_rejected_transition_still_appends_history() {
        let mut user = User::new("Aria", "English", "French");
        let mut session = Session::new(user.id, "Hi Aria!");
        let raw = r#"{"response":"Le sens","currentCategory":"Food","currentWord":"baguette","currentWordProgress":"meaning","exercises":null}"#;

        let commit = turn(session.id, raw);
        let report = apply_turn(&mut session, &mut user, &commit);

        assert!(matches!(
            report.progress,
            ProgressDecision::Reject(Rejection::IllegalTransition { .. })
        ));
        assert_eq!(report.history_len, 4);
        assert!(user.word_initiated.is_empty());
        assert!(user.word_progress.is_empty());
    }
}
