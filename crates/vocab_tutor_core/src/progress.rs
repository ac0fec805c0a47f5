//! crates/vocab_tutor_core/src/progress.rs
//!
//! The per-word learning state machine.
//!
//! The model that drives a lesson is not trusted to respect the teaching order,
//! so every stage it claims is checked here against the stage recorded for the
//! learner before anything is written. Nothing in this module touches storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{Session, User};
use crate::envelope::Envelope;

/// Attempt counter a word must reach before it may be abandoned after failing.
pub const DENY_AFTER_ATTEMPTS: u32 = 3;

/// A word's learning stage. The `null` stage is represented as `Option::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Initiated,
    Scenario,
    Meaning,
    Pronunciation,
    Sentence,
    Context,
    ExerciseGenerated,
    ExerciseFailed,
    Learned,
    Denied,
}

impl Stage {
    pub const ALL: [Stage; 10] = [
        Stage::Initiated,
        Stage::Scenario,
        Stage::Meaning,
        Stage::Pronunciation,
        Stage::Sentence,
        Stage::Context,
        Stage::ExerciseGenerated,
        Stage::ExerciseFailed,
        Stage::Learned,
        Stage::Denied,
    ];

    /// The wire tag, as it appears in envelopes and in the progress map.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initiated => "initiated",
            Stage::Scenario => "scenario",
            Stage::Meaning => "meaning",
            Stage::Pronunciation => "pronunciation",
            Stage::Sentence => "sentence",
            Stage::Context => "context",
            Stage::ExerciseGenerated => "exerciseGenerated",
            Stage::ExerciseFailed => "exerciseFailed",
            Stage::Learned => "learned",
            Stage::Denied => "denied",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage tag '{0}'")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == tag)
            .ok_or_else(|| UnknownStage(tag.to_string()))
    }
}

fn label(stage: Option<Stage>) -> &'static str {
    stage.map(Stage::as_str).unwrap_or("null")
}

/// Why a claimed progress update was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("'{word}': {from} -> {to} is not a legal transition")]
    IllegalTransition {
        word: String,
        from: &'static str,
        to: &'static str,
    },
    #[error("'{word}': moving to {to} needs attempt count >= {required}, got {count}")]
    AttemptCountTooLow {
        word: String,
        to: &'static str,
        count: u32,
        required: u32,
    },
    #[error("'{word}': retry must increment the attempt count (recorded {recorded}, proposed {proposed})")]
    AttemptNotIncremented {
        word: String,
        recorded: u32,
        proposed: u32,
    },
    #[error("'{word}' was denied but the tracked word is {tracked:?}")]
    DeniedWordMismatch {
        word: String,
        tracked: Option<String>,
    },
    #[error("'{word}' has an unrecognized recorded stage '{tag}'")]
    UnknownRecordedStage { word: String, tag: String },
    #[error("currentWord and currentWordProgress must be null together")]
    WordStageMismatch,
    #[error("{level} exercise has {words} words, limit is {limit}")]
    ExerciseTooLong {
        level: &'static str,
        words: usize,
        limit: usize,
    },
    #[error("{level} exercise sentence appears in the conversational response")]
    ExerciseLeaked { level: &'static str },
}

/// Result of checking a single stage change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Accept,
    /// The proposed stage equals the recorded one; there is nothing to write.
    Stay,
    Reject(Rejection),
}

/// Checks one proposed stage change for `word` against the complete edge set.
///
/// `attempt_count` is the exercise attempt counter in effect for the move: the
/// counter of the new exercise set when moving into `exerciseGenerated`, the
/// recorded counter otherwise.
pub fn validate_transition(
    word: &str,
    prior: Option<Stage>,
    proposed: Option<Stage>,
    attempt_count: u32,
) -> Transition {
    use Stage::*;

    if prior == proposed {
        return Transition::Stay;
    }

    let required = match (prior, proposed) {
        (None, Some(Initiated))
        | (Some(Initiated), Some(Scenario))
        | (Some(Scenario), Some(Meaning))
        | (Some(Scenario), Some(Denied))
        | (Some(Meaning), Some(Pronunciation))
        | (Some(Pronunciation), Some(Sentence))
        | (Some(Sentence), Some(Context))
        | (Some(ExerciseGenerated), Some(Learned))
        | (Some(ExerciseGenerated), Some(ExerciseFailed)) => 0,
        (Some(Context), Some(ExerciseGenerated)) => 1,
        (Some(ExerciseFailed), Some(ExerciseGenerated)) => 2,
        (Some(ExerciseFailed), Some(Denied)) => DENY_AFTER_ATTEMPTS,
        _ => {
            return Transition::Reject(Rejection::IllegalTransition {
                word: word.to_string(),
                from: label(prior),
                to: label(proposed),
            })
        }
    };

    if attempt_count < required {
        return Transition::Reject(Rejection::AttemptCountTooLow {
            word: word.to_string(),
            to: label(proposed),
            count: attempt_count,
            required,
        });
    }
    Transition::Accept
}

/// The progress an assistant reply claims for its current word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressClaim {
    pub word: Option<String>,
    pub stage: Option<Stage>,
    pub exercise_count: Option<u32>,
}

impl ProgressClaim {
    /// Extracts the claim from a reply, refusing it outright when the exercise
    /// payload breaks its own rules.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, Rejection> {
        if let Some(problem) = envelope.exercise_problem() {
            return Err(problem);
        }
        Ok(Self {
            word: envelope.current_word.clone(),
            stage: envelope.current_word_progress,
            exercise_count: envelope.exercises.as_ref().map(|e| e.count),
        })
    }
}

/// The word a turn is judged against when the reply claims `denied`.
///
/// Only the word is tracked. The stage a claim moves from always comes from
/// the learner's recorded progress, never from a stored reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedWord {
    pub word: String,
}

impl TrackedWord {
    /// The previous reply's word, or the learner's last introduced word when
    /// the session has no reply carrying one.
    pub fn for_turn(session: &Session, user: &User) -> Option<Self> {
        if let Some(envelope) = session.last_envelope() {
            if let Some(word) = envelope.current_word {
                return Some(Self { word });
            }
        }
        Self::from_user(user)
    }

    pub fn from_user(user: &User) -> Option<Self> {
        user.last_initiated().map(|word| Self {
            word: word.to_string(),
        })
    }
}

/// A validated write to a learner's progress map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressChange {
    pub word: String,
    pub stage: Stage,
    pub exercise_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressDecision {
    /// The reply carries no word; progress is untouched.
    NoWord,
    Stay,
    Apply(ProgressChange),
    Reject(Rejection),
}

/// Decides what a claimed stage means for `user`'s recorded progress.
pub fn plan_progress(
    user: &User,
    tracked: Option<&TrackedWord>,
    claim: &ProgressClaim,
) -> ProgressDecision {
    let (word, stage) = match (claim.word.as_deref(), claim.stage) {
        (None, None) => return ProgressDecision::NoWord,
        (Some(word), Some(stage)) => (word, stage),
        _ => return ProgressDecision::Reject(Rejection::WordStageMismatch),
    };

    if stage == Stage::Denied && tracked.map(|t| t.word.as_str()) != Some(word) {
        return ProgressDecision::Reject(Rejection::DeniedWordMismatch {
            word: word.to_string(),
            tracked: tracked.map(|t| t.word.clone()),
        });
    }

    let prior = match user.recorded_stage(word) {
        None => None,
        Some(tag) => match tag.parse::<Stage>() {
            Ok(stage) => Some(stage),
            Err(_) => {
                return ProgressDecision::Reject(Rejection::UnknownRecordedStage {
                    word: word.to_string(),
                    tag: tag.to_string(),
                })
            }
        },
    };

    let recorded = user.exercise_attempts_for(word);
    let attempt = if stage == Stage::ExerciseGenerated {
        claim.exercise_count.unwrap_or(0)
    } else {
        recorded
    };
    if prior == Some(Stage::ExerciseFailed)
        && stage == Stage::ExerciseGenerated
        && attempt <= recorded
    {
        return ProgressDecision::Reject(Rejection::AttemptNotIncremented {
            word: word.to_string(),
            recorded,
            proposed: attempt,
        });
    }

    match validate_transition(word, prior, Some(stage), attempt) {
        Transition::Accept => ProgressDecision::Apply(ProgressChange {
            word: word.to_string(),
            stage,
            exercise_count: (stage == Stage::ExerciseGenerated).then_some(attempt),
        }),
        Transition::Stay => ProgressDecision::Stay,
        Transition::Reject(rejection) => ProgressDecision::Reject(rejection),
    }
}

/// Logs a decision. Rejections keep the recorded stage and are reported at warn.
pub fn trace_decision(user_id: Uuid, decision: &ProgressDecision) {
    match decision {
        ProgressDecision::Reject(rejection) => {
            warn!(%user_id, %rejection, "Progress update rejected; recorded stage kept.")
        }
        ProgressDecision::Apply(change) => {
            debug!(%user_id, word = %change.word, stage = %change.stage, "Progress updated.")
        }
        ProgressDecision::Stay | ProgressDecision::NoWord => {}
    }
}
