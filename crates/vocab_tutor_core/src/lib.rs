pub mod domain;
pub mod envelope;
pub mod gateway;
pub mod greeting;
pub mod memory;
pub mod orchestrator;
pub mod ports;
pub mod progress;
pub mod prompt;
pub mod reconcile;
pub mod turn;

pub use domain::{ChatMessage, Role, Session, User};
pub use envelope::{Envelope, EnvelopeError, ExerciseLevel, Exercises};
pub use greeting::greet;
pub use memory::MemoryStore;
pub use orchestrator::{SessionLease, SessionLocks, SessionStart, Tutor};
pub use ports::{
    CompletionService, ConversationStore, FragmentStream, PortError, PortResult,
    TextToSpeechService,
};
pub use progress::{
    plan_progress, validate_transition, ProgressChange, ProgressClaim, ProgressDecision,
    Rejection, Stage, TrackedWord, Transition,
};
pub use prompt::PromptTemplate;
pub use reconcile::{reconcile_turn, ReconcileOutcome, Reconciler, TurnBuffer};
pub use turn::{apply_turn, CommitReport, TurnCommit};
