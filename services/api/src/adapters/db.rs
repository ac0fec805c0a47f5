//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ConversationStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Progress maps and message histories live in JSONB columns. Every write that
//! reads a row first locks it with `FOR UPDATE` inside a transaction, so
//! concurrent turns on the same user never interleave their read-modify-write.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;
use vocab_tutor_core::domain::{ChatMessage, Session, User};
use vocab_tutor_core::ports::{ConversationStore, PortError, PortResult};
use vocab_tutor_core::progress::{
    plan_progress, trace_decision, ProgressClaim, ProgressDecision, TrackedWord,
};
use vocab_tutor_core::turn::{apply_turn, CommitReport, TurnCommit};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ConversationStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> PortResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(unexpected)
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn lookup_error(what: &str, id: Uuid) -> impl FnOnce(sqlx::Error) -> PortError + '_ {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", what, id)),
        other => unexpected(other),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str =
    "id, user_name, source_language, target_language, word_initiated, word_progress, exercise_attempts";

const SESSION_COLUMNS: &str = "id, user_id, created_at, message_history";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    user_name: String,
    source_language: String,
    target_language: String,
    word_initiated: Json<Vec<String>>,
    word_progress: Json<BTreeMap<String, String>>,
    exercise_attempts: Json<BTreeMap<String, u32>>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            name: self.user_name,
            source_language: self.source_language,
            target_language: self.target_language,
            word_initiated: self.word_initiated.0,
            word_progress: self.word_progress.0,
            exercise_attempts: self.exercise_attempts.0,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    message_history: Json<Vec<ChatMessage>>,
}
impl SessionRecord {
    fn to_domain(self) -> Session {
        Session {
            id: self.id,
            user_id: self.user_id,
            created_at: self.created_at,
            message_history: self.message_history.0,
        }
    }
}

//=========================================================================================
// Row-level Helpers (run inside a caller's transaction)
//=========================================================================================

async fn lock_user(tx: &mut Transaction<'static, Postgres>, user_id: Uuid) -> PortResult<User> {
    let query = format!("SELECT {} FROM users WHERE id = $1 FOR UPDATE", USER_COLUMNS);
    let record = sqlx::query_as::<_, UserRecord>(&query)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(lookup_error("User", user_id))?;
    Ok(record.to_domain())
}

async fn lock_session(
    tx: &mut Transaction<'static, Postgres>,
    session_id: Uuid,
) -> PortResult<Session> {
    let query = format!("SELECT {} FROM sessions WHERE id = $1 FOR UPDATE", SESSION_COLUMNS);
    let record = sqlx::query_as::<_, SessionRecord>(&query)
        .bind(session_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(lookup_error("Session", session_id))?;
    Ok(record.to_domain())
}

async fn store_progress(tx: &mut Transaction<'static, Postgres>, user: &User) -> PortResult<()> {
    sqlx::query(
        "UPDATE users SET word_initiated = $1, word_progress = $2, exercise_attempts = $3 WHERE id = $4",
    )
    .bind(Json(&user.word_initiated))
    .bind(Json(&user.word_progress))
    .bind(Json(&user.exercise_attempts))
    .bind(user.id)
    .execute(&mut **tx)
    .await
    .map_err(unexpected)?;
    Ok(())
}

async fn store_history(tx: &mut Transaction<'static, Postgres>, session: &Session) -> PortResult<()> {
    sqlx::query("UPDATE sessions SET message_history = $1 WHERE id = $2")
        .bind(Json(&session.message_history))
        .bind(session.id)
        .execute(&mut **tx)
        .await
        .map_err(unexpected)?;
    Ok(())
}

//=========================================================================================
// `ConversationStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ConversationStore for DbAdapter {
    async fn find_or_create_user(
        &self,
        name: &str,
        source_language: &str,
        target_language: &str,
    ) -> PortResult<User> {
        // A single upsert keeps concurrent first visits from creating two rows.
        let query = format!(
            "INSERT INTO users (id, user_name, source_language, target_language) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_name) DO UPDATE SET source_language = EXCLUDED.source_language, \
             target_language = EXCLUDED.target_language RETURNING {}",
            USER_COLUMNS
        );
        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(source_language)
            .bind(target_language)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(lookup_error("User", user_id))?;
        Ok(record.to_domain())
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        initial_assistant_message: &str,
    ) -> PortResult<Session> {
        let session = Session::new(user_id, initial_assistant_message);
        let query = format!(
            "INSERT INTO sessions (id, user_id, created_at, message_history) VALUES ($1, $2, $3, $4) RETURNING {}",
            SESSION_COLUMNS
        );
        let record = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(session.id)
            .bind(session.user_id)
            .bind(session.created_at)
            .bind(Json(&session.message_history))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    PortError::NotFound(format!("User {} not found", user_id))
                }
                other => unexpected(other),
            })?;
        Ok(record.to_domain())
    }

    async fn get_session_by_id(&self, session_id: Uuid) -> PortResult<Session> {
        let query = format!("SELECT {} FROM sessions WHERE id = $1", SESSION_COLUMNS);
        let record = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(lookup_error("Session", session_id))?;
        Ok(record.to_domain())
    }

    async fn append_turn(
        &self,
        session_id: Uuid,
        user_message: &str,
        assistant_raw: &str,
    ) -> PortResult<()> {
        let mut tx = self.begin().await?;
        let mut session = lock_session(&mut tx, session_id).await?;
        session.append_turn(None, user_message, assistant_raw);
        store_history(&mut tx, &session).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn merge_word_progress(
        &self,
        user_id: Uuid,
        claim: &ProgressClaim,
    ) -> PortResult<ProgressDecision> {
        let mut tx = self.begin().await?;
        let mut user = lock_user(&mut tx, user_id).await?;
        let tracked = TrackedWord::from_user(&user);
        let decision = plan_progress(&user, tracked.as_ref(), claim);
        if let ProgressDecision::Apply(change) = &decision {
            user.apply_progress(change);
            store_progress(&mut tx, &user).await?;
        }
        tx.commit().await.map_err(unexpected)?;
        trace_decision(user_id, &decision);
        Ok(decision)
    }

    async fn commit_turn(&self, turn: &TurnCommit) -> PortResult<CommitReport> {
        let mut tx = self.begin().await?;
        let mut session = lock_session(&mut tx, turn.session_id).await?;
        let mut user = lock_user(&mut tx, session.user_id).await?;

        let report = apply_turn(&mut session, &mut user, turn);

        store_history(&mut tx, &session).await?;
        if matches!(report.progress, ProgressDecision::Apply(_)) {
            store_progress(&mut tx, &user).await?;
        }
        tx.commit().await.map_err(unexpected)?;
        debug!(session_id = %turn.session_id, history_len = report.history_len, "Turn stored.");
        Ok(report)
    }
}
