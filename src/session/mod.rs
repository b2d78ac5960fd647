//! Session store
//!
//! Append-only conversation history keyed by session id. The store is the
//! only cross-request shared mutable resource; callers serialize per-session
//! access with [`SessionLocks`] so concurrent requests for the same session
//! cannot interleave read-then-append.
//!
//! Backends: in-memory for development, Postgres when a database URL is
//! configured. Unseen session ids get a fresh empty history.

use crate::error::RouterError;
use crate::models::{ConversationTurn, TurnRole};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Trait for session persistence
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Full ordered history for a session; empty for unseen ids
    async fn history(&self, session_id: Uuid) -> Result<Vec<ConversationTurn>>;

    /// Append one turn. Turns are immutable; there is no update or delete
    /// of individual turns.
    async fn append(&self, session_id: Uuid, turn: ConversationTurn) -> Result<()>;
}

struct SessionRecord {
    turns: Vec<ConversationTurn>,
    updated_at: DateTime<Utc>,
}

enum SessionBackend {
    InMemory {
        sessions: Arc<RwLock<HashMap<Uuid, SessionRecord>>>,
    },
    Postgres {
        pool: PgPool,
        schema_ready: Arc<OnceCell<()>>,
    },
}

/// Session store with a configurable backend
pub struct SessionService {
    backend: SessionBackend,
}

impl SessionService {
    pub fn in_memory() -> Self {
        Self {
            backend: SessionBackend::InMemory {
                sessions: Arc::new(RwLock::new(HashMap::new())),
            },
        }
    }

    /// Postgres when POSTGRES_URL / DATABASE_URL is set and the pool can be
    /// created, in-memory otherwise.
    pub fn from_env() -> Self {
        let database_url = env::var("POSTGRES_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok();

        if let Some(url) = database_url {
            match sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect_lazy(&url)
            {
                Ok(pool) => {
                    info!("Session store backend: postgres");
                    return Self {
                        backend: SessionBackend::Postgres {
                            pool,
                            schema_ready: Arc::new(OnceCell::new()),
                        },
                    };
                }
                Err(error) => {
                    warn!(
                        "Failed to initialize postgres session backend, falling back to in-memory: {}",
                        error
                    );
                }
            }
        }

        info!("Session store backend: in-memory");
        Self::in_memory()
    }

    async fn ensure_schema_if_needed(&self) -> Result<()> {
        let SessionBackend::Postgres { pool, schema_ready } = &self.backend else {
            return Ok(());
        };

        schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS session_turns (
                      turn_id UUID PRIMARY KEY,
                      session_id UUID NOT NULL,
                      role TEXT NOT NULL,
                      content TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_session_turns_session_time
                    ON session_turns (session_id, created_at);
                    "#,
                )
                .execute(pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                RouterError::SessionError(format!(
                    "Failed to initialize session schema: {}",
                    e
                ))
            })?;

        Ok(())
    }

    fn role_to_db(role: TurnRole) -> &'static str {
        match role {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::System => "system",
        }
    }

    fn role_from_db(role: &str) -> TurnRole {
        match role.to_lowercase().as_str() {
            "user" => TurnRole::User,
            "assistant" => TurnRole::Assistant,
            "system" => TurnRole::System,
            _ => TurnRole::User,
        }
    }

    /// Remove sessions idle longer than `max_idle`; returns how many were
    /// evicted. The Postgres backend removes the turn rows of sessions
    /// whose newest turn is older than the cutoff.
    pub async fn evict_idle(&self, max_idle: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_idle)
                .unwrap_or_else(|_| chrono::Duration::hours(24));

        match &self.backend {
            SessionBackend::InMemory { sessions } => {
                let mut locked = sessions.write().await;
                let before = locked.len();
                locked.retain(|_, record| record.updated_at >= cutoff);
                let evicted = before - locked.len();

                if evicted > 0 {
                    info!(evicted, "Evicted idle sessions");
                }

                Ok(evicted)
            }
            SessionBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let result = sqlx::query(
                    r#"
                    DELETE FROM session_turns
                    WHERE session_id IN (
                      SELECT session_id FROM session_turns
                      GROUP BY session_id
                      HAVING MAX(created_at) < $1
                    )
                    "#,
                )
                .bind(cutoff)
                .execute(pool)
                .await
                .map_err(|e| {
                    RouterError::SessionError(format!("Failed to evict idle sessions: {}", e))
                })?;

                Ok(result.rows_affected() as usize)
            }
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for SessionService {
    async fn history(&self, session_id: Uuid) -> Result<Vec<ConversationTurn>> {
        match &self.backend {
            SessionBackend::InMemory { sessions } => {
                let locked = sessions.read().await;
                Ok(locked
                    .get(&session_id)
                    .map(|record| record.turns.clone())
                    .unwrap_or_default())
            }
            SessionBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let rows = sqlx::query(
                    r#"
                    SELECT turn_id, role, content, created_at
                    FROM session_turns
                    WHERE session_id = $1
                    ORDER BY created_at ASC
                    "#,
                )
                .bind(session_id)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    RouterError::SessionError(format!("Failed to load session history: {}", e))
                })?;

                let turns = rows
                    .into_iter()
                    .map(|row| {
                        let db_role: String =
                            row.try_get("role").unwrap_or_else(|_| "user".to_string());

                        ConversationTurn {
                            turn_id: row.try_get("turn_id").unwrap_or_else(|_| Uuid::new_v4()),
                            timestamp: row
                                .try_get("created_at")
                                .unwrap_or_else(|_| Utc::now()),
                            role: Self::role_from_db(&db_role),
                            content: row.try_get("content").unwrap_or_default(),
                        }
                    })
                    .collect();

                Ok(turns)
            }
        }
    }

    async fn append(&self, session_id: Uuid, turn: ConversationTurn) -> Result<()> {
        match &self.backend {
            SessionBackend::InMemory { sessions } => {
                let mut locked = sessions.write().await;
                let record = locked.entry(session_id).or_insert_with(|| SessionRecord {
                    turns: Vec::new(),
                    updated_at: Utc::now(),
                });

                record.turns.push(turn);
                record.updated_at = Utc::now();
                Ok(())
            }
            SessionBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                sqlx::query(
                    r#"
                    INSERT INTO session_turns (turn_id, session_id, role, content, created_at)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(turn.turn_id)
                .bind(session_id)
                .bind(Self::role_to_db(turn.role))
                .bind(&turn.content)
                .bind(turn.timestamp)
                .execute(pool)
                .await
                .map_err(|e| {
                    RouterError::SessionError(format!("Failed to append session turn: {}", e))
                })?;

                Ok(())
            }
        }
    }
}

/// Per-session mutual exclusion for the request boundary.
///
/// At most one in-flight router invocation per session id: the handler
/// holds the session's guard across snapshot → run → append. Distinct
/// sessions proceed fully in parallel.
#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Arc<RwLock<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let locked = self.locks.read().await;
            locked.get(&session_id).cloned()
        };

        let lock = match lock {
            Some(lock) => lock,
            None => {
                let mut locked = self.locks.write().await;
                locked
                    .entry(session_id)
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            }
        };

        lock.lock_owned().await
    }

    /// Drop lock entries nobody is holding; returns how many were removed.
    /// An outstanding guard keeps its Arc alive, so those entries survive.
    pub async fn prune(&self) -> usize {
        let mut locked = self.locks.write().await;
        let before = locked.len();
        locked.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unseen_session_has_empty_history() {
        let store = SessionService::in_memory();
        let history = store.history(Uuid::new_v4()).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = SessionService::in_memory();
        let session_id = Uuid::new_v4();

        store
            .append(session_id, ConversationTurn::user("first"))
            .await
            .unwrap();
        store
            .append(session_id, ConversationTurn::assistant("second"))
            .await
            .unwrap();
        store
            .append(session_id, ConversationTurn::user("third"))
            .await
            .unwrap();

        let history = store.history(session_id).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionService::in_memory();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store.append(a, ConversationTurn::user("for a")).await.unwrap();

        assert_eq!(store.history(a).await.unwrap().len(), 1);
        assert!(store.history(b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_evict_idle_removes_only_stale_sessions() {
        let store = SessionService::in_memory();
        let session_id = Uuid::new_v4();

        store
            .append(session_id, ConversationTurn::user("recent"))
            .await
            .unwrap();

        // Nothing is older than a day
        let evicted = store
            .evict_idle(Duration::from_secs(24 * 3600))
            .await
            .unwrap();
        assert_eq!(evicted, 0);

        // Everything is older than zero seconds
        tokio::time::sleep(Duration::from_millis(5)).await;
        let evicted = store.evict_idle(Duration::from_secs(0)).await.unwrap();
        assert_eq!(evicted, 1);
        assert!(store.history(session_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locks_serialize_same_session() {
        let locks = SessionLocks::new();
        let session_id = Uuid::new_v4();

        let guard = locks.acquire(session_id).await;

        // Same session: second acquire must wait
        let pending = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(session_id).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        // Different session: proceeds immediately
        let _other = locks.acquire(Uuid::new_v4()).await;

        drop(guard);
        pending.await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = SessionLocks::new();
        let held = Uuid::new_v4();
        let idle = Uuid::new_v4();

        let _guard = locks.acquire(held).await;
        drop(locks.acquire(idle).await);

        let pruned = locks.prune().await;
        assert_eq!(pruned, 1);

        // The held entry is still serialized
        let inner = locks.locks.read().await;
        assert!(inner.contains_key(&held));
        assert!(!inner.contains_key(&idle));
    }
}
