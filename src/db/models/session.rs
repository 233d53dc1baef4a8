//! Session models.
//!
//! Only the SHA-256 hash of a session token is stored; the token itself lives
//! in the browser cookie.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::db::{format_timestamp, now};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub client_id: Option<String>,
    #[serde(skip)]
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
    pub refreshed_at: Option<String>,
}

impl Session {
    pub async fn create(
        db: &SqlitePool,
        user_id: &str,
        client_id: Option<&str>,
        token_hash: &str,
        ttl: chrono::Duration,
    ) -> Result<Session, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = now();
        let expires_at = format_timestamp(chrono::Utc::now() + ttl);

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, client_id, token_hash, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(client_id)
        .bind(token_hash)
        .bind(&expires_at)
        .bind(&created_at)
        .execute(db)
        .await?;

        Ok(Session {
            id,
            user_id: user_id.to_string(),
            client_id: client_id.map(str::to_string),
            token_hash: token_hash.to_string(),
            expires_at,
            created_at,
            refreshed_at: None,
        })
    }

    /// Find an unexpired session by token hash
    pub async fn find_active(db: &SqlitePool, token_hash: &str) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM sessions WHERE token_hash = ? AND expires_at > ?")
            .bind(token_hash)
            .bind(now())
            .fetch_optional(db)
            .await
    }

    pub async fn extend(
        db: &SqlitePool,
        id: &str,
        ttl: chrono::Duration,
    ) -> Result<Option<Session>, sqlx::Error> {
        let refreshed_at = now();
        let expires_at = format_timestamp(chrono::Utc::now() + ttl);

        sqlx::query("UPDATE sessions SET expires_at = ?, refreshed_at = ? WHERE id = ?")
            .bind(&expires_at)
            .bind(&refreshed_at)
            .bind(id)
            .execute(db)
            .await?;

        sqlx::query_as("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn delete(db: &SqlitePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Delete every session of a user, returning the removed rows
    pub async fn delete_all_for_user(db: &SqlitePool, user_id: &str) -> Result<Vec<Session>, sqlx::Error> {
        let sessions: Vec<Session> = sqlx::query_as("SELECT * FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(db)
            .await?;

        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(db)
            .await?;

        Ok(sessions)
    }

    /// Drop expired rows; returns how many were removed
    pub async fn purge_expired(db: &SqlitePool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now())
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }
}
