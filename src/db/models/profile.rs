//! Profile models: one row per account, carrying the role used for gating.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::db::now;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub email_verified: bool,
    pub role: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A profile joined with its most recent sign-in, for the admin user list
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProfileSummary {
    pub id: String,
    pub email: String,
    pub email_verified: bool,
    pub role: String,
    pub created_at: String,
    pub last_sign_in: Option<String>,
}

impl Profile {
    /// Unknown role strings are treated as the least-privileged role.
    pub fn role(&self) -> Role {
        Role::from_str(&self.role).unwrap_or(Role::User)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }

    pub async fn create(
        db: &SqlitePool,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Profile, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now();

        sqlx::query(
            r#"
            INSERT INTO profiles (id, email, email_verified, role, password_hash, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(email)
        .bind(role.as_str())
        .bind(password_hash)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Ok(Profile {
            id,
            email: email.to_string(),
            email_verified: false,
            role: role.as_str().to_string(),
            password_hash: password_hash.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub async fn find(db: &SqlitePool, id: &str) -> Result<Option<Profile>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM profiles WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_email(db: &SqlitePool, email: &str) -> Result<Option<Profile>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM profiles WHERE email = ?")
            .bind(email)
            .fetch_optional(db)
            .await
    }

    /// All profiles, newest first, with the time of their latest session
    pub async fn list_with_last_sign_in(db: &SqlitePool) -> Result<Vec<ProfileSummary>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT p.id, p.email, p.email_verified, p.role, p.created_at,
                   MAX(s.created_at) AS last_sign_in
            FROM profiles p
            LEFT JOIN sessions s ON s.user_id = p.id
            GROUP BY p.id
            ORDER BY p.created_at DESC, p.rowid DESC
            "#,
        )
        .fetch_all(db)
        .await
    }

    /// Returns false when no profile has the given id.
    pub async fn set_role(db: &SqlitePool, id: &str, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE profiles SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(now())
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
