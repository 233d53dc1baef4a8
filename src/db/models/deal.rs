//! Deal models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::db::now;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    Active,
    Closed,
    Cancelled,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::Active => "active",
            DealStatus::Closed => "closed",
            DealStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(DealStatus::Active),
            "closed" => Some(DealStatus::Closed),
            "cancelled" => Some(DealStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for DealStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Deal {
    pub id: String,
    pub borrower_name: String,
    pub loan_amount: f64,
    pub status: String,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert payload; status is left to the table default
#[derive(Debug, Clone, Deserialize)]
pub struct NewDeal {
    pub borrower_name: String,
    pub loan_amount: f64,
    pub user_id: String,
}

impl Deal {
    pub fn status(&self) -> Option<DealStatus> {
        DealStatus::from_str(&self.status)
    }

    pub async fn create(db: &SqlitePool, new: &NewDeal) -> Result<Deal, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now();

        sqlx::query(
            r#"
            INSERT INTO deals (id, borrower_name, loan_amount, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.borrower_name)
        .bind(new.loan_amount)
        .bind(&new.user_id)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        // Re-read so the row reflects the table default for status
        sqlx::query_as("SELECT * FROM deals WHERE id = ?")
            .bind(&id)
            .fetch_one(db)
            .await
    }

    pub async fn find(db: &SqlitePool, id: &str) -> Result<Option<Deal>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM deals WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Newest first. `owner` restricts the list to one user's deals.
    pub async fn list(db: &SqlitePool, owner: Option<&str>) -> Result<Vec<Deal>, sqlx::Error> {
        match owner {
            Some(user_id) => {
                sqlx::query_as(
                    "SELECT * FROM deals WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
                )
                .bind(user_id)
                .fetch_all(db)
                .await
            }
            None => {
                sqlx::query_as("SELECT * FROM deals ORDER BY created_at DESC, rowid DESC")
                    .fetch_all(db)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, Profile, Role};

    #[tokio::test]
    async fn test_create_defaults_status_to_active() {
        let pool = db::init_in_memory().await.unwrap();
        let owner = Profile::create(&pool, "o@example.com", "hash", Role::User)
            .await
            .unwrap();

        let deal = Deal::create(
            &pool,
            &NewDeal {
                borrower_name: "Acme".to_string(),
                loan_amount: 100000.0,
                user_id: owner.id.clone(),
            },
        )
        .await
        .unwrap();

        assert_eq!(deal.status(), Some(DealStatus::Active));
        assert_eq!(deal.loan_amount, 100000.0);
    }

    #[tokio::test]
    async fn test_list_newest_first_and_owner_filter() {
        let pool = db::init_in_memory().await.unwrap();
        let alice = Profile::create(&pool, "alice@example.com", "hash", Role::User)
            .await
            .unwrap();
        let bob = Profile::create(&pool, "bob@example.com", "hash", Role::User)
            .await
            .unwrap();

        for (name, owner) in [("First", &alice), ("Second", &alice), ("Other", &bob)] {
            Deal::create(
                &pool,
                &NewDeal {
                    borrower_name: name.to_string(),
                    loan_amount: 1.0,
                    user_id: owner.id.clone(),
                },
            )
            .await
            .unwrap();
        }

        let alices = Deal::list(&pool, Some(&alice.id)).await.unwrap();
        let names: Vec<_> = alices.iter().map(|d| d.borrower_name.as_str()).collect();
        assert_eq!(names, vec!["Second", "First"]);

        assert_eq!(Deal::list(&pool, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_owner_is_rejected() {
        let pool = db::init_in_memory().await.unwrap();
        let result = Deal::create(
            &pool,
            &NewDeal {
                borrower_name: "Ghost".to_string(),
                loan_amount: 1.0,
                user_id: "nobody".to_string(),
            },
        )
        .await;
        assert!(result.is_err());
    }
}
