//! Data store seams used by the gates, the pages and the form engine.
//!
//! The traits cover exactly the reads and writes the core performs, so gates
//! and the form engine can run against in-memory fakes in tests.

use async_trait::async_trait;

use crate::db::{Deal, DbPool, LoanRequest, NewDeal, Profile, ProfileSummary, Role};
use crate::error::BackendError;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `BackendError::NotFound` when no profile has this id
    async fn fetch_profile(&self, id: &str) -> Result<Profile, BackendError>;

    async fn list_profiles(&self) -> Result<Vec<ProfileSummary>, BackendError>;
}

/// Which deals a viewer may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealScope<'a> {
    /// Only deals owned by this user id
    Owner(&'a str),
    All,
}

impl<'a> DealScope<'a> {
    pub fn for_viewer(user_id: &'a str, is_admin: bool) -> Self {
        if is_admin {
            DealScope::All
        } else {
            DealScope::Owner(user_id)
        }
    }

    pub fn allows(&self, deal: &Deal) -> bool {
        match self {
            DealScope::All => true,
            DealScope::Owner(user_id) => deal.user_id == *user_id,
        }
    }
}

#[async_trait]
pub trait DealStore: Send + Sync {
    async fn insert_deal(&self, deal: &NewDeal) -> Result<Deal, BackendError>;

    /// Newest first
    async fn list_deals(&self, scope: DealScope<'_>) -> Result<Vec<Deal>, BackendError>;

    /// `BackendError::NotFound` when missing or outside `scope`
    async fn fetch_deal(&self, id: &str, scope: DealScope<'_>) -> Result<Deal, BackendError>;
}

#[async_trait]
pub trait LoanRequestStore: Send + Sync {
    /// `Ok(None)` when the deal has no loan request yet
    async fn fetch_loan_request(&self, deal_id: &str) -> Result<Option<LoanRequest>, BackendError>;

    /// Insert or replace keyed by `deal_id`; last write wins
    async fn upsert_loan_request(&self, request: &LoanRequest) -> Result<(), BackendError>;
}

/// SQLite-backed implementation of every store
#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Role change performed as an admin action
    pub async fn set_role(&self, user_id: &str, role: Role) -> Result<(), BackendError> {
        if Profile::set_role(&self.db, user_id, role).await? {
            Ok(())
        } else {
            Err(BackendError::NotFound)
        }
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn fetch_profile(&self, id: &str) -> Result<Profile, BackendError> {
        Profile::find(&self.db, id).await?.ok_or(BackendError::NotFound)
    }

    async fn list_profiles(&self) -> Result<Vec<ProfileSummary>, BackendError> {
        Ok(Profile::list_with_last_sign_in(&self.db).await?)
    }
}

#[async_trait]
impl DealStore for SqliteStore {
    async fn insert_deal(&self, deal: &NewDeal) -> Result<Deal, BackendError> {
        Ok(Deal::create(&self.db, deal).await?)
    }

    async fn list_deals(&self, scope: DealScope<'_>) -> Result<Vec<Deal>, BackendError> {
        let owner = match scope {
            DealScope::Owner(user_id) => Some(user_id),
            DealScope::All => None,
        };
        Ok(Deal::list(&self.db, owner).await?)
    }

    async fn fetch_deal(&self, id: &str, scope: DealScope<'_>) -> Result<Deal, BackendError> {
        Deal::find(&self.db, id)
            .await?
            .filter(|deal| scope.allows(deal))
            .ok_or(BackendError::NotFound)
    }
}

#[async_trait]
impl LoanRequestStore for SqliteStore {
    async fn fetch_loan_request(&self, deal_id: &str) -> Result<Option<LoanRequest>, BackendError> {
        Ok(LoanRequest::find(&self.db, deal_id).await?)
    }

    async fn upsert_loan_request(&self, request: &LoanRequest) -> Result<(), BackendError> {
        request.upsert(&self.db).await?;
        Ok(())
    }
}
