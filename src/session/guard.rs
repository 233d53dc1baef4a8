//! Route guard shared by every protected page.
//!
//! Authentication is checked first, the role second, and page data is only
//! loaded by the handler once both pass.

use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{AuthProvider, ProfileStore};
use crate::db::{Profile, Session};
use crate::error::{AppError, BackendError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Authenticated,
    Admin,
}

/// The signed-in viewer of a protected page
#[derive(Debug, Clone)]
pub struct Viewer {
    pub session: Session,
    pub profile: Profile,
}

impl Viewer {
    pub fn user_id(&self) -> &str {
        &self.profile.id
    }

    pub fn is_admin(&self) -> bool {
        self.profile.is_admin()
    }
}

#[derive(Debug, Error)]
pub enum GuardRejection {
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("Access Denied")]
    AuthorizationDenied,
    #[error("could not verify access: {0}")]
    Backend(BackendError),
}

impl GuardRejection {
    /// Where a page request is sent instead
    pub fn redirect_target(&self) -> &'static str {
        match self {
            GuardRejection::AuthenticationRequired => "/auth",
            GuardRejection::AuthorizationDenied => "/account",
            GuardRejection::Backend(_) => "/auth",
        }
    }
}

impl From<GuardRejection> for AppError {
    fn from(rejection: GuardRejection) -> Self {
        match rejection {
            GuardRejection::AuthenticationRequired => AppError::AuthenticationRequired,
            GuardRejection::AuthorizationDenied => AppError::AuthorizationDenied,
            GuardRejection::Backend(err) => AppError::Backend(err),
        }
    }
}

pub struct RouteGuard<'a> {
    auth: &'a dyn AuthProvider,
    profiles: &'a dyn ProfileStore,
}

impl<'a> RouteGuard<'a> {
    pub fn new(auth: &'a dyn AuthProvider, profiles: &'a dyn ProfileStore) -> Self {
        Self { auth, profiles }
    }

    /// Fails closed: any backend failure rejects the request
    pub async fn check(&self, token: Option<&str>, access: Access) -> Result<Viewer, GuardRejection> {
        let token = token.ok_or(GuardRejection::AuthenticationRequired)?;

        let session = self
            .auth
            .current_session(token)
            .await
            .map_err(|err| {
                warn!(error = %err, "Session lookup failed");
                GuardRejection::Backend(err)
            })?
            .ok_or(GuardRejection::AuthenticationRequired)?;

        let profile = match self.profiles.fetch_profile(&session.user_id).await {
            Ok(profile) => profile,
            // A session whose profile is gone is not a usable session
            Err(BackendError::NotFound) => return Err(GuardRejection::AuthenticationRequired),
            Err(err) => {
                warn!(user_id = %session.user_id, error = %err, "Profile lookup failed");
                return Err(GuardRejection::Backend(err));
            }
        };

        if access == Access::Admin && !profile.is_admin() {
            debug!(user_id = %profile.id, "Admin access denied");
            return Err(GuardRejection::AuthorizationDenied);
        }

        Ok(Viewer { session, profile })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SqliteAuthProvider, SqliteStore};
    use crate::db::{self, Role};

    async fn setup() -> (SqliteAuthProvider, SqliteStore) {
        let pool = db::init_in_memory().await.unwrap();
        let auth = SqliteAuthProvider::new(
            pool.clone(),
            chrono::Duration::hours(1),
            Some("admin@example.com".to_string()),
        );
        (auth, SqliteStore::new(pool))
    }

    #[tokio::test]
    async fn test_missing_or_unknown_token_requires_auth() {
        let (auth, store) = setup().await;
        let guard = RouteGuard::new(&auth, &store);

        assert!(matches!(
            guard.check(None, Access::Authenticated).await,
            Err(GuardRejection::AuthenticationRequired)
        ));
        assert!(matches!(
            guard.check(Some("nope"), Access::Admin).await,
            Err(GuardRejection::AuthenticationRequired)
        ));
    }

    #[tokio::test]
    async fn test_user_denied_admin_page() {
        let (auth, store) = setup().await;
        let user = auth.sign_up("u@example.com", "password123", None).await.unwrap();
        let guard = RouteGuard::new(&auth, &store);

        let viewer = guard
            .check(Some(&user.token), Access::Authenticated)
            .await
            .unwrap();
        assert_eq!(viewer.user_id(), user.profile.id);

        let denied = guard.check(Some(&user.token), Access::Admin).await;
        let rejection = denied.unwrap_err();
        assert!(matches!(rejection, GuardRejection::AuthorizationDenied));
        assert_eq!(rejection.redirect_target(), "/account");
        assert_eq!(rejection.to_string(), "Access Denied");
    }

    #[tokio::test]
    async fn test_admin_passes_admin_check() {
        let (auth, store) = setup().await;
        let admin = auth.sign_up("admin@example.com", "password123", None).await.unwrap();
        let guard = RouteGuard::new(&auth, &store);

        let viewer = guard.check(Some(&admin.token), Access::Admin).await.unwrap();
        assert!(viewer.is_admin());
    }

    #[tokio::test]
    async fn test_promoted_user_passes_on_next_check() {
        let (auth, store) = setup().await;
        let user = auth.sign_up("u@example.com", "password123", None).await.unwrap();
        auth.set_role(&user.profile.id, Role::Admin).await.unwrap();

        let guard = RouteGuard::new(&auth, &store);
        assert!(guard.check(Some(&user.token), Access::Admin).await.is_ok());
    }

    #[test]
    fn test_redirect_targets() {
        assert_eq!(GuardRejection::AuthenticationRequired.redirect_target(), "/auth");
        assert_eq!(
            GuardRejection::Backend(BackendError::NotFound).redirect_target(),
            "/auth"
        );
    }
}
