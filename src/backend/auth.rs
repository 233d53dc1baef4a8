//! Auth provider: account creation, password sign-in, session tokens and the
//! push-based session event stream.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::db::{DbPool, Profile, Role, Session};
use crate::error::BackendError;
use crate::validation;

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    /// Profile data (role) changed; `session` is `None`
    UserUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub user_id: String,
    /// Browser the session belongs to, when known
    pub client_id: Option<String>,
    /// Session the event is about; empty for `UserUpdated`
    pub session_id: Option<String>,
    /// Session state after the event: `None` once signed out
    pub session: Option<Session>,
}

impl AuthEvent {
    fn for_session(kind: AuthEventKind, session: &Session, after: Option<Session>) -> Self {
        Self {
            kind,
            user_id: session.user_id.clone(),
            client_id: session.client_id.clone(),
            session_id: Some(session.id.clone()),
            session: after,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutScope {
    /// This session only
    Local,
    /// Every session of the user
    Global,
}

/// A live subscription to session events. Dropping it unsubscribes.
pub struct AuthSubscription {
    rx: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    pub fn new(rx: broadcast::Receiver<AuthEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the provider is gone. Lagged events are
    /// skipped: consumers re-resolve from the next event they do receive.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Auth subscription lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// The session surface the gates consume
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The unexpired session for a token, if any
    async fn current_session(&self, token: &str) -> Result<Option<Session>, BackendError>;

    fn subscribe(&self) -> AuthSubscription;

    async fn sign_out(&self, token: &str, scope: SignOutScope) -> Result<(), BackendError>;
}

/// A freshly issued session. `token` is only ever returned here.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub token: String,
    pub session: Session,
    pub profile: Profile,
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, BackendError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| BackendError::Hashing(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// 32 random bytes, hex encoded
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct SqliteAuthProvider {
    db: DbPool,
    events: broadcast::Sender<AuthEvent>,
    session_ttl: chrono::Duration,
    admin_email: Option<String>,
}

impl SqliteAuthProvider {
    pub fn new(db: DbPool, session_ttl: chrono::Duration, admin_email: Option<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            db,
            events,
            session_ttl,
            admin_email,
        }
    }

    fn publish(&self, event: AuthEvent) {
        debug!(kind = ?event.kind, user_id = %event.user_id, "Publishing auth event");
        // No receivers is not an error
        let _ = self.events.send(event);
    }

    /// Create an account and sign it in.
    ///
    /// The configured admin email receives the admin role; every other
    /// account starts as a user.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        client_id: Option<&str>,
    ) -> Result<SignedIn, BackendError> {
        let email = validation::normalize_email(email);
        validation::validate_email(&email).map_err(BackendError::Rejected)?;
        validation::validate_password_strength(password).map_err(BackendError::Rejected)?;

        if Profile::find_by_email(&self.db, &email).await?.is_some() {
            return Err(BackendError::Rejected(
                "This email is already registered. Please try signing in instead.".to_string(),
            ));
        }

        let role = if self.admin_email.as_deref() == Some(email.as_str()) {
            Role::Admin
        } else {
            Role::User
        };

        let password_hash = hash_password(password)?;
        let profile = Profile::create(&self.db, &email, &password_hash, role).await?;
        info!(user_id = %profile.id, role = %role, "Account created");

        self.start_session(profile, client_id).await
    }

    /// Unknown email and wrong password fail identically.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        client_id: Option<&str>,
    ) -> Result<SignedIn, BackendError> {
        let email = validation::normalize_email(email);
        let profile = Profile::find_by_email(&self.db, &email)
            .await?
            .ok_or(BackendError::InvalidCredentials)?;

        if !verify_password(password, &profile.password_hash) {
            return Err(BackendError::InvalidCredentials);
        }

        self.start_session(profile, client_id).await
    }

    async fn start_session(
        &self,
        profile: Profile,
        client_id: Option<&str>,
    ) -> Result<SignedIn, BackendError> {
        let token = generate_token();
        let session = Session::create(
            &self.db,
            &profile.id,
            client_id,
            &hash_token(&token),
            self.session_ttl,
        )
        .await?;

        info!(user_id = %profile.id, session_id = %session.id, "Signed in");
        self.publish(AuthEvent::for_session(
            AuthEventKind::SignedIn,
            &session,
            Some(session.clone()),
        ));

        Ok(SignedIn {
            token,
            session,
            profile,
        })
    }

    /// Extend an unexpired session by the configured TTL
    pub async fn refresh(&self, token: &str) -> Result<Session, BackendError> {
        let current = self
            .current_session(token)
            .await?
            .ok_or(BackendError::NotFound)?;

        let refreshed = Session::extend(&self.db, &current.id, self.session_ttl)
            .await?
            .ok_or(BackendError::NotFound)?;

        self.publish(AuthEvent::for_session(
            AuthEventKind::TokenRefreshed,
            &refreshed,
            Some(refreshed.clone()),
        ));
        Ok(refreshed)
    }

    /// Admin action: change a role and notify that user's gates
    pub async fn set_role(&self, user_id: &str, role: Role) -> Result<(), BackendError> {
        if !Profile::set_role(&self.db, user_id, role).await? {
            return Err(BackendError::NotFound);
        }

        info!(user_id, role = %role, "Role changed");
        self.publish(AuthEvent {
            kind: AuthEventKind::UserUpdated,
            user_id: user_id.to_string(),
            client_id: None,
            session_id: None,
            session: None,
        });
        Ok(())
    }

    /// Remove expired session rows
    pub async fn purge_expired(&self) -> Result<u64, BackendError> {
        Ok(Session::purge_expired(&self.db).await?)
    }
}

#[async_trait]
impl AuthProvider for SqliteAuthProvider {
    async fn current_session(&self, token: &str) -> Result<Option<Session>, BackendError> {
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Session::find_active(&self.db, &hash_token(token)).await?)
    }

    fn subscribe(&self) -> AuthSubscription {
        AuthSubscription::new(self.events.subscribe())
    }

    async fn sign_out(&self, token: &str, scope: SignOutScope) -> Result<(), BackendError> {
        let Some(session) = self.current_session(token).await? else {
            // Already signed out
            return Ok(());
        };

        let revoked = match scope {
            SignOutScope::Local => {
                Session::delete(&self.db, &session.id).await?;
                vec![session]
            }
            SignOutScope::Global => Session::delete_all_for_user(&self.db, &session.user_id).await?,
        };

        for session in &revoked {
            info!(user_id = %session.user_id, session_id = %session.id, "Signed out");
            self.publish(AuthEvent::for_session(AuthEventKind::SignedOut, session, None));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn provider(admin_email: Option<&str>) -> SqliteAuthProvider {
        let pool = db::init_in_memory().await.unwrap();
        SqliteAuthProvider::new(
            pool,
            chrono::Duration::hours(1),
            admin_email.map(str::to_string),
        )
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse 1").unwrap();
        assert!(verify_password("correct horse 1", &hash));
        assert!(!verify_password("wrong horse 1", &hash));
        assert!(!verify_password("anything", "not-a-hash"));
    }

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert_ne!(token, generate_token());
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), "abc");
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let auth = provider(None).await;
        let signed_up = auth.sign_up("New@Example.com", "password123", Some("c1")).await.unwrap();
        assert_eq!(signed_up.profile.email, "new@example.com");
        assert_eq!(signed_up.profile.role(), Role::User);

        let signed_in = auth.sign_in("new@example.com", "password123", Some("c1")).await.unwrap();
        let current = auth.current_session(&signed_in.token).await.unwrap().unwrap();
        assert_eq!(current.user_id, signed_up.profile.id);
    }

    #[tokio::test]
    async fn test_admin_email_gets_admin_role() {
        let auth = provider(Some("boss@example.com")).await;
        let signed_up = auth.sign_up("boss@example.com", "password123", None).await.unwrap();
        assert!(signed_up.profile.is_admin());
    }

    #[tokio::test]
    async fn test_bad_credentials_are_indistinguishable() {
        let auth = provider(None).await;
        auth.sign_up("x@example.com", "password123", None).await.unwrap();

        let wrong_password = auth.sign_in("x@example.com", "password124", None).await;
        let unknown_email = auth.sign_in("y@example.com", "password123", None).await;
        assert!(matches!(wrong_password, Err(BackendError::InvalidCredentials)));
        assert!(matches!(unknown_email, Err(BackendError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_sign_up_rejections() {
        let auth = provider(None).await;
        assert!(matches!(
            auth.sign_up("not-an-email", "password123", None).await,
            Err(BackendError::Rejected(_))
        ));
        assert!(matches!(
            auth.sign_up("weak@example.com", "short", None).await,
            Err(BackendError::Rejected(_))
        ));

        auth.sign_up("dup@example.com", "password123", None).await.unwrap();
        assert!(matches!(
            auth.sign_up("DUP@example.com", "password123", None).await,
            Err(BackendError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_events_for_sign_in_and_local_sign_out() {
        let auth = provider(None).await;
        let mut events = auth.subscribe();

        let signed = auth.sign_up("ev@example.com", "password123", Some("browser")).await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedIn);
        assert_eq!(event.client_id.as_deref(), Some("browser"));
        assert_eq!(event.session.as_ref().map(|s| s.id.as_str()), Some(signed.session.id.as_str()));

        auth.sign_out(&signed.token, SignOutScope::Local).await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedOut);
        assert!(event.session.is_none());
        assert!(auth.current_session(&signed.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_global_sign_out_revokes_every_session() {
        let auth = provider(None).await;
        let first = auth.sign_up("g@example.com", "password123", Some("laptop")).await.unwrap();
        let second = auth.sign_in("g@example.com", "password123", Some("phone")).await.unwrap();

        let mut events = auth.subscribe();
        auth.sign_out(&first.token, SignOutScope::Global).await.unwrap();

        let mut clients = vec![
            events.recv().await.unwrap().client_id.unwrap(),
            events.recv().await.unwrap().client_id.unwrap(),
        ];
        clients.sort();
        assert_eq!(clients, vec!["laptop", "phone"]);
        assert!(auth.current_session(&second.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_unknown_token_is_noop() {
        let auth = provider(None).await;
        tokio_test::assert_ok!(auth.sign_out("nope", SignOutScope::Local).await);
    }

    #[tokio::test]
    async fn test_refresh_emits_token_refreshed() {
        let auth = provider(None).await;
        let signed = auth.sign_up("r@example.com", "password123", None).await.unwrap();
        let mut events = auth.subscribe();

        let refreshed = auth.refresh(&signed.token).await.unwrap();
        assert!(refreshed.refreshed_at.is_some());
        assert_eq!(events.recv().await.unwrap().kind, AuthEventKind::TokenRefreshed);

        assert!(matches!(auth.refresh("missing").await, Err(BackendError::NotFound)));
    }

    #[tokio::test]
    async fn test_set_role_emits_user_updated() {
        let auth = provider(None).await;
        let signed = auth.sign_up("role@example.com", "password123", None).await.unwrap();
        let mut events = auth.subscribe();

        auth.set_role(&signed.profile.id, Role::Admin).await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::UserUpdated);
        assert_eq!(event.user_id, signed.profile.id);
    }
}
