//! Session/role gate.
//!
//! A gate is mounted for one browser. It resolves the current session and the
//! viewer's role, then follows the auth provider's event stream and republishes
//! `{session, is_admin, is_loading}` on a watch channel for every change.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{AuthEvent, AuthEventKind, AuthProvider, AuthSubscription, ProfileStore};
use crate::db::{Role, Session};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePhase {
    #[default]
    Uninitialized,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateState {
    pub phase: GatePhase,
    pub session: Option<Session>,
    pub is_admin: bool,
}

impl GateState {
    pub fn is_loading(&self) -> bool {
        self.phase != GatePhase::Ready
    }

    pub fn view(&self) -> GateView {
        GateView {
            session: self.session.clone(),
            is_admin: self.is_admin,
            is_loading: self.is_loading(),
        }
    }
}

/// What consumers see of the gate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateView {
    pub session: Option<Session>,
    pub is_admin: bool,
    pub is_loading: bool,
}

/// Identifies the browser a gate is mounted for
#[derive(Debug, Clone, Default)]
pub struct ClientHandle {
    /// Long-lived browser id, independent of sign-in
    pub client_id: Option<String>,
    /// Session token from the browser's cookie, if any
    pub token: Option<String>,
}

pub struct SessionGate {
    state: watch::Receiver<GateState>,
    task: JoinHandle<()>,
}

impl SessionGate {
    /// Subscribe to auth events, then resolve the current session.
    ///
    /// The subscription is taken before the eager fetch so an event that
    /// lands during the fetch is still observed.
    pub fn mount(
        auth: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileStore>,
        client: ClientHandle,
    ) -> Self {
        let (tx, rx) = watch::channel(GateState::default());
        let subscription = auth.subscribe();
        let task = tokio::spawn(run_gate(auth, profiles, client, subscription, tx));
        Self { state: rx, task }
    }

    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    /// Wait until the gate has left loading. Returns the last state if the
    /// gate stopped first.
    pub async fn ready(&mut self) -> GateState {
        if let Ok(state) = self.state.wait_for(|s| !s.is_loading()).await {
            return state.clone();
        }
        self.state()
    }

    /// Next published state, or `None` once the gate has stopped
    pub async fn changed(&mut self) -> Option<GateState> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Stop following events and release the subscription
    pub fn unmount(self) {
        // Drop aborts the task
    }
}

impl Drop for SessionGate {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Resolve the state once, without following events
pub async fn resolve_once(
    auth: &dyn AuthProvider,
    profiles: &dyn ProfileStore,
    token: Option<&str>,
) -> GateState {
    let session = eager_session(auth, token).await;
    resolve(profiles, session, false).await
}

async fn eager_session(auth: &dyn AuthProvider, token: Option<&str>) -> Option<Session> {
    let token = token?;
    match auth.current_session(token).await {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "Failed to fetch current session");
            None
        }
    }
}

/// Look up the role for `session`. A failed profile fetch keeps
/// `previous_admin`; the state is `Ready` either way.
async fn resolve(
    profiles: &dyn ProfileStore,
    session: Option<Session>,
    previous_admin: bool,
) -> GateState {
    let is_admin = match &session {
        None => false,
        Some(session) => match profiles.fetch_profile(&session.user_id).await {
            Ok(profile) => profile.role() == Role::Admin,
            Err(err) => {
                warn!(user_id = %session.user_id, error = %err, "Failed to fetch profile role");
                previous_admin
            }
        },
    };

    GateState {
        phase: GatePhase::Ready,
        session,
        is_admin,
    }
}

/// The session an event leaves this gate with, or `None` when the event is
/// not addressed to it
fn apply_event(
    event: &AuthEvent,
    client: &ClientHandle,
    current: Option<&Session>,
) -> Option<Option<Session>> {
    let current_id = current.map(|s| s.id.as_str());
    match event.kind {
        AuthEventKind::SignedIn => {
            let ours = client.client_id.is_some() && event.client_id == client.client_id;
            ours.then(|| event.session.clone())
        }
        AuthEventKind::TokenRefreshed => {
            let ours = current_id.is_some() && event.session_id.as_deref() == current_id;
            ours.then(|| event.session.clone())
        }
        AuthEventKind::SignedOut => {
            let ours = current_id.is_some() && event.session_id.as_deref() == current_id;
            ours.then_some(None)
        }
        AuthEventKind::UserUpdated => {
            let ours = current.is_some_and(|s| s.user_id == event.user_id);
            ours.then(|| current.cloned())
        }
    }
}

async fn run_gate(
    auth: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileStore>,
    client: ClientHandle,
    mut subscription: AuthSubscription,
    tx: watch::Sender<GateState>,
) {
    tx.send_modify(|s| s.phase = GatePhase::Loading);

    let session = eager_session(auth.as_ref(), client.token.as_deref()).await;
    let state = resolve(profiles.as_ref(), session, false).await;
    debug!(
        client_id = ?client.client_id,
        signed_in = state.session.is_some(),
        is_admin = state.is_admin,
        "Session gate ready"
    );
    let _ = tx.send(state);

    while let Some(event) = subscription.recv().await {
        let (current, previous_admin) = {
            let state = tx.borrow();
            (state.session.clone(), state.is_admin)
        };

        let Some(session) = apply_event(&event, &client, current.as_ref()) else {
            continue;
        };

        debug!(kind = ?event.kind, user_id = %event.user_id, "Session gate event");
        tx.send_modify(|s| {
            s.phase = GatePhase::Loading;
            s.session = session.clone();
        });

        let state = resolve(profiles.as_ref(), session, previous_admin).await;
        if tx.send(state).is_err() {
            break;
        }
    }
}
