use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use axum_extra::extract::CookieJar;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tracing::debug;

use super::error::ApiError;
use crate::backend::{AuthProvider, ProfileStore};
use crate::db::Session;
use crate::error::BackendError;
use crate::session::{resolve_once, ClientHandle, GateState, GateView, SessionGate};
use crate::ui::extract::{client_id, session_token};
use crate::AppState;

/// Current gate view for the calling browser
pub async fn current_session(State(state): State<Arc<AppState>>, jar: CookieJar) -> Json<GateView> {
    let token = session_token(&jar);
    let gate = resolve_once(state.auth.as_ref(), state.store.as_ref(), token.as_deref()).await;
    Json(gate.view())
}

/// Extend the calling browser's session
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Json<Session>, ApiError> {
    let token =
        session_token(&jar).ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    match state.auth.refresh(&token).await {
        Ok(session) => Ok(Json(session)),
        Err(BackendError::NotFound) => Err(ApiError::unauthorized("Session expired")),
        Err(e) => Err(e.into()),
    }
}

/// WebSocket stream of gate views.
///
/// A gate is mounted for the browser when the socket opens and unmounted
/// when it closes, so sign-ins, sign-outs and role changes reach the page
/// without a reload.
pub async fn session_events(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> impl IntoResponse {
    let client = ClientHandle {
        client_id: client_id(&jar),
        token: session_token(&jar),
    };
    ws.on_upgrade(move |socket| handle_gate_stream(socket, state, client))
}

async fn handle_gate_stream(socket: WebSocket, state: Arc<AppState>, client: ClientHandle) {
    let (sender, receiver) = socket.split();
    stream_gate(sender, receiver, state, client).await;
}

/// Forward gate states to `sender` until the peer closes `receiver`
async fn stream_gate<S, R>(mut sender: S, mut receiver: R, state: Arc<AppState>, client: ClientHandle)
where
    S: Sink<Message, Error = axum::Error> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let auth: Arc<dyn AuthProvider> = state.auth.clone();
    let profiles: Arc<dyn ProfileStore> = state.store.clone();
    let mut gate = SessionGate::mount(auth, profiles, client);

    if send_state(&mut sender, &gate.state()).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            next = gate.changed() => {
                match next {
                    Some(state) => {
                        if send_state(&mut sender, &state).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    gate.unmount();
    debug!("Session event stream closed");
}

async fn send_state<S>(sender: &mut S, state: &GateState) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(&state.view()).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}
