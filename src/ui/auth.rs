// Sign-in, sign-up and sign-out

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use super::extract::{clear_session_cookie, client_id, session_cookie, session_token};
use super::nav::NavView;
use super::notice::NoticeView;
use super::{chrome, render_template, render_template_with_status, AuthTemplate};
use crate::api::rate_limit::{ClientIp, Operation};
use crate::backend::{AuthProvider, SignOutScope, SignedIn};
use crate::error::BackendError;
use crate::session::resolve_once;
use crate::validation::MIN_PASSWORD_LEN;
use crate::AppState;

#[derive(Deserialize)]
pub struct Credentials {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub async fn auth_page(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let token = session_token(&jar);
    let gate = resolve_once(state.auth.as_ref(), state.store.as_ref(), token.as_deref()).await;
    let (jar, nav, notice) = chrome(jar, &gate);

    let template = AuthTemplate {
        nav,
        notice,
        error_message: String::new(),
        email: String::new(),
        min_password_len: MIN_PASSWORD_LEN,
    };
    (jar, render_template(template)).into_response()
}

fn auth_error(status: StatusCode, email: String, message: String) -> Response {
    let template = AuthTemplate {
        nav: NavView::default(),
        notice: NoticeView::default(),
        error_message: message,
        email,
        min_password_len: MIN_PASSWORD_LEN,
    };
    render_template_with_status(status, template)
}

fn auth_failure(email: String, err: BackendError) -> Response {
    let (status, message) = match &err {
        BackendError::InvalidCredentials => (StatusCode::UNAUTHORIZED, err.to_string()),
        BackendError::Rejected(message) => (StatusCode::BAD_REQUEST, message.clone()),
        _ => {
            error!(error = %err, "Authentication failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred during authentication. Please try again.".to_string(),
            )
        }
    };
    auth_error(status, email, message)
}

fn rate_limited(email: String, retry_after: u64) -> Response {
    auth_error(
        StatusCode::TOO_MANY_REQUESTS,
        email,
        format!("Too many attempts, try again in {} seconds", retry_after),
    )
}

/// Admins land on the admin page, everyone else on their account
fn signed_in(state: &AppState, jar: CookieJar, signed: SignedIn) -> Response {
    let target = if signed.profile.is_admin() {
        "/admin"
    } else {
        "/account"
    };
    (jar.add(session_cookie(state, signed.token)), Redirect::to(target)).into_response()
}

pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
    Form(form): Form<Credentials>,
) -> Response {
    let ip = ip.to_string();
    if let Err(retry_after) = state.rate_limiter.check(&ip, Operation::SignIn) {
        return rate_limited(form.email, retry_after);
    }

    let client = client_id(&jar);
    match state
        .auth
        .sign_in(&form.email, &form.password, client.as_deref())
        .await
    {
        Ok(signed) => signed_in(&state, jar, signed),
        Err(err) => auth_failure(form.email, err),
    }
}

pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
    Form(form): Form<Credentials>,
) -> Response {
    let ip = ip.to_string();
    if let Err(retry_after) = state.rate_limiter.check(&ip, Operation::SignUp) {
        return rate_limited(form.email, retry_after);
    }

    let client = client_id(&jar);
    match state
        .auth
        .sign_up(&form.email, &form.password, client.as_deref())
        .await
    {
        Ok(signed) => {
            info!(user_id = %signed.profile.id, "New account signed in");
            signed_in(&state, jar, signed)
        }
        Err(err) => auth_failure(form.email, err),
    }
}

/// Local scope: other browsers of the same user stay signed in
pub async fn sign_out(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(token) = session_token(&jar) {
        if let Err(e) = state.auth.sign_out(&token, SignOutScope::Local).await {
            error!(error = %e, "Error signing out");
        }
    }
    (clear_session_cookie(jar), Redirect::to("/")).into_response()
}
