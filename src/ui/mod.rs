// Server-rendered pages
// Askama templates, cookie sessions and flash notices

mod account;
mod auth;
mod deals;
pub mod extract;
pub mod nav;
pub mod notice;
mod templates;

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;

use crate::session::{resolve_once, GatePhase, GateState, Viewer};
use crate::AppState;

use extract::session_token;
use nav::NavView;
use notice::{take_notice, NoticeView};
pub use templates::*;

// Helper to render templates and handle errors
fn render_template<T: Template>(template: T) -> Response {
    render_template_with_status(StatusCode::OK, template)
}

fn render_template_with_status<T: Template>(status: StatusCode, template: T) -> Response {
    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Template render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Template error: {}", e)).into_response()
        }
    }
}

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/auth", get(auth::auth_page))
        .route("/auth/sign-in", post(auth::sign_in))
        .route("/auth/sign-up", post(auth::sign_up))
        .route("/auth/sign-out", post(auth::sign_out))
        // Authenticated
        .route("/account", get(account::account_page))
        .route("/deals", get(deals::deals_page).post(deals::create_deal))
        .route(
            "/deals/:deal_id/loan-request",
            get(deals::loan_request_page).post(deals::save_loan_request),
        )
        // Admin
        .route("/admin", get(account::admin_page))
        .route("/admin/users/:id/role", post(account::set_user_role))
}

/// Gate state for a viewer the route guard already resolved
fn viewer_state(viewer: &Viewer) -> GateState {
    GateState {
        phase: GatePhase::Ready,
        session: Some(viewer.session.clone()),
        is_admin: viewer.is_admin(),
    }
}

/// Navigation for the page and the pending notice, which is consumed
fn chrome(jar: CookieJar, state: &GateState) -> (CookieJar, NavView, NoticeView) {
    let (jar, notice) = take_notice(jar);
    (jar, NavView::from(state), NoticeView::from(notice))
}

// Landing page
async fn index(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let token = session_token(&jar);
    let gate = resolve_once(state.auth.as_ref(), state.store.as_ref(), token.as_deref()).await;
    let (jar, nav, notice) = chrome(jar, &gate);

    let template = IndexTemplate {
        nav,
        notice,
        signed_in: gate.session.is_some(),
    };
    (jar, render_template(template)).into_response()
}
