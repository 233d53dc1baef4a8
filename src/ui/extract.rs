//! Session cookies and the route guard extractors.
//!
//! Page handlers declare their requirement by taking `RequireUser` or
//! `RequireAdmin`. Page requests are redirected on rejection, `/api/`
//! requests get a JSON error.

use axum::{
    async_trait,
    extract::{FromRequestParts, OriginalUri, Request},
    http::{header, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

use super::notice::{set_notice, Notice};
use crate::api::error::ApiError;
use crate::error::AppError;
use crate::session::{Access, GuardRejection, RouteGuard, Viewer};
use crate::AppState;

pub const SESSION_COOKIE: &str = "dd_session";
pub const CLIENT_COOKIE: &str = "dd_client";

pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

pub fn client_id(jar: &CookieJar) -> Option<String> {
    jar.get(CLIENT_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

pub fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(state.config.auth.secure_cookies)
        .same_site(SameSite::Lax)
        .build()
}

pub fn clear_session_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// Give every browser a long-lived id so session events can be routed to
/// the gates mounted for it.
pub async fn ensure_client_id(jar: CookieJar, mut request: Request, next: Next) -> Response {
    if client_id(&jar).is_some() {
        return next.run(request).await;
    }

    let id = uuid::Uuid::new_v4().to_string();
    // Visible to this request's handlers as if the browser had sent it
    if let Ok(value) = HeaderValue::from_str(&format!("{}={}", CLIENT_COOKIE, id)) {
        request.headers_mut().append(header::COOKIE, value);
    }

    let response = next.run(request).await;
    let cookie = Cookie::build((CLIENT_COOKIE, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .permanent()
        .build();
    (jar.add(cookie), response).into_response()
}

pub struct RequireUser(pub Viewer);

pub struct RequireAdmin(pub Viewer);

/// Rejection for the guard extractors
pub struct GuardRedirect {
    rejection: GuardRejection,
    api: bool,
}

impl IntoResponse for GuardRedirect {
    fn into_response(self) -> Response {
        if self.api {
            return ApiError::from(AppError::from(self.rejection)).into_response();
        }

        let target = self.rejection.redirect_target();
        let jar = CookieJar::new();
        let jar = match &self.rejection {
            GuardRejection::AuthenticationRequired => jar,
            GuardRejection::AuthorizationDenied => set_notice(
                jar,
                Notice::error("You need admin access to view that page.").with_title("Access Denied"),
            ),
            GuardRejection::Backend(_) => set_notice(
                jar,
                Notice::error("We could not verify your session. Please sign in again."),
            ),
        };
        (jar, Redirect::to(target)).into_response()
    }
}

/// Nested routers see the path with their prefix stripped; the full request
/// path is kept in `OriginalUri`.
fn is_api_request(parts: &Parts) -> bool {
    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map(|uri| uri.0.path())
        .unwrap_or_else(|| parts.uri.path());
    path.starts_with("/api/")
}

async fn guard(parts: &Parts, state: &AppState, access: Access) -> Result<Viewer, GuardRedirect> {
    let jar = CookieJar::from_headers(&parts.headers);
    let token = session_token(&jar);
    let api = is_api_request(parts);

    RouteGuard::new(state.auth.as_ref(), state.store.as_ref())
        .check(token.as_deref(), access)
        .await
        .map_err(|rejection| GuardRedirect { rejection, api })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = GuardRedirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        guard(parts, state, Access::Authenticated).await.map(Self)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = GuardRedirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        guard(parts, state, Access::Admin).await.map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn request_parts(uri: &str) -> Parts {
        HttpRequest::builder().uri(uri).body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_nested_api_path_is_detected_from_original_uri() {
        // What the nested api router sees once "/api" is stripped
        let mut parts = request_parts("/deals/d1/loan-request/autosave");
        parts
            .extensions
            .insert(OriginalUri("/api/deals/d1/loan-request/autosave".parse().unwrap()));
        assert!(is_api_request(&parts));
    }

    #[test]
    fn test_page_path_is_not_api() {
        let mut parts = request_parts("/deals/d1/loan-request");
        parts
            .extensions
            .insert(OriginalUri("/deals/d1/loan-request".parse().unwrap()));
        assert!(!is_api_request(&parts));
        assert!(!is_api_request(&request_parts("/account")));
    }
}
