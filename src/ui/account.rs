// Account page and admin user management

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use super::extract::{RequireAdmin, RequireUser};
use super::notice::{set_notice, Notice};
use super::{chrome, render_template, viewer_state, AccountTemplate, AdminTemplate, UserRow};
use crate::backend::ProfileStore;
use crate::db::Role;
use crate::error::BackendError;
use crate::AppState;

pub async fn account_page(RequireUser(viewer): RequireUser, jar: CookieJar) -> Response {
    let (jar, nav, notice) = chrome(jar, &viewer_state(&viewer));

    let template = AccountTemplate {
        nav,
        notice,
        email: viewer.profile.email.clone(),
        role: viewer.profile.role().to_string(),
        email_verified: viewer.profile.email_verified,
    };
    (jar, render_template(template)).into_response()
}

pub async fn admin_page(
    State(state): State<Arc<AppState>>,
    RequireAdmin(viewer): RequireAdmin,
    jar: CookieJar,
) -> Response {
    let (jar, nav, mut notice) = chrome(jar, &viewer_state(&viewer));

    let users = match state.store.list_profiles().await {
        Ok(profiles) => profiles
            .into_iter()
            .map(|p| UserRow::new(p, viewer.user_id()))
            .collect(),
        Err(e) => {
            error!(error = %e, "Failed to list users");
            notice = Some(Notice::error("Failed to load users")).into();
            Vec::new()
        }
    };

    let template = AdminTemplate {
        nav,
        notice,
        users,
    };
    (jar, render_template(template)).into_response()
}

#[derive(Deserialize)]
pub struct RoleForm {
    role: String,
}

pub async fn set_user_role(
    State(state): State<Arc<AppState>>,
    RequireAdmin(viewer): RequireAdmin,
    jar: CookieJar,
    Path(id): Path<String>,
    Form(form): Form<RoleForm>,
) -> Response {
    let notice = match Role::from_str(&form.role) {
        None => Notice::error(format!("Unknown role '{}'", form.role)),
        Some(Role::User) if id == viewer.user_id() => {
            Notice::error("You cannot remove your own admin role")
        }
        Some(role) => match state.auth.set_role(&id, role).await {
            Ok(()) => {
                info!(admin_id = %viewer.user_id(), user_id = %id, role = %role, "Role updated by admin");
                Notice::success(format!("Role changed to {}", role))
            }
            Err(BackendError::NotFound) => Notice::error("User not found"),
            Err(e) => {
                error!(error = %e, user_id = %id, "Failed to update role");
                Notice::error("Failed to update role")
            }
        },
    };

    (set_notice(jar, notice), Redirect::to("/admin")).into_response()
}
