use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiError;
use crate::backend::{DealScope, DealStore};
use crate::error::{AppError, BackendError};
use crate::loan::{LoanRequestForm, LoanRequestInput};
use crate::ui::extract::RequireUser;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AutosaveResponse {
    pub deal_id: String,
    pub initial_rate: f64,
    pub saved: bool,
}

/// Merge the page's current snapshot into the saved loan request.
///
/// The write happens only when WSJ prime or spread differ from the saved
/// values. Numbers are coerced rather than range-checked; only an explicit
/// save enforces the bounds.
pub async fn autosave(
    State(state): State<Arc<AppState>>,
    RequireUser(viewer): RequireUser,
    Path(deal_id): Path<String>,
    Json(snapshot): Json<LoanRequestInput>,
) -> Result<Json<AutosaveResponse>, ApiError> {
    let scope = DealScope::for_viewer(viewer.user_id(), viewer.is_admin());
    let deal = state
        .store
        .fetch_deal(&deal_id, scope)
        .await
        .map_err(|e| match e {
            BackendError::NotFound => AppError::NotFound("Deal"),
            other => other.into(),
        })?;

    let mut form = LoanRequestForm::load(state.store.clone(), &deal.id).await?;
    let saved = form.apply_snapshot(&snapshot).await?;

    Ok(Json(AutosaveResponse {
        deal_id: deal.id,
        initial_rate: form.initial_rate(),
        saved,
    }))
}
