// Deal list, deal creation and the loan request page

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use super::extract::RequireUser;
use super::nav::NavView;
use super::notice::{set_notice, Notice, NoticeView};
use super::{
    chrome, render_template, render_template_with_status, viewer_state, DealRow, DealsTemplate,
    LoanRequestTemplate,
};
use crate::api::rate_limit::Operation;
use crate::backend::{DealScope, DealStore};
use crate::db::{Deal, NewDeal};
use crate::error::{BackendError, FieldErrors};
use crate::loan::{coerce_number, derive_initial_rate, FormError, LoanRequestForm, LoanRequestInput};
use crate::session::Viewer;
use crate::validation;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NewDealForm {
    #[serde(default)]
    borrower_name: String,
    #[serde(default)]
    loan_amount: String,
}

pub async fn deals_page(
    State(state): State<Arc<AppState>>,
    RequireUser(viewer): RequireUser,
    jar: CookieJar,
) -> Response {
    let (jar, nav, notice) = chrome(jar, &viewer_state(&viewer));
    let page = render_deals(
        &state,
        &viewer,
        nav,
        notice,
        StatusCode::OK,
        NewDealForm::default(),
        FieldErrors::new(),
    )
    .await;
    (jar, page).into_response()
}

async fn render_deals(
    state: &AppState,
    viewer: &Viewer,
    nav: NavView,
    mut notice: NoticeView,
    status: StatusCode,
    form: NewDealForm,
    errors: FieldErrors,
) -> Response {
    let scope = DealScope::for_viewer(viewer.user_id(), viewer.is_admin());
    let deals = match state.store.list_deals(scope).await {
        Ok(deals) => deals.into_iter().map(DealRow::from).collect(),
        Err(e) => {
            error!(error = %e, user_id = %viewer.user_id(), "Failed to list deals");
            notice = Some(Notice::error("Failed to load deals")).into();
            Vec::new()
        }
    };

    let template = DealsTemplate {
        nav,
        notice,
        deals,
        dialog_open: !errors.is_empty(),
        borrower_name: form.borrower_name,
        loan_amount: form.loan_amount,
        errors,
    };
    render_template_with_status(status, template)
}

pub async fn create_deal(
    State(state): State<Arc<AppState>>,
    RequireUser(viewer): RequireUser,
    jar: CookieJar,
    Form(form): Form<NewDealForm>,
) -> Response {
    if let Err(retry_after) = state
        .rate_limiter
        .check(viewer.user_id(), Operation::CreateDeal)
    {
        let notice = Notice::error(format!(
            "Too many attempts, try again in {} seconds",
            retry_after
        ));
        return (set_notice(jar, notice), Redirect::to("/deals")).into_response();
    }

    let mut errors = FieldErrors::new();
    if let Err(message) = validation::validate_borrower_name(&form.borrower_name) {
        errors.add("borrower_name", message);
    }
    let loan_amount = match validation::parse_loan_amount(&form.loan_amount) {
        Ok(amount) => amount,
        Err(message) => {
            errors.add("loan_amount", message);
            0.0
        }
    };

    if !errors.is_empty() {
        let (jar, nav, _) = chrome(jar, &viewer_state(&viewer));
        let page = render_deals(
            &state,
            &viewer,
            nav,
            NoticeView::default(),
            StatusCode::BAD_REQUEST,
            form,
            errors,
        )
        .await;
        return (jar, page).into_response();
    }

    let new_deal = NewDeal {
        borrower_name: form.borrower_name.trim().to_string(),
        loan_amount,
        user_id: viewer.user_id().to_string(),
    };
    let notice = match state.store.insert_deal(&new_deal).await {
        Ok(deal) => {
            info!(deal_id = %deal.id, user_id = %deal.user_id, "Deal created");
            Notice::success("Deal created successfully")
        }
        Err(e) => {
            error!(error = %e, user_id = %viewer.user_id(), "Failed to create deal");
            Notice::error("Failed to create deal")
        }
    };
    (set_notice(jar, notice), Redirect::to("/deals")).into_response()
}

/// The deal if the viewer may see it, otherwise a redirect back to the list
async fn visible_deal(
    state: &AppState,
    viewer: &Viewer,
    deal_id: &str,
    jar: CookieJar,
) -> Result<(Deal, CookieJar), Response> {
    let scope = DealScope::for_viewer(viewer.user_id(), viewer.is_admin());
    match state.store.fetch_deal(deal_id, scope).await {
        Ok(deal) => Ok((deal, jar)),
        Err(BackendError::NotFound) => {
            let jar = set_notice(jar, Notice::error("Deal not found"));
            Err((jar, Redirect::to("/deals")).into_response())
        }
        Err(e) => {
            error!(error = %e, deal_id, "Failed to load deal");
            let jar = set_notice(jar, Notice::error("Failed to load deal"));
            Err((jar, Redirect::to("/deals")).into_response())
        }
    }
}

fn loan_request_path(deal_id: &str) -> String {
    format!("/deals/{}/loan-request", deal_id)
}

pub async fn loan_request_page(
    State(state): State<Arc<AppState>>,
    RequireUser(viewer): RequireUser,
    jar: CookieJar,
    Path(deal_id): Path<String>,
) -> Response {
    let (deal, jar) = match visible_deal(&state, &viewer, &deal_id, jar).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let form = match LoanRequestForm::load(state.store.clone(), &deal.id).await {
        Ok(form) => form,
        Err(e) => {
            error!(error = %e, deal_id = %deal.id, "Failed to load loan request");
            let jar = set_notice(jar, Notice::error("Failed to load loan request"));
            return (jar, Redirect::to("/deals")).into_response();
        }
    };

    let (jar, nav, notice) = chrome(jar, &viewer_state(&viewer));
    let template = LoanRequestTemplate::new(
        nav,
        notice,
        &deal,
        LoanRequestInput::from(form.values()),
        form.initial_rate(),
        FieldErrors::new(),
    );
    (jar, render_template(template)).into_response()
}

pub async fn save_loan_request(
    State(state): State<Arc<AppState>>,
    RequireUser(viewer): RequireUser,
    jar: CookieJar,
    Path(deal_id): Path<String>,
    Form(input): Form<LoanRequestInput>,
) -> Response {
    let (deal, jar) = match visible_deal(&state, &viewer, &deal_id, jar).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let mut form = match LoanRequestForm::load(state.store.clone(), &deal.id).await {
        Ok(form) => form,
        Err(e) => {
            error!(error = %e, deal_id = %deal.id, "Failed to load loan request");
            let jar = set_notice(jar, Notice::error("Failed to save loan request"));
            return (jar, Redirect::to(&loan_request_path(&deal.id))).into_response();
        }
    };

    match form.submit(&input).await {
        Ok(_) => {
            info!(deal_id = %deal.id, user_id = %viewer.user_id(), "Loan request saved");
            let jar = set_notice(jar, Notice::success("Loan request saved successfully"));
            (jar, Redirect::to(&loan_request_path(&deal.id))).into_response()
        }
        Err(FormError::Validation(errors)) => {
            let (jar, nav, _) = chrome(jar, &viewer_state(&viewer));
            let notice = Some(Notice::error(errors.summary())).into();
            let initial_rate =
                derive_initial_rate(coerce_number(&input.wsj_prime), coerce_number(&input.spread));
            let template =
                LoanRequestTemplate::new(nav, notice, &deal, input, initial_rate, errors);
            (jar, render_template_with_status(StatusCode::BAD_REQUEST, template)).into_response()
        }
        Err(e) => {
            error!(error = %e, deal_id = %deal.id, "Failed to save loan request");
            let jar = set_notice(jar, Notice::error("Failed to save loan request"));
            (jar, Redirect::to(&loan_request_path(&deal.id))).into_response()
        }
    }
}
