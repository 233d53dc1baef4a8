// Askama template definitions

use askama::Template;

use super::nav::NavView;
use super::notice::NoticeView;
use crate::db::{Deal, ProfileSummary};
use crate::error::FieldErrors;
use crate::loan::{LoanPurpose, LoanRequestInput, PropertyType};

/// Thousands-separated amount with up to two decimals, e.g. `1,250,000.5`
pub fn format_amount(amount: f64) -> String {
    let rounded = (amount * 100.0).round() / 100.0;
    let whole = rounded.trunc() as i64;
    let fraction = rounded - whole as f64;

    let digits = whole.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if whole < 0 {
        grouped.insert(0, '-');
    }

    if fraction.abs() > f64::EPSILON {
        let cents = format!("{:.2}", fraction.abs());
        grouped.push_str(cents.trim_start_matches('0').trim_end_matches('0'));
    }
    grouped
}

/// Date part of a stored timestamp
pub fn format_date(ts: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| ts.to_string())
}

/// Date and time of a stored timestamp
pub fn format_datetime(ts: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|_| ts.to_string())
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub nav: NavView,
    pub notice: NoticeView,
    pub signed_in: bool,
}

#[derive(Template)]
#[template(path = "auth.html")]
pub struct AuthTemplate {
    pub nav: NavView,
    pub notice: NoticeView,
    /// Empty when there is nothing to show
    pub error_message: String,
    pub email: String,
    pub min_password_len: usize,
}

#[derive(Template)]
#[template(path = "account.html")]
pub struct AccountTemplate {
    pub nav: NavView,
    pub notice: NoticeView,
    pub email: String,
    pub role: String,
    pub email_verified: bool,
}

// Admin user table row (Strings instead of Options for templates)
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub role: String,
    pub is_admin: bool,
    pub is_self: bool,
    pub email_verified: &'static str,
    pub created_at: String,
    pub last_sign_in: String, // "Never" if no sign-in
}

impl UserRow {
    pub fn new(profile: ProfileSummary, viewer_id: &str) -> Self {
        Self {
            is_admin: profile.role == "admin",
            is_self: profile.id == viewer_id,
            email_verified: if profile.email_verified { "Yes" } else { "No" },
            created_at: format_date(&profile.created_at),
            last_sign_in: profile
                .last_sign_in
                .as_deref()
                .map(format_datetime)
                .unwrap_or_else(|| "Never".to_string()),
            id: profile.id,
            email: profile.email,
            role: profile.role,
        }
    }
}

#[derive(Template)]
#[template(path = "admin.html")]
pub struct AdminTemplate {
    pub nav: NavView,
    pub notice: NoticeView,
    pub users: Vec<UserRow>,
}

pub struct DealRow {
    pub id: String,
    pub borrower_name: String,
    pub loan_amount: String,
    pub status: String,
    pub created_at: String,
}

impl From<Deal> for DealRow {
    fn from(deal: Deal) -> Self {
        Self {
            loan_amount: format_amount(deal.loan_amount),
            created_at: format_date(&deal.created_at),
            id: deal.id,
            borrower_name: deal.borrower_name,
            status: deal.status,
        }
    }
}

#[derive(Template)]
#[template(path = "deals.html")]
pub struct DealsTemplate {
    pub nav: NavView,
    pub notice: NoticeView,
    pub deals: Vec<DealRow>,
    /// Re-opens the new deal dialog with the submitted values
    pub dialog_open: bool,
    pub borrower_name: String,
    pub loan_amount: String,
    pub errors: FieldErrors,
}

impl DealsTemplate {
    pub fn field_error(&self, field: &str) -> String {
        self.errors.first(field).unwrap_or_default().to_string()
    }
}

pub struct OptionView {
    pub value: &'static str,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "loan_request.html")]
pub struct LoanRequestTemplate {
    pub nav: NavView,
    pub notice: NoticeView,
    pub deal_id: String,
    pub borrower_name: String,
    pub values: LoanRequestInput,
    pub initial_rate: String,
    pub interest_only: bool,
    pub purposes: Vec<OptionView>,
    pub property_types: Vec<OptionView>,
    pub errors: FieldErrors,
}

impl LoanRequestTemplate {
    pub fn new(
        nav: NavView,
        notice: NoticeView,
        deal: &Deal,
        values: LoanRequestInput,
        initial_rate: f64,
        errors: FieldErrors,
    ) -> Self {
        let purposes = LoanPurpose::ALL
            .iter()
            .map(|p| OptionView {
                value: p.as_str(),
                selected: p.as_str() == values.loan_purpose,
            })
            .collect();
        let property_types = PropertyType::ALL
            .iter()
            .map(|t| OptionView {
                value: t.as_str(),
                selected: t.as_str() == values.property_type,
            })
            .collect();

        Self {
            nav,
            notice,
            deal_id: deal.id.clone(),
            borrower_name: deal.borrower_name.clone(),
            interest_only: values.interest_only.is_some(),
            initial_rate: initial_rate.to_string(),
            values,
            purposes,
            property_types,
            errors,
        }
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains(field)
    }

    pub fn field_error(&self, field: &str) -> String {
        self.errors.first(field).unwrap_or_default().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(999.0), "999");
        assert_eq!(format_amount(1000.0), "1,000");
        assert_eq!(format_amount(1250000.5), "1,250,000.5");
        assert_eq!(format_amount(2500.25), "2,500.25");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2024-03-05T10:20:30.000Z"), "2024-03-05");
        assert_eq!(format_date("garbage"), "garbage");
    }

    #[test]
    fn test_user_row_never_signed_in() {
        let row = UserRow::new(
            ProfileSummary {
                id: "u1".to_string(),
                email: "a@example.com".to_string(),
                email_verified: false,
                role: "user".to_string(),
                created_at: "2024-03-05T10:20:30.000Z".to_string(),
                last_sign_in: None,
            },
            "u2",
        );
        assert_eq!(row.last_sign_in, "Never");
        assert_eq!(row.email_verified, "No");
        assert!(!row.is_self);
    }

    #[test]
    fn test_loan_request_template_selects_current_literals() {
        let deal = Deal {
            id: "d1".to_string(),
            borrower_name: "Acme".to_string(),
            loan_amount: 100.0,
            status: "active".to_string(),
            user_id: "u1".to_string(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let values = LoanRequestInput::from(&crate::db::LoanRequest::defaults("d1"));
        let template = LoanRequestTemplate::new(
            NavView::default(),
            NoticeView::default(),
            &deal,
            values,
            0.0,
            FieldErrors::single("term", "Must be between 1 and 360"),
        );

        let selected: Vec<_> = template.purposes.iter().filter(|o| o.selected).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].value, "Purchase");
        assert_eq!(template.purposes.len(), 16);
        assert!(template.has_error("term"));
        assert_eq!(template.field_error("ltv"), "");

        let html = template.render().unwrap();
        assert!(html.contains("Cash-out Refi – Projections"));
        assert!(html.contains("readonly"));
    }
}
