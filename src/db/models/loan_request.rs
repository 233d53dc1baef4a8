//! Loan request models: at most one row per deal, written by upsert.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use crate::db::now;
use crate::loan::{LoanPurpose, PropertyType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub deal_id: String,
    pub wsj_prime: f64,
    pub spread: f64,
    pub initial_rate: f64,
    pub term: i64,
    pub monthly_payment: f64,
    pub interest_only: bool,
    pub loan_purpose: LoanPurpose,
    pub property_type: PropertyType,
    pub ltv: f64,
    pub collateral_coverage: f64,
}

fn decode_error(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unrecognised value '{}'", value).into(),
    }
}

impl<'r> FromRow<'r, SqliteRow> for LoanRequest {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let loan_purpose: String = row.try_get("loan_purpose")?;
        let property_type: String = row.try_get("property_type")?;

        Ok(Self {
            deal_id: row.try_get("deal_id")?,
            wsj_prime: row.try_get("wsj_prime")?,
            spread: row.try_get("spread")?,
            initial_rate: row.try_get("initial_rate")?,
            term: row.try_get("term")?,
            monthly_payment: row.try_get("monthly_payment")?,
            interest_only: row.try_get("interest_only")?,
            loan_purpose: LoanPurpose::from_str(&loan_purpose)
                .ok_or_else(|| decode_error("loan_purpose", &loan_purpose))?,
            property_type: PropertyType::from_str(&property_type)
                .ok_or_else(|| decode_error("property_type", &property_type))?,
            ltv: row.try_get("ltv")?,
            collateral_coverage: row.try_get("collateral_coverage")?,
        })
    }
}

impl LoanRequest {
    /// Values used when a deal has no saved loan request yet
    pub fn defaults(deal_id: &str) -> Self {
        Self {
            deal_id: deal_id.to_string(),
            wsj_prime: 0.0,
            spread: 0.0,
            initial_rate: 0.0,
            term: 0,
            monthly_payment: 0.0,
            interest_only: false,
            loan_purpose: LoanPurpose::default(),
            property_type: PropertyType::default(),
            ltv: 0.0,
            collateral_coverage: 0.0,
        }
    }

    pub async fn find(db: &SqlitePool, deal_id: &str) -> Result<Option<LoanRequest>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM loan_requests WHERE deal_id = ?")
            .bind(deal_id)
            .fetch_optional(db)
            .await
    }

    /// Insert or replace the row for `deal_id`. Last write wins.
    pub async fn upsert(&self, db: &SqlitePool) -> Result<(), sqlx::Error> {
        let now = now();

        sqlx::query(
            r#"
            INSERT INTO loan_requests (
                deal_id, wsj_prime, spread, initial_rate, term, monthly_payment,
                interest_only, loan_purpose, property_type, ltv, collateral_coverage,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(deal_id) DO UPDATE SET
                wsj_prime = excluded.wsj_prime,
                spread = excluded.spread,
                initial_rate = excluded.initial_rate,
                term = excluded.term,
                monthly_payment = excluded.monthly_payment,
                interest_only = excluded.interest_only,
                loan_purpose = excluded.loan_purpose,
                property_type = excluded.property_type,
                ltv = excluded.ltv,
                collateral_coverage = excluded.collateral_coverage,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.deal_id)
        .bind(self.wsj_prime)
        .bind(self.spread)
        .bind(self.initial_rate)
        .bind(self.term)
        .bind(self.monthly_payment)
        .bind(self.interest_only)
        .bind(self.loan_purpose.as_str())
        .bind(self.property_type.as_str())
        .bind(self.ltv)
        .bind(self.collateral_coverage)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Ok(())
    }
}
