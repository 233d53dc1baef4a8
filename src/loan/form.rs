//! Loan request form engine.
//!
//! Holds the in-memory values of one deal's loan request, keeps
//! `initial_rate = wsj_prime + spread` current as the inputs change, and
//! writes through the store on autosave and on explicit submit.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::schema::{coerce_number, derive_initial_rate, LoanPurpose, LoanRequestInput, PropertyType};
use crate::backend::LoanRequestStore;
use crate::db::LoanRequest;
use crate::error::{AppError, BackendError, FieldErrors};

#[derive(Debug, Error)]
pub enum FormError {
    #[error("{0} is derived and cannot be set directly")]
    ReadOnlyField(&'static str),
    #[error("{0}")]
    Validation(#[from] FieldErrors),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<FormError> for AppError {
    fn from(err: FormError) -> Self {
        match err {
            FormError::ReadOnlyField(field) => {
                AppError::Validation(FieldErrors::single(field, "This field is read-only"))
            }
            FormError::Validation(errors) => AppError::Validation(errors),
            FormError::Backend(err) => AppError::Backend(err),
        }
    }
}

pub struct LoanRequestForm {
    values: LoanRequest,
    store: Arc<dyn LoanRequestStore>,
}

impl LoanRequestForm {
    /// Saved values for the deal, or the defaults when nothing is saved yet
    pub async fn load(
        store: Arc<dyn LoanRequestStore>,
        deal_id: &str,
    ) -> Result<Self, BackendError> {
        let values = match store.fetch_loan_request(deal_id).await? {
            Some(values) => values,
            None => {
                debug!(deal_id, "No saved loan request, using defaults");
                LoanRequest::defaults(deal_id)
            }
        };
        Ok(Self::from_values(store, values))
    }

    /// Wrap values the caller already holds, such as the page's current
    /// snapshot. The derived field is recomputed on the way in.
    pub fn from_values(store: Arc<dyn LoanRequestStore>, mut values: LoanRequest) -> Self {
        values.initial_rate = derive_initial_rate(values.wsj_prime, values.spread);
        Self { values, store }
    }

    pub fn values(&self) -> &LoanRequest {
        &self.values
    }

    pub fn initial_rate(&self) -> f64 {
        self.values.initial_rate
    }

    pub async fn set_wsj_prime(&mut self, raw: &str) -> Result<f64, FormError> {
        self.update_rate_inputs(coerce_number(raw), self.values.spread)
            .await?;
        Ok(self.values.initial_rate)
    }

    pub async fn set_spread(&mut self, raw: &str) -> Result<f64, FormError> {
        self.update_rate_inputs(self.values.wsj_prime, coerce_number(raw))
            .await?;
        Ok(self.values.initial_rate)
    }

    /// Merge a page snapshot into the loaded values.
    ///
    /// Plain fields are taken as posted. WSJ prime and spread go through the
    /// derived-rate rule, so the snapshot is written only when one of them
    /// changed. Returns whether a write happened.
    pub async fn apply_snapshot(&mut self, input: &LoanRequestInput) -> Result<bool, FormError> {
        let snapshot = input.snapshot(&self.values.deal_id)?;
        let (wsj_prime, spread) = (snapshot.wsj_prime, snapshot.spread);
        self.values = LoanRequest {
            wsj_prime: self.values.wsj_prime,
            spread: self.values.spread,
            initial_rate: self.values.initial_rate,
            ..snapshot
        };
        self.update_rate_inputs(wsj_prime, spread).await
    }

    async fn update_rate_inputs(&mut self, wsj_prime: f64, spread: f64) -> Result<bool, FormError> {
        if wsj_prime == self.values.wsj_prime && spread == self.values.spread {
            return Ok(false);
        }
        finite_rate(wsj_prime, spread)?;
        self.values.wsj_prime = wsj_prime;
        self.values.spread = spread;
        self.recompute_and_autosave().await?;
        Ok(true)
    }

    /// Recompute the derived rate and upsert the whole snapshot.
    ///
    /// The snapshot is written as is; range checks belong to `submit`. When
    /// the write fails the recomputed values stay in memory. A sum that
    /// overflows is rejected before anything changes.
    pub async fn recompute_and_autosave(&mut self) -> Result<f64, FormError> {
        self.values.initial_rate = finite_rate(self.values.wsj_prime, self.values.spread)?;
        let deal_id = self.values.deal_id.clone();

        if let Err(err) = self.store.upsert_loan_request(&self.values).await {
            warn!(deal_id = %deal_id, error = %err, "Loan request autosave failed");
            return Err(FormError::Backend(err));
        }

        debug!(deal_id = %deal_id, initial_rate = self.values.initial_rate, "Loan request autosaved");
        Ok(self.values.initial_rate)
    }

    /// Set one field by name from raw input.
    ///
    /// `wsj_prime` and `spread` trigger the derived-rate autosave; other
    /// fields only change the in-memory values until the next save.
    pub async fn set(&mut self, field: &str, raw: &str) -> Result<(), FormError> {
        match field {
            "wsj_prime" => {
                self.set_wsj_prime(raw).await?;
            }
            "spread" => {
                self.set_spread(raw).await?;
            }
            "initial_rate" => return Err(FormError::ReadOnlyField("initial_rate")),
            "term" => self.values.term = coerce_number(raw).trunc() as i64,
            "monthly_payment" => self.values.monthly_payment = coerce_number(raw),
            "ltv" => self.values.ltv = coerce_number(raw),
            "collateral_coverage" => self.values.collateral_coverage = coerce_number(raw),
            "interest_only" => self.values.interest_only = matches!(raw.trim(), "true" | "on" | "1"),
            "loan_purpose" => {
                self.values.loan_purpose = LoanPurpose::from_str(raw)
                    .ok_or_else(|| FieldErrors::single("loan_purpose", "Invalid loan purpose"))?;
            }
            "property_type" => {
                self.values.property_type = PropertyType::from_str(raw)
                    .ok_or_else(|| FieldErrors::single("property_type", "Invalid property type"))?;
            }
            other => {
                return Err(FieldErrors::single(other.to_string(), "Unknown field").into());
            }
        }
        Ok(())
    }

    /// Explicit save: strict parse and range checks, then upsert.
    ///
    /// Nothing reaches the store unless every field is valid. The in-memory
    /// values only change once the write succeeded.
    pub async fn submit(&mut self, input: &LoanRequestInput) -> Result<&LoanRequest, FormError> {
        let values = input.parse(&self.values.deal_id)?;
        self.store.upsert_loan_request(&values).await?;

        info!(deal_id = %values.deal_id, "Loan request saved");
        self.values = values;
        Ok(&self.values)
    }
}

fn finite_rate(wsj_prime: f64, spread: f64) -> Result<f64, FieldErrors> {
    let rate = derive_initial_rate(wsj_prime, spread);
    if rate.is_finite() {
        Ok(rate)
    } else {
        Err(FieldErrors::single("initial_rate", "Initial rate is out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashMap<String, LoanRequest>>,
        writes: Mutex<Vec<LoanRequest>>,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl LoanRequestStore for MemoryStore {
        async fn fetch_loan_request(&self, deal_id: &str) -> Result<Option<LoanRequest>, BackendError> {
            Ok(self.rows.lock().get(deal_id).cloned())
        }

        async fn upsert_loan_request(&self, request: &LoanRequest) -> Result<(), BackendError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(BackendError::Rejected("store unavailable".to_string()));
            }
            self.writes.lock().push(request.clone());
            self.rows.lock().insert(request.deal_id.clone(), request.clone());
            Ok(())
        }
    }

    fn valid_input() -> LoanRequestInput {
        LoanRequestInput {
            wsj_prime: "5.25".to_string(),
            spread: "2".to_string(),
            term: "120".to_string(),
            monthly_payment: "900".to_string(),
            interest_only: Some("on".to_string()),
            loan_purpose: "Delayed Purchase".to_string(),
            property_type: "Multi-purpose".to_string(),
            ltv: "70".to_string(),
            collateral_coverage: "125".to_string(),
        }
    }

    #[tokio::test]
    async fn test_load_without_saved_row_uses_defaults() {
        let store = Arc::new(MemoryStore::default());
        let form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        assert_eq!(form.values(), &LoanRequest::defaults("deal-1"));
        assert_eq!(form.values().loan_purpose, LoanPurpose::Purchase);
        assert_eq!(form.values().property_type, PropertyType::MultiPurpose);
        // Loading alone never writes
        assert!(store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_typing_prime_then_spread_autosaves_each_time() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        assert_eq!(form.set_wsj_prime("5.25").await.unwrap(), 5.25);
        assert_eq!(form.set_spread("2.0").await.unwrap(), 7.25);

        let writes = store.writes.lock();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].initial_rate, 5.25);
        assert_eq!(writes[1].initial_rate, 7.25);
        assert_eq!(writes[1].wsj_prime, 5.25);
        assert_eq!(writes[1].spread, 2.0);
    }

    #[tokio::test]
    async fn test_non_numeric_input_counts_as_zero() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        form.set_wsj_prime("4").await.unwrap();
        assert_eq!(form.set_spread("abc").await.unwrap(), 4.0);
        assert_eq!(form.set_wsj_prime("").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_unchanged_value_does_not_autosave() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        form.set_spread("0").await.unwrap();
        form.set_spread("not a number").await.unwrap();
        assert!(store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_autosave_keeps_recomputed_state() {
        let store = Arc::new(MemoryStore::default());
        store.fail_writes.store(true, Ordering::SeqCst);
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        let result = form.set_wsj_prime("3.5").await;
        assert!(matches!(result, Err(FormError::Backend(_))));
        assert_eq!(form.values().wsj_prime, 3.5);
        assert_eq!(form.initial_rate(), 3.5);
        assert!(store.rows.lock().is_empty());
    }

    #[tokio::test]
    async fn test_initial_rate_is_read_only() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        let result = form.set("initial_rate", "9.99").await;
        assert!(matches!(result, Err(FormError::ReadOnlyField("initial_rate"))));
        assert_eq!(form.initial_rate(), 0.0);
        assert!(store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_set_other_fields_stays_in_memory() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        form.set("term", "240").await.unwrap();
        form.set("loan_purpose", "Second Trust Deed").await.unwrap();
        assert_eq!(form.values().term, 240);
        assert_eq!(form.values().loan_purpose, LoanPurpose::SecondTrustDeed);
        assert!(store.writes.lock().is_empty());

        assert!(matches!(
            form.set("loan_purpose", "Bridge").await,
            Err(FormError::Validation(_))
        ));
        assert!(matches!(form.set("color", "red").await, Err(FormError::Validation(_))));
    }

    #[tokio::test]
    async fn test_set_spread_by_name_autosaves() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        form.set("spread", "1.5").await.unwrap();
        assert_eq!(store.writes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_valid_input_upserts() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        let saved = form.submit(&valid_input()).await.unwrap().clone();
        assert_eq!(saved.initial_rate, 7.25);
        assert!(saved.interest_only);
        assert_eq!(store.rows.lock().get("deal-1"), Some(&saved));

        // Reload sees the saved row instead of defaults
        let reloaded = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();
        assert_eq!(reloaded.values(), &saved);
    }

    #[tokio::test]
    async fn test_invalid_submit_never_reaches_the_store() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        let mut input = valid_input();
        input.term = "361".to_string();
        input.loan_purpose = "Bridge Loan".to_string();

        match form.submit(&input).await {
            Err(FormError::Validation(errors)) => {
                assert!(errors.contains("term"));
                assert!(errors.contains("loan_purpose"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(store.writes.lock().is_empty());
        assert_eq!(form.values(), &LoanRequest::defaults("deal-1"));
    }

    #[tokio::test]
    async fn test_autosave_after_submit_last_write_wins() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        form.submit(&valid_input()).await.unwrap();
        form.set_spread("3").await.unwrap();

        let row = store.rows.lock().get("deal-1").cloned().unwrap();
        assert_eq!(row.spread, 3.0);
        assert_eq!(row.initial_rate, 8.25);
        assert_eq!(row.term, 120);
    }

    #[tokio::test]
    async fn test_apply_snapshot_saves_when_rate_input_changed() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        let mut input = valid_input();
        input.spread = "oops".to_string();
        assert!(form.apply_snapshot(&input).await.unwrap());
        assert_eq!(form.initial_rate(), 5.25);

        let row = store.rows.lock().get("deal-1").cloned().unwrap();
        assert_eq!(row.spread, 0.0);
        assert_eq!(row.term, 120);
        assert_eq!(row.loan_purpose, LoanPurpose::DelayedPurchase);
    }

    #[tokio::test]
    async fn test_apply_snapshot_without_rate_change_skips_write() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();
        form.submit(&valid_input()).await.unwrap();
        store.writes.lock().clear();

        let mut input = valid_input();
        input.term = "240".to_string();
        assert!(!form.apply_snapshot(&input).await.unwrap());
        assert_eq!(form.values().term, 240);
        assert!(store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_apply_snapshot_requires_known_literals() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        let mut input = valid_input();
        input.property_type = "Multifamily".to_string();
        assert!(matches!(
            form.apply_snapshot(&input).await,
            Err(FormError::Validation(_))
        ));
        assert!(store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_overflowing_rate_is_rejected_without_write() {
        let store = Arc::new(MemoryStore::default());
        let mut form = LoanRequestForm::load(store.clone(), "deal-1").await.unwrap();

        form.set_wsj_prime("1e308").await.unwrap();
        store.writes.lock().clear();

        match form.set_spread("1e308").await {
            Err(FormError::Validation(errors)) => assert!(errors.contains("initial_rate")),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(form.values().spread, 0.0);
        assert_eq!(form.initial_rate(), 1e308);
        assert!(store.writes.lock().is_empty());
    }

    #[test]
    fn test_form_error_maps_to_validation() {
        let err: AppError = FormError::ReadOnlyField("initial_rate").into();
        match err {
            AppError::Validation(errors) => assert!(errors.contains("initial_rate")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
