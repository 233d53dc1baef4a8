//! Loan request schema: enumerated literals, numeric ranges and parsing of
//! raw form input.
//!
//! Validation fails closed. Every field outside its range or outside its
//! enumerated set is reported with a field-level message and nothing is
//! written.

use serde::{Deserialize, Serialize};

use crate::db::LoanRequest;
use crate::error::FieldErrors;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanPurpose {
    #[default]
    #[serde(rename = "Purchase")]
    Purchase,
    #[serde(rename = "Purchase based upon Projections")]
    PurchaseProjections,
    #[serde(rename = "Special Purpose Purchase based upon Projections")]
    SpecialPurposePurchaseProjections,
    #[serde(rename = "Rate and Term Refinance")]
    RateAndTermRefinance,
    #[serde(rename = "R/T Refinance – Projections")]
    RateTermRefinanceProjections,
    #[serde(rename = "Special Purpose R/T Refinance")]
    SpecialPurposeRateTermRefinance,
    #[serde(rename = "Spec. Purp. R/T Refi – Projections")]
    SpecialPurposeRateTermRefiProjections,
    #[serde(rename = "Cash-out Refinance")]
    CashOutRefinance,
    #[serde(rename = "Cash-out Refi – Projections")]
    CashOutRefiProjections,
    #[serde(rename = "Limited Cash-out Refinance")]
    LimitedCashOutRefinance,
    #[serde(rename = "Limited Cash-out Refi – Projections")]
    LimitedCashOutRefiProjections,
    #[serde(rename = "Refi Partner Buyout")]
    RefiPartnerBuyout,
    #[serde(rename = "Refi Partner Buyout – Projections")]
    RefiPartnerBuyoutProjections,
    #[serde(rename = "Delayed Purchase")]
    DelayedPurchase,
    #[serde(rename = "Delayed Purchase – Projections")]
    DelayedPurchaseProjections,
    #[serde(rename = "Second Trust Deed")]
    SecondTrustDeed,
}

impl LoanPurpose {
    pub const ALL: [LoanPurpose; 16] = [
        LoanPurpose::Purchase,
        LoanPurpose::PurchaseProjections,
        LoanPurpose::SpecialPurposePurchaseProjections,
        LoanPurpose::RateAndTermRefinance,
        LoanPurpose::RateTermRefinanceProjections,
        LoanPurpose::SpecialPurposeRateTermRefinance,
        LoanPurpose::SpecialPurposeRateTermRefiProjections,
        LoanPurpose::CashOutRefinance,
        LoanPurpose::CashOutRefiProjections,
        LoanPurpose::LimitedCashOutRefinance,
        LoanPurpose::LimitedCashOutRefiProjections,
        LoanPurpose::RefiPartnerBuyout,
        LoanPurpose::RefiPartnerBuyoutProjections,
        LoanPurpose::DelayedPurchase,
        LoanPurpose::DelayedPurchaseProjections,
        LoanPurpose::SecondTrustDeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanPurpose::Purchase => "Purchase",
            LoanPurpose::PurchaseProjections => "Purchase based upon Projections",
            LoanPurpose::SpecialPurposePurchaseProjections => {
                "Special Purpose Purchase based upon Projections"
            }
            LoanPurpose::RateAndTermRefinance => "Rate and Term Refinance",
            LoanPurpose::RateTermRefinanceProjections => "R/T Refinance – Projections",
            LoanPurpose::SpecialPurposeRateTermRefinance => "Special Purpose R/T Refinance",
            LoanPurpose::SpecialPurposeRateTermRefiProjections => {
                "Spec. Purp. R/T Refi – Projections"
            }
            LoanPurpose::CashOutRefinance => "Cash-out Refinance",
            LoanPurpose::CashOutRefiProjections => "Cash-out Refi – Projections",
            LoanPurpose::LimitedCashOutRefinance => "Limited Cash-out Refinance",
            LoanPurpose::LimitedCashOutRefiProjections => "Limited Cash-out Refi – Projections",
            LoanPurpose::RefiPartnerBuyout => "Refi Partner Buyout",
            LoanPurpose::RefiPartnerBuyoutProjections => "Refi Partner Buyout – Projections",
            LoanPurpose::DelayedPurchase => "Delayed Purchase",
            LoanPurpose::DelayedPurchaseProjections => "Delayed Purchase – Projections",
            LoanPurpose::SecondTrustDeed => "Second Trust Deed",
        }
    }

    /// Exact match against the literal; no case folding
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == s)
    }
}

impl std::fmt::Display for LoanPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    #[default]
    #[serde(rename = "Multi-purpose")]
    MultiPurpose,
    #[serde(rename = "Special purpose")]
    SpecialPurpose,
}

impl PropertyType {
    pub const ALL: [PropertyType; 2] = [PropertyType::MultiPurpose, PropertyType::SpecialPurpose];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::MultiPurpose => "Multi-purpose",
            PropertyType::SpecialPurpose => "Special purpose",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == s)
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inclusive numeric bounds; `max` of `None` means unbounded above
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: Option<f64>,
}

impl Bounds {
    pub const fn between(min: f64, max: f64) -> Self {
        Self { min, max: Some(max) }
    }

    pub const fn at_least(min: f64) -> Self {
        Self { min, max: None }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && self.max.map_or(true, |max| value <= max)
    }

    fn message(&self) -> String {
        match self.max {
            Some(max) => format!("Must be between {} and {}", self.min, max),
            None => format!("Must be at least {}", self.min),
        }
    }
}

pub const PERCENT: Bounds = Bounds::between(0.0, 100.0);
pub const TERM_MONTHS: Bounds = Bounds::between(1.0, 360.0);
pub const MONTHLY_PAYMENT: Bounds = Bounds::at_least(0.0);
pub const COLLATERAL_COVERAGE: Bounds = Bounds::between(0.0, 1000.0);

/// The derived field: `initial_rate = wsj_prime + spread`
pub fn derive_initial_rate(wsj_prime: f64, spread: f64) -> f64 {
    wsj_prime + spread
}

/// Lenient coercion used by the reactive rule: unset, non-numeric or
/// non-finite input counts as 0.
pub fn coerce_number(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Range and invariant check over typed values
pub fn validate(values: &LoanRequest) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    for (field, value, bounds) in [
        ("wsj_prime", values.wsj_prime, PERCENT),
        ("spread", values.spread, PERCENT),
        ("initial_rate", values.initial_rate, PERCENT),
        ("monthly_payment", values.monthly_payment, MONTHLY_PAYMENT),
        ("ltv", values.ltv, PERCENT),
        ("collateral_coverage", values.collateral_coverage, COLLATERAL_COVERAGE),
    ] {
        if !bounds.contains(value) {
            errors.add(field, bounds.message());
        }
    }

    if !TERM_MONTHS.contains(values.term as f64) {
        errors.add("term", TERM_MONTHS.message());
    }

    if values.initial_rate != derive_initial_rate(values.wsj_prime, values.spread) {
        errors.add("initial_rate", "Initial rate must equal WSJ prime plus spread");
    }

    errors.finish()
}

/// Raw loan request form as posted by the browser.
///
/// `initial_rate` is intentionally absent: it is display-only and always
/// recomputed from `wsj_prime` and `spread`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoanRequestInput {
    #[serde(default)]
    pub wsj_prime: String,
    #[serde(default)]
    pub spread: String,
    #[serde(default)]
    pub term: String,
    #[serde(default)]
    pub monthly_payment: String,
    /// Checkbox: present (any value but "false") when ticked
    #[serde(default)]
    pub interest_only: Option<String>,
    #[serde(default)]
    pub loan_purpose: String,
    #[serde(default)]
    pub property_type: String,
    #[serde(default)]
    pub ltv: String,
    #[serde(default)]
    pub collateral_coverage: String,
}

impl LoanRequestInput {
    /// Strict parse for an explicit save. Every problem is collected before
    /// returning, and any problem blocks the save.
    pub fn parse(&self, deal_id: &str) -> Result<LoanRequest, FieldErrors> {
        let mut errors = FieldErrors::new();

        let wsj_prime = parse_number(&mut errors, "wsj_prime", &self.wsj_prime);
        let spread = parse_number(&mut errors, "spread", &self.spread);
        let term = parse_whole_number(&mut errors, "term", &self.term);
        let monthly_payment = parse_number(&mut errors, "monthly_payment", &self.monthly_payment);
        let ltv = parse_number(&mut errors, "ltv", &self.ltv);
        let collateral_coverage =
            parse_number(&mut errors, "collateral_coverage", &self.collateral_coverage);

        let loan_purpose = LoanPurpose::from_str(&self.loan_purpose);
        if loan_purpose.is_none() {
            errors.add("loan_purpose", "Invalid loan purpose");
        }
        let property_type = PropertyType::from_str(&self.property_type);
        if property_type.is_none() {
            errors.add("property_type", "Invalid property type");
        }

        let values = LoanRequest {
            deal_id: deal_id.to_string(),
            wsj_prime,
            spread,
            initial_rate: derive_initial_rate(wsj_prime, spread),
            term,
            monthly_payment,
            interest_only: self.interest_only_checked(),
            loan_purpose: loan_purpose.unwrap_or_default(),
            property_type: property_type.unwrap_or_default(),
            ltv,
            collateral_coverage,
        };

        if let Err(range_errors) = validate(&values) {
            for (field, messages) in range_errors.iter() {
                // A field that failed to parse already has its message
                if errors.contains(field) {
                    continue;
                }
                for message in messages {
                    errors.add(field.clone(), message.clone());
                }
            }
        }

        errors.finish().map(|_| values)
    }

    /// Lenient parse for autosave: numerics coerce to 0, the enumerated
    /// fields must still be valid literals.
    pub fn snapshot(&self, deal_id: &str) -> Result<LoanRequest, FieldErrors> {
        let mut errors = FieldErrors::new();

        let loan_purpose = LoanPurpose::from_str(&self.loan_purpose);
        if loan_purpose.is_none() {
            errors.add("loan_purpose", "Invalid loan purpose");
        }
        let property_type = PropertyType::from_str(&self.property_type);
        if property_type.is_none() {
            errors.add("property_type", "Invalid property type");
        }
        errors.finish()?;

        let wsj_prime = coerce_number(&self.wsj_prime);
        let spread = coerce_number(&self.spread);

        Ok(LoanRequest {
            deal_id: deal_id.to_string(),
            wsj_prime,
            spread,
            initial_rate: derive_initial_rate(wsj_prime, spread),
            term: coerce_number(&self.term).trunc() as i64,
            monthly_payment: coerce_number(&self.monthly_payment),
            interest_only: self.interest_only_checked(),
            loan_purpose: loan_purpose.unwrap_or_default(),
            property_type: property_type.unwrap_or_default(),
            ltv: coerce_number(&self.ltv),
            collateral_coverage: coerce_number(&self.collateral_coverage),
        })
    }

    fn interest_only_checked(&self) -> bool {
        match self.interest_only.as_deref() {
            None => false,
            Some(v) => !matches!(v.trim(), "" | "false" | "off" | "0"),
        }
    }
}

impl From<&LoanRequest> for LoanRequestInput {
    fn from(values: &LoanRequest) -> Self {
        Self {
            wsj_prime: values.wsj_prime.to_string(),
            spread: values.spread.to_string(),
            term: values.term.to_string(),
            monthly_payment: values.monthly_payment.to_string(),
            interest_only: values.interest_only.then(|| "on".to_string()),
            loan_purpose: values.loan_purpose.as_str().to_string(),
            property_type: values.property_type.as_str().to_string(),
            ltv: values.ltv.to_string(),
            collateral_coverage: values.collateral_coverage.to_string(),
        }
    }
}

fn parse_number(errors: &mut FieldErrors, field: &str, raw: &str) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.add(field, "Required");
        return 0.0;
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            errors.add(field, "Must be a number");
            0.0
        }
    }
}

fn parse_whole_number(errors: &mut FieldErrors, field: &str, raw: &str) -> i64 {
    let value = parse_number(errors, field, raw);
    if errors.contains(field) {
        return 0;
    }
    if value.fract() != 0.0 {
        errors.add(field, "Must be a whole number");
        return 0;
    }
    value as i64
}
