//! Loan request schema and the derived-field form engine.

pub mod form;
pub mod schema;

pub use form::{FormError, LoanRequestForm};
pub use schema::{
    coerce_number, derive_initial_rate, validate, Bounds, LoanPurpose, LoanRequestInput,
    PropertyType,
};
