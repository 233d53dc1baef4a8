//! Error types shared across the backend, the gates and the form engine.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Failures reported by the auth provider and the data stores
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("record not found")]
    NotFound,
    #[error("Incorrect email or password. Please try again.")]
    InvalidCredentials,
    #[error("{0}")]
    Rejected(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => BackendError::NotFound,
            sqlx::Error::Database(ref db_err) if db_err.message().contains("UNIQUE constraint failed") => {
                BackendError::Rejected("A record with this identifier already exists".to_string())
            }
            other => BackendError::Database(other),
        }
    }
}

/// Field name to messages, ordered by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[serde(transparent)]
#[error("{}", self.summary())]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.0.entry(field.into()).or_default().push(message.into());
        self
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// First message recorded for a field
    pub fn first(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(|m| m.first()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Ok when nothing was recorded
    pub fn finish(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// One-line summary suitable for a notice
    pub fn summary(&self) -> String {
        match self.0.iter().next() {
            Some((_, messages)) if self.0.len() == 1 => messages
                .first()
                .cloned()
                .unwrap_or_else(|| "Validation failed".to_string()),
            _ => format!("Validation failed for {} fields", self.0.len()),
        }
    }
}

/// Outcome taxonomy surfaced to pages and JSON endpoints
#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("Access Denied")]
    AuthorizationDenied,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{0}")]
    Validation(FieldErrors),
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        AppError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_collects_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("term", "Must be at least 1");
        errors.add("ltv", "Must be at most 100");
        errors.add("term", "Must be a whole number");

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.first("term"), Some("Must be at least 1"));
        assert!(errors.contains("ltv"));
        assert_eq!(errors.summary(), "Validation failed for 2 fields");
        assert!(errors.finish().is_err());
    }

    #[test]
    fn test_single_field_summary_is_the_message() {
        let errors = FieldErrors::single("loan_purpose", "Invalid loan purpose");
        assert_eq!(errors.summary(), "Invalid loan purpose");
    }

    #[test]
    fn test_empty_field_errors_finish_ok() {
        assert!(FieldErrors::new().finish().is_ok());
    }

    #[test]
    fn test_field_errors_are_a_std_error() {
        let err: Box<dyn std::error::Error> =
            Box::new(FieldErrors::single("term", "Must be between 1 and 360"));
        assert_eq!(err.to_string(), "Must be between 1 and 360");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            BackendError::from(sqlx::Error::RowNotFound),
            BackendError::NotFound
        ));
    }

    #[test]
    fn test_field_errors_serialize_as_map() {
        let errors = FieldErrors::single("term", "Must be at least 1");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({ "term": ["Must be at least 1"] }));
    }
}
