//! Input validation for account and deal forms.
//!
//! Validators return `Err(message)` with a user-facing message so callers can
//! attach it to the offending field.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic email shape check: local part, one @, dotted domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9]([A-Za-z0-9\-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9\-]*[A-Za-z0-9])?)+$"
    ).unwrap();
}

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_BORROWER_NAME_LEN: usize = 200;

/// Lowercase and trim an email address before storing or comparing it
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }

    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err("Password must contain at least one letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }

    Ok(())
}

pub fn validate_borrower_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Borrower name is required".to_string());
    }

    if name.chars().count() > MAX_BORROWER_NAME_LEN {
        return Err(format!(
            "Borrower name is too long (max {} characters)",
            MAX_BORROWER_NAME_LEN
        ));
    }

    Ok(())
}

/// Parse a loan amount as typed into the new-deal dialog
pub fn parse_loan_amount(raw: &str) -> Result<f64, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("Loan amount is required".to_string());
    }

    let amount: f64 = raw
        .parse()
        .map_err(|_| "Loan amount must be a number".to_string())?;

    if !amount.is_finite() {
        return Err("Loan amount must be a number".to_string());
    }

    if amount < 0.0 {
        return Err("Loan amount cannot be negative".to_string());
    }

    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.example.co").is_ok());
    }

    #[test]
    fn test_invalid_emails() {
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("user@localhost").is_err());
        assert!(validate_email("user@@example.com").is_err());
        assert!(validate_email("user@-example.com").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("letters1234").is_ok());
        assert!(validate_password_strength("short1").is_err());
        assert!(validate_password_strength("12345678").is_err());
        assert!(validate_password_strength("abcdefgh").is_err());
    }

    #[test]
    fn test_borrower_name() {
        assert!(validate_borrower_name("Acme").is_ok());
        assert!(validate_borrower_name("   ").is_err());
        assert!(validate_borrower_name(&"x".repeat(201)).is_err());
    }

    #[test]
    fn test_parse_loan_amount() {
        assert_eq!(parse_loan_amount("100000"), Ok(100000.0));
        assert_eq!(parse_loan_amount(" 2500.50 "), Ok(2500.5));
        assert!(parse_loan_amount("").is_err());
        assert!(parse_loan_amount("abc").is_err());
        assert!(parse_loan_amount("-1").is_err());
        assert!(parse_loan_amount("inf").is_err());
        assert!(parse_loan_amount("NaN").is_err());
    }
}
