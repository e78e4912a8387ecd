//! Unified error types for the storefront core.
//!
//! Storage-layer failures, validation failures, payment failures and
//! authentication failures all surface through [`Error`]. Callers match on the
//! variant to decide whether a failure is recoverable (fallback, retry by the
//! user) or has to be shown to the shopper.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Field-scoped validation messages keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    /// Creates an empty error set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message for `field`. The first message for a field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    /// Returns the message recorded for `field`, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Returns true when no field failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(field, message)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Turns a non-empty error set into `Err(Error::Validation)`.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        f.write_str(&parts.join(", "))
    }
}

/// Authentication and registration failures. The variants are deliberately
/// distinguishable so the caller can tell an inactive account from bad
/// credentials.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("This account is inactive")]
    AccountInactive,

    #[error("User with this email already exists: {email}")]
    DuplicateEmail { email: String },

    #[error("No user is signed in")]
    NotAuthenticated,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Structured store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Write to collection `{collection}` failed: {source}")]
    WriteFailed {
        collection: String,
        #[source]
        source: sea_orm::DbErr,
    },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Flat storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: f64 },

    #[error("Payment declined: {reason}")]
    PaymentDeclined { reason: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Product not found: {id}")]
    ProductNotFound { id: String },

    #[error("Data layer is not initialized")]
    NotInitialized,
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_keep_first_message() {
        let mut errors = FieldErrors::new();
        errors.add("email", "Enter a valid email");
        errors.add("email", "second");
        errors.add("cvc", "3-4 digits");

        assert_eq!(errors.get("email"), Some("Enter a valid email"));
        assert_eq!(errors.to_string(), "cvc: 3-4 digits, email: Enter a valid email");
        assert!(matches!(errors.into_result(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_auth_errors_are_distinguishable() {
        let inactive = Error::from(AuthError::AccountInactive);
        let bad = Error::from(AuthError::InvalidCredentials);
        assert_ne!(inactive.to_string(), bad.to_string());
        assert_eq!(inactive.to_string(), "This account is inactive");
    }
}
