//! Form validation for checkout, registration and profile edits.
//!
//! Forms derive [`Validate`]; failures are flattened into [`FieldErrors`]
//! keyed by the form's camelCase field names, one message per field.

use crate::errors::{FieldErrors, Result};
use regex::Regex;
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::LazyLock;
use validator::{Validate, ValidationError, ValidationErrors};

// Patterns are literals; compiling them cannot fail.
#[allow(clippy::expect_used)]
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+\d][\d\s()-]{6,}$").expect("Invalid regex")
});
#[allow(clippy::expect_used)]
static ZIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9\- ]{3,10}$").expect("Invalid regex")
});
#[allow(clippy::expect_used)]
static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{16,19}$").expect("Invalid regex")
});
#[allow(clippy::expect_used)]
static EXPIRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(0[1-9]|1[0-2])/\d{2}$").expect("Invalid regex")
});
#[allow(clippy::expect_used)]
static CVC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{3,4}$").expect("Invalid regex")
});

/// Shortest accepted new password.
pub const MIN_PASSWORD_LEN: usize = 4;

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

fn check(
    re: &Regex,
    value: &str,
    code: &'static str,
    message: &'static str,
) -> std::result::Result<(), ValidationError> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(invalid(code, message))
    }
}

fn validate_phone(value: &str) -> std::result::Result<(), ValidationError> {
    check(&PHONE_RE, value, "phone", "Enter a valid phone")
}

fn validate_zip(value: &str) -> std::result::Result<(), ValidationError> {
    check(&ZIP_RE, value, "zip", "Enter a valid post code")
}

/// Spaces are allowed anywhere in the card number.
fn validate_card(value: &str) -> std::result::Result<(), ValidationError> {
    let digits: String = value.chars().filter(|c| *c != ' ').collect();
    check(&CARD_RE, &digits, "card", "16-19 digits or spaced")
}

fn validate_expiry(value: &str) -> std::result::Result<(), ValidationError> {
    check(&EXPIRY_RE, value, "expiry", "Format MM/YY")
}

fn validate_cvc(value: &str) -> std::result::Result<(), ValidationError> {
    check(&CVC_RE, value, "cvc", "3-4 digits")
}

/// `full_name` -> `fullName`
fn form_field(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for ch in name.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Converts validator output into field-scoped messages.
#[must_use]
pub fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    let mut fields = FieldErrors::new();
    for (field, problems) in errors.field_errors() {
        if let Some(problem) = problems.first() {
            let message = problem
                .message
                .as_ref()
                .map_or_else(|| problem.code.to_string(), ToString::to_string);
            fields.add(form_field(&field), message);
        }
    }
    fields
}

fn run<T: Validate>(form: &T) -> FieldErrors {
    form.validate()
        .map_or_else(|errors| field_errors(&errors), |()| FieldErrors::new())
}

/// Checkout form as submitted. Values are trimmed before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutForm {
    #[validate(length(min = 2, message = "Enter your name"))]
    pub full_name: String,
    #[validate(email(message = "Enter a valid email"))]
    pub email: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[validate(length(min = 2, message = "Enter your address"))]
    pub address: String,
    #[validate(length(min = 2, message = "Enter your city"))]
    pub city: String,
    #[validate(custom(function = "validate_zip"))]
    pub zip: String,
    #[validate(custom(function = "validate_card"))]
    pub card: String,
    #[validate(custom(function = "validate_expiry"))]
    pub expiry: String,
    #[validate(custom(function = "validate_cvc"))]
    pub cvc: String,
}

impl CheckoutForm {
    #[must_use]
    pub fn trimmed(&self) -> Self {
        Self {
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            address: self.address.trim().to_string(),
            city: self.city.trim().to_string(),
            zip: self.zip.trim().to_string(),
            card: self.card.trim().to_string(),
            expiry: self.expiry.trim().to_string(),
            cvc: self.cvc.trim().to_string(),
        }
    }

    /// Validates every field and returns the trimmed form.
    ///
    /// # Errors
    /// `Error::Validation` listing each failing field.
    pub fn validated(&self) -> Result<Self> {
        let form = self.trimmed();
        run(&form).into_result()?;
        Ok(form)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
#[serde(default)]
pub struct RegistrationForm {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Enter a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl RegistrationForm {
    /// Trims name and email (not the password) and validates.
    pub fn validated(&self) -> Result<Self> {
        let form = Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        };
        run(&form).into_result()?;
        Ok(form)
    }
}

/// Profile edit. An empty password (and confirmation) keeps the current one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
#[serde(default)]
pub struct ProfileForm {
    #[validate(length(min = 2, message = "Please enter at least 2 characters."))]
    pub name: String,
    #[validate(email(message = "Please enter a valid email address."))]
    pub email: String,
    pub password: String,
    pub confirm: String,
}

impl ProfileForm {
    /// Validates the fields that do not depend on other users. Email
    /// uniqueness is checked by the session gate.
    pub fn check(&self) -> FieldErrors {
        let form = Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.trim().to_string(),
            confirm: self.confirm.trim().to_string(),
        };
        let mut errors = run(&form);

        if !form.password.is_empty() || !form.confirm.is_empty() {
            if form.password.chars().count() < MIN_PASSWORD_LEN {
                errors.add("password", "Password must be at least 4 characters.");
            }
            if form.password != form.confirm {
                errors.add("confirm", "Passwords do not match.");
            }
        }
        errors
    }

    /// The new password, if one was entered.
    #[must_use]
    pub fn new_password(&self) -> Option<String> {
        Some(self.password.trim().to_string()).filter(|p| !p.is_empty())
    }
}
