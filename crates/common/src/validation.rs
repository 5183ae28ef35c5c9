//! Input validation for values typed by the user before they reach the
//! backend.

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length for email addresses
pub const MAX_EMAIL_LENGTH: usize = 320;

/// Maximum length for passwords
pub const MAX_PASSWORD_LENGTH: usize = 256;

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} is required", field_name));
    }
    Ok(())
}

/// Validate email address
pub fn validate_email(email: &str) -> Result<()> {
    validate_non_empty(email, "email")?;
    validate_length(email, MAX_EMAIL_LENGTH, "email")?;

    let valid = EMAIL_RE
        .as_ref()
        .map(|re| re.is_match(email))
        .unwrap_or(false);
    if !valid {
        return Err(anyhow!("invalid email"));
    }

    Ok(())
}

/// Field-level problems of a login form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginFormErrors {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginFormErrors {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.password.is_none()
    }
}

impl std::fmt::Display for LoginFormErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let problems: Vec<&str> = [self.email.as_deref(), self.password.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        write!(f, "{}", problems.join("; "))
    }
}

impl std::error::Error for LoginFormErrors {}

pub fn validate_login(email: &str, password: &str) -> Result<(), LoginFormErrors> {
    let errors = LoginFormErrors {
        email: validate_email(email).err().map(|e| e.to_string()),
        password: validate_non_empty(password, "password")
            .and_then(|_| validate_length(password, MAX_PASSWORD_LENGTH, "password"))
            .err()
            .map(|e| e.to_string()),
    };

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
