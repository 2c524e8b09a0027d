//! Validation utilities for client supplied identifiers.
//!
//! Topic names, application names and transactional ids arrive from clients
//! and end up embedded in generated consumer/producer ids and metric labels,
//! so they are checked at the handler layer before anything is registered.
//!
//! # Validation Rules
//!
//! All identifiers must:
//! - Not be empty
//! - Not exceed their maximum length
//! - Contain only ASCII alphanumeric characters, dots (`.`), underscores (`_`), and hyphens (`-`)
//! - Not contain ASCII control characters
//! - Not be "." or ".." (reserved names)
//! - Not start with a hyphen
//!
//! Application names additionally may not contain `_`, the separator of
//! generated session ids (see [`crate::session::consumer_id`]).

use crate::constants::{MAX_APP_NAME_LENGTH, MAX_TOPIC_NAME_LENGTH, MAX_TRANSACTION_ID_LENGTH};
use crate::error::{Error, ResponseCode, Result};

/// Validate a topic name.
///
/// ```
/// use broker_core::validation::validate_topic_name;
///
/// assert!(validate_topic_name("orders.v1").is_ok());
/// assert!(validate_topic_name("").is_err());
/// assert!(validate_topic_name("a/b").is_err());
/// ```
pub fn validate_topic_name(topic: &str) -> Result<()> {
    validate_identifier(topic, MAX_TOPIC_NAME_LENGTH, "Topic name")
}

/// Validate an application name.
///
/// ```
/// use broker_core::validation::validate_app_name;
///
/// assert!(validate_app_name("billing-service").is_ok());
/// assert!(validate_app_name("billing_service").is_err());
/// ```
pub fn validate_app_name(app: &str) -> Result<()> {
    validate_identifier(app, MAX_APP_NAME_LENGTH, "App name")?;
    if app.contains('_') {
        return Err(param_error(format!(
            "App name '{}' cannot contain '_'",
            truncate_for_display(app, 50)
        )));
    }
    Ok(())
}

/// Validate a Kafka transactional id.
///
/// Kafka allows any non-empty string here, so only emptiness, length and
/// control characters are rejected.
pub fn validate_transaction_id(transaction_id: &str) -> Result<()> {
    if transaction_id.is_empty() {
        return Err(param_error("Transactional id cannot be empty"));
    }
    if transaction_id.len() > MAX_TRANSACTION_ID_LENGTH {
        return Err(param_error(format!(
            "Transactional id is too long ({} chars, max {} chars)",
            transaction_id.len(),
            MAX_TRANSACTION_ID_LENGTH
        )));
    }
    if let Some((i, c)) = transaction_id
        .chars()
        .enumerate()
        .find(|(_, c)| c.is_ascii_control())
    {
        return Err(param_error(format!(
            "Transactional id contains control character at position {} (byte value 0x{:02X})",
            i, c as u8
        )));
    }
    Ok(())
}

fn validate_identifier(value: &str, max_len: usize, field_name: &str) -> Result<()> {
    if value.is_empty() {
        return Err(param_error(format!("{} cannot be empty", field_name)));
    }

    if value.len() > max_len {
        return Err(param_error(format!(
            "{} '{}' is too long ({} chars, max {} chars)",
            field_name,
            truncate_for_display(value, 50),
            value.len(),
            max_len
        )));
    }

    if value == "." || value == ".." {
        return Err(param_error(format!(
            "{} cannot be '.' or '..' (reserved names)",
            field_name
        )));
    }

    if value.starts_with('-') {
        return Err(param_error(format!(
            "{} '{}' cannot start with a hyphen",
            field_name,
            truncate_for_display(value, 50)
        )));
    }

    for (i, c) in value.chars().enumerate() {
        if c.is_ascii_control() {
            return Err(param_error(format!(
                "{} contains control character at position {} (byte value 0x{:02X})",
                field_name, i, c as u8
            )));
        }

        let is_valid = c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-';
        if !is_valid {
            return Err(param_error(format!(
                "Invalid character '{}' (U+{:04X}) in {} at position {}. \
                 Only ASCII letters, digits, '.', '_', and '-' are allowed.",
                c.escape_default(),
                c as u32,
                field_name,
                i
            )));
        }
    }

    Ok(())
}

fn param_error(message: impl Into<String>) -> Error {
    Error::broker(ResponseCode::CnParamError, message)
}

/// Truncate a string for display in error messages.
fn truncate_for_display(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let cut = s
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= max_len)
            .last()
            .unwrap_or(0);
        format!("{}...", &s[..cut])
    }
}
