// handlers/validate.rs - body field checks

use crate::error::ApiError;

/// Unwrap a required body field or fail with "`<name>` is required".
pub fn required<T>(value: Option<T>, name: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::bad_request(format!("{} is required", name)))
}

/// `local@label.label...tld` where the local part and labels are word
/// characters, `-` or (local part only) `.`, and the TLD is 2-4 characters.
pub fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    let word = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';

    if local.is_empty() || !local.chars().all(|c| word(c) || c == '.') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty() || !l.chars().all(word)) {
        return false;
    }
    labels.last().map_or(false, |tld| (2..=4).contains(&tld.len()))
}

pub fn check_email(value: &str) -> Result<(), ApiError> {
    if is_email(value) {
        Ok(())
    } else {
        Err(ApiError::bad_request("invalid format"))
    }
}

/// Names are a single word: no blanks, no special characters.
pub fn check_name(value: &str, field: &str) -> Result<(), ApiError> {
    if value.is_empty() || !value.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ApiError::bad_request(format!(
            "{}: blank or special character should not be included",
            field
        )));
    }
    Ok(())
}

pub fn check_not_blank(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{} should not be empty", field)));
    }
    Ok(())
}
