use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{ApiError, FieldErrors};

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Non-blank, trimmed string field. Records an error and returns `None` when
/// the value is missing or blank.
pub fn required_text(errors: &mut FieldErrors, field: &str, value: Option<&str>, max_len: usize) -> Option<String> {
    match value {
        None => {
            errors.add(field, REQUIRED);
            None
        }
        Some(v) => text(errors, field, v, max_len),
    }
}

/// Same as [`required_text`] but a missing value is not an error.
pub fn optional_text(errors: &mut FieldErrors, field: &str, value: Option<&str>, max_len: usize) -> Option<String> {
    value.and_then(|v| text(errors, field, v, max_len))
}

fn text(errors: &mut FieldErrors, field: &str, value: &str, max_len: usize) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, BLANK);
        return None;
    }
    if !max_length_ok(errors, field, value, max_len) {
        return None;
    }
    Some(value.to_string())
}

pub fn max_length_ok(errors: &mut FieldErrors, field: &str, value: &str, max_len: usize) -> bool {
    if value.chars().count() > max_len {
        errors.add(
            field,
            format!("Ensure this field has no more than {max_len} characters."),
        );
        return false;
    }
    true
}

/// Primary key from a path segment; anything that is not an id cannot match
/// a row, so it is a 404 rather than a 400.
pub fn object_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>().map_err(|_| ApiError::NotFound)
}

/// Query flags such as `assigned_only=1`: integers, non-zero meaning true.
pub fn int_flag(field: &str, raw: Option<&str>) -> Result<bool, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) => v
            .parse::<i64>()
            .map(|n| n != 0)
            .map_err(|_| ApiError::field(field, "A valid integer is required.")),
    }
}
