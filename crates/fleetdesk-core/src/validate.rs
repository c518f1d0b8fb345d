//! Request validation helpers.
//!
//! Each check appends to a shared [`ValidationErrors`] so a handler can report
//! every bad field at once instead of failing on the first.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ValidationErrors;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
    })
}

fn human(field: &str) -> String {
    field.replace('_', " ")
}

/// Trim and drop empty strings so `""` behaves like an absent field.
pub fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let t = v.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Required string with a maximum length (in characters).
pub fn required(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    max: Option<usize>,
) {
    match value.map(str::trim) {
        None | Some("") => errors.add(field, format!("The {} field is required.", human(field))),
        Some(v) => max_len(errors, field, Some(v), max),
    }
}

pub fn max_len(errors: &mut ValidationErrors, field: &str, value: Option<&str>, max: Option<usize>) {
    if let (Some(v), Some(max)) = (value, max) {
        if v.chars().count() > max {
            errors.add(
                field,
                format!(
                    "The {} may not be greater than {max} characters.",
                    human(field)
                ),
            );
        }
    }
}

pub fn email(errors: &mut ValidationErrors, field: &str, value: Option<&str>) {
    if let Some(v) = value {
        if !email_re().is_match(v) {
            errors.add(
                field,
                format!("The {} must be a valid email address.", human(field)),
            );
        }
    }
}

/// Parse an optional enum-valued field, recording an error for unknown values.
pub fn one_of<T: FromStr>(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    allowed: &[&str],
) -> Option<T> {
    let v = value?;
    match v.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            errors.add(
                field,
                format!(
                    "The selected {} is invalid. Allowed: {}.",
                    human(field),
                    allowed.join(", ")
                ),
            );
            None
        }
    }
}

pub fn non_negative(errors: &mut ValidationErrors, field: &str, value: Option<f64>) {
    if let Some(v) = value {
        if !v.is_finite() || v < 0.0 {
            errors.add(field, format!("The {} must be at least 0.", human(field)));
        }
    }
}

/// Line-item ids must be unique within one delivery.
pub fn no_duplicate_items(errors: &mut ValidationErrors, field: &str, ids: &[i64]) {
    let mut seen = HashSet::new();
    if ids.iter().any(|id| !seen.insert(*id)) {
        errors.add(field, "Duplicate item IDs are not allowed.");
    }
}
