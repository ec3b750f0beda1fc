//! Request-body validation.
//!
//! Bodies are validated from a raw JSON object so that "absent", "null" and
//! "present" stay distinguishable for partial updates. Strings are trimmed and
//! an empty string counts as null. Messages follow the conventional
//! `The {field} field ...` wording.

use reqwest::Url;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{ApiError, FieldErrors};

static EMAIL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .unwrap_or_else(|_| regex::Regex::new(r"$^").expect("fallback regex compiles"))
});

/// Field label used in messages (`preferred_difficulty` → `preferred difficulty`).
fn label(field: &str) -> String {
    field.replace('_', " ")
}

pub struct Input {
    fields: Map<String, Value>,
    errors: FieldErrors,
}

impl Input {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            errors: FieldErrors::new(),
        }
    }

    /// Non-object bodies validate as an empty object.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            _ => Self::new(Map::new()),
        }
    }

    /// Key was sent at all (even as null).
    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Key was sent with a non-null, non-blank value.
    pub fn filled(&self, field: &str) -> bool {
        self.value(field).is_some()
    }

    fn value(&self, field: &str) -> Option<&Value> {
        match self.fields.get(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(v) => Some(v),
        }
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.add(field, message);
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains(field)
    }

    fn string_value(&mut self, field: &str, max: usize) -> Option<String> {
        let value = self.value(field)?.clone();
        let Value::String(s) = value else {
            self.error(field, format!("The {} field must be a string.", label(field)));
            return None;
        };
        let s = s.trim().to_string();
        if s.chars().count() > max {
            self.error(
                field,
                format!(
                    "The {} field must not be greater than {} characters.",
                    label(field),
                    max
                ),
            );
            return None;
        }
        Some(s)
    }

    pub fn required_str(&mut self, field: &str, max: usize) -> Option<String> {
        if !self.filled(field) {
            self.error(field, format!("The {} field is required.", label(field)));
            return None;
        }
        self.string_value(field, max)
    }

    pub fn optional_str(&mut self, field: &str, max: usize) -> Option<String> {
        self.string_value(field, max)
    }

    /// Enforce a minimum length on an already-extracted value.
    pub fn min_len(&mut self, field: &str, value: &str, min: usize) -> bool {
        if value.chars().count() < min {
            self.error(
                field,
                format!("The {} field must be at least {} characters.", label(field), min),
            );
            return false;
        }
        true
    }

    fn parse_enum<T: FromStr>(&mut self, field: &str, raw: String) -> Option<T> {
        match raw.parse::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                self.error(field, format!("The selected {} is invalid.", label(field)));
                None
            }
        }
    }

    pub fn required_enum<T: FromStr>(&mut self, field: &str) -> Option<T> {
        let raw = self.required_str(field, 255)?;
        self.parse_enum(field, raw)
    }

    pub fn optional_enum<T: FromStr>(&mut self, field: &str) -> Option<T> {
        let raw = self.optional_str(field, 255)?;
        self.parse_enum(field, raw)
    }

    fn check_url(&mut self, field: &str, raw: String) -> Option<String> {
        match Url::parse(&raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
                Some(raw)
            }
            _ => {
                self.error(field, format!("The {} field must be a valid URL.", label(field)));
                None
            }
        }
    }

    pub fn required_url(&mut self, field: &str, max: usize) -> Option<String> {
        let raw = self.required_str(field, max)?;
        self.check_url(field, raw)
    }

    pub fn optional_url(&mut self, field: &str, max: usize) -> Option<String> {
        let raw = self.optional_str(field, max)?;
        self.check_url(field, raw)
    }

    pub fn required_email(&mut self, field: &str, max: usize) -> Option<String> {
        let raw = self.required_str(field, max)?;
        if !EMAIL_RE.is_match(&raw) {
            self.error(
                field,
                format!("The {} field must be a valid email address.", label(field)),
            );
            return None;
        }
        Some(raw.to_lowercase())
    }

    /// Array of strings; absent or null yields an empty list.
    pub fn str_list(&mut self, field: &str, max_each: usize) -> Vec<String> {
        let Some(value) = self.value(field).cloned() else {
            return Vec::new();
        };
        let Value::Array(values) = value else {
            self.error(field, format!("The {} field must be an array.", label(field)));
            return Vec::new();
        };
        let mut out = Vec::with_capacity(values.len());
        for (i, v) in values.into_iter().enumerate() {
            let key = format!("{}.{}", field, i);
            match v {
                Value::String(s) if s.chars().count() <= max_each => out.push(s.trim().to_string()),
                Value::String(_) => self.error(
                    &key,
                    format!("The {} field must not be greater than {} characters.", key, max_each),
                ),
                _ => self.error(&key, format!("The {} field must be a string.", key)),
            }
        }
        out
    }

    /// Tag-style id list. Accepts an array of ids, a single id, a JSON-encoded
    /// array string or `"[]"`. Zero and blank entries are dropped. Returns
    /// `None` when the field was not sent.
    pub fn id_list(&mut self, field: &str) -> Option<Vec<i64>> {
        if !self.has(field) {
            return None;
        }
        let value = match self.fields.get(field).cloned().unwrap_or(Value::Null) {
            Value::String(s) if s.trim().starts_with('[') => {
                serde_json::from_str(s.trim()).unwrap_or(Value::String(s))
            }
            other => other,
        };
        let entries = match value {
            Value::Null => Vec::new(),
            Value::Array(values) => values,
            single => vec![single],
        };

        let mut ids = Vec::with_capacity(entries.len());
        let mut seen = HashSet::new();
        for (i, entry) in entries.into_iter().enumerate() {
            let parsed = match &entry {
                Value::Number(n) => n.as_i64(),
                Value::String(s) if s.trim().is_empty() => Some(0),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                Value::Null => Some(0),
                _ => None,
            };
            match parsed {
                Some(0) => {}
                Some(id) if id > 0 => {
                    if seen.insert(id) {
                        ids.push(id);
                    }
                }
                _ => self.error(
                    &format!("{}.{}", field, i),
                    format!("The selected {}.{} is invalid.", field, i),
                ),
            }
        }
        Some(ids)
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn into_errors(self) -> FieldErrors {
        self.errors
    }

    pub fn finish(self) -> Result<(), ApiError> {
        self.errors.into_result()
    }
}
