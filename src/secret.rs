use std::fmt;

use serde_json::Value;

const REDACTED: &str = "***";

/// Field names whose values are replaced before a response body is attached to an error.
const SECRET_FIELDS: &[&str] = &[
    "accessToken",
    "token",
    "user",
    "password",
    "secret",
    "refreshToken",
    "idToken",
];

/// Non-JSON bodies are cut to this many characters before they reach an error.
const MAX_BODY_CHARS: usize = 200;

/// A value that must never be written to a log sink.
///
/// `Debug` and `Display` both render `***`; the only way to the inner value is
/// [`Secret::expose`], so every disclosure is visible at the call site.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Wrap `value` and register it with the runner's log masking.
    pub fn masked(value: impl Into<String>) -> Self {
        let value = value.into();
        crate::actions::add_mask(&value);
        Self::new(value)
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Prepare a raw HTTP response body for inclusion in a diagnostic.
///
/// JSON bodies keep their shape with secret-bearing fields replaced; anything
/// else is truncated, since there is no structure to redact by.
pub fn redact_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(mut value) => {
            redact_value(&mut value);
            value.to_string()
        }
        Err(_) => truncate(body.trim()),
    }
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if SECRET_FIELDS.contains(&key.as_str()) && !field.is_null() {
                    *field = Value::String(REDACTED.to_string());
                } else {
                    redact_value(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {}
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_BODY_CHARS {
        return s.to_string();
    }
    let cut: String = s.chars().take(MAX_BODY_CHARS).collect();
    format!("{cut}...")
}
