use serde_json::{Map, Value};

use crate::api::client::HttpResponse;

/// Message fragments providers use when throttling. The last one catches
/// newer wordings that mention neither abuse nor rate limits.
pub const RATE_ABUSE_PHRASES: [&str; 3] = [
    "abuse detection",
    "rate limit",
    "Please wait a few minutes before you try again.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    RateLimited,
    Transient,
    NotFound,
    Unknown,
}

impl std::fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClassification::RateLimited => write!(f, "rate limited"),
            ErrorClassification::Transient => write!(f, "transient"),
            ErrorClassification::NotFound => write!(f, "not found"),
            ErrorClassification::Unknown => write!(f, "unknown"),
        }
    }
}

/// What a failed response body says about itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorReport {
    RateLimited,
    /// Body was not a JSON object.
    Text(String),
    /// JSON object that matched no throttling phrase.
    Structured(Map<String, Value>),
}

impl ErrorReport {
    pub fn classification(&self, status: u16) -> ErrorClassification {
        match (self, status) {
            (ErrorReport::RateLimited, _) => ErrorClassification::RateLimited,
            (_, 404) => ErrorClassification::NotFound,
            (_, 408 | 429 | 500..=599) => ErrorClassification::Transient,
            _ => ErrorClassification::Unknown,
        }
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorReport::RateLimited => write!(f, "rate abuse detected"),
            ErrorReport::Text(text) => write!(f, "{}", text),
            ErrorReport::Structured(map) => write!(f, "{}", Value::Object(map.clone())),
        }
    }
}

/// Inspects a failed response. `None` in, `None` out.
pub fn analyze_error_response(response: Option<&HttpResponse>) -> Option<ErrorReport> {
    let response = response?;

    let map = match serde_json::from_str::<Value>(&response.body) {
        Ok(Value::Object(map)) => map,
        _ => return Some(ErrorReport::Text(response.body.clone())),
    };

    if error_messages(&map).any(is_rate_abuse_message) {
        return Some(ErrorReport::RateLimited);
    }

    Some(ErrorReport::Structured(map))
}

pub fn is_rate_abuse_message(message: &str) -> bool {
    let message = message.to_lowercase();
    RATE_ABUSE_PHRASES
        .iter()
        .any(|phrase| message.contains(&phrase.to_lowercase()))
}

/// A GraphQL body that carries `errors` and no `data`. Providers answer
/// these with HTTP 200, so the status alone does not reveal the failure.
pub fn is_graphql_failure(body: &str) -> bool {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => {
            let has_errors = map
                .get("errors")
                .and_then(Value::as_array)
                .map(|errors| !errors.is_empty())
                .unwrap_or(false);
            let has_data = map.get("data").map(|d| !d.is_null()).unwrap_or(false);
            has_errors && !has_data
        }
        _ => false,
    }
}

// Top-level `message` plus GraphQL `errors[].message`.
fn error_messages(map: &Map<String, Value>) -> impl Iterator<Item = &str> {
    let top = map.get("message").and_then(Value::as_str);
    let nested = map
        .get("errors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|e| e.get("message").and_then(Value::as_str));
    top.into_iter().chain(nested)
}
