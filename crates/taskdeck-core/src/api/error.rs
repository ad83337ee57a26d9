use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the request pipeline and the session controller.
///
/// `Clone` because a single refresh outcome is handed to every caller that
/// was waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Invalid credentials: {}", .0.summary())]
    InvalidCredentials(ErrorDetail),

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Authorization denied after refreshing credentials")]
    AuthorizationDenied,

    #[error("Network error: {0}")]
    NetworkFailure(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request rejected ({status}): {}", .detail.summary())]
    ValidationFailure { status: u16, detail: ErrorDetail },

    #[error("Server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Normalize a non-success response into the error taxonomy.
    ///
    /// 401 maps to `AuthorizationDenied`; the pipeline only reaches this for
    /// a 401 once the replay budget is spent.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::AuthorizationDenied,
            code @ 400..=499 => ApiError::ValidationFailure {
                status: code,
                detail: ErrorDetail::parse(body),
            },
            code @ 500..=599 => ApiError::ServerError {
                status: code,
                body: Self::truncate_body(body),
            },
            _ => ApiError::InvalidResponse(format!(
                "Status {}: {}",
                status,
                Self::truncate_body(body)
            )),
        }
    }

    /// Classify a transport-level reqwest failure.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::NetworkFailure(err.to_string())
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::NetworkFailure(_) | ApiError::Timeout | ApiError::ServerError { .. }
        )
    }

    /// Whether the user has to authenticate again before continuing.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }
}

/// Server-provided error detail, kept intact for display.
///
/// The backend answers rejected requests either with `{"detail": "..."}` /
/// `{"message": "..."}` or with a map of field names to message lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorDetail {
    pub message: Option<String>,
    pub fields: BTreeMap<String, Vec<String>>,
}

impl ErrorDetail {
    pub fn parse(body: &str) -> Self {
        let value: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(_) => {
                let trimmed = body.trim();
                return Self {
                    message: (!trimmed.is_empty()).then(|| ApiError::truncate_body(trimmed)),
                    fields: BTreeMap::new(),
                };
            }
        };

        let mut detail = Self::default();
        match value {
            Value::Object(map) => {
                for (key, v) in map {
                    if key == "detail" || key == "message" {
                        if detail.message.is_none() {
                            detail.message = Self::messages(&v).into_iter().next();
                        }
                        continue;
                    }
                    let messages = Self::messages(&v);
                    if !messages.is_empty() {
                        detail.fields.insert(key, messages);
                    }
                }
            }
            other => detail.message = Self::messages(&other).into_iter().next(),
        }
        detail
    }

    fn messages(value: &Value) -> Vec<String> {
        match value {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items.iter().flat_map(Self::messages).collect(),
            Value::Null => vec![],
            other => vec![other.to_string()],
        }
    }

    /// First human-readable message: the explicit message, else the first
    /// field message.
    pub fn summary(&self) -> String {
        if let Some(ref message) = self.message {
            return message.clone();
        }
        self.fields
            .iter()
            .find_map(|(field, msgs)| msgs.first().map(|m| format!("{}: {}", field, m)))
            .unwrap_or_else(|| "An error occurred".to_string())
    }

    pub fn field(&self, name: &str) -> Option<&[String]> {
        self.fields.get(name).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert_eq!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::AuthorizationDenied
        );
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, r#"{"detail": "Not found."}"#),
            ApiError::ValidationFailure { status: 404, .. }
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            ApiError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn test_field_errors_preserved() {
        let body = r#"{"title": ["This field may not be blank."], "due_date": ["Invalid date.", "Too early."]}"#;
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, body);
        let ApiError::ValidationFailure { status, detail } = err else {
            panic!("expected validation failure");
        };
        assert_eq!(status, 400);
        assert_eq!(detail.message, None);
        assert_eq!(
            detail.field("title"),
            Some(&["This field may not be blank.".to_string()][..])
        );
        assert_eq!(detail.field("due_date").map(|m| m.len()), Some(2));
        assert_eq!(detail.summary(), "due_date: Invalid date.");
    }

    #[test]
    fn test_detail_message_wins_summary() {
        let detail = ErrorDetail::parse(r#"{"detail": "No active account found", "code": "x"}"#);
        assert_eq!(detail.summary(), "No active account found");
        assert!(detail.fields.contains_key("code"));
    }

    #[test]
    fn test_non_json_body() {
        let detail = ErrorDetail::parse("  Bad Request  ");
        assert_eq!(detail.message.as_deref(), Some("Bad Request"));
        assert_eq!(ErrorDetail::parse("").summary(), "An error occurred");
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.contains("truncated"));
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
    }
}
