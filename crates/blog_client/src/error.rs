use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::storage::StorageError;

/// Field name -> messages, as returned by the API on validation failures.
///
/// General (non-field) messages live under `non_field_errors` or `detail`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub const NON_FIELD: &'static str = "non_field_errors";
    pub const DETAIL: &'static str = "detail";

    /// Parse an error body. Values may be a string, a list of strings, or a
    /// nested structure (rendered as JSON). Returns `None` unless the body is a
    /// non-empty JSON object.
    pub fn parse(body: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        let object = value.as_object()?;
        if object.is_empty() {
            return None;
        }

        let fields = object
            .iter()
            .map(|(field, value)| (field.clone(), Self::messages(value)))
            .collect();
        Some(Self(fields))
    }

    fn messages(value: &serde_json::Value) -> Vec<String> {
        match value {
            serde_json::Value::String(message) => vec![message.clone()],
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(message) => message.clone(),
                    other => other.to_string(),
                })
                .collect(),
            other => vec![other.to_string()],
        }
    }

    /// A single general message.
    pub fn general(message: impl Into<String>) -> Self {
        Self(BTreeMap::from([(
            Self::NON_FIELD.to_string(),
            vec![message.into()],
        )]))
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// First message for a field, the way a form shows it under the input.
    pub fn first(&self, field: &str) -> Option<&str> {
        self.get(field)?.first().map(String::as_str)
    }

    /// Messages not tied to a specific field.
    pub fn general_messages(&self) -> Vec<&str> {
        [Self::NON_FIELD, Self::DETAIL]
            .iter()
            .filter_map(|key| self.0.get(*key))
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Field-specific entries only.
    pub fn field_messages(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .filter(|(field, _)| field.as_str() != Self::NON_FIELD && field.as_str() != Self::DETAIL)
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(", ")))
            .collect();
        f.write_str(&rendered.join("; "))
    }
}

/// Why a token refresh did not produce a new access token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh token rejected with HTTP {status}")]
    Rejected { status: u16 },

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("token storage failed: {0}")]
    Storage(String),

    #[error("refresh task ended abnormally: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed (HTTP {status}): {fields}")]
    Validation { status: u16, fields: FieldErrors },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("session expired: {0}")]
    SessionExpired(RefreshFailure),

    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("not found")]
    NotFound,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("request cancelled")]
    Cancelled,

    #[error("login required")]
    LoginRequired,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Map a non-success response to an error, keeping any field payload.
    pub fn from_status(status: u16, body: &str) -> Self {
        let fields = FieldErrors::parse(body);
        let message = fields
            .as_ref()
            .and_then(|fields| fields.general_messages().first().map(|m| m.to_string()));

        match status {
            400 | 422 => ApiError::Validation {
                status,
                fields: fields
                    .unwrap_or_else(|| FieldErrors::general("The request was rejected. Please check your input.")),
            },
            401 => ApiError::Unauthorized {
                message: message
                    .unwrap_or_else(|| "Authentication credentials were not provided or are invalid.".to_string()),
            },
            403 => ApiError::Forbidden {
                message: message
                    .unwrap_or_else(|| "You do not have permission to perform this action.".to_string()),
            },
            404 => ApiError::NotFound,
            _ => ApiError::Http {
                status,
                message: message.unwrap_or_else(|| "Something went wrong. Please try again.".to_string()),
            },
        }
    }

    /// HTTP status, when the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Validation { status, .. } | ApiError::Http { status, .. } => Some(*status),
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::NotFound => Some(404),
            ApiError::SessionExpired(RefreshFailure::Rejected { status }) => Some(*status),
            _ => None,
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ApiError::Validation { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// True when the user has to log in again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::SessionExpired(_) | ApiError::LoginRequired
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }

    /// Message suitable for a banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Validation { fields, .. } => fields
                .general_messages()
                .first()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "Please correct the highlighted fields.".to_string()),
            ApiError::Unauthorized { message } | ApiError::Forbidden { message } => message.clone(),
            ApiError::SessionExpired(_) | ApiError::LoginRequired => {
                "Your session has expired. Please log in again.".to_string()
            }
            ApiError::NotFound => "Not found.".to_string(),
            ApiError::Network(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            ApiError::Cancelled => "The request was cancelled.".to_string(),
            ApiError::Http { message, .. } => message.clone(),
            ApiError::Decode(_) | ApiError::Storage(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

impl From<reqwest_middleware::Error> for ApiError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Middleware(err) => {
                let err = match err.downcast::<RefreshFailure>() {
                    Ok(failure) => return ApiError::SessionExpired(failure),
                    Err(err) => err,
                };
                match err.downcast::<StorageError>() {
                    Ok(storage) => ApiError::Storage(storage),
                    Err(err) => ApiError::Network(format!("{err:#}")),
                }
            }
            reqwest_middleware::Error::Reqwest(err) => err.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_lists_and_strings() {
        let fields = FieldErrors::parse(
            r#"{"email": ["user with this email already exists."], "password": "too short", "detail": "bad"}"#,
        )
        .unwrap();

        assert_eq!(fields.first("email"), Some("user with this email already exists."));
        assert_eq!(fields.first("password"), Some("too short"));
        assert_eq!(fields.general_messages(), vec!["bad"]);
        assert_eq!(fields.field_messages().count(), 2);
    }

    #[test]
    fn non_object_bodies_are_not_field_errors() {
        assert!(FieldErrors::parse("<html>oops</html>").is_none());
        assert!(FieldErrors::parse(r#"["a"]"#).is_none());
        assert!(FieldErrors::parse("{}").is_none());
    }

    #[test]
    fn status_mapping() {
        let err = ApiError::from_status(400, r#"{"password_confirm": ["Passwords don't match."]}"#);
        assert_eq!(err.status(), Some(400));
        assert_eq!(
            err.field_errors().and_then(|f| f.first("password_confirm")),
            Some("Passwords don't match.")
        );

        let err = ApiError::from_status(400, "");
        assert_eq!(err.field_errors().map(|f| f.general_messages().len()), Some(1));

        let err = ApiError::from_status(401, r#"{"detail": "Invalid credentials"}"#);
        assert!(matches!(&err, ApiError::Unauthorized { message } if message == "Invalid credentials"));
        assert!(err.requires_login());

        assert!(ApiError::from_status(404, r#"{"detail":"Not found."}"#).is_not_found());
        assert!(matches!(
            ApiError::from_status(503, ""),
            ApiError::Http { status: 503, .. }
        ));
    }

    #[test]
    fn refresh_failure_survives_middleware_error() {
        let err = reqwest_middleware::Error::Middleware(anyhow::Error::new(RefreshFailure::Rejected {
            status: 401,
        }));
        let api_err = ApiError::from(err);
        assert!(matches!(
            api_err,
            ApiError::SessionExpired(RefreshFailure::Rejected { status: 401 })
        ));
        assert!(api_err.requires_login());
    }

    #[test]
    fn display_lists_every_field() {
        let fields = FieldErrors::parse(r#"{"a": ["x", "y"], "b": ["z"]}"#).unwrap();
        assert_eq!(fields.to_string(), "a: x, y; b: z");
    }
}
