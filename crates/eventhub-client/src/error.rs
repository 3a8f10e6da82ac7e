//! Error types for the Eventhub client.
//!
//! Every fallible operation in this crate returns [`ApiError`] or one of the
//! narrower errors that convert into it ([`StorageError`], [`UploadError`]).

use serde_json::Value;

use crate::roles::{Role, Section};

/// Errors that can occur while talking to the Eventhub API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request could not be sent or the response could not be read.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Human readable message extracted from the body, or the status text.
        message: String,
        /// Parsed JSON body, or the status text as a JSON string when the
        /// body was not JSON.
        body: Value,
    },

    /// The response body was not the JSON we expected.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The session was cleared because the access token could not be renewed.
    #[error("Session expired, please log in again")]
    SessionInvalidated,

    /// The operation requires a logged-in user.
    #[error("Not logged in")]
    Unauthenticated,

    /// The logged-in user's role does not grant access to a section.
    #[error("Role '{role}' cannot access {section}")]
    Forbidden {
        /// Role of the current user.
        role: Role,
        /// Section that was requested.
        section: Section,
    },

    /// An auth flow step was attempted from the wrong state.
    #[error("Invalid login state: {0}")]
    InvalidState(String),

    /// Persisted session state could not be read or written.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The client configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A file could not be prepared for upload.
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl ApiError {
    /// Returns the HTTP status for [`ApiError::Http`] errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Builds an HTTP error from a status and raw body text.
    ///
    /// The body is kept as parsed JSON when possible; otherwise the status
    /// text stands in for it.
    pub fn from_response(status: reqwest::StatusCode, raw_body: &str) -> Self {
        let status_text = status
            .canonical_reason()
            .unwrap_or("Unknown status")
            .to_string();

        match serde_json::from_str::<Value>(raw_body) {
            Ok(body) => {
                let message = ["message", "error", "detail"]
                    .iter()
                    .find_map(|k| body.get(*k).and_then(|v| v.as_str()))
                    .map(str::to_string)
                    .unwrap_or_else(|| status_text.clone());
                Self::Http {
                    status: status.as_u16(),
                    message,
                    body,
                }
            }
            Err(_) => Self::Http {
                status: status.as_u16(),
                message: status_text.clone(),
                body: Value::String(status_text),
            },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors from persisted session storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Cannot determine home directory")]
    HomeDir,
}

/// Errors while turning a file into an inline upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to read upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("File is {size} bytes, larger than the {max} byte limit")]
    TooLarge { size: u64, max: u64 },

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
}
