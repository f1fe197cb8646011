//! Error types for the gateway.

use axum::http::StatusCode;
use thiserror::Error;

/// An error reported by the Converse backend.
///
/// `kind` is the backend's error type name (`ThrottlingException`,
/// `ValidationException`, ...); `message` is its detail text and is only ever
/// logged, never returned to clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: String,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Map the backend error kind to the HTTP status returned to the client.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        let kind = self.kind.to_lowercase();
        if kind.contains("throttling") {
            StatusCode::TOO_MANY_REQUESTS
        } else if kind.contains("validation") {
            StatusCode::BAD_REQUEST
        } else if kind.contains("accessdenied") {
            StatusCode::FORBIDDEN
        } else if kind.contains("resourcenotfound") || kind.contains("modelnotfound") {
            StatusCode::NOT_FOUND
        } else if kind.contains("serviceunavailable") {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("Model '{0}' does not support image input.")]
    UnsupportedModel(String),

    #[error("Unsupported image format '{0}'. Allowed: jpeg, png, gif, webp.")]
    UnsupportedFormat(String),

    #[error("Image (~{} KB estimated) exceeds the 3.75 MB image limit.", .0 / 1024)]
    ImageTooLarge(usize),

    #[error("{message}")]
    InvalidRequest { message: String },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl GatewayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedModel(_) | Self::UnsupportedFormat(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::ImageTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidRequest { .. } | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::Backend(err) => err.status_code(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message that is safe to show to a client.
    ///
    /// Input errors describe the client's own request and are returned as-is.
    /// Everything else collapses to the status reason phrase.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::UnsupportedModel(_)
            | Self::UnsupportedFormat(_)
            | Self::ImageTooLarge(_)
            | Self::InvalidRequest { .. } => self.to_string(),
            _ => reason_phrase(self.status_code()).to_string(),
        }
    }

    /// Kind label used in the request journal.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::UnsupportedModel(_) => "unsupported_model",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::ImageTooLarge(_) => "image_too_large",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Backend(err) => &err.kind,
            Self::Config { .. } => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Toml(_) => "toml",
        }
    }
}

pub fn reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Error")
}

pub type Result<T> = std::result::Result<T, GatewayError>;
