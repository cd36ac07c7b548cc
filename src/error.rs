use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::api::response;

/// Upstream bodies are echoed back to the caller, but only this many chars.
const BODY_EXCERPT_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{provider} provider returned {status}: {body}")]
    Upstream {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} provider request failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    #[error("No search results for query: {0}")]
    NoResults(String),

    #[error("No usable structured output: {0}")]
    NoStructuredOutput(String),

    #[error("Request processing timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Takes the raw code: reqwest and axum sit on different `http` versions.
    pub fn upstream(provider: &'static str, status: u16, body: &str) -> Self {
        AppError::Upstream {
            provider,
            status,
            body: body.trim().chars().take(BODY_EXCERPT_CHARS).collect(),
        }
    }

    pub fn transport(provider: &'static str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "timed out".to_string()
        } else {
            err.to_string()
        };
        AppError::Transport { provider, message }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream { .. } | AppError::Transport { .. } => StatusCode::BAD_GATEWAY,
            AppError::NoResults(_) => StatusCode::NOT_FOUND,
            AppError::NoStructuredOutput(_) => StatusCode::FAILED_DEPENDENCY,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        response::error(self.status(), self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
