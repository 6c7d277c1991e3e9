use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("External API error ({status:?}): {message}")]
    ExternalApi {
        /// HTTP status returned by the provider, if the call got that far
        status: Option<u16>,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Daily recommendation quota exceeded, resets in {resets_in_secs}s")]
    QuotaExceeded { resets_in_secs: i64 },

    #[error("No acceptable recommendation found after {attempts} attempts")]
    ExhaustedAttempts { attempts: u32 },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Builds an `ExternalApi` error from a provider status code and body.
    pub fn external_api(status: u16, message: impl Into<String>) -> Self {
        AppError::ExternalApi {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Whether this failure class qualifies for the shared retry policy.
    ///
    /// Network errors, timeouts, and provider 5xx responses are transient.
    /// Provider 4xx responses, validation failures, and quota conditions are
    /// not retried and propagate immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect() || e.status().is_none(),
            AppError::ExternalApi { status, .. } => match status {
                Some(code) => *code >= 500,
                // No status means the call never completed (connection reset etc.)
                None => true,
            },
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::QuotaExceeded { .. } => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            AppError::ExhaustedAttempts { .. } => (
                StatusCode::NOT_FOUND,
                "No new recommendation found - adjust preferences or retry later".to_string(),
            ),
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::ExternalApi { .. } | AppError::HttpClient(_) => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
        };

        let mut body = json!({ "error": message });
        if let AppError::QuotaExceeded { resets_in_secs } = &self {
            body["resets_in_secs"] = json!(resets_in_secs);
        }

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
