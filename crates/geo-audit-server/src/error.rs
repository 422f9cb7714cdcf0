use crate::response::render;
use axum::response::{IntoResponse, Response};
use geo_audit_core::envelope::{Envelope, ErrorCode};
use geo_audit_core::errors::{classify, UpstreamError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    LimitExceeded(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("request exceeded {0}ms")]
    Timeout(u64),

    /// Anything raised by core or a provider; classified when rendered.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::InvalidRequest(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ApiError::NotFound(_) => ErrorCode::NotFound,
            ApiError::LimitExceeded(_) => ErrorCode::LimitExceeded,
            ApiError::NotConfigured(_) => ErrorCode::NotConfigured,
            ApiError::Timeout(_) => ErrorCode::Timeout,
            ApiError::Internal(e) => classify(e),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Internal(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let message = match &self {
            ApiError::Internal(e) => format!("{e:#}"),
            other => other.to_string(),
        };

        let mut env = Envelope::error(code, message);
        if let ApiError::Internal(e) = &self {
            if let Some(up) = e.chain().find_map(|c| c.downcast_ref::<UpstreamError>()) {
                env = env.with_details(serde_json::json!({
                    "service": up.service,
                    "status": up.status,
                }));
            }
        }

        match code {
            ErrorCode::Internal | ErrorCode::Upstream => tracing::error!(
                event = "request_failed",
                code = code.as_str(),
                error = %env.error.as_ref().map(|e| e.message.as_str()).unwrap_or_default()
            ),
            _ => tracing::debug!(event = "request_rejected", code = code.as_str()),
        }

        render(env)
    }
}
