use crate::envelope::ErrorCode;
use thiserror::Error;

const MAX_BODY_CHARS: usize = 2_000;

/// A third-party API answered with a failure.
#[derive(Debug, Error)]
#[error("{service} returned HTTP {status}: {body}")]
pub struct UpstreamError {
    pub service: &'static str,
    pub status: u16,
    pub body: String,
}

impl UpstreamError {
    pub fn new(service: &'static str, status: u16, body: impl Into<String>) -> Self {
        let body: String = body.into();
        let body = if body.chars().count() > MAX_BODY_CHARS {
            let mut cut: String = body.chars().take(MAX_BODY_CHARS).collect();
            cut.push('…');
            cut
        } else {
            body
        };
        Self {
            service,
            status,
            body,
        }
    }
}

/// Caller input that cannot be processed.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// A provider was requested but its credentials are absent.
#[derive(Debug, Error)]
#[error("{0} is not configured")]
pub struct NotConfigured(pub &'static str);

/// Maps an error chain onto the envelope error code.
pub fn classify(err: &anyhow::Error) -> ErrorCode {
    for cause in err.chain() {
        if cause.is::<ValidationError>() {
            return ErrorCode::InvalidRequest;
        }
        if cause.is::<NotConfigured>() {
            return ErrorCode::NotConfigured;
        }
        if cause.is::<UpstreamError>() {
            return ErrorCode::Upstream;
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            return if e.is_timeout() {
                ErrorCode::Timeout
            } else {
                ErrorCode::Upstream
            };
        }
    }
    ErrorCode::Internal
}
