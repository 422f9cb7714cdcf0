//! Response envelope shared by every handler: `{status, data|error, meta}`.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Partial,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    NotFound,
    Upstream,
    NotConfigured,
    Timeout,
    LimitExceeded,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "E_INVALID_REQUEST",
            ErrorCode::NotFound => "E_NOT_FOUND",
            ErrorCode::Upstream => "E_UPSTREAM",
            ErrorCode::NotConfigured => "E_NOT_CONFIGURED",
            ErrorCode::Timeout => "E_TIMEOUT",
            ErrorCode::LimitExceeded => "E_LIMIT_EXCEEDED",
            ErrorCode::Internal => "E_INTERNAL",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidRequest => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::LimitExceeded => 413,
            ErrorCode::Internal => 500,
            ErrorCode::Upstream => 502,
            ErrorCode::NotConfigured => 503,
            ErrorCode::Timeout => 504,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub meta: Map<String, Value>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self::with_status(Status::Ok, data)
    }

    pub fn partial(data: Value) -> Self {
        Self::with_status(Status::Partial, data)
    }

    pub fn with_status(status: Status, data: Value) -> Self {
        Self {
            status,
            data: Some(data),
            error: None,
            meta: Map::new(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: None,
            error: Some(ErrorBody {
                code,
                message: message.into(),
                details: None,
            }),
            meta: Map::new(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        if let Some(err) = self.error.as_mut() {
            err.details = Some(details);
        }
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    /// HTTP status this envelope should travel with.
    pub fn http_status(&self) -> u16 {
        match (&self.status, &self.error) {
            (Status::Error, Some(err)) => err.code.http_status(),
            (Status::Error, None) => 500,
            _ => 200,
        }
    }
}
