use crate::error::ApiError;
use crate::middleware::current_request_id;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use geo_audit_core::envelope::Envelope;

pub struct ApiResponse(pub Envelope);

pub type ApiResult = Result<ApiResponse, ApiError>;

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        render(self.0)
    }
}

/// Serializes an envelope, stamping the current request id into `meta`.
pub fn render(mut env: Envelope) -> Response {
    if let Some(rid) = current_request_id() {
        env.meta.insert("request_id".to_string(), rid.into());
    }
    let status = StatusCode::from_u16(env.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(env)).into_response()
}
