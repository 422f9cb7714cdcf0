use crate::context::AppContext;
use crate::error::ApiError;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

static RID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static REQUEST_ID: String;
}

fn next_rid() -> String {
    let n = RID.fetch_add(1, Ordering::Relaxed);
    format!("r-{n:06}")
}

/// Request id of the request being served on this task, if any.
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|rid| rid.clone()).ok()
}

/// Assigns a request id, enforces the handler timeout and logs start/done.
pub async fn track_request(
    State(ctx): State<Arc<AppContext>>,
    req: Request,
    next: Next,
) -> Response {
    let rid = next_rid();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let timeout_ms = ctx.cfg.timeout_ms;
    let start = Instant::now();

    tracing::info!(event = "request_start", rid = %rid, method = %method, path = %path);

    let mut resp = REQUEST_ID
        .scope(rid.clone(), async {
            match timeout(Duration::from_millis(timeout_ms), next.run(req)).await {
                Ok(resp) => resp,
                Err(_) => {
                    tracing::warn!(
                        event = "request_timeout",
                        rid = %rid,
                        path = %path,
                        timeout_ms = timeout_ms,
                        code = "E_TIMEOUT"
                    );
                    ApiError::Timeout(timeout_ms).into_response()
                }
            }
        })
        .await;

    if let Ok(v) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert("x-request-id", v);
    }

    let dur = start.elapsed().as_millis() as u64;
    tracing::info!(
        event = "request_done",
        rid = %rid,
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        duration_ms = dur
    );
    resp
}
