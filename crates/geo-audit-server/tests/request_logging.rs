use axum::body::Body;
use axum::http::Request;
use geo_audit_core::providers::memory::MemoryStore;
use geo_audit_server::config::ServerConfig;
use geo_audit_server::context::AppContext;
use geo_audit_server::router;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

struct MockWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_request_lifecycle_is_logged_as_json() {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let buffer_clone = buffer.clone();

    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_writer(move || MockWriter(buffer_clone.clone()))
        .finish();
    // Current-thread runtime: every poll happens under this default.
    let _guard = tracing::subscriber::set_default(subscriber);

    let ctx = AppContext::new(ServerConfig::default(), Arc::new(MemoryStore::new()));
    let req = Request::builder()
        .uri("/api/audits/latest?property_url=https://example.com")
        .body(Body::empty())
        .unwrap();
    let resp = router(Arc::new(ctx)).oneshot(req).await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    let rid = resp
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();

    let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();

    assert!(output.contains("\"event\":\"request_start\""));
    assert!(output.contains("\"event\":\"request_done\""));
    assert!(output.contains(&format!("\"rid\":\"{rid}\"")));
    assert!(output.contains("\"path\":\"/api/audits/latest\""));
    assert!(output.contains("\"status\":404"));
    assert!(output.contains("\"duration_ms\""));
    assert!(output.contains("\"timestamp\""));
}
