pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod server;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use context::AppContext;
use handlers::{audits, citations, domain_strength, gbp, gsc, health, portfolio, rankings, serp};
use std::sync::Arc;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/serp/ai-overview", post(serp::ai_overview))
        .route("/api/keywords/volume", post(serp::keyword_volume))
        .route("/api/gsc/query", post(gsc::query))
        .route("/api/gsc/segment-metrics", post(gsc::segment_metrics))
        .route("/api/gbp/locations", get(gbp::locations))
        .route("/api/gbp/metrics", get(gbp::metrics))
        .route("/api/audits", get(audits::list).post(audits::upsert))
        .route("/api/audits/latest", get(audits::latest))
        .route("/api/keyword-rankings", get(rankings::get))
        .route("/api/keyword-rankings/batch", post(rankings::batch))
        .route("/api/keyword-rankings/refresh", post(rankings::refresh))
        .route("/api/ai-citations", get(citations::get))
        .route(
            "/api/portfolio/segment-metrics",
            get(portfolio::list).post(portfolio::batch),
        )
        .route(
            "/api/domain-strength",
            get(domain_strength::list).post(domain_strength::compute),
        )
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(ctx.cfg.max_body_bytes))
        .layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            middleware::track_request,
        ))
        .with_state(ctx)
}
