//! Search Console: raw search analytics and the 28-day segment aggregation.

use super::{batch_response, date_range, parse_date, parse_opt_date, persist_rows, required, to_rows, today, Ctx};
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::response::{ApiResponse, ApiResult};
use geo_audit_core::envelope::{Envelope, Status};
use geo_audit_core::model::{SEGMENT_METRICS_28D, SEGMENT_METRICS_28D_CONFLICT};
use geo_audit_core::providers::google::{DimensionFilter, MAX_ROW_LIMIT};
use geo_audit_core::providers::SearchAnalyticsRequest;
use geo_audit_core::window::{aggregate, PageQueryRow, Window28d};
use serde::Deserialize;
use serde_json::json;

const DIMENSIONS: &[&str] = &["date", "query", "page", "country", "device", "searchAppearance"];

#[derive(Debug, Deserialize)]
pub struct GscQueryRequest {
    pub site_url: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub row_limit: Option<u32>,
    pub max_rows: Option<u32>,
    #[serde(default)]
    pub filters: Vec<DimensionFilter>,
}

fn check_dimensions(dimensions: &[String]) -> Result<(), ApiError> {
    match dimensions.iter().find(|d| !DIMENSIONS.contains(&d.as_str())) {
        Some(bad) => Err(ApiError::invalid(format!("unsupported dimension: {bad}"))),
        None => Ok(()),
    }
}

pub async fn query(ctx: Ctx, ApiJson(req): ApiJson<GscQueryRequest>) -> ApiResult {
    let site_url = required("site_url", req.site_url.as_deref())?;
    let start = parse_date("start_date", required("start_date", req.start_date.as_deref())?)?;
    let end = parse_date("end_date", required("end_date", req.end_date.as_deref())?)?;
    date_range(start, end)?;
    check_dimensions(&req.dimensions)?;
    if let Some(bad) = req.filters.iter().find(|f| !DIMENSIONS.contains(&f.dimension.as_str())) {
        return Err(ApiError::invalid(format!("unsupported filter dimension: {}", bad.dimension)));
    }

    let mut sa = SearchAnalyticsRequest::new(start, end, req.dimensions.clone());
    if let Some(n) = req.row_limit {
        sa.row_limit = n.clamp(1, MAX_ROW_LIMIT);
    }
    if let Some(n) = req.max_rows {
        sa.max_rows = n.max(1);
    }
    sa.filters = req.filters;

    let rows = ctx.search_console()?.search_analytics(site_url, &sa).await?;
    let count = rows.len();
    Ok(ApiResponse(
        Envelope::ok(json!({ "rows": rows }))
            .meta("source", "gsc")
            .meta("row_count", count)
            .meta("start_date", start.to_string())
            .meta("end_date", end.to_string()),
    ))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SegmentMetricsRequest {
    pub site_url: Option<String>,
    pub run_id: Option<String>,
    #[serde(default)]
    pub brand_terms: Vec<String>,
    pub today: Option<String>,
    #[serde(default = "default_true")]
    pub persist: bool,
}

pub async fn segment_metrics(ctx: Ctx, ApiJson(req): ApiJson<SegmentMetricsRequest>) -> ApiResult {
    let site_url = required("site_url", req.site_url.as_deref())?;
    let as_of = parse_opt_date("today", req.today.as_deref())?.unwrap_or_else(today);
    let window = Window28d::ending(as_of, ctx.cfg.gsc_lag_days)
        .ok_or_else(|| ApiError::invalid(format!("today {as_of} leaves no 28-day window")))?;
    let run_id = req
        .run_id
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("28d-{}", window.end));

    let sa = SearchAnalyticsRequest::new(
        window.start,
        window.end,
        vec!["page".to_string(), "query".to_string()],
    );
    let gsc_rows = ctx.search_console()?.search_analytics(site_url, &sa).await?;
    let rows: Vec<PageQueryRow> = gsc_rows.iter().filter_map(PageQueryRow::from_gsc).collect();

    let metrics = aggregate(&rows, site_url, &run_id, window, &ctx.classifier, &req.brand_terms);
    tracing::info!(
        event = "segment_metrics_aggregated",
        site_url = site_url,
        run_id = %run_id,
        gsc_rows = rows.len(),
        metrics = metrics.len()
    );

    let data = json!({
        "run_id": run_id,
        "window": window,
        "metrics": metrics,
    });
    if !req.persist {
        return Ok(ApiResponse(
            Envelope::ok(data).meta("persisted", false).meta("gsc_rows", rows.len()),
        ));
    }

    let report = persist_rows(
        &ctx,
        SEGMENT_METRICS_28D,
        &to_rows(&metrics)?,
        SEGMENT_METRICS_28D_CONFLICT,
    )
    .await;
    if report.status() == Status::Error && report.attempted > 0 {
        return batch_response(report);
    }
    let mut data = data;
    data["report"] = serde_json::to_value(&report)?;
    Ok(ApiResponse(
        Envelope::with_status(report.status(), data)
            .meta("persisted", true)
            .meta("gsc_rows", rows.len()),
    ))
}
