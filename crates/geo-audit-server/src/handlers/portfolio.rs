use super::rankings::{check_batch_size, BatchRequest};
use super::{batch_response, from_rows, limit, persist_rows, to_rows, Ctx};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::response::{ApiResponse, ApiResult};
use geo_audit_core::envelope::Envelope;
use geo_audit_core::model::{
    Scope, Segment, SegmentMetric28d, SEGMENT_METRICS_28D, SEGMENT_METRICS_28D_CONFLICT,
};
use geo_audit_core::providers::Query;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_LIMIT: usize = 500;
const MAX_LIMIT: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct PortfolioParams {
    pub site_url: Option<String>,
    pub run_id: Option<String>,
    pub segment: Option<String>,
    pub scope: Option<String>,
    pub limit: Option<usize>,
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

pub async fn list(ctx: Ctx, ApiQuery(params): ApiQuery<PortfolioParams>) -> ApiResult {
    let segment = non_empty(params.segment.as_deref())
        .map(|s| Segment::parse(s).ok_or_else(|| ApiError::invalid(format!("unknown segment: {s}"))))
        .transpose()?;
    let scope = non_empty(params.scope.as_deref())
        .map(|s| Scope::parse(s).ok_or_else(|| ApiError::invalid(format!("unknown scope: {s}"))))
        .transpose()?;
    let row_limit = limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT)?;

    let query = Query::new()
        .eq_opt("site_url", non_empty(params.site_url.as_deref()))
        .eq_opt("run_id", non_empty(params.run_id.as_deref()))
        .eq_opt("segment", segment.map(|s| s.as_str()))
        .eq_opt("scope", scope.map(|s| s.as_str()))
        .order_by("date_end", false)
        .limit(row_limit);
    let rows = ctx.store().select(SEGMENT_METRICS_28D, &query).await?;
    let metrics: Vec<SegmentMetric28d> = from_rows(SEGMENT_METRICS_28D, rows)?;

    let count = metrics.len();
    Ok(ApiResponse(
        Envelope::ok(json!({ "metrics": metrics })).meta("count", count),
    ))
}

fn check_metric(idx: usize, m: &SegmentMetric28d) -> Result<(), ApiError> {
    if m.run_id.trim().is_empty() || m.site_url.trim().is_empty() {
        return Err(ApiError::invalid(format!("row {idx}: run_id and site_url are required")));
    }
    if m.date_start > m.date_end {
        return Err(ApiError::invalid(format!("row {idx}: date_start is after date_end")));
    }
    if m.clicks < 0.0 || m.impressions < 0.0 {
        return Err(ApiError::invalid(format!("row {idx}: negative clicks or impressions")));
    }
    Ok(())
}

pub async fn batch(ctx: Ctx, ApiJson(req): ApiJson<BatchRequest<SegmentMetric28d>>) -> ApiResult {
    check_batch_size(req.rows.len())?;
    for (idx, m) in req.rows.iter().enumerate() {
        check_metric(idx, m)?;
    }
    let rows = to_rows(&req.rows)?;
    let report = persist_rows(&ctx, SEGMENT_METRICS_28D, &rows, SEGMENT_METRICS_28D_CONFLICT).await;
    batch_response(report)
}
