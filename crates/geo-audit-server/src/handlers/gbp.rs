use super::{date_range, parse_opt_date, required, today, Ctx};
use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::response::{ApiResponse, ApiResult};
use chrono::Days;
use geo_audit_core::envelope::Envelope;
use geo_audit_core::window::WINDOW_DAYS;
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_METRICS: &[&str] = &[
    "BUSINESS_IMPRESSIONS_DESKTOP_MAPS",
    "BUSINESS_IMPRESSIONS_DESKTOP_SEARCH",
    "BUSINESS_IMPRESSIONS_MOBILE_MAPS",
    "BUSINESS_IMPRESSIONS_MOBILE_SEARCH",
    "BUSINESS_DIRECTION_REQUESTS",
    "CALL_CLICKS",
    "WEBSITE_CLICKS",
];

#[derive(Debug, Deserialize)]
pub struct LocationsParams {
    pub account_id: Option<String>,
}

pub async fn locations(ctx: Ctx, ApiQuery(params): ApiQuery<LocationsParams>) -> ApiResult {
    let account_id = required("account_id", params.account_id.as_deref())?;
    let locations = ctx.business_profile()?.list_locations(account_id).await?;
    let count = locations.len();
    Ok(ApiResponse(
        Envelope::ok(json!({ "locations": locations }))
            .meta("source", "gbp")
            .meta("count", count),
    ))
}

#[derive(Debug, Deserialize)]
pub struct MetricsParams {
    pub location_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Comma separated metric names.
    pub metrics: Option<String>,
}

fn parse_metrics(raw: Option<&str>) -> Result<Vec<String>, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(DEFAULT_METRICS.iter().map(|m| m.to_string()).collect());
    };
    let mut out: Vec<String> = Vec::new();
    for m in raw.split(',').map(|m| m.trim().to_ascii_uppercase()) {
        if m.is_empty() {
            continue;
        }
        if !m.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
            return Err(ApiError::invalid(format!("invalid metric name: {m}")));
        }
        if !out.contains(&m) {
            out.push(m);
        }
    }
    if out.is_empty() {
        return Err(ApiError::invalid("metrics must name at least one metric"));
    }
    Ok(out)
}

pub async fn metrics(ctx: Ctx, ApiQuery(params): ApiQuery<MetricsParams>) -> ApiResult {
    let location_id = required("location_id", params.location_id.as_deref())?;
    let metrics = parse_metrics(params.metrics.as_deref())?;
    // Business Profile data settles a day late.
    let end = match parse_opt_date("end_date", params.end_date.as_deref())? {
        Some(d) => d,
        None => today()
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| ApiError::invalid("no default end_date"))?,
    };
    let start = match parse_opt_date("start_date", params.start_date.as_deref())? {
        Some(d) => d,
        None => end
            .checked_sub_days(Days::new(WINDOW_DAYS as u64 - 1))
            .ok_or_else(|| ApiError::invalid(format!("end_date {end} leaves no 28-day window")))?,
    };
    date_range(start, end)?;

    let series = ctx
        .business_profile()?
        .daily_metrics(location_id, &metrics, start, end)
        .await?;
    Ok(ApiResponse(
        Envelope::ok(json!({ "metrics": series }))
            .meta("source", "gbp")
            .meta("start_date", start.to_string())
            .meta("end_date", end.to_string()),
    ))
}
