use crate::context::AppContext;
use crate::error::ApiError;
use crate::response::{ApiResponse, ApiResult};
use axum::extract::State;
use axum::http::Uri;
use chrono::{Datelike, NaiveDate};
use geo_audit_core::batch::{upsert_in_chunks, BatchReport};
use geo_audit_core::envelope::{Envelope, ErrorCode, Status};
use geo_audit_core::providers::Locale;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub mod audits;
pub mod citations;
pub mod domain_strength;
pub mod gbp;
pub mod gsc;
pub mod health;
pub mod portfolio;
pub mod rankings;
pub mod serp;

pub type Ctx = State<Arc<AppContext>>;

const MIN_YEAR: i32 = 1000;
const MAX_YEAR: i32 = 9999;

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}

pub fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Calendar dates with a four-digit year; `%Y` alone also takes signed and
/// five-digit years.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .filter(|d| (MIN_YEAR..=MAX_YEAR).contains(&d.year()))
        .ok_or_else(|| ApiError::invalid(format!("{field} must be YYYY-MM-DD, got {raw:?}")))
}

pub fn parse_opt_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_date(field, s).map(Some),
        None => Ok(None),
    }
}

/// Trimmed, non-empty required field.
pub fn required<'a>(field: &str, raw: Option<&'a str>) -> Result<&'a str, ApiError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::invalid(format!("{field} is required")))
}

pub fn date_range(start: NaiveDate, end: NaiveDate) -> Result<(), ApiError> {
    if start > end {
        return Err(ApiError::invalid(format!(
            "start_date {start} is after end_date {end}"
        )));
    }
    Ok(())
}

pub fn limit(raw: Option<usize>, default: usize, max: usize) -> Result<usize, ApiError> {
    match raw {
        None => Ok(default),
        Some(0) => Err(ApiError::invalid("limit must be at least 1")),
        Some(n) if n > max => Err(ApiError::LimitExceeded(format!("limit {n} exceeds {max}"))),
        Some(n) => Ok(n),
    }
}

pub fn locale(location_code: Option<u32>, language_code: Option<&str>) -> Locale {
    let mut locale = Locale::default();
    if let Some(code) = location_code {
        locale.location_code = code;
    }
    if let Some(lang) = language_code.map(str::trim).filter(|s| !s.is_empty()) {
        locale.language_code = lang.to_lowercase();
    }
    locale
}

/// Trims, drops blanks and case-insensitive duplicates, keeping first-seen order.
pub fn clean_keywords(raw: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .map(str::to_string)
        .collect()
}

pub fn to_rows<T: Serialize>(items: &[T]) -> Result<Vec<Value>, ApiError> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(ApiError::from))
        .collect()
}

/// Stored rows into typed values; a row that does not fit is a server fault.
pub fn from_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Result<Vec<T>, ApiError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| ApiError::Internal(anyhow::anyhow!("malformed {table} row: {e}")))
        })
        .collect()
}

pub async fn persist_rows(
    ctx: &AppContext,
    table: &str,
    rows: &[Value],
    on_conflict: &str,
) -> BatchReport {
    upsert_in_chunks(ctx.store(), table, rows, on_conflict, ctx.cfg.batch_chunk).await
}

/// Envelope for a batch write: `ok` or `partial` with the report as data,
/// `E_UPSTREAM` when nothing was written.
pub fn batch_response(report: BatchReport) -> ApiResult {
    let status = report.status();
    let data = json!({ "report": report });
    let env = match status {
        Status::Error => Envelope::error(
            ErrorCode::Upstream,
            format!("no rows written to {}", report.table),
        )
        .with_details(data),
        other => Envelope::with_status(other, data),
    };
    Ok(ApiResponse(
        env.meta("written", report.written)
            .meta("failed", report.failed),
    ))
}
