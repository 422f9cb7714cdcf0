//! Keyword rankings: reads by audit date, batch writes and live refresh from
//! SERP snapshots.

use super::{batch_response, clean_keywords, from_rows, locale, parse_opt_date, persist_rows, required, to_rows, today, Ctx};
use crate::context::AppContext;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::handlers::serp::parse_device;
use crate::response::{ApiResponse, ApiResult};
use chrono::NaiveDate;
use geo_audit_core::citations::{latest_audit_date, summarize};
use geo_audit_core::envelope::{Envelope, ErrorCode, Status};
use geo_audit_core::model::{KeywordRanking, KEYWORD_RANKINGS, KEYWORD_RANKINGS_CONFLICT};
use geo_audit_core::providers::{Query, SerpRequest, SerpSnapshot};
use geo_audit_core::urlnorm::normalize_domain;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const MAX_BATCH_ROWS: usize = 50_000;
pub const MAX_REFRESH_KEYWORDS: usize = 100;
const MAX_DATE_ROWS: usize = 10_000;

/// Most recent audit date stored for the property, on or before `cap` when given.
pub(crate) async fn resolve_audit_date(
    ctx: &AppContext,
    property_url: &str,
    cap: Option<NaiveDate>,
) -> Result<Option<NaiveDate>, ApiError> {
    let mut query = Query::new().eq("property_url", property_url);
    if let Some(cap) = cap {
        query = query.lte("audit_date", cap);
    }
    let query = query.order_by("audit_date", false).limit(1);
    let rows = ctx.store().select(KEYWORD_RANKINGS, &query).await?;
    let rows: Vec<KeywordRanking> = from_rows(KEYWORD_RANKINGS, rows)?;
    Ok(latest_audit_date(&rows, cap))
}

pub(crate) async fn rankings_for_date(
    ctx: &AppContext,
    property_url: &str,
    audit_date: NaiveDate,
) -> Result<Vec<KeywordRanking>, ApiError> {
    let query = Query::new()
        .eq("property_url", property_url)
        .eq("audit_date", audit_date)
        .order_by("keyword", true)
        .limit(MAX_DATE_ROWS);
    let rows = ctx.store().select(KEYWORD_RANKINGS, &query).await?;
    from_rows(KEYWORD_RANKINGS, rows)
}

#[derive(Debug, Deserialize)]
pub struct RankingParams {
    pub property_url: Option<String>,
    pub audit_date: Option<String>,
}

pub async fn get(ctx: Ctx, ApiQuery(params): ApiQuery<RankingParams>) -> ApiResult {
    let property_url = required("property_url", params.property_url.as_deref())?;
    let requested = parse_opt_date("audit_date", params.audit_date.as_deref())?;

    let audit_date = match requested {
        Some(d) => Some(d),
        None => resolve_audit_date(&ctx, property_url, None).await?,
    };
    let rankings = match audit_date {
        Some(d) => rankings_for_date(&ctx, property_url, d).await?,
        None => Vec::new(),
    };

    let count = rankings.len();
    Ok(ApiResponse(
        Envelope::ok(json!({ "rankings": rankings }))
            .meta("audit_date", audit_date.map(|d| d.to_string()))
            .meta("count", count),
    ))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest<T> {
    #[serde(default = "Vec::new")]
    pub rows: Vec<T>,
}

pub(crate) fn check_batch_size(len: usize) -> Result<(), ApiError> {
    if len == 0 {
        return Err(ApiError::invalid("rows must contain at least one row"));
    }
    if len > MAX_BATCH_ROWS {
        return Err(ApiError::LimitExceeded(format!(
            "{len} rows exceeds the limit of {MAX_BATCH_ROWS}"
        )));
    }
    Ok(())
}

pub async fn batch(ctx: Ctx, ApiJson(req): ApiJson<BatchRequest<KeywordRanking>>) -> ApiResult {
    check_batch_size(req.rows.len())?;
    for (idx, row) in req.rows.iter().enumerate() {
        if row.keyword.trim().is_empty() || row.property_url.trim().is_empty() {
            return Err(ApiError::invalid(format!(
                "row {idx}: keyword and property_url are required"
            )));
        }
    }

    let rows = to_rows(&req.rows)?;
    let report = persist_rows(&ctx, KEYWORD_RANKINGS, &rows, KEYWORD_RANKINGS_CONFLICT).await;
    batch_response(report)
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub property_url: Option<String>,
    pub audit_date: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub location_code: Option<u32>,
    pub language_code: Option<String>,
    pub device: Option<String>,
    #[serde(default = "default_true")]
    pub persist: bool,
}

#[derive(Debug, Serialize)]
struct FailedKeyword {
    keyword: String,
    code: &'static str,
    message: String,
}

/// Ranking row for one keyword as seen in a SERP snapshot.
pub fn ranking_from_snapshot(
    snap: &SerpSnapshot,
    property_url: &str,
    domain: &str,
    audit_date: NaiveDate,
) -> KeywordRanking {
    let best = snap.rank_of(domain);
    KeywordRanking {
        audit_date,
        property_url: property_url.to_string(),
        keyword: snap.keyword.clone(),
        best_rank: best.map(|r| r.rank),
        best_url: best.map(|r| r.url.clone()),
        ctr: None,
        has_ai_overview: snap.has_ai_overview,
        ai_citations: snap
            .ai_citations
            .iter()
            .filter_map(|c| serde_json::to_value(c).ok())
            .collect(),
    }
}

pub async fn refresh(ctx: Ctx, ApiJson(req): ApiJson<RefreshRequest>) -> ApiResult {
    let property_url = required("property_url", req.property_url.as_deref())?;
    let domain = normalize_domain(property_url)
        .ok_or_else(|| ApiError::invalid(format!("invalid property_url: {property_url}")))?;
    let audit_date = parse_opt_date("audit_date", req.audit_date.as_deref())?.unwrap_or_else(today);
    let keywords = clean_keywords(&req.keywords);
    if keywords.is_empty() {
        return Err(ApiError::invalid("keywords must contain at least one keyword"));
    }
    if keywords.len() > MAX_REFRESH_KEYWORDS {
        return Err(ApiError::LimitExceeded(format!(
            "{} keywords exceeds the limit of {MAX_REFRESH_KEYWORDS}",
            keywords.len()
        )));
    }
    let device = parse_device(req.device.as_deref())?;
    let locale = locale(req.location_code, req.language_code.as_deref());
    let provider = ctx.serp()?;

    let mut rankings = Vec::new();
    let mut failed = Vec::new();
    for keyword in &keywords {
        let serp_req = SerpRequest {
            keyword: keyword.clone(),
            locale: locale.clone(),
            device: device.clone(),
        };
        let fetched: anyhow::Result<(SerpSnapshot, bool)> = ctx
            .cache
            .get_or_fetch("serp", &serp_req, || provider.serp_snapshot(&serp_req))
            .await;
        match fetched {
            Ok((snap, _)) => {
                rankings.push(ranking_from_snapshot(&snap, property_url, &domain, audit_date))
            }
            Err(e) => {
                let err = ApiError::from(e);
                let code = err.code().as_str();
                tracing::warn!(
                    event = "ranking_refresh_failed",
                    keyword = %keyword,
                    code = code,
                    error = %err
                );
                failed.push(FailedKeyword {
                    keyword: keyword.clone(),
                    code,
                    message: err.to_string(),
                });
            }
        }
    }

    if rankings.is_empty() {
        return Ok(ApiResponse(
            Envelope::error(ErrorCode::Upstream, "no keyword could be refreshed")
                .with_details(json!({ "failed_keywords": failed })),
        ));
    }

    let summary = summarize(&rankings, &domain);
    let mut data = json!({
        "property_url": property_url,
        "audit_date": audit_date.to_string(),
        "rankings": rankings,
        "failed_keywords": failed,
        "summary": summary,
    });
    let mut status = if failed.is_empty() {
        Status::Ok
    } else {
        Status::Partial
    };

    if req.persist {
        // A refresh knows nothing about CTR; leave stored values alone.
        let rows: Vec<Value> = to_rows(&rankings)?
            .into_iter()
            .map(|mut row| {
                if let Some(obj) = row.as_object_mut() {
                    obj.remove("ctr");
                }
                row
            })
            .collect();
        let report = persist_rows(&ctx, KEYWORD_RANKINGS, &rows, KEYWORD_RANKINGS_CONFLICT).await;
        if report.status() != Status::Ok {
            status = Status::Partial;
        }
        if report.status() == Status::Error {
            return batch_response(report);
        }
        data["report"] = serde_json::to_value(&report)?;
    }

    Ok(ApiResponse(
        Envelope::with_status(status, data)
            .meta("source", provider.provider_name())
            .meta("refreshed", keywords.len() - failed.len()),
    ))
}
