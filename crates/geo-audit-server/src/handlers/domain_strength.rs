use super::{limit, locale, parse_opt_date, required, today, Ctx};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::response::{ApiResponse, ApiResult};
use geo_audit_core::domain_strength::{snapshot, DEFAULT_ENGINE};
use geo_audit_core::envelope::Envelope;
use geo_audit_core::model::{
    DomainStrengthInputs, DomainStrengthSnapshot, DOMAIN_STRENGTH, DOMAIN_STRENGTH_CONFLICT,
};
use geo_audit_core::providers::Query;
use geo_audit_core::urlnorm::normalize_domain;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_LIMIT: usize = 30;
const MAX_LIMIT: usize = 365;

fn domain_param(raw: Option<&str>) -> Result<String, ApiError> {
    let raw = required("domain", raw)?;
    normalize_domain(raw).ok_or_else(|| ApiError::invalid(format!("invalid domain: {raw}")))
}

#[derive(Debug, Deserialize)]
pub struct StrengthParams {
    pub domain: Option<String>,
    pub engine: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list(ctx: Ctx, ApiQuery(params): ApiQuery<StrengthParams>) -> ApiResult {
    let domain = domain_param(params.domain.as_deref())?;
    let engine = params
        .engine
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());
    let row_limit = limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT)?;

    let query = Query::new()
        .eq("domain", &domain)
        .eq_opt("engine", engine)
        .order_by("snapshot_date", false)
        .limit(row_limit);
    let rows = ctx.store().select(DOMAIN_STRENGTH, &query).await?;
    let snapshots: Vec<DomainStrengthSnapshot> = super::from_rows(DOMAIN_STRENGTH, rows)?;

    let count = snapshots.len();
    Ok(ApiResponse(
        Envelope::ok(json!({ "domain": domain, "snapshots": snapshots })).meta("count", count),
    ))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct StrengthRequest {
    pub domain: Option<String>,
    pub engine: Option<String>,
    pub date: Option<String>,
    pub location_code: Option<u32>,
    pub language_code: Option<String>,
    #[serde(default = "default_true")]
    pub persist: bool,
}

pub async fn compute(ctx: Ctx, ApiJson(req): ApiJson<StrengthRequest>) -> ApiResult {
    let domain = domain_param(req.domain.as_deref())?;
    let engine = req
        .engine
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| DEFAULT_ENGINE.to_string());
    // Organic metrics come from Google SERP data only.
    if engine != DEFAULT_ENGINE {
        return Err(ApiError::invalid(format!("unsupported engine: {engine}")));
    }
    let date = parse_opt_date("date", req.date.as_deref())?.unwrap_or_else(today);
    let locale = locale(req.location_code, req.language_code.as_deref());

    let provider = ctx.serp()?;
    let (inputs, cached): (DomainStrengthInputs, bool) = ctx
        .cache
        .get_or_fetch("domain_metrics", &(&domain, &locale), || {
            provider.domain_metrics(&domain, &locale)
        })
        .await?;
    let snap = snapshot(&domain, &engine, date, inputs)?;
    let row = serde_json::to_value(&snap)?;

    if req.persist {
        ctx.store()
            .upsert(DOMAIN_STRENGTH, std::slice::from_ref(&row), DOMAIN_STRENGTH_CONFLICT)
            .await?;
    }
    tracing::info!(
        event = "domain_strength_scored",
        domain = %snap.domain,
        score = snap.score,
        band = snap.band.as_str(),
        persisted = req.persist
    );

    Ok(ApiResponse(
        Envelope::ok(row)
            .meta("source", provider.provider_name())
            .meta("cached", cached)
            .meta("persisted", req.persist),
    ))
}
