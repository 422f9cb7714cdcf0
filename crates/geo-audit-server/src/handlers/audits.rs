use super::{from_rows, limit, parse_opt_date, required, Ctx};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::response::{ApiResponse, ApiResult};
use geo_audit_core::envelope::Envelope;
use geo_audit_core::model::{AuditResult, AUDIT_RESULTS, AUDIT_RESULTS_CONFLICT};
use geo_audit_core::providers::Query;
use geo_audit_core::scores;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    pub property_url: Option<String>,
    pub audit_date: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list(ctx: Ctx, ApiQuery(params): ApiQuery<AuditParams>) -> ApiResult {
    let property_url = required("property_url", params.property_url.as_deref())?;
    let audit_date = parse_opt_date("audit_date", params.audit_date.as_deref())?;
    let row_limit = limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT)?;

    let query = Query::new()
        .eq("property_url", property_url)
        .eq_opt("audit_date", audit_date)
        .order_by("audit_date", false)
        .limit(row_limit);
    let rows = ctx.store().select(AUDIT_RESULTS, &query).await?;
    let audits: Vec<AuditResult> = from_rows(AUDIT_RESULTS, rows)?;

    let count = audits.len();
    Ok(ApiResponse(
        Envelope::ok(json!({ "audits": audits })).meta("count", count),
    ))
}

pub async fn latest(ctx: Ctx, ApiQuery(params): ApiQuery<AuditParams>) -> ApiResult {
    let property_url = required("property_url", params.property_url.as_deref())?;
    let query = Query::new()
        .eq("property_url", property_url)
        .order_by("audit_date", false)
        .limit(1);
    let rows = ctx.store().select(AUDIT_RESULTS, &query).await?;
    let audit = from_rows::<AuditResult>(AUDIT_RESULTS, rows)?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound(format!("no audit results for {property_url}")))?;
    Ok(ApiResponse(Envelope::ok(serde_json::to_value(&audit)?)))
}

pub async fn upsert(ctx: Ctx, ApiJson(mut audit): ApiJson<AuditResult>) -> ApiResult {
    audit.property_url = required("property_url", Some(audit.property_url.as_str()))?.to_string();
    for (name, score) in [
        ("visibility_score", audit.visibility_score),
        ("authority_score", audit.authority_score),
        ("content_schema_score", audit.content_schema_score),
        ("local_entity_score", audit.local_entity_score),
        ("ai_visibility_score", audit.ai_visibility_score),
        ("overall_score", audit.overall_score),
    ] {
        if let Some(s) = score {
            if !(0.0..=100.0).contains(&s) {
                return Err(ApiError::invalid(format!("{name} must be within 0..=100, got {s}")));
            }
        }
    }

    let computed = audit.overall_score.is_none();
    if computed {
        audit.overall_score = scores::overall(&audit);
    }

    let row = serde_json::to_value(&audit)?;
    ctx.store()
        .upsert(AUDIT_RESULTS, std::slice::from_ref(&row), AUDIT_RESULTS_CONFLICT)
        .await?;
    tracing::info!(
        event = "audit_saved",
        property_url = %audit.property_url,
        audit_date = %audit.audit_date,
        overall_computed = computed
    );
    Ok(ApiResponse(
        Envelope::ok(row).meta("overall_computed", computed),
    ))
}
