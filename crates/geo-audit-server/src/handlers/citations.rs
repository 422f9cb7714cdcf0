use super::rankings::{rankings_for_date, resolve_audit_date};
use super::{parse_opt_date, required, Ctx};
use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::response::{ApiResponse, ApiResult};
use geo_audit_core::citations::{match_rankings, summarize};
use geo_audit_core::envelope::Envelope;
use geo_audit_core::scores::ai_visibility;
use geo_audit_core::urlnorm::{is_bare_path, normalize_domain, normalize_url};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct CitationParams {
    pub property_url: Option<String>,
    /// Upper bound: the latest audit on or before this date is used.
    pub audit_date: Option<String>,
    pub page_url: Option<String>,
}

pub async fn get(ctx: Ctx, ApiQuery(params): ApiQuery<CitationParams>) -> ApiResult {
    let property_url = required("property_url", params.property_url.as_deref())?;
    let domain = normalize_domain(property_url)
        .ok_or_else(|| ApiError::invalid(format!("invalid property_url: {property_url}")))?;
    let cap = parse_opt_date("audit_date", params.audit_date.as_deref())?;
    let page_url = params.page_url.as_deref().map(str::trim).filter(|p| !p.is_empty());
    if let Some(p) = page_url {
        if !is_bare_path(p) && normalize_url(p).is_none() {
            return Err(ApiError::invalid(format!("invalid page_url: {p}")));
        }
    }

    let Some(audit_date) = resolve_audit_date(&ctx, property_url, cap).await? else {
        return Err(ApiError::NotFound(format!(
            "no keyword rankings for {property_url}"
        )));
    };
    let rankings = rankings_for_date(&ctx, property_url, audit_date).await?;

    let matches = match_rankings(&rankings, &domain, page_url);
    let summary = summarize(&rankings, &domain);
    let score = ai_visibility(&summary);

    let count = matches.len();
    Ok(ApiResponse(
        Envelope::ok(json!({
            "domain": domain,
            "audit_date": audit_date.to_string(),
            "page_url": page_url,
            "matches": matches,
            "summary": summary,
            "ai_visibility_score": score,
        }))
        .meta("count", count),
    ))
}
