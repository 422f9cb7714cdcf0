//! DataForSEO lookups: live SERP snapshots with AI Overview citations and
//! keyword search volume.

use super::{clean_keywords, locale, Ctx};
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::response::{ApiResponse, ApiResult};
use geo_audit_core::citations::find_domain_citations;
use geo_audit_core::envelope::Envelope;
use geo_audit_core::providers::{KeywordVolume, SerpRequest, SerpSnapshot};
use geo_audit_core::urlnorm::normalize_domain;
use serde::Deserialize;
use serde_json::json;

pub const MAX_VOLUME_KEYWORDS: usize = 1000;
const MAX_KEYWORD_CHARS: usize = 80;

#[derive(Debug, Deserialize)]
pub struct AiOverviewRequest {
    pub keyword: String,
    pub domain: Option<String>,
    pub location_code: Option<u32>,
    pub language_code: Option<String>,
    pub device: Option<String>,
}

pub fn parse_device(raw: Option<&str>) -> Result<String, ApiError> {
    match raw.map(|d| d.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("desktop") => Ok("desktop".to_string()),
        Some("mobile") => Ok("mobile".to_string()),
        Some(other) => Err(ApiError::invalid(format!(
            "device must be desktop or mobile, got {other:?}"
        ))),
    }
}

pub async fn ai_overview(ctx: Ctx, ApiJson(req): ApiJson<AiOverviewRequest>) -> ApiResult {
    let keyword = req.keyword.trim();
    if keyword.is_empty() {
        return Err(ApiError::invalid("keyword is required"));
    }
    let device = parse_device(req.device.as_deref())?;
    let domain = match req.domain.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => Some(
            normalize_domain(raw)
                .ok_or_else(|| ApiError::invalid(format!("invalid domain: {raw}")))?,
        ),
        None => None,
    };
    let serp_req = SerpRequest {
        keyword: keyword.to_string(),
        locale: locale(req.location_code, req.language_code.as_deref()),
        device,
    };

    let provider = ctx.serp()?;
    let (snap, cached): (SerpSnapshot, bool) = ctx
        .cache
        .get_or_fetch("serp", &serp_req, || provider.serp_snapshot(&serp_req))
        .await?;

    let mut data = serde_json::to_value(&snap)?;
    if let Some(domain) = &domain {
        let citations = serde_json::to_value(&snap.ai_citations)?;
        let citations = citations.as_array().cloned().unwrap_or_default();
        let hits = find_domain_citations(&citations, domain);
        data["domain"] = json!(domain);
        data["domain_cited"] = json!(!hits.is_empty());
        data["domain_citations"] = serde_json::to_value(&hits)?;
        data["domain_rank"] = json!(snap.rank_of(domain).map(|r| r.rank));
    }

    Ok(ApiResponse(
        Envelope::ok(data)
            .meta("source", provider.provider_name())
            .meta("cached", cached),
    ))
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    #[serde(default)]
    pub keywords: Vec<String>,
    pub location_code: Option<u32>,
    pub language_code: Option<String>,
}

pub async fn keyword_volume(ctx: Ctx, ApiJson(req): ApiJson<VolumeRequest>) -> ApiResult {
    let keywords = clean_keywords(&req.keywords);
    if keywords.is_empty() {
        return Err(ApiError::invalid("keywords must contain at least one keyword"));
    }
    if keywords.len() > MAX_VOLUME_KEYWORDS {
        return Err(ApiError::LimitExceeded(format!(
            "{} keywords exceeds the limit of {MAX_VOLUME_KEYWORDS}",
            keywords.len()
        )));
    }
    if let Some(long) = keywords.iter().find(|k| k.chars().count() > MAX_KEYWORD_CHARS) {
        return Err(ApiError::invalid(format!(
            "keyword longer than {MAX_KEYWORD_CHARS} characters: {long}"
        )));
    }
    let locale = locale(req.location_code, req.language_code.as_deref());

    let provider = ctx.serp()?;
    let (rows, cached): (Vec<KeywordVolume>, bool) = ctx
        .cache
        .get_or_fetch("volume", &(&keywords, &locale), || {
            provider.search_volume(&keywords, &locale)
        })
        .await?;

    let count = rows.len();
    Ok(ApiResponse(
        Envelope::ok(json!({ "keywords": rows }))
            .meta("source", provider.provider_name())
            .meta("cached", cached)
            .meta("count", count),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device() {
        assert_eq!(parse_device(None).unwrap(), "desktop");
        assert_eq!(parse_device(Some("Mobile")).unwrap(), "mobile");
        assert!(parse_device(Some("tablet")).is_err());
    }
}
