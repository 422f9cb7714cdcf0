use super::{check_status, http_client, SerpProvider};
use crate::errors::UpstreamError;
use crate::model::DomainStrengthInputs;
use crate::urlnorm::{normalize_domain, normalize_url};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

pub const DEFAULT_BASE_URL: &str = "https://api.dataforseo.com";
const SERVICE: &str = "dataforseo";
const TASK_OK: u64 = 20000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale {
    pub location_code: u32,
    pub language_code: String,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            location_code: 2840,
            language_code: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SerpRequest {
    pub keyword: String,
    pub locale: Locale,
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiCitation {
    pub url: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganicResult {
    pub rank: u32,
    pub url: String,
    pub domain: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerpSnapshot {
    pub keyword: String,
    pub has_ai_overview: bool,
    pub ai_citations: Vec<AiCitation>,
    pub organic: Vec<OrganicResult>,
}

impl SerpSnapshot {
    /// Best organic position of the domain (or a subdomain).
    pub fn rank_of(&self, domain: &str) -> Option<&OrganicResult> {
        self.organic
            .iter()
            .filter(|r| crate::urlnorm::domain_matches(&r.url, domain))
            .min_by_key(|r| r.rank)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordVolume {
    pub keyword: String,
    pub search_volume: Option<u64>,
    pub cpc: Option<f64>,
    pub competition: Option<String>,
    pub competition_index: Option<u32>,
}

pub struct DataForSeoClient {
    pub base_url: String,
    login: String,
    password: String,
    client: reqwest::Client,
}

impl DataForSeoClient {
    pub fn new(login: String, password: String, timeout_ms: u64) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login,
            password,
            client: http_client(timeout_ms)?,
        })
    }

    async fn post(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        tracing::debug!(event = "upstream_call", service = SERVICE, path = path);

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.login, Some(&self.password))
            .json(&body)
            .send()
            .await?;
        let resp = check_status(SERVICE, resp).await?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl SerpProvider for DataForSeoClient {
    async fn serp_snapshot(&self, req: &SerpRequest) -> anyhow::Result<SerpSnapshot> {
        let body = json!([{
            "keyword": req.keyword,
            "location_code": req.locale.location_code,
            "language_code": req.locale.language_code,
            "device": req.device,
        }]);
        let json = self
            .post("/v3/serp/google/organic/live/advanced", body)
            .await?;
        parse_serp(&req.keyword, &json)
    }

    async fn search_volume(
        &self,
        keywords: &[String],
        locale: &Locale,
    ) -> anyhow::Result<Vec<KeywordVolume>> {
        let body = json!([{
            "keywords": keywords,
            "location_code": locale.location_code,
            "language_code": locale.language_code,
        }]);
        let json = self
            .post("/v3/keywords_data/google_ads/search_volume/live", body)
            .await?;
        parse_search_volume(&json)
    }

    async fn domain_metrics(
        &self,
        target: &str,
        locale: &Locale,
    ) -> anyhow::Result<DomainStrengthInputs> {
        let body = json!([{
            "target": target,
            "location_code": locale.location_code,
            "language_code": locale.language_code,
        }]);
        let json = self
            .post("/v3/dataforseo_labs/google/domain_rank_overview/live", body)
            .await?;
        parse_domain_metrics(&json)
    }

    fn provider_name(&self) -> &'static str {
        SERVICE
    }
}

/// Checks the envelope and task status codes and returns `tasks[0].result`.
fn task_result(json: &Value) -> anyhow::Result<&Value> {
    let top = json.get("status_code").and_then(Value::as_u64).unwrap_or(TASK_OK);
    if top != TASK_OK {
        let msg = json
            .get("status_message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(UpstreamError::new(SERVICE, task_code(top), msg).into());
    }

    let task = json
        .pointer("/tasks/0")
        .ok_or_else(|| UpstreamError::new(SERVICE, 200, "response has no tasks"))?;
    let code = task.get("status_code").and_then(Value::as_u64).unwrap_or(0);
    if code != TASK_OK {
        let msg = task
            .get("status_message")
            .and_then(Value::as_str)
            .unwrap_or("task failed");
        return Err(UpstreamError::new(SERVICE, task_code(code), msg).into());
    }

    Ok(task.get("result").unwrap_or(&Value::Null))
}

fn task_code(code: u64) -> u16 {
    u16::try_from(code).unwrap_or(0)
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn push_references(refs: Option<&Value>, seen: &mut HashSet<String>, out: &mut Vec<AiCitation>) {
    let Some(refs) = refs.and_then(Value::as_array) else {
        return;
    };
    for r in refs {
        let Some(url) = str_field(r, "url") else {
            continue;
        };
        let Some(key) = normalize_url(&url) else {
            continue;
        };
        if !seen.insert(key) {
            continue;
        }
        let domain = str_field(r, "domain").or_else(|| normalize_domain(&url));
        out.push(AiCitation {
            url,
            domain,
            title: str_field(r, "title"),
        });
    }
}

pub fn parse_serp(keyword: &str, json: &Value) -> anyhow::Result<SerpSnapshot> {
    let result = task_result(json)?;
    let items = result
        .pointer("/0/items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut has_ai_overview = false;
    let mut seen = HashSet::new();
    let mut ai_citations = Vec::new();
    let mut organic = Vec::new();

    for item in &items {
        match item.get("type").and_then(Value::as_str) {
            Some("ai_overview") => {
                has_ai_overview = true;
                push_references(item.get("references"), &mut seen, &mut ai_citations);
                if let Some(elements) = item.get("items").and_then(Value::as_array) {
                    for el in elements {
                        push_references(el.get("references"), &mut seen, &mut ai_citations);
                    }
                }
            }
            Some("organic") => {
                let rank = item
                    .get("rank_group")
                    .and_then(Value::as_u64)
                    .or_else(|| item.get("rank_absolute").and_then(Value::as_u64));
                let (Some(rank), Some(url)) = (rank, str_field(item, "url")) else {
                    continue;
                };
                let domain = str_field(item, "domain")
                    .or_else(|| normalize_domain(&url))
                    .unwrap_or_default();
                organic.push(OrganicResult {
                    rank: u32::try_from(rank).unwrap_or(u32::MAX),
                    url,
                    domain,
                    title: str_field(item, "title"),
                });
            }
            _ => {}
        }
    }

    Ok(SerpSnapshot {
        keyword: keyword.to_string(),
        has_ai_overview,
        ai_citations,
        organic,
    })
}

pub fn parse_search_volume(json: &Value) -> anyhow::Result<Vec<KeywordVolume>> {
    let result = task_result(json)?;
    let rows = result.as_array().cloned().unwrap_or_default();
    Ok(rows
        .iter()
        .filter_map(|r| {
            Some(KeywordVolume {
                keyword: str_field(r, "keyword")?,
                search_volume: r.get("search_volume").and_then(Value::as_u64),
                cpc: r.get("cpc").and_then(Value::as_f64),
                competition: str_field(r, "competition"),
                competition_index: r
                    .get("competition_index")
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok()),
            })
        })
        .collect())
}

/// Unknown domains come back without items and score as zero.
pub fn parse_domain_metrics(json: &Value) -> anyhow::Result<DomainStrengthInputs> {
    let result = task_result(json)?;
    let Some(organic) = result.pointer("/0/items/0/metrics/organic") else {
        return Ok(DomainStrengthInputs::default());
    };
    let count = |k: &str| organic.get(k).and_then(Value::as_u64).unwrap_or(0);

    Ok(DomainStrengthInputs {
        organic_etv: organic.get("etv").and_then(Value::as_f64).unwrap_or(0.0),
        organic_keywords: count("count"),
        top10_keywords: count("pos_1") + count("pos_2_3") + count("pos_4_10"),
    })
}
