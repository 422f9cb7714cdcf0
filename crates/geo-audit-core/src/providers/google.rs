//! Google Search Console and Business Profile clients sharing one OAuth2
//! refresh-token credential.

use super::{check_status, http_client, BusinessProfile, SearchConsole};
use crate::errors::ValidationError;
use crate::model::GscRow;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SEARCH_CONSOLE_URL: &str = "https://www.googleapis.com/webmasters/v3";
const BUSINESS_INFO_URL: &str = "https://mybusinessbusinessinformation.googleapis.com/v1";
const PERFORMANCE_URL: &str = "https://businessprofileperformance.googleapis.com/v1";
const LOCATION_READ_MASK: &str = "name,title,storefrontAddress,websiteUri";

pub const MAX_ROW_LIMIT: u32 = 25_000;
const TOKEN_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionFilter {
    pub dimension: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    pub expression: String,
}

fn default_operator() -> String {
    "equals".to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchAnalyticsRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dimensions: Vec<String>,
    pub row_limit: u32,
    pub max_rows: u32,
    pub filters: Vec<DimensionFilter>,
}

impl SearchAnalyticsRequest {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, dimensions: Vec<String>) -> Self {
        Self {
            start_date,
            end_date,
            dimensions,
            row_limit: MAX_ROW_LIMIT,
            max_rows: 100_000,
            filters: Vec::new(),
        }
    }

    fn page_size(&self) -> u32 {
        self.row_limit.clamp(1, MAX_ROW_LIMIT).min(self.max_rows.max(1))
    }

    pub fn page_body(&self, start_row: u32) -> Value {
        let mut body = json!({
            "startDate": self.start_date.to_string(),
            "endDate": self.end_date.to_string(),
            "dimensions": self.dimensions,
            "rowLimit": self.page_size(),
            "startRow": start_row,
        });
        if !self.filters.is_empty() {
            body["dimensionFilterGroups"] = json!([{ "filters": self.filters }]);
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessLocation {
    pub name: String,
    pub location_id: String,
    pub title: Option<String>,
    pub website_uri: Option<String>,
    pub address: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyValue {
    pub date: NaiveDate,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub metric: String,
    pub total: i64,
    pub series: Vec<DailyValue>,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct GoogleClient {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

impl GoogleClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        refresh_token: String,
        timeout_ms: u64,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client_id,
            client_secret,
            refresh_token,
            client: http_client(timeout_ms)?,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(t) = guard.as_ref() {
            if Instant::now() + TOKEN_SKEW < t.expires_at {
                return Ok(t.access_token.clone());
            }
        }

        tracing::debug!(event = "upstream_call", service = "google_oauth");
        let resp = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;
        let token: TokenResponse = check_status("google_oauth", resp)
            .await?
            .json()
            .await
            .context("invalid OAuth token response")?;

        let access = token.access_token.clone();
        *guard = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(access)
    }

    async fn get_json(&self, service: &'static str, url: &str, query: &[(String, String)]) -> anyhow::Result<Value> {
        let token = self.access_token().await?;
        tracing::debug!(event = "upstream_call", service = service, url = url);
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        Ok(check_status(service, resp).await?.json().await?)
    }
}

#[async_trait]
impl SearchConsole for GoogleClient {
    async fn search_analytics(
        &self,
        site_url: &str,
        req: &SearchAnalyticsRequest,
    ) -> anyhow::Result<Vec<GscRow>> {
        let url = format!(
            "{SEARCH_CONSOLE_URL}/sites/{}/searchAnalytics/query",
            encode_segment(site_url)
        );
        let page_size = req.page_size();
        let mut rows: Vec<GscRow> = Vec::new();
        let mut start_row = 0u32;

        loop {
            let token = self.access_token().await?;
            tracing::debug!(event = "upstream_call", service = "gsc", start_row = start_row);
            let resp = self
                .client
                .post(&url)
                .bearer_auth(token)
                .json(&req.page_body(start_row))
                .send()
                .await?;
            let json: Value = check_status("gsc", resp).await?.json().await?;
            let page = parse_rows(&json);
            let fetched = page.len() as u32;
            rows.extend(page);

            if fetched < page_size || rows.len() as u32 >= req.max_rows {
                break;
            }
            start_row += fetched;
        }

        rows.truncate(req.max_rows as usize);
        Ok(rows)
    }
}

#[async_trait]
impl BusinessProfile for GoogleClient {
    async fn list_locations(&self, account_id: &str) -> anyhow::Result<Vec<BusinessLocation>> {
        let account = account_id.trim().trim_start_matches("accounts/");
        if account.is_empty() {
            return Err(ValidationError("account_id is required".into()).into());
        }
        let url = format!("{BUSINESS_INFO_URL}/accounts/{}/locations", encode_segment(account));

        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("readMask".to_string(), LOCATION_READ_MASK.to_string()),
                ("pageSize".to_string(), "100".to_string()),
            ];
            if let Some(t) = &page_token {
                query.push(("pageToken".to_string(), t.clone()));
            }
            let json = self.get_json("gbp", &url, &query).await?;
            out.extend(parse_locations(&json));

            page_token = json
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        Ok(out)
    }

    async fn daily_metrics(
        &self,
        location_id: &str,
        metrics: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<MetricSeries>> {
        let location = location_id.trim().trim_start_matches("locations/");
        if location.is_empty() {
            return Err(ValidationError("location_id is required".into()).into());
        }
        let url = format!(
            "{PERFORMANCE_URL}/locations/{}:fetchMultiDailyMetricsTimeSeries",
            encode_segment(location)
        );
        let json = self
            .get_json("gbp", &url, &metrics_query(metrics, start, end))
            .await?;
        Ok(parse_metric_series(&json))
    }
}

fn encode_segment(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

pub fn metrics_query(metrics: &[String], start: NaiveDate, end: NaiveDate) -> Vec<(String, String)> {
    let mut q: Vec<(String, String)> = metrics
        .iter()
        .map(|m| ("dailyMetrics".to_string(), m.clone()))
        .collect();
    for (prefix, d) in [("dailyRange.start_date", start), ("dailyRange.end_date", end)] {
        q.push((format!("{prefix}.year"), d.year().to_string()));
        q.push((format!("{prefix}.month"), d.month().to_string()));
        q.push((format!("{prefix}.day"), d.day().to_string()));
    }
    q
}

pub fn parse_rows(json: &Value) -> Vec<GscRow> {
    json.get("rows")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|r| serde_json::from_value(r.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_locations(json: &Value) -> Vec<BusinessLocation> {
    let Some(locations) = json.get("locations").and_then(Value::as_array) else {
        return Vec::new();
    };
    locations
        .iter()
        .filter_map(|l| {
            let name = l.get("name").and_then(Value::as_str)?.to_string();
            let location_id = name.trim_start_matches("locations/").to_string();
            Some(BusinessLocation {
                location_id,
                name,
                title: l.get("title").and_then(Value::as_str).map(str::to_string),
                website_uri: l.get("websiteUri").and_then(Value::as_str).map(str::to_string),
                address: l.get("storefrontAddress").cloned(),
            })
        })
        .collect()
}

fn parse_date(v: &Value) -> Option<NaiveDate> {
    let part = |k: &str| v.get(k).and_then(Value::as_u64);
    NaiveDate::from_ymd_opt(
        i32::try_from(part("year")?).ok()?,
        u32::try_from(part("month")?).ok()?,
        u32::try_from(part("day")?).ok()?,
    )
}

/// Values arrive as int64 strings and are omitted on zero days.
pub fn parse_metric_series(json: &Value) -> Vec<MetricSeries> {
    let mut out = Vec::new();
    let groups = json
        .get("multiDailyMetricTimeSeries")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for group in &groups {
        let Some(series_list) = group.get("dailyMetricTimeSeries").and_then(Value::as_array) else {
            continue;
        };
        for s in series_list {
            let Some(metric) = s.get("dailyMetric").and_then(Value::as_str) else {
                continue;
            };
            let series: Vec<DailyValue> = s
                .pointer("/timeSeries/datedValues")
                .and_then(Value::as_array)
                .map(|vals| {
                    vals.iter()
                        .filter_map(|dv| {
                            let date = parse_date(dv.get("date")?)?;
                            let value = match dv.get("value") {
                                Some(Value::String(s)) => s.parse().unwrap_or(0),
                                Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
                                _ => 0,
                            };
                            Some(DailyValue { date, value })
                        })
                        .collect()
                })
                .unwrap_or_default();
            out.push(MetricSeries {
                metric: metric.to_string(),
                total: series.iter().map(|d| d.value).sum(),
                series,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_page_body_includes_filters_only_when_present() {
        let mut req = SearchAnalyticsRequest::new(d("2024-06-01"), d("2024-06-28"), vec!["page".into(), "query".into()]);
        let body = req.page_body(0);
        assert_eq!(body["startDate"], "2024-06-01");
        assert_eq!(body["rowLimit"], 25_000);
        assert!(body.get("dimensionFilterGroups").is_none());

        req.row_limit = 100_000;
        req.max_rows = 500;
        req.filters.push(DimensionFilter {
            dimension: "page".into(),
            operator: "contains".into(),
            expression: "/blog".into(),
        });
        let body = req.page_body(500);
        assert_eq!(body["rowLimit"], 500);
        assert_eq!(body["startRow"], 500);
        assert_eq!(body["dimensionFilterGroups"][0]["filters"][0]["expression"], "/blog");
    }

    #[test]
    fn test_parse_rows() {
        let json = json!({"rows": [
            {"keys": ["https://a.com/x", "q"], "clicks": 2, "impressions": 40, "ctr": 0.05, "position": 3.2},
            {"keys": ["https://a.com/y"], "clicks": 0, "impressions": 1, "ctr": 0, "position": 9}
        ]});
        let rows = parse_rows(&json);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].clicks, 2.0);
        assert_eq!(rows[1].keys, vec!["https://a.com/y"]);
        assert!(parse_rows(&json!({})).is_empty());
    }

    #[test]
    fn test_metrics_query() {
        let q = metrics_query(&["WEBSITE_CLICKS".into(), "CALL_CLICKS".into()], d("2024-01-05"), d("2024-02-04"));
        assert_eq!(q[0], ("dailyMetrics".to_string(), "WEBSITE_CLICKS".to_string()));
        assert!(q.contains(&("dailyRange.start_date.day".to_string(), "5".to_string())));
        assert!(q.contains(&("dailyRange.end_date.month".to_string(), "2".to_string())));
    }

    #[test]
    fn test_parse_locations() {
        let json = json!({"locations": [
            {"name": "locations/123", "title": "Main St", "websiteUri": "https://a.com", "storefrontAddress": {"locality": "Utrecht"}},
            {"title": "nameless"}
        ]});
        let locs = parse_locations(&json);
        assert_eq!(locs.len(), 1);
        assert_eq!(locs[0].location_id, "123");
        assert_eq!(locs[0].address.as_ref().unwrap()["locality"], "Utrecht");
    }

    #[test]
    fn test_parse_metric_series_sums_string_values() {
        let json = json!({"multiDailyMetricTimeSeries": [{"dailyMetricTimeSeries": [
            {"dailyMetric": "WEBSITE_CLICKS", "timeSeries": {"datedValues": [
                {"date": {"year": 2024, "month": 1, "day": 1}, "value": "12"},
                {"date": {"year": 2024, "month": 1, "day": 2}},
                {"date": {"year": 2024, "month": 1, "day": 3}, "value": "3"}
            ]}},
            {"dailyMetric": "CALL_CLICKS", "timeSeries": {}}
        ]}]});
        let series = parse_metric_series(&json);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].total, 15);
        assert_eq!(series[0].series[1].value, 0);
        assert_eq!(series[1].total, 0);
        assert!(series[1].series.is_empty());
    }

    #[test]
    fn test_encode_site_url() {
        assert_eq!(encode_segment("https://a.com/"), "https%3A%2F%2Fa.com%2F");
        assert_eq!(encode_segment("sc-domain:a.com"), "sc-domain%3Aa.com");
    }
}
