//! External data sources. Each API sits behind a trait so handlers can be
//! exercised against in-process fakes.

use crate::errors::UpstreamError;
use crate::model::{DomainStrengthInputs, GscRow};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

pub mod dataforseo;
pub mod google;
pub mod memory;
pub mod supabase;

pub use dataforseo::{KeywordVolume, Locale, SerpRequest, SerpSnapshot};
pub use google::{BusinessLocation, MetricSeries, SearchAnalyticsRequest};
pub use supabase::Query;

#[async_trait]
pub trait SerpProvider: Send + Sync {
    async fn serp_snapshot(&self, req: &SerpRequest) -> anyhow::Result<SerpSnapshot>;
    async fn search_volume(
        &self,
        keywords: &[String],
        locale: &Locale,
    ) -> anyhow::Result<Vec<KeywordVolume>>;
    async fn domain_metrics(
        &self,
        target: &str,
        locale: &Locale,
    ) -> anyhow::Result<DomainStrengthInputs>;
    fn provider_name(&self) -> &'static str;
}

#[async_trait]
pub trait SearchConsole: Send + Sync {
    async fn search_analytics(
        &self,
        site_url: &str,
        req: &SearchAnalyticsRequest,
    ) -> anyhow::Result<Vec<GscRow>>;
}

#[async_trait]
pub trait BusinessProfile: Send + Sync {
    async fn list_locations(&self, account_id: &str) -> anyhow::Result<Vec<BusinessLocation>>;
    async fn daily_metrics(
        &self,
        location_id: &str,
        metrics: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<MetricSeries>>;
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> anyhow::Result<Vec<Value>>;
    /// Inserts rows, merging into existing rows that share the `on_conflict` columns.
    /// Returns the number of rows written.
    async fn upsert(&self, table: &str, rows: &[Value], on_conflict: &str)
        -> anyhow::Result<usize>;
    fn backend_name(&self) -> &'static str;
}

/// Turns a non-2xx response into an [`UpstreamError`].
pub(crate) async fn check_status(
    service: &'static str,
    resp: reqwest::Response,
) -> anyhow::Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::warn!(
        event = "upstream_error",
        service = service,
        status = status.as_u16(),
    );
    Err(UpstreamError::new(service, status.as_u16(), body).into())
}

pub(crate) fn http_client(timeout_ms: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(timeout_ms))
        .user_agent(concat!("geo-audit/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
