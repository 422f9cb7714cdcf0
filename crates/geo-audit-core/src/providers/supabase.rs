//! Supabase PostgREST access.

use super::{check_status, http_client, DataStore};
use async_trait::async_trait;
use serde_json::Value;

const SERVICE: &str = "supabase";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lte,
}

impl FilterOp {
    fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Gte => "gte",
            FilterOp::Lte => "lte",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    /// Column and ascending flag.
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    fn filter(mut self, column: &str, op: FilterOp, value: impl ToString) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op,
            value: value.to_string(),
        });
        self
    }

    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    pub fn gte(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Gte, value)
    }

    pub fn lte(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Lte, value)
    }

    pub fn eq_opt(self, column: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self,
        }
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// PostgREST query parameters.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        for f in &self.filters {
            params.push((f.column.clone(), format!("{}.{}", f.op.as_str(), f.value)));
        }
        if let Some((col, asc)) = &self.order {
            let dir = if *asc { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{col}.{dir}")));
        }
        if let Some(n) = self.limit {
            params.push(("limit".to_string(), n.to_string()));
        }
        params
    }
}

pub struct SupabaseClient {
    base_url: String,
    service_key: String,
    client: reqwest::Client,
}

impl SupabaseClient {
    pub fn new(base_url: String, service_key: String, timeout_ms: u64) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            client: http_client(timeout_ms)?,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

#[async_trait]
impl DataStore for SupabaseClient {
    async fn select(&self, table: &str, query: &Query) -> anyhow::Result<Vec<Value>> {
        tracing::debug!(event = "upstream_call", service = SERVICE, table = table, op = "select");
        let resp = self
            .client
            .get(self.table_url(table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .query(&query.to_params())
            .send()
            .await?;
        Ok(check_status(SERVICE, resp).await?.json().await?)
    }

    async fn upsert(
        &self,
        table: &str,
        rows: &[Value],
        on_conflict: &str,
    ) -> anyhow::Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        tracing::debug!(
            event = "upstream_call",
            service = SERVICE,
            table = table,
            op = "upsert",
            rows = rows.len()
        );
        let resp = self
            .client
            .post(self.table_url(table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", on_conflict)])
            .json(rows)
            .send()
            .await?;
        check_status(SERVICE, resp).await?;
        Ok(rows.len())
    }

    fn backend_name(&self) -> &'static str {
        SERVICE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params() {
        let q = Query::new()
            .eq("property_url", "https://example.com")
            .gte("audit_date", "2024-01-01")
            .eq_opt("keyword", None::<String>)
            .order_by("audit_date", false)
            .limit(10);
        let params = q.to_params();
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("property_url".to_string(), "eq.https://example.com".to_string()),
                ("audit_date".to_string(), "gte.2024-01-01".to_string()),
                ("order".to_string(), "audit_date.desc".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_table_url_trims_slash() {
        let c = SupabaseClient::new("https://proj.supabase.co/".into(), "k".into(), 1000).unwrap();
        assert_eq!(c.table_url("audit_results"), "https://proj.supabase.co/rest/v1/audit_results");
    }
}
