use super::supabase::{FilterOp, Query};
use super::DataStore;
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-process table store with PostgREST-like filter and upsert semantics.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<HashMap<String, Vec<Value>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .map(|t| t.get(table).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

fn compare(v: &Value, s: &str) -> Option<Ordering> {
    match v {
        Value::String(x) => Some(x.as_str().cmp(s)),
        Value::Number(n) => n.as_f64()?.partial_cmp(&s.parse::<f64>().ok()?),
        Value::Bool(b) => Some(b.cmp(&s.parse::<bool>().ok()?)),
        _ => None,
    }
}

fn matches(row: &Value, query: &Query) -> bool {
    query.filters.iter().all(|f| {
        let Some(v) = row.get(&f.column) else {
            return false;
        };
        match (f.op, compare(v, &f.value)) {
            (FilterOp::Eq, Some(o)) => o == Ordering::Equal,
            (FilterOp::Gte, Some(o)) => o != Ordering::Less,
            (FilterOp::Lte, Some(o)) => o != Ordering::Greater,
            (_, None) => false,
        }
    })
}

fn order_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        // Nulls and missing values sort last.
        (Some(Value::Null) | None, Some(Value::Null) | None) => Ordering::Equal,
        (Some(Value::Null) | None, _) => Ordering::Greater,
        (_, Some(Value::Null) | None) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn conflict_key(row: &Value, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| row.get(*c).map(Value::to_string).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select(&self, table: &str, query: &Query) -> anyhow::Result<Vec<Value>> {
        let tables = self.tables.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| matches(r, query)).cloned().collect())
            .unwrap_or_default();

        if let Some((col, asc)) = &query.order {
            rows.sort_by(|a, b| {
                let o = order_values(a.get(col), b.get(col));
                let nulls = matches!(a.get(col), None | Some(Value::Null))
                    || matches!(b.get(col), None | Some(Value::Null));
                if *asc || nulls {
                    o
                } else {
                    o.reverse()
                }
            });
        }
        if let Some(n) = query.limit {
            rows.truncate(n);
        }
        Ok(rows)
    }

    async fn upsert(
        &self,
        table: &str,
        rows: &[Value],
        on_conflict: &str,
    ) -> anyhow::Result<usize> {
        let columns: Vec<&str> = on_conflict
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        for row in rows {
            anyhow::ensure!(row.is_object(), "upsert rows must be JSON objects");
            for c in &columns {
                anyhow::ensure!(
                    row.get(*c).is_some_and(|v| !v.is_null()),
                    "row is missing conflict column '{c}'"
                );
            }
        }

        let mut tables = self.tables.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        let stored = tables.entry(table.to_string()).or_default();

        for row in rows {
            let key = conflict_key(row, &columns);
            let existing = if columns.is_empty() {
                None
            } else {
                stored.iter().position(|r| conflict_key(r, &columns) == key)
            };
            match existing {
                Some(i) => {
                    if let (Some(current), Some(incoming)) = (stored[i].as_object_mut(), row.as_object()) {
                        for (k, v) in incoming {
                            current.insert(k.clone(), v.clone());
                        }
                    }
                }
                None => stored.push(row.clone()),
            }
        }
        Ok(rows.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_merges_on_conflict_keys() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store
            .upsert(
                "t",
                &[
                    json!({"site": "a", "day": "2024-01-01", "clicks": 1}),
                    json!({"site": "a", "day": "2024-01-02", "clicks": 2}),
                ],
                "site,day",
            )
            .await?;
        store
            .upsert(
                "t",
                &[json!({"site": "a", "day": "2024-01-01", "clicks": 5, "note": "fixed"})],
                "site,day",
            )
            .await?;

        assert_eq!(store.row_count("t"), 2);
        let rows = store.select("t", &Query::new().eq("day", "2024-01-01")).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["clicks"], 5);
        assert_eq!(rows[0]["note"], "fixed");
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_requires_conflict_columns() {
        let store = MemoryStore::new();
        let err = store
            .upsert("t", &[json!({"site": "a"})], "site,day")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("day"));
        assert_eq!(store.row_count("t"), 0);
    }

    #[tokio::test]
    async fn test_select_filters_order_and_limit() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let rows: Vec<Value> = (1..=5)
            .map(|i| json!({"site": "a", "day": format!("2024-01-0{i}"), "score": i, "ok": i % 2 == 0}))
            .chain(std::iter::once(json!({"site": "b", "day": "2024-01-03", "score": null})))
            .collect();
        store.upsert("t", &rows, "site,day").await?;

        let q = Query::new()
            .eq("site", "a")
            .gte("day", "2024-01-02")
            .lte("day", "2024-01-04")
            .order_by("day", false);
        let got = store.select("t", &q).await?;
        let days: Vec<_> = got.iter().map(|r| r["day"].as_str().unwrap()).collect();
        assert_eq!(days, vec!["2024-01-04", "2024-01-03", "2024-01-02"]);

        let top = store
            .select("t", &Query::new().gte("score", 3).order_by("score", false).limit(2))
            .await?;
        assert_eq!(top.len(), 2);
        assert_eq!(top[0]["score"], 5);

        let even = store.select("t", &Query::new().eq("ok", true)).await?;
        assert_eq!(even.len(), 2);

        let by_score = store.select("t", &Query::new().order_by("score", false)).await?;
        assert_eq!(by_score.last().unwrap()["site"], "b");

        assert!(store.select("missing", &Query::new()).await?.is_empty());
        Ok(())
    }
}
