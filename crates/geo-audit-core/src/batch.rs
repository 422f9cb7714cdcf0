//! Chunked upserts that keep going after a failed chunk: insert what
//! succeeded, report what failed.

use crate::envelope::Status;
use crate::providers::DataStore;
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_CHUNK_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkError {
    pub chunk: usize,
    pub rows: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub table: String,
    pub attempted: usize,
    pub written: usize,
    pub failed: usize,
    pub errors: Vec<ChunkError>,
}

impl BatchReport {
    pub fn status(&self) -> Status {
        if self.failed == 0 {
            Status::Ok
        } else if self.written > 0 {
            Status::Partial
        } else {
            Status::Error
        }
    }
}

pub async fn upsert_in_chunks(
    store: &dyn DataStore,
    table: &str,
    rows: &[Value],
    on_conflict: &str,
    chunk_size: usize,
) -> BatchReport {
    let mut report = BatchReport {
        table: table.to_string(),
        attempted: rows.len(),
        written: 0,
        failed: 0,
        errors: Vec::new(),
    };

    for (idx, chunk) in rows.chunks(chunk_size.max(1)).enumerate() {
        match store.upsert(table, chunk, on_conflict).await {
            Ok(n) => report.written += n,
            Err(e) => {
                tracing::warn!(
                    event = "batch_chunk_failed",
                    table = table,
                    chunk = idx,
                    rows = chunk.len(),
                    error = %e
                );
                report.failed += chunk.len();
                report.errors.push(ChunkError {
                    chunk: idx,
                    rows: chunk.len(),
                    message: format!("{e:#}"),
                });
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::MemoryStore;
    use crate::providers::Query;
    use async_trait::async_trait;
    use serde_json::json;

    /// Rejects any chunk containing a row flagged `poison`.
    struct PoisonStore(MemoryStore);

    #[async_trait]
    impl DataStore for PoisonStore {
        async fn select(&self, table: &str, query: &Query) -> anyhow::Result<Vec<Value>> {
            self.0.select(table, query).await
        }

        async fn upsert(&self, table: &str, rows: &[Value], on_conflict: &str) -> anyhow::Result<usize> {
            if rows.iter().any(|r| r.get("poison").is_some()) {
                anyhow::bail!("constraint violation");
            }
            self.0.upsert(table, rows, on_conflict).await
        }

        fn backend_name(&self) -> &'static str {
            "poison"
        }
    }

    fn rows(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"id": i})).collect()
    }

    #[tokio::test]
    async fn test_all_chunks_succeed() {
        let store = MemoryStore::new();
        let report = upsert_in_chunks(&store, "t", &rows(7), "id", 3).await;
        assert_eq!(report.written, 7);
        assert_eq!(report.failed, 0);
        assert_eq!(report.status(), Status::Ok);
        assert_eq!(store.row_count("t"), 7);
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_stop_later_chunks() {
        let inner = MemoryStore::new();
        let store = PoisonStore(inner.clone());
        let mut data = rows(7);
        data[4]["poison"] = json!(true);

        let report = upsert_in_chunks(&store, "t", &data, "id", 3).await;
        assert_eq!(report.written, 4);
        assert_eq!(report.failed, 3);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].chunk, 1);
        assert!(report.errors[0].message.contains("constraint violation"));
        assert_eq!(report.status(), Status::Partial);
        assert_eq!(inner.row_count("t"), 4);
    }

    #[tokio::test]
    async fn test_everything_failing_is_error() {
        let store = PoisonStore(MemoryStore::new());
        let data = vec![json!({"id": 1, "poison": 1})];
        let report = upsert_in_chunks(&store, "t", &data, "id", 0).await;
        assert_eq!(report.status(), Status::Error);
        assert_eq!(report.written, 0);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let report = upsert_in_chunks(&MemoryStore::new(), "t", &[], "id", 10).await;
        assert_eq!(report.attempted, 0);
        assert_eq!(report.status(), Status::Ok);
    }
}
