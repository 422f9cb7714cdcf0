use moka::sync::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::time::Duration;

/// TTL cache for idempotent upstream lookups. Entries are stored as JSON so
/// one cache serves every response type.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<String, Value>,
}

impl ResponseCache {
    pub fn new(max_entries: u64, ttl_secs: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(Duration::from_secs(ttl_secs.max(1)))
                .build(),
        }
    }

    /// Returns the value and whether it came from the cache.
    pub async fn get_or_fetch<T, P, F, Fut>(
        &self,
        namespace: &str,
        params: &P,
        fetch: F,
    ) -> anyhow::Result<(T, bool)>
    where
        T: Serialize + DeserializeOwned,
        P: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let key = key(namespace, &serde_json::to_vec(params)?);

        if let Some(v) = self.inner.get(&key) {
            if let Ok(hit) = serde_json::from_value(v) {
                tracing::debug!(event = "cache_hit", cache = namespace, key = %key);
                return Ok((hit, true));
            }
        }
        tracing::debug!(event = "cache_miss", cache = namespace, key = %key);

        let fresh = fetch().await?;
        self.inner.insert(key, serde_json::to_value(&fresh)?);
        Ok((fresh, false))
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn key(namespace: &str, params: &[u8]) -> String {
    format!("{}:{}", namespace, sha256_hex(params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_second_lookup_is_cached() -> anyhow::Result<()> {
        let cache = ResponseCache::new(16, 60);
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let fetch = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(vec!["a".to_string()])
        };

        let (first, hit1): (Vec<String>, bool) = cache.get_or_fetch("serp", &("k", 1), fetch).await?;
        let (second, hit2): (Vec<String>, bool) = cache.get_or_fetch("serp", &("k", 1), fetch).await?;
        assert_eq!(first, second);
        assert!(!hit1);
        assert!(hit2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let (_, hit3): (Vec<String>, bool) = cache.get_or_fetch("serp", &("k", 2), fetch).await?;
        assert!(!hit3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = ResponseCache::new(16, 60);
        let failed: anyhow::Result<(u32, bool)> = cache
            .get_or_fetch("vol", "k", || async { anyhow::bail!("upstream down") })
            .await;
        assert!(failed.is_err());
        let (v, hit) = cache
            .get_or_fetch("vol", "k", || async { Ok(7u32) })
            .await
            .unwrap();
        assert_eq!(v, 7);
        assert!(!hit);
    }

    #[test]
    fn test_key_is_namespaced() {
        assert_ne!(key("serp", b"x"), key("volume", b"x"));
        assert_eq!(key("serp", b"x"), key("serp", b"x"));
    }
}
