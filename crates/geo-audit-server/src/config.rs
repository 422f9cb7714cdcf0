use std::env;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, PartialEq, Eq)]
pub struct DataForSeoCredentials {
    pub login: String,
    pub password: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseCredentials {
    pub url: String,
    pub service_key: String,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub timeout_ms: u64,
    pub upstream_timeout_ms: u64,
    pub max_body_bytes: usize,
    pub batch_chunk: usize,
    pub cache_entries: u64,
    pub cache_ttl_secs: u64,
    pub gsc_lag_days: u32,
    pub segment_rules: Option<PathBuf>,
    pub log_level: String,
    pub dataforseo: Option<DataForSeoCredentials>,
    pub google: Option<GoogleCredentials>,
    pub supabase: Option<SupabaseCredentials>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            timeout_ms: 25_000,
            upstream_timeout_ms: 20_000,
            max_body_bytes: 5_000_000,
            batch_chunk: geo_audit_core::batch::DEFAULT_CHUNK_SIZE,
            cache_entries: 256,
            cache_ttl_secs: 900,
            gsc_lag_days: geo_audit_core::window::DEFAULT_LAG_DAYS,
            segment_rules: None,
            log_level: "info".to_string(),
            dataforseo: None,
            google: None,
            supabase: None,
        }
    }
}

// Secrets never reach the logs.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("timeout_ms", &self.timeout_ms)
            .field("upstream_timeout_ms", &self.upstream_timeout_ms)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("batch_chunk", &self.batch_chunk)
            .field("cache_entries", &self.cache_entries)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("gsc_lag_days", &self.gsc_lag_days)
            .field("segment_rules", &self.segment_rules)
            .field("log_level", &self.log_level)
            .field("dataforseo", &self.dataforseo.as_ref().map(|c| c.login.as_str()))
            .field("google", &self.google.as_ref().map(|_| "<redacted>"))
            .field("supabase", &self.supabase.as_ref().map(|c| c.url.as_str()))
            .finish()
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_into<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Some(v) = non_empty(key) {
        if let Ok(n) = v.parse() {
            *slot = n;
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = non_empty("GEO_BIND") {
            cfg.bind = v;
        }
        parse_into("GEO_TIMEOUT_MS", &mut cfg.timeout_ms);
        parse_into("GEO_UPSTREAM_TIMEOUT_MS", &mut cfg.upstream_timeout_ms);
        parse_into("GEO_MAX_BODY_BYTES", &mut cfg.max_body_bytes);
        parse_into("GEO_BATCH_CHUNK", &mut cfg.batch_chunk);
        parse_into("GEO_CACHE_ENTRIES", &mut cfg.cache_entries);
        parse_into("GEO_CACHE_TTL_SECS", &mut cfg.cache_ttl_secs);
        parse_into("GEO_GSC_LAG_DAYS", &mut cfg.gsc_lag_days);
        if let Some(v) = non_empty("GEO_SEGMENT_RULES") {
            cfg.segment_rules = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty("GEO_LOG") {
            cfg.log_level = v;
        }

        if let (Some(login), Some(password)) =
            (non_empty("DATAFORSEO_LOGIN"), non_empty("DATAFORSEO_PASSWORD"))
        {
            cfg.dataforseo = Some(DataForSeoCredentials { login, password });
        }
        if let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
            non_empty("GOOGLE_CLIENT_ID"),
            non_empty("GOOGLE_CLIENT_SECRET"),
            non_empty("GOOGLE_REFRESH_TOKEN"),
        ) {
            cfg.google = Some(GoogleCredentials {
                client_id,
                client_secret,
                refresh_token,
            });
        }
        if let (Some(url), Some(service_key)) =
            (non_empty("SUPABASE_URL"), non_empty("SUPABASE_SERVICE_ROLE_KEY"))
        {
            cfg.supabase = Some(SupabaseCredentials { url, service_key });
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let cfg = ServerConfig {
            dataforseo: Some(DataForSeoCredentials {
                login: "ops@example.com".into(),
                password: "hunter2".into(),
            }),
            google: Some(GoogleCredentials {
                client_id: "cid".into(),
                client_secret: "csecret".into(),
                refresh_token: "rtoken".into(),
            }),
            supabase: Some(SupabaseCredentials {
                url: "https://proj.supabase.co".into(),
                service_key: "service-key".into(),
            }),
            ..Default::default()
        };
        let dbg = format!("{cfg:?}");
        assert!(dbg.contains("ops@example.com"));
        assert!(dbg.contains("proj.supabase.co"));
        for secret in ["hunter2", "csecret", "rtoken", "service-key"] {
            assert!(!dbg.contains(secret), "leaked {secret}");
        }
    }

    #[test]
    fn test_from_env_overrides_and_ignores_garbage() {
        // Single test touching the process env so parallel tests don't race.
        env::set_var("GEO_TIMEOUT_MS", "1234");
        env::set_var("GEO_BATCH_CHUNK", "not-a-number");
        env::set_var("DATAFORSEO_LOGIN", "login");
        env::remove_var("DATAFORSEO_PASSWORD");
        let cfg = ServerConfig::from_env();
        env::remove_var("GEO_TIMEOUT_MS");
        env::remove_var("GEO_BATCH_CHUNK");
        env::remove_var("DATAFORSEO_LOGIN");

        assert_eq!(cfg.timeout_ms, 1234);
        assert_eq!(cfg.batch_chunk, 500);
        assert!(cfg.dataforseo.is_none());
    }
}
