use crate::cache::ResponseCache;
use crate::config::ServerConfig;
use crate::error::ApiError;
use anyhow::Context;
use geo_audit_core::providers::dataforseo::DataForSeoClient;
use geo_audit_core::providers::google::GoogleClient;
use geo_audit_core::providers::memory::MemoryStore;
use geo_audit_core::providers::supabase::SupabaseClient;
use geo_audit_core::providers::{BusinessProfile, DataStore, SearchConsole, SerpProvider};
use geo_audit_core::segments::SegmentClassifier;
use std::sync::Arc;

/// Everything a handler needs. Providers are optional; a handler asking for
/// a missing one answers `E_NOT_CONFIGURED`.
pub struct AppContext {
    pub cfg: ServerConfig,
    pub serp: Option<Arc<dyn SerpProvider>>,
    pub search_console: Option<Arc<dyn SearchConsole>>,
    pub business_profile: Option<Arc<dyn BusinessProfile>>,
    pub store: Arc<dyn DataStore>,
    pub classifier: Arc<SegmentClassifier>,
    pub cache: ResponseCache,
}

impl AppContext {
    pub fn new(cfg: ServerConfig, store: Arc<dyn DataStore>) -> Self {
        let cache = ResponseCache::new(cfg.cache_entries, cfg.cache_ttl_secs);
        Self {
            cfg,
            serp: None,
            search_console: None,
            business_profile: None,
            store,
            classifier: Arc::new(SegmentClassifier::default()),
            cache,
        }
    }

    pub fn with_serp(mut self, provider: Arc<dyn SerpProvider>) -> Self {
        self.serp = Some(provider);
        self
    }

    pub fn with_search_console(mut self, provider: Arc<dyn SearchConsole>) -> Self {
        self.search_console = Some(provider);
        self
    }

    pub fn with_business_profile(mut self, provider: Arc<dyn BusinessProfile>) -> Self {
        self.business_profile = Some(provider);
        self
    }

    pub fn with_classifier(mut self, classifier: SegmentClassifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Builds real provider clients from configured credentials.
    pub fn from_config(cfg: ServerConfig) -> anyhow::Result<Self> {
        let upstream_ms = cfg.upstream_timeout_ms;

        let store: Arc<dyn DataStore> = match &cfg.supabase {
            Some(c) => Arc::new(SupabaseClient::new(
                c.url.clone(),
                c.service_key.clone(),
                upstream_ms,
            )?),
            None => {
                tracing::warn!(
                    event = "store_fallback",
                    store = "memory",
                    "Supabase is not configured; rows are kept in memory only"
                );
                Arc::new(MemoryStore::new())
            }
        };

        let classifier = match &cfg.segment_rules {
            Some(path) => SegmentClassifier::load(path)
                .with_context(|| format!("loading segment rules from {}", path.display()))?,
            None => SegmentClassifier::default(),
        };

        let serp = cfg
            .dataforseo
            .as_ref()
            .map(|c| DataForSeoClient::new(c.login.clone(), c.password.clone(), upstream_ms))
            .transpose()?;

        let google = cfg
            .google
            .as_ref()
            .map(|c| {
                GoogleClient::new(
                    c.client_id.clone(),
                    c.client_secret.clone(),
                    c.refresh_token.clone(),
                    upstream_ms,
                )
            })
            .transpose()?
            .map(Arc::new);

        let mut ctx = Self::new(cfg, store).with_classifier(classifier);
        if let Some(client) = serp {
            ctx = ctx.with_serp(Arc::new(client));
        }
        if let Some(g) = google {
            ctx = ctx
                .with_search_console(g.clone())
                .with_business_profile(g);
        }
        Ok(ctx)
    }

    pub fn serp(&self) -> Result<&dyn SerpProvider, ApiError> {
        self.serp
            .as_deref()
            .ok_or(ApiError::NotConfigured("dataforseo"))
    }

    pub fn search_console(&self) -> Result<&dyn SearchConsole, ApiError> {
        self.search_console
            .as_deref()
            .ok_or(ApiError::NotConfigured("search console"))
    }

    pub fn business_profile(&self) -> Result<&dyn BusinessProfile, ApiError> {
        self.business_profile
            .as_deref()
            .ok_or(ApiError::NotConfigured("business profile"))
    }

    pub fn store(&self) -> &dyn DataStore {
        self.store.as_ref()
    }
}
