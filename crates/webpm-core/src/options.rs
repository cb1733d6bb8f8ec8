//! `InstallOptions` (spec §6 "Configuration options"): a plain struct
//! enumerating every effectful flag, not a dynamically-typed bag.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use webpm_constants::{
    DEFAULT_BURST_LIMIT, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_DEPTH, DEFAULT_REGISTRY,
    DEFAULT_REQUESTS_PER_MINUTE, DEFAULT_RETRIES, DEFAULT_TAG, DEFAULT_TIMEOUT_MS,
};
use webpm_registry::PersistentCache;

use crate::cancellation::CancellationToken;
use crate::types::Event;

#[derive(Clone)]
pub struct InstallOptions {
    /// Overrides the selector when the caller passes a bare package name to
    /// `install`/`resolve_tree` (spec §8 scenario A: `{version: "1.0.0"}`).
    pub version: Option<String>,
    pub registry: String,
    pub token: Option<String>,
    pub max_concurrent: usize,
    pub max_depth: u16,
    pub include_optional: bool,
    pub include_peer: bool,
    pub include_dev: bool,
    pub auto_install_peers: bool,
    /// Keep versions the registry marked `deprecated` in range matching
    /// (spec §4.7 step 2 default: drop them unless the caller opts in).
    pub allow_deprecated: bool,
    pub published_by: Option<String>,
    pub preferred_versions: HashMap<String, String>,
    pub prefer_offline: bool,
    pub cache: bool,
    pub retries: u8,
    pub timeout_ms: u64,
    pub requests_per_minute: u32,
    pub burst_limit: u32,
    pub persistent_cache: Option<Arc<dyn PersistentCache>>,
    pub events: Option<UnboundedSender<Event>>,
    pub cancellation: Option<CancellationToken>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            version: None,
            registry: DEFAULT_REGISTRY.to_string(),
            token: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT as usize,
            max_depth: DEFAULT_MAX_DEPTH,
            include_optional: true,
            include_peer: true,
            include_dev: false,
            auto_install_peers: false,
            allow_deprecated: false,
            published_by: None,
            preferred_versions: HashMap::new(),
            prefer_offline: false,
            cache: true,
            retries: DEFAULT_RETRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            burst_limit: DEFAULT_BURST_LIMIT,
            persistent_cache: None,
            events: None,
            cancellation: None,
        }
    }
}

impl InstallOptions {
    #[must_use]
    pub fn default_tag(&self) -> &str {
        DEFAULT_TAG
    }

    /// `cache` (spec §6) toggles the persistent tier only; the bounded
    /// in-memory LRU always backs single-flight metadata fetches.
    #[must_use]
    pub fn effective_persistent_cache(&self) -> Option<Arc<dyn PersistentCache>> {
        if self.cache { self.persistent_cache.clone() } else { None }
    }
}
