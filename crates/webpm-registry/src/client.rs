//! Registry HTTP client (spec §4.3): retry with full-jitter exponential
//! backoff, a sliding-window rate limiter, and single-flight metadata fetches
//! layered over the two-tier cache in [`crate::cache`].

use rand::Rng;
use reqwest::header::{ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};

use webpm_constants::{
    DEFAULT_BURST_LIMIT, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_MS, DEFAULT_REGISTRY,
    DEFAULT_REQUESTS_PER_MINUTE, DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS, RETRY_BASE_DELAY_MS,
    RETRY_MAX_DELAY_MS, RETRY_MULTIPLIER,
};
use webpm_error::{Result, WebpmError};

use crate::cache::{meta_key, MetadataCache, PersistentCache};
use crate::meta::PackageMeta;
use crate::rate_limit::RateLimiter;

pub struct RegistryClientOptions {
    pub base_url: String,
    pub token: Option<String>,
    pub max_retries: u8,
    pub timeout: Duration,
    pub requests_per_minute: u32,
    pub burst_limit: u32,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub persistent_cache: Option<Arc<dyn PersistentCache>>,
    /// Fall back to a stale cache entry instead of propagating a network
    /// failure (spec §6 `preferOffline`).
    pub prefer_offline: bool,
}

impl Default for RegistryClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REGISTRY.to_string(),
            token: None,
            max_retries: DEFAULT_RETRIES,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            burst_limit: DEFAULT_BURST_LIMIT,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            persistent_cache: None,
            prefer_offline: false,
        }
    }
}

pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    max_retries: u8,
    prefer_offline: bool,
    rate_limiter: RateLimiter,
    cache: MetadataCache,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<Arc<PackageMeta>>>>>,
}

impl RegistryClient {
    #[must_use]
    pub fn new(options: RegistryClientOptions) -> Self {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(webpm_constants::USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            token: options.token,
            max_retries: options.max_retries,
            prefer_offline: options.prefer_offline,
            rate_limiter: RateLimiter::new(options.requests_per_minute, options.burst_limit),
            cache: MetadataCache::new(options.cache_capacity, options.cache_ttl, options.persistent_cache),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Single-flight metadata fetch: concurrent callers for the same key
    /// coalesce onto one in-flight request (spec §5 "Shared resources").
    pub async fn get_package_meta(&self, name: &str) -> Result<Arc<PackageMeta>> {
        let key = meta_key(name, &self.base_url);

        if let Some(meta) = self.cache.get_package_meta(&key).await {
            return Ok(meta);
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_try_init(|| self.fetch_package_meta(name))
            .await
            .cloned();

        self.in_flight.lock().await.remove(&key);

        let meta = match result {
            Ok(meta) => meta,
            Err(err) if self.prefer_offline => {
                if let Some(stale) = self.cache.get_package_meta_stale(&key) {
                    return Ok(stale);
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        self.cache.put_package_meta(key, &meta).await;
        Ok(meta)
    }

    async fn fetch_package_meta(&self, name: &str) -> Result<Arc<PackageMeta>> {
        let url = format!("{}/{}", self.base_url, encode_package_segment(name));
        self.execute_with_retry(|| self.fetch_package_meta_once(name, &url)).await
    }

    async fn fetch_package_meta_once(&self, name: &str, url: &str) -> Result<Arc<PackageMeta>> {
        let mut request = self
            .http
            .get(url)
            .header(
                ACCEPT,
                "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8",
            )
            .header(USER_AGENT, webpm_constants::USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(|e| classify_reqwest_error(&e, url))?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(WebpmError::PackageNotFound(name.to_string()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(WebpmError::RateLimited { retry_after_secs: retry_after_secs(response.headers()) });
        }
        if !status.is_success() {
            return Err(WebpmError::RegistryResponse { status: status.as_u16(), url: url.to_string() });
        }

        let bytes = response.bytes().await.map_err(|e| classify_reqwest_error(&e, url))?;
        let meta: PackageMeta =
            serde_json::from_slice(&bytes).map_err(|_| WebpmError::BrokenMetadataJson(url.to_string()))?;
        Ok(Arc::new(meta))
    }

    pub async fn download_tarball(&self, url: &str) -> Result<Vec<u8>> {
        self.execute_with_retry(|| self.download_tarball_once(url)).await
    }

    async fn download_tarball_once(&self, url: &str) -> Result<Vec<u8>> {
        let mut request = self.http.get(url).header(USER_AGENT, webpm_constants::USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(|e| classify_reqwest_error(&e, url))?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(WebpmError::RateLimited { retry_after_secs: retry_after_secs(response.headers()) });
        }
        if !status.is_success() {
            return Err(WebpmError::RegistryResponse { status: status.as_u16(), url: url.to_string() });
        }

        let bytes = response.bytes().await.map_err(|e| classify_reqwest_error(&e, url))?;
        Ok(bytes.to_vec())
    }

    async fn execute_with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u8 = 0;
        loop {
            if let Err(retry_after_secs) = self.rate_limiter.try_acquire() {
                if attempt + 1 >= self.max_retries {
                    return Err(WebpmError::RateLimited { retry_after_secs });
                }
                tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                attempt += 1;
                continue;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(WebpmError::RateLimited { retry_after_secs }) if attempt + 1 < self.max_retries => {
                    tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                    attempt += 1;
                }
                Err(err) if webpm_error::is_retryable(&err) && attempt + 1 < self.max_retries => {
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn backoff_delay(attempt: u8) -> Duration {
    let base = RETRY_BASE_DELAY_MS as f64 * RETRY_MULTIPLIER.powi(i32::from(attempt));
    let capped = base.min(RETRY_MAX_DELAY_MS as f64);
    let jitter = rand::thread_rng().gen_range(0.5..=1.0_f64);
    Duration::from_millis((capped * jitter) as u64)
}

/// Parse a `Retry-After` header as whole seconds; a missing or unparseable
/// header falls back to the rate limiter's own window length.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(60)
}

fn classify_reqwest_error(err: &reqwest::Error, url: &str) -> WebpmError {
    if err.is_timeout() {
        WebpmError::Timeout(url.to_string())
    } else {
        WebpmError::Network(err.to_string())
    }
}

/// Scoped package names are one logical path segment; the leading `@` is
/// kept bare and only the internal `/` is percent-escaped (spec §4.3
/// `@a/b` → `@a%2Fb`).
#[must_use]
pub fn encode_package_segment(name: &str) -> String {
    match name.split_once('/') {
        Some((scope, rest)) => format!("{scope}%2F{}", urlencoding::encode(rest)),
        None => urlencoding::encode(name).into_owned(),
    }
}
