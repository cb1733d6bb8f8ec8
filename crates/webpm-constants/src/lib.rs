pub const USER_AGENT: &str = concat!("webpm/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

pub const DEFAULT_TAG: &str = "latest";

/// Per-request attempt budget (spec §4.3 retry policy, default `N`).
pub const DEFAULT_RETRIES: u8 = 3;

/// Base delay for exponential backoff with full jitter, in milliseconds.
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;

pub const RETRY_MULTIPLIER: f64 = 2.0;

pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Per-request deadline, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_MAX_CONCURRENT: u16 = 5;

pub const DEFAULT_MAX_DEPTH: u16 = 10;

/// In-memory metadata LRU capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// In-memory metadata TTL, in milliseconds.
pub const DEFAULT_CACHE_TTL_MS: u64 = 2 * 60 * 1_000;

pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 600;

pub const DEFAULT_BURST_LIMIT: u32 = 40;

/// Soft cap on a single stored file, in bytes (spec §4.9 default 1 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;

/// npm package name validation, per spec §6.
pub const PACKAGE_NAME_PATTERN: &str =
    r"^(@[a-z0-9-~][a-z0-9-._~]*/)?[a-z0-9-~][a-z0-9-._~]*$";
