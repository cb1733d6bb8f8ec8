use std::fmt;

/// The specifier an operation was acting on when it failed, carried on every
/// error so callers can render "failed to resolve react@^18" style messages
/// without re-threading the original input back through the call stack.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    pub specifier: Option<String>,
    pub hint: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(specifier: impl Into<String>) -> Self {
        Self {
            specifier: Some(specifier.into()),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum WebpmError {
    // Validation
    InvalidPackageName(String),
    InvalidSpecifier(String),
    InvalidIntegrity(String),

    // Resolution
    PackageNotFound(String),
    VersionNotFound(String, String),
    NoMatchingVersion(String, String),
    NoVersions(String),
    Unpublished(String),
    MaxDepthExceeded(String, u16),
    CyclicOptional(String),

    // Registry / transport
    Network(String),
    Timeout(String),
    RateLimited { retry_after_secs: u64 },
    RegistryResponse { status: u16, url: String },
    BrokenMetadataJson(String),

    // Artifact
    TarballIntegrity { expected: String, got: String, url: String },
    BadTarball { expected_size: u64, received_size: u64 },
    MalformedArchive(String),

    // Storage
    CacheFailure(String),
    ContentStoreConflict(String),

    Cancelled,
}

impl WebpmError {
    #[must_use]
    pub fn context(&self) -> ErrorContext {
        match self {
            Self::InvalidPackageName(n) | Self::PackageNotFound(n) | Self::NoVersions(n)
            | Self::Unpublished(n) | Self::CyclicOptional(n) => ErrorContext::new(n.clone()),
            Self::InvalidSpecifier(s) => {
                ErrorContext::new(s.clone()).with_hint("expected a bare npm specifier")
            }
            Self::InvalidIntegrity(s) => {
                ErrorContext::new(s.clone()).with_hint("expected `<algo>-<base64>`")
            }
            Self::VersionNotFound(n, v) | Self::NoMatchingVersion(n, v) => {
                ErrorContext::new(format!("{n}@{v}"))
            }
            Self::MaxDepthExceeded(n, depth) => {
                ErrorContext::new(n.clone()).with_hint(format!("exceeded max depth {depth}"))
            }
            Self::RegistryResponse { url, .. } | Self::BrokenMetadataJson(url) => {
                ErrorContext::new(url.clone())
            }
            Self::TarballIntegrity { url, .. } => ErrorContext::new(url.clone()),
            Self::MalformedArchive(path) => ErrorContext::new(path.clone()),
            _ => ErrorContext::default(),
        }
    }
}

impl fmt::Display for WebpmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPackageName(name) => write!(f, "invalid package name '{name}'"),
            Self::InvalidSpecifier(spec) => write!(f, "invalid specifier '{spec}'"),
            Self::InvalidIntegrity(s) => write!(f, "invalid integrity string '{s}'"),
            Self::PackageNotFound(name) => write!(f, "package '{name}' not found"),
            Self::VersionNotFound(name, version) => {
                write!(f, "version '{version}' not found for '{name}'")
            }
            Self::NoMatchingVersion(name, range) => {
                write!(f, "no version of '{name}' satisfies '{range}'")
            }
            Self::NoVersions(name) => write!(f, "package '{name}' has no published versions"),
            Self::Unpublished(name) => write!(f, "package '{name}' has been unpublished"),
            Self::MaxDepthExceeded(name, depth) => {
                write!(f, "max resolution depth {depth} exceeded at '{name}'")
            }
            Self::CyclicOptional(name) => write!(f, "cyclic optional dependency at '{name}'"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Timeout(msg) => write!(f, "request timed out: {msg}"),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "rate limited, retry after {retry_after_secs}s")
            }
            Self::RegistryResponse { status, url } => {
                write!(f, "registry returned HTTP {status} for {url}")
            }
            Self::BrokenMetadataJson(url) => write!(f, "malformed metadata JSON from {url}"),
            Self::TarballIntegrity { expected, got, url } => write!(
                f,
                "integrity mismatch for {url}: expected {expected}, got {got}"
            ),
            Self::BadTarball { expected_size, received_size } => write!(
                f,
                "tarball size mismatch: expected {expected_size} bytes, received {received_size}"
            ),
            Self::MalformedArchive(reason) => write!(f, "malformed archive: {reason}"),
            Self::CacheFailure(msg) => write!(f, "cache failure: {msg}"),
            Self::ContentStoreConflict(key) => {
                write!(f, "content store conflict for key '{key}'")
            }
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for WebpmError {}

impl From<anyhow::Error> for WebpmError {
    fn from(err: anyhow::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Whether an error, if raised by the registry client, should be retried by
/// the caller's backoff loop rather than surfaced immediately.
#[must_use]
pub fn is_retryable(err: &WebpmError) -> bool {
    matches!(
        err,
        WebpmError::Network(_) | WebpmError::Timeout(_) | WebpmError::RateLimited { .. }
    ) || matches!(err, WebpmError::RegistryResponse { status, .. } if *status >= 500)
}

pub type Result<T> = std::result::Result<T, WebpmError>;
