//! Registry metadata/tarball client and its caching and rate-limiting
//! machinery (spec §4.3/§4.4).

pub mod cache;
pub mod client;
pub mod meta;
pub mod rate_limit;

pub use cache::{meta_key, search_key, versions_key, MetadataCache, PersistentCache};
pub use client::{encode_package_segment, RegistryClient, RegistryClientOptions};
pub use meta::{DistInfo, PackageMeta, VersionMeta};
pub use rate_limit::RateLimiter;
