//! The DAG shape produced by [`crate::resolve::resolve_tree`] (spec §4.8).

use std::sync::Arc;
use webpm_registry::VersionMeta;

pub type ResolutionId = String;

/// `"<registry-host>/<name>/<version>"` (spec §3 "Two packages share an ID
/// iff they are the same artifact") — the scheme and any path are stripped
/// from `registry_base` so `https://registry.npmjs.org/` and
/// `registry.npmjs.org` produce the same host.
#[must_use]
pub fn resolution_id(registry_base: &str, name: &str, version: &str) -> ResolutionId {
    format!("{}/{name}/{version}", registry_host(registry_base))
}

fn registry_host(registry_base: &str) -> &str {
    let trimmed = registry_base.trim_end_matches('/');
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    without_scheme.split('/').next().unwrap_or(without_scheme)
}

/// What a declared dependency edge resolved to.
#[derive(Debug, Clone)]
pub enum ChildNode {
    Resolved(Arc<DependencyNode>),
    /// The child's `ResolutionId` is already an ancestor on this path; link
    /// back rather than recursing again (spec §4.8 step 4).
    CyclicBackref(ResolutionId),
    /// An `optionalDependency` whose resolution failed; recorded, not fatal.
    OptionalSkipped { alias: String, reason: String },
    /// A `peerDependency` recorded per manifest but not installed, because
    /// `autoInstallPeers` was not requested. `optional` mirrors
    /// `peerDependenciesMeta.<alias>.optional`, so a caller can tell an
    /// unmet required peer from one the package itself says is fine to skip.
    PeerRecorded { alias: String, range: String, optional: bool },
}

#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub alias: String,
    pub child: ChildNode,
}

#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub id: ResolutionId,
    pub name: String,
    pub version: String,
    pub tarball_url: String,
    pub integrity: Option<String>,
    pub shasum: Option<String>,
    pub dependencies: Vec<DependencyEdge>,
}

impl DependencyNode {
    #[must_use]
    pub fn from_version_meta(
        registry_base: &str,
        name: String,
        version: String,
        version_meta: &VersionMeta,
    ) -> Self {
        Self {
            id: resolution_id(registry_base, &name, &version),
            name,
            version,
            tarball_url: version_meta.dist.tarball.clone(),
            integrity: version_meta.dist.integrity.clone(),
            shasum: version_meta.dist.shasum.clone(),
            dependencies: Vec::new(),
        }
    }
}
