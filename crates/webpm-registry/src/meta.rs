//! The subset of an npm registry package-metadata document we consume
//! (spec §4.3/§4.4/§4.7).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PackageMeta {
    pub name: String,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: IndexMap<String, String>,
    #[serde(default)]
    pub versions: IndexMap<String, VersionMeta>,
    #[serde(default)]
    pub time: IndexMap<String, String>,
    #[serde(flatten)]
    pub other: IndexMap<String, serde_json::Value>,
}

impl PackageMeta {
    /// `time.unpublished` marks the whole package as unpublished (spec §4.7).
    #[must_use]
    pub fn is_unpublished(&self) -> bool {
        self.time.contains_key("unpublished")
    }

    #[must_use]
    pub fn published_at(&self, version: &str) -> Option<&str> {
        self.time.get(version).map(String::as_str)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct VersionMeta {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
    #[serde(rename = "devDependencies", default)]
    pub dev_dependencies: IndexMap<String, String>,
    #[serde(rename = "peerDependencies", default)]
    pub peer_dependencies: IndexMap<String, String>,
    #[serde(rename = "optionalDependencies", default)]
    pub optional_dependencies: IndexMap<String, String>,
    #[serde(rename = "peerDependenciesMeta", default)]
    pub peer_dependencies_meta: IndexMap<String, PeerDependencyMeta>,
    #[serde(default)]
    pub dist: DistInfo,
    #[serde(default)]
    pub deprecated: Option<String>,
    #[serde(flatten)]
    pub other: IndexMap<String, serde_json::Value>,
}

impl VersionMeta {
    /// Whether this version's own `peerDependenciesMeta.<name>.optional` is
    /// set, i.e. whether an unmet peer `name` should be a warning rather
    /// than a hard failure if `autoInstallPeers` is ever turned on.
    #[must_use]
    pub fn is_peer_optional(&self, name: &str) -> bool {
        self.peer_dependencies_meta.get(name).is_some_and(|meta| meta.optional)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PeerDependencyMeta {
    #[serde(default)]
    pub optional: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct DistInfo {
    pub tarball: String,
    #[serde(default)]
    pub integrity: Option<String>,
    #[serde(default)]
    pub shasum: Option<String>,
}
