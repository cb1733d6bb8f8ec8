//! The consumed subset of `package.json` (spec §6 "package.json manifest").

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PackageJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<IndexMap<String, String>>,
    #[serde(rename = "devDependencies", skip_serializing_if = "Option::is_none")]
    pub dev_dependencies: Option<IndexMap<String, String>>,
    #[serde(rename = "peerDependencies", skip_serializing_if = "Option::is_none")]
    pub peer_dependencies: Option<IndexMap<String, String>>,
    #[serde(
        rename = "optionalDependencies",
        skip_serializing_if = "Option::is_none"
    )]
    pub optional_dependencies: Option<IndexMap<String, String>>,
    #[serde(rename = "peerDependenciesMeta", skip_serializing_if = "Option::is_none")]
    pub peer_dependencies_meta: Option<IndexMap<String, PeerDependencyMeta>>,
    // Unknown fields are ignored per spec §6, but preserved for round-tripping.
    #[serde(flatten)]
    pub other: IndexMap<String, serde_json::Value>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PeerDependencyMeta {
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyCategory {
    Dependencies,
    DevDependencies,
    PeerDependencies,
    OptionalDependencies,
}

impl PackageJson {
    #[must_use]
    pub fn parse(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// The alias→bareSpecifier entries for one dependency category, per
    /// spec §4.8 step 3 (which categories are installed is decided by the
    /// resolver based on `InstallOptions`, not by this accessor).
    #[must_use]
    pub fn dependencies_in(&self, category: DependencyCategory) -> &IndexMap<String, String> {
        static EMPTY: std::sync::OnceLock<IndexMap<String, String>> = std::sync::OnceLock::new();
        let empty = || EMPTY.get_or_init(IndexMap::new);
        match category {
            DependencyCategory::Dependencies => self.dependencies.as_ref().unwrap_or_else(empty),
            DependencyCategory::DevDependencies => {
                self.dev_dependencies.as_ref().unwrap_or_else(empty)
            }
            DependencyCategory::PeerDependencies => {
                self.peer_dependencies.as_ref().unwrap_or_else(empty)
            }
            DependencyCategory::OptionalDependencies => {
                self.optional_dependencies.as_ref().unwrap_or_else(empty)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognized_fields_and_ignores_unknown() {
        let json = r#"{
            "name": "app",
            "version": "1.0.0",
            "dependencies": { "react": "^18.2.0" },
            "devDependencies": { "typescript": "^5.0.0" },
            "peerDependencies": { "react-dom": "^18.0.0" },
            "peerDependenciesMeta": { "react-dom": { "optional": true } },
            "scripts": { "build": "tsc" },
            "somethingUnknown": 42
        }"#;
        let pkg = PackageJson::parse(json).unwrap();
        assert_eq!(pkg.name.as_deref(), Some("app"));
        assert_eq!(
            pkg.dependencies_in(DependencyCategory::Dependencies).get("react"),
            Some(&"^18.2.0".to_string())
        );
        assert!(
            pkg.peer_dependencies_meta
                .as_ref()
                .and_then(|m| m.get("react-dom"))
                .is_some_and(|meta| meta.optional)
        );
        assert!(pkg.other.contains_key("scripts"));
        assert!(pkg.other.contains_key("somethingUnknown"));
    }
}
