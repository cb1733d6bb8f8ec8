//! Version picker (spec §4.7): turns a `PackageMeta` + `Specifier` into a
//! concrete `VersionMeta`.

use std::collections::HashMap;
use webpm_error::{Result, WebpmError};
use webpm_registry::{DistInfo, PackageMeta, VersionMeta};
use webpm_semver::Version;
use webpm_specifier::Specifier;

#[derive(Debug, Clone, Default)]
pub struct PickOptions {
    /// ISO-8601 cutoff; versions published after this are dropped.
    pub published_by: Option<String>,
    pub allow_deprecated: bool,
    pub preferred_version_selectors: HashMap<String, String>,
    pub pick_lowest_version: bool,
}

pub fn pick_version(
    meta: &PackageMeta,
    specifier: &Specifier,
    options: &PickOptions,
) -> Result<(String, VersionMeta)> {
    let name = specifier.name();
    if meta.is_unpublished() {
        return Err(WebpmError::Unpublished(name.to_string()));
    }

    match specifier {
        Specifier::Tag { name, tag } => pick_tag(meta, name, tag, options),
        Specifier::ExactVersion { name, version } => pick_exact(meta, name, &version.to_string()),
        Specifier::Range { name, range } => pick_range(meta, name, range, options),
        Specifier::RegistryTarball { name, version, url } => pick_registry_tarball(meta, name, version, url),
    }
}

/// A dist-tag is only a pointer into `versions`; if the registry served a
/// tag whose target was since unpublished (violating "every dist-tag value
/// is a key in `versions`"), fall through to ranged resolution instead of
/// erroring, treating the dangling tag as if it had resolved to `*`.
fn pick_tag(meta: &PackageMeta, name: &str, tag: &str, options: &PickOptions) -> Result<(String, VersionMeta)> {
    let version = meta
        .dist_tags
        .get(tag)
        .ok_or_else(|| WebpmError::NoMatchingVersion(name.to_string(), tag.to_string()))?;
    if let Some(version_meta) = meta.versions.get(version) {
        return Ok((version.clone(), version_meta.clone()));
    }
    pick_range(meta, name, "*", options)
}

fn pick_exact(meta: &PackageMeta, name: &str, version: &str) -> Result<(String, VersionMeta)> {
    let version_meta = meta
        .versions
        .get(version)
        .ok_or_else(|| WebpmError::VersionNotFound(name.to_string(), version.to_string()))?;
    Ok((version.to_string(), version_meta.clone()))
}

fn pick_registry_tarball(
    meta: &PackageMeta,
    name: &str,
    version: &str,
    url: &str,
) -> Result<(String, VersionMeta)> {
    if let Some(version_meta) = meta.versions.get(version) {
        return Ok((version.to_string(), version_meta.clone()));
    }

    let synthesized = VersionMeta {
        name: name.to_string(),
        version: version.to_string(),
        dist: DistInfo { tarball: url.to_string(), integrity: None, shasum: None },
        ..VersionMeta::default()
    };
    Ok((version.to_string(), synthesized))
}

fn pick_range(
    meta: &PackageMeta,
    name: &str,
    range_str: &str,
    options: &PickOptions,
) -> Result<(String, VersionMeta)> {
    if meta.versions.is_empty() {
        return Err(WebpmError::NoVersions(name.to_string()));
    }

    let range = webpm_semver::parse_range(range_str)?;

    let mut candidates: Vec<Version> = meta
        .versions
        .keys()
        .filter_map(|key| webpm_semver::parse_version(key).ok())
        .filter(|v| range.satisfies(v))
        .collect();

    if let Some(cutoff) = &options.published_by {
        candidates.retain(|v| {
            meta.published_at(&v.to_string())
                .is_none_or(|published_at| published_at <= cutoff.as_str())
        });
    }

    if !options.allow_deprecated {
        candidates.retain(|v| {
            meta.versions
                .get(&v.to_string())
                .and_then(|vm| vm.deprecated.as_ref())
                .is_none()
        });
    }

    if candidates.is_empty() {
        return Err(WebpmError::NoMatchingVersion(name.to_string(), range_str.to_string()));
    }

    if let Some(preferred) = options.preferred_version_selectors.get(name) {
        if let Some(chosen) = candidates.iter().find(|v| v.to_string() == *preferred) {
            let version_string = chosen.to_string();
            if let Some(version_meta) = meta.versions.get(&version_string) {
                return Ok((version_string, version_meta.clone()));
            }
        }
    }

    let chosen = if options.pick_lowest_version {
        candidates.iter().min()
    } else {
        candidates.iter().max()
    }
    .ok_or_else(|| WebpmError::NoMatchingVersion(name.to_string(), range_str.to_string()))?;

    let version_string = chosen.to_string();
    let version_meta = meta
        .versions
        .get(&version_string)
        .ok_or_else(|| WebpmError::VersionNotFound(name.to_string(), version_string.clone()))?;
    Ok((version_string, version_meta.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn meta_with(versions: &[(&str, Option<&str>)]) -> PackageMeta {
        let mut m = PackageMeta { name: "pkg".to_string(), ..PackageMeta::default() };
        for (v, deprecated) in versions {
            m.versions.insert(
                (*v).to_string(),
                VersionMeta {
                    name: "pkg".to_string(),
                    version: (*v).to_string(),
                    deprecated: deprecated.map(ToString::to_string),
                    dist: DistInfo { tarball: format!("https://registry/pkg-{v}.tgz"), ..Default::default() },
                    ..Default::default()
                },
            );
        }
        m.dist_tags.insert("latest".to_string(), versions.last().map_or_else(String::new, |(v, _)| (*v).to_string()));
        m
    }

    #[test]
    fn tag_lookup_resolves_dist_tag() {
        let meta = meta_with(&[("1.0.0", None), ("2.0.0", None)]);
        let spec = Specifier::Tag { name: "pkg".into(), tag: "latest".into() };
        let (version, _) = pick_version(&meta, &spec, &PickOptions::default()).unwrap();
        assert_eq!(version, "2.0.0");
    }

    #[test]
    fn dangling_tag_falls_back_to_range_matching() {
        let mut meta = meta_with(&[("1.0.0", None), ("2.0.0", None)]);
        meta.dist_tags.insert("latest".to_string(), "3.0.0".to_string());
        let spec = Specifier::Tag { name: "pkg".into(), tag: "latest".into() };
        let (version, _) = pick_version(&meta, &spec, &PickOptions::default()).unwrap();
        assert_eq!(version, "2.0.0");
    }

    #[test]
    fn missing_tag_is_no_matching_version() {
        let meta = meta_with(&[("1.0.0", None)]);
        let spec = Specifier::Tag { name: "pkg".into(), tag: "beta".into() };
        assert!(matches!(
            pick_version(&meta, &spec, &PickOptions::default()),
            Err(WebpmError::NoMatchingVersion(_, _))
        ));
    }

    #[test]
    fn range_picks_highest_by_default() {
        let meta = meta_with(&[("1.0.0", None), ("1.2.0", None), ("1.5.0", None), ("2.0.0", None)]);
        let spec = Specifier::Range { name: "pkg".into(), range: "^1.0.0".into() };
        let (version, _) = pick_version(&meta, &spec, &PickOptions::default()).unwrap();
        assert_eq!(version, "1.5.0");
    }

    #[test]
    fn range_picks_lowest_when_requested() {
        let meta = meta_with(&[("1.0.0", None), ("1.2.0", None), ("1.5.0", None)]);
        let spec = Specifier::Range { name: "pkg".into(), range: "^1.0.0".into() };
        let options = PickOptions { pick_lowest_version: true, ..Default::default() };
        let (version, _) = pick_version(&meta, &spec, &options).unwrap();
        assert_eq!(version, "1.0.0");
    }

    #[test]
    fn deprecated_versions_are_dropped_unless_allowed() {
        let meta = meta_with(&[("1.0.0", None), ("1.5.0", Some("use 1.0.0 instead"))]);
        let spec = Specifier::Range { name: "pkg".into(), range: "^1.0.0".into() };
        let (version, _) = pick_version(&meta, &spec, &PickOptions::default()).unwrap();
        assert_eq!(version, "1.0.0");

        let options = PickOptions { allow_deprecated: true, ..Default::default() };
        let (version, _) = pick_version(&meta, &spec, &options).unwrap();
        assert_eq!(version, "1.5.0");
    }

    #[test]
    fn preferred_version_selector_wins_over_highest() {
        let meta = meta_with(&[("1.0.0", None), ("1.5.0", None)]);
        let spec = Specifier::Range { name: "pkg".into(), range: "^1.0.0".into() };
        let mut preferred = HashMap::new();
        preferred.insert("pkg".to_string(), "1.0.0".to_string());
        let options = PickOptions { preferred_version_selectors: preferred, ..Default::default() };
        let (version, _) = pick_version(&meta, &spec, &options).unwrap();
        assert_eq!(version, "1.0.0");
    }

    #[test]
    fn no_matching_version_when_range_matches_nothing() {
        let meta = meta_with(&[("1.0.0", None)]);
        let spec = Specifier::Range { name: "pkg".into(), range: "^3.0.0".into() };
        assert!(matches!(
            pick_version(&meta, &spec, &PickOptions::default()),
            Err(WebpmError::NoMatchingVersion(_, _))
        ));
    }

    #[test]
    fn empty_versions_is_no_versions() {
        let meta = PackageMeta { name: "pkg".to_string(), ..PackageMeta::default() };
        let spec = Specifier::Range { name: "pkg".into(), range: "*".into() };
        assert!(matches!(
            pick_version(&meta, &spec, &PickOptions::default()),
            Err(WebpmError::NoVersions(_))
        ));
    }

    #[test]
    fn unpublished_package_is_rejected() {
        let mut meta = meta_with(&[("1.0.0", None)]);
        meta.time.insert("unpublished".to_string(), "2024-01-01T00:00:00.000Z".to_string());
        let spec = Specifier::Tag { name: "pkg".into(), tag: "latest".into() };
        assert!(matches!(
            pick_version(&meta, &spec, &PickOptions::default()),
            Err(WebpmError::Unpublished(_))
        ));
    }
}
