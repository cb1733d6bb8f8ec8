//! Specifier parsing and classification (spec §4.1): turns an
//! `alias`/`bareSpecifier` pair from a manifest, or a single `name@selector`
//! string, into a structured [`Specifier`].

use regex::Regex;
use semver::Version;
use std::sync::OnceLock;
use webpm_constants::PACKAGE_NAME_PATTERN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Specifier {
    Tag { name: String, tag: String },
    ExactVersion { name: String, version: Version },
    Range { name: String, range: String },
    RegistryTarball { name: String, version: String, url: String },
}

impl Specifier {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Tag { name, .. }
            | Self::ExactVersion { name, .. }
            | Self::Range { name, .. }
            | Self::RegistryTarball { name, .. } => name,
        }
    }
}

/// Rule 1/2/3 of spec §4.1. `alias` is ignored once an `npm:` prefix is
/// present, since the prefix carries its own name.
#[must_use]
pub fn parse(
    bare_specifier: &str,
    alias: Option<&str>,
    default_tag: &str,
    registry_base: &str,
) -> Option<Specifier> {
    if let Some(stripped) = bare_specifier.strip_prefix("npm:") {
        return Some(parse_npm_prefixed(stripped, default_tag));
    }

    if let Some(name) = alias.filter(|n| !n.is_empty()) {
        return Some(classify(name, bare_specifier, default_tag));
    }

    parse_registry_tarball(bare_specifier, registry_base)
}

/// `normalize` always has an `alias` in hand (a manifest dependency key), so
/// it never falls through to rule 4/5.
#[must_use]
pub fn normalize(
    alias: &str,
    bare_specifier: &str,
    default_tag: &str,
    registry_base: &str,
) -> Specifier {
    if bare_specifier.is_empty() {
        return Specifier::Tag {
            name: alias.to_string(),
            tag: default_tag.to_string(),
        };
    }

    parse(bare_specifier, Some(alias), default_tag, registry_base).unwrap_or(Specifier::Tag {
        name: alias.to_string(),
        tag: bare_specifier.to_string(),
    })
}

fn parse_npm_prefixed(stripped: &str, default_tag: &str) -> Specifier {
    match stripped.rfind('@') {
        Some(i) if i >= 1 => {
            let name = &stripped[..i];
            let rest = &stripped[i + 1..];
            classify(name, rest, default_tag)
        }
        _ => Specifier::Tag {
            name: stripped.to_string(),
            tag: default_tag.to_string(),
        },
    }
}

fn classify(name: &str, rest: &str, default_tag: &str) -> Specifier {
    let _ = default_tag; // rest already resolved to a concrete selector here
    if rest.is_empty() {
        return Specifier::Range {
            name: name.to_string(),
            range: "*".to_string(),
        };
    }

    if let Ok(version) = webpm_semver::parse_version(rest) {
        return Specifier::ExactVersion {
            name: name.to_string(),
            version,
        };
    }

    if webpm_semver::parse_range(rest).is_ok() {
        return Specifier::Range {
            name: name.to_string(),
            range: rest.to_string(),
        };
    }

    Specifier::Tag {
        name: name.to_string(),
        tag: rest.to_string(),
    }
}

fn tarball_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<name>(?:@[^/]+/)?[^/]+)/-/(?P<pkg>[^/]+)-(?P<version>[0-9][^/]*)\.tgz$")
            .expect("static tarball pattern is valid")
    })
}

fn parse_registry_tarball(bare_specifier: &str, registry_base: &str) -> Option<Specifier> {
    let base = registry_base.trim_end_matches('/');
    let path = bare_specifier.strip_prefix(base)?.trim_start_matches('/');
    let captures = tarball_pattern().captures(path)?;
    let name = captures.name("name")?.as_str().to_string();
    let version = captures.name("version")?.as_str().to_string();
    Some(Specifier::RegistryTarball {
        name,
        version,
        url: bare_specifier.to_string(),
    })
}

/// Re-serialize a [`Specifier`] as an `npm:`-prefixed specifier string (or
/// the tarball URL verbatim), used by the parser-idempotence property test.
#[must_use]
pub fn render_canonical(spec: &Specifier) -> String {
    match spec {
        Specifier::Tag { name, tag } => format!("npm:{name}@{tag}"),
        Specifier::ExactVersion { name, version } => format!("npm:{name}@{version}"),
        Specifier::Range { name, range } => format!("npm:{name}@{range}"),
        Specifier::RegistryTarball { url, .. } => url.clone(),
    }
}

fn package_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(PACKAGE_NAME_PATTERN).expect("static package name pattern is valid"))
}

#[must_use]
pub fn validate_package_name(name: &str) -> bool {
    package_name_pattern().is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_TAG: &str = "latest";
    const REGISTRY: &str = "https://registry.npmjs.org";

    #[test]
    fn npm_prefixed_scoped_name() {
        let spec = parse("npm:@types/node@18.0.0", None, DEFAULT_TAG, REGISTRY).unwrap();
        assert_eq!(
            spec,
            Specifier::ExactVersion {
                name: "@types/node".into(),
                version: Version::parse("18.0.0").unwrap()
            }
        );
    }

    #[test]
    fn npm_at_only_boundary_case() {
        let spec = parse("npm:@", None, DEFAULT_TAG, REGISTRY).unwrap();
        assert_eq!(
            spec,
            Specifier::Tag {
                name: "@".into(),
                tag: DEFAULT_TAG.into()
            }
        );
    }

    #[test]
    fn npm_trailing_at_boundary_case() {
        let spec = parse("npm:react@", None, DEFAULT_TAG, REGISTRY).unwrap();
        assert_eq!(
            spec,
            Specifier::Range {
                name: "react".into(),
                range: "*".into()
            }
        );
    }

    #[test]
    fn alias_with_range() {
        let spec = parse("^18.2.0", Some("react"), DEFAULT_TAG, REGISTRY).unwrap();
        assert_eq!(
            spec,
            Specifier::Range {
                name: "react".into(),
                range: "^18.2.0".into()
            }
        );
    }

    #[test]
    fn alias_with_tag() {
        let spec = parse("beta", Some("react"), DEFAULT_TAG, REGISTRY).unwrap();
        assert_eq!(
            spec,
            Specifier::Tag {
                name: "react".into(),
                tag: "beta".into()
            }
        );
    }

    #[test]
    fn build_metadata_stripped_from_exact_version() {
        let spec = parse("1.2.3+build.9", Some("x"), DEFAULT_TAG, REGISTRY).unwrap();
        assert_eq!(
            spec,
            Specifier::ExactVersion {
                name: "x".into(),
                version: Version::parse("1.2.3").unwrap()
            }
        );
    }

    #[test]
    fn registry_tarball_url_scoped() {
        let url = format!("{REGISTRY}/@types/node/-/node-18.0.0.tgz");
        let spec = parse(&url, None, DEFAULT_TAG, REGISTRY).unwrap();
        assert_eq!(
            spec,
            Specifier::RegistryTarball {
                name: "@types/node".into(),
                version: "18.0.0".into(),
                url: url.clone(),
            }
        );
    }

    #[test]
    fn unrecognizable_specifier_is_none() {
        assert_eq!(parse("not a url and no alias", None, DEFAULT_TAG, REGISTRY), None);
    }

    #[test]
    fn normalize_empty_bare_specifier() {
        let spec = normalize("lodash", "", DEFAULT_TAG, REGISTRY);
        assert_eq!(
            spec,
            Specifier::Tag {
                name: "lodash".into(),
                tag: DEFAULT_TAG.into()
            }
        );
    }

    #[test]
    fn parser_idempotence() {
        let cases = [
            ("^18.2.0", Some("react")),
            ("beta", Some("react")),
            ("1.2.3", Some("x")),
            ("", Some("lodash")),
        ];
        for (bare, alias) in cases {
            let first = parse(bare, alias, DEFAULT_TAG, REGISTRY)
                .unwrap_or_else(|| normalize(alias.unwrap_or_default(), bare, DEFAULT_TAG, REGISTRY));
            let rendered = render_canonical(&first);
            let second = parse(&rendered, None, DEFAULT_TAG, REGISTRY).unwrap();
            assert_eq!(first, second, "idempotence failed for {bare:?}/{alias:?}");
        }
    }

    #[test]
    fn package_name_validation() {
        assert!(validate_package_name("lodash"));
        assert!(validate_package_name("@types/node"));
        assert!(!validate_package_name("Invalid-Upper"));
        assert!(!validate_package_name(""));
    }
}
