use semver::Version;
use webpm_error::{Result, WebpmError};

/// Parse a version string, handling partial versions (`"1"`, `"1.2"`) the
/// way npm ranges allow them, and stripping build metadata (`+...`) per
/// spec §4.1's "build metadata is stripped from exact versions" rule.
pub fn parse_partial_version(version_str: &str) -> Result<Version> {
    let cleaned = version_str.trim();

    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("x") || cleaned == "*" {
        return Ok(Version::new(0, 0, 0));
    }

    let without_build = cleaned.split('+').next().unwrap_or(cleaned);

    if let Ok(version) = Version::parse(without_build) {
        return Ok(version);
    }

    let (core, pre) = match without_build.split_once('-') {
        Some((c, p)) => (c, Some(p)),
        None => (without_build, None),
    };

    let parts: Vec<&str> = core.split('.').collect();
    let major = parse_component(parts.first().copied().unwrap_or("0"))?;
    let minor = parse_component(parts.get(1).copied().unwrap_or("0"))?;
    let patch = parse_component(parts.get(2).copied().unwrap_or("0"))?;

    let mut version = Version::new(major, minor, patch);
    if let Some(pre) = pre {
        version.pre = semver::Prerelease::new(pre)
            .map_err(|e| WebpmError::InvalidSpecifier(format!("invalid pre-release '{pre}': {e}")))?;
    }
    Ok(version)
}

fn parse_component(s: &str) -> Result<u64> {
    if s.is_empty() || s == "x" || s == "X" || s == "*" {
        return Ok(0);
    }
    s.parse::<u64>()
        .map_err(|_| WebpmError::InvalidSpecifier(format!("invalid version component '{s}'")))
}

/// A full [`Version::parse`] that additionally strips build metadata, for
/// exact-version specifiers (spec §4.1 boundary case).
pub fn parse_exact_version(version_str: &str) -> Result<Version> {
    let without_build = version_str.trim().split('+').next().unwrap_or(version_str);
    Version::parse(without_build)
        .map_err(|e| WebpmError::InvalidSpecifier(format!("invalid version '{version_str}': {e}")))
}
