//! Full SemVer 2 engine (spec §4.2), replacing the caret/tilde-only stub
//! flagged by spec §9 Open Question (i). Ranges are parsed into OR-groups of
//! AND-clauses; `^` and `~` are normalized to explicit `>= … < …-0` bounds at
//! parse time, and pre-release versions are excluded from a match unless the
//! range explicitly names a pre-release on the same `[major, minor, patch]`.

pub mod comparators;
pub mod version_utils;

use comparators::{Clause, Comparator};
pub use semver::Version;
use version_utils::{parse_exact_version, parse_partial_version};
use webpm_error::{Result, WebpmError};

#[derive(Debug, Clone)]
pub struct Range {
    clauses: Vec<Clause>,
}

impl Range {
    #[must_use]
    pub fn wildcard() -> Self {
        Self {
            clauses: vec![Clause::new(vec![Comparator::Wildcard])],
        }
    }

    #[must_use]
    pub fn satisfies(&self, version: &Version) -> bool {
        let matches_some_clause = self.clauses.iter().any(|c| c.matches(version));
        if !matches_some_clause {
            return false;
        }
        if version.pre.is_empty() {
            return true;
        }
        self.clauses
            .iter()
            .any(|c| c.explicitly_allows_prerelease_of(version))
    }
}

/// Compare two versions per SemVer 2 ordering (delegates to the `semver`
/// crate, which already implements precedence including pre-release rules).
#[must_use]
pub fn compare(a: &Version, b: &Version) -> std::cmp::Ordering {
    a.cmp(b)
}

pub fn parse_version(version_str: &str) -> Result<Version> {
    parse_exact_version(version_str)
}

pub fn parse_range(range_str: &str) -> Result<Range> {
    let trimmed = range_str.trim();
    if trimmed.is_empty() || trimmed == "*" {
        return Ok(Range::wildcard());
    }

    let mut clauses = Vec::new();
    for group in trimmed.split("||").map(str::trim).filter(|g| !g.is_empty()) {
        clauses.push(parse_clause(group)?);
    }

    if clauses.is_empty() {
        return Ok(Range::wildcard());
    }

    Ok(Range { clauses })
}

#[must_use]
pub fn satisfies(version: &Version, range: &Range) -> bool {
    range.satisfies(version)
}

/// Highest version in `candidates` satisfying `range`, or `None`.
#[must_use]
pub fn max_satisfying<'a>(candidates: &'a [Version], range: &Range) -> Option<&'a Version> {
    candidates.iter().filter(|v| range.satisfies(v)).max()
}

/// Lowest version in `candidates` satisfying `range`, or `None`.
#[must_use]
pub fn min_satisfying<'a>(candidates: &'a [Version], range: &Range) -> Option<&'a Version> {
    candidates.iter().filter(|v| range.satisfies(v)).min()
}

fn parse_clause(clause: &str) -> Result<Clause> {
    let clause = clause.trim();
    if clause.is_empty() || clause == "*" {
        return Ok(Clause::new(vec![Comparator::Wildcard]));
    }

    if let Some((lower_raw, upper_raw)) = split_hyphen_range(clause) {
        let lower = parse_partial_version(lower_raw)?;
        let upper = upper_bound_comparator(upper_raw)?;
        return Ok(Clause::new(vec![
            Comparator::GreaterThanOrEqual(lower),
            upper,
        ]));
    }

    let mut comparators = Vec::new();
    for token in clause.split_whitespace() {
        comparators.extend(parse_token(token)?);
    }

    if comparators.is_empty() {
        return Ok(Clause::new(vec![Comparator::Wildcard]));
    }

    Ok(Clause::new(comparators))
}

/// `"1.2.3 - 2.3.4"` style hyphen ranges. Distinguished from a bare `-` in a
/// pre-release tag by requiring whitespace on both sides of the hyphen.
fn split_hyphen_range(clause: &str) -> Option<(&str, &str)> {
    let idx = clause.find(" - ")?;
    let (lower, rest) = clause.split_at(idx);
    let upper = &rest[3..];
    if lower.trim().is_empty() || upper.trim().is_empty() {
        return None;
    }
    Some((lower.trim(), upper.trim()))
}

fn upper_bound_comparator(version_str: &str) -> Result<Comparator> {
    let component_count = explicit_component_count(version_str);
    let base = parse_partial_version(version_str)?;
    if component_count >= 3 {
        Ok(Comparator::LessThanOrEqual(base))
    } else {
        Ok(Comparator::LessThan(bump_for_partial(&base, component_count)))
    }
}

/// Number of dot-separated components the caller actually wrote, ignoring
/// any pre-release/build suffix — needed to tell `~1` from `~1.2` from
/// `~1.2.3`, each of which has different upper bounds.
fn explicit_component_count(version_str: &str) -> usize {
    let core = version_str
        .split(['-', '+'])
        .next()
        .unwrap_or(version_str);
    core.split('.')
        .filter(|p| !p.is_empty() && *p != "x" && *p != "X" && *p != "*")
        .count()
        .max(if core.is_empty() { 0 } else { 1 })
}

fn prerelease_zero() -> semver::Prerelease {
    semver::Prerelease::new("0").unwrap_or(semver::Prerelease::EMPTY)
}

/// The exclusive upper bound for a partial version with `component_count`
/// explicit components, e.g. `1.2` (2 components) bumps the minor:
/// `< 1.3.0-0`.
fn bump_for_partial(base: &Version, component_count: usize) -> Version {
    let mut v = match component_count {
        0 => Version::new(base.major + 1, 0, 0),
        1 => Version::new(base.major + 1, 0, 0),
        2 => Version::new(base.major, base.minor + 1, 0),
        _ => Version::new(base.major, base.minor, base.patch + 1),
    };
    v.pre = prerelease_zero();
    v
}

fn caret_upper(base: &Version) -> Version {
    let mut v = if base.major > 0 {
        Version::new(base.major + 1, 0, 0)
    } else if base.minor > 0 {
        Version::new(0, base.minor + 1, 0)
    } else {
        Version::new(0, 0, base.patch + 1)
    };
    v.pre = prerelease_zero();
    v
}

fn tilde_upper(base: &Version, component_count: usize) -> Version {
    let mut v = if component_count <= 1 {
        Version::new(base.major + 1, 0, 0)
    } else {
        Version::new(base.major, base.minor + 1, 0)
    };
    v.pre = prerelease_zero();
    v
}

fn parse_token(token: &str) -> Result<Vec<Comparator>> {
    if let Some(rest) = token.strip_prefix(">=") {
        return Ok(vec![Comparator::GreaterThanOrEqual(parse_partial_version(rest)?)]);
    }
    if let Some(rest) = token.strip_prefix("<=") {
        return Ok(vec![Comparator::LessThanOrEqual(parse_partial_version(rest)?)]);
    }
    if let Some(rest) = token.strip_prefix('>') {
        return Ok(vec![Comparator::GreaterThan(parse_partial_version(rest)?)]);
    }
    if let Some(rest) = token.strip_prefix('<') {
        return Ok(vec![Comparator::LessThan(parse_partial_version(rest)?)]);
    }
    if let Some(rest) = token.strip_prefix('^') {
        let base = parse_partial_version(rest)?;
        let upper = caret_upper(&base);
        return Ok(vec![
            Comparator::GreaterThanOrEqual(base),
            Comparator::LessThan(upper),
        ]);
    }
    if let Some(rest) = token.strip_prefix('~') {
        let base = parse_partial_version(rest)?;
        let upper = tilde_upper(&base, explicit_component_count(rest));
        return Ok(vec![
            Comparator::GreaterThanOrEqual(base),
            Comparator::LessThan(upper),
        ]);
    }
    if let Some(rest) = token.strip_prefix('=') {
        return parse_bare(rest);
    }

    parse_bare(token)
}

/// A version with no operator prefix: a fully specified version is an exact
/// match; a partial or `x`-bearing one (`1.2`, `1.2.x`) is an x-range.
fn parse_bare(token: &str) -> Result<Vec<Comparator>> {
    if token.is_empty() || token == "*" || token == "x" || token == "X" {
        return Ok(vec![Comparator::Wildcard]);
    }

    let component_count = explicit_component_count(token);
    let base = parse_partial_version(token)?;

    if component_count >= 3 && !token.contains(['x', 'X', '*']) {
        return Ok(vec![Comparator::Exact(base)]);
    }

    let upper = bump_for_partial(&base, component_count);
    Ok(vec![
        Comparator::GreaterThanOrEqual(base),
        Comparator::LessThan(upper),
    ])
}
