use semver::Version;

/// A single bound within a range clause, already normalized: `^` and `~`
/// have been expanded into explicit `>=`/`<` pairs by the caller (spec
/// §4.2), so by the time a [`Comparator`] exists it is always one of these
/// six primitive forms.
#[derive(Debug, Clone)]
pub enum Comparator {
    Exact(Version),
    GreaterThan(Version),
    GreaterThanOrEqual(Version),
    LessThan(Version),
    LessThanOrEqual(Version),
    Wildcard,
}

impl Comparator {
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Exact(v) => version == v,
            Self::GreaterThan(v) => version > v,
            Self::GreaterThanOrEqual(v) => version >= v,
            Self::LessThan(v) => version < v,
            Self::LessThanOrEqual(v) => version <= v,
            Self::Wildcard => true,
        }
    }

    /// The bound's own version, ignoring [`Comparator::Wildcard`], used to
    /// decide whether a clause "explicitly mentions a pre-release" on a
    /// given `[major, minor, patch]` tuple (spec §4.2's pre-release rule).
    #[must_use]
    pub fn bound_version(&self) -> Option<&Version> {
        match self {
            Self::Exact(v)
            | Self::GreaterThan(v)
            | Self::GreaterThanOrEqual(v)
            | Self::LessThan(v)
            | Self::LessThanOrEqual(v) => Some(v),
            Self::Wildcard => None,
        }
    }
}

/// One AND-joined clause (e.g. `>=1.2.3 <2.0.0-0`). A [`crate::Range`] is an
/// OR-group of these.
#[derive(Debug, Clone)]
pub struct Clause {
    pub comparators: Vec<Comparator>,
}

impl Clause {
    #[must_use]
    pub fn new(comparators: Vec<Comparator>) -> Self {
        Self { comparators }
    }

    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        if self.comparators.is_empty() {
            return true;
        }
        self.comparators.iter().all(|c| c.matches(version))
    }

    /// True if this clause has a comparator whose bound shares `version`'s
    /// `[major, minor, patch]` tuple and itself carries a pre-release tag.
    #[must_use]
    pub fn explicitly_allows_prerelease_of(&self, version: &Version) -> bool {
        self.comparators.iter().any(|c| {
            c.bound_version().is_some_and(|bound| {
                !bound.pre.is_empty()
                    && bound.major == version.major
                    && bound.minor == version.minor
                    && bound.patch == version.patch
            })
        })
    }
}
