//! Version predicates and the pre-built matcher constants.
//!
//! A [`VersionPredicate`] is a pure, shareable function over [`Version`].
//! Predicates compose with [`and`](VersionPredicate::and) /
//! [`or`](VersionPredicate::or); the matcher constants below are built once
//! at first use and never mutated, so they are safe to evaluate from any
//! thread. Flavor compatibility is always checked before numeric comparison:
//! two versions of incompatible lineages never match regardless of numbers.

use std::sync::Arc;

use lazy_static::lazy_static;

use crate::version::{Flavor, Version};

/// A pure predicate over cluster versions.
#[derive(Clone)]
pub struct VersionPredicate {
    test: Arc<dyn Fn(&Version) -> bool + Send + Sync>,
}

impl VersionPredicate {
    /// Wrap a closure as a predicate.
    pub fn new<F>(test: F) -> Self
    where
        F: Fn(&Version) -> bool + Send + Sync + 'static,
    {
        VersionPredicate {
            test: Arc::new(test),
        }
    }

    /// Evaluate the predicate.
    pub fn matches(&self, version: &Version) -> bool {
        (self.test)(version)
    }

    /// Logical conjunction with another predicate.
    pub fn and(&self, other: &VersionPredicate) -> VersionPredicate {
        let a = self.clone();
        let b = other.clone();
        VersionPredicate::new(move |v| a.matches(v) && b.matches(v))
    }

    /// Logical disjunction with another predicate.
    pub fn or(&self, other: &VersionPredicate) -> VersionPredicate {
        let a = self.clone();
        let b = other.clone();
        VersionPredicate::new(move |v| a.matches(v) || b.matches(v))
    }
}

impl std::fmt::Debug for VersionPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VersionPredicate")
    }
}

/// Matches versions whose flavor is interchangeable with `version`'s.
pub fn matches_flavor(version: Version) -> VersionPredicate {
    VersionPredicate::new(move |other| version.flavor.matches(&other.flavor))
}

/// Matches versions sharing `version`'s flavor group and major number,
/// regardless of minor/patch.
pub fn matches_major_version(version: Version) -> VersionPredicate {
    let flavor = matches_flavor(version);
    VersionPredicate::new(move |other| flavor.matches(other) && other.major == version.major)
}

/// Matches versions sharing `version`'s flavor group, major and minor
/// numbers, regardless of patch.
pub fn matches_minor_version(version: Version) -> VersionPredicate {
    let major = matches_major_version(version);
    VersionPredicate::new(move |other| major.matches(other) && other.minor == version.minor)
}

/// Matches versions in `[min, max]`, both endpoints inclusive, comparing
/// (major, minor, patch) lexicographically. Flavor must match `min`'s group.
pub fn inclusive_version_range(min: Version, max: Version) -> VersionPredicate {
    let flavor = matches_flavor(min);
    VersionPredicate::new(move |v| {
        flavor.matches(v)
            && v.compare_numbers(&min) != std::cmp::Ordering::Less
            && v.compare_numbers(&max) != std::cmp::Ordering::Greater
    })
}

/// Matches versions in `version`'s major line at `version`'s minor or later.
pub fn equal_or_greater_than_minor_version(version: Version) -> VersionPredicate {
    let major = matches_major_version(version);
    VersionPredicate::new(move |other| major.matches(other) && version.minor <= other.minor)
}

lazy_static! {
    /// Elasticsearch 2.x sources.
    pub static ref IS_ES_2_X: VersionPredicate =
        matches_major_version(Version::new(Flavor::Elasticsearch, 2, 4, 0));
    /// Elasticsearch 5.x sources.
    pub static ref IS_ES_5_X: VersionPredicate =
        matches_major_version(Version::new(Flavor::Elasticsearch, 5, 6, 0));
    /// Elasticsearch 6.x sources.
    pub static ref IS_ES_6_X: VersionPredicate =
        matches_major_version(Version::new(Flavor::Elasticsearch, 6, 8, 0));
    /// Elasticsearch 7.x sources.
    pub static ref IS_ES_7_X: VersionPredicate =
        matches_major_version(Version::new(Flavor::Elasticsearch, 7, 10, 0));
    /// Exactly the Elasticsearch 7.10 line.
    pub static ref IS_ES_7_10: VersionPredicate =
        matches_minor_version(Version::new(Flavor::Elasticsearch, 7, 10, 2));
    /// Elasticsearch 8.x sources.
    pub static ref IS_ES_8_X: VersionPredicate =
        matches_major_version(Version::new(Flavor::Elasticsearch, 8, 17, 0));
    /// Elasticsearch 7.0 through 7.8 (inclusive).
    pub static ref IS_ES_7_0_TO_7_8: VersionPredicate = inclusive_version_range(
        Version::new(Flavor::Elasticsearch, 7, 0, 0),
        Version::new(Flavor::Elasticsearch, 7, 8, 99),
    );
    /// The Elasticsearch 7.9 line.
    pub static ref IS_ES_7_9_X: VersionPredicate = inclusive_version_range(
        Version::new(Flavor::Elasticsearch, 7, 9, 0),
        Version::new(Flavor::Elasticsearch, 7, 9, 99),
    );
    /// Elasticsearch 7.10 or any later 7.x minor.
    pub static ref EQUAL_OR_GREATER_THAN_ES_7_10: VersionPredicate =
        equal_or_greater_than_minor_version(Version::new(Flavor::Elasticsearch, 7, 10, 0));
    /// OpenSearch 1.x targets/sources.
    pub static ref IS_OS_1_X: VersionPredicate =
        matches_major_version(Version::new(Flavor::OpenSearch, 1, 0, 0));
    /// OpenSearch 2.x targets/sources.
    pub static ref IS_OS_2_X: VersionPredicate =
        matches_major_version(Version::new(Flavor::OpenSearch, 2, 0, 0));
    /// OpenSearch 3.x targets/sources.
    pub static ref IS_OS_3_X: VersionPredicate =
        matches_major_version(Version::new(Flavor::OpenSearch, 3, 0, 0));
    /// OpenSearch 2.19 or anything newer.
    pub static ref IS_OS_2_19_OR_GREATER: VersionPredicate =
        equal_or_greater_than_minor_version(Version::new(Flavor::OpenSearch, 2, 19, 0))
            .or(&IS_OS_3_X);
    /// Any OpenSearch-lineage version.
    pub static ref ANY_OS: VersionPredicate = IS_OS_1_X.or(&IS_OS_2_X).or(&IS_OS_3_X);
}
