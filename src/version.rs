//! Cluster version model.
//!
//! A [`Version`] pairs a product [`Flavor`] with a semantic version number.
//! Versions are immutable value types: they are parsed from free-text
//! identifiers (`"ES 7.10.2"`, `"opensearch 2.11"`), compared, and
//! range-matched, never mutated. Predicate construction lives in
//! [`matchers`].

pub mod matchers;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{ReliquaryError, Result};

/// Product lineage of a cluster version.
///
/// Flavor affects compatibility grouping independently of version numbers:
/// the OpenSearch-derived flavors are interchangeable with each other, as are
/// the Elasticsearch distributions, but the two lineages never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    /// The default (licensed) Elasticsearch distribution.
    Elasticsearch,
    /// The Apache-2.0 Elasticsearch distribution.
    ElasticsearchOss,
    /// Self-managed OpenSearch.
    OpenSearch,
    /// The AWS-managed OpenSearch service.
    AmazonManagedOpenSearch,
}

impl Flavor {
    /// Whether this flavor belongs to the OpenSearch-derived group.
    pub fn is_opensearch(&self) -> bool {
        matches!(self, Flavor::OpenSearch | Flavor::AmazonManagedOpenSearch)
    }

    /// Whether this flavor belongs to the Elasticsearch lineage.
    pub fn is_elasticsearch(&self) -> bool {
        matches!(self, Flavor::Elasticsearch | Flavor::ElasticsearchOss)
    }

    /// Whether two flavors are interchangeable for version matching.
    pub fn matches(&self, other: &Flavor) -> bool {
        if self.is_opensearch() && other.is_opensearch() {
            return true;
        }
        if self.is_elasticsearch() && other.is_elasticsearch() {
            return true;
        }
        self == other
    }

    fn from_label(label: &str) -> Option<Flavor> {
        // Normalize away case and separators so "Amazon OpenSearch Service",
        // "amazon-opensearch-service" and "AOS" all resolve.
        let key: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "es" | "elasticsearch" => Some(Flavor::Elasticsearch),
            "esoss" | "oss" | "elasticsearchoss" => Some(Flavor::ElasticsearchOss),
            "os" | "opensearch" => Some(Flavor::OpenSearch),
            "aos"
            | "amazonopensearch"
            | "amazonopensearchservice"
            | "amazonmanagedopensearch" => Some(Flavor::AmazonManagedOpenSearch),
            _ => None,
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Flavor::Elasticsearch => "Elasticsearch",
            Flavor::ElasticsearchOss => "Elasticsearch OSS",
            Flavor::OpenSearch => "OpenSearch",
            Flavor::AmazonManagedOpenSearch => "Amazon Managed OpenSearch",
        };
        write!(f, "{label}")
    }
}

/// An immutable cluster version: flavor + (major, minor, patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    /// Product lineage.
    pub flavor: Flavor,
    /// Major version number.
    pub major: u32,
    /// Minor version number.
    pub minor: u32,
    /// Patch version number.
    pub patch: u32,
}

lazy_static! {
    static ref VERSION_PATTERN: Regex =
        Regex::new(r"^\s*([A-Za-z][A-Za-z .\-_]*?)\s*v?(\d+)(?:\.(\d+))?(?:\.(\d+))?\s*$")
            .unwrap();
}

impl Version {
    /// Create a version from its parts.
    pub fn new(flavor: Flavor, major: u32, minor: u32, patch: u32) -> Self {
        Version {
            flavor,
            major,
            minor,
            patch,
        }
    }

    /// Parse a free-text version identifier such as `"ES 7.10.2"`,
    /// `"opensearch 2.11"` or `"Amazon OpenSearch Service 2.19"`.
    ///
    /// Unknown flavor labels fail with
    /// [`ReliquaryError::InvalidVersionString`]; there is no silent default.
    pub fn parse(text: &str) -> Result<Version> {
        let caps = VERSION_PATTERN
            .captures(text)
            .ok_or_else(|| ReliquaryError::invalid_version(text))?;

        let flavor = Flavor::from_label(caps.get(1).map_or("", |m| m.as_str()))
            .ok_or_else(|| ReliquaryError::invalid_version(text))?;

        let number = |idx: usize| -> Result<u32> {
            match caps.get(idx) {
                Some(m) => m
                    .as_str()
                    .parse::<u32>()
                    .map_err(|_| ReliquaryError::invalid_version(text)),
                None => Ok(0),
            }
        };

        Ok(Version {
            flavor,
            major: number(2)?,
            minor: number(3)?,
            patch: number(4)?,
        })
    }

    /// Compare version numbers lexicographically over (major, minor, patch),
    /// ignoring flavor. Flavor compatibility is a separate concern checked
    /// before any numeric comparison (see [`matchers`]).
    pub fn compare_numbers(&self, other: &Version) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}.{}", self.flavor, self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = ReliquaryError;

    fn from_str(s: &str) -> Result<Version> {
        Version::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_labels() {
        let v = Version::parse("ES 7.10.2").unwrap();
        assert_eq!(v.flavor, Flavor::Elasticsearch);
        assert_eq!((v.major, v.minor, v.patch), (7, 10, 2));

        let v = Version::parse("OS 2.11").unwrap();
        assert_eq!(v.flavor, Flavor::OpenSearch);
        assert_eq!((v.major, v.minor, v.patch), (2, 11, 0));
    }

    #[test]
    fn test_parse_long_labels() {
        let v = Version::parse("Elasticsearch 6.8.23").unwrap();
        assert_eq!(v.flavor, Flavor::Elasticsearch);

        let v = Version::parse("elasticsearch oss 7.10.2").unwrap();
        assert_eq!(v.flavor, Flavor::ElasticsearchOss);

        let v = Version::parse("Amazon OpenSearch Service 2.19").unwrap();
        assert_eq!(v.flavor, Flavor::AmazonManagedOpenSearch);
        assert_eq!(v.minor, 19);
    }

    #[test]
    fn test_parse_major_only() {
        let v = Version::parse("OS 3").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (3, 0, 0));
    }

    #[test]
    fn test_parse_rejects_unknown_flavor() {
        assert!(Version::parse("SolrCloud 9.1.0").is_err());
        assert!(Version::parse("7.10.2").is_err());
        assert!(Version::parse("").is_err());
    }

    #[test]
    fn test_flavor_groups() {
        assert!(Flavor::OpenSearch.matches(&Flavor::AmazonManagedOpenSearch));
        assert!(Flavor::Elasticsearch.matches(&Flavor::ElasticsearchOss));
        assert!(!Flavor::Elasticsearch.matches(&Flavor::OpenSearch));
        assert!(!Flavor::ElasticsearchOss.matches(&Flavor::AmazonManagedOpenSearch));
    }

    #[test]
    fn test_compare_numbers() {
        let a = Version::parse("ES 7.9.3").unwrap();
        let b = Version::parse("ES 7.10.0").unwrap();
        assert_eq!(a.compare_numbers(&b), Ordering::Less);
        assert_eq!(b.compare_numbers(&a), Ordering::Greater);

        // Flavor is ignored by numeric comparison.
        let c = Version::parse("OS 7.9.3").unwrap();
        assert_eq!(a.compare_numbers(&c), Ordering::Equal);
    }

    #[test]
    fn test_display_round_trip() {
        let v = Version::parse("OS 2.11.1").unwrap();
        assert_eq!(v.to_string(), "OpenSearch 2.11.1");
        assert_eq!(Version::parse(&v.to_string()).unwrap(), v);
    }
}
