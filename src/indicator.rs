//! Indicators of compromise and the per-run indicator set.
//!
//! An [`Indicator`] can only be built through its normalizing constructors, so
//! every value in an [`IndicatorSet`] is lowercase, trimmed and syntactically
//! valid.
//!
//! ```
//! use threat_sweep::{Indicator, IndicatorSet};
//!
//! let mut set = IndicatorSet::new();
//! assert!(set.insert(Indicator::domain("*.Evil.Example.COM").unwrap()));
//! assert!(!set.insert(Indicator::domain("evil.example.com").unwrap()));
//! assert!(Indicator::ipv4("999.1.1.1").is_none());
//! assert_eq!(set.len(), 1);
//! ```

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Indicators shorter than this are rejected by the constructors.
pub const MIN_INDICATOR_LEN: usize = 4;

static DOMAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid regex"));

/// Which kind of value an [`Indicator`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndicatorKind {
    /// A hostname such as `evil.example.com`.
    Domain,
    /// A dotted-quad IPv4 address such as `203.0.113.7`.
    Ipv4,
}

impl IndicatorKind {
    /// Returns `"domain"` or `"ipv4"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorKind::Domain => "domain",
            IndicatorKind::Ipv4 => "ipv4",
        }
    }
}

impl std::fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain name or IPv4 address known to be associated with malicious activity.
///
/// Only [`Indicator::domain`] and [`Indicator::ipv4`] create values, so the
/// text is always normalized and valid for its kind. Ordering puts domains
/// before IPv4 addresses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Indicator {
    kind: IndicatorKind,
    value: String,
}

impl Indicator {
    /// Normalizes and validates a domain indicator.
    ///
    /// Trims whitespace, strips leading wildcard markers (`*` and `.`) and
    /// lowercases. Returns `None` when the result is not domain-shaped.
    #[must_use]
    pub fn domain(raw: &str) -> Option<Self> {
        let host = raw
            .trim()
            .trim_start_matches(['*', '.'])
            .to_ascii_lowercase();

        (host.len() >= MIN_INDICATOR_LEN && is_valid_domain(&host)).then_some(Self {
            kind: IndicatorKind::Domain,
            value: host,
        })
    }

    /// Validates an IPv4 indicator: four dot-separated octets, each in `0..=255`.
    #[must_use]
    pub fn ipv4(raw: &str) -> Option<Self> {
        let ip = raw.trim();
        is_valid_ipv4(ip).then(|| Self {
            kind: IndicatorKind::Ipv4,
            value: ip.to_string(),
        })
    }

    /// Returns the normalized indicator text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Returns whether this is a domain or an IPv4 address.
    #[must_use]
    pub fn kind(&self) -> IndicatorKind {
        self.kind
    }
}

impl std::fmt::Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` if `host` matches `^[A-Za-z0-9.-]+\.[A-Za-z]{2,}$`.
#[must_use]
pub fn is_valid_domain(host: &str) -> bool {
    DOMAIN_RE.is_match(host)
}

/// Returns `true` if `ip` is four dot-separated decimal octets in `0..=255`.
///
/// Each octet is one to three ASCII digits; signs and whitespace are rejected.
#[must_use]
pub fn is_valid_ipv4(ip: &str) -> bool {
    let octets: Vec<&str> = ip.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|octet| {
            (1..=3).contains(&octet.len())
                && octet.bytes().all(|b| b.is_ascii_digit())
                && octet.parse::<u16>().is_ok_and(|n| n <= 255)
        })
}

/// The deduplicated union of indicators collected for one run.
///
/// Iteration order is sorted (domains first), which keeps logs and tests
/// deterministic; it carries no meaning for matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorSet {
    indicators: BTreeSet<Indicator>,
}

impl IndicatorSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an indicator. Returns `false` if it was already present.
    pub fn insert(&mut self, indicator: Indicator) -> bool {
        self.indicators.insert(indicator)
    }

    /// Merges every indicator from `other` into this set.
    pub fn extend(&mut self, other: impl IntoIterator<Item = Indicator>) {
        for indicator in other {
            self.insert(indicator);
        }
    }

    /// Returns the number of indicators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    /// Returns `true` if no indicators were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    /// Returns `true` if the set holds `indicator`.
    #[must_use]
    pub fn contains(&self, indicator: &Indicator) -> bool {
        self.indicators.contains(indicator)
    }

    /// Iterates over all indicators.
    pub fn iter(&self) -> impl Iterator<Item = &Indicator> {
        self.indicators.iter()
    }

    /// Iterates over domain indicators.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.of_kind(IndicatorKind::Domain)
    }

    /// Iterates over IPv4 indicators.
    pub fn ipv4s(&self) -> impl Iterator<Item = &str> {
        self.of_kind(IndicatorKind::Ipv4)
    }

    fn of_kind(&self, kind: IndicatorKind) -> impl Iterator<Item = &str> {
        self.indicators
            .iter()
            .filter(move |i| i.kind == kind)
            .map(Indicator::as_str)
    }

    /// Returns `(domain_count, ipv4_count)`.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        let domains = self.domains().count();
        (domains, self.len() - domains)
    }
}

impl FromIterator<Indicator> for IndicatorSet {
    fn from_iter<I: IntoIterator<Item = Indicator>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<'a> IntoIterator for &'a IndicatorSet {
    type Item = &'a Indicator;
    type IntoIter = std::collections::btree_set::Iter<'a, Indicator>;

    fn into_iter(self) -> Self::IntoIter {
        self.indicators.iter()
    }
}
