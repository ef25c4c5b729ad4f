//! Threat feed collection.
//!
//! Each [`FeedSource`] pairs a download URL with a [`FeedParser`]; the parser is
//! the only place that knows the feed's text format. [`FeedCollector`] downloads
//! every source, absorbs per-source failures, and merges the results into one
//! deduplicated [`IndicatorSet`].
//!
//! ```
//! use threat_sweep::feed::{FeedParser, UrlCsvParser, Ipv4TextParser};
//!
//! let csv = "# id,dateadded,url\n\"1\",\"2024-01-01\",\"http://Evil.example.com/payload.exe\",\"online\"\n";
//! let found = UrlCsvParser.parse(csv);
//! assert_eq!(found[0].as_str(), "evil.example.com");
//!
//! let ips = Ipv4TextParser.parse("# Feodo\n203.0.113.7\n999.1.1.1\n");
//! assert_eq!(ips.len(), 1);
//! ```

use crate::config::TimeoutConfig;
use crate::error::{Error, Result};
use crate::indicator::{Indicator, IndicatorSet};
use crate::proxy::Socks5Proxy;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// URLhaus "recent URLs" CSV export.
pub const URLHAUS_RECENT_CSV: &str = "https://urlhaus.abuse.ch/downloads/csv_recent/";
/// Feodo Tracker IPv4 blocklist.
pub const FEODO_IP_BLOCKLIST: &str = "https://feodotracker.abuse.ch/downloads/ipblocklist.txt";

static IPV4_CANDIDATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\d{1,3}\.){3}\d{1,3}").expect("valid regex"));

/// Turns the body of one feed download into indicators.
///
/// Implementations never fail: lines they cannot understand are skipped.
pub trait FeedParser: Send + Sync {
    /// Extracts every valid indicator from `body`.
    fn parse(&self, body: &str) -> Vec<Indicator>;

    /// Returns a short human-readable name of the format, used in logs.
    fn format(&self) -> &str;
}

/// Parser for comma-separated feeds whose third field is a URL.
///
/// The URL's host becomes a domain indicator.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlCsvParser;

impl UrlCsvParser {
    /// Index of the URL field in each record.
    pub const URL_FIELD: usize = 2;
    /// Records with fewer fields are malformed.
    pub const MIN_FIELDS: usize = 4;
}

impl FeedParser for UrlCsvParser {
    fn parse(&self, body: &str) -> Vec<Indicator> {
        body.lines()
            .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
            .filter_map(|line| {
                let fields: Vec<&str> = line.split(',').collect();
                if fields.len() < Self::MIN_FIELDS {
                    return None;
                }
                let host = host_from_url(fields[Self::URL_FIELD]);
                Indicator::domain(host)
            })
            .collect()
    }

    fn format(&self) -> &str {
        "url-csv"
    }
}

/// Extracts the host part of a URL-ish string without validating it.
///
/// Drops quoting, the scheme, any path, userinfo and port. Wildcard markers
/// and case are left to [`Indicator::domain`].
#[must_use]
pub fn host_from_url(raw: &str) -> &str {
    let url = raw.trim().trim_matches('"').trim();
    let after_scheme = url.rsplit("//").next().unwrap_or(url);
    let authority = after_scheme.split('/').next().unwrap_or(after_scheme);
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    host_port.split(':').next().unwrap_or(host_port)
}

/// Parser for free-text feeds listing IPv4 addresses.
///
/// Comment lines are dropped; every dotted-quad substring of the rest is a
/// candidate, kept only if each octet is in range.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ipv4TextParser;

impl FeedParser for Ipv4TextParser {
    fn parse(&self, body: &str) -> Vec<Indicator> {
        body.lines()
            .filter(|line| !line.starts_with('#'))
            .flat_map(|line| IPV4_CANDIDATE_RE.find_iter(line))
            .filter_map(|m| Indicator::ipv4(m.as_str()))
            .collect()
    }

    fn format(&self) -> &str {
        "ipv4-text"
    }
}

/// One independently fetched indicator feed.
pub struct FeedSource {
    name: String,
    url: String,
    parser: Box<dyn FeedParser>,
}

impl FeedSource {
    /// Creates a feed source.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        parser: impl FeedParser + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            parser: Box::new(parser),
        }
    }

    /// URLhaus recent URLs, yielding domains.
    #[must_use]
    pub fn urlhaus() -> Self {
        Self::new("urlhaus", URLHAUS_RECENT_CSV, UrlCsvParser)
    }

    /// Feodo Tracker blocklist, yielding IPv4 addresses.
    #[must_use]
    pub fn feodo() -> Self {
        Self::new("feodo", FEODO_IP_BLOCKLIST, Ipv4TextParser)
    }

    /// Returns the source name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the download URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Parses a downloaded body with this source's parser.
    #[must_use]
    pub fn parse(&self, body: &str) -> Vec<Indicator> {
        self.parser.parse(body)
    }
}

impl std::fmt::Debug for FeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSource")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("format", &self.parser.format())
            .finish()
    }
}

/// Produces the indicator set for a run.
///
/// The scan pipeline depends on this trait rather than on [`FeedCollector`]
/// directly so that the collection step can be replaced.
#[async_trait]
pub trait IndicatorCollector: Send + Sync {
    /// Collects, validates and deduplicates indicators from every source.
    ///
    /// # Errors
    ///
    /// Returns an error only when collection fails as a whole; a single
    /// source failing yields an empty contribution instead.
    async fn collect(&self) -> Result<IndicatorSet>;
}

/// Downloads feed sources over HTTP and merges their indicators.
#[derive(Debug)]
pub struct FeedCollector {
    http: reqwest::Client,
    sources: Vec<FeedSource>,
}

impl FeedCollector {
    /// Creates a collector over `sources`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the HTTP client cannot be built, or
    /// [`Error::InvalidConfig`] for an unusable proxy.
    pub fn new(
        sources: Vec<FeedSource>,
        timeout: Duration,
        proxy: Option<&Socks5Proxy>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("threat-sweep/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy.to_reqwest()?);
        }

        let http = builder
            .build()
            .map_err(|source| Error::HttpClient { source })?;

        Ok(Self { http, sources })
    }

    /// Creates a collector over the URLhaus and Feodo Tracker feeds.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_default_sources(
        timeouts: &TimeoutConfig,
        proxy: Option<&Socks5Proxy>,
    ) -> Result<Self> {
        Self::new(
            vec![FeedSource::urlhaus(), FeedSource::feodo()],
            timeouts.feed,
            proxy,
        )
    }

    /// Returns the configured sources.
    #[must_use]
    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    /// Downloads one source body.
    #[instrument(
        name = "FeedCollector::fetch_source",
        skip_all,
        fields(feed = %source.name, url = %source.url)
    )]
    async fn fetch_source(&self, source: &FeedSource) -> Result<String> {
        debug!("Downloading feed");

        let response = self
            .http
            .get(&source.url)
            .send()
            .await
            .map_err(|e| Error::FeedRequest {
                feed: source.name.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FeedStatus {
                feed: source.name.clone(),
                status,
            });
        }

        response.text().await.map_err(|e| Error::FeedRequest {
            feed: source.name.clone(),
            source: e,
        })
    }
}

#[async_trait]
impl IndicatorCollector for FeedCollector {
    #[instrument(name = "FeedCollector::collect", skip_all)]
    async fn collect(&self) -> Result<IndicatorSet> {
        if self.sources.is_empty() {
            return Err(Error::Collection {
                message: "no feed sources configured".into(),
            });
        }

        debug!(sources = self.sources.len(), "Collecting indicators");

        let mut downloads = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            downloads.push(self.fetch_source(source).await);
        }

        Ok(merge_sources(self.sources.iter().zip(downloads)))
    }
}

/// Parses each downloaded body and merges the results.
///
/// A failed download contributes nothing and is logged at warn level with the
/// source name.
pub fn merge_sources<'a>(
    downloads: impl IntoIterator<Item = (&'a FeedSource, Result<String>)>,
) -> IndicatorSet {
    let mut set = IndicatorSet::new();

    for (source, download) in downloads {
        match download {
            Ok(body) => {
                let found = source.parse(&body);
                let before = set.len();
                let parsed = found.len();
                set.extend(found);
                debug!(
                    feed = %source.name(),
                    parsed,
                    added = set.len() - before,
                    "Parsed feed"
                );
            }
            Err(e) => {
                warn!(
                    feed = %source.name(),
                    error = %e.full_message(),
                    category = %e.category(),
                    "Feed unavailable, continuing without it"
                );
            }
        }
    }

    let (domains, ipv4s) = set.counts();
    info!(domains, ipv4s, "Collected indicators");

    set
}

#[cfg(test)]
mod tests {
    use super::*;

    const URLHAUS_SAMPLE: &str = r#"################################################################
# abuse.ch URLhaus Database Dump (CSV - recent URLs only)      #
################################################################
#
# id,dateadded,url,url_status,last_online,threat,tags,urlhaus_link,reporter
"3001","2024-05-01 10:00:00","http://malware.example.com/bin.sh","online","2024-05-01","malware_download","elf","https://urlhaus.abuse.ch/url/3001/","anonymous"
"3002","2024-05-01 10:01:00","https://*.Phish.Example.NET/login","online","2024-05-01","phishing","","https://urlhaus.abuse.ch/url/3002/","anonymous"
"3003","2024-05-01 10:02:00","http://198.51.100.4:8080/x","online","2024-05-01","malware_download","","https://urlhaus.abuse.ch/url/3003/","anonymous"
"3004","2024-05-01 10:03:00","http://MALWARE.example.com:8443/other","offline","2024-05-01","malware_download","","https://urlhaus.abuse.ch/url/3004/","anonymous"
"3005","2024-05-01","broken"

"3006","2024-05-01 10:05:00","http://localhost/x","online","","","","",""
"#;

    #[test]
    fn test_url_csv_extracts_normalized_domains() {
        let set: IndicatorSet = UrlCsvParser.parse(URLHAUS_SAMPLE).into_iter().collect();

        assert_eq!(
            set.domains().collect::<Vec<_>>(),
            vec!["malware.example.com", "phish.example.net"]
        );
        assert_eq!(set.ipv4s().count(), 0);
    }

    #[test]
    fn test_url_csv_skips_short_records() {
        assert!(UrlCsvParser.parse("a,b,http://evil.com/").is_empty());
        assert_eq!(UrlCsvParser.parse("a,b,http://evil.com/,d").len(), 1);
    }

    #[test]
    fn test_host_from_url() {
        assert_eq!(host_from_url("http://evil.com/a/b"), "evil.com");
        assert_eq!(host_from_url("\"https://evil.com\""), "evil.com");
        assert_eq!(host_from_url("evil.com/path"), "evil.com");
        assert_eq!(host_from_url("http://user:pw@evil.com:81/"), "evil.com");
        assert_eq!(host_from_url("  "), "");
    }

    #[test]
    fn test_ipv4_text_parser() {
        let body = "# Feodo Tracker\n# 10.0.0.1 in a comment\n203.0.113.7\n198.51.100.23 extra\n999.1.1.1\n1.2.3.4.5\n";
        let set: IndicatorSet = Ipv4TextParser.parse(body).into_iter().collect();

        assert!(set.contains(&Indicator::ipv4("203.0.113.7").unwrap()));
        assert!(set.contains(&Indicator::ipv4("198.51.100.23").unwrap()));
        assert!(set.contains(&Indicator::ipv4("1.2.3.4").unwrap()));
        assert!(!set.contains(&Indicator::ipv4("10.0.0.1").unwrap()));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_merge_deduplicates_across_sources() {
        let a = FeedSource::new("a", "http://a.test/", UrlCsvParser);
        let b = FeedSource::new("b", "http://b.test/", UrlCsvParser);

        let set = merge_sources([
            (&a, Ok("1,2,http://dup.example.org/x,4".to_string())),
            (&b, Ok("1,2,https://*.DUP.example.org,4".to_string())),
        ]);

        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_merge_absorbs_failed_source() {
        let urlhaus = FeedSource::urlhaus();
        let feodo = FeedSource::feodo();

        let set = merge_sources([
            (
                &urlhaus,
                Err(Error::FeedStatus {
                    feed: "urlhaus".into(),
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                }),
            ),
            (&feodo, Ok("203.0.113.7\n".to_string())),
        ]);

        assert_eq!(set.counts(), (0, 1));
    }

    #[test]
    fn test_source_debug_shows_format() {
        let debug = format!("{:?}", FeedSource::feodo());
        assert!(debug.contains("ipv4-text"));
        assert!(debug.contains("feodo"));
    }

    #[tokio::test]
    async fn test_collect_without_sources_is_hard_failure() {
        let collector = FeedCollector::new(Vec::new(), Duration::from_secs(1), None).unwrap();
        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, Error::Collection { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_source_yields_empty_set() {
        let collector = FeedCollector::new(
            vec![FeedSource::new("dead", "http://127.0.0.1:9/feed.txt", Ipv4TextParser)],
            Duration::from_secs(2),
            None,
        )
        .unwrap();

        let set = collector.collect().await.unwrap();
        assert!(set.is_empty());
    }
}
