//! Configuration for the Graph client and for a single scan run.
//!
//! [`GraphConfig`] is loaded once from a JSON file and carries the client
//! credentials. [`ScanConfig`] holds the run parameters and can only be obtained
//! through [`ScanConfigBuilder::build`], which validates every field:
//!
//! ```
//! use threat_sweep::ScanConfig;
//!
//! let config = ScanConfig::builder()
//!     .mailbox("soc@example.com")
//!     .top(100)
//!     .category("Suspect-IOC")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.top(), 100);
//! assert!(ScanConfig::builder().mailbox("not-an-email").build().is_err());
//! ```

use crate::error::{Error, Result};
use crate::proxy::Socks5Proxy;
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default OAuth scope for application permissions on Microsoft Graph.
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";
/// Default Graph API base URL.
pub const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
/// Default identity platform authority.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Default number of messages fetched per run.
pub const DEFAULT_TOP: u32 = 50;
/// Smallest accepted `top`.
pub const MIN_TOP: u32 = 1;
/// Largest accepted `top`.
pub const MAX_TOP: u32 = 1000;
/// Default category applied to matching messages.
pub const DEFAULT_CATEGORY: &str = "Suspect-IOC";

/// Credentials and endpoints for the Microsoft Graph client.
///
/// The client secret is stored as a [`SecretString`] to prevent accidental
/// logging.
#[derive(Clone)]
pub struct GraphConfig {
    /// Azure AD tenant identifier.
    pub tenant_id: String,
    /// Application (client) identifier.
    pub client_id: String,
    client_secret: SecretString,
    /// OAuth scope requested with the client-credentials grant.
    pub scope: String,
    /// Graph API base URL, without trailing slash.
    pub graph_base: String,
    /// Identity platform authority, without trailing slash.
    pub authority: String,
    /// Optional SOCKS5 proxy for every outbound request.
    pub proxy: Option<Socks5Proxy>,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("graph_base", &self.graph_base)
            .field("authority", &self.authority)
            .field("proxy", &self.proxy)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

/// On-disk shape of the configuration file. Every key is optional here so that
/// all missing required keys can be reported together.
#[derive(Deserialize)]
struct RawGraphConfig {
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    scope: Option<String>,
    graph_base: Option<String>,
    authority: Option<String>,
    proxy: Option<RawProxy>,
}

#[derive(Deserialize)]
struct RawProxy {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

impl GraphConfig {
    /// Loads the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigRead`] if the file cannot be read,
    /// [`Error::ConfigParse`] if it is not a JSON object of the expected shape,
    /// and [`Error::MissingConfigKeys`] listing every absent required key.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let raw: RawGraphConfig =
            serde_json::from_str(&text).map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_raw(raw)
    }

    /// Parses the configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load), without the read step.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawGraphConfig =
            serde_json::from_str(json).map_err(|source| Error::ConfigParse {
                path: "<inline>".into(),
                source,
            })?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawGraphConfig) -> Result<Self> {
        let required = [
            ("tenant_id", &raw.tenant_id),
            ("client_id", &raw.client_id),
            ("client_secret", &raw.client_secret),
        ];
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(key, _)| *key)
            .collect();

        if !missing.is_empty() {
            return Err(Error::MissingConfigKeys { keys: missing });
        }

        let graph_base = validate_base_url(
            "graph_base",
            raw.graph_base.as_deref().unwrap_or(DEFAULT_GRAPH_BASE),
        )?;
        let authority = validate_base_url(
            "authority",
            raw.authority.as_deref().unwrap_or(DEFAULT_AUTHORITY),
        )?;

        let proxy = raw.proxy.map(|p| match (p.username, p.password) {
            (Some(user), password) => {
                Socks5Proxy::with_auth(p.host, p.port, user, password.unwrap_or_default())
            }
            (None, _) => Socks5Proxy::new(p.host, p.port),
        });

        Ok(Self {
            tenant_id: raw.tenant_id.unwrap_or_default().trim().to_string(),
            client_id: raw.client_id.unwrap_or_default().trim().to_string(),
            client_secret: SecretString::from(raw.client_secret.unwrap_or_default()),
            scope: raw
                .scope
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            graph_base,
            authority,
            proxy,
            timeouts: TimeoutConfig::default(),
        })
    }

    /// Returns the client secret.
    ///
    /// Only the token request should call this.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }

    /// Returns the OAuth token endpoint for this tenant.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id)
    }
}

fn validate_base_url(key: &str, value: &str) -> Result<String> {
    let trimmed = value.trim().trim_end_matches('/');
    match url::Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(trimmed.to_string()),
        _ => Err(Error::InvalidConfig {
            message: format!("{key} must be an http(s) URL, got '{value}'"),
        }),
    }
}

/// Timeout configuration for network operations. None of them are retried.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for one feed download.
    pub feed: Duration,
    /// Timeout for one Graph API call.
    pub graph: Duration,
    /// Timeout for the token request.
    pub token: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            feed: Duration::from_secs(60),
            graph: Duration::from_secs(30),
            token: Duration::from_secs(30),
        }
    }
}

/// Validated parameters of one scan run.
///
/// Create using [`ScanConfig::builder()`].
#[derive(Debug, Clone)]
pub struct ScanConfig {
    mailbox: EmailAddress,
    top: u32,
    category: String,
    ensure_category: bool,
    summary_to: Option<EmailAddress>,
}

impl ScanConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Returns the mailbox to scan.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        self.mailbox.as_str()
    }

    /// Returns the maximum number of messages to fetch.
    #[must_use]
    pub fn top(&self) -> u32 {
        self.top
    }

    /// Returns the category label, trimmed.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Returns `true` if the category should be created when absent.
    #[must_use]
    pub fn ensure_category(&self) -> bool {
        self.ensure_category
    }

    /// Returns the summary recipient, if any.
    #[must_use]
    pub fn summary_to(&self) -> Option<&str> {
        self.summary_to.as_ref().map(EmailAddress::as_str)
    }
}

/// Builder for [`ScanConfig`].
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    mailbox: Option<String>,
    top: Option<i64>,
    category: Option<String>,
    ensure_category: bool,
    summary_to: Option<String>,
}

impl ScanConfigBuilder {
    /// Sets the mailbox to scan (required).
    #[must_use]
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = Some(mailbox.into());
        self
    }

    /// Sets the maximum number of messages to fetch. Default is 50.
    ///
    /// Accepts any integer so that out-of-range input reaches [`build`](Self::build)
    /// and is reported as [`Error::TopOutOfRange`].
    #[must_use]
    pub fn top(mut self, top: impl Into<i64>) -> Self {
        self.top = Some(top.into());
        self
    }

    /// Sets the category label. Default is `Suspect-IOC`.
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Creates the category in the mailbox before tagging if it does not exist.
    #[must_use]
    pub fn ensure_category(mut self, ensure: bool) -> Self {
        self.ensure_category = ensure;
        self
    }

    /// Sets the summary email recipient.
    #[must_use]
    pub fn summary_to(mut self, recipient: impl Into<String>) -> Self {
        self.summary_to = Some(recipient.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the mailbox is missing,
    /// [`Error::InvalidEmailFormat`] for a malformed mailbox or recipient,
    /// [`Error::TopOutOfRange`] and [`Error::EmptyCategory`] for the remaining
    /// parameters.
    pub fn build(self) -> Result<ScanConfig> {
        let mailbox_raw = self.mailbox.ok_or_else(|| Error::InvalidConfig {
            message: "mailbox is required".into(),
        })?;
        let mailbox = validate_email("user", &mailbox_raw)?;

        let summary_to = self
            .summary_to
            .map(|raw| validate_email("summary", &raw))
            .transpose()?;

        let requested = self.top.unwrap_or(i64::from(DEFAULT_TOP));
        let top = u32::try_from(requested)
            .ok()
            .filter(|top| (MIN_TOP..=MAX_TOP).contains(top))
            .ok_or(Error::TopOutOfRange {
                top: requested,
                min: MIN_TOP,
                max: MAX_TOP,
            })?;

        let category = self
            .category
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
            .trim()
            .to_string();
        if category.is_empty() {
            return Err(Error::EmptyCategory);
        }

        Ok(ScanConfig {
            mailbox,
            top,
            category,
            ensure_category: self.ensure_category,
            summary_to,
        })
    }
}

/// Validates an ASCII `local@domain.tld` address.
///
/// On top of the RFC checks done by `email_address`, the domain must contain a
/// dot and end in an alphabetic label of at least two characters. Display-name
/// forms (`Name <a@b.c>`) and domain literals are rejected.
pub fn validate_email(field: &'static str, email: &str) -> Result<EmailAddress> {
    let invalid = || Error::InvalidEmailFormat {
        field,
        email: email.to_string(),
    };

    let trimmed = email.trim();
    if trimmed.is_empty()
        || !trimmed.is_ascii()
        || trimmed.contains(|c: char| c.is_ascii_whitespace() || c == '<' || c == '>')
    {
        return Err(invalid());
    }

    let parsed = EmailAddress::parse_with_options(trimmed, email_address::Options::default())
        .map_err(|_| invalid())?;

    let domain = parsed.domain();
    let labels: Vec<&str> = domain.split('.').collect();
    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));

    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) || !tld_ok {
        return Err(invalid());
    }

    Ok(parsed)
}
