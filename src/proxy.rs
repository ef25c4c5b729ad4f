//! SOCKS5 proxy configuration for outbound HTTP.
//!
//! The same proxy is applied to the feed collector and to the Graph client, so a
//! sweep run from a restricted network leaves through a single egress point.
//!
//! # Example
//!
//! ```
//! use threat_sweep::Socks5Proxy;
//!
//! // Without authentication
//! let proxy = Socks5Proxy::new("proxy.example.com", 1080);
//!
//! // With authentication
//! let proxy = Socks5Proxy::with_auth("proxy.example.com", 1080, "username", "password");
//! assert!(proxy.requires_auth());
//! ```

use crate::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};

/// SOCKS5 proxy configuration.
#[derive(Debug, Clone)]
pub struct Socks5Proxy {
    /// Proxy server hostname or IP address.
    pub host: String,
    /// Proxy server port.
    pub port: u16,
    /// Optional username for proxy authentication.
    pub username: Option<String>,
    /// Optional password for proxy authentication.
    password: Option<SecretString>,
}

impl Socks5Proxy {
    /// Creates a new SOCKS5 proxy configuration without authentication.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Creates a new SOCKS5 proxy configuration with authentication.
    #[must_use]
    pub fn with_auth(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: Some(username.into()),
            password: Some(SecretString::from(password.into())),
        }
    }

    /// Returns the proxy URL without credentials, e.g. `socks5h://host:1080`.
    ///
    /// `socks5h` makes the proxy resolve hostnames, so feed and Graph lookups
    /// do not leak through local DNS.
    #[must_use]
    pub fn url(&self) -> String {
        format!("socks5h://{}:{}", self.host, self.port)
    }

    /// Returns `true` if this proxy requires authentication.
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.username.is_some()
    }

    /// Converts this configuration into a [`reqwest::Proxy`] covering all schemes.
    ///
    /// SOCKS credentials travel in the proxy URL's userinfo, percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the host/port do not form a valid proxy URL.
    pub fn to_reqwest(&self) -> Result<reqwest::Proxy> {
        let invalid = |detail: String| Error::InvalidConfig {
            message: format!("invalid proxy {self}: {detail}"),
        };

        let mut url = url::Url::parse(&self.url()).map_err(|e| invalid(e.to_string()))?;

        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|()| invalid("username rejected".into()))?;
            let password = self.password.as_ref().map(|p| p.expose_secret());
            url.set_password(password)
                .map_err(|()| invalid("password rejected".into()))?;
        }

        reqwest::Proxy::all(url.as_str()).map_err(|e| invalid(e.to_string()))
    }
}

impl std::fmt::Display for Socks5Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.username {
            Some(username) => write!(
                f,
                "socks5h://{}:***@{}:{}",
                username, self.host, self.port
            ),
            None => write!(f, "socks5h://{}:{}", self.host, self.port),
        }
    }
}
