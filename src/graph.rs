//! Mailbox access through Microsoft Graph.
//!
//! The scan pipeline only sees the [`MailSource`] trait. [`GraphClient`] is the
//! production implementation: it acquires application tokens with the
//! client-credentials grant, caches them, and issues one HTTP call per
//! operation under a fixed timeout. Nothing is retried.
//!
//! # Example
//!
//! ```no_run
//! use threat_sweep::{GraphClient, GraphConfig, MailSource};
//!
//! # async fn example() -> threat_sweep::Result<()> {
//! let config = GraphConfig::load("config.json")?;
//! let client = GraphClient::new(config)?;
//!
//! for message in client.list_messages("soc@example.com", 25).await? {
//!     println!("{} {}", message.received_date_time, message.subject);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::GraphConfig;
use crate::error::{truncate_body, Error, Result};
use crate::token::TokenCache;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

/// Fields requested for each listed message.
const MESSAGE_FIELDS: &str = "id,subject,bodyPreview,receivedDateTime";
/// Color preset used when creating a category.
const CATEGORY_COLOR: &str = "preset0";

/// One mailbox item as returned by the mail source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Opaque message identifier, unique within a fetched batch.
    pub id: String,
    /// Subject line; empty when absent.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub subject: String,
    /// Plain-text preview of the body; empty when absent.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body_preview: String,
    /// Received timestamp, passed through unparsed.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub received_date_time: String,
}

impl Message {
    /// Creates a message.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        subject: impl Into<String>,
        body_preview: impl Into<String>,
        received_date_time: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            body_preview: body_preview.into(),
            received_date_time: received_date_time.into(),
        }
    }

    /// Returns the text scanned for indicators: subject and body preview
    /// joined by a single space.
    #[must_use]
    pub fn search_text(&self) -> String {
        format!("{} {}", self.subject, self.body_preview)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Mailbox operations the scan pipeline depends on.
///
/// Every operation may fail with a transport or status error; the pipeline
/// decides per phase whether that is fatal.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Lists up to `top` of the most recent messages in `mailbox`.
    async fn list_messages(&self, mailbox: &str, top: u32) -> Result<Vec<Message>>;

    /// Makes sure `category` exists in the mailbox's category list. Idempotent.
    async fn ensure_category(&self, mailbox: &str, category: &str) -> Result<()>;

    /// Adds `category` to a message, keeping the categories it already has.
    async fn tag_message(&self, mailbox: &str, message_id: &str, category: &str) -> Result<()>;

    /// Sends an HTML email from `mailbox` to `to`.
    async fn send_mail(&self, mailbox: &str, to: &str, subject: &str, html_body: &str)
        -> Result<()>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct MessagePage {
    #[serde(default)]
    value: Vec<Message>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MasterCategory {
    display_name: String,
}

#[derive(Deserialize)]
struct CategoryList {
    #[serde(default)]
    value: Vec<MasterCategory>,
}

#[derive(Deserialize, Serialize)]
struct MessageCategories {
    #[serde(default)]
    categories: Vec<String>,
}

/// Microsoft Graph implementation of [`MailSource`].
///
/// Holds one HTTP client and the token cache for its lifetime; create one per run.
pub struct GraphClient {
    http: reqwest::Client,
    config: GraphConfig,
    token: Mutex<TokenCache>,
}

impl GraphClient {
    /// Creates a client. No network call is made until the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the HTTP client cannot be built, or
    /// [`Error::InvalidConfig`] for an unusable proxy.
    pub fn new(config: GraphConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("threat-sweep/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(proxy.to_reqwest()?);
        }

        let http = builder
            .build()
            .map_err(|source| Error::HttpClient { source })?;

        Ok(Self {
            http,
            config,
            token: Mutex::new(TokenCache::default()),
        })
    }

    /// Returns the configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Returns a bearer token, refreshing it when missing or close to expiry.
    ///
    /// The cache lock is held across the refresh so concurrent callers wait
    /// for a single token request.
    async fn access_token(&self) -> Result<SecretString> {
        let mut cache = self.token.lock().await;

        if let Some(token) = cache.fresh(Instant::now()) {
            return Ok(token.clone());
        }

        cache.clear();
        let (token, expires_in) = self.request_token().await?;
        cache.store(token.clone(), expires_in, Instant::now());
        Ok(token)
    }

    #[instrument(
        name = "GraphClient::request_token",
        skip_all,
        fields(tenant_id = %self.config.tenant_id, client_id = %self.config.client_id)
    )]
    async fn request_token(&self) -> Result<(SecretString, Duration)> {
        debug!("Requesting access token");

        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret()),
            ("scope", self.config.scope.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let timeout = self.config.timeouts.token;
        let request = self.http.post(self.config.token_url()).form(&form);
        let (status, body) = tokio::time::timeout(timeout, read_response(request))
            .await
            .map_err(|_| Error::Timeout {
                operation: "token request",
                timeout,
            })?
            .map_err(|source| Error::TokenRequest { source })?;

        if !status.is_success() {
            return Err(Error::TokenRejected {
                status,
                body: truncate_body(&body),
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|source| Error::TokenDecode { source })?;

        debug!(expires_in = token.expires_in, "Access token acquired");

        Ok((
            SecretString::from(token.access_token),
            Duration::from_secs(token.expires_in),
        ))
    }

    /// Builds `{graph_base}/users/{mailbox}/{segments...}` with each segment percent-encoded.
    fn user_url(&self, mailbox: &str, segments: &[&str]) -> Result<Url> {
        let invalid = || Error::InvalidConfig {
            message: format!("graph_base is not a usable base URL: {}", self.config.graph_base),
        };

        let mut url = Url::parse(&self.config.graph_base).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .push("users")
            .push(mailbox)
            .extend(segments);
        Ok(url)
    }

    /// Runs one authorized Graph call and returns its body.
    ///
    /// Sending and reading the body share one timeout; a non-success status
    /// becomes [`Error::GraphStatus`].
    async fn call<F>(&self, operation: &'static str, build: F) -> Result<String>
    where
        F: FnOnce(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let timeout = self.config.timeouts.graph;

        let token = self.access_token().await?;
        let request = build(&self.http).bearer_auth(token.expose_secret());

        let (status, body) = tokio::time::timeout(timeout, read_response(request))
            .await
            .map_err(|_| Error::Timeout { operation, timeout })?
            .map_err(|source| Error::GraphRequest { operation, source })?;

        if status.is_success() {
            return Ok(body);
        }

        Err(Error::GraphStatus {
            operation,
            status,
            body: truncate_body(&body),
        })
    }

    fn decode<T: serde::de::DeserializeOwned>(operation: &'static str, body: &str) -> Result<T> {
        serde_json::from_str(body).map_err(|source| Error::GraphDecode { operation, source })
    }
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MailSource for GraphClient {
    #[instrument(name = "GraphClient::list_messages", skip_all, fields(mailbox = %mailbox, top = top))]
    async fn list_messages(&self, mailbox: &str, top: u32) -> Result<Vec<Message>> {
        let mut url = self.user_url(mailbox, &["messages"])?;
        url.query_pairs_mut()
            .append_pair("$top", &top.to_string())
            .append_pair("$select", MESSAGE_FIELDS)
            .append_pair("$orderby", "receivedDateTime desc");

        let body = self
            .call("list_messages", |http| http.get(url))
            .await?;
        let page: MessagePage = Self::decode("list_messages", &body)?;

        debug!(count = page.value.len(), "Listed messages");
        Ok(page.value)
    }

    #[instrument(
        name = "GraphClient::ensure_category",
        skip_all,
        fields(mailbox = %mailbox, category = %category)
    )]
    async fn ensure_category(&self, mailbox: &str, category: &str) -> Result<()> {
        let url = self.user_url(mailbox, &["outlook", "masterCategories"])?;

        let body = self
            .call("list_categories", |http| http.get(url.clone()))
            .await?;
        let existing: CategoryList = Self::decode("list_categories", &body)?;

        if existing
            .value
            .iter()
            .any(|c| same_category(&c.display_name, category))
        {
            debug!("Category already present");
            return Ok(());
        }

        let body = json!({ "displayName": category, "color": CATEGORY_COLOR });
        match self
            .call("create_category", |http| http.post(url).json(&body))
            .await
        {
            Ok(_) => {
                debug!("Category created");
                Ok(())
            }
            Err(Error::GraphStatus { status, .. }) if status == reqwest::StatusCode::CONFLICT => {
                debug!("Category created concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(
        name = "GraphClient::tag_message",
        skip_all,
        fields(mailbox = %mailbox, message_id = %message_id, category = %category)
    )]
    async fn tag_message(&self, mailbox: &str, message_id: &str, category: &str) -> Result<()> {
        let url = self.user_url(mailbox, &["messages", message_id])?;

        let mut read_url = url.clone();
        read_url.query_pairs_mut().append_pair("$select", "categories");
        let body = self
            .call("read_categories", |http| http.get(read_url))
            .await?;
        let mut current: MessageCategories = Self::decode("read_categories", &body)?;

        if !merge_category(&mut current.categories, category) {
            debug!("Message already tagged");
            return Ok(());
        }

        self.call("tag_message", |http| http.patch(url).json(&current))
            .await?;

        debug!("Message tagged");
        Ok(())
    }

    #[instrument(
        name = "GraphClient::send_mail",
        skip_all,
        fields(mailbox = %mailbox, to = %to)
    )]
    async fn send_mail(
        &self,
        mailbox: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<()> {
        let url = self.user_url(mailbox, &["sendMail"])?;

        let body = json!({
            "message": {
                "subject": subject,
                "body": { "contentType": "HTML", "content": html_body },
                "toRecipients": [{ "emailAddress": { "address": to } }],
            },
            "saveToSentItems": false,
        });

        self.call("send_mail", |http| http.post(url).json(&body))
            .await?;

        debug!("Summary mail sent");
        Ok(())
    }
}

/// Sends `request` and reads the whole body.
async fn read_response(
    request: reqwest::RequestBuilder,
) -> std::result::Result<(reqwest::StatusCode, String), reqwest::Error> {
    let response = request.send().await?;
    let status = response.status();
    Ok((status, response.text().await?))
}

/// Outlook matches category names without regard to ASCII case.
fn same_category(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Appends `category` unless an equal name is already present.
///
/// Returns `true` if the list changed. Existing entries and their order are kept.
fn merge_category(categories: &mut Vec<String>, category: &str) -> bool {
    if categories.iter().any(|c| same_category(c, category)) {
        return false;
    }
    categories.push(category.to_string());
    true
}
