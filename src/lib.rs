//! # threat-sweep
//!
//! Scans a Microsoft 365 mailbox for indicators of compromise published by
//! public threat feeds, tags matching messages with an Outlook category and
//! optionally mails an HTML summary.
//!
//! The pipeline runs in fixed phases:
//!
//! 1. **Validate**: the [`ScanConfig`] builder checks mailbox, `top`, category
//!    and recipient before anything touches the network.
//! 2. **Collect**: a [`FeedCollector`] downloads the URLhaus and Feodo Tracker
//!    feeds and builds a deduplicated [`IndicatorSet`]. A failing feed only
//!    loses its own contribution.
//! 3. **Fetch**: the most recent messages are listed through a [`MailSource`].
//! 4. **Match & tag**: subject and body preview are tested with
//!    boundary-delimited matching; hits are tagged in mailbox order.
//! 5. **Report**: a summary of the hits is sent to a recipient, if configured.
//!
//! ## Quick Start
//!
//! ```no_run
//! use threat_sweep::{FeedCollector, GraphClient, GraphConfig, ScanConfig, Scanner};
//!
//! # async fn example() -> threat_sweep::Result<()> {
//! let graph_config = GraphConfig::load("config.json")?;
//! let collector =
//!     FeedCollector::with_default_sources(&graph_config.timeouts, graph_config.proxy.as_ref())?;
//! let mail = GraphClient::new(graph_config)?;
//!
//! let config = ScanConfig::builder()
//!     .mailbox("soc@example.com")
//!     .top(100)
//!     .ensure_category(true)
//!     .summary_to("analyst@example.com")
//!     .build()?;
//!
//! let report = Scanner::new(&collector, &mail).run(&config).await?;
//! println!("{} of {} messages matched", report.hits.len(), report.scanned);
//! # Ok(())
//! # }
//! ```
//!
//! ## Matching
//!
//! ```
//! use threat_sweep::matcher::matches;
//! use threat_sweep::{Indicator, IndicatorSet};
//!
//! let set: IndicatorSet = Indicator::domain("domain.com").into_iter().collect();
//!
//! assert!(matches("visit domain.com now", &set));
//! assert!(!matches("visit notdomain.com now", &set));
//! assert!(!matches("visit domain.com.bad now", &set));
//! ```
//!
//! ## Error Handling
//!
//! Every error carries a coarse [`ErrorCategory`]. Errors raised inside the
//! pipeline are wrapped with the [`Phase`] they occurred in:
//!
//! ```
//! use threat_sweep::{Error, ErrorCategory, Phase};
//!
//! let error = Error::Collection { message: "no feed sources configured".into() }
//!     .in_phase(Phase::Collect);
//!
//! assert_eq!(error.phase(), Some(Phase::Collect));
//! assert!(error.to_string().starts_with("collect phase failed"));
//! assert_eq!(error.category(), ErrorCategory::Protocol);
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. Spans are named after the
//! operation that emits them:
//!
//! - `Scanner::run` - One pipeline run
//! - `FeedCollector::collect` / `FeedCollector::fetch_source` - Feed download
//! - `GraphClient::request_token` - Token acquisition
//! - `GraphClient::list_messages`, `GraphClient::ensure_category`,
//!   `GraphClient::tag_message`, `GraphClient::send_mail` - Graph calls
//!
//! Secrets (client secret, proxy password, access tokens) are never recorded.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod graph;
pub mod indicator;
pub mod matcher;
pub mod proxy;
pub mod report;
pub mod scan;

// Internal modules
mod token;

// Re-exports for ergonomic API
pub use config::{GraphConfig, ScanConfig, ScanConfigBuilder, TimeoutConfig};
pub use email_address::EmailAddress;
pub use error::{Error, ErrorCategory, Phase, Result};
pub use feed::{FeedCollector, FeedSource, IndicatorCollector};
pub use graph::{GraphClient, MailSource, Message};
pub use indicator::{Indicator, IndicatorKind, IndicatorSet};
pub use matcher::IndicatorMatcher;
pub use proxy::Socks5Proxy;
pub use scan::{Hit, ReportStatus, ScanOutcome, ScanReport, Scanner};
