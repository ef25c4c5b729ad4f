//! The scan pipeline: collect → fetch → match → tag → report.
//!
//! Validation happens earlier, when the [`ScanConfig`] is built, so every run
//! starts from valid parameters and no network call precedes it.
//!
//! Failure policy per phase:
//!
//! | phase   | on failure                                                  |
//! |---------|-------------------------------------------------------------|
//! | collect | run fails ([`Phase::Collect`]); empty set ends the run early |
//! | fetch   | run fails ([`Phase::Fetch`])                                |
//! | tag     | tagging stops, summary skipped, [`ScanOutcome::TagFailed`]   |
//! | report  | recorded in [`ReportStatus::Failed`], run still completes    |
//!
//! Tags applied before a failure are never rolled back.

use crate::config::ScanConfig;
use crate::error::{Error, Phase, Result};
use crate::feed::IndicatorCollector;
use crate::graph::{MailSource, Message};
use crate::matcher::IndicatorMatcher;
use crate::report;
use tracing::{debug, info, instrument, warn};

/// A message that matched at least one indicator.
///
/// Fields are copied from the [`Message`] at detection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    /// Identifier of the matching message.
    pub message_id: String,
    /// Subject of the matching message.
    pub subject: String,
    /// Received timestamp, unparsed.
    pub received_date_time: String,
}

impl Hit {
    /// Creates a hit.
    #[must_use]
    pub fn new(
        message_id: impl Into<String>,
        subject: impl Into<String>,
        received_date_time: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            subject: subject.into(),
            received_date_time: received_date_time.into(),
        }
    }
}

impl From<&Message> for Hit {
    fn from(message: &Message) -> Self {
        Self::new(
            message.id.clone(),
            message.subject.clone(),
            message.received_date_time.clone(),
        )
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum ScanOutcome {
    /// No indicators were collected; the mailbox was not touched.
    NoIndicators,
    /// All phases that had work to do succeeded.
    Completed,
    /// Tagging stopped at the contained error; earlier tags remain applied.
    TagFailed(Error),
}

/// What happened to the summary email.
#[derive(Debug)]
pub enum ReportStatus {
    /// No recipient was configured.
    NotRequested,
    /// A recipient was configured but there were no hits to report.
    NothingToReport,
    /// Skipped because tagging failed.
    Skipped,
    /// Summary sent.
    Sent,
    /// Sending failed; the run is still considered complete.
    Failed(Error),
}

/// Result of one pipeline run.
#[derive(Debug)]
pub struct ScanReport {
    /// Mailbox that was scanned.
    pub mailbox: String,
    /// Number of domain indicators collected.
    pub domains: usize,
    /// Number of IPv4 indicators collected.
    pub ipv4s: usize,
    /// Number of messages fetched and scanned.
    pub scanned: usize,
    /// Matching messages, in mailbox order.
    pub hits: Vec<Hit>,
    /// Number of hits successfully tagged.
    pub tagged: usize,
    /// How the run ended.
    pub outcome: ScanOutcome,
    /// What happened to the summary email.
    pub report: ReportStatus,
}

impl ScanReport {
    fn new(mailbox: &str, domains: usize, ipv4s: usize) -> Self {
        Self {
            mailbox: mailbox.to_string(),
            domains,
            ipv4s,
            scanned: 0,
            hits: Vec::new(),
            tagged: 0,
            outcome: ScanOutcome::Completed,
            report: ReportStatus::NotRequested,
        }
    }

    /// Returns `true` unless tagging failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, ScanOutcome::TagFailed(_))
    }
}

/// Runs the scan pipeline against a collector and a mail source.
///
/// # Example
///
/// ```no_run
/// use threat_sweep::{FeedCollector, GraphClient, GraphConfig, ScanConfig, Scanner};
///
/// # async fn example() -> threat_sweep::Result<()> {
/// let graph_config = GraphConfig::load("config.json")?;
/// let collector = FeedCollector::with_default_sources(&graph_config.timeouts, None)?;
/// let mail = GraphClient::new(graph_config)?;
///
/// let config = ScanConfig::builder().mailbox("soc@example.com").build()?;
/// let report = Scanner::new(&collector, &mail).run(&config).await?;
/// println!("{} hits", report.hits.len());
/// # Ok(())
/// # }
/// ```
pub struct Scanner<'a> {
    collector: &'a dyn IndicatorCollector,
    mail: &'a dyn MailSource,
}

impl<'a> Scanner<'a> {
    /// Creates a scanner.
    #[must_use]
    pub fn new(collector: &'a dyn IndicatorCollector, mail: &'a dyn MailSource) -> Self {
        Self { collector, mail }
    }

    /// Runs one scan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Phase`] when collection or message listing fails.
    /// Tagging and reporting failures are carried in the returned [`ScanReport`].
    #[instrument(
        name = "Scanner::run",
        skip_all,
        fields(mailbox = %config.mailbox(), top = config.top(), category = %config.category())
    )]
    pub async fn run(&self, config: &ScanConfig) -> Result<ScanReport> {
        let indicators = self
            .collector
            .collect()
            .await
            .map_err(|e| e.in_phase(Phase::Collect))?;

        let (domains, ipv4s) = indicators.counts();
        let mut report = ScanReport::new(config.mailbox(), domains, ipv4s);

        if indicators.is_empty() {
            info!("No indicators collected, nothing to scan");
            report.outcome = ScanOutcome::NoIndicators;
            return Ok(report);
        }

        let messages = self
            .mail
            .list_messages(config.mailbox(), config.top())
            .await
            .map_err(|e| e.in_phase(Phase::Fetch))?;
        report.scanned = messages.len();

        let matcher = IndicatorMatcher::new(&indicators);
        report.hits = find_hits(&messages, &matcher);

        info!(
            scanned = report.scanned,
            hits = report.hits.len(),
            "Matched messages against indicators"
        );

        if report.hits.is_empty() {
            if config.summary_to().is_some() {
                report.report = ReportStatus::NothingToReport;
            }
            return Ok(report);
        }

        if let Err(e) = self.tag_hits(config, &report.hits, &mut report.tagged).await {
            warn!(
                error = %e.full_message(),
                tagged = report.tagged,
                remaining = report.hits.len() - report.tagged,
                "Tagging aborted"
            );
            report.outcome = ScanOutcome::TagFailed(e.in_phase(Phase::Tag));
            if config.summary_to().is_some() {
                report.report = ReportStatus::Skipped;
            }
            return Ok(report);
        }

        if let Some(to) = config.summary_to() {
            report.report = self.send_summary(config, to, &report.hits).await;
        }

        Ok(report)
    }

    /// Ensures the category if requested, then tags every hit in order.
    ///
    /// Stops at the first failure; `tagged` counts the successes before it.
    async fn tag_hits(&self, config: &ScanConfig, hits: &[Hit], tagged: &mut usize) -> Result<()> {
        if config.ensure_category() {
            self.mail
                .ensure_category(config.mailbox(), config.category())
                .await?;
        }

        for hit in hits {
            self.mail
                .tag_message(config.mailbox(), &hit.message_id, config.category())
                .await?;
            *tagged += 1;
        }

        info!(tagged = *tagged, "Tagged matching messages");
        Ok(())
    }

    async fn send_summary(&self, config: &ScanConfig, to: &str, hits: &[Hit]) -> ReportStatus {
        let subject = report::summary_subject(hits.len(), config.category());
        let body = report::render_summary(hits, config.category(), chrono::Utc::now());

        match self
            .mail
            .send_mail(config.mailbox(), to, &subject, &body)
            .await
        {
            Ok(()) => {
                info!(to = %to, "Summary sent");
                ReportStatus::Sent
            }
            Err(e) => {
                warn!(to = %to, error = %e.full_message(), "Summary could not be sent");
                ReportStatus::Failed(e.in_phase(Phase::Report))
            }
        }
    }
}

/// Tests each message's subject and body preview, keeping mailbox order.
#[must_use]
pub fn find_hits(messages: &[Message], matcher: &IndicatorMatcher) -> Vec<Hit> {
    messages
        .iter()
        .filter(|message| match matcher.find_match(&message.search_text()) {
            Some(indicator) => {
                debug!(
                    message_id = %message.id,
                    indicator = %indicator,
                    kind = %indicator.kind(),
                    "Message matched indicator"
                );
                true
            }
            None => false,
        })
        .map(Hit::from)
        .collect()
}
