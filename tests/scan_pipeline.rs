//! Pipeline tests against in-memory collaborators.
//!
//! The mailbox and the feed collector are replaced by fakes so that every
//! phase and failure policy can be exercised without network access. The live
//! feed test is opt-in:
//!
//! ```bash
//! cargo test --features live-feeds -- --ignored
//! ```

use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;
use threat_sweep::{
    Error, GraphConfig, Indicator, IndicatorCollector, IndicatorSet, MailSource, Message, Phase,
    ReportStatus, Result, ScanConfig, ScanOutcome, Scanner,
};

// ─────────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────────

struct StaticCollector {
    indicators: Option<IndicatorSet>,
}

impl StaticCollector {
    fn with(indicators: &[Indicator]) -> Self {
        Self {
            indicators: Some(indicators.iter().cloned().collect()),
        }
    }

    fn failing() -> Self {
        Self { indicators: None }
    }
}

#[async_trait]
impl IndicatorCollector for StaticCollector {
    async fn collect(&self) -> Result<IndicatorSet> {
        self.indicators.clone().ok_or_else(|| Error::Collection {
            message: "no feed sources configured".into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    List(u32),
    Ensure(String),
    Tag(String, String),
    Send { to: String, subject: String },
}

#[derive(Default)]
struct RecordingMailbox {
    messages: Vec<Message>,
    calls: Mutex<Vec<Call>>,
    fail_list: bool,
    fail_ensure: bool,
    fail_tag_on: Option<String>,
    fail_send: bool,
    html: Mutex<Option<String>>,
}

impl RecordingMailbox {
    fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn tagged(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Tag(id, _) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn timeout(operation: &'static str) -> Error {
    Error::Timeout {
        operation,
        timeout: Duration::from_secs(30),
    }
}

#[async_trait]
impl MailSource for RecordingMailbox {
    async fn list_messages(&self, _mailbox: &str, top: u32) -> Result<Vec<Message>> {
        self.record(Call::List(top));
        if self.fail_list {
            return Err(timeout("list messages"));
        }
        Ok(self.messages.iter().take(top as usize).cloned().collect())
    }

    async fn ensure_category(&self, _mailbox: &str, category: &str) -> Result<()> {
        self.record(Call::Ensure(category.to_string()));
        if self.fail_ensure {
            return Err(timeout("ensure category"));
        }
        Ok(())
    }

    async fn tag_message(&self, _mailbox: &str, message_id: &str, category: &str) -> Result<()> {
        if self.fail_tag_on.as_deref() == Some(message_id) {
            return Err(timeout("tag message"));
        }
        self.record(Call::Tag(message_id.to_string(), category.to_string()));
        Ok(())
    }

    async fn send_mail(
        &self,
        _mailbox: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<()> {
        self.record(Call::Send {
            to: to.to_string(),
            subject: subject.to_string(),
        });
        *self.html.lock().unwrap() = Some(html_body.to_string());
        if self.fail_send {
            return Err(timeout("send mail"));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn indicators() -> Vec<Indicator> {
    vec![
        Indicator::domain("evil.example.com").unwrap(),
        Indicator::domain("bad-site.net").unwrap(),
        Indicator::ipv4("203.0.113.7").unwrap(),
    ]
}

/// Three hits (m1, m3, m4) interleaved with clean messages.
fn mailbox_messages() -> Vec<Message> {
    vec![
        Message::new("m1", "Invoice", "pay at https://evil.example.com/pay", "2024-05-03T10:00:00Z"),
        Message::new("m2", "Lunch", "see you at noon", "2024-05-03T09:00:00Z"),
        Message::new("m3", "Connection from 203.0.113.7", "", "2024-05-02T10:00:00Z"),
        Message::new("m4", "<b>bad-site.net</b>", "click", "2024-05-01T10:00:00Z"),
        Message::new("m5", "notevil.example.com", "evil.example.com.bad", "2024-04-30T10:00:00Z"),
    ]
}

fn config() -> ScanConfig {
    ScanConfig::builder()
        .mailbox("soc@example.com")
        .build()
        .unwrap()
}

fn config_with_summary() -> ScanConfig {
    ScanConfig::builder()
        .mailbox("soc@example.com")
        .summary_to("analyst@example.com")
        .build()
        .unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_empty_indicator_set_never_touches_mailbox() {
    let collector = StaticCollector::with(&[]);
    let mailbox = RecordingMailbox::with_messages(mailbox_messages());

    let report = Scanner::new(&collector, &mailbox)
        .run(&config_with_summary())
        .await
        .unwrap();

    assert!(matches!(report.outcome, ScanOutcome::NoIndicators));
    assert!(report.is_success());
    assert!(mailbox.calls().is_empty());
    assert_eq!(report.scanned, 0);
}

#[tokio::test]
async fn test_full_run_tags_hits_in_order_and_sends_summary() {
    let collector = StaticCollector::with(&indicators());
    let mailbox = RecordingMailbox::with_messages(mailbox_messages());

    let report = Scanner::new(&collector, &mailbox)
        .run(&config_with_summary())
        .await
        .unwrap();

    assert_eq!((report.domains, report.ipv4s), (2, 1));
    assert_eq!(report.scanned, 5);
    let hit_ids: Vec<&str> = report.hits.iter().map(|h| h.message_id.as_str()).collect();
    assert_eq!(hit_ids, ["m1", "m3", "m4"]);
    assert_eq!(report.tagged, 3);
    assert!(matches!(report.outcome, ScanOutcome::Completed));
    assert!(matches!(report.report, ReportStatus::Sent));

    assert_eq!(
        mailbox.calls(),
        vec![
            Call::List(50),
            Call::Tag("m1".into(), "Suspect-IOC".into()),
            Call::Tag("m3".into(), "Suspect-IOC".into()),
            Call::Tag("m4".into(), "Suspect-IOC".into()),
            Call::Send {
                to: "analyst@example.com".into(),
                subject: "[threat-sweep] 3 messages tagged 'Suspect-IOC'".into(),
            },
        ]
    );

    let html = mailbox.html.lock().unwrap().clone().unwrap();
    assert!(html.contains("&lt;b&gt;bad-site.net&lt;/b&gt;"));
    assert!(html.find("Invoice").unwrap() < html.find("Connection from").unwrap());
}

#[tokio::test]
async fn test_tag_failure_keeps_earlier_tags_and_skips_summary() {
    let collector = StaticCollector::with(&indicators());
    let mailbox = RecordingMailbox {
        fail_tag_on: Some("m3".into()),
        ..RecordingMailbox::with_messages(mailbox_messages())
    };

    let report = Scanner::new(&collector, &mailbox)
        .run(&config_with_summary())
        .await
        .unwrap();

    assert_eq!(report.hits.len(), 3);
    assert_eq!(report.tagged, 1);
    assert_eq!(mailbox.tagged(), ["m1"]);
    assert!(!report.is_success());

    match &report.outcome {
        ScanOutcome::TagFailed(e) => {
            assert_eq!(e.phase(), Some(Phase::Tag));
            assert!(e.to_string().starts_with("tag phase failed"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert!(matches!(report.report, ReportStatus::Skipped));
    assert!(!mailbox
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Send { .. })));
}

#[tokio::test]
async fn test_collection_failure_is_collect_phase() {
    let collector = StaticCollector::failing();
    let mailbox = RecordingMailbox::default();

    let err = Scanner::new(&collector, &mailbox)
        .run(&config())
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Collect));
    assert!(mailbox.calls().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_is_fetch_phase() {
    let collector = StaticCollector::with(&indicators());
    let mailbox = RecordingMailbox {
        fail_list: true,
        ..RecordingMailbox::default()
    };

    let err = Scanner::new(&collector, &mailbox)
        .run(&config())
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Fetch));
    assert!(err.full_message().contains("list messages timed out"));
}

#[tokio::test]
async fn test_ensure_category_only_with_flag_and_hits() {
    let collector = StaticCollector::with(&indicators());
    let flagged = ScanConfig::builder()
        .mailbox("soc@example.com")
        .category("IOC")
        .ensure_category(true)
        .build()
        .unwrap();

    let with_hits = RecordingMailbox::with_messages(mailbox_messages());
    Scanner::new(&collector, &with_hits)
        .run(&flagged)
        .await
        .unwrap();
    assert_eq!(with_hits.calls()[1], Call::Ensure("IOC".into()));

    let clean = RecordingMailbox::with_messages(vec![Message::new("c1", "hi", "", "")]);
    Scanner::new(&collector, &clean).run(&flagged).await.unwrap();
    assert_eq!(clean.calls(), vec![Call::List(50)]);

    let unflagged = RecordingMailbox::with_messages(mailbox_messages());
    Scanner::new(&collector, &unflagged)
        .run(&config())
        .await
        .unwrap();
    assert!(!unflagged
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Ensure(_))));
}

#[tokio::test]
async fn test_ensure_category_failure_aborts_tagging() {
    let collector = StaticCollector::with(&indicators());
    let mailbox = RecordingMailbox {
        fail_ensure: true,
        ..RecordingMailbox::with_messages(mailbox_messages())
    };
    let config = ScanConfig::builder()
        .mailbox("soc@example.com")
        .ensure_category(true)
        .summary_to("analyst@example.com")
        .build()
        .unwrap();

    let report = Scanner::new(&collector, &mailbox).run(&config).await.unwrap();

    assert_eq!(report.hits.len(), 3);
    assert_eq!(report.tagged, 0);
    assert!(!report.is_success());
    match &report.outcome {
        ScanOutcome::TagFailed(e) => {
            assert_eq!(e.phase(), Some(Phase::Tag));
            assert_eq!(
                e.full_message(),
                "tag phase failed: ensure category timed out after 30s"
            );
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(matches!(report.report, ReportStatus::Skipped));
    assert_eq!(
        mailbox.calls(),
        vec![Call::List(50), Call::Ensure("Suspect-IOC".into())]
    );
}

#[tokio::test]
async fn test_report_failure_keeps_run_completed() {
    let collector = StaticCollector::with(&indicators());
    let mailbox = RecordingMailbox {
        fail_send: true,
        ..RecordingMailbox::with_messages(mailbox_messages())
    };

    let report = Scanner::new(&collector, &mailbox)
        .run(&config_with_summary())
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(matches!(report.outcome, ScanOutcome::Completed));
    match &report.report {
        ReportStatus::Failed(e) => assert_eq!(e.phase(), Some(Phase::Report)),
        other => panic!("unexpected report status: {other:?}"),
    }
    assert_eq!(report.tagged, 3);
}

#[tokio::test]
async fn test_no_hits_sends_nothing() {
    let collector = StaticCollector::with(&indicators());
    let mailbox = RecordingMailbox::with_messages(vec![Message::new(
        "m5",
        "notevil.example.com",
        "evil.example.com.bad 203.0.113.70",
        "",
    )]);

    let report = Scanner::new(&collector, &mailbox)
        .run(&config_with_summary())
        .await
        .unwrap();

    assert!(report.hits.is_empty());
    assert!(matches!(report.report, ReportStatus::NothingToReport));
    assert_eq!(mailbox.calls(), vec![Call::List(50)]);
}

#[tokio::test]
async fn test_top_limits_fetch() {
    let collector = StaticCollector::with(&indicators());
    let mailbox = RecordingMailbox::with_messages(mailbox_messages());
    let config = ScanConfig::builder()
        .mailbox("soc@example.com")
        .top(2)
        .build()
        .unwrap();

    let report = Scanner::new(&collector, &mailbox).run(&config).await.unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(mailbox.calls()[0], Call::List(2));
    assert_eq!(mailbox.tagged(), ["m1"]);
}

#[test]
fn test_graph_config_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"tenant_id": "t", "client_id": "c", "client_secret": "s",
            "proxy": {{"host": "127.0.0.1", "port": 1080}}}}"#
    )
    .unwrap();

    let config = GraphConfig::load(file.path()).unwrap();
    assert_eq!(config.tenant_id, "t");
    assert_eq!(config.proxy.as_ref().map(|p| p.port), Some(1080));
    assert_eq!(
        config.token_url(),
        "https://login.microsoftonline.com/t/oauth2/v2.0/token"
    );
}

#[test]
fn test_graph_config_lists_missing_keys() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"client_id": null, "client_secret": "  "}}"#).unwrap();

    let err = GraphConfig::load(file.path()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "missing required configuration keys: tenant_id, client_id, client_secret"
    );
}

#[cfg(feature = "live-feeds")]
#[tokio::test]
#[ignore = "downloads the live abuse.ch feeds"]
async fn test_live_feeds_yield_indicators() {
    use threat_sweep::{FeedCollector, TimeoutConfig};

    let collector = FeedCollector::with_default_sources(&TimeoutConfig::default(), None).unwrap();
    let set = collector.collect().await.unwrap();
    assert!(!set.is_empty());
}
