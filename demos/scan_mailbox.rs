//! Example: Running the scan pipeline against a custom mail source.
//!
//! The mailbox here is an in-memory [`MailSource`] that prints what it would
//! do, and the indicators come from a fixed collector, so this runs offline.
//! Swap in [`threat_sweep::GraphClient`] and [`threat_sweep::FeedCollector`]
//! for a real mailbox.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=threat_sweep=debug cargo run --example scan_mailbox
//! ```

use async_trait::async_trait;
use threat_sweep::{
    Indicator, IndicatorCollector, IndicatorSet, MailSource, Message, ReportStatus, ScanConfig,
    ScanOutcome, Scanner,
};
use tracing_subscriber::EnvFilter;

/// Indicators known ahead of time instead of downloaded.
struct FixedIndicators;

#[async_trait]
impl IndicatorCollector for FixedIndicators {
    async fn collect(&self) -> threat_sweep::Result<IndicatorSet> {
        Ok(["evil.example.com", "203.0.113.7"]
            .into_iter()
            .filter_map(|raw| Indicator::domain(raw).or_else(|| Indicator::ipv4(raw)))
            .collect())
    }
}

/// A mailbox that lives in memory and logs every write to stdout.
struct PrintingMailbox {
    messages: Vec<Message>,
}

#[async_trait]
impl MailSource for PrintingMailbox {
    async fn list_messages(&self, _mailbox: &str, top: u32) -> threat_sweep::Result<Vec<Message>> {
        Ok(self.messages.iter().take(top as usize).cloned().collect())
    }

    async fn ensure_category(&self, mailbox: &str, category: &str) -> threat_sweep::Result<()> {
        println!("[{mailbox}] ensure category '{category}'");
        Ok(())
    }

    async fn tag_message(
        &self,
        mailbox: &str,
        message_id: &str,
        category: &str,
    ) -> threat_sweep::Result<()> {
        println!("[{mailbox}] tag {message_id} with '{category}'");
        Ok(())
    }

    async fn send_mail(
        &self,
        mailbox: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> threat_sweep::Result<()> {
        println!("[{mailbox}] mail to {to}: {subject}\n{html_body}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> threat_sweep::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("threat_sweep=info")),
        )
        .init();

    let mailbox = PrintingMailbox {
        messages: vec![
            Message::new("1", "Invoice overdue", "pay at https://evil.example.com/pay", "2024-05-03T10:00:00Z"),
            Message::new("2", "Lunch?", "noon at the usual place", "2024-05-03T09:00:00Z"),
            Message::new("3", "Firewall alert", "blocked 203.0.113.7:443", "2024-05-02T18:30:00Z"),
        ],
    };

    let config = ScanConfig::builder()
        .mailbox("soc@example.com")
        .ensure_category(true)
        .summary_to("analyst@example.com")
        .build()?;

    let report = Scanner::new(&FixedIndicators, &mailbox).run(&config).await?;

    println!(
        "scanned {} messages, {} hits, {} tagged",
        report.scanned,
        report.hits.len(),
        report.tagged
    );

    if let ScanOutcome::TagFailed(e) = &report.outcome {
        eprintln!("tagging failed: {}", e.full_message());
    }
    if let ReportStatus::Failed(e) = &report.report {
        eprintln!("summary failed: {}", e.full_message());
    }

    Ok(())
}
