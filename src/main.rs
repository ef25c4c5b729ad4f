use clap::Parser;
use std::process::ExitCode;
use threat_sweep::cli::Cli;
use threat_sweep::{
    FeedCollector, GraphClient, GraphConfig, Phase, ReportStatus, ScanOutcome, ScanReport,
    Scanner,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing(&cli);

    tokio::select! {
        result = run(&cli) => match result {
            Ok(report) => {
                print_report(&report);
                if report.is_success() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            Err(e) => {
                eprintln!("error: {}", e.full_message());
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::debug!("Interrupted");
            ExitCode::FAILURE
        }
    }
}

/// `-v` overrides `RUST_LOG`; without it the environment wins over the default.
fn init_tracing(cli: &Cli) {
    let filter = if cli.verbose > 0 {
        EnvFilter::new(cli.log_filter())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

async fn run(cli: &Cli) -> threat_sweep::Result<ScanReport> {
    let scan_config = cli
        .scan_config()
        .map_err(|e| e.in_phase(Phase::Validate))?;
    let graph_config = GraphConfig::load(&cli.config)?;

    let collector =
        FeedCollector::with_default_sources(&graph_config.timeouts, graph_config.proxy.as_ref())?;
    let mail = GraphClient::new(graph_config)?;

    Scanner::new(&collector, &mail).run(&scan_config).await
}

fn print_report(report: &ScanReport) {
    println!(
        "indicators: {} domains, {} IPv4 addresses",
        report.domains, report.ipv4s
    );

    if matches!(report.outcome, ScanOutcome::NoIndicators) {
        println!("no indicators collected, mailbox {} not scanned", report.mailbox);
        return;
    }

    println!("scanned {} messages in {}", report.scanned, report.mailbox);
    println!("hits: {}", report.hits.len());
    for hit in &report.hits {
        println!(
            "  {} | {} | {}",
            hit.received_date_time, hit.subject, hit.message_id
        );
    }
    println!("tagged: {}/{}", report.tagged, report.hits.len());

    if let ScanOutcome::TagFailed(e) = &report.outcome {
        eprintln!("error: {}", e.full_message());
    }

    match &report.report {
        ReportStatus::NotRequested => {}
        ReportStatus::NothingToReport => println!("summary: nothing to report"),
        ReportStatus::Skipped => println!("summary: skipped after tagging failure"),
        ReportStatus::Sent => println!("summary: sent"),
        ReportStatus::Failed(e) => eprintln!("summary: not sent: {}", e.full_message()),
    }
}
