//! Command-line interface of the `threat-sweep` binary.

use crate::config::{ScanConfig, DEFAULT_CATEGORY, DEFAULT_TOP};
use crate::error::Result;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Log filter used when `RUST_LOG` is not set and no `-v` is given.
pub const DEFAULT_LOG_FILTER: &str = "threat_sweep=info";

/// Command-line options.
///
/// Range and format checks are left to [`ScanConfig::builder`] so the binary
/// and library reject the same inputs with the same errors.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Tag mailbox messages that mention indicators from public threat feeds"
)]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, value_name = "PATH", default_value = "config.json")]
    pub config: PathBuf,

    /// Mailbox (user principal name) to scan.
    #[arg(long, value_name = "EMAIL")]
    pub user: String,

    /// Number of most recent messages to scan (1-1000).
    #[arg(long, default_value_t = i64::from(DEFAULT_TOP), allow_negative_numbers = true)]
    pub top: i64,

    /// Outlook category applied to matching messages.
    #[arg(long, default_value = DEFAULT_CATEGORY)]
    pub category: String,

    /// Create the category in the mailbox's master list if it is missing.
    #[arg(long)]
    pub ensure_category: bool,

    /// Send an HTML summary of matches to this address.
    #[arg(long, value_name = "EMAIL")]
    pub summary_to: Option<String>,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Builds the validated scan parameters.
    ///
    /// # Errors
    ///
    /// Returns the validation error of the first invalid option.
    pub fn scan_config(&self) -> Result<ScanConfig> {
        let mut builder = ScanConfig::builder()
            .mailbox(&self.user)
            .top(self.top)
            .category(&self.category)
            .ensure_category(self.ensure_category);

        if let Some(to) = &self.summary_to {
            builder = builder.summary_to(to);
        }

        builder.build()
    }

    /// Log filter directive for the chosen verbosity.
    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => DEFAULT_LOG_FILTER,
            1 => "threat_sweep=debug",
            _ => "threat_sweep=trace",
        }
    }
}
