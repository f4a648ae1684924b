//! Backup command implementation

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

use crate::client::RestClient;
use crate::extract::config::MAX_WORKERS;
use crate::extract::{BackupRequest, ExtractConfig, ExtractReport, ParallelOrchestrator};
use crate::storage::SqliteStore;
use crate::ContentType;

use super::CliError;

/// Parse and validate the worker count.
fn parse_workers(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("workers must be at least 1".to_string());
    }
    if value > MAX_WORKERS {
        return Err(format!("workers {value} exceeds maximum of {MAX_WORKERS}"));
    }
    Ok(value)
}

/// Parse a cutoff from YYYY-MM-DD or RFC3339 datetime format.
///
/// Date-only input uses start-of-day UTC.
fn parse_updated_after(input: &str) -> Result<DateTime<Utc>, String> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| format!("invalid datetime '{input}': {e}"))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid datetime '{input}'"))?;
    Ok(datetime.and_utc())
}

/// Output formats for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Human,
    /// Machine-readable JSON
    Json,
}

/// Content backup tool for hosted BI platforms
#[derive(Parser, Debug)]
#[command(name = "bivault", version, about)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format for results
    #[arg(long, global = true, value_enum, default_value = "human")]
    pub output_format: OutputFormat,

    /// API base URL (e.g., https://bi.example.com/api/v1)
    #[arg(long, global = true, env = "BIVAULT_BASE_URL")]
    pub base_url: Option<String>,

    /// API bearer token
    #[arg(long, global = true, env = "BIVAULT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// SQLite database path
    #[arg(long, global = true, default_value = "bivault.db")]
    pub db: PathBuf,
}

impl Cli {
    /// Build an API client from the global connection arguments.
    pub fn client(&self) -> Result<RestClient, CliError> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| {
                CliError::InvalidArgument(
                    "missing API base URL (--base-url or BIVAULT_BASE_URL)".to_string(),
                )
            })?;
        let token = self.token.as_deref().ok_or_else(|| {
            CliError::InvalidArgument("missing API token (--token or BIVAULT_TOKEN)".to_string())
        })?;
        Ok(RestClient::new(base_url, token)?)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up content from the remote platform into local SQLite
    Backup(BackupArgs),

    /// List folders visible to the authenticated user
    Folders(super::FoldersArgs),

    /// Show what the local database holds
    Status(super::StatusArgs),
}

/// Backup command arguments
#[derive(Parser, Debug)]
pub struct BackupArgs {
    /// Content type to back up, or "all"
    #[arg(long, default_value = "all")]
    pub content_type: String,

    /// Number of worker threads (default: 4, max: 50)
    ///
    /// Higher values increase throughput for large deployments. The shared
    /// rate limiter coordinates all workers to stay within API limits.
    #[arg(long, default_value = "4", value_parser = parse_workers)]
    pub workers: usize,

    /// Items requested per page
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u64).range(1..=1000))]
    pub stride: u64,

    /// Request budget per minute across all workers
    #[arg(long, default_value = "120")]
    pub requests_per_minute: usize,

    /// Request budget per second across all workers
    #[arg(long, default_value = "10")]
    pub requests_per_second: usize,

    /// Disable adaptive backoff on server 429 responses
    #[arg(long, default_value_t = false)]
    pub no_adaptive: bool,

    /// Partition work by folder instead of a single offset stream
    #[arg(long, default_value_t = false)]
    pub by_folder: bool,

    /// Use the queued producer/consumer pipeline instead of range claiming
    #[arg(long, default_value_t = false, conflicts_with = "by_folder")]
    pub queued: bool,

    /// Only back up items modified after this date (YYYY-MM-DD or RFC3339)
    #[arg(long, value_parser = parse_updated_after)]
    pub updated_after: Option<DateTime<Utc>>,

    /// Comma-separated field projection forwarded to the API
    #[arg(long)]
    pub fields: Option<String>,
}

impl BackupArgs {
    fn content_types(&self) -> Result<Vec<ContentType>, CliError> {
        if self.content_type.eq_ignore_ascii_case("all") {
            return Ok(ContentType::ALL.to_vec());
        }
        let content_type = ContentType::from_str(&self.content_type)
            .map_err(CliError::InvalidArgument)?;
        Ok(vec![content_type])
    }

    fn extract_config(&self) -> ExtractConfig {
        ExtractConfig {
            workers: self.workers,
            stride: self.stride,
            requests_per_minute: self.requests_per_minute,
            requests_per_second: self.requests_per_second,
            adaptive_rate_limiting: !self.no_adaptive,
        }
    }

    /// Execute the backup command.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let client = cli.client()?;
        let store = SqliteStore::open(&cli.db)?;
        let config = self.extract_config();

        let mut total_items = 0u64;
        let mut total_errors = 0u64;

        for content_type in self.content_types()? {
            if self.by_folder && !content_type.is_folder_scoped() {
                info!("Skipping {}: not folder-scoped", content_type);
                continue;
            }

            let orchestrator = ParallelOrchestrator::new(&client, &store, config.clone())?;
            let mut request = BackupRequest::new(content_type);
            request.fields = self.fields.clone();
            request.updated_after = self.updated_after;

            let report = self.run_with_progress(&orchestrator, &request)?;
            self.print_report(cli, content_type, &report);
            total_items += report.items_processed;
            total_errors += report.snapshot.errors;
        }

        info!("Backup finished: {} items, {} errors", total_items, total_errors);
        if total_errors > 0 {
            return Err(CliError::CompletedWithErrors(total_errors));
        }
        Ok(())
    }

    /// Run one extraction while ticking a progress bar off the live metrics.
    fn run_with_progress(
        &self,
        orchestrator: &ParallelOrchestrator<'_>,
        request: &BackupRequest,
    ) -> Result<ExtractReport, CliError> {
        let metrics = orchestrator.metrics();
        let pb = create_progress_bar(request.content_type);
        let finished = AtomicBool::new(false);

        let result = std::thread::scope(|scope| {
            let monitor = scope.spawn(|| {
                while !finished.load(Ordering::Acquire) {
                    let snapshot = metrics.snapshot();
                    if let Some(total) = snapshot.total_by_type.get(&request.content_type) {
                        pb.set_length(*total);
                    }
                    pb.set_position(snapshot.total);
                    std::thread::sleep(Duration::from_millis(200));
                }
            });

            let result = if self.by_folder {
                orchestrator.run_by_folder(request)
            } else if self.queued {
                orchestrator.run_push(request)
            } else {
                orchestrator.run(request)
            };

            finished.store(true, Ordering::Release);
            let _ = monitor.join();
            result
        });

        let report = result?;
        pb.finish_with_message(format!(
            "{}: {} items",
            request.content_type, report.items_processed
        ));
        Ok(report)
    }

    fn print_report(&self, cli: &Cli, content_type: ContentType, report: &ExtractReport) {
        match cli.output_format {
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string_pretty(&report.snapshot) {
                    println!("{json}");
                }
            }
            OutputFormat::Human => {
                println!(
                    "{}: {} items in {:.1}s ({:.1} items/s), {} batches, {} errors",
                    content_type,
                    report.items_processed,
                    report.snapshot.duration_seconds,
                    report.snapshot.items_per_second,
                    report.snapshot.batches_completed,
                    report.snapshot.errors
                );
                if let Some(stats) = &report.folder_stats {
                    for (folder, folder_stats) in stats {
                        println!(
                            "  folder {}: {} ranges claimed",
                            folder, folder_stats.total_claimed
                        );
                    }
                }
            }
        }
    }
}

/// Create a progress bar for one content type.
fn create_progress_bar(content_type: ContentType) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("hardcoded template is valid")
            .progress_chars("#>-"),
    );
    pb.set_message(format!("Backing up {}", content_type));
    pb
}
