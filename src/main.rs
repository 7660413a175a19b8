//! CLI entry point: download reports for the configured accounts, or render
//! HTML/PDF summaries from already-persisted data.

use ads_report_dl::config::Config;
use ads_report_dl::db::Database;
use ads_report_dl::export::SummaryExporter;
use ads_report_dl::fetcher::HttpReportFetcher;
use ads_report_dl::processor::ReportProcessor;
use ads_report_dl::types::{AccountId, DateRange, RelativeRange, ReportType};
use ads_report_dl::util::{parse_compact_date, read_account_ids_file};
use ads_report_dl::{Error, cancel_on_signal};
use anyhow::{Context, bail};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Advertising report batch downloader", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long)]
    file: PathBuf,

    /// Start date (YYYYMMDD); requires --end-date
    #[arg(long, requires = "end_date", conflicts_with = "date_range")]
    start_date: Option<String>,

    /// End date (YYYYMMDD); requires --start-date
    #[arg(long, requires = "start_date", conflicts_with = "date_range")]
    end_date: Option<String>,

    /// Named date range (e.g. YESTERDAY, LAST_7_DAYS, LAST_MONTH)
    #[arg(long)]
    date_range: Option<String>,

    /// File with one account id per line; overrides the configured accounts
    #[arg(long)]
    account_ids_file: Option<PathBuf>,

    /// Info-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Debug-level logging
    #[arg(long)]
    debug: bool,

    /// Render summaries from persisted data instead of downloading:
    /// takes the HTML template and the output directory
    #[arg(long, num_args = 2, value_names = ["TEMPLATE", "OUTDIR"])]
    generate_pdf: Option<Vec<PathBuf>>,
}

impl Cli {
    /// Date range from the flags, falling back to the configured default
    fn resolve_date_range(&self, config: &Config) -> Result<DateRange, Error> {
        if let (Some(start), Some(end)) = (&self.start_date, &self.end_date) {
            let start = parse_compact_date("start-date", start)?;
            let end = parse_compact_date("end-date", end)?;
            if start > end {
                return Err(Error::config(
                    "start-date",
                    "start date must not be after end date",
                ));
            }
            return Ok(DateRange::Custom { start, end });
        }
        if let Some(name) = &self.date_range {
            let range: RelativeRange = name
                .parse()
                .map_err(|_| Error::config("date-range", format!("unknown date range '{name}'")))?;
            return Ok(DateRange::Relative(range));
        }
        Ok(config
            .reporting
            .date_range
            .unwrap_or(DateRange::Relative(RelativeRange::Yesterday)))
    }

    /// Accounts from the ids file when given, otherwise from the config
    async fn resolve_accounts(&self, config: &Config) -> Result<Vec<AccountId>, Error> {
        if let Some(path) = &self.account_ids_file {
            return read_account_ids_file(path).await;
        }
        let ids: Vec<AccountId> = config
            .reporting
            .account_ids
            .iter()
            .map(|id| AccountId(*id))
            .collect();
        if ids.is_empty() {
            return Err(Error::config(
                "reporting.account_ids",
                "no accounts configured; pass --account-ids-file or set reporting.account_ids",
            ));
        }
        Ok(ids)
    }
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ads_report_dl={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = Arc::new(
        Config::load(&cli.file)
            .await
            .with_context(|| format!("loading {}", cli.file.display()))?,
    );

    let accounts = cli.resolve_accounts(&config).await?;
    let date_range = cli.resolve_date_range(&config)?;
    let db = Arc::new(
        Database::new(&config.persistence.database_path)
            .await
            .context("opening database")?,
    );

    if let Some(args) = &cli.generate_pdf {
        // clap guarantees exactly two values
        let (template, out_dir) = (&args[0], &args[1]);
        let (from, to) = date_range.resolve(Utc::now().date_naive());

        let exporter = SummaryExporter::new(db, &config.export);
        let written = exporter
            .export(
                template,
                out_dir,
                &accounts,
                ReportType::AccountPerformanceReport,
                from,
                to,
            )
            .await
            .context("rendering summaries")?;

        println!("Wrote {} summary files to {}", written.len(), out_dir.display());
        return Ok(());
    }

    let fetcher = Arc::new(HttpReportFetcher::new(&config.api)?);
    let processor = ReportProcessor::new(fetcher, db, Arc::clone(&config));
    cancel_on_signal(processor.cancel_token());

    let summary = processor.run(&accounts, &date_range).await?;

    println!(
        "Tasks: {} succeeded, {} failed, {} cancelled",
        summary.succeeded, summary.failed, summary.cancelled
    );
    println!(
        "Rows: {} persisted, {} skipped",
        summary.rows_persisted, summary.rows_skipped
    );
    for outcome in summary.outcomes.iter().filter(|o| !o.is_success()) {
        if let ads_report_dl::TaskResult::Failed { error } = &outcome.result {
            eprintln!(
                "FAILED {} {}: {}",
                outcome.account_id, outcome.report_type, error
            );
        }
    }

    if summary.exceeds_threshold(config.reporting.failure_rate_threshold) {
        bail!(
            "failure rate {:.2} exceeds threshold {:.2}",
            summary.failure_rate(),
            config.reporting.failure_rate_threshold
        );
    }
    Ok(())
}
