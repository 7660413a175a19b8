//! # ads-report-dl
//!
//! Batch downloader for advertising performance reports.
//!
//! Downloads CSV performance reports for a set of advertiser accounts, maps
//! each row to a typed entity via static per-report schemas, and persists the
//! entities to a local SQLite store with upsert semantics so re-runs never
//! duplicate data. An optional export step renders per-account HTML (and PDF)
//! summaries from the persisted entities.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ads_report_dl::config::Config;
//! use ads_report_dl::db::Database;
//! use ads_report_dl::fetcher::HttpReportFetcher;
//! use ads_report_dl::processor::ReportProcessor;
//! use ads_report_dl::types::{AccountId, DateRange, RelativeRange};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::load(Path::new("config.json")).await?);
//!     let db = Arc::new(Database::new(&config.persistence.database_path).await?);
//!     let fetcher = Arc::new(HttpReportFetcher::new(&config.api)?);
//!
//!     let processor = ReportProcessor::new(fetcher, db, config);
//!     let summary = processor
//!         .run(
//!             &[AccountId(1234567890)],
//!             &DateRange::Relative(RelativeRange::Yesterday),
//!         )
//!         .await?;
//!     println!("{} tasks succeeded", summary.succeeded);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// HTML summary rendering and PDF conversion
pub mod export;
/// Report download over HTTP
pub mod fetcher;
/// CSV row to entity mapping
pub mod mapper;
/// Batch orchestration across accounts and report types
pub mod processor;
/// Retry logic with exponential backoff
pub mod retry;
/// Static per-report property/column schemas
pub mod schema;
/// Core types
pub mod types;
/// Input parsing helpers
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{DatabaseError, Error, FetchError, MappingError, Result};
pub use fetcher::{HttpReportFetcher, ReportFetcher, ReportPayload};
pub use processor::ReportProcessor;
pub use types::{
    AccountId, DateRange, FieldValue, RelativeRange, ReportEntity, ReportType, RunSummary,
    TaskOutcome, TaskResult,
};

/// Wait for a termination signal, then cancel the processor's token so
/// in-flight tasks drain before the run returns.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown requested; letting in-flight tasks finish");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
