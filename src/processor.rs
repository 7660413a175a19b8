//! Batch orchestration: expand accounts and report types into tasks, run
//! them on a bounded worker pool, and aggregate per-task outcomes
//!
//! One task downloads, maps, and persists one report for one account. Tasks
//! are independent: a failing task is recorded and the rest of the batch
//! keeps going. A task waiting out a retry backoff gives its concurrency
//! slot back for the duration of the sleep, so queued tasks start instead of
//! idling behind a timer. Cancellation stops handing out new tasks but lets
//! tasks that already hold a permit run to completion, so no report is left
//! half persisted mid-chunk.

use crate::config::{Config, ReportingConfig, RetryConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fetcher::{ReportFetcher, ReportPayload};
use crate::mapper::{self, HeaderIndex};
use crate::retry::with_retry_slotted;
use crate::schema::ReportSchema;
use crate::types::{
    AccountId, AccountTask, DateRange, ReportEntity, RowErrorPolicy, RunSummary, TaskOutcome,
    TaskResult,
};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

/// Runs one batch of report downloads across accounts
pub struct ReportProcessor {
    fetcher: Arc<dyn ReportFetcher>,
    db: Arc<Database>,
    config: Arc<Config>,
    cancel_token: CancellationToken,
}

impl ReportProcessor {
    /// Create a processor over a fetcher and an open database
    pub fn new(fetcher: Arc<dyn ReportFetcher>, db: Arc<Database>, config: Arc<Config>) -> Self {
        Self {
            fetcher,
            db,
            config,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Token that stops the batch when cancelled
    ///
    /// Cancellation is cooperative: tasks already running finish, tasks not
    /// yet started are counted as cancelled in the summary.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Expand accounts x configured report types into the task list
    ///
    /// Task order is deterministic: all report types for the first account,
    /// then the next account, in input order.
    fn build_tasks(reporting: &ReportingConfig, accounts: &[AccountId], range: &DateRange) -> Vec<AccountTask> {
        let mut tasks = Vec::with_capacity(accounts.len() * reporting.report_types.len());
        for account_id in accounts {
            for report_type in &reporting.report_types {
                tasks.push(AccountTask {
                    account_id: *account_id,
                    definition: ReportSchema::for_type(*report_type).definition(*range),
                });
            }
        }
        tasks
    }

    /// Run the batch to completion and return the aggregated summary
    ///
    /// Workers are limited by the configured concurrency. The call returns
    /// once every started task has reported its outcome.
    pub async fn run(&self, accounts: &[AccountId], range: &DateRange) -> Result<RunSummary> {
        let tasks = Self::build_tasks(&self.config.reporting, accounts, range);
        let total = tasks.len();

        tracing::info!(
            accounts = accounts.len(),
            report_types = self.config.reporting.report_types.len(),
            tasks = total,
            concurrency = self.config.reporting.concurrency,
            date_range = range.type_str(),
            "Starting report batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.reporting.concurrency));
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<TaskOutcome>(total.max(1));

        let mut summary = RunSummary::default();
        let mut started = 0usize;

        for task in tasks {
            // Stop handing out work once cancelled; in-flight tasks finish
            if self.cancel_token.is_cancelled() {
                summary.cancelled += 1;
                continue;
            }
            let permit = tokio::select! {
                _ = self.cancel_token.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                summary.cancelled += 1;
                continue;
            };

            started += 1;
            let ctx = TaskContext {
                fetcher: Arc::clone(&self.fetcher),
                db: Arc::clone(&self.db),
                semaphore: Arc::clone(&semaphore),
                retry: self.config.retry.clone(),
                chunk_size: self.config.reporting.chunk_size,
                policy: self.config.reporting.row_error_policy,
            };
            let tx = outcome_tx.clone();

            tokio::spawn(async move {
                let account_id = task.account_id;
                let report_type = task.definition.report_type;

                let result = run_task(&ctx, &task, permit).await;

                match &result {
                    TaskResult::Success {
                        rows_persisted,
                        rows_skipped,
                    } => tracing::info!(
                        account = %account_id,
                        report_type = %report_type,
                        rows_persisted,
                        rows_skipped,
                        "Report task complete"
                    ),
                    TaskResult::Failed { error } => tracing::error!(
                        account = %account_id,
                        report_type = %report_type,
                        error = %error,
                        "Report task failed"
                    ),
                }

                // Receiver only drops after the run loop finishes collecting
                let _ = tx
                    .send(TaskOutcome {
                        account_id,
                        report_type,
                        result,
                    })
                    .await;
            });
        }
        drop(outcome_tx);

        while let Some(outcome) = outcome_rx.recv().await {
            summary.record(outcome);
        }

        debug_assert_eq!(summary.completed(), started);

        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            rows_persisted = summary.rows_persisted,
            rows_skipped = summary.rows_skipped,
            "Report batch finished"
        );

        if summary.exceeds_threshold(self.config.reporting.failure_rate_threshold) {
            tracing::error!(
                failure_rate = summary.failure_rate(),
                threshold = self.config.reporting.failure_rate_threshold,
                "Failure rate exceeds the configured threshold"
            );
        }

        Ok(summary)
    }
}

/// Everything a spawned worker needs to run one task
struct TaskContext {
    fetcher: Arc<dyn ReportFetcher>,
    db: Arc<Database>,
    semaphore: Arc<Semaphore>,
    retry: RetryConfig,
    chunk_size: usize,
    policy: RowErrorPolicy,
}

/// Run one account task: fetch with retry, then map and persist the stream
///
/// The permit covers active work only. Backoff sleeps hand it back to the
/// pool and a fresh permit is acquired before the next attempt, so a
/// rate-limited task never blocks a queued one on its timer.
async fn run_task(
    ctx: &TaskContext,
    task: &AccountTask,
    permit: OwnedSemaphorePermit,
) -> TaskResult {
    let fetched = with_retry_slotted(&ctx.retry, &ctx.semaphore, permit, || {
        ctx.fetcher.fetch(task.account_id, &task.definition)
    })
    .await;

    let (payload, slot) = match fetched {
        Ok(pair) => pair,
        Err(e) => {
            return TaskResult::Failed {
                error: e.to_string(),
            };
        }
    };

    match persist_payload(ctx, task, payload, slot).await {
        Ok((rows_persisted, rows_skipped)) => TaskResult::Success {
            rows_persisted,
            rows_skipped,
        },
        Err(e) => TaskResult::Failed {
            error: e.to_string(),
        },
    }
}

/// Decode the payload line by line, map rows, and upsert in chunks
///
/// Returns `(rows_persisted, rows_skipped)`. Chunked writes bound memory for
/// large reports and keep each transaction small; re-running after a partial
/// failure is safe because chunks upsert on the natural key.
async fn persist_payload(
    ctx: &TaskContext,
    task: &AccountTask,
    payload: ReportPayload,
    slot: OwnedSemaphorePermit,
) -> Result<(u64, u64)> {
    let schema = ReportSchema::for_type(task.definition.report_type);
    let mut lines = payload.lines();

    // First non-blank line is the header; an empty body is a valid zero-row report
    let header = loop {
        let Some(line) = lines.next_line().await.map_err(Error::Io)? else {
            return Ok((0, 0));
        };
        if line.trim().is_empty() {
            continue;
        }
        let header = HeaderIndex::parse(&line).map_err(Error::Mapping)?;
        header.check_required(schema).map_err(Error::Mapping)?;
        break header;
    };

    let mut slot = slot;
    let mut chunk: Vec<ReportEntity> = Vec::with_capacity(ctx.chunk_size);
    let mut rows_persisted = 0u64;
    let mut rows_skipped = 0u64;
    let mut row = 0usize;

    while let Some(line) = lines.next_line().await.map_err(Error::Io)? {
        if line.trim().is_empty() {
            continue;
        }
        row += 1;

        let record = match mapper::parse_record(&line, row) {
            Ok(record) => record,
            Err(e) => match ctx.policy {
                RowErrorPolicy::SkipRow => {
                    tracing::warn!(
                        account = %task.account_id,
                        report_type = %task.definition.report_type,
                        row,
                        error = %e,
                        "Skipping undecodable row"
                    );
                    rows_skipped += 1;
                    continue;
                }
                RowErrorPolicy::AbortReport => return Err(Error::Mapping(e)),
            },
        };

        if mapper::is_summary_row(&record) {
            continue;
        }

        match mapper::map_row(schema, &header, row, &record, task.account_id) {
            Ok(entity) => chunk.push(entity),
            Err(e) => match ctx.policy {
                RowErrorPolicy::SkipRow => {
                    tracing::warn!(
                        account = %task.account_id,
                        report_type = %task.definition.report_type,
                        row,
                        error = %e,
                        "Skipping unmappable row"
                    );
                    rows_skipped += 1;
                }
                RowErrorPolicy::AbortReport => return Err(Error::Mapping(e)),
            },
        }

        if chunk.len() >= ctx.chunk_size {
            let (written, kept) = flush_chunk(ctx, slot, &chunk).await?;
            rows_persisted += written;
            slot = kept;
            chunk.clear();
        }
    }

    if !chunk.is_empty() {
        let (written, _slot) = flush_chunk(ctx, slot, &chunk).await?;
        rows_persisted += written;
    }

    Ok((rows_persisted, rows_skipped))
}

/// Upsert one chunk, retrying transient database errors (locked/busy) with
/// the concurrency slot handed back during each backoff sleep
async fn flush_chunk(
    ctx: &TaskContext,
    slot: OwnedSemaphorePermit,
    chunk: &[ReportEntity],
) -> Result<(u64, OwnedSemaphorePermit)> {
    with_retry_slotted(&ctx.retry, &ctx.semaphore, slot, || {
        ctx.db.upsert_entities(chunk)
    })
    .await
}
