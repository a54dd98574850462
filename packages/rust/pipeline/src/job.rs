//! End-to-end follow-up job: page contacts → fan out to workers → record
//! outcomes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::{error, info, instrument};

use courier_gateway::{ContactSource, RetryPolicy, with_retry};
use courier_shared::{
    Contact, Correlation, DeliveryOutcome, ErrorDetail, JobConfig, Result, ResultRecord,
};

use crate::notifier::Notifier;
use crate::pool::run_with_concurrency;
use crate::sink::ResultSink;

// ---------------------------------------------------------------------------
// JobSummary
// ---------------------------------------------------------------------------

/// Summary of a completed follow-up run.
#[derive(Debug, Clone)]
pub struct JobSummary {
    /// Pages fetched, including the empty terminal page if any.
    pub pages: u32,
    /// Contacts that reached a terminal outcome.
    pub processed: usize,
    pub sent: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Outcome lines that could not be written to the sink (degraded run).
    pub sink_failures: usize,
    /// Total duration of the run.
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a fetched page enters processing.
    fn page_started(&self, page: u32, count: usize);
    /// Called when the run completes.
    fn done(&self, summary: &JobSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn page_started(&self, _page: u32, _count: usize) {}
    fn done(&self, _summary: &JobSummary) {}
}

// ---------------------------------------------------------------------------
// FollowupJob
// ---------------------------------------------------------------------------

/// The pipeline orchestrator: pagination driver, worker fan-out, and
/// outcome recording.
pub struct FollowupJob {
    source: ContactSource,
    notifier: Arc<Notifier>,
    sink: Arc<ResultSink>,
    config: JobConfig,
}

#[derive(Default)]
struct Totals {
    processed: AtomicUsize,
    sent: AtomicUsize,
    skipped: AtomicUsize,
    errors: AtomicUsize,
    sink_failures: AtomicUsize,
}

impl FollowupJob {
    pub fn new(
        source: ContactSource,
        notifier: Notifier,
        sink: ResultSink,
        config: JobConfig,
    ) -> Self {
        Self {
            source,
            notifier: Arc::new(notifier),
            sink: Arc::new(sink),
            config,
        }
    }

    /// Run the pipeline to exhaustion of the contact source.
    ///
    /// Per-item failures become `error` records and never halt the run
    /// (fail-soft); only a page fetch that exhausts its retries is
    /// run-fatal, since it means the work source itself is unreachable.
    #[instrument(skip_all)]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<JobSummary> {
        let start = Instant::now();
        let retry = RetryPolicy::new(self.config.max_retries, self.config.base_backoff_ms);
        let totals = Arc::new(Totals::default());

        let mut cursor: Option<String> = None;
        let mut page_number: u32 = 0;

        info!(
            page_size = self.config.page_size,
            concurrency = self.config.concurrency,
            max_retries = self.config.max_retries,
            "starting follow-up run"
        );

        loop {
            page_number += 1;

            let page = with_retry("fetch-contacts-page", &retry, || {
                self.source
                    .fetch_page(cursor.as_deref(), self.config.page_size)
            })
            .await?;

            if page.contacts.is_empty() {
                info!(page = page_number, "page empty, ending run");
                break;
            }

            progress.page_started(page_number, page.contacts.len());
            info!(
                page = page_number,
                count = page.contacts.len(),
                "processing page"
            );

            let notifier = self.notifier.clone();
            let sink = self.sink.clone();
            let page_totals = totals.clone();
            run_with_concurrency(
                page.contacts,
                self.config.concurrency,
                move |contact: Contact| {
                    let notifier = notifier.clone();
                    let sink = sink.clone();
                    let totals = page_totals.clone();
                    async move {
                        process_one(&notifier, &sink, &totals, contact, page_number).await;
                    }
                },
            )
            .await;

            cursor = page.next_cursor;
            if cursor.is_none() {
                info!(page = page_number, "no next cursor, ending run");
                break;
            }
        }

        let summary = JobSummary {
            pages: page_number,
            processed: totals.processed.load(Ordering::SeqCst),
            sent: totals.sent.load(Ordering::SeqCst),
            skipped: totals.skipped.load(Ordering::SeqCst),
            errors: totals.errors.load(Ordering::SeqCst),
            sink_failures: totals.sink_failures.load(Ordering::SeqCst),
            elapsed: start.elapsed(),
        };

        progress.done(&summary);
        info!(
            pages = summary.pages,
            processed = summary.processed,
            sent = summary.sent,
            skipped = summary.skipped,
            errors = summary.errors,
            sink_failures = summary.sink_failures,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "follow-up run complete"
        );

        Ok(summary)
    }
}

/// Process one contact to a recorded outcome. Never returns an error: a
/// notifier failure becomes an `error` record, and a sink failure is
/// counted as a degraded write without blocking sibling items.
async fn process_one(
    notifier: &Notifier,
    sink: &ResultSink,
    totals: &Totals,
    contact: Contact,
    page: u32,
) {
    let contact_id = contact.id.clone();
    let phone = contact.phone.clone();

    let outcome = match notifier.process(&contact).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(
                contact_id = contact_id.as_deref(),
                error = %e,
                "contact processing failed"
            );
            DeliveryOutcome::Error {
                detail: ErrorDetail {
                    message: e.to_string(),
                    status: e.status(),
                    code: e.code().map(String::from),
                },
                correlation: Correlation {
                    order_id: contact_id.clone(),
                    ..Correlation::default()
                },
            }
        }
    };

    match &outcome {
        DeliveryOutcome::Sent { .. } => totals.sent.fetch_add(1, Ordering::SeqCst),
        DeliveryOutcome::Skipped { .. } => totals.skipped.fetch_add(1, Ordering::SeqCst),
        DeliveryOutcome::Error { .. } => totals.errors.fetch_add(1, Ordering::SeqCst),
    };
    totals.processed.fetch_add(1, Ordering::SeqCst);

    let record = ResultRecord {
        contact_id,
        phone,
        page,
        outcome,
    };
    if let Err(e) = sink.append(&record).await {
        totals.sink_failures.fetch_add(1, Ordering::SeqCst);
        error!(error = %e, "failed to append result record");
    }
}
