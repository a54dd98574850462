//! Pipeline orchestration for Courier follow-ups.
//!
//! Composes the gateway clients into the end-to-end run:
//! - [`select_conversation`] — pick the note target among a contact's conversations
//! - [`Notifier`] — the per-contact idempotent state machine
//! - [`run_with_concurrency`] — bounded worker pool over a shared queue
//! - [`ResultSink`] — append-only JSONL outcome log
//! - [`FollowupJob`] — pagination driver and orchestrator

pub mod job;
pub mod notifier;
pub mod pool;
pub mod selector;
pub mod sink;

pub use job::{FollowupJob, JobSummary, ProgressReporter, SilentProgress};
pub use notifier::Notifier;
pub use pool::run_with_concurrency;
pub use selector::{SelectOptions, select_conversation};
pub use sink::ResultSink;
