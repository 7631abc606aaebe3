//! Deferred side-effect dispatch
//!
//! Everything that must not run inside the materialization transaction
//! is enqueued after commit as a job. Enqueueing is synchronous and
//! non-blocking; workers drain the queue out of band and failures there
//! never unwind an already-committed status.

use serde::{Deserialize, Serialize};

use crate::metrics::JOBS_ENQUEUED_TOTAL;

/// Post-commit work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Job {
    /// Resolve a declared but unresolved reply target, then link the
    /// status into its thread
    ResolveThread { status_id: String, target_uri: String },
    /// Fetch preview cards for links in the status body
    CrawlLinks { status_id: String },
    /// Download one remote media attachment
    DownloadMedia { attachment_id: String },
    /// Re-download a custom emoji icon that changed upstream
    RefreshEmoji { emoji_id: String },
    /// Fan the status out to follower timelines and peers
    Distribute { status_id: String },
    /// Notify a local account about an event on their content
    Notify {
        account_id: String,
        status_id: String,
        event: String,
    },
}

impl Job {
    /// Metric label for this job kind.
    pub fn name(&self) -> &'static str {
        match self {
            Job::ResolveThread { .. } => "resolve_thread",
            Job::CrawlLinks { .. } => "crawl_links",
            Job::DownloadMedia { .. } => "download_media",
            Job::RefreshEmoji { .. } => "refresh_emoji",
            Job::Distribute { .. } => "distribute",
            Job::Notify { .. } => "notify",
        }
    }
}

/// Job sink. `enqueue` must not block or fail; an implementation that
/// loses jobs under pressure is acceptable, one that stalls ingestion
/// is not.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: Job);
}

/// Queue over an unbounded channel; the receiving half belongs to
/// whatever worker pool the embedding process runs.
pub struct MpscJobQueue {
    sender: tokio::sync::mpsc::UnboundedSender<Job>,
}

impl MpscJobQueue {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<Job>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl JobQueue for MpscJobQueue {
    fn enqueue(&self, job: Job) {
        JOBS_ENQUEUED_TOTAL.with_label_values(&[job.name()]).inc();

        // A closed receiver means shutdown; dropping the job is fine.
        if let Err(error) = self.sender.send(job) {
            tracing::debug!("job queue closed, dropping {}", error.0.name());
        }
    }
}
