//! Federation ingestion pipeline
//!
//! Entry point for activities delivered at-least-once and in no
//! particular order. One call per activity:
//! classify, coordinate (lock + tombstone), materialize, then hand
//! everything slow to the job queue. Handlers live in their own
//! submodules; this module owns the pipeline struct and dispatch.

pub mod classifier;
pub mod collaborators;
pub mod envelope;
pub mod resolver;
pub mod sidefx;

mod deletion;
mod materializer;
mod share;

use std::sync::Arc;

use crate::config::IngestConfig;
use crate::coord::{ActivityLock, TombstoneCache};
use crate::data::{Account, Database, Status};
use crate::error::Result;
use crate::metrics::ACTIVITIES_PROCESSED_TOTAL;

use classifier::{classify, ActivityKind};
use collaborators::{DomainPolicy, Notifier, RemoteFetcher, StatusRemover};
use envelope::InboundActivity;
use resolver::RemoteReferenceResolver;
use sidefx::JobQueue;

/// Why an activity produced no row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Origin account is suspended; its content is silently dropped
    SuppressedOrigin,
    /// A deletion for this object already went through
    Tombstoned,
    /// Another worker holds the activity lock
    LockContended,
    /// A share whose original could not be obtained
    Unresolvable,
    /// Deletion claimed by an account that does not own the status
    OwnershipMismatch,
    /// Verb/object combination the pipeline does not handle
    Unsupported,
}

impl SkipReason {
    fn label(&self) -> &'static str {
        match self {
            SkipReason::SuppressedOrigin => "suppressed_origin",
            SkipReason::Tombstoned => "tombstoned",
            SkipReason::LockContended => "lock_contended",
            SkipReason::Unresolvable => "unresolvable",
            SkipReason::OwnershipMismatch => "ownership_mismatch",
            SkipReason::Unsupported => "unsupported",
        }
    }
}

/// Result of processing one activity. Redelivery of an already-applied
/// activity is a success (`created: false`), never an error.
#[derive(Debug)]
pub enum Outcome {
    /// A status row exists for this activity
    Materialized { status: Status, created: bool },
    /// An existing status was removed
    Removed,
    /// Nothing to remove yet; a tombstone now guards the id
    Tombstoned,
    /// No row change
    Skipped(SkipReason),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Materialized { created: true, .. } => "created",
            Outcome::Materialized { created: false, .. } => "deduplicated",
            Outcome::Removed => "removed",
            Outcome::Tombstoned => "tombstoned",
            Outcome::Skipped(reason) => reason.label(),
        }
    }
}

/// Per-call processing options.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Stamp the status with the current time instead of the declared
    /// publication time, and distribute it onward. Used for content this
    /// instance originates rather than backfills.
    pub override_timestamps: bool,
}

/// The pipeline. One instance serves any number of concurrent callers;
/// all coordination state lives behind the injected collaborators.
pub struct IngestPipeline {
    db: Arc<Database>,
    resolver: RemoteReferenceResolver,
    lock: Arc<dyn ActivityLock>,
    tombstones: Arc<dyn TombstoneCache>,
    fetcher: Arc<dyn RemoteFetcher>,
    remover: Arc<dyn StatusRemover>,
    notifier: Arc<dyn Notifier>,
    domain_policy: Arc<dyn DomainPolicy>,
    jobs: Arc<dyn JobQueue>,
    config: IngestConfig,
}

impl IngestPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        config: IngestConfig,
        lock: Arc<dyn ActivityLock>,
        tombstones: Arc<dyn TombstoneCache>,
        fetcher: Arc<dyn RemoteFetcher>,
        remover: Arc<dyn StatusRemover>,
        notifier: Arc<dyn Notifier>,
        domain_policy: Arc<dyn DomainPolicy>,
        jobs: Arc<dyn JobQueue>,
    ) -> Self {
        let resolver = RemoteReferenceResolver::new(Arc::clone(&db), config.local_domain.clone());

        Self {
            db,
            resolver,
            lock,
            tombstones,
            fetcher,
            remover,
            notifier,
            domain_policy,
            jobs,
            config,
        }
    }

    /// Process one delivered activity from `origin`.
    ///
    /// # Errors
    /// Returns an error only on infrastructure failure (database,
    /// config). Every expected federation condition maps to an
    /// [`Outcome`] so redelivery logic upstream can stay dumb.
    pub async fn process(
        &self,
        activity: &InboundActivity,
        origin: &Account,
        options: &IngestOptions,
    ) -> Result<Outcome> {
        let outcome = match classify(activity) {
            ActivityKind::Creation => self.handle_creation(activity, origin, options).await?,
            ActivityKind::Share => self.handle_share(activity, origin, options).await?,
            ActivityKind::Deletion => self.handle_deletion(activity, origin).await?,
            ActivityKind::Unsupported => {
                tracing::debug!(activity_id = %activity.id, "unsupported activity, ignoring");
                Outcome::Skipped(SkipReason::Unsupported)
            }
        };

        ACTIVITIES_PROCESSED_TOTAL
            .with_label_values(&[activity.verb.as_str(), outcome.label()])
            .inc();

        Ok(outcome)
    }

    pub fn resolver(&self) -> &RemoteReferenceResolver {
        &self.resolver
    }
}
