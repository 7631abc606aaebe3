//! Pipeline collaborators
//!
//! Seams for everything the pipeline needs but does not own: remote
//! object retrieval, status removal side effects, notification fan-out
//! and per-domain federation policy. The pipeline only ever sees these
//! traits; production wiring decides what stands behind them.

use async_trait::async_trait;
use std::sync::Arc;

use crate::data::{Account, Database, Status};
use crate::error::Result;

/// Retrieval of not-yet-known remote objects.
///
/// Implementations are expected to persist what they fetch, so a `Some`
/// return is a row the caller can reference immediately.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch a remote status by URI, optionally via its fetchable URL.
    /// `None` means the object is gone, unreachable or not a status.
    async fn fetch_status<'a>(&self, uri: &str, href: Option<&'a str>) -> Result<Option<Status>>;

    /// Fetch a remote actor by URI.
    async fn fetch_account(&self, uri: &str) -> Result<Option<Account>>;
}

/// Full removal of a status and its dependents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusRemover: Send + Sync {
    async fn remove(&self, status: &Status) -> Result<()>;
}

/// Event worth telling a local account about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    Reblog,
}

/// Notification fan-out for events that target local accounts directly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, account_id: &str, status_id: &str, event: NotifyEvent) -> Result<()>;
}

/// Per-domain federation policy lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DomainPolicy: Send + Sync {
    /// Whether media and emoji downloads from this domain are blocked.
    async fn reject_media(&self, domain: &str) -> Result<bool>;
}

// =============================================================================
// Database-backed implementations
// =============================================================================

/// Removal backed by the local database; dependent rows go via
/// ON DELETE CASCADE.
pub struct DbStatusRemover {
    db: Arc<Database>,
}

impl DbStatusRemover {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StatusRemover for DbStatusRemover {
    async fn remove(&self, status: &Status) -> Result<()> {
        self.db.delete_status(&status.id).await
    }
}

/// Policy lookups against the domain_policies table. Unlisted domains
/// get the permissive default.
pub struct DbDomainPolicy {
    db: Arc<Database>,
}

impl DbDomainPolicy {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DomainPolicy for DbDomainPolicy {
    async fn reject_media(&self, domain: &str) -> Result<bool> {
        Ok(self
            .db
            .get_domain_policy(domain)
            .await?
            .map(|policy| policy.reject_media)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::connect(&temp_dir.path().join("collaborators.db"))
            .await
            .unwrap();
        (Arc::new(db), temp_dir)
    }

    fn policy_row(domain: &str, reject_media: bool) -> crate::data::DomainPolicyRow {
        crate::data::DomainPolicyRow {
            domain: domain.to_string(),
            reject_media,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn unlisted_domain_gets_permissive_media_policy() {
        let (db, _temp_dir) = create_test_db().await;
        let policy = DbDomainPolicy::new(Arc::clone(&db));

        assert!(!policy.reject_media("friendly.example").await.unwrap());

        db.upsert_domain_policy(&policy_row("hostile.example", true))
            .await
            .unwrap();
        assert!(policy.reject_media("hostile.example").await.unwrap());

        db.upsert_domain_policy(&policy_row("hostile.example", false))
            .await
            .unwrap();
        assert!(!policy.reject_media("hostile.example").await.unwrap());
    }
}
