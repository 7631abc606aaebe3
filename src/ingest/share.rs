//! Share (reblog) handling
//!
//! A share materializes as a wrapper row pointing at the original.
//! The original is obtained locally when possible, fetched otherwise;
//! an unobtainable original drops the share without error. Wrappers of
//! wrappers are unwrapped so a share always points at real content.

use crate::data::{Account, Status};
use crate::error::Result;

use super::collaborators::NotifyEvent;
use super::envelope::InboundActivity;
use super::materializer::CoreResult;
use super::{IngestOptions, IngestPipeline, Outcome, SkipReason};

/// Wrapper chains longer than this are treated as malformed.
const MAX_UNWRAP_DEPTH: usize = 4;

impl IngestPipeline {
    pub(super) async fn handle_share(
        &self,
        activity: &InboundActivity,
        origin: &Account,
        options: &IngestOptions,
    ) -> Result<Outcome> {
        if origin.suspended {
            tracing::debug!(
                activity_id = %activity.id,
                origin = %origin.address(),
                "origin suspended, dropping share"
            );
            return Ok(Outcome::Skipped(SkipReason::SuppressedOrigin));
        }

        let Some(target) = &activity.share_of else {
            tracing::debug!(activity_id = %activity.id, "share without target, dropping");
            return Ok(Outcome::Skipped(SkipReason::Unresolvable));
        };

        let known = self.resolver.resolve_with_candidates(&target.uri).await?;
        let original = match known {
            Some(status) => Some(status),
            None => {
                self.fetcher
                    .fetch_status(&target.uri, target.href.as_deref())
                    .await?
            }
        };

        let Some(original) = original else {
            tracing::debug!(
                activity_id = %activity.id,
                target = %target.uri,
                "share target unobtainable, dropping"
            );
            return Ok(Outcome::Skipped(SkipReason::Unresolvable));
        };

        let Some(original) = self.unwrap_to_content(original).await? else {
            return Ok(Outcome::Skipped(SkipReason::Unresolvable));
        };

        let result = self
            .materialize_core(activity, origin, Some(&original), options)
            .await?;

        if let CoreResult::Done {
            status,
            created: true,
        } = &result
        {
            self.notify_original_author(&original, status).await?;
        }

        Ok(result.into())
    }

    /// Follow wrapper rows until real content. Bounded, so a broken or
    /// cyclic chain resolves to nothing instead of looping.
    async fn unwrap_to_content(&self, mut status: Status) -> Result<Option<Status>> {
        for _ in 0..MAX_UNWRAP_DEPTH {
            let Some(target_id) = &status.reblog_of_id else {
                return Ok(Some(status));
            };

            match self.db.get_status(target_id).await? {
                Some(target) => status = target,
                None => {
                    tracing::debug!(status_id = %status.id, "wrapper target missing, dropping share");
                    return Ok(None);
                }
            }
        }

        tracing::debug!(status_id = %status.id, "wrapper chain too deep, dropping share");
        Ok(None)
    }

    async fn notify_original_author(&self, original: &Status, wrapper: &Status) -> Result<()> {
        let author = self.db.get_account(&original.account_id).await?;
        if let Some(author) = author {
            if author.is_local() {
                self.notifier
                    .notify(&author.id, &wrapper.id, NotifyEvent::Reblog)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use tempfile::TempDir;

    use crate::config::IngestConfig;
    use crate::coord::{InMemoryTombstones, KeyedLock};
    use crate::data::{
        Account, ConversationChoice, Database, EntityId, NewStatus,
    };
    use crate::ingest::collaborators::{
        MockDomainPolicy, MockNotifier, MockRemoteFetcher, MockStatusRemover,
    };
    use crate::ingest::envelope::{InboundActivity, ObjectRef, Verb};
    use crate::ingest::sidefx::MpscJobQueue;
    use crate::ingest::{IngestOptions, IngestPipeline, Outcome};

    async fn seed_account(db: &Database, username: &str, domain: Option<&str>) -> Account {
        let account = Account {
            id: EntityId::new().0,
            uri: format!(
                "https://{}/users/{}",
                domain.unwrap_or("example.com"),
                username
            ),
            username: username.to_string(),
            domain: domain.map(str::to_string),
            display_name: None,
            suspended: false,
            created_at: Utc::now(),
        };
        db.insert_account_if_missing(&account).await.unwrap();
        account
    }

    /// A share of an already-known original must not touch the fetcher,
    /// and must notify the local author exactly once.
    #[tokio::test]
    async fn known_original_is_not_refetched() {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&temp_dir.path().join("share.db"))
                .await
                .unwrap(),
        );

        let author = seed_account(&db, "carol", None).await;
        let original = db
            .materialize_status(&NewStatus {
                id: EntityId::new().0,
                uri: "https://example.com/users/carol/statuses/1".to_string(),
                text: "<p>mine</p>".to_string(),
                content_warning: None,
                visibility: "public".to_string(),
                language: None,
                account_id: author.id.clone(),
                in_reply_to_id: None,
                reblog_of_id: None,
                conversation: ConversationChoice::Local,
                local: true,
                created_at: Utc::now(),
                mention_account_ids: vec![],
                tag_names: vec![],
                media: vec![],
                emojis: vec![],
            })
            .await
            .unwrap()
            .status;

        // No expectations: any fetch call fails the test.
        let fetcher = MockRemoteFetcher::new();
        let remover = MockStatusRemover::new();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut policy = MockDomainPolicy::new();
        policy.expect_reject_media().returning(|_| Ok(false));

        let (queue, _jobs) = MpscJobQueue::new();
        let pipeline = IngestPipeline::new(
            Arc::clone(&db),
            IngestConfig {
                local_domain: "example.com".to_string(),
                tombstone_ttl_seconds: 3600,
                lock_wait_ms: 100,
                lock_hold_ttl_seconds: 60,
            },
            Arc::new(KeyedLock::new(Duration::from_secs(60))),
            Arc::new(InMemoryTombstones::new()),
            Arc::new(fetcher),
            Arc::new(remover),
            Arc::new(notifier),
            Arc::new(policy),
            Arc::new(queue),
        );

        let origin = seed_account(&db, "bob", Some("other.example")).await;
        let activity = InboundActivity::new("https://other.example/activities/s1", Verb::Share)
            .with_share_of(ObjectRef::new("https://example.com/users/carol/statuses/1"));

        let outcome = pipeline
            .process(&activity, &origin, &IngestOptions::default())
            .await
            .unwrap();

        match outcome {
            Outcome::Materialized { status, created } => {
                assert!(created);
                assert_eq!(status.reblog_of_id.as_deref(), Some(original.id.as_str()));
            }
            other => panic!("expected a wrapper, got {:?}", other),
        }
    }
}
