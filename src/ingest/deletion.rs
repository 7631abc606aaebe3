//! Deletion handling
//!
//! A delete either removes a status we hold, or, when the create has
//! not arrived yet, leaves a tombstone so the late create is dropped
//! when it does. Deletes claimed by an account that does not own the
//! status are ignored.

use crate::coord::lock_key;
use crate::data::Account;
use crate::error::Result;
use crate::metrics::LOCK_CONTENTION_TOTAL;

use super::envelope::InboundActivity;
use super::{IngestPipeline, Outcome, SkipReason};

impl IngestPipeline {
    pub(super) async fn handle_deletion(
        &self,
        activity: &InboundActivity,
        origin: &Account,
    ) -> Result<Outcome> {
        let key = lock_key(activity.verb.as_str(), &activity.id);
        let Some(_guard) = self.lock.try_acquire(&key, self.config.lock_wait()).await else {
            LOCK_CONTENTION_TOTAL
                .with_label_values(&[activity.verb.as_str()])
                .inc();
            return Ok(Outcome::Skipped(SkipReason::LockContended));
        };

        match self.resolver.resolve_with_candidates(&activity.id).await? {
            Some(status) => {
                if status.account_id != origin.id {
                    tracing::debug!(
                        activity_id = %activity.id,
                        status_id = %status.id,
                        claimed_by = %origin.address(),
                        "delete from non-owner, ignoring"
                    );
                    return Ok(Outcome::Skipped(SkipReason::OwnershipMismatch));
                }

                self.remover.remove(&status).await?;
                // Tombstone the removed id too, so a redelivered create
                // for the same object stays dead.
                self.tombstones
                    .mark_deleted(&origin.id, &activity.id, self.config.tombstone_ttl())
                    .await;

                tracing::info!(
                    status_id = %status.id,
                    uri = %status.uri,
                    "status removed"
                );
                Ok(Outcome::Removed)
            }
            None => {
                self.tombstones
                    .mark_deleted(&origin.id, &activity.id, self.config.tombstone_ttl())
                    .await;
                tracing::debug!(activity_id = %activity.id, "delete for unknown status, tombstoned");
                Ok(Outcome::Tombstoned)
            }
        }
    }
}
