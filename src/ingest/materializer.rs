//! Status materialization
//!
//! The shared creation path behind both plain posts and share wrappers:
//! suppression checks, the per-activity lock, the post-lock existence
//! re-check, side-entity preparation, the atomic bundle write, and the
//! post-commit job fan-out. Holds the pipeline's core ordering rule:
//! nothing observable happens before the status row commits.

use chrono::Utc;
use url::Url;

use crate::coord::lock_key;
use crate::data::{
    Account, ConversationChoice, EntityId, NewCustomEmoji, NewMediaAttachment, NewStatus, Status,
};
use crate::error::Result;
use crate::metrics::{LOCK_CONTENTION_TOTAL, TOMBSTONE_SUPPRESSIONS_TOTAL};

use super::envelope::{ActorKind, EmojiRef, InboundActivity, MediaRef, Visibility};
use super::sidefx::Job;
use super::{IngestOptions, IngestPipeline, Outcome, SkipReason};

/// Result of the shared creation path, before outcome mapping.
pub(super) enum CoreResult {
    Done { status: Status, created: bool },
    Skipped(SkipReason),
}

impl From<CoreResult> for Outcome {
    fn from(result: CoreResult) -> Self {
        match result {
            CoreResult::Done { status, created } => Outcome::Materialized { status, created },
            CoreResult::Skipped(reason) => Outcome::Skipped(reason),
        }
    }
}

impl IngestPipeline {
    pub(super) async fn handle_creation(
        &self,
        activity: &InboundActivity,
        origin: &Account,
        options: &IngestOptions,
    ) -> Result<Outcome> {
        let result = self.materialize_core(activity, origin, None, options).await?;
        Ok(result.into())
    }

    /// Materialize one activity as a status row.
    ///
    /// `reblog_of` turns the row into a share wrapper: no own content,
    /// no conversation, no side-entities. Everything else is shared
    /// with the plain creation path, the lock and tombstone handling
    /// included.
    pub(super) async fn materialize_core(
        &self,
        activity: &InboundActivity,
        origin: &Account,
        reblog_of: Option<&Status>,
        options: &IngestOptions,
    ) -> Result<CoreResult> {
        if origin.suspended {
            tracing::debug!(
                activity_id = %activity.id,
                origin = %origin.address(),
                "origin suspended, dropping activity"
            );
            return Ok(CoreResult::Skipped(SkipReason::SuppressedOrigin));
        }

        // Deletion precedence: a tombstone written by an earlier delete
        // wins over this (re)delivered create, no lock needed.
        if self.tombstones.is_tombstoned(&origin.id, &activity.id).await {
            TOMBSTONE_SUPPRESSIONS_TOTAL
                .with_label_values(&["tombstone"])
                .inc();
            tracing::debug!(activity_id = %activity.id, "tombstoned, dropping create");
            return Ok(CoreResult::Skipped(SkipReason::Tombstoned));
        }

        let key = lock_key(activity.verb.as_str(), &activity.id);
        let Some(_guard) = self.lock.try_acquire(&key, self.config.lock_wait()).await else {
            LOCK_CONTENTION_TOTAL
                .with_label_values(&[activity.verb.as_str()])
                .inc();
            tracing::debug!(activity_id = %activity.id, "activity lock contended, yielding");
            return Ok(CoreResult::Skipped(SkipReason::LockContended));
        };

        // Re-check under the lock: redelivery of an applied activity is
        // answered with the existing row.
        if let Some(existing) = self.resolver.resolve(&activity.id).await? {
            return Ok(CoreResult::Done {
                status: existing,
                created: false,
            });
        }

        let created_at = if options.override_timestamps {
            Utc::now()
        } else {
            activity.published_at.unwrap_or_else(Utc::now)
        };

        let new = if let Some(original) = reblog_of {
            // Wrapper rows carry no content of their own; undeclared
            // audience falls back to the original's.
            NewStatus {
                id: EntityId::new().0,
                uri: activity.id.clone(),
                text: String::new(),
                content_warning: None,
                visibility: activity
                    .visibility
                    .map(|v| v.as_str().to_string())
                    .unwrap_or_else(|| original.visibility.clone()),
                language: None,
                account_id: origin.id.clone(),
                in_reply_to_id: None,
                reblog_of_id: Some(original.id.clone()),
                conversation: ConversationChoice::Skip,
                local: origin.is_local(),
                created_at,
                mention_account_ids: vec![],
                tag_names: vec![],
                media: vec![],
                emojis: vec![],
            }
        } else {
            self.prepare_original(activity, origin, created_at).await?
        };

        let deferred_reply_target = match (&activity.in_reply_to, reblog_of) {
            (Some(target), None) if new.in_reply_to_id.is_none() => Some(target.uri.clone()),
            _ => None,
        };

        let rows = self.db.materialize_status(&new).await?;
        tracing::info!(
            status_id = %rows.status.id,
            uri = %rows.status.uri,
            origin = %origin.address(),
            wrapper = reblog_of.is_some(),
            "status materialized"
        );

        // Post-commit fan-out. Failures past this point belong to the
        // job workers; the status stays.
        if let Some(target_uri) = deferred_reply_target {
            self.jobs.enqueue(Job::ResolveThread {
                status_id: rows.status.id.clone(),
                target_uri,
            });
        }

        for account_id in self.local_mentioned(&new.mention_account_ids).await? {
            self.jobs.enqueue(Job::Notify {
                account_id,
                status_id: rows.status.id.clone(),
                event: "mention".to_string(),
            });
        }

        if !self.media_rejected(origin).await? {
            for attachment in &rows.media {
                self.jobs.enqueue(Job::DownloadMedia {
                    attachment_id: attachment.id.clone(),
                });
            }
            for emoji in &rows.emoji_to_refresh {
                self.jobs.enqueue(Job::RefreshEmoji {
                    emoji_id: emoji.id.clone(),
                });
            }
        }

        if reblog_of.is_none()
            && rows.status.content_warning.is_none()
            && !rows.status.text.is_empty()
        {
            self.jobs.enqueue(Job::CrawlLinks {
                status_id: rows.status.id.clone(),
            });
        }

        if options.override_timestamps {
            self.jobs.enqueue(Job::Distribute {
                status_id: rows.status.id.clone(),
            });
        }

        Ok(CoreResult::Done {
            status: rows.status,
            created: true,
        })
    }

    /// Build the bundle for a non-wrapper status.
    async fn prepare_original(
        &self,
        activity: &InboundActivity,
        origin: &Account,
        created_at: chrono::DateTime<Utc>,
    ) -> Result<NewStatus> {
        let text = activity
            .content_html
            .as_deref()
            .map(|html| ammonia::clean(html))
            .unwrap_or_default();

        let (in_reply_to_id, conversation) = self.resolve_threading(activity).await?;

        Ok(NewStatus {
            id: EntityId::new().0,
            uri: activity.id.clone(),
            text,
            content_warning: activity.content_warning.clone(),
            visibility: activity
                .visibility
                .unwrap_or(Visibility::Public)
                .as_str()
                .to_string(),
            language: activity.language.clone(),
            account_id: origin.id.clone(),
            in_reply_to_id,
            reblog_of_id: None,
            conversation,
            local: origin.is_local(),
            created_at,
            mention_account_ids: self.resolve_mentions(activity).await?,
            tag_names: normalized_hashtags(&activity.hashtags),
            media: acceptable_media(&activity.media),
            emojis: acceptable_emojis(&activity.emojis, origin),
        })
    }

    /// Reply target and conversation placement.
    ///
    /// A resolvable parent links the row into its thread and
    /// conversation immediately. An unresolvable one leaves the reply
    /// field NULL (filled in later by the thread-resolution job) and
    /// places the row by declared conversation instead.
    async fn resolve_threading(
        &self,
        activity: &InboundActivity,
    ) -> Result<(Option<String>, ConversationChoice)> {
        if let Some(target) = &activity.in_reply_to {
            if let Some(parent) = self.resolver.resolve_with_candidates(&target.uri).await? {
                let conversation = match parent.conversation_id {
                    Some(id) => ConversationChoice::Inherit(id),
                    None => declared_conversation(activity),
                };
                return Ok((Some(parent.id), conversation));
            }
        }

        Ok((None, declared_conversation(activity)))
    }

    /// Resolve mention URIs to account IDs, in declared order, first
    /// occurrence wins. Group actors and unresolvable URIs are skipped.
    async fn resolve_mentions(&self, activity: &InboundActivity) -> Result<Vec<String>> {
        let mut account_ids = Vec::new();

        for mention in &activity.mentions {
            if mention.kind == ActorKind::Group {
                continue;
            }

            let known = self.db.get_account_by_uri(&mention.account_uri).await?;
            let account = match known {
                Some(account) => Some(account),
                None => {
                    let fetched = self.fetcher.fetch_account(&mention.account_uri).await?;
                    if let Some(account) = &fetched {
                        self.db.insert_account_if_missing(account).await?;
                    }
                    fetched
                }
            };

            match account {
                Some(account) if !account_ids.contains(&account.id) => {
                    account_ids.push(account.id);
                }
                Some(_) => {}
                None => {
                    tracing::debug!(uri = %mention.account_uri, "mention unresolvable, skipping");
                }
            }
        }

        Ok(account_ids)
    }

    /// Subset of mentioned accounts that are local, for notification
    /// fan-out.
    async fn local_mentioned(&self, account_ids: &[String]) -> Result<Vec<String>> {
        let mut local = Vec::new();
        for id in account_ids {
            if let Some(account) = self.db.get_account(id).await? {
                if account.is_local() {
                    local.push(account.id);
                }
            }
        }
        Ok(local)
    }

    async fn media_rejected(&self, origin: &Account) -> Result<bool> {
        match &origin.domain {
            Some(domain) => self.domain_policy.reject_media(domain).await,
            None => Ok(false),
        }
    }
}

fn declared_conversation(activity: &InboundActivity) -> ConversationChoice {
    match &activity.conversation {
        Some(reference) => ConversationChoice::Remote(reference.uri.clone()),
        None => ConversationChoice::Local,
    }
}

/// Lowercase, strip leading `#`, drop empties, first occurrence wins.
fn normalized_hashtags(hashtags: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for raw in hashtags {
        let name = raw.trim().trim_start_matches('#').to_lowercase();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Keep only attachments with a fetchable http(s) URL.
fn acceptable_media(media: &[MediaRef]) -> Vec<NewMediaAttachment> {
    media
        .iter()
        .filter(|declaration| acceptable_remote_url(&declaration.url))
        .map(|declaration| NewMediaAttachment {
            remote_url: declaration.url.clone(),
            description: declaration.description.clone(),
        })
        .collect()
}

/// Keep only emoji with both a usable shortcode and icon URL; malformed
/// entries degrade to plain shortcode text in the rendered status, they
/// never fail the activity.
fn acceptable_emojis(emojis: &[EmojiRef], origin: &Account) -> Vec<NewCustomEmoji> {
    emojis
        .iter()
        .filter_map(|declaration| {
            let shortcode = declaration
                .shortcode
                .as_deref()
                .map(|raw| raw.trim_matches(':').to_string())
                .filter(|shortcode| !shortcode.is_empty())?;
            let href = declaration
                .href
                .as_deref()
                .filter(|href| acceptable_remote_url(href))?;

            Some(NewCustomEmoji {
                shortcode,
                domain: origin.domain.clone(),
                image_remote_url: href.to_string(),
            })
        })
        .collect()
}

fn acceptable_remote_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EntityId;

    fn remote_origin() -> Account {
        Account {
            id: EntityId::new().0,
            uri: "https://remote.example/users/alice".to_string(),
            username: "alice".to_string(),
            domain: Some("remote.example".to_string()),
            display_name: None,
            suspended: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn hashtags_are_normalized_and_deduplicated() {
        let names = normalized_hashtags(&[
            "#Rust".to_string(),
            "rust".to_string(),
            "  #Fediverse ".to_string(),
            "#".to_string(),
            "".to_string(),
        ]);
        assert_eq!(names, vec!["rust".to_string(), "fediverse".to_string()]);
    }

    #[test]
    fn media_without_fetchable_url_is_dropped() {
        let kept = acceptable_media(&[
            MediaRef {
                url: "https://remote.example/media/a.png".to_string(),
                description: None,
            },
            MediaRef {
                url: "ftp://remote.example/media/b.png".to_string(),
                description: None,
            },
            MediaRef {
                url: "not a url".to_string(),
                description: None,
            },
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].remote_url, "https://remote.example/media/a.png");
    }

    #[test]
    fn malformed_emoji_entries_degrade_silently() {
        let origin = remote_origin();
        let kept = acceptable_emojis(
            &[
                EmojiRef {
                    shortcode: Some(":blobcat:".to_string()),
                    href: Some("https://remote.example/emoji/blobcat.png".to_string()),
                },
                EmojiRef {
                    shortcode: None,
                    href: Some("https://remote.example/emoji/orphan.png".to_string()),
                },
                EmojiRef {
                    shortcode: Some(":noicon:".to_string()),
                    href: None,
                },
                EmojiRef {
                    shortcode: Some("::".to_string()),
                    href: Some("https://remote.example/emoji/empty.png".to_string()),
                },
            ],
            &origin,
        );

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].shortcode, "blobcat");
        assert_eq!(kept[0].domain.as_deref(), Some("remote.example"));
    }
}
