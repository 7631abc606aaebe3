//! SQLite database operations
//!
//! All database access goes through this module. The one multi-row write,
//! [`Database::materialize_status`], runs in a single `BEGIN IMMEDIATE`
//! transaction so a constraint violation anywhere in the bundle leaves no
//! partial status behind.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::PipelineError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

// =============================================================================
// Write-side bundle types
// =============================================================================

/// How the conversation reference of a new status is resolved.
#[derive(Debug, Clone)]
pub enum ConversationChoice {
    /// Reply resolved locally; inherit the parent's conversation
    Inherit(String),
    /// Find-or-create by remote conversation URI
    Remote(String),
    /// Mint a fresh local conversation
    Local,
    /// No conversation (reblog wrappers)
    Skip,
}

/// New media attachment declaration (download deferred)
#[derive(Debug, Clone)]
pub struct NewMediaAttachment {
    pub remote_url: String,
    pub description: Option<String>,
}

/// New custom emoji declaration (icon download deferred)
#[derive(Debug, Clone)]
pub struct NewCustomEmoji {
    pub shortcode: String,
    pub domain: Option<String>,
    pub image_remote_url: String,
}

/// Everything needed to persist one status and its side-entities atomically.
#[derive(Debug, Clone)]
pub struct NewStatus {
    pub id: String,
    pub uri: String,
    pub text: String,
    pub content_warning: Option<String>,
    pub visibility: String,
    pub language: Option<String>,
    pub account_id: String,
    pub in_reply_to_id: Option<String>,
    pub reblog_of_id: Option<String>,
    pub conversation: ConversationChoice,
    pub local: bool,
    pub created_at: DateTime<Utc>,
    /// Distinct, already-resolved mentioned account IDs, in mention order
    pub mention_account_ids: Vec<String>,
    /// Normalized hashtag names
    pub tag_names: Vec<String>,
    /// Declared media links, in declared order
    pub media: Vec<NewMediaAttachment>,
    pub emojis: Vec<NewCustomEmoji>,
}

/// Rows produced by one materialization transaction.
///
/// `emoji_to_refresh` lists emoji whose icon is new or changed, i.e. the
/// ones worth scheduling a download for.
#[derive(Debug)]
pub struct MaterializedRows {
    pub status: Status,
    pub media: Vec<MediaAttachment>,
    pub emoji_to_refresh: Vec<CustomEmoji>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, PipelineError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                PipelineError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Get account by ID
    pub async fn get_account(&self, id: &str) -> Result<Option<Account>, PipelineError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    /// Get account by actor URI
    pub async fn get_account_by_uri(&self, uri: &str) -> Result<Option<Account>, PipelineError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE uri = ?")
            .bind(uri)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    /// Insert an account unless one with the same URI already exists.
    ///
    /// This is atomic at the SQL statement level, so two workers resolving
    /// the same mentioned account concurrently cannot create two rows.
    ///
    /// # Returns
    /// `true` if inserted, `false` if the URI was already present.
    pub async fn insert_account_if_missing(
        &self,
        account: &Account,
    ) -> Result<bool, PipelineError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO accounts (
                id, uri, username, domain, display_name, suspended, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.uri)
        .bind(&account.username)
        .bind(&account.domain)
        .bind(&account.display_name)
        .bind(account.suspended)
        .bind(&account.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Statuses
    // =========================================================================

    /// Get status by ID
    pub async fn get_status(&self, id: &str) -> Result<Option<Status>, PipelineError> {
        let status = sqlx::query_as::<_, Status>("SELECT * FROM statuses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(status)
    }

    /// Get status by URI
    pub async fn get_status_by_uri(&self, uri: &str) -> Result<Option<Status>, PipelineError> {
        let status = sqlx::query_as::<_, Status>("SELECT * FROM statuses WHERE uri = ?")
            .bind(uri)
            .fetch_optional(&self.pool)
            .await?;

        Ok(status)
    }

    /// Count statuses stored under a URI (0 or 1 given the unique index)
    pub async fn count_statuses_with_uri(&self, uri: &str) -> Result<i64, PipelineError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM statuses WHERE uri = ?")
            .bind(uri)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Delete a status row.
    ///
    /// Side-entity rows cascade via foreign keys; broader cleanup
    /// (timelines, counters) belongs to the removal collaborator.
    pub async fn delete_status(&self, id: &str) -> Result<(), PipelineError> {
        sqlx::query("DELETE FROM statuses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Materialization (the one atomic bundle write)
    // =========================================================================

    /// Persist a status and all of its side-entities in one transaction.
    ///
    /// First-or-create semantics apply to the conversation, tags, mentions
    /// and custom emoji. Any error rolls the whole bundle back.
    pub async fn materialize_status(
        &self,
        new: &NewStatus,
    ) -> Result<MaterializedRows, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = Self::materialize_in_tx(&mut conn, new).await;

        match result {
            Ok(rows) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(rows)
            }
            Err(error) => {
                if let Err(rollback_error) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    tracing::warn!(
                        error = %rollback_error,
                        "failed to roll back materialization transaction"
                    );
                }
                Err(error)
            }
        }
    }

    async fn materialize_in_tx(
        conn: &mut sqlx::pool::PoolConnection<Sqlite>,
        new: &NewStatus,
    ) -> Result<MaterializedRows, PipelineError> {
        let now = Utc::now();

        // 1. Conversation (first-or-create)
        let conversation_id = match &new.conversation {
            ConversationChoice::Inherit(id) => Some(id.clone()),
            ConversationChoice::Remote(uri) => {
                let existing =
                    sqlx::query_scalar::<_, String>("SELECT id FROM conversations WHERE uri = ?")
                        .bind(uri)
                        .fetch_optional(&mut **conn)
                        .await?;

                match existing {
                    Some(id) => Some(id),
                    None => {
                        let id = EntityId::new().0;
                        sqlx::query(
                            "INSERT INTO conversations (id, uri, created_at) VALUES (?, ?, ?)",
                        )
                        .bind(&id)
                        .bind(uri)
                        .bind(now)
                        .execute(&mut **conn)
                        .await?;
                        Some(id)
                    }
                }
            }
            ConversationChoice::Local => {
                let id = EntityId::new().0;
                sqlx::query("INSERT INTO conversations (id, uri, created_at) VALUES (?, NULL, ?)")
                    .bind(&id)
                    .bind(now)
                    .execute(&mut **conn)
                    .await?;
                Some(id)
            }
            ConversationChoice::Skip => None,
        };

        // 2. Status row
        sqlx::query(
            r#"
            INSERT INTO statuses (
                id, uri, text, content_warning, visibility, language,
                account_id, in_reply_to_id, reblog_of_id, conversation_id,
                local, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.id)
        .bind(&new.uri)
        .bind(&new.text)
        .bind(&new.content_warning)
        .bind(&new.visibility)
        .bind(&new.language)
        .bind(&new.account_id)
        .bind(&new.in_reply_to_id)
        .bind(&new.reblog_of_id)
        .bind(&conversation_id)
        .bind(new.local)
        .bind(&new.created_at)
        .execute(&mut **conn)
        .await?;

        // 3. Mentions (first-or-create per distinct account)
        for account_id in &new.mention_account_ids {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO mentions (id, status_id, account_id, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(EntityId::new().0)
            .bind(&new.id)
            .bind(account_id)
            .bind(now)
            .execute(&mut **conn)
            .await?;
        }

        // 4. Hashtags (first-or-create tag, then join row)
        for name in &new.tag_names {
            let tag_id =
                match sqlx::query_scalar::<_, String>("SELECT id FROM tags WHERE name = ?")
                    .bind(name)
                    .fetch_optional(&mut **conn)
                    .await?
                {
                    Some(id) => id,
                    None => {
                        let id = EntityId::new().0;
                        sqlx::query("INSERT INTO tags (id, name, created_at) VALUES (?, ?, ?)")
                            .bind(&id)
                            .bind(name)
                            .bind(now)
                            .execute(&mut **conn)
                            .await?;
                        id
                    }
                };

            sqlx::query("INSERT OR IGNORE INTO statuses_tags (status_id, tag_id) VALUES (?, ?)")
                .bind(&new.id)
                .bind(&tag_id)
                .execute(&mut **conn)
                .await?;
        }

        // 5. Media attachments, keeping the declared order
        let mut media = Vec::with_capacity(new.media.len());
        for (position, declaration) in new.media.iter().enumerate() {
            let attachment = MediaAttachment {
                id: EntityId::new().0,
                status_id: new.id.clone(),
                remote_url: declaration.remote_url.clone(),
                description: declaration.description.clone(),
                position: position as i64,
                created_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO media_attachments (
                    id, status_id, remote_url, description, position, created_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&attachment.id)
            .bind(&attachment.status_id)
            .bind(&attachment.remote_url)
            .bind(&attachment.description)
            .bind(attachment.position)
            .bind(&attachment.created_at)
            .execute(&mut **conn)
            .await?;

            media.push(attachment);
        }

        // 6. Custom emoji (first-or-create by shortcode+domain; existing
        //    rows only get touched when the icon URL changed)
        let mut emoji_to_refresh = Vec::new();
        for declaration in &new.emojis {
            let existing = sqlx::query_as::<_, CustomEmoji>(
                "SELECT * FROM custom_emojis WHERE shortcode = ? AND domain IS ?",
            )
            .bind(&declaration.shortcode)
            .bind(&declaration.domain)
            .fetch_optional(&mut **conn)
            .await?;

            match existing {
                Some(emoji) if emoji.image_remote_url == declaration.image_remote_url => {}
                Some(mut emoji) => {
                    sqlx::query("UPDATE custom_emojis SET image_remote_url = ? WHERE id = ?")
                        .bind(&declaration.image_remote_url)
                        .bind(&emoji.id)
                        .execute(&mut **conn)
                        .await?;
                    emoji.image_remote_url = declaration.image_remote_url.clone();
                    emoji_to_refresh.push(emoji);
                }
                None => {
                    let emoji = CustomEmoji {
                        id: EntityId::new().0,
                        shortcode: declaration.shortcode.clone(),
                        domain: declaration.domain.clone(),
                        image_remote_url: declaration.image_remote_url.clone(),
                        created_at: now,
                    };

                    sqlx::query(
                        r#"
                        INSERT INTO custom_emojis (
                            id, shortcode, domain, image_remote_url, created_at
                        ) VALUES (?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&emoji.id)
                    .bind(&emoji.shortcode)
                    .bind(&emoji.domain)
                    .bind(&emoji.image_remote_url)
                    .bind(&emoji.created_at)
                    .execute(&mut **conn)
                    .await?;

                    emoji_to_refresh.push(emoji);
                }
            }
        }

        let status = Status {
            id: new.id.clone(),
            uri: new.uri.clone(),
            text: new.text.clone(),
            content_warning: new.content_warning.clone(),
            visibility: new.visibility.clone(),
            language: new.language.clone(),
            account_id: new.account_id.clone(),
            in_reply_to_id: new.in_reply_to_id.clone(),
            reblog_of_id: new.reblog_of_id.clone(),
            conversation_id,
            local: new.local,
            created_at: new.created_at,
        };

        Ok(MaterializedRows {
            status,
            media,
            emoji_to_refresh,
        })
    }

    // =========================================================================
    // Side-entity reads
    // =========================================================================

    /// Get the conversation row for a status, if linked
    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, PipelineError> {
        let conversation =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(conversation)
    }

    /// Get a conversation by its remote URI
    pub async fn get_conversation_by_uri(
        &self,
        uri: &str,
    ) -> Result<Option<Conversation>, PipelineError> {
        let conversation =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE uri = ?")
                .bind(uri)
                .fetch_optional(&self.pool)
                .await?;

        Ok(conversation)
    }

    /// Get tags associated with a status
    pub async fn get_tags_for_status(&self, status_id: &str) -> Result<Vec<Tag>, PipelineError> {
        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT tags.* FROM tags
            JOIN statuses_tags ON statuses_tags.tag_id = tags.id
            WHERE statuses_tags.status_id = ?
            ORDER BY tags.name
            "#,
        )
        .bind(status_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tags)
    }

    /// Get mentions attached to a status
    pub async fn get_mentions_for_status(
        &self,
        status_id: &str,
    ) -> Result<Vec<Mention>, PipelineError> {
        let mentions = sqlx::query_as::<_, Mention>(
            "SELECT * FROM mentions WHERE status_id = ? ORDER BY created_at",
        )
        .bind(status_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(mentions)
    }

    /// Get media attachments for a status in declared order
    pub async fn get_media_for_status(
        &self,
        status_id: &str,
    ) -> Result<Vec<MediaAttachment>, PipelineError> {
        let media = sqlx::query_as::<_, MediaAttachment>(
            "SELECT * FROM media_attachments WHERE status_id = ? ORDER BY position",
        )
        .bind(status_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(media)
    }

    /// Get a custom emoji by natural key
    pub async fn get_custom_emoji(
        &self,
        shortcode: &str,
        domain: Option<&str>,
    ) -> Result<Option<CustomEmoji>, PipelineError> {
        let emoji = sqlx::query_as::<_, CustomEmoji>(
            "SELECT * FROM custom_emojis WHERE shortcode = ? AND domain IS ?",
        )
        .bind(shortcode)
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(emoji)
    }

    // =========================================================================
    // Domain policies
    // =========================================================================

    /// Get the federation policy for a domain
    pub async fn get_domain_policy(
        &self,
        domain: &str,
    ) -> Result<Option<DomainPolicyRow>, PipelineError> {
        let policy =
            sqlx::query_as::<_, DomainPolicyRow>("SELECT * FROM domain_policies WHERE domain = ?")
                .bind(domain)
                .fetch_optional(&self.pool)
                .await?;

        Ok(policy)
    }

    /// Create or update a domain policy
    pub async fn upsert_domain_policy(
        &self,
        policy: &DomainPolicyRow,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO domain_policies (domain, reject_media, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(domain) DO UPDATE SET reject_media = excluded.reject_media
            "#,
        )
        .bind(&policy.domain)
        .bind(policy.reject_media)
        .bind(&policy.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
