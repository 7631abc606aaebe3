//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Account
// =============================================================================

/// A local or remote account
///
/// The pipeline never creates local accounts; remote ones are inserted
/// lazily when a mention or authorship reference resolves through the
/// fetch collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    /// ActivityPub actor URI (globally unique)
    pub uri: String,
    pub username: String,
    /// None for local accounts
    pub domain: Option<String>,
    pub display_name: Option<String>,
    /// Suspended origins have their activity silently dropped
    pub suspended: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_local(&self) -> bool {
        self.domain.is_none()
    }

    /// user@domain form, or bare username for local accounts
    pub fn address(&self) -> String {
        match &self.domain {
            Some(domain) => format!("{}@{}", self.username, domain),
            None => self.username.clone(),
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// One unit of remote or local content
///
/// Invariants:
/// - `uri` is globally unique and immutable once set
/// - a row with `reblog_of_id` set carries no own content
/// - `conversation_id` is always set for originals and replies;
///   reblog wrappers leave it NULL
/// - `in_reply_to_id` may be NULL even when the activity declared a reply
///   target; resolution is then deferred to an asynchronous job
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Status {
    pub id: String,
    /// ActivityPub/OStatus URI (globally unique)
    pub uri: String,
    /// Sanitized HTML content; empty for reblog wrappers
    pub text: String,
    /// Content warning text
    pub content_warning: Option<String>,
    /// Visibility: public, unlisted, private, direct
    pub visibility: String,
    /// Language code (ISO 639-1)
    pub language: Option<String>,
    pub account_id: String,
    /// Resolved reply target, if any
    pub in_reply_to_id: Option<String>,
    /// Set when this row is a reblog wrapper
    pub reblog_of_id: Option<String>,
    pub conversation_id: Option<String>,
    pub local: bool,
    pub created_at: DateTime<Utc>,
}

impl Status {
    pub fn is_reblog(&self) -> bool {
        self.reblog_of_id.is_some()
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// Grouping entity linking a top-level status and its reply thread
///
/// Created lazily the first time a status references it; never updated
/// by this pipeline afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: String,
    /// Remote conversation URI; None for locally minted conversations
    pub uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Side-entities
// =============================================================================

/// Mention of an account within a status
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Mention {
    pub id: String,
    pub status_id: String,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
}

/// Hashtag, deduplicated globally by normalized name
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Media file attached to a status
///
/// Only the remote URL and metadata are stored here; the actual download
/// runs as an asynchronous job after the status commits.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MediaAttachment {
    pub id: String,
    pub status_id: String,
    pub remote_url: String,
    /// Alt text description
    pub description: Option<String>,
    /// Declared order within the status
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

/// Custom emoji icon, deduplicated by (shortcode, domain)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CustomEmoji {
    pub id: String,
    pub shortcode: String,
    /// None for local emoji
    pub domain: Option<String>,
    pub image_remote_url: String,
    pub created_at: DateTime<Utc>,
}

/// Per-domain federation policy
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DomainPolicyRow {
    pub domain: String,
    /// When set, media/emoji downloads from this domain are never scheduled
    pub reject_media: bool,
    pub created_at: DateTime<Utc>,
}
