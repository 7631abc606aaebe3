//! Normalized inbound activity envelope
//!
//! Upstream delivery (inbox POST, relay, backfill) is already parsed and
//! verified before it reaches the pipeline; what arrives here is a flat,
//! transport-agnostic envelope. Unknown verbs and object kinds are kept
//! as `Other` so classification can decide what to do with them instead
//! of failing at the edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Activity verb, with lenient fallback for absent or unknown values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Post,
    Share,
    Delete,
    Other,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Post => "post",
            Verb::Share => "share",
            Verb::Delete => "delete",
            Verb::Other => "other",
        }
    }
}

impl Default for Verb {
    /// Activities that omit their verb are treated as plain posts.
    fn default() -> Self {
        Verb::Post
    }
}

/// Declared kind of the activity's object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Note,
    Comment,
    /// Bare activity without an explicit object kind
    Activity,
    Other,
}

impl Default for ObjectKind {
    fn default() -> Self {
        ObjectKind::Activity
    }
}

/// Audience of a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        }
    }

    /// Lenient parse; unknown markers fall back to public, matching how
    /// remote software disagrees on audience vocabulary.
    pub fn parse(value: &str) -> Self {
        match value {
            "unlisted" => Visibility::Unlisted,
            "private" => Visibility::Private,
            "direct" => Visibility::Direct,
            _ => Visibility::Public,
        }
    }
}

/// Reference to another object, carrying both its stable URI and an
/// optional fetchable URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub uri: String,
    pub href: Option<String>,
}

impl ObjectRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            href: None,
        }
    }

    pub fn with_href(uri: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            href: Some(href.into()),
        }
    }
}

/// Declared kind of a mentioned actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Person,
    Group,
    Other,
}

/// Mention of an actor by URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionRef {
    pub account_uri: String,
    pub kind: ActorKind,
}

/// Remote media attachment declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub description: Option<String>,
}

/// Custom emoji declaration. Either field may be absent or malformed on
/// the wire; incomplete entries are skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiRef {
    pub shortcode: Option<String>,
    pub href: Option<String>,
}

/// One delivered activity after transport-level parsing.
///
/// `id` is the stable global identifier used for deduplication, locking
/// and tombstoning. For creations it doubles as the status URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundActivity {
    pub id: String,
    #[serde(default)]
    pub verb: Verb,
    #[serde(default)]
    pub object_kind: ObjectKind,
    pub published_at: Option<DateTime<Utc>>,
    /// Raw HTML content as delivered; sanitized during materialization
    pub content_html: Option<String>,
    pub content_warning: Option<String>,
    pub language: Option<String>,
    pub visibility: Option<Visibility>,
    /// Declared reply target
    pub in_reply_to: Option<ObjectRef>,
    /// Declared conversation/context
    pub conversation: Option<ObjectRef>,
    /// For shares: the object being shared
    pub share_of: Option<ObjectRef>,
    #[serde(default)]
    pub mentions: Vec<MentionRef>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    #[serde(default)]
    pub emojis: Vec<EmojiRef>,
}

impl InboundActivity {
    /// Minimal envelope with lenient defaults; builder-style setters
    /// below fill in the rest.
    pub fn new(id: impl Into<String>, verb: Verb) -> Self {
        Self {
            id: id.into(),
            verb,
            object_kind: ObjectKind::Note,
            published_at: None,
            content_html: None,
            content_warning: None,
            language: None,
            visibility: None,
            in_reply_to: None,
            conversation: None,
            share_of: None,
            mentions: Vec::new(),
            hashtags: Vec::new(),
            media: Vec::new(),
            emojis: Vec::new(),
        }
    }

    pub fn with_content(mut self, html: impl Into<String>) -> Self {
        self.content_html = Some(html.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_share_of(mut self, target: ObjectRef) -> Self {
        self.share_of = Some(target);
        self
    }
}
