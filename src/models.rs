use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;
pub type UserId = i64;
pub type ChatId = i64;
pub type MessageId = i64;

/// A (chat, message) pair on the messaging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Location {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl Location {
    pub fn new(chat_id: ChatId, message_id: MessageId) -> Self {
        Self { chat_id, message_id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Padding,
    Reviewing,
    Accepted,
    AcceptedSecondary,
    InPlan,
    Rejected,
    Cancelled,
    Revoked,
    ReviewTimedOut,
    ConfirmTimedOut,
}

impl PostStatus {
    pub const ALL: [PostStatus; 10] = [
        PostStatus::Padding,
        PostStatus::Reviewing,
        PostStatus::Accepted,
        PostStatus::AcceptedSecondary,
        PostStatus::InPlan,
        PostStatus::Rejected,
        PostStatus::Cancelled,
        PostStatus::Revoked,
        PostStatus::ReviewTimedOut,
        PostStatus::ConfirmTimedOut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Padding => "padding",
            PostStatus::Reviewing => "reviewing",
            PostStatus::Accepted => "accepted",
            PostStatus::AcceptedSecondary => "accepted_secondary",
            PostStatus::InPlan => "in_plan",
            PostStatus::Rejected => "rejected",
            PostStatus::Cancelled => "cancelled",
            PostStatus::Revoked => "revoked",
            PostStatus::ReviewTimedOut => "review_timed_out",
            PostStatus::ConfirmTimedOut => "confirm_timed_out",
        }
    }

    /// Set by the expiry reaper; nothing can act on these any more.
    pub fn is_expired(self) -> bool {
        matches!(self, PostStatus::ReviewTimedOut | PostStatus::ConfirmTimedOut)
    }

    pub fn is_published(self) -> bool {
        matches!(self, PostStatus::Accepted | PostStatus::AcceptedSecondary)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

impl FromStr for PostStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PostStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Closed set of content kinds. `Unsupported` is a real, storable state:
/// it only becomes an error when something tries to deliver it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Photo,
    Audio,
    Video,
    Document,
    Voice,
    Animation,
    Unsupported,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Photo => "photo",
            ContentKind::Audio => "audio",
            ContentKind::Video => "video",
            ContentKind::Document => "document",
            ContentKind::Voice => "voice",
            ContentKind::Animation => "animation",
            ContentKind::Unsupported => "unsupported",
        }
    }

    pub fn can_spoiler(self) -> bool {
        matches!(self, ContentKind::Photo | ContentKind::Video | ContentKind::Animation)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "text" => ContentKind::Text,
            "photo" => ContentKind::Photo,
            "audio" => ContentKind::Audio,
            "video" => ContentKind::Video,
            "document" => ContentKind::Document,
            "voice" => ContentKind::Voice,
            "animation" => ContentKind::Animation,
            "unsupported" => ContentKind::Unsupported,
            other => return Err(UnknownVariant(other.to_string())),
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Post {
    pub id: Id,
    pub origin: Location,
    /// Submitter-facing status / confirmation message.
    pub origin_action: Location,
    pub review: Option<Location>,
    pub review_action: Option<Location>,
    pub publication: Option<Location>,
    pub warn_text_id: Option<MessageId>,
    pub origin_bundle_id: Option<String>,
    pub review_bundle_id: Option<String>,
    pub publish_bundle_id: Option<String>,
    pub kind: ContentKind,
    pub text: String,
    pub raw_text: String,
    pub tags: u32,
    pub has_spoiler: bool,
    pub anonymous: bool,
    /// Upstream channel message when the content was forwarded from a channel.
    pub forwarded_from: Option<Location>,
    pub submitter_id: UserId,
    pub reviewer_id: Option<UserId>,
    pub reject_reason: Option<String>,
    pub count_reject: bool,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Post {
    pub fn is_bundle(&self) -> bool {
        self.origin_bundle_id.is_some()
    }

    /// Direct-publish posts are their own review record.
    pub fn is_direct_post(&self) -> bool {
        self.review == Some(self.origin)
    }

    pub fn spoiler_state(&self) -> Option<bool> {
        self.kind.can_spoiler().then_some(self.has_spoiler)
    }

    pub fn matches_location(&self, at: Location) -> bool {
        self.origin == at
            || self.origin_action == at
            || self.review == Some(at)
            || self.review_action == Some(at)
    }

    /// Apply a partial update in place, stamping `modified_at`.
    pub fn apply(&mut self, upd: PostUpdate, now: DateTime<Utc>) {
        if let Some(v) = upd.status { self.status = v; }
        if let Some(v) = upd.tags { self.tags = v; }
        if let Some(v) = upd.anonymous { self.anonymous = v; }
        if let Some(v) = upd.has_spoiler { self.has_spoiler = v; }
        if let Some(v) = upd.review { self.review = Some(v); }
        if let Some(v) = upd.review_action { self.review_action = Some(v); }
        if let Some(v) = upd.review_bundle_id { self.review_bundle_id = Some(v); }
        if let Some(v) = upd.publication { self.publication = Some(v); }
        if let Some(v) = upd.publish_bundle_id { self.publish_bundle_id = Some(v); }
        if let Some(v) = upd.warn_text_id { self.warn_text_id = Some(v); }
        if let Some(v) = upd.reviewer_id { self.reviewer_id = Some(v); }
        if let Some(v) = upd.reject_reason { self.reject_reason = Some(v); }
        if let Some(v) = upd.count_reject { self.count_reject = v; }
        if now > self.modified_at { self.modified_at = now; }
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub origin: Location,
    pub origin_action: Location,
    pub review: Option<Location>,
    pub review_action: Option<Location>,
    pub origin_bundle_id: Option<String>,
    pub review_bundle_id: Option<String>,
    pub kind: ContentKind,
    pub text: String,
    pub raw_text: String,
    pub tags: u32,
    pub has_spoiler: bool,
    pub anonymous: bool,
    pub forwarded_from: Option<Location>,
    pub submitter_id: UserId,
    pub reject_reason: Option<String>,
    pub status: PostStatus,
}

/// The exact set of columns a transition touches. `None` leaves a column alone;
/// `modified_at` is always stamped by the store together with the other fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostUpdate {
    pub status: Option<PostStatus>,
    pub tags: Option<u32>,
    pub anonymous: Option<bool>,
    pub has_spoiler: Option<bool>,
    pub review: Option<Location>,
    pub review_action: Option<Location>,
    pub review_bundle_id: Option<String>,
    pub publication: Option<Location>,
    pub publish_bundle_id: Option<String>,
    pub warn_text_id: Option<MessageId>,
    pub reviewer_id: Option<UserId>,
    pub reject_reason: Option<String>,
    pub count_reject: Option<bool>,
}

impl PostUpdate {
    pub fn status(status: PostStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }
}

/// Conjunctive count predicate. `statuses` empty means any status;
/// `counted_rejects` additionally admits `Rejected` rows that count against quota.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub submitter: Option<UserId>,
    pub created_after: Option<DateTime<Utc>>,
    pub statuses: Vec<PostStatus>,
    pub counted_rejects: bool,
}

impl PostFilter {
    pub fn submitter(id: UserId) -> Self {
        Self { submitter: Some(id), ..Default::default() }
    }

    pub fn since(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn or_counted_rejects(mut self) -> Self {
        self.counted_rejects = true;
        self
    }

    pub fn matches(&self, post: &Post) -> bool {
        if let Some(uid) = self.submitter {
            if post.submitter_id != uid { return false; }
        }
        if let Some(after) = self.created_after {
            if post.created_at < after { return false; }
        }
        if self.statuses.is_empty() && !self.counted_rejects {
            return true;
        }
        self.statuses.contains(&post.status)
            || (self.counted_rejects && post.status == PostStatus::Rejected && post.count_reject)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub id: Id,
    pub post_id: Id,
    pub kind: ContentKind,
    pub file_id: String,
    pub file_unique_id: String,
    pub file_name: Option<String>,
    pub mime: Option<String>,
    pub size: i64,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub post_id: Id,
    pub kind: ContentKind,
    pub media: MediaRef,
}

/// Platform file reference carried by an incoming media item.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MediaRef {
    pub file_id: String,
    #[serde(default)]
    pub file_unique_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub width: i32,
    #[serde(default)]
    pub height: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub is_admin: bool,
    pub is_banned: bool,
    pub can_review: bool,
    pub direct_post: bool,
    pub notification: bool,
    pub prefer_anonymous: bool,
    pub post_count: i64,
    pub accept_count: i64,
    pub reject_count: i64,
    pub review_count: i64,
    pub modified_at: DateTime<Utc>,
}

impl User {
    /// Fresh account with no rights and notifications on.
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_admin: false,
            is_banned: false,
            can_review: false,
            direct_post: false,
            notification: true,
            prefer_anonymous: false,
            post_count: 0,
            accept_count: 0,
            reject_count: 0,
            review_count: 0,
            modified_at: Utc::now(),
        }
    }

    pub fn may_review(&self) -> bool {
        self.is_admin || self.can_review
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub post: i64,
    pub accept: i64,
    pub reject: i64,
    pub review: i64,
}

/// An inbound content event as handed over by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IncomingItem {
    pub location: Location,
    pub kind: ContentKind,
    /// Message text, or caption for media.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<MediaRef>,
    #[serde(default)]
    pub has_spoiler: bool,
    #[serde(default)]
    pub forwarded_from: Option<Location>,
}

impl IncomingItem {
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}
