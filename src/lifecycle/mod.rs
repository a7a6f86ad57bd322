//! Post lifecycle controller: ingestion, submitter and reviewer actions, publication, expiry.

mod expiry;
mod ingest;
mod publish;
mod review;
mod submitter;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buffer::AggregationBuffer;
use crate::delivery::{Delivery, OutboundContent};
use crate::error::EngineError;
use crate::models::*;
use crate::policy::{ChannelPolicy, ChannelPolicyResolver, TagCatalog};
use crate::quota::{QuotaConstants, QuotaRefusal};
use crate::repo::Repo;

pub type EngineResult<T> = Result<T, EngineError>;

/// Destinations and thresholds the controller works with.
#[derive(Clone, Debug)]
pub struct Settings {
    pub review_group: Option<ChatId>,
    pub accept_channel: ChatId,
    pub second_channel: Option<ChatId>,
    pub reject_channel: ChatId,
    pub max_text_len: usize,
    pub warn_raw_link: bool,
    pub debounce: Duration,
    pub confirm_timeout: Duration,
    pub review_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            review_group: None,
            accept_channel: 0,
            second_channel: None,
            reject_channel: 0,
            max_text_len: 2000,
            warn_raw_link: true,
            debounce: Duration::from_millis(1500),
            confirm_timeout: Duration::from_secs(24 * 3600),
            review_timeout: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// External collaborators the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub repo: Arc<dyn Repo>,
    pub delivery: Arc<dyn Delivery>,
    pub channels: Arc<dyn ChannelPolicyResolver>,
    pub tags: Arc<dyn TagCatalog>,
    pub quota: Arc<dyn QuotaConstants>,
}

/// A precondition the acting user did not meet. Never mutates state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Refusal {
    #[error("expired, can no longer be acted on")]
    Expired,
    #[error("already processed")]
    AlreadyProcessed,
    #[error("not your submission")]
    NotYourSubmission,
    #[error("you are not allowed to review")]
    NotReviewer,
    #[error("you are banned and cannot submit")]
    Banned,
    #[error("review group is not configured, submissions are closed")]
    ReviewGroupMissing,
    #[error("text submissions cannot be empty")]
    EmptyText,
    #[error("text exceeds the limit of {0} characters")]
    TextTooLong(usize),
    #[error("media submissions must carry a file reference")]
    MissingMedia,
    #[error("cannot repost from publication channels")]
    RepostFromOwnChannel,
    #[error("unknown tag")]
    UnknownTag,
    #[error("this content kind cannot carry a spoiler")]
    SpoilerUnsupported,
    #[error("second channel is not configured")]
    SecondChannelMissing,
    #[error("{0}")]
    Quota(QuotaRefusal),
}

impl Refusal {
    /// Stable label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Refusal::Expired => "expired",
            Refusal::AlreadyProcessed => "already_processed",
            Refusal::NotYourSubmission => "not_your_submission",
            Refusal::NotReviewer => "not_reviewer",
            Refusal::Banned => "banned",
            Refusal::ReviewGroupMissing => "review_group_missing",
            Refusal::EmptyText => "empty_text",
            Refusal::TextTooLong(_) => "text_too_long",
            Refusal::MissingMedia => "missing_media",
            Refusal::RepostFromOwnChannel => "repost_from_own_channel",
            Refusal::UnknownTag => "unknown_tag",
            Refusal::SpoilerUnsupported => "spoiler_unsupported",
            Refusal::SecondChannelMissing => "second_channel_missing",
            Refusal::Quota(q) => q.kind().as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done(String),
    Refused(Refusal),
}

impl Outcome {
    pub fn done(msg: impl Into<String>) -> Self {
        Outcome::Done(msg.into())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn refusal(&self) -> Option<&Refusal> {
        match self {
            Outcome::Refused(r) => Some(r),
            Outcome::Done(_) => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Outcome::Done(m) => m.clone(),
            Outcome::Refused(r) => r.to_string(),
        }
    }
}

/// How an action names its target post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PostRef {
    Id { post_id: Id },
    Location { chat_id: ChatId, message_id: MessageId },
    Bundle { bundle_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagSelector {
    Bit(u8),
    Payload(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmitterAction {
    Confirm,
    Cancel,
    ToggleAnonymous,
    DismissWarning,
    SetTag { tag: TagSelector },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewerAction {
    Accept,
    AcceptSecondary,
    AcceptScheduled,
    Reject {
        reason: String,
        #[serde(default)]
        counts_against_quota: bool,
        #[serde(default)]
        custom_text: Option<String>,
    },
    Revoke,
    SetTag { tag: TagSelector },
    ToggleSpoiler,
}

pub struct Engine {
    repo: Arc<dyn Repo>,
    delivery: Arc<dyn Delivery>,
    channels: Arc<dyn ChannelPolicyResolver>,
    tags: Arc<dyn TagCatalog>,
    quota: Arc<dyn QuotaConstants>,
    buffer: AggregationBuffer,
    settings: Settings,
}

impl Engine {
    pub fn new(parts: Collaborators, settings: Settings) -> Self {
        Self {
            repo: parts.repo,
            delivery: parts.delivery,
            channels: parts.channels,
            tags: parts.tags,
            quota: parts.quota,
            buffer: AggregationBuffer::new(settings.debounce),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn buffer(&self) -> &AggregationBuffer {
        &self.buffer
    }

    pub fn repo(&self) -> &Arc<dyn Repo> {
        &self.repo
    }

    pub async fn resolve(&self, post_ref: &PostRef) -> EngineResult<Post> {
        let found = match post_ref {
            PostRef::Id { post_id } => self.repo.get_post(*post_id).await?,
            PostRef::Location { chat_id, message_id } => {
                self.repo.find_by_location(Location::new(*chat_id, *message_id)).await?
            }
            PostRef::Bundle { bundle_id } => self.repo.find_by_bundle(bundle_id).await?,
        };
        found.ok_or(EngineError::NotFound)
    }

    /// Unknown users are registered on first contact.
    async fn load_user(&self, id: UserId) -> EngineResult<User> {
        match self.repo.get_user(id).await? {
            Some(u) => Ok(u),
            None => Ok(self.repo.upsert_user(User::new(id, "")).await?),
        }
    }

    /// Policy of the channel a post was forwarded from; own content is `Normal`.
    async fn source_policy(&self, post: &Post) -> EngineResult<ChannelPolicy> {
        match post.forwarded_from {
            Some(from) => Ok(self.channels.resolve(from.chat_id).await?),
            None => Ok(ChannelPolicy::Normal),
        }
    }

    fn refuse(&self, refusal: Refusal) -> Outcome {
        debug!(reason = refusal.reason(), "action refused");
        metrics::increment_counter!("postflow_refusals_total", "reason" => refusal.reason());
        Outcome::Refused(refusal)
    }

    fn has_secondary(&self) -> bool {
        self.settings.second_channel.is_some()
    }

    /// Counter bumps happen after the transition is stored; failures are only logged.
    async fn bump(&self, user: UserId, delta: CounterDelta) {
        if delta == CounterDelta::default() {
            return;
        }
        if let Err(e) = self.repo.bump_counters(user, delta).await {
            warn!(user, error = %e, "failed to update user counters");
        }
    }

    /// Direct message when the submitter wants notifications and someone else acted;
    /// otherwise the submitter-facing status message is rewritten in place.
    async fn notify_submitter(&self, post: &Post, submitter: &User, actor: UserId, text: &str) {
        let res = if submitter.notification && actor != submitter.id {
            self.delivery
                .send(post.origin.chat_id, &OutboundContent::text(text), None, Some(post.origin.message_id))
                .await
                .map(|_| ())
        } else {
            self.delivery.edit_text(post.origin_action, text, None).await
        };
        if let Err(e) = res {
            metrics::increment_counter!("postflow_delivery_failures_total");
            warn!(post_id = post.id, submitter = submitter.id, error = %e, "failed to notify submitter");
        }
    }

    fn record_transition(&self, post_id: Id, to: PostStatus) {
        metrics::increment_counter!("postflow_transitions_total", "to" => to.as_str());
        tracing::info!(post_id, status = %to, "post transitioned");
    }
}
