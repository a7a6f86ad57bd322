use tokio::time::Instant;
use tracing::{error, info, warn};

use super::*;
use crate::buffer::PendingConfirmation;
use crate::delivery::Keyboard;
use crate::policy::ChannelPolicy;
use crate::quota;
use crate::render;
use crate::repo::RepoError;

/// Everything decided about a new submission before anything is sent.
struct Intake {
    status: PostStatus,
    prompt: String,
    keyboard: Option<Keyboard>,
    tags: u32,
    direct: bool,
    anonymous: bool,
}

impl Engine {
    /// Refusals that apply to any new submission, single or bundle.
    fn precheck(&self, user: &User, item: &IncomingItem) -> Option<Refusal> {
        if user.is_banned {
            return Some(Refusal::Banned);
        }
        if self.settings.review_group.is_none() {
            return Some(Refusal::ReviewGroupMissing);
        }
        let text = item.text_or_empty();
        if item.kind == ContentKind::Text && text.trim().is_empty() {
            return Some(Refusal::EmptyText);
        }
        if text.chars().count() > self.settings.max_text_len {
            return Some(Refusal::TextTooLong(self.settings.max_text_len));
        }
        if item.kind != ContentKind::Text && item.media.is_none() {
            return Some(Refusal::MissingMedia);
        }
        if let Some(from) = item.forwarded_from {
            let own = [Some(self.settings.accept_channel), Some(self.settings.reject_channel), self.settings.second_channel];
            if own.contains(&Some(from.chat_id)) && !user.may_review() {
                return Some(Refusal::RepostFromOwnChannel);
            }
        }
        None
    }

    async fn channel_policy(&self, item: &IncomingItem) -> EngineResult<ChannelPolicy> {
        match item.forwarded_from {
            Some(from) => Ok(self.channels.resolve(from.chat_id).await?),
            None => Ok(ChannelPolicy::Normal),
        }
    }

    /// Prechecks, quota and channel policy for the first item of a submission.
    async fn admit_submission(&self, user: &User, item: &IncomingItem) -> EngineResult<Result<Intake, Refusal>> {
        if let Some(r) = self.precheck(user, item) {
            return Ok(Err(r));
        }
        let opts = self.quota.post_options();
        if let Some(q) = quota::evaluate_submission(&*self.repo, user, &opts).await? {
            info!(submitter = user.id, refusal = %q, "submission over quota");
            return Ok(Err(Refusal::Quota(q)));
        }
        let policy = self.channel_policy(item).await?;

        let direct = user.direct_post;
        let anonymous = user.prefer_anonymous;
        let tags = self.tags.detect(item.text_or_empty());
        let spoiler = item.kind.can_spoiler().then_some(item.has_spoiler);
        let keyboard = if direct {
            render::direct_post_keyboard(&*self.tags, tags, spoiler)
        } else {
            render::post_keyboard(anonymous)
        };
        let mut intake = Intake {
            status: if direct { PostStatus::Reviewing } else { PostStatus::Padding },
            prompt: render::confirmation_text(direct, policy == ChannelPolicy::SuppressOrigin),
            keyboard: Some(keyboard),
            tags,
            direct,
            anonymous,
        };
        if policy == ChannelPolicy::AutoReject {
            intake.prompt = render::AUTO_REJECT_NOTICE.to_string();
            intake.keyboard = None;
            intake.status = PostStatus::Rejected;
        }
        Ok(Ok(intake))
    }

    fn raw_link_warning(&self, item: &IncomingItem) -> Option<String> {
        if !self.settings.warn_raw_link {
            return None;
        }
        render::raw_link_warning(item.text_or_empty())
    }

    fn media_warning(item: &IncomingItem) -> Option<String> {
        item.media.as_ref().and_then(|m| render::blurry_warning(item.kind, m))
    }

    fn new_post(&self, submitter: UserId, item: &IncomingItem, intake: &Intake, action: Location, bundle_id: Option<&str>) -> NewPost {
        let bundle = bundle_id.map(str::to_string);
        NewPost {
            origin: item.location,
            origin_action: action,
            review: intake.direct.then_some(item.location),
            review_action: intake.direct.then_some(action),
            origin_bundle_id: bundle.clone(),
            review_bundle_id: if intake.direct { bundle } else { None },
            kind: item.kind,
            text: item.text_or_empty().trim().to_string(),
            raw_text: item.text_or_empty().to_string(),
            tags: intake.tags,
            has_spoiler: item.kind.can_spoiler() && item.has_spoiler,
            anonymous: intake.anonymous,
            forwarded_from: item.forwarded_from,
            submitter_id: submitter,
            reject_reason: (intake.status == PostStatus::Rejected).then(|| render::AUTO_REJECT_NOTICE.to_string()),
            status: intake.status,
        }
    }

    async fn store_attachment(&self, post_id: Id, item: &IncomingItem) -> EngineResult<()> {
        if let Some(media) = item.media.clone() {
            self.repo
                .create_attachment(NewAttachment { post_id, kind: item.kind, media })
                .await?;
        }
        Ok(())
    }

    fn record_created(&self, post: &Post) {
        metrics::increment_counter!("postflow_posts_created_total");
        info!(
            post_id = post.id,
            submitter = post.submitter_id,
            bundle_id = post.origin_bundle_id.as_deref().unwrap_or(""),
            status = %post.status,
            kind = %post.kind,
            "post created"
        );
    }

    pub async fn on_single_item(&self, submitter: UserId, item: IncomingItem) -> EngineResult<Outcome> {
        let user = self.load_user(submitter).await?;
        let mut intake = match self.admit_submission(&user, &item).await? {
            Ok(i) => i,
            Err(r) => return Ok(self.refuse(r)),
        };
        if intake.status != PostStatus::Rejected {
            if let Some(w) = self.raw_link_warning(&item).or_else(|| Self::media_warning(&item)) {
                intake.prompt = render::with_warning(&intake.prompt, Some(&w));
                if !intake.direct {
                    intake.keyboard = Some(render::warning_keyboard());
                }
            }
        }

        let action = self
            .delivery
            .send(
                item.location.chat_id,
                &OutboundContent::text(intake.prompt.clone()),
                intake.keyboard.as_ref(),
                Some(item.location.message_id),
            )
            .await?
            .location;
        let post = self.repo.create_post(self.new_post(submitter, &item, &intake, action, None)).await?;
        self.store_attachment(post.id, &item).await?;
        self.record_created(&post);
        Ok(Outcome::done(format!("post {} created", post.id)))
    }

    pub async fn on_bundle_item(&self, submitter: UserId, item: IncomingItem, bundle_id: &str) -> EngineResult<Outcome> {
        let mut draft = self.buffer.admit(bundle_id).await;
        if draft.declined {
            return Ok(Outcome::done("bundle was refused, item ignored"));
        }
        if !draft.initialised {
            // An error here leaves the draft uninitialised so the next member retries.
            match self.open_bundle(submitter, &item, bundle_id).await? {
                Ok(opened) => {
                    draft.post_id = Some(opened.post_id);
                    draft.pending = opened.pending;
                    draft.warning = opened.warning;
                    draft.initialised = true;
                }
                Err(refusal) => {
                    draft.declined = true;
                    draft.initialised = true;
                    return Ok(self.refuse(refusal));
                }
            }
        }
        let Some(post_id) = draft.post_id else {
            return Ok(Outcome::done("bundle has no record, item ignored"));
        };
        self.store_attachment(post_id, &item).await?;
        draft.attachments += 1;
        if draft.warning.is_none() {
            draft.warning = Self::media_warning(&item);
        }
        Ok(Outcome::done(format!("attachment {} added to post {post_id}", draft.attachments)))
    }

    /// Creates (or finds) the record behind a bundle on its first admitted member.
    async fn open_bundle(&self, submitter: UserId, item: &IncomingItem, bundle_id: &str) -> EngineResult<Result<OpenedBundle, Refusal>> {
        if let Some(existing) = self.repo.find_by_bundle(bundle_id).await? {
            info!(post_id = existing.id, bundle_id, "bundle resumed from store");
            return Ok(Ok(OpenedBundle::existing(existing.id)));
        }
        let user = self.load_user(submitter).await?;
        let intake = match self.admit_submission(&user, item).await? {
            Ok(i) => i,
            Err(r) => return Ok(Err(r)),
        };
        let processing = match intake.status {
            PostStatus::Rejected => render::AUTO_REJECT_NOTICE.to_string(),
            _ if intake.prompt.contains(render::SUPPRESS_ORIGIN_NOTICE) => {
                format!("{}\n{}", render::PROCESSING, render::SUPPRESS_ORIGIN_NOTICE)
            }
            _ => render::PROCESSING.to_string(),
        };
        let action = self
            .delivery
            .send(item.location.chat_id, &OutboundContent::text(processing), None, Some(item.location.message_id))
            .await?
            .location;
        let new = self.new_post(submitter, item, &intake, action, Some(bundle_id));
        let post = match self.repo.create_post(new).await {
            Ok(p) => p,
            Err(RepoError::Conflict) => {
                let existing = self.repo.find_by_bundle(bundle_id).await?.ok_or(EngineError::NotFound)?;
                warn!(post_id = existing.id, bundle_id, "bundle record already existed");
                return Ok(Ok(OpenedBundle::existing(existing.id)));
            }
            Err(e) => return Err(e.into()),
        };
        self.record_created(&post);
        let pending = intake.keyboard.map(|keyboard| PendingConfirmation { at: action, text: intake.prompt, keyboard, direct: intake.direct });
        let warning = match post.status {
            PostStatus::Rejected => None,
            _ => self.raw_link_warning(item),
        };
        Ok(Ok(OpenedBundle { post_id: post.id, pending, warning }))
    }

    /// Finalizes every bundle whose debounce window elapsed. Returns how many closed.
    pub async fn sweep_bundles(&self) -> usize {
        let done = self.buffer.take_expired(Instant::now());
        for f in &done {
            metrics::increment_counter!("postflow_bundles_finalized_total");
            info!(bundle_id = %f.bundle_id, post_id = ?f.post_id, attachments = f.attachments, "bundle finalized");
            let Some(pending) = &f.pending else { continue };
            let warning = f.warning.as_deref();
            let keyboard = match warning {
                Some(_) if !pending.direct => render::warning_keyboard(),
                _ => pending.keyboard.clone(),
            };
            let text = render::with_warning(&pending.text, warning);
            if let Err(e) = self.delivery.edit_text(pending.at, &text, Some(&keyboard)).await {
                error!(bundle_id = %f.bundle_id, error = %e, "failed to show bundle confirmation");
            }
        }
        done.len()
    }
}

struct OpenedBundle {
    post_id: Id,
    pending: Option<PendingConfirmation>,
    warning: Option<String>,
}

impl OpenedBundle {
    fn existing(post_id: Id) -> Self {
        Self { post_id, pending: None, warning: None }
    }
}
