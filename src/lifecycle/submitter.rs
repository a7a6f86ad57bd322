use tracing::{info, warn};

use super::*;
use crate::policy::ChannelPolicy;
use crate::quota;
use crate::render;

impl Engine {
    pub async fn on_submitter_action(&self, submitter: UserId, post_ref: &PostRef, action: SubmitterAction) -> EngineResult<Outcome> {
        let post = self.resolve(post_ref).await?;
        if post.status.is_expired() {
            return Ok(self.refuse(Refusal::Expired));
        }
        // tags of a direct post stay with its submitter until it is published
        let in_source_state = match action {
            SubmitterAction::SetTag { .. } => post.status == PostStatus::Reviewing && post.is_direct_post(),
            _ => post.status == PostStatus::Padding,
        };
        if !in_source_state {
            return Ok(self.refuse(Refusal::AlreadyProcessed));
        }
        if post.submitter_id != submitter {
            return Ok(self.refuse(Refusal::NotYourSubmission));
        }

        match action {
            SubmitterAction::Confirm => self.confirm(post).await,
            SubmitterAction::Cancel => self.cancel(post).await,
            SubmitterAction::ToggleAnonymous => self.toggle_anonymous(post).await,
            SubmitterAction::DismissWarning => self.dismiss_warning(post).await,
            SubmitterAction::SetTag { tag } => self.toggle_tag(post, &tag).await,
        }
    }

    async fn confirm(&self, post: Post) -> EngineResult<Outcome> {
        let user = self.load_user(post.submitter_id).await?;
        let Some(group) = self.settings.review_group else {
            return Ok(self.refuse(Refusal::ReviewGroupMissing));
        };
        let opts = self.quota.post_options();
        if let Some(q) = quota::evaluate_confirmation(&*self.repo, &user, &opts).await? {
            info!(post_id = post.id, submitter = user.id, refusal = %q, "confirmation over quota");
            return Ok(self.refuse(Refusal::Quota(q)));
        }

        let (review, review_bundle_id) = if post.is_bundle() {
            let caption = (!post.text.is_empty()).then(|| post.text.clone());
            let album = self.build_content(&post, caption, post.has_spoiler).await?;
            let sent = self.delivery.send(group, &album, None, None).await?;
            (sent.location, sent.bundle_id)
        } else {
            (self.delivery.forward(group, post.origin).await?, None)
        };
        let text = render::review_message(&user, post.anonymous, &self.tags.active_names(post.tags));
        let keyboard = render::review_keyboard(&*self.tags, post.tags, post.spoiler_state(), self.has_secondary());
        let manage = self
            .delivery
            .send(group, &OutboundContent::text(text), Some(&keyboard), Some(review.message_id))
            .await?
            .location;

        let upd = PostUpdate {
            status: Some(PostStatus::Reviewing),
            review: Some(review),
            review_action: Some(manage),
            review_bundle_id,
            ..Default::default()
        };
        self.repo.update_post(post.id, upd).await?;
        self.record_transition(post.id, PostStatus::Reviewing);
        self.bump(user.id, CounterDelta { post: 1, ..Default::default() }).await;

        if let Err(e) = self.delivery.edit_text(post.origin_action, render::SUBMITTED, None).await {
            warn!(post_id = post.id, error = %e, "failed to update submitter status message");
        }
        Ok(Outcome::done(render::SUBMITTED))
    }

    async fn cancel(&self, post: Post) -> EngineResult<Outcome> {
        self.repo.update_post(post.id, PostUpdate::status(PostStatus::Cancelled)).await?;
        self.record_transition(post.id, PostStatus::Cancelled);
        self.delivery.edit_text(post.origin_action, render::CANCELLED, None).await?;
        Ok(Outcome::done(render::CANCELLED))
    }

    async fn toggle_anonymous(&self, post: Post) -> EngineResult<Outcome> {
        let upd = PostUpdate { anonymous: Some(!post.anonymous), ..Default::default() };
        let post = self.repo.update_post(post.id, upd).await?;
        self.delivery.edit_markup(post.origin_action, Some(&render::post_keyboard(post.anonymous))).await?;
        let msg = if post.anonymous { "posting anonymously" } else { "posting with your name" };
        Ok(Outcome::done(msg))
    }

    async fn dismiss_warning(&self, post: Post) -> EngineResult<Outcome> {
        let suppress = self.source_policy(&post).await? == ChannelPolicy::SuppressOrigin;
        let prompt = render::confirmation_text(false, suppress);
        let keyboard = render::post_keyboard(post.anonymous);
        self.delivery.edit_text(post.origin_action, &prompt, Some(&keyboard)).await?;
        Ok(Outcome::done("warning dismissed"))
    }

    /// Flips one tag bit and refreshes whichever controls show the tags.
    pub(super) async fn toggle_tag(&self, post: Post, selector: &TagSelector) -> EngineResult<Outcome> {
        let tag = match selector {
            TagSelector::Bit(bit) => self.tags.by_bit(*bit),
            TagSelector::Payload(p) => self.tags.by_payload(p),
        };
        let Some(tag) = tag.filter(|t| t.enabled) else {
            return Ok(self.refuse(Refusal::UnknownTag));
        };
        let upd = PostUpdate { tags: Some(self.tags.sanitize(post.tags ^ tag.mask())), ..Default::default() };
        let post = self.repo.update_post(post.id, upd).await?;
        let names = self.tags.active_names(post.tags);

        let at = if post.is_direct_post() { Some(post.origin_action) } else { post.review_action };
        if let Some(at) = at {
            let keyboard = render::controls_for(&*self.tags, &post, self.has_secondary());
            self.delivery.edit_markup(at, Some(&keyboard)).await?;
        }
        Ok(Outcome::done(format!("current tags: {names}")))
    }
}
