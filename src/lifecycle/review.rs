use tracing::{info, warn};

use super::*;
use crate::render;

impl Engine {
    pub async fn on_reviewer_action(&self, reviewer: UserId, post_ref: &PostRef, action: ReviewerAction) -> EngineResult<Outcome> {
        let post = self.resolve(post_ref).await?;
        let actor = self.load_user(reviewer).await?;
        let self_review = post.is_direct_post() && post.submitter_id == reviewer;
        if !actor.may_review() && !self_review {
            return Ok(self.refuse(Refusal::NotReviewer));
        }
        if post.status.is_expired() {
            return Ok(self.refuse(Refusal::Expired));
        }
        let in_source_state = match &action {
            ReviewerAction::Accept | ReviewerAction::AcceptSecondary | ReviewerAction::Reject { .. } => {
                matches!(post.status, PostStatus::Reviewing | PostStatus::InPlan)
            }
            ReviewerAction::AcceptScheduled | ReviewerAction::SetTag { .. } | ReviewerAction::ToggleSpoiler => {
                post.status == PostStatus::Reviewing
            }
            ReviewerAction::Revoke => post.status.is_published(),
        };
        if !in_source_state {
            return Ok(self.refuse(Refusal::AlreadyProcessed));
        }

        match action {
            ReviewerAction::Accept => self.accept(post, actor, false, false).await,
            ReviewerAction::AcceptSecondary => self.accept(post, actor, true, false).await,
            ReviewerAction::AcceptScheduled => self.accept(post, actor, false, true).await,
            ReviewerAction::Reject { reason, counts_against_quota, custom_text } => {
                self.reject(post, actor, reason, counts_against_quota, custom_text).await
            }
            ReviewerAction::Revoke => self.revoke(post, actor).await,
            ReviewerAction::SetTag { tag } => self.toggle_tag(post, &tag).await,
            ReviewerAction::ToggleSpoiler => self.toggle_spoiler(post).await,
        }
    }

    async fn accept(&self, post: Post, reviewer: User, secondary: bool, scheduled: bool) -> EngineResult<Outcome> {
        let submitter = self.load_user(post.submitter_id).await?;
        if submitter.is_banned {
            return self.reject_banned(post, &submitter, &reviewer).await;
        }
        if scheduled {
            let upd = PostUpdate { status: Some(PostStatus::InPlan), reviewer_id: Some(reviewer.id), ..Default::default() };
            self.repo.update_post(post.id, upd).await?;
            self.record_transition(post.id, PostStatus::InPlan);
            if let Some(at) = post.review_action {
                let text = render::review_outcome(&submitter, &reviewer, post.anonymous, render::SCHEDULED_OUTCOME);
                if let Err(e) = self.delivery.edit_text(at, &text, None).await {
                    warn!(post_id = post.id, error = %e, "failed to update review message");
                }
            }
            return Ok(Outcome::done(render::SCHEDULED_OUTCOME));
        }
        let (dest, status) = if secondary {
            match self.settings.second_channel {
                Some(c) => (c, PostStatus::AcceptedSecondary),
                None => return Ok(self.refuse(Refusal::SecondChannelMissing)),
            }
        } else {
            (self.settings.accept_channel, PostStatus::Accepted)
        };
        self.publish(&post, &submitter, &reviewer, dest, status).await
    }

    async fn reject(&self, post: Post, reviewer: User, reason: String, counts: bool, custom_text: Option<String>) -> EngineResult<Outcome> {
        let submitter = self.load_user(post.submitter_id).await?;
        if submitter.is_banned {
            return self.reject_banned(post, &submitter, &reviewer).await;
        }
        let archive = self.build_content(&post, None, false).await?;
        self.delivery.send(self.settings.reject_channel, &archive, None, None).await?;

        let upd = PostUpdate {
            status: Some(PostStatus::Rejected),
            reject_reason: Some(reason.clone()),
            count_reject: Some(counts),
            reviewer_id: Some(reviewer.id),
            ..Default::default()
        };
        let updated = self.repo.update_post(post.id, upd).await?;
        self.record_transition(post.id, PostStatus::Rejected);
        info!(post_id = post.id, reviewer = reviewer.id, reason = %reason, counts, "post rejected");

        let shown = custom_text.unwrap_or(reason);
        if let Some(at) = post.review_action {
            let text = render::review_outcome(&submitter, &reviewer, post.anonymous, &render::rejected_outcome(&shown));
            if let Err(e) = self.delivery.edit_text(at, &text, None).await {
                warn!(post_id = post.id, error = %e, "failed to update review message");
            }
        }
        self.notify_submitter(&updated, &submitter, reviewer.id, &render::rejected_notice(&shown)).await;

        self.bump(submitter.id, CounterDelta { reject: 1, ..Default::default() }).await;
        if reviewer.id != submitter.id {
            self.bump(reviewer.id, CounterDelta { review: 1, ..Default::default() }).await;
        }
        Ok(Outcome::done(render::rejected_outcome(&shown)))
    }

    /// Disposition for a banned submitter: rejected and counted, nothing delivered.
    pub(super) async fn reject_banned(&self, post: Post, submitter: &User, reviewer: &User) -> EngineResult<Outcome> {
        let upd = PostUpdate {
            status: Some(PostStatus::Rejected),
            reject_reason: Some(render::BANNED_REASON.to_string()),
            count_reject: Some(true),
            reviewer_id: Some(reviewer.id),
            ..Default::default()
        };
        self.repo.update_post(post.id, upd).await?;
        self.record_transition(post.id, PostStatus::Rejected);
        info!(post_id = post.id, submitter = submitter.id, reviewer = reviewer.id, "banned submitter, post rejected");
        if let Some(at) = post.review_action {
            let text = render::review_outcome(submitter, reviewer, post.anonymous, render::BANNED_SUBMITTER);
            if let Err(e) = self.delivery.edit_text(at, &text, None).await {
                warn!(post_id = post.id, error = %e, "failed to update review message");
            }
        }
        Ok(Outcome::done(render::BANNED_SUBMITTER))
    }

    async fn revoke(&self, post: Post, reviewer: User) -> EngineResult<Outcome> {
        self.repo.update_post(post.id, PostUpdate::status(PostStatus::Revoked)).await?;
        self.record_transition(post.id, PostStatus::Revoked);
        info!(post_id = post.id, reviewer = reviewer.id, "post revoked");
        Ok(Outcome::done("revoked"))
    }

    async fn toggle_spoiler(&self, post: Post) -> EngineResult<Outcome> {
        if !post.kind.can_spoiler() {
            return Ok(self.refuse(Refusal::SpoilerUnsupported));
        }
        let upd = PostUpdate { has_spoiler: Some(!post.has_spoiler), ..Default::default() };
        let post = self.repo.update_post(post.id, upd).await?;
        let at = if post.is_direct_post() { Some(post.origin_action) } else { post.review_action };
        if let Some(at) = at {
            let keyboard = render::controls_for(&*self.tags, &post, self.has_secondary());
            self.delivery.edit_markup(at, Some(&keyboard)).await?;
        }
        Ok(Outcome::done(if post.has_spoiler { "spoiler on" } else { "spoiler off" }))
    }
}
