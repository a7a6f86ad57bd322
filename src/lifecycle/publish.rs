use tracing::{info, warn};

use super::*;
use crate::delivery::{MediaItem, MediaKind};
use crate::policy::ChannelPolicy;
use crate::render;

impl Engine {
    /// Outbound form of a post. Fails before anything is sent when a kind cannot be delivered.
    pub(super) async fn build_content(&self, post: &Post, caption: Option<String>, spoiler: bool) -> EngineResult<OutboundContent> {
        if post.kind == ContentKind::Text {
            return Ok(OutboundContent::Text { text: caption.unwrap_or_else(|| post.text.clone()), link_preview: false });
        }
        if post.is_bundle() {
            return self.build_album(post, caption, spoiler).await;
        }
        let kind = MediaKind::try_from(post.kind).map_err(EngineError::UnsupportedKind)?;
        let attachment = self
            .repo
            .list_attachments(post.id)
            .await?
            .into_iter()
            .next()
            .ok_or(EngineError::MissingAttachment(post.id))?;
        Ok(OutboundContent::Media(MediaItem {
            kind,
            file_id: attachment.file_id,
            caption,
            spoiler: spoiler && post.kind.can_spoiler(),
        }))
    }

    async fn build_album(&self, post: &Post, caption: Option<String>, spoiler: bool) -> EngineResult<OutboundContent> {
        let attachments = self.repo.list_attachments(post.id).await?;
        if attachments.is_empty() {
            return Err(EngineError::MissingAttachment(post.id));
        }
        let mut items = Vec::with_capacity(attachments.len());
        for a in attachments {
            let kind = match a.kind {
                ContentKind::Unsupported => post.kind,
                k => k,
            };
            let media = match kind {
                ContentKind::Photo => MediaKind::Photo,
                ContentKind::Video => MediaKind::Video,
                ContentKind::Audio | ContentKind::Voice => MediaKind::Audio,
                ContentKind::Document => MediaKind::Document,
                ContentKind::Animation | ContentKind::Text | ContentKind::Unsupported => {
                    return Err(EngineError::UnsupportedKind(kind))
                }
            };
            items.push(MediaItem {
                kind: media,
                file_id: a.file_id,
                caption: None,
                spoiler: spoiler && matches!(media, MediaKind::Photo | MediaKind::Video),
            });
        }
        // one caption per album: last item of an all-document album, first item otherwise
        let slot = if items.iter().all(|m| m.kind == MediaKind::Document) { items.len() - 1 } else { 0 };
        items[slot].caption = caption;
        Ok(OutboundContent::Album(items))
    }

    /// Delivers the post to `dest` and records the publication.
    pub(super) async fn publish(&self, post: &Post, submitter: &User, reviewer: &User, dest: ChatId, status: PostStatus) -> EngineResult<Outcome> {
        let policy = self.source_policy(post).await?;
        let text = render::publication_text(post, submitter, &self.tags.active_names(post.tags), policy != ChannelPolicy::SuppressOrigin);
        let content = self.build_content(post, Some(text), post.has_spoiler).await?;

        let warnings = self.tags.warnings(post.tags);
        let warn_text_id = if warnings.is_empty() {
            None
        } else {
            Some(self.delivery.send(dest, &OutboundContent::text(warnings), None, None).await?.location.message_id)
        };
        let delivered = self.delivery.send(dest, &content, None, None).await?;

        let upd = PostUpdate {
            status: Some(status),
            reviewer_id: Some(reviewer.id),
            publication: Some(delivered.location),
            publish_bundle_id: delivered.bundle_id,
            warn_text_id,
            ..Default::default()
        };
        let updated = self.repo.update_post(post.id, upd).await?;
        self.record_transition(post.id, status);
        info!(post_id = post.id, reviewer = reviewer.id, submitter = submitter.id, channel = dest, "post published");

        let direct = post.is_direct_post();
        if direct {
            if let Some(group) = self.settings.review_group {
                let record = OutboundContent::text(render::direct_publish_record(submitter, post.anonymous));
                if let Err(e) = self.delivery.send(group, &record, None, None).await {
                    warn!(post_id = post.id, error = %e, "failed to leave direct-publish record");
                }
            }
        } else if let Some(at) = post.review_action {
            let outcome = render::accepted_outcome(status == PostStatus::AcceptedSecondary);
            let text = render::review_outcome(submitter, reviewer, post.anonymous, outcome);
            if let Err(e) = self.delivery.edit_text(at, &text, None).await {
                warn!(post_id = post.id, error = %e, "failed to update review message");
            }
        }
        self.notify_submitter(&updated, submitter, reviewer.id, render::accepted_notice(direct)).await;

        let own = CounterDelta { accept: 1, post: i64::from(direct), ..Default::default() };
        self.bump(submitter.id, own).await;
        if !direct && reviewer.id != submitter.id {
            self.bump(reviewer.id, CounterDelta { review: 1, ..Default::default() }).await;
        }
        Ok(Outcome::done(render::accepted_outcome(status == PostStatus::AcceptedSecondary)))
    }

    /// Publishes the oldest scheduled post to the primary channel, if any.
    pub async fn run_scheduled_publication(&self) -> EngineResult<Option<Id>> {
        let Some(post) = self.repo.first_in_plan().await? else {
            return Ok(None);
        };
        let submitter = self.load_user(post.submitter_id).await?;
        let reviewer = match post.reviewer_id {
            Some(id) if id != submitter.id => self.load_user(id).await?,
            _ => submitter.clone(),
        };
        let id = post.id;
        if submitter.is_banned {
            self.reject_banned(post, &submitter, &reviewer).await?;
        } else {
            self.publish(&post, &submitter, &reviewer, self.settings.accept_channel, PostStatus::Accepted).await?;
        }
        Ok(Some(id))
    }
}
