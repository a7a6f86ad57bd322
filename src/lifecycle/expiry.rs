use chrono::Utc;
use tracing::warn;

use super::*;
use crate::render;

impl Engine {
    /// Moves posts left too long in `Padding` or `Reviewing` to their timed-out state.
    pub async fn expire_stale(&self) -> EngineResult<usize> {
        let now = Utc::now();
        let rules = [
            (PostStatus::Padding, self.settings.confirm_timeout, PostStatus::ConfirmTimedOut, render::CONFIRM_EXPIRED),
            (PostStatus::Reviewing, self.settings.review_timeout, PostStatus::ReviewTimedOut, render::REVIEW_EXPIRED),
        ];
        let mut expired = 0;
        for (from, timeout, to, notice) in rules {
            let Some(before) = chrono::Duration::from_std(timeout).ok().and_then(|d| now.checked_sub_signed(d)) else {
                continue;
            };
            for post in self.repo.find_stale(from, before).await? {
                self.repo.update_post(post.id, PostUpdate::status(to)).await?;
                self.record_transition(post.id, to);
                expired += 1;
                if let Err(e) = self.delivery.edit_text(post.origin_action, notice, None).await {
                    warn!(post_id = post.id, error = %e, "failed to post expiry notice");
                }
            }
        }
        Ok(expired)
    }
}
