#![cfg(feature = "inmem-store")]

mod common;

use std::time::Duration;

use common::*;
use postflow::lifecycle::{PostRef, Refusal, ReviewerAction, SubmitterAction};
use postflow::models::PostStatus;
use postflow::render;

#[tokio::test]
async fn stale_padding_times_out() {
    let mut b = Builder::default();
    b.settings.confirm_timeout = Duration::ZERO;
    let h = b.build().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "forgotten")).await.unwrap();
    let post = h.post(1).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(h.engine.expire_stale().await.unwrap(), 1);
    assert_eq!(h.post(1).await.status, PostStatus::ConfirmTimedOut);
    assert_eq!(h.delivery.text_edits_at(post.origin_action), vec![(render::CONFIRM_EXPIRED.to_string(), None)]);

    let out = h.engine.on_submitter_action(SUBMITTER, &PostRef::Id { post_id: 1 }, SubmitterAction::Confirm).await.unwrap();
    assert_eq!(out.refusal(), Some(&Refusal::Expired));
    // already expired posts are not picked up again
    assert_eq!(h.engine.expire_stale().await.unwrap(), 0);
}

#[tokio::test]
async fn stale_review_times_out() {
    let mut b = Builder::default();
    b.settings.review_timeout = Duration::ZERO;
    let h = b.build().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "ignored")).await.unwrap();
    h.engine.on_submitter_action(SUBMITTER, &PostRef::Id { post_id: 1 }, SubmitterAction::Confirm).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(h.engine.expire_stale().await.unwrap(), 1);
    assert_eq!(h.post(1).await.status, PostStatus::ReviewTimedOut);
    let out = h.engine.on_reviewer_action(REVIEWER, &PostRef::Id { post_id: 1 }, ReviewerAction::Accept).await.unwrap();
    assert_eq!(out.refusal(), Some(&Refusal::Expired));
}

#[tokio::test]
async fn fresh_posts_are_left_alone() {
    let h = harness().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "new")).await.unwrap();
    assert_eq!(h.engine.expire_stale().await.unwrap(), 0);
    assert_eq!(h.post(1).await.status, PostStatus::Padding);
}
