#![cfg(feature = "inmem-store")]

mod common;

use std::time::Duration;

use common::*;
use postflow::delivery::OutboundContent;
use postflow::lifecycle::{PostRef, Refusal, ReviewerAction, SubmitterAction, TagSelector};
use postflow::models::{ContentKind, IncomingItem, Location, PostStatus, PostUpdate};
use postflow::policy::StaticChannelPolicy;
use postflow::quota::QuotaRefusal;
use postflow::render;
use postflow::repo::PostRepo;

fn by_id(post_id: i64) -> PostRef {
    PostRef::Id { post_id }
}

#[tokio::test]
async fn confirm_forwards_to_review_group() {
    let h = harness().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "hello")).await.unwrap();
    let post = h.post_at(at(1)).await;
    h.delivery.clear();

    // the action message is a valid handle too
    let handle = PostRef::Location { chat_id: post.origin_action.chat_id, message_id: post.origin_action.message_id };
    let out = h.engine.on_submitter_action(SUBMITTER, &handle, SubmitterAction::Confirm).await.unwrap();
    assert_eq!(out.message(), render::SUBMITTED);

    let calls = h.delivery.calls();
    assert_eq!(calls[0], Call::Forward { chat: REVIEW_GROUP, from: post.origin });
    let post = h.post(post.id).await;
    assert_eq!(post.status, PostStatus::Reviewing);
    let review = post.review.expect("review location");
    let review_action = post.review_action.expect("review action");
    match &calls[1] {
        Call::Send { chat, content: OutboundContent::Text { text, .. }, markup, reply_to } => {
            assert_eq!(*chat, REVIEW_GROUP);
            assert!(text.contains("alice"));
            assert_eq!(*reply_to, Some(review.message_id));
            assert_eq!(markup.as_ref(), Some(&render::review_keyboard(&h.tags, 0, None, false)));
        }
        other => panic!("unexpected call {other:?}"),
    }
    assert_eq!(review_action.chat_id, REVIEW_GROUP);
    assert_eq!(h.delivery.text_edits_at(post.origin_action), vec![(render::SUBMITTED.to_string(), None)]);
    assert_eq!(h.user(SUBMITTER).await.post_count, 1);

    let again = h.engine.on_submitter_action(SUBMITTER, &by_id(post.id), SubmitterAction::Confirm).await.unwrap();
    assert_eq!(again.refusal(), Some(&Refusal::AlreadyProcessed));
}

#[tokio::test]
async fn only_the_submitter_may_act() {
    let h = harness().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "mine")).await.unwrap();
    h.delivery.clear();
    for action in [SubmitterAction::Confirm, SubmitterAction::Cancel, SubmitterAction::ToggleAnonymous] {
        let out = h.engine.on_submitter_action(OUTSIDER, &by_id(1), action).await.unwrap();
        assert_eq!(out.refusal(), Some(&Refusal::NotYourSubmission));
    }
    assert!(h.delivery.calls().is_empty());
    assert_eq!(h.post(1).await.status, PostStatus::Padding);
}

#[tokio::test]
async fn cancel_is_final() {
    let h = harness().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "nevermind")).await.unwrap();
    let post = h.post(1).await;
    let out = h.engine.on_submitter_action(SUBMITTER, &by_id(1), SubmitterAction::Cancel).await.unwrap();
    assert!(out.is_done());
    assert_eq!(h.post(1).await.status, PostStatus::Cancelled);
    assert_eq!(h.delivery.text_edits_at(post.origin_action), vec![(render::CANCELLED.to_string(), None)]);

    let out = h.engine.on_submitter_action(SUBMITTER, &by_id(1), SubmitterAction::Confirm).await.unwrap();
    assert_eq!(out.refusal(), Some(&Refusal::AlreadyProcessed));
}

#[tokio::test]
async fn anonymous_toggle_redraws_controls() {
    let h = harness().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "hi")).await.unwrap();
    let post = h.post(1).await;
    h.engine.on_submitter_action(SUBMITTER, &by_id(1), SubmitterAction::ToggleAnonymous).await.unwrap();
    assert!(h.post(1).await.anonymous);
    h.engine.on_submitter_action(SUBMITTER, &by_id(1), SubmitterAction::ToggleAnonymous).await.unwrap();
    assert!(!h.post(1).await.anonymous);
    assert_eq!(
        h.delivery.markup_edits_at(post.origin_action),
        vec![Some(render::post_keyboard(true)), Some(render::post_keyboard(false))]
    );
}

#[tokio::test]
async fn dismissing_warning_restores_prompt() {
    let h = harness().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "https://youtu.be/abc")).await.unwrap();
    let post = h.post(1).await;
    h.engine.on_submitter_action(SUBMITTER, &by_id(1), SubmitterAction::DismissWarning).await.unwrap();
    assert_eq!(
        h.delivery.text_edits_at(post.origin_action),
        vec![(render::CONFIRM_PROMPT.to_string(), Some(render::post_keyboard(false)))]
    );
    assert_eq!(h.post(1).await.status, PostStatus::Padding);
}

#[tokio::test]
async fn review_queue_quota_applies_at_confirm() {
    let h = harness().await;
    for i in 1..=2 {
        h.engine.on_single_item(SUBMITTER, text_item(i, "post")).await.unwrap();
    }
    assert!(h.engine.on_submitter_action(SUBMITTER, &by_id(1), SubmitterAction::Confirm).await.unwrap().is_done());
    h.delivery.clear();
    let out = h.engine.on_submitter_action(SUBMITTER, &by_id(2), SubmitterAction::Confirm).await.unwrap();
    assert_eq!(out.refusal(), Some(&Refusal::Quota(QuotaRefusal::ReviewQueue { count: 1, limit: 1 })));
    assert_eq!(h.post(2).await.status, PostStatus::Padding);
    assert!(h.delivery.calls().is_empty());
}

#[tokio::test]
async fn expired_posts_refuse_every_action() {
    let h = harness().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "late")).await.unwrap();
    h.repo.update_post(1, PostUpdate::status(PostStatus::ConfirmTimedOut)).await.unwrap();
    for action in [SubmitterAction::Confirm, SubmitterAction::Cancel, SubmitterAction::DismissWarning] {
        let out = h.engine.on_submitter_action(SUBMITTER, &by_id(1), action).await.unwrap();
        assert_eq!(out.refusal(), Some(&Refusal::Expired));
    }
}

#[tokio::test(start_paused = true)]
async fn confirming_a_bundle_sends_an_album() {
    let h = harness().await;
    let e = &h.engine;
    e.on_bundle_item(SUBMITTER, media_item(1, ContentKind::Photo, "p1", Some("pair")), "g").await.unwrap();
    e.on_bundle_item(SUBMITTER, media_item(2, ContentKind::Photo, "p2", None), "g").await.unwrap();
    tokio::time::advance(Duration::from_millis(1600)).await;
    e.sweep_bundles().await;
    h.delivery.clear();

    let out = e
        .on_submitter_action(SUBMITTER, &PostRef::Bundle { bundle_id: "g".into() }, SubmitterAction::Confirm)
        .await
        .unwrap();
    assert!(out.is_done());
    let sent = h.delivery.sends_to(REVIEW_GROUP);
    let OutboundContent::Album(items) = &sent[0] else { panic!("expected album, got {:?}", sent[0]) };
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].caption.as_deref(), Some("pair"));
    assert_eq!(items[1].caption, None);

    let post = h.repo.find_by_bundle("g").await.unwrap().unwrap();
    assert_eq!(post.status, PostStatus::Reviewing);
    let review_bundle = post.review_bundle_id.clone().expect("album group id");
    // the review copy's group id resolves to the same record
    assert_eq!(h.repo.find_by_bundle(&review_bundle).await.unwrap().unwrap().id, post.id);
}

#[tokio::test]
async fn direct_post_is_published_by_its_submitter() {
    let mut b = Builder::default();
    b.submitter.direct_post = true;
    let h = b.build().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "straight out")).await.unwrap();
    let post = h.post(1).await;
    assert_eq!(post.status, PostStatus::Reviewing);
    assert!(post.is_direct_post());
    match &h.delivery.calls()[0] {
        Call::Send { content: OutboundContent::Text { text, .. }, markup, .. } => {
            assert_eq!(text, render::DIRECT_PROMPT);
            assert_eq!(markup.as_ref(), Some(&render::direct_post_keyboard(&h.tags, 0, None)));
        }
        other => panic!("unexpected call {other:?}"),
    }

    // confirm belongs to the padding flow only
    let out = h.engine.on_submitter_action(SUBMITTER, &by_id(1), SubmitterAction::Confirm).await.unwrap();
    assert_eq!(out.refusal(), Some(&Refusal::AlreadyProcessed));

    let out = h
        .engine
        .on_submitter_action(SUBMITTER, &by_id(1), SubmitterAction::SetTag { tag: TagSelector::Bit(0) })
        .await
        .unwrap();
    assert_eq!(out.message(), "current tags: #NSFW");
    assert_eq!(h.post(1).await.tags, 1);
    assert_eq!(
        h.delivery.markup_edits_at(post.origin_action),
        vec![Some(render::direct_post_keyboard(&h.tags, 1, None))]
    );
    h.delivery.clear();

    let out = h.engine.on_reviewer_action(SUBMITTER, &by_id(1), ReviewerAction::Accept).await.unwrap();
    assert!(out.is_done(), "{out:?}");
    let published = h.post(1).await;
    assert_eq!(published.status, PostStatus::Accepted);
    assert_eq!(published.reviewer_id, Some(SUBMITTER));
    assert!(published.warn_text_id.is_some());

    let to_channel = h.delivery.sends_to(ACCEPT_CHANNEL);
    assert_eq!(to_channel.len(), 2);
    assert_eq!(to_channel[0], OutboundContent::text("Sensitive content ahead"));
    let OutboundContent::Text { text, .. } = &to_channel[1] else { panic!("expected text post") };
    assert!(text.starts_with("#NSFW"));
    assert!(text.contains("straight out"));
    assert_eq!(h.delivery.sends_to(REVIEW_GROUP).len(), 1);

    let me = h.user(SUBMITTER).await;
    assert_eq!((me.post_count, me.accept_count, me.review_count), (1, 1, 0));
}

#[tokio::test]
async fn unknown_tag_is_refused() {
    let mut b = Builder::default();
    b.submitter.direct_post = true;
    let h = b.build().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "x")).await.unwrap();
    let out = h
        .engine
        .on_submitter_action(SUBMITTER, &by_id(1), SubmitterAction::SetTag { tag: TagSelector::Payload("nope".into()) })
        .await
        .unwrap();
    assert_eq!(out.refusal(), Some(&Refusal::UnknownTag));
    assert_eq!(h.post(1).await.tags, 0);
}

#[tokio::test]
async fn confirmed_post_ignores_padding_actions() {
    let h = harness().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "sent off")).await.unwrap();
    h.engine.on_submitter_action(SUBMITTER, &by_id(1), SubmitterAction::Confirm).await.unwrap();
    let before = h.post(1).await;
    h.delivery.clear();

    for action in [
        SubmitterAction::Confirm,
        SubmitterAction::Cancel,
        SubmitterAction::ToggleAnonymous,
        SubmitterAction::DismissWarning,
    ] {
        let out = h.engine.on_submitter_action(SUBMITTER, &by_id(1), action).await.unwrap();
        assert_eq!(out.refusal(), Some(&Refusal::AlreadyProcessed));
    }
    let after = h.post(1).await;
    assert_eq!(after.status, PostStatus::Reviewing);
    assert_eq!((after.anonymous, after.tags), (before.anonymous, before.tags));
    assert_eq!(after.modified_at, before.modified_at);
    assert!(h.delivery.calls().is_empty());
    assert_eq!(h.user(SUBMITTER).await.post_count, 1);
}

#[tokio::test]
async fn direct_post_is_withdrawn_through_reject() {
    let mut b = Builder::default();
    b.submitter.direct_post = true;
    let h = b.build().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "second thoughts")).await.unwrap();
    h.delivery.clear();

    for action in [SubmitterAction::Cancel, SubmitterAction::ToggleAnonymous, SubmitterAction::DismissWarning] {
        let out = h.engine.on_submitter_action(SUBMITTER, &by_id(1), action).await.unwrap();
        assert_eq!(out.refusal(), Some(&Refusal::AlreadyProcessed));
    }
    assert_eq!(h.post(1).await.status, PostStatus::Reviewing);
    assert!(h.delivery.calls().is_empty());

    let withdraw = ReviewerAction::Reject { reason: "withdrawn".into(), counts_against_quota: false, custom_text: None };
    let out = h.engine.on_reviewer_action(SUBMITTER, &by_id(1), withdraw).await.unwrap();
    assert!(out.is_done(), "{out:?}");
    let post = h.post(1).await;
    assert_eq!(post.status, PostStatus::Rejected);
    assert!(!post.count_reject);
}

#[tokio::test]
async fn plain_submissions_cannot_be_tagged_by_submitter() {
    let h = harness().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "no tags for me")).await.unwrap();
    h.delivery.clear();
    let out = h
        .engine
        .on_submitter_action(SUBMITTER, &by_id(1), SubmitterAction::SetTag { tag: TagSelector::Bit(0) })
        .await
        .unwrap();
    assert_eq!(out.refusal(), Some(&Refusal::AlreadyProcessed));
    assert_eq!(h.post(1).await.tags, 0);
    assert!(h.delivery.calls().is_empty());
}

#[tokio::test]
async fn tag_toggle_twice_restores_the_mask() {
    let mut b = Builder::default();
    b.submitter.direct_post = true;
    let h = b.build().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "friend of a friend")).await.unwrap();
    let before = h.post(1).await;
    assert_eq!(before.tags, 0b10);

    for _ in 0..2 {
        let action = SubmitterAction::SetTag { tag: TagSelector::Bit(0) };
        assert!(h.engine.on_submitter_action(SUBMITTER, &by_id(1), action).await.unwrap().is_done());
    }
    let after = h.post(1).await;
    assert_eq!(after.tags, before.tags);
    assert_eq!(after.status, before.status);
}

#[tokio::test]
async fn direct_post_warning_keeps_publish_controls() {
    let mut b = Builder::default();
    b.submitter.direct_post = true;
    let h = b.build().await;
    h.engine.on_single_item(SUBMITTER, text_item(1, "https://youtu.be/abc")).await.unwrap();
    match &h.delivery.calls()[0] {
        Call::Send { content: OutboundContent::Text { text, .. }, markup, .. } => {
            assert!(text.starts_with(render::DIRECT_PROMPT));
            assert_ne!(text, render::DIRECT_PROMPT);
            assert_eq!(markup.as_ref(), Some(&render::direct_post_keyboard(&h.tags, 0, None)));
        }
        other => panic!("unexpected call {other:?}"),
    }
}

#[tokio::test]
async fn dismissing_warning_keeps_channel_notice() {
    let mut b = Builder::default();
    b.policy = StaticChannelPolicy::new([555], []);
    let h = b.build().await;
    let item = IncomingItem { forwarded_from: Some(Location::new(555, 3)), ..text_item(1, "https://youtu.be/abc") };
    h.engine.on_single_item(SUBMITTER, item).await.unwrap();
    let post = h.post(1).await;

    h.engine.on_submitter_action(SUBMITTER, &by_id(1), SubmitterAction::DismissWarning).await.unwrap();
    let edits = h.delivery.text_edits_at(post.origin_action);
    assert_eq!(edits, vec![(render::confirmation_text(false, true), Some(render::post_keyboard(false)))]);
    assert!(edits[0].0.ends_with(render::SUPPRESS_ORIGIN_NOTICE));
}
