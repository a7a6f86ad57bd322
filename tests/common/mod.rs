#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use postflow::delivery::{Delivered, Delivery, DeliveryError, Keyboard, OutboundContent};
use postflow::lifecycle::{Collaborators, Engine, Settings};
use postflow::models::{ChatId, ContentKind, IncomingItem, Location, MediaRef, MessageId, Post, User, UserId};
use postflow::policy::{StaticChannelPolicy, StaticTagCatalog};
use postflow::quota::PostOptions;
use postflow::repo::inmem::InMemRepo;
use postflow::repo::{PostRepo, UserRepo};

pub const REVIEW_GROUP: ChatId = -1001;
pub const ACCEPT_CHANNEL: ChatId = -1002;
pub const SECOND_CHANNEL: ChatId = -1003;
pub const REJECT_CHANNEL: ChatId = -1004;
pub const SUBMITTER: UserId = 10;
pub const REVIEWER: UserId = 20;
pub const OUTSIDER: UserId = 30;
pub const TAGS: &str = "0:NSFW:nsfw:Sensitive content ahead;1:Friends:friend";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send { chat: ChatId, content: OutboundContent, markup: Option<Keyboard>, reply_to: Option<MessageId> },
    Forward { chat: ChatId, from: Location },
    EditText { at: Location, text: String, markup: Option<Keyboard> },
    EditMarkup { at: Location, markup: Option<Keyboard> },
    Delete { at: Location },
}

/// Records every outbound call and hands out increasing message ids.
#[derive(Default)]
pub struct RecordingDelivery {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI64,
}

impl RecordingDelivery {
    fn next(&self) -> MessageId {
        1000 + self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn sends_to(&self, chat: ChatId) -> Vec<OutboundContent> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { chat: c, content, .. } if c == chat => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn text_edits_at(&self, at: Location) -> Vec<(String, Option<Keyboard>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::EditText { at: a, text, markup } if a == at => Some((text, markup)),
                _ => None,
            })
            .collect()
    }

    pub fn markup_edits_at(&self, at: Location) -> Vec<Option<Keyboard>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::EditMarkup { at: a, markup } if a == at => Some(markup),
                _ => None,
            })
            .collect()
    }

    pub fn sends_or_forwards(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Send { .. } | Call::Forward { .. }))
            .count()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn send(&self, chat: ChatId, content: &OutboundContent, markup: Option<&Keyboard>, reply_to: Option<MessageId>) -> Result<Delivered, DeliveryError> {
        let id = self.next();
        let bundle_id = matches!(content, OutboundContent::Album(_)).then(|| format!("album-{id}"));
        self.record(Call::Send { chat, content: content.clone(), markup: markup.cloned(), reply_to });
        Ok(Delivered { location: Location::new(chat, id), bundle_id })
    }

    async fn forward(&self, chat: ChatId, from: Location) -> Result<Location, DeliveryError> {
        let id = self.next();
        self.record(Call::Forward { chat, from });
        Ok(Location::new(chat, id))
    }

    async fn edit_text(&self, at: Location, text: &str, markup: Option<&Keyboard>) -> Result<(), DeliveryError> {
        self.record(Call::EditText { at, text: text.to_string(), markup: markup.cloned() });
        Ok(())
    }

    async fn edit_markup(&self, at: Location, markup: Option<&Keyboard>) -> Result<(), DeliveryError> {
        self.record(Call::EditMarkup { at, markup: markup.cloned() });
        Ok(())
    }

    async fn delete(&self, at: Location) -> Result<(), DeliveryError> {
        self.record(Call::Delete { at });
        Ok(())
    }
}

pub fn settings() -> Settings {
    Settings {
        review_group: Some(REVIEW_GROUP),
        accept_channel: ACCEPT_CHANNEL,
        second_channel: None,
        reject_channel: REJECT_CHANNEL,
        ..Settings::default()
    }
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub repo: InMemRepo,
    pub delivery: Arc<RecordingDelivery>,
    pub tags: StaticTagCatalog,
}

pub struct Builder {
    pub settings: Settings,
    pub policy: StaticChannelPolicy,
    pub options: PostOptions,
    pub submitter: User,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            settings: settings(),
            policy: StaticChannelPolicy::default(),
            options: PostOptions::default(),
            submitter: User::new(SUBMITTER, "alice"),
        }
    }
}

impl Builder {
    pub async fn build(self) -> Harness {
        let repo = InMemRepo::new();
        let mut reviewer = User::new(REVIEWER, "rita");
        reviewer.can_review = true;
        repo.upsert_user(reviewer).await.unwrap();
        repo.upsert_user(self.submitter).await.unwrap();
        repo.upsert_user(User::new(OUTSIDER, "olaf")).await.unwrap();

        let delivery = Arc::new(RecordingDelivery::default());
        let tags = StaticTagCatalog::parse(TAGS).unwrap();
        let engine = Engine::new(
            Collaborators {
                repo: Arc::new(repo.clone()),
                delivery: delivery.clone(),
                channels: Arc::new(self.policy),
                tags: Arc::new(tags.clone()),
                quota: Arc::new(self.options),
            },
            self.settings,
        );
        Harness { engine: Arc::new(engine), repo, delivery, tags }
    }
}

pub async fn harness() -> Harness {
    Builder::default().build().await
}

pub fn at(message_id: MessageId) -> Location {
    Location::new(SUBMITTER, message_id)
}

pub fn text_item(message_id: MessageId, text: &str) -> IncomingItem {
    IncomingItem {
        location: at(message_id),
        kind: ContentKind::Text,
        text: Some(text.to_string()),
        media: None,
        has_spoiler: false,
        forwarded_from: None,
    }
}

pub fn media_item(message_id: MessageId, kind: ContentKind, file_id: &str, caption: Option<&str>) -> IncomingItem {
    IncomingItem {
        location: at(message_id),
        kind,
        text: caption.map(str::to_string),
        media: Some(MediaRef {
            file_id: file_id.to_string(),
            file_unique_id: format!("u-{file_id}"),
            width: 1280,
            height: 960,
            ..Default::default()
        }),
        has_spoiler: false,
        forwarded_from: None,
    }
}

impl Harness {
    pub async fn post(&self, id: i64) -> Post {
        self.repo.get_post(id).await.unwrap().expect("post exists")
    }

    pub async fn post_at(&self, origin: Location) -> Post {
        self.repo.find_by_location(origin).await.unwrap().expect("post exists")
    }

    pub async fn user(&self, id: UserId) -> User {
        self.repo.get_user(id).await.unwrap().expect("user exists")
    }

    pub async fn set_user(&self, id: UserId, f: impl FnOnce(&mut User)) {
        let mut u = self.user(id).await;
        f(&mut u);
        self.repo.upsert_user(u).await.unwrap();
    }
}
