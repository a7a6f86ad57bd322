use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::models::{ChatId, ContentKind, Location, MessageId};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("rejected by destination: {0}")]
    Rejected(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Button {
    pub text: String,
    /// Callback payload echoed back when the button is pressed.
    pub data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self { text: text.into(), data: data.into() }
    }
}

/// Inline keyboard attached below a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }

    pub fn to_reply_markup(&self) -> Value {
        let rows: Vec<Vec<Value>> = self
            .rows
            .iter()
            .map(|r| r.iter().map(|b| json!({ "text": b.text, "callback_data": b.data })).collect())
            .collect();
        json!({ "inline_keyboard": rows })
    }
}

/// Kinds that can actually be delivered as a media message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Audio,
    Video,
    Document,
    Voice,
    Animation,
}

impl TryFrom<ContentKind> for MediaKind {
    type Error = ContentKind;

    fn try_from(kind: ContentKind) -> Result<Self, Self::Error> {
        match kind {
            ContentKind::Photo => Ok(MediaKind::Photo),
            ContentKind::Audio => Ok(MediaKind::Audio),
            ContentKind::Video => Ok(MediaKind::Video),
            ContentKind::Document => Ok(MediaKind::Document),
            ContentKind::Voice => Ok(MediaKind::Voice),
            ContentKind::Animation => Ok(MediaKind::Animation),
            ContentKind::Text | ContentKind::Unsupported => Err(kind),
        }
    }
}

impl MediaKind {
    fn field(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Voice => "voice",
            MediaKind::Animation => "animation",
        }
    }

    fn method(self) -> &'static str {
        match self {
            MediaKind::Photo => "sendPhoto",
            MediaKind::Audio => "sendAudio",
            MediaKind::Video => "sendVideo",
            MediaKind::Document => "sendDocument",
            MediaKind::Voice => "sendVoice",
            MediaKind::Animation => "sendAnimation",
        }
    }

    /// Media-group member type, if this kind may be grouped at all.
    pub fn album_type(self) -> Option<&'static str> {
        match self {
            MediaKind::Photo => Some("photo"),
            MediaKind::Audio => Some("audio"),
            MediaKind::Video => Some("video"),
            MediaKind::Document => Some("document"),
            MediaKind::Voice | MediaKind::Animation => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub file_id: String,
    pub caption: Option<String>,
    pub spoiler: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundContent {
    Text { text: String, link_preview: bool },
    Media(MediaItem),
    /// Ordered bundle; delivered as one group whose first message is the anchor.
    Album(Vec<MediaItem>),
}

impl OutboundContent {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundContent::Text { text: text.into(), link_preview: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub location: Location,
    /// Group identifier assigned by the platform for album deliveries.
    pub bundle_id: Option<String>,
}

/// Outbound messaging collaborator.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Markup is ignored for albums, the platform cannot attach it to a group.
    async fn send(&self, chat: ChatId, content: &OutboundContent, markup: Option<&Keyboard>, reply_to: Option<MessageId>) -> Result<Delivered, DeliveryError>;
    async fn forward(&self, chat: ChatId, from: Location) -> Result<Location, DeliveryError>;
    async fn edit_text(&self, at: Location, text: &str, markup: Option<&Keyboard>) -> Result<(), DeliveryError>;
    async fn edit_markup(&self, at: Location, markup: Option<&Keyboard>) -> Result<(), DeliveryError>;
    async fn delete(&self, at: Location) -> Result<(), DeliveryError>;
}

// ---------------- Bot API adapter ----------------

#[derive(Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct SentChat {
    id: ChatId,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: MessageId,
    chat: SentChat,
    #[serde(default)]
    media_group_id: Option<String>,
}

impl SentMessage {
    fn location(&self) -> Location {
        Location::new(self.chat.id, self.message_id)
    }
}

/// Delivery over the Telegram-style Bot HTTP API (`{base}/bot{token}/{method}`).
pub struct HttpDelivery {
    client: reqwest::Client,
    base: String,
    token: String,
}

impl HttpDelivery {
    pub fn new(base: impl Into<String>, token: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base: base.into(), token: token.into() }
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, DeliveryError> {
        let url = format!("{}/bot{}/{}", self.base.trim_end_matches('/'), self.token, method);
        debug!(method, "bot api call");
        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        let status = resp.status();
        let env: ApiEnvelope = resp
            .json()
            .await
            .map_err(|e| DeliveryError::Decode(format!("{method} ({status}): {e}")))?;
        if !env.ok {
            let reason = env.description.unwrap_or_else(|| format!("status {status}"));
            warn!(method, %reason, "bot api refused call");
            return Err(DeliveryError::Rejected(reason));
        }
        Ok(env.result.unwrap_or(Value::Null))
    }

    async fn call_message(&self, method: &str, body: Value) -> Result<SentMessage, DeliveryError> {
        let v = self.call(method, body).await?;
        serde_json::from_value(v).map_err(|e| DeliveryError::Decode(format!("{method}: {e}")))
    }

    fn media_body(chat: ChatId, item: &MediaItem) -> Value {
        let mut body = json!({ "chat_id": chat });
        body[item.kind.field()] = json!(item.file_id);
        if let Some(c) = &item.caption {
            body["caption"] = json!(c);
        }
        if item.spoiler {
            body["has_spoiler"] = json!(true);
        }
        body
    }

    fn album_member(item: &MediaItem) -> Result<Value, DeliveryError> {
        let ty = item
            .kind
            .album_type()
            .ok_or_else(|| DeliveryError::Rejected(format!("{} cannot be grouped", item.kind.field())))?;
        let mut v = json!({ "type": ty, "media": item.file_id });
        if let Some(c) = &item.caption {
            v["caption"] = json!(c);
        }
        if item.spoiler {
            v["has_spoiler"] = json!(true);
        }
        Ok(v)
    }
}

#[async_trait]
impl Delivery for HttpDelivery {
    async fn send(&self, chat: ChatId, content: &OutboundContent, markup: Option<&Keyboard>, reply_to: Option<MessageId>) -> Result<Delivered, DeliveryError> {
        let (method, mut body) = match content {
            OutboundContent::Text { text, link_preview } => (
                "sendMessage",
                json!({ "chat_id": chat, "text": text, "disable_web_page_preview": !link_preview }),
            ),
            OutboundContent::Media(item) => (item.kind.method(), Self::media_body(chat, item)),
            OutboundContent::Album(items) => {
                let media = items.iter().map(Self::album_member).collect::<Result<Vec<_>, _>>()?;
                let mut body = json!({ "chat_id": chat, "media": media });
                if let Some(r) = reply_to {
                    body["reply_to_message_id"] = json!(r);
                }
                let v = self.call("sendMediaGroup", body).await?;
                let sent: Vec<SentMessage> =
                    serde_json::from_value(v).map_err(|e| DeliveryError::Decode(format!("sendMediaGroup: {e}")))?;
                let first = sent.first().ok_or_else(|| DeliveryError::Decode("empty media group".into()))?;
                return Ok(Delivered { location: first.location(), bundle_id: first.media_group_id.clone() });
            }
        };
        if let Some(kb) = markup {
            body["reply_markup"] = kb.to_reply_markup();
        }
        if let Some(r) = reply_to {
            body["reply_to_message_id"] = json!(r);
        }
        let sent = self.call_message(method, body).await?;
        Ok(Delivered { location: sent.location(), bundle_id: None })
    }

    async fn forward(&self, chat: ChatId, from: Location) -> Result<Location, DeliveryError> {
        let body = json!({ "chat_id": chat, "from_chat_id": from.chat_id, "message_id": from.message_id });
        Ok(self.call_message("forwardMessage", body).await?.location())
    }

    async fn edit_text(&self, at: Location, text: &str, markup: Option<&Keyboard>) -> Result<(), DeliveryError> {
        let mut body = json!({ "chat_id": at.chat_id, "message_id": at.message_id, "text": text });
        if let Some(kb) = markup {
            body["reply_markup"] = kb.to_reply_markup();
        }
        self.call("editMessageText", body).await.map(|_| ())
    }

    async fn edit_markup(&self, at: Location, markup: Option<&Keyboard>) -> Result<(), DeliveryError> {
        let kb = markup.cloned().unwrap_or_default();
        let body = json!({ "chat_id": at.chat_id, "message_id": at.message_id, "reply_markup": kb.to_reply_markup() });
        self.call("editMessageReplyMarkup", body).await.map(|_| ())
    }

    async fn delete(&self, at: Location) -> Result<(), DeliveryError> {
        let body = json!({ "chat_id": at.chat_id, "message_id": at.message_id });
        self.call("deleteMessage", body).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_deliverable_kinds_convert() {
        assert_eq!(MediaKind::try_from(ContentKind::Voice), Ok(MediaKind::Voice));
        assert_eq!(MediaKind::try_from(ContentKind::Unsupported), Err(ContentKind::Unsupported));
        assert!(MediaKind::try_from(ContentKind::Text).is_err());
    }

    #[test]
    fn keyboard_renders_inline_markup() {
        let kb = Keyboard::new(vec![vec![Button::new("Yes", "confirm"), Button::new("No", "cancel")]]);
        let v = kb.to_reply_markup();
        assert_eq!(v["inline_keyboard"][0][1]["callback_data"], "cancel");
        assert!(Keyboard::default().is_empty());
    }
}
