use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ChatId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPolicy {
    Normal,
    /// Accept content but never show where it came from.
    SuppressOrigin,
    AutoReject,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy lookup failed: {0}")]
    Lookup(String),
}

#[async_trait]
pub trait ChannelPolicyResolver: Send + Sync {
    async fn resolve(&self, channel_id: ChatId) -> Result<ChannelPolicy, PolicyError>;
}

/// Resolver backed by two fixed id sets from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticChannelPolicy {
    suppress_origin: HashSet<ChatId>,
    auto_reject: HashSet<ChatId>,
}

impl StaticChannelPolicy {
    pub fn new(suppress_origin: impl IntoIterator<Item = ChatId>, auto_reject: impl IntoIterator<Item = ChatId>) -> Self {
        Self { suppress_origin: suppress_origin.into_iter().collect(), auto_reject: auto_reject.into_iter().collect() }
    }
}

#[async_trait]
impl ChannelPolicyResolver for StaticChannelPolicy {
    async fn resolve(&self, channel_id: ChatId) -> Result<ChannelPolicy, PolicyError> {
        Ok(if self.auto_reject.contains(&channel_id) {
            ChannelPolicy::AutoReject
        } else if self.suppress_origin.contains(&channel_id) {
            ChannelPolicy::SuppressOrigin
        } else {
            ChannelPolicy::Normal
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub bit: u8,
    pub name: String,
    /// Keyword matched in submitted text and accepted by `set-tag`.
    pub payload: String,
    pub warning: Option<String>,
    pub enabled: bool,
}

impl Tag {
    pub fn mask(&self) -> u32 {
        1u32 << self.bit
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagParseError {
    #[error("tag entry '{0}' must be bit:name:payload[:warning]")]
    Shape(String),
    #[error("tag bit '{0}' must be 0..=31")]
    Bit(String),
    #[error("duplicate tag bit {0}")]
    Duplicate(u8),
}

pub trait TagCatalog: Send + Sync {
    fn by_bit(&self, bit: u8) -> Option<&Tag>;
    fn by_payload(&self, payload: &str) -> Option<&Tag>;
    fn tags(&self) -> &[Tag];

    /// `#name` for every enabled tag in `mask`, space separated.
    fn active_names(&self, mask: u32) -> String {
        self.tags()
            .iter()
            .filter(|t| t.enabled && mask & t.mask() != 0)
            .map(|t| format!("#{}", t.name))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Joined warnings of enabled tags in `mask`; empty if none carry one.
    fn warnings(&self, mask: u32) -> String {
        self.tags()
            .iter()
            .filter(|t| t.enabled && mask & t.mask() != 0)
            .filter_map(|t| t.warning.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Bits of enabled tags whose payload appears in `text` (case-insensitive).
    fn detect(&self, text: &str) -> u32 {
        let lower = text.to_lowercase();
        self.tags()
            .iter()
            .filter(|t| t.enabled && !t.payload.is_empty() && lower.contains(&t.payload.to_lowercase()))
            .fold(0, |acc, t| acc | t.mask())
    }

    /// Drops bits with no enabled tag behind them.
    fn sanitize(&self, mask: u32) -> u32 {
        self.tags().iter().filter(|t| t.enabled).fold(0, |acc, t| acc | t.mask()) & mask
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticTagCatalog {
    tags: Vec<Tag>,
}

impl StaticTagCatalog {
    pub fn new(tags: Vec<Tag>) -> Self {
        Self { tags }
    }

    /// Parses `bit:name:payload[:warning]` entries separated by `;`.
    pub fn parse(def: &str) -> Result<Self, TagParseError> {
        let mut tags: Vec<Tag> = Vec::new();
        for entry in def.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.splitn(4, ':').map(str::trim).collect();
            if parts.len() < 3 || parts[1].is_empty() {
                return Err(TagParseError::Shape(entry.to_string()));
            }
            let bit: u8 = parts[0].parse().ok().filter(|b| *b < 32).ok_or_else(|| TagParseError::Bit(parts[0].to_string()))?;
            if tags.iter().any(|t| t.bit == bit) {
                return Err(TagParseError::Duplicate(bit));
            }
            tags.push(Tag {
                bit,
                name: parts[1].to_string(),
                payload: parts[2].to_string(),
                warning: parts.get(3).filter(|w| !w.is_empty()).map(|w| w.to_string()),
                enabled: true,
            });
        }
        tags.sort_by_key(|t| t.bit);
        Ok(Self { tags })
    }
}

impl TagCatalog for StaticTagCatalog {
    fn by_bit(&self, bit: u8) -> Option<&Tag> {
        self.tags.iter().find(|t| t.bit == bit)
    }

    fn by_payload(&self, payload: &str) -> Option<&Tag> {
        let p = payload.trim().trim_start_matches('#');
        self.tags.iter().find(|t| t.payload.eq_ignore_ascii_case(p) || t.name.eq_ignore_ascii_case(p))
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }
}
