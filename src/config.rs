use std::collections::HashMap;
use std::time::Duration;

use crate::lifecycle::Settings;
use crate::models::ChatId;
use crate::policy::{StaticChannelPolicy, StaticTagCatalog};
use crate::quota::PostOptions;

#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {}", .0.join("; "))]
pub struct ConfigError(pub Vec<String>);

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind: String,
    pub database_url: Option<String>,
    pub data_dir: Option<String>,
    pub bot_api_base: String,
    pub bot_token: String,
    pub intake_token: Option<String>,
    pub settings: Settings,
    pub post_options: PostOptions,
    pub sweep_every: Duration,
    /// `None` disables the expiry reaper.
    pub expiry_every: Option<Duration>,
    pub suppress_origin: Vec<ChatId>,
    pub auto_reject: Vec<ChatId>,
    pub tags: StaticTagCatalog,
}

/// Typed lookups over a key/value source, collecting every problem instead of stopping at the first.
struct Reader<'a> {
    vars: &'a HashMap<String, String>,
    errors: Vec<String>,
}

impl<'a> Reader<'a> {
    fn raw(&self, key: &str) -> Option<&'a str> {
        self.vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or(default).to_string()
    }

    fn required(&mut self, key: &str) -> String {
        match self.raw(key) {
            Some(v) => v.to_string(),
            None => {
                self.errors.push(format!("{key} is required"));
                String::new()
            }
        }
    }

    fn parse<T: std::str::FromStr>(&mut self, key: &str) -> Option<T> {
        let raw = self.raw(key)?;
        match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                self.errors.push(format!("{key}: cannot parse '{raw}'"));
                None
            }
        }
    }

    fn or<T: std::str::FromStr>(&mut self, key: &str, default: T) -> T {
        self.parse(key).unwrap_or(default)
    }

    fn required_id(&mut self, key: &str) -> ChatId {
        if self.raw(key).is_none() {
            self.errors.push(format!("{key} is required"));
            return 0;
        }
        self.parse(key).unwrap_or(0)
    }

    fn flag(&mut self, key: &str, default: bool) -> bool {
        match self.raw(key).map(str::to_ascii_lowercase).as_deref() {
            None => default,
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            Some(other) => {
                self.errors.push(format!("{key}: expected a boolean, got '{other}'"));
                default
            }
        }
    }

    fn id_list(&mut self, key: &str) -> Vec<ChatId> {
        let Some(raw) = self.raw(key) else { return Vec::new() };
        let mut out = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.parse() {
                Ok(id) => out.push(id),
                Err(_) => self.errors.push(format!("{key}: '{part}' is not a chat id")),
            }
        }
        out
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut r = Reader { vars, errors: Vec::new() };
        let d = Settings::default();
        let q = PostOptions::default();

        let settings = Settings {
            review_group: r.parse("REVIEW_GROUP_ID"),
            accept_channel: r.required_id("ACCEPT_CHANNEL_ID"),
            second_channel: r.parse("SECOND_CHANNEL_ID"),
            reject_channel: r.required_id("REJECT_CHANNEL_ID"),
            max_text_len: r.or("POST_MAX_TEXT_LEN", d.max_text_len),
            warn_raw_link: r.flag("WARN_RAW_LINK", d.warn_raw_link),
            debounce: Duration::from_millis(r.or("BUNDLE_DEBOUNCE_MS", 1500)),
            confirm_timeout: Duration::from_secs(r.or("CONFIRM_TIMEOUT_SECS", d.confirm_timeout.as_secs())),
            review_timeout: Duration::from_secs(r.or("REVIEW_TIMEOUT_SECS", d.review_timeout.as_secs())),
        };
        let post_options = PostOptions {
            enable_limit: r.flag("POST_ENABLE_LIMIT", q.enable_limit),
            daily_padding_limit: r.or("POST_DAILY_PADDING_LIMIT", q.daily_padding_limit),
            daily_review_limit: r.or("POST_DAILY_REVIEW_LIMIT", q.daily_review_limit),
            daily_post_limit: r.or("POST_DAILY_POST_LIMIT", q.daily_post_limit),
            ratio_divisor: r.or("POST_RATIO_DIVISOR", q.ratio_divisor),
            max_ratio: r.or("POST_MAX_RATIO", q.max_ratio),
        };
        if post_options.ratio_divisor == 0 {
            r.errors.push("POST_RATIO_DIVISOR must be positive".into());
        }
        let sweep_ms: u64 = r.or("BUNDLE_SWEEP_MS", 1000);
        if sweep_ms == 0 {
            r.errors.push("BUNDLE_SWEEP_MS must be positive".into());
        }
        let expiry_secs: u64 = r.or("EXPIRY_SCAN_SECS", 300);
        let tags = match StaticTagCatalog::parse(&r.string("TAGS", "")) {
            Ok(t) => t,
            Err(e) => {
                r.errors.push(format!("TAGS: {e}"));
                StaticTagCatalog::default()
            }
        };

        let cfg = AppConfig {
            bind: r.string("POSTFLOW_BIND", "0.0.0.0:8080"),
            database_url: r.raw("DATABASE_URL").map(str::to_string),
            data_dir: r.raw("POSTFLOW_DATA_DIR").map(str::to_string),
            bot_api_base: r.string("BOT_API_BASE", "https://api.telegram.org"),
            bot_token: r.required("BOT_TOKEN"),
            intake_token: r.raw("INTAKE_TOKEN").map(str::to_string),
            settings,
            post_options,
            sweep_every: Duration::from_millis(sweep_ms.max(1)),
            expiry_every: (expiry_secs > 0).then(|| Duration::from_secs(expiry_secs)),
            suppress_origin: r.id_list("CHANNEL_SUPPRESS_ORIGIN"),
            auto_reject: r.id_list("CHANNEL_AUTO_REJECT"),
            tags,
        };
        if r.errors.is_empty() { Ok(cfg) } else { Err(ConfigError(r.errors)) }
    }

    pub fn channel_policy(&self) -> StaticChannelPolicy {
        StaticChannelPolicy::new(self.suppress_origin.iter().copied(), self.auto_reject.iter().copied())
    }
}
