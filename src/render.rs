//! Default texts and keyboards shown by the engine.

use crate::delivery::{Button, Keyboard};
use crate::models::{ContentKind, MediaRef, Post, User};
use crate::policy::TagCatalog;

pub const CONFIRM_PROMPT: &str = "Submit this for review?";
pub const DIRECT_PROMPT: &str = "You may publish directly; this post will skip the review queue.";
pub const PROCESSING: &str = "Processing, please wait";
pub const SUPPRESS_ORIGIN_NOTICE: &str = "Posts from this channel are published without showing their source.";
pub const AUTO_REJECT_NOTICE: &str = "Submissions from this channel are not accepted.";
pub const CANCELLED: &str = "Submission cancelled.";
pub const SUBMITTED: &str = "Submitted, waiting for review.";
pub const CONFIRM_EXPIRED: &str = "This submission was not confirmed in time and has expired.";
pub const REVIEW_EXPIRED: &str = "This submission was not reviewed in time and has expired.";
pub const BANNED_SUBMITTER: &str = "This user is banned; the submission was rejected automatically.";
pub const BANNED_REASON: &str = "submitter banned";

/// Hosts whose raw links are better handled by a link-parser bot first.
pub const LINK_PARSERS: &[(&str, &str)] = &[
    ("b23.tv", "@bilifeedbot"),
    ("bilibili.com", "@bilifeedbot"),
    ("twitter.com", "@TwPicBot"),
    ("x.com", "@TwPicBot"),
    ("fxtwitter.com", "@TwPicBot"),
    ("fixupx.com", "@TwPicBot"),
    ("fixvx.com", "@TwPicBot"),
    ("twittpr.com", "@TwPicBot"),
    ("weibo.com", "@web_parse_bot"),
    ("xiaohongshu.com", "@web_parse_bot"),
    ("douyin.com", "@icbcbot"),
    ("youtube.com", "@Youtube_Downloader_robot"),
    ("youtu.be", "@Youtube_Downloader_robot"),
    ("pixiv.net", "@Pixiv_bot"),
    ("pximg.net", "@Pixiv_bot"),
];

pub mod data {
    pub const CONFIRM: &str = "confirm";
    pub const CANCEL: &str = "cancel";
    pub const ANONYMOUS: &str = "anonymous";
    pub const DISMISS_WARNING: &str = "dismiss_warning";
    pub const ACCEPT: &str = "accept";
    pub const ACCEPT_SECONDARY: &str = "accept_secondary";
    pub const ACCEPT_SCHEDULED: &str = "accept_scheduled";
    pub const REJECT: &str = "reject";
    pub const SPOILER: &str = "spoiler";

    pub fn tag(bit: u8) -> String {
        format!("tag:{bit}")
    }
}

fn check(on: bool) -> &'static str {
    if on { "[x]" } else { "[ ]" }
}

fn anonymous_button(anonymous: bool) -> Button {
    Button::new(format!("{} Anonymous", check(anonymous)), data::ANONYMOUS)
}

fn tag_row(catalog: &dyn TagCatalog, tags: u32) -> Vec<Button> {
    catalog
        .tags()
        .iter()
        .filter(|t| t.enabled)
        .map(|t| Button::new(format!("{} {}", check(tags & t.mask() != 0), t.name), data::tag(t.bit)))
        .collect()
}

fn spoiler_row(spoiler: Option<bool>) -> Option<Vec<Button>> {
    spoiler.map(|on| vec![Button::new(format!("{} Spoiler", check(on)), data::SPOILER)])
}

pub fn post_keyboard(anonymous: bool) -> Keyboard {
    Keyboard::new(vec![
        vec![anonymous_button(anonymous)],
        vec![Button::new("Cancel", data::CANCEL), Button::new("Submit", data::CONFIRM)],
    ])
}

/// Shown while a content-quality warning is unacknowledged.
pub fn warning_keyboard() -> Keyboard {
    Keyboard::new(vec![vec![
        Button::new("Cancel", data::CANCEL),
        Button::new("Submit anyway", data::DISMISS_WARNING),
    ]])
}

/// Controls of a direct-publish post. Withdrawing one goes through the reject path.
pub fn direct_post_keyboard(catalog: &dyn TagCatalog, tags: u32, spoiler: Option<bool>) -> Keyboard {
    let mut rows = vec![tag_row(catalog, tags)];
    rows.extend(spoiler_row(spoiler));
    rows.push(vec![Button::new("Withdraw", data::REJECT), Button::new("Publish", data::ACCEPT)]);
    rows.retain(|r| !r.is_empty());
    Keyboard::new(rows)
}

pub fn review_keyboard(catalog: &dyn TagCatalog, tags: u32, spoiler: Option<bool>, has_secondary: bool) -> Keyboard {
    let mut rows = vec![tag_row(catalog, tags)];
    rows.extend(spoiler_row(spoiler));
    let mut accept = vec![Button::new("Reject", data::REJECT), Button::new("Accept", data::ACCEPT)];
    if has_secondary {
        accept.push(Button::new("Accept (second)", data::ACCEPT_SECONDARY));
    }
    accept.push(Button::new("Schedule", data::ACCEPT_SCHEDULED));
    rows.push(accept);
    rows.retain(|r| !r.is_empty());
    Keyboard::new(rows)
}

/// Keyboard matching the post's current stage.
pub fn controls_for(catalog: &dyn TagCatalog, post: &Post, has_secondary: bool) -> Keyboard {
    if post.is_direct_post() {
        direct_post_keyboard(catalog, post.tags, post.spoiler_state())
    } else {
        review_keyboard(catalog, post.tags, post.spoiler_state(), has_secondary)
    }
}

fn confirm_prompt(direct: bool) -> &'static str {
    if direct { DIRECT_PROMPT } else { CONFIRM_PROMPT }
}

/// Confirmation prompt plus the notice for sources that are published without attribution.
pub fn confirmation_text(direct: bool, suppress_origin: bool) -> String {
    let prompt = confirm_prompt(direct);
    if suppress_origin { format!("{prompt}\n{SUPPRESS_ORIGIN_NOTICE}") } else { prompt.to_string() }
}

fn display_name(user: &User) -> String {
    if user.name.is_empty() { format!("#{}", user.id) } else { user.name.clone() }
}

/// Text of the reviewer-facing control message.
pub fn review_message(submitter: &User, anonymous: bool, tag_names: &str) -> String {
    let mut s = format!("Submitter: {} ({})", display_name(submitter), submitter.id);
    if anonymous {
        s.push_str("\nAnonymous: yes");
    }
    if !tag_names.is_empty() {
        s.push_str("\nTags: ");
        s.push_str(tag_names);
    }
    s
}

pub fn review_outcome(submitter: &User, reviewer: &User, anonymous: bool, outcome: &str) -> String {
    format!(
        "{}\nReviewer: {}\n{}",
        review_message(submitter, anonymous, ""),
        display_name(reviewer),
        outcome
    )
}

pub fn accepted_outcome(secondary: bool) -> &'static str {
    if secondary { "Accepted (second channel)" } else { "Accepted" }
}

pub fn rejected_outcome(reason: &str) -> String {
    format!("Rejected: {reason}")
}

pub const SCHEDULED_OUTCOME: &str = "Scheduled for later publication";

pub fn accepted_notice(direct: bool) -> &'static str {
    if direct { "Your post has been published." } else { "Your submission was accepted and published." }
}

pub fn rejected_notice(reason: &str) -> String {
    format!("Your submission was rejected: {reason}")
}

/// Record left in the review group for a post published without review.
pub fn direct_publish_record(submitter: &User, anonymous: bool) -> String {
    format!("{}\nPublished directly", review_message(submitter, anonymous, ""))
}

/// Caption or body of the published post.
pub fn publication_text(post: &Post, submitter: &User, tag_names: &str, show_origin: bool) -> String {
    let mut s = String::new();
    if !tag_names.is_empty() {
        s.push_str(tag_names);
        s.push_str("\n\n");
    }
    s.push_str(post.text.trim());
    if let (true, Some(from)) = (show_origin, post.forwarded_from) {
        s.push_str(&format!("\n\nvia channel {} / {}", from.chat_id, from.message_id));
    }
    if !post.anonymous {
        s.push_str(&format!("\n\nsubmitted by {}", display_name(submitter)));
    }
    s.trim().to_string()
}

fn url_hosts(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().filter_map(|w| {
        let rest = w.strip_prefix("https://").or_else(|| w.strip_prefix("http://"))?;
        let host = rest.split(['/', '?', '#', ':']).next()?;
        (!host.is_empty()).then(|| host.to_lowercase())
    })
}

pub fn raw_link_warning(text: &str) -> Option<String> {
    for host in url_hosts(text) {
        for (known, bot) in LINK_PARSERS {
            if host == *known || host.ends_with(&format!(".{known}")) {
                return Some(format!(
                    "This looks like a raw link from {known}; consider sending it to {bot} first and submitting the result."
                ));
            }
        }
    }
    None
}

pub fn blurry_warning(kind: ContentKind, media: &MediaRef) -> Option<String> {
    if kind != ContentKind::Photo || media.width <= 0 || media.height <= 0 {
        return None;
    }
    let (short, long) = if media.width < media.height { (media.width, media.height) } else { (media.height, media.width) };
    if short < 360 || long > short * 3 {
        Some(format!("This image ({}x{}) may appear blurry once published.", media.width, media.height))
    } else {
        None
    }
}

pub fn with_warning(text: &str, warning: Option<&str>) -> String {
    match warning {
        Some(w) if !w.is_empty() => format!("{text}\n\n{w}"),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::StaticTagCatalog;

    #[test]
    fn raw_link_matches_known_hosts_only() {
        assert!(raw_link_warning("see https://www.youtube.com/watch?v=1").is_some());
        assert!(raw_link_warning("https://x.com/a/status/1").unwrap().contains("@TwPicBot"));
        assert!(raw_link_warning("https://notx.com/a").is_none());
        assert!(raw_link_warning("plain text").is_none());
    }

    #[test]
    fn blurry_checks_photos_only() {
        let m = |w, h| MediaRef { width: w, height: h, ..Default::default() };
        assert!(blurry_warning(ContentKind::Photo, &m(300, 400)).is_some());
        assert!(blurry_warning(ContentKind::Photo, &m(400, 1300)).is_some());
        assert!(blurry_warning(ContentKind::Photo, &m(1080, 1920)).is_none());
        assert!(blurry_warning(ContentKind::Video, &m(100, 100)).is_none());
        assert!(blurry_warning(ContentKind::Photo, &m(0, 0)).is_none());
    }

    #[test]
    fn review_keyboard_marks_active_tags() {
        let cat = StaticTagCatalog::parse("0:NSFW:nsfw;1:Friends:friend").unwrap();
        let kb = review_keyboard(&cat, 0b10, Some(true), false);
        assert_eq!(kb.rows[0][1].text, "[x] Friends");
        assert_eq!(kb.rows[0][0].data, "tag:0");
        assert_eq!(kb.rows[1][0].data, data::SPOILER);
        assert!(kb.rows[2].iter().all(|b| b.data != data::ACCEPT_SECONDARY));
    }

    #[test]
    fn direct_controls_only_publish_or_withdraw() {
        let cat = StaticTagCatalog::parse("0:NSFW:nsfw").unwrap();
        let kb = direct_post_keyboard(&cat, 0, None);
        let last = kb.rows.last().unwrap();
        assert_eq!(last.iter().map(|b| b.data.as_str()).collect::<Vec<_>>(), vec![data::REJECT, data::ACCEPT]);
        assert!(kb.rows.iter().flatten().all(|b| b.data != data::CANCEL && b.data != data::ANONYMOUS));
    }

    #[test]
    fn suppressed_sources_keep_their_notice() {
        assert_eq!(confirmation_text(false, false), CONFIRM_PROMPT);
        assert_eq!(confirmation_text(true, true), format!("{DIRECT_PROMPT}\n{SUPPRESS_ORIGIN_NOTICE}"));
    }
}
