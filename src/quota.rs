use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};

use crate::models::{PostFilter, PostStatus, User, UserId};
use crate::repo::{PostRepo, RepoResult};

/// Tier constants for per-submitter quotas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostOptions {
    pub enable_limit: bool,
    pub daily_padding_limit: u64,
    pub daily_review_limit: u64,
    pub daily_post_limit: u64,
    pub ratio_divisor: u64,
    pub max_ratio: u64,
}

impl Default for PostOptions {
    fn default() -> Self {
        Self {
            enable_limit: true,
            daily_padding_limit: 5,
            daily_review_limit: 5,
            daily_post_limit: 5,
            ratio_divisor: 100,
            max_ratio: 10,
        }
    }
}

/// Supplies the quota constants at evaluation time, so they can be swapped without a restart.
pub trait QuotaConstants: Send + Sync {
    fn post_options(&self) -> PostOptions;
}

impl QuotaConstants for PostOptions {
    fn post_options(&self) -> PostOptions {
        self.clone()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub padding: u64,
    pub review: u64,
    pub daily: u64,
}

pub fn ratio(accept_count: i64, opts: &PostOptions) -> u64 {
    let accepted = accept_count.max(0) as u64;
    (accepted / opts.ratio_divisor.max(1) + 1).min(opts.max_ratio)
}

pub fn limits_for(accept_count: i64, opts: &PostOptions) -> Limits {
    if accept_count <= 0 {
        return Limits { padding: 2, review: 1, daily: 1 };
    }
    let r = ratio(accept_count, opts);
    Limits {
        padding: opts.daily_padding_limit,
        review: r * opts.daily_review_limit,
        daily: r * opts.daily_post_limit,
    }
}

pub fn is_exempt(user: &User, opts: &PostOptions) -> bool {
    user.is_admin || (user.accept_count > 0 && !opts.enable_limit)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaKind {
    PaddingQueue,
    Daily,
    ReviewQueue,
}

impl QuotaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QuotaKind::PaddingQueue => "padding_queue",
            QuotaKind::Daily => "daily",
            QuotaKind::ReviewQueue => "review_queue",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QuotaRefusal {
    #[error("your submission queue is full {count} / {limit}, confirm or cancel pending submissions first")]
    PaddingQueue { count: u64, limit: u64 },
    #[error("daily submission limit reached {count} / {limit}, try again tomorrow")]
    Daily { count: u64, limit: u64 },
    #[error("review queue full {count} / {limit}, wait for pending submissions to be reviewed")]
    ReviewQueue { count: u64, limit: u64 },
}

impl QuotaRefusal {
    pub fn kind(&self) -> QuotaKind {
        match self {
            QuotaRefusal::PaddingQueue { .. } => QuotaKind::PaddingQueue,
            QuotaRefusal::Daily { .. } => QuotaKind::Daily,
            QuotaRefusal::ReviewQueue { .. } => QuotaKind::ReviewQueue,
        }
    }
}

/// Counts of today's records for one submitter. Only the fields a call site needs are filled.
#[derive(Clone, Copy, Debug, Default)]
pub struct DailyCounts {
    pub padding: u64,
    pub reviewing: u64,
    /// Accepted plus quota-counting rejections.
    pub posted: u64,
}

pub fn check_submission(limits: Limits, counts: DailyCounts) -> Result<(), QuotaRefusal> {
    if counts.padding >= limits.padding {
        return Err(QuotaRefusal::PaddingQueue { count: counts.padding, limit: limits.padding });
    }
    if counts.posted >= limits.daily {
        return Err(QuotaRefusal::Daily { count: counts.posted, limit: limits.daily });
    }
    Ok(())
}

pub fn check_confirmation(limits: Limits, counts: DailyCounts) -> Result<(), QuotaRefusal> {
    if counts.reviewing >= limits.review {
        return Err(QuotaRefusal::ReviewQueue { count: counts.reviewing, limit: limits.review });
    }
    Ok(())
}

/// Local midnight of the current day, expressed in UTC.
pub fn start_of_today() -> DateTime<Utc> {
    let now = Local::now();
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc))
}

fn today(submitter: UserId) -> PostFilter {
    PostFilter::submitter(submitter).since(start_of_today())
}

/// Submission-time check: padding queue, then daily total.
pub async fn evaluate_submission<R: PostRepo + ?Sized>(repo: &R, user: &User, opts: &PostOptions) -> RepoResult<Option<QuotaRefusal>> {
    if is_exempt(user, opts) { return Ok(None); }
    let limits = limits_for(user.accept_count, opts);
    let padding = repo.count_posts(&today(user.id).with_status(PostStatus::Padding)).await?;
    let posted = repo
        .count_posts(&today(user.id).with_status(PostStatus::Accepted).or_counted_rejects())
        .await?;
    Ok(check_submission(limits, DailyCounts { padding, posted, ..Default::default() }).err())
}

/// Confirm-time check against the review queue.
pub async fn evaluate_confirmation<R: PostRepo + ?Sized>(repo: &R, user: &User, opts: &PostOptions) -> RepoResult<Option<QuotaRefusal>> {
    if is_exempt(user, opts) { return Ok(None); }
    let limits = limits_for(user.accept_count, opts);
    let reviewing = repo.count_posts(&today(user.id).with_status(PostStatus::Reviewing)).await?;
    Ok(check_confirmation(limits, DailyCounts { reviewing, ..Default::default() }).err())
}
