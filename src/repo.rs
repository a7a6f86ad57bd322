use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Option<Post>>;
    /// Matches origin, origin-action, review or review-action locations.
    async fn find_by_location(&self, at: Location) -> RepoResult<Option<Post>>;
    /// Matches the origin or review bundle identifier.
    async fn find_by_bundle(&self, bundle_id: &str) -> RepoResult<Option<Post>>;
    /// Status and `modified_at` change together or not at all.
    async fn update_post(&self, id: Id, upd: PostUpdate) -> RepoResult<Post>;
    async fn count_posts(&self, filter: &PostFilter) -> RepoResult<u64>;
    /// Posts in `status` whose last modification is older than `before`.
    async fn find_stale(&self, status: PostStatus, before: DateTime<Utc>) -> RepoResult<Vec<Post>>;
    /// Oldest post waiting for scheduled publication.
    async fn first_in_plan(&self) -> RepoResult<Option<Post>>;
}

#[async_trait]
pub trait AttachmentRepo: Send + Sync {
    async fn create_attachment(&self, new: NewAttachment) -> RepoResult<Attachment>;
    async fn list_attachments(&self, post_id: Id) -> RepoResult<Vec<Attachment>>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, id: UserId) -> RepoResult<Option<User>>;
    async fn upsert_user(&self, user: User) -> RepoResult<User>;
    async fn bump_counters(&self, id: UserId, delta: CounterDelta) -> RepoResult<()>;
}

pub trait Repo: PostRepo + AttachmentRepo + UserRepo {}

impl<T> Repo for T where T: PostRepo + AttachmentRepo + UserRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use tracing::{info, warn};

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        posts: HashMap<Id, Post>,
        attachments: HashMap<Id, Attachment>,
        users: HashMap<UserId, User>,
        next_id: Id,
    }

    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        /// Purely in-memory, nothing survives the process.
        pub fn new() -> Self {
            Self::default()
        }

        /// Loads `<dir>/state.json` if present and rewrites it after every mutation.
        pub fn with_snapshot(dir: impl AsRef<Path>) -> Self {
            let path = dir.as_ref().join("state.json");
            let state = Self::load_state_from(&path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(path)),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        info!(path = %path.display(), "loaded snapshot");
                        s
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to parse snapshot, starting empty");
                        State::default()
                    }
                },
                Err(e) => {
                    info!(path = %path.display(), error = %e, "no snapshot, starting empty");
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let Some(path) = self.snapshot_path.as_deref() else { return };
            let bytes = match self.read().and_then(|s| {
                serde_json::to_vec_pretty(&*s).map_err(|e| RepoError::Internal(e.to_string()))
            }) {
                Ok(b) => b,
                Err(e) => {
                    warn!(error = %e, "failed to serialise snapshot");
                    return;
                }
            };
            if let Some(dir) = path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            if let Err(e) = std::fs::write(path, bytes) {
                warn!(path = %path.display(), error = %e, "failed to write snapshot");
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.write()?;
            if let Some(bundle) = new.origin_bundle_id.as_deref() {
                if s.posts.values().any(|p| p.origin_bundle_id.as_deref() == Some(bundle)) {
                    return Err(RepoError::Conflict);
                }
            }
            let id = Self::next_id(&mut s);
            let now = Utc::now();
            let post = Post {
                id,
                origin: new.origin,
                origin_action: new.origin_action,
                review: new.review,
                review_action: new.review_action,
                publication: None,
                warn_text_id: None,
                origin_bundle_id: new.origin_bundle_id,
                review_bundle_id: new.review_bundle_id,
                publish_bundle_id: None,
                kind: new.kind,
                text: new.text,
                raw_text: new.raw_text,
                tags: new.tags,
                has_spoiler: new.has_spoiler,
                anonymous: new.anonymous,
                forwarded_from: new.forwarded_from,
                submitter_id: new.submitter_id,
                reviewer_id: None,
                reject_reason: new.reject_reason,
                count_reject: false,
                status: new.status,
                created_at: now,
                modified_at: now,
            };
            s.posts.insert(id, post.clone());
            drop(s);                       // release lock before persisting
            self.persist();
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Option<Post>> {
            Ok(self.read()?.posts.get(&id).cloned())
        }

        async fn find_by_location(&self, at: Location) -> RepoResult<Option<Post>> {
            let s = self.read()?;
            Ok(s.posts.values().filter(|p| p.matches_location(at)).min_by_key(|p| p.id).cloned())
        }

        async fn find_by_bundle(&self, bundle_id: &str) -> RepoResult<Option<Post>> {
            let s = self.read()?;
            Ok(s.posts
                .values()
                .filter(|p| {
                    p.origin_bundle_id.as_deref() == Some(bundle_id)
                        || p.review_bundle_id.as_deref() == Some(bundle_id)
                })
                .min_by_key(|p| p.id)
                .cloned())
        }

        async fn update_post(&self, id: Id, upd: PostUpdate) -> RepoResult<Post> {
            let mut s = self.write()?;
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.apply(upd, Utc::now());
            let updated = post.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn count_posts(&self, filter: &PostFilter) -> RepoResult<u64> {
            let s = self.read()?;
            Ok(s.posts.values().filter(|p| filter.matches(p)).count() as u64)
        }

        async fn find_stale(&self, status: PostStatus, before: DateTime<Utc>) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.posts
                .values()
                .filter(|p| p.status == status && p.modified_at < before)
                .cloned()
                .collect();
            v.sort_by_key(|p| p.id);
            Ok(v)
        }

        async fn first_in_plan(&self) -> RepoResult<Option<Post>> {
            let s = self.read()?;
            Ok(s.posts.values().filter(|p| p.status == PostStatus::InPlan).min_by_key(|p| p.id).cloned())
        }
    }

    #[async_trait]
    impl AttachmentRepo for InMemRepo {
        async fn create_attachment(&self, new: NewAttachment) -> RepoResult<Attachment> {
            let mut s = self.write()?;
            if !s.posts.contains_key(&new.post_id) { return Err(RepoError::NotFound); }
            let id = Self::next_id(&mut s);
            let m = new.media;
            let att = Attachment {
                id,
                post_id: new.post_id,
                kind: new.kind,
                file_id: m.file_id,
                file_unique_id: m.file_unique_id,
                file_name: m.file_name,
                mime: m.mime,
                size: m.size,
                width: m.width,
                height: m.height,
            };
            s.attachments.insert(id, att.clone());
            drop(s);
            self.persist();
            Ok(att)
        }

        async fn list_attachments(&self, post_id: Id) -> RepoResult<Vec<Attachment>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.attachments.values().filter(|a| a.post_id == post_id).cloned().collect();
            v.sort_by_key(|a| a.id);       // arrival order
            Ok(v)
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
            Ok(self.read()?.users.get(&id).cloned())
        }

        async fn upsert_user(&self, mut user: User) -> RepoResult<User> {
            user.modified_at = Utc::now();
            let mut s = self.write()?;
            s.users.insert(user.id, user.clone());
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn bump_counters(&self, id: UserId, delta: CounterDelta) -> RepoResult<()> {
            let mut s = self.write()?;
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            user.post_count += delta.post;
            user.accept_count += delta.accept;
            user.reject_count += delta.reject;
            user.review_count += delta.review;
            user.modified_at = Utc::now();
            drop(s);
            self.persist();
            Ok(())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::postgres::PgRow;
    use sqlx::{FromRow, Pool, Postgres, QueryBuilder, Row};

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    const POST_COLUMNS: &str = "id, origin_chat_id, origin_msg_id, origin_action_chat_id, origin_action_msg_id, \
        review_chat_id, review_msg_id, review_action_chat_id, review_action_msg_id, \
        public_chat_id, public_msg_id, warn_text_id, origin_bundle_id, review_bundle_id, publish_bundle_id, \
        kind, text, raw_text, tags, has_spoiler, anonymous, channel_id, channel_msg_id, \
        submitter_id, reviewer_id, reject_reason, count_reject, status, created_at, modified_at";

    fn internal(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
            other => RepoError::Internal(other.to_string()),
        }
    }

    fn pair(chat: Option<i64>, msg: Option<i64>) -> Option<Location> {
        chat.zip(msg).map(|(c, m)| Location::new(c, m))
    }

    fn decode<T: std::str::FromStr<Err = UnknownVariant>>(raw: String) -> Result<T, sqlx::Error> {
        raw.parse::<T>().map_err(|e| sqlx::Error::Decode(Box::new(e)))
    }

    struct PostRow(Post);

    impl<'r> FromRow<'r, PgRow> for PostRow {
        fn from_row(r: &'r PgRow) -> Result<Self, sqlx::Error> {
            Ok(PostRow(Post {
                id: r.try_get("id")?,
                origin: Location::new(r.try_get("origin_chat_id")?, r.try_get("origin_msg_id")?),
                origin_action: Location::new(r.try_get("origin_action_chat_id")?, r.try_get("origin_action_msg_id")?),
                review: pair(r.try_get("review_chat_id")?, r.try_get("review_msg_id")?),
                review_action: pair(r.try_get("review_action_chat_id")?, r.try_get("review_action_msg_id")?),
                publication: pair(r.try_get("public_chat_id")?, r.try_get("public_msg_id")?),
                warn_text_id: r.try_get("warn_text_id")?,
                origin_bundle_id: r.try_get("origin_bundle_id")?,
                review_bundle_id: r.try_get("review_bundle_id")?,
                publish_bundle_id: r.try_get("publish_bundle_id")?,
                kind: decode(r.try_get("kind")?)?,
                text: r.try_get("text")?,
                raw_text: r.try_get("raw_text")?,
                tags: r.try_get::<i64, _>("tags")? as u32,
                has_spoiler: r.try_get("has_spoiler")?,
                anonymous: r.try_get("anonymous")?,
                forwarded_from: pair(r.try_get("channel_id")?, r.try_get("channel_msg_id")?),
                submitter_id: r.try_get("submitter_id")?,
                reviewer_id: r.try_get("reviewer_id")?,
                reject_reason: r.try_get("reject_reason")?,
                count_reject: r.try_get("count_reject")?,
                status: decode(r.try_get("status")?)?,
                created_at: r.try_get("created_at")?,
                modified_at: r.try_get("modified_at")?,
            }))
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let sql = format!(
                "INSERT INTO posts (origin_chat_id, origin_msg_id, origin_action_chat_id, origin_action_msg_id, \
                 review_chat_id, review_msg_id, review_action_chat_id, review_action_msg_id, \
                 origin_bundle_id, review_bundle_id, kind, text, raw_text, tags, has_spoiler, anonymous, \
                 channel_id, channel_msg_id, submitter_id, reject_reason, status) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21) \
                 RETURNING {POST_COLUMNS}"
            );
            let rec = sqlx::query_as::<_, PostRow>(&sql)
                .bind(new.origin.chat_id)
                .bind(new.origin.message_id)
                .bind(new.origin_action.chat_id)
                .bind(new.origin_action.message_id)
                .bind(new.review.map(|l| l.chat_id))
                .bind(new.review.map(|l| l.message_id))
                .bind(new.review_action.map(|l| l.chat_id))
                .bind(new.review_action.map(|l| l.message_id))
                .bind(&new.origin_bundle_id)
                .bind(&new.review_bundle_id)
                .bind(new.kind.as_str())
                .bind(&new.text)
                .bind(&new.raw_text)
                .bind(new.tags as i64)
                .bind(new.has_spoiler)
                .bind(new.anonymous)
                .bind(new.forwarded_from.map(|l| l.chat_id))
                .bind(new.forwarded_from.map(|l| l.message_id))
                .bind(new.submitter_id)
                .bind(&new.reject_reason)
                .bind(new.status.as_str())
                .fetch_one(&self.pool).await.map_err(internal)?;
            Ok(rec.0)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Option<Post>> {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
            let rec = sqlx::query_as::<_, PostRow>(&sql)
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(internal)?;
            Ok(rec.map(|r| r.0))
        }

        async fn find_by_location(&self, at: Location) -> RepoResult<Option<Post>> {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE \
                 (origin_chat_id = $1 AND origin_msg_id = $2) OR \
                 (origin_action_chat_id = $1 AND origin_action_msg_id = $2) OR \
                 (review_chat_id = $1 AND review_msg_id = $2) OR \
                 (review_action_chat_id = $1 AND review_action_msg_id = $2) \
                 ORDER BY id LIMIT 1"
            );
            let rec = sqlx::query_as::<_, PostRow>(&sql)
                .bind(at.chat_id)
                .bind(at.message_id)
                .fetch_optional(&self.pool).await.map_err(internal)?;
            Ok(rec.map(|r| r.0))
        }

        async fn find_by_bundle(&self, bundle_id: &str) -> RepoResult<Option<Post>> {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE origin_bundle_id = $1 OR review_bundle_id = $1 ORDER BY id LIMIT 1"
            );
            let rec = sqlx::query_as::<_, PostRow>(&sql)
                .bind(bundle_id)
                .fetch_optional(&self.pool).await.map_err(internal)?;
            Ok(rec.map(|r| r.0))
        }

        async fn update_post(&self, id: Id, upd: PostUpdate) -> RepoResult<Post> {
            // One statement: every touched column plus modified_at, applied atomically.
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE posts SET modified_at = GREATEST(modified_at, now())");
            if let Some(v) = upd.status { qb.push(", status = ").push_bind(v.as_str()); }
            if let Some(v) = upd.tags { qb.push(", tags = ").push_bind(v as i64); }
            if let Some(v) = upd.anonymous { qb.push(", anonymous = ").push_bind(v); }
            if let Some(v) = upd.has_spoiler { qb.push(", has_spoiler = ").push_bind(v); }
            if let Some(v) = upd.review {
                qb.push(", review_chat_id = ").push_bind(v.chat_id);
                qb.push(", review_msg_id = ").push_bind(v.message_id);
            }
            if let Some(v) = upd.review_action {
                qb.push(", review_action_chat_id = ").push_bind(v.chat_id);
                qb.push(", review_action_msg_id = ").push_bind(v.message_id);
            }
            if let Some(v) = upd.review_bundle_id { qb.push(", review_bundle_id = ").push_bind(v); }
            if let Some(v) = upd.publication {
                qb.push(", public_chat_id = ").push_bind(v.chat_id);
                qb.push(", public_msg_id = ").push_bind(v.message_id);
            }
            if let Some(v) = upd.publish_bundle_id { qb.push(", publish_bundle_id = ").push_bind(v); }
            if let Some(v) = upd.warn_text_id { qb.push(", warn_text_id = ").push_bind(v); }
            if let Some(v) = upd.reviewer_id { qb.push(", reviewer_id = ").push_bind(v); }
            if let Some(v) = upd.reject_reason { qb.push(", reject_reason = ").push_bind(v); }
            if let Some(v) = upd.count_reject { qb.push(", count_reject = ").push_bind(v); }
            qb.push(" WHERE id = ").push_bind(id);
            qb.push(" RETURNING ").push(POST_COLUMNS);
            let rec = qb.build_query_as::<PostRow>()
                .fetch_one(&self.pool).await.map_err(internal)?;
            Ok(rec.0)
        }

        async fn count_posts(&self, filter: &PostFilter) -> RepoResult<u64> {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM posts WHERE TRUE");
            if let Some(uid) = filter.submitter { qb.push(" AND submitter_id = ").push_bind(uid); }
            if let Some(after) = filter.created_after { qb.push(" AND created_at >= ").push_bind(after); }
            if !filter.statuses.is_empty() || filter.counted_rejects {
                qb.push(" AND (FALSE");
                if !filter.statuses.is_empty() {
                    let names: Vec<&'static str> = filter.statuses.iter().map(|s| s.as_str()).collect();
                    qb.push(" OR status = ANY(").push_bind(names).push(")");
                }
                if filter.counted_rejects {
                    qb.push(" OR (status = 'rejected' AND count_reject)");
                }
                qb.push(")");
            }
            let n: i64 = qb.build().fetch_one(&self.pool).await.map_err(internal)?.try_get(0).map_err(internal)?;
            Ok(n.max(0) as u64)
        }

        async fn find_stale(&self, status: PostStatus, before: DateTime<Utc>) -> RepoResult<Vec<Post>> {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE status = $1 AND modified_at < $2 ORDER BY id");
            let rows = sqlx::query_as::<_, PostRow>(&sql)
                .bind(status.as_str())
                .bind(before)
                .fetch_all(&self.pool).await.map_err(internal)?;
            Ok(rows.into_iter().map(|r| r.0).collect())
        }

        async fn first_in_plan(&self) -> RepoResult<Option<Post>> {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE status = 'in_plan' ORDER BY id LIMIT 1");
            let rec = sqlx::query_as::<_, PostRow>(&sql)
                .fetch_optional(&self.pool).await.map_err(internal)?;
            Ok(rec.map(|r| r.0))
        }
    }

    #[async_trait]
    impl AttachmentRepo for PgRepo {
        async fn create_attachment(&self, new: NewAttachment) -> RepoResult<Attachment> {
            let m = new.media;
            let row = sqlx::query(
                "INSERT INTO attachments (post_id, kind, file_id, file_unique_id, file_name, mime, size, width, height) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9) RETURNING id"
            )
                .bind(new.post_id)
                .bind(new.kind.as_str())
                .bind(&m.file_id)
                .bind(&m.file_unique_id)
                .bind(&m.file_name)
                .bind(&m.mime)
                .bind(m.size)
                .bind(m.width)
                .bind(m.height)
                .fetch_one(&self.pool).await.map_err(internal)?;
            Ok(Attachment {
                id: row.try_get("id").map_err(internal)?,
                post_id: new.post_id,
                kind: new.kind,
                file_id: m.file_id,
                file_unique_id: m.file_unique_id,
                file_name: m.file_name,
                mime: m.mime,
                size: m.size,
                width: m.width,
                height: m.height,
            })
        }

        async fn list_attachments(&self, post_id: Id) -> RepoResult<Vec<Attachment>> {
            let rows = sqlx::query(
                "SELECT id, post_id, kind, file_id, file_unique_id, file_name, mime, size, width, height \
                 FROM attachments WHERE post_id = $1 ORDER BY id"
            )
                .bind(post_id)
                .fetch_all(&self.pool).await.map_err(internal)?;
            rows.into_iter()
                .map(|r| -> Result<Attachment, sqlx::Error> {
                    Ok(Attachment {
                        id: r.try_get("id")?,
                        post_id: r.try_get("post_id")?,
                        kind: decode(r.try_get("kind")?)?,
                        file_id: r.try_get("file_id")?,
                        file_unique_id: r.try_get("file_unique_id")?,
                        file_name: r.try_get("file_name")?,
                        mime: r.try_get("mime")?,
                        size: r.try_get("size")?,
                        width: r.try_get("width")?,
                        height: r.try_get("height")?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(internal)
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
            let row = sqlx::query(
                "SELECT id, name, is_admin, is_banned, can_review, direct_post, notification, prefer_anonymous, \
                 post_count, accept_count, reject_count, review_count, modified_at FROM users WHERE id = $1"
            )
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(internal)?;
            let Some(r) = row else { return Ok(None) };
            let user = (|| -> Result<User, sqlx::Error> {
                Ok(User {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                    is_admin: r.try_get("is_admin")?,
                    is_banned: r.try_get("is_banned")?,
                    can_review: r.try_get("can_review")?,
                    direct_post: r.try_get("direct_post")?,
                    notification: r.try_get("notification")?,
                    prefer_anonymous: r.try_get("prefer_anonymous")?,
                    post_count: r.try_get("post_count")?,
                    accept_count: r.try_get("accept_count")?,
                    reject_count: r.try_get("reject_count")?,
                    review_count: r.try_get("review_count")?,
                    modified_at: r.try_get("modified_at")?,
                })
            })().map_err(internal)?;
            Ok(Some(user))
        }

        async fn upsert_user(&self, user: User) -> RepoResult<User> {
            sqlx::query(
                "INSERT INTO users (id, name, is_admin, is_banned, can_review, direct_post, notification, prefer_anonymous, \
                 post_count, accept_count, reject_count, review_count) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12) \
                 ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, is_admin = EXCLUDED.is_admin, \
                 is_banned = EXCLUDED.is_banned, can_review = EXCLUDED.can_review, direct_post = EXCLUDED.direct_post, \
                 notification = EXCLUDED.notification, prefer_anonymous = EXCLUDED.prefer_anonymous, modified_at = now()"
            )
                .bind(user.id)
                .bind(&user.name)
                .bind(user.is_admin)
                .bind(user.is_banned)
                .bind(user.can_review)
                .bind(user.direct_post)
                .bind(user.notification)
                .bind(user.prefer_anonymous)
                .bind(user.post_count)
                .bind(user.accept_count)
                .bind(user.reject_count)
                .bind(user.review_count)
                .execute(&self.pool).await.map_err(internal)?;
            self.get_user(user.id).await?.ok_or(RepoError::NotFound)
        }

        async fn bump_counters(&self, id: UserId, delta: CounterDelta) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE users SET post_count = post_count + $2, accept_count = accept_count + $3, \
                 reject_count = reject_count + $4, review_count = review_count + $5, modified_at = now() WHERE id = $1"
            )
                .bind(id)
                .bind(delta.post)
                .bind(delta.accept)
                .bind(delta.reject)
                .bind(delta.review)
                .execute(&self.pool).await.map_err(internal)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }
}
