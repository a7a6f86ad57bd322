use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::delivery::Keyboard;
use crate::models::{Id, Location};

/// Confirmation UI that can only be shown once the bundle is complete.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    pub at: Location,
    pub text: String,
    pub keyboard: Keyboard,
    /// Direct-publish controls stay in place even when a warning is shown.
    pub direct: bool,
}

/// In-flight state for one bundle.
#[derive(Debug)]
pub struct Draft {
    /// Set once the backing post record exists.
    pub post_id: Option<Id>,
    /// The first event has been handled (record created or found).
    pub initialised: bool,
    /// The bundle was refused at creation; later members are dropped silently.
    pub declined: bool,
    pub pending: Option<PendingConfirmation>,
    /// First content-quality warning seen across the members.
    pub warning: Option<String>,
    pub attachments: usize,
    expires_at: Instant,
    closed: bool,
}

impl Draft {
    fn new(expires_at: Instant) -> Self {
        Self {
            post_id: None,
            initialised: false,
            declined: false,
            pending: None,
            warning: None,
            attachments: 0,
            expires_at,
            closed: false,
        }
    }
}

/// What the sweep hands back for a draft whose window elapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Finalized {
    pub bundle_id: String,
    pub post_id: Option<Id>,
    pub pending: Option<PendingConfirmation>,
    pub warning: Option<String>,
    pub attachments: usize,
}

/// Exclusive access to one draft. Dropping the guard renews its expiry.
pub struct DraftGuard {
    guard: OwnedMutexGuard<Draft>,
    debounce: Duration,
}

impl Deref for DraftGuard {
    type Target = Draft;
    fn deref(&self) -> &Draft {
        &self.guard
    }
}

impl DerefMut for DraftGuard {
    fn deref_mut(&mut self) -> &mut Draft {
        &mut self.guard
    }
}

impl Drop for DraftGuard {
    fn drop(&mut self) {
        self.guard.expires_at = Instant::now() + self.debounce;
    }
}

/// Keyed table of bundle drafts with per-key linearized admission.
#[derive(Clone)]
pub struct AggregationBuffer {
    drafts: Arc<DashMap<String, Arc<Mutex<Draft>>>>,
    debounce: Duration,
}

impl AggregationBuffer {
    pub fn new(debounce: Duration) -> Self {
        Self { drafts: Arc::new(DashMap::new()), debounce }
    }

    /// Get-or-create the draft for `bundle_id` and lock it. Admissions for the
    /// same key are served one at a time; different keys proceed in parallel.
    pub async fn admit(&self, bundle_id: &str) -> DraftGuard {
        loop {
            let slot = self
                .drafts
                .entry(bundle_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Draft::new(Instant::now() + self.debounce))))
                .clone();
            let guard = slot.lock_owned().await;
            if guard.closed {
                // swept while we waited; the map no longer holds it
                continue;
            }
            return DraftGuard { guard, debounce: self.debounce };
        }
    }

    /// Remove and return every draft whose expiry is at or before `now`.
    /// Drafts currently held by an admission are skipped; they will be renewed.
    pub fn take_expired(&self, now: Instant) -> Vec<Finalized> {
        let keys: Vec<String> = self.drafts.iter().map(|e| e.key().clone()).collect();
        let mut out = Vec::new();
        for key in keys {
            let Some(slot) = self.drafts.get(&key).map(|e| e.value().clone()) else { continue };
            let Ok(mut draft) = slot.try_lock() else { continue };
            if draft.closed || draft.expires_at > now {
                continue;
            }
            draft.closed = true;
            out.push(Finalized {
                bundle_id: key.clone(),
                post_id: draft.post_id,
                pending: draft.pending.take(),
                warning: draft.warning.take(),
                attachments: draft.attachments,
            });
            self.drafts.remove_if(&key, |_, v| Arc::ptr_eq(v, &slot));
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DEBOUNCE: Duration = Duration::from_millis(1500);
    const SWEEP: Duration = Duration::from_millis(1000);

    #[tokio::test(start_paused = true)]
    async fn renewal_pushes_expiry_forward() {
        let buf = AggregationBuffer::new(DEBOUNCE);
        for _ in 0..3 {
            let mut d = buf.admit("g1").await;
            d.attachments += 1;
            drop(d);
            tokio::time::advance(Duration::from_millis(400)).await;
        }
        // 400ms after the third event: still open
        assert!(buf.take_expired(Instant::now()).is_empty());
        tokio::time::advance(Duration::from_millis(1100)).await;
        let done = buf.take_expired(Instant::now());
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].attachments, 3);
        assert!(buf.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn finalized_within_one_sweep_of_debounce() {
        let buf = AggregationBuffer::new(DEBOUNCE);
        drop(buf.admit("g").await);
        let last = Instant::now();
        let mut ticker = tokio::time::interval(SWEEP);
        loop {
            ticker.tick().await;
            if !buf.take_expired(Instant::now()).is_empty() {
                break;
            }
        }
        let latency = Instant::now() - last;
        assert!(latency >= DEBOUNCE);
        assert!(latency < DEBOUNCE + SWEEP);
    }

    #[tokio::test(start_paused = true)]
    async fn held_draft_is_not_swept() {
        let buf = AggregationBuffer::new(DEBOUNCE);
        let guard = buf.admit("g").await;
        tokio::time::advance(DEBOUNCE * 2).await;
        assert!(buf.take_expired(Instant::now()).is_empty());
        drop(guard);
        assert!(buf.take_expired(Instant::now()).is_empty());
        tokio::time::advance(DEBOUNCE).await;
        assert_eq!(buf.take_expired(Instant::now()).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_confirmation_is_handed_out_once() {
        let buf = AggregationBuffer::new(DEBOUNCE);
        {
            let mut d = buf.admit("g").await;
            d.pending = Some(PendingConfirmation { at: Location::new(1, 2), text: "t".into(), keyboard: Keyboard::default(), direct: false });
        }
        tokio::time::advance(DEBOUNCE).await;
        let done = buf.take_expired(Instant::now());
        assert!(done[0].pending.is_some());
        assert!(buf.take_expired(Instant::now()).is_empty());
        // a late member opens a fresh draft
        let d = buf.admit("g").await;
        assert!(!d.initialised);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admits_initialise_once() {
        let buf = AggregationBuffer::new(Duration::from_secs(60));
        let created = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let buf = buf.clone();
            let created = created.clone();
            handles.push(tokio::spawn(async move {
                let mut d = buf.admit("same").await;
                if !d.initialised {
                    tokio::task::yield_now().await;
                    created.fetch_add(1, Ordering::SeqCst);
                    d.initialised = true;
                    d.post_id = Some(1);
                }
                d.attachments += 1;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
        let d = buf.admit("same").await;
        assert_eq!(d.attachments, 32);
    }
}
