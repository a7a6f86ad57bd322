use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::lifecycle::Engine;

/// The engine's periodic work, started together and stopped together.
pub struct Background {
    stop: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Background {
    /// Starts the bundle sweep and, when `expiry_every` is set, the expiry reaper.
    pub fn start(engine: Arc<Engine>, sweep_every: Duration, expiry_every: Option<Duration>) -> Self {
        let (stop, rx) = watch::channel(false);
        let mut handles = vec![tokio::spawn(sweep_loop(engine.clone(), sweep_every, rx.clone()))];
        if let Some(every) = expiry_every {
            handles.push(tokio::spawn(expiry_loop(engine, every, rx)));
        }
        info!(tasks = handles.len(), "background tasks started");
        Self { stop, handles }
    }

    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for h in self.handles {
            if let Err(e) = h.await {
                error!(error = %e, "background task ended abnormally");
            }
        }
        info!("background tasks stopped");
    }
}

async fn sweep_loop(engine: Arc<Engine>, every: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let n = engine.sweep_bundles().await;
                if n > 0 { debug!(finalized = n, "bundle sweep"); }
            }
            _ = stop.changed() => break,
        }
    }
    // drafts still open at shutdown are finalized if their window already elapsed
    engine.sweep_bundles().await;
}

async fn expiry_loop(engine: Arc<Engine>, every: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => match engine.expire_stale().await {
                Ok(0) => {}
                Ok(n) => info!(expired = n, "expired stale posts"),
                Err(e) => error!(error = %e, "expiry scan failed"),
            },
            _ = stop.changed() => break,
        }
    }
}
