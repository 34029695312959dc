//! Round scheduler
//!
//! Drives [`GameEngine::tick`] on a fixed interval until stopped. The first
//! tick fires immediately, so a freshly started scheduler recovers unsettled
//! rounds and opens a round before anything else happens.

use crate::engine::GameEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub struct RoundScheduler {
    engine: Arc<GameEngine>,
    tick_interval: Duration,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RoundScheduler {
    pub fn new(engine: Arc<GameEngine>) -> Self {
        let tick_interval = engine.config().tick_interval();
        Self::with_interval(engine, tick_interval)
    }

    pub fn with_interval(engine: Arc<GameEngine>, tick_interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            engine,
            tick_interval,
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the tick loop. Returns false if it was already running.
    pub async fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shutdown.send_replace(false);

        let engine = self.engine.clone();
        let running = self.running.clone();
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = self.tick_interval.as_millis() as u64, "Round scheduler started");

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match engine.tick().await {
                            Ok(report) if report.skipped => debug!("Tick skipped"),
                            Ok(report) => {
                                for summary in &report.declared {
                                    debug!(
                                        period = %summary.period,
                                        digit = %summary.outcome.digit,
                                        "Tick declared round"
                                    );
                                }
                            }
                            Err(e) => error!(error = %e, "Tick failed"),
                        }
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        *self.handle.lock().await = Some(handle);
        true
    }

    /// Signal the loop to stop and wait for the in-flight tick to finish
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!("Round scheduler stopped");
    }
}
