//! Background expiry sweeper.
//!
//! A periodic task that finds questionnaires whose deadline has passed but
//! whose accumulator is still encrypted, and reveals them so results are
//! ready before anyone asks. Each candidate is handled independently: one
//! failing reveal is logged and skipped, never aborting the sweep, and the
//! failed candidate is naturally picked up again on the next tick because
//! it still matches the due query.
//!
//! Shutdown is cooperative via a watch channel; [`SweeperHandle::shutdown`]
//! signals the loop and waits for the task to drain.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hushpoll_core::scheme::SchemeProvider;

use crate::reveal::ResultRevealer;
use crate::store::SqliteStore;

/// Periodic auto-reveal of expired questionnaires.
pub struct ExpirySweeper {
    store: SqliteStore,
    revealer: ResultRevealer,
    interval: Duration,
}

/// Handle to a spawned sweeper task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the sweeper to stop and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "sweeper task did not shut down cleanly");
        }
    }
}

impl ExpirySweeper {
    /// Creates a sweeper over the given store and scheme provider.
    #[must_use]
    pub fn new(
        store: SqliteStore,
        provider: Arc<dyn SchemeProvider>,
        interval: Duration,
    ) -> Self {
        let revealer = ResultRevealer::new(store.clone(), provider);
        Self {
            store,
            revealer,
            interval,
        }
    }

    /// Spawns the sweep loop. The first sweep runs immediately, then one
    /// per interval.
    pub fn spawn(self) -> SweeperHandle {
        let (tx, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once();
                    }
                    _ = rx.changed() => {
                        info!("expiry sweeper stopping");
                        break;
                    }
                }
            }
        });
        SweeperHandle { shutdown: tx, task }
    }

    /// Runs one sweep and returns how many questionnaires were revealed.
    pub fn sweep_once(&self) -> usize {
        let due = match self.store.find_due_for_reveal(Utc::now()) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "expiry sweep query failed");
                return 0;
            }
        };
        if due.is_empty() {
            debug!("expiry sweep found nothing due");
            return 0;
        }

        let mut revealed = 0;
        for link in due {
            match self.revealer.reveal(&link) {
                Ok(tally) => {
                    revealed += 1;
                    info!(
                        link = %link,
                        responses = tally.response_count,
                        "auto-revealed expired questionnaire"
                    );
                }
                Err(e) if e.is_retryable() => {
                    warn!(link = %link, error = %e, "reveal failed, will retry next sweep");
                }
                Err(e) => {
                    warn!(link = %link, error = %e, "reveal failed");
                }
            }
        }
        revealed
    }
}
