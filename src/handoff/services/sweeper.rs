//! Periodic expiry sweep.

use super::dispatcher::HandoffDispatcher;
use super::error::DispatchResult;
use crate::handoff::ports::{AgentDirectory, HandoffNotifier, HandoffStore, TenantIdentity};
use mockable::Clock;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending handoffs expired by timeout.
    pub pending_expired: usize,
    /// Active handoffs expired for inactivity.
    pub idle_expired: usize,
    /// Handoffs whose expiry failed and will be retried next sweep.
    pub failures: usize,
}

/// Drives pending timeout and idle expiry in batches.
pub struct ExpirySweeper<S, D, T, N, C>
where
    S: HandoffStore,
    D: AgentDirectory,
    T: TenantIdentity,
    N: HandoffNotifier,
    C: Clock + Send + Sync,
{
    dispatcher: Arc<HandoffDispatcher<S, D, T, N, C>>,
}

impl<S, D, T, N, C> ExpirySweeper<S, D, T, N, C>
where
    S: HandoffStore + 'static,
    D: AgentDirectory + 'static,
    T: TenantIdentity + 'static,
    N: HandoffNotifier + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a sweeper for `dispatcher`.
    #[must_use]
    pub const fn new(dispatcher: Arc<HandoffDispatcher<S, D, T, N, C>>) -> Self {
        Self { dispatcher }
    }

    /// Runs one sweep over at most one batch of each kind.
    ///
    /// Failures on individual handoffs are counted and logged; the rest of
    /// the batch still runs.
    ///
    /// # Errors
    ///
    /// Returns a store failure raised while listing candidates.
    pub async fn sweep_once(&self) -> DispatchResult<SweepReport> {
        let mut report = SweepReport::default();

        for handoff_id in self.dispatcher.stale_pending_batch().await? {
            match self.dispatcher.expire_pending(handoff_id).await {
                Ok(Some(_)) => report.pending_expired += 1,
                Ok(None) => debug!(%handoff_id, "pending handoff left the queue before expiry"),
                Err(err) => {
                    report.failures += 1;
                    error!(%handoff_id, error = %err, "failed to expire pending handoff");
                }
            }
        }

        for handoff_id in self.dispatcher.idle_active_batch().await? {
            match self.dispatcher.expire_idle_active(handoff_id).await {
                Ok(Some(_)) => report.idle_expired += 1,
                Ok(None) => debug!(%handoff_id, "active handoff saw activity before expiry"),
                Err(err) => {
                    report.failures += 1;
                    error!(%handoff_id, error = %err, "failed to expire idle handoff");
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                pending_expired = report.pending_expired,
                idle_expired = report.idle_expired,
                failures = report.failures,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweeps every `sweep_interval` until `shutdown` turns `true` or its
    /// sender is dropped.
    #[must_use]
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = self.dispatcher.config().sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = self.sweep_once().await {
                            error!(error = %err, "expiry sweep failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("expiry sweeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
