//! Background resend loop.

use crate::{OutboxError, OutboxResult, OutboxService};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Runs [`OutboxService::resend`] on a fixed interval.
pub struct ResendWorker {
    service: Arc<OutboxService>,
    period: Duration,
}

/// Handle to a running [`ResendWorker`].
pub struct ResendHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ResendWorker {
    /// Fails if `period` is zero.
    pub fn new(service: Arc<OutboxService>, period: Duration) -> OutboxResult<Self> {
        if period.is_zero() {
            return Err(OutboxError::InvalidPeriod);
        }
        Ok(Self { service, period })
    }

    /// Spawn the loop on the current tokio runtime. The first pass runs immediately.
    pub fn start(self) -> ResendHandle {
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let Self { service, period } = self;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(?period, "Resend worker started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        match service.resend().await {
                            Ok(report) if report.published.is_empty() && report.failed.is_empty() => {}
                            Ok(report) => debug!(
                                published = report.published.len(),
                                failed = report.failed.len(),
                                "Resend pass finished"
                            ),
                            Err(e) => warn!(error = %e, "Resend pass failed"),
                        }
                    }
                }
            }

            info!("Resend worker stopped");
        });

        ResendHandle { shutdown, task }
    }
}

impl ResendHandle {
    /// Signal the loop and wait for the in-progress pass to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Resend worker task ended abnormally");
        }
    }
}
