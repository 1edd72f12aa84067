//! Fixed-interval task driver.

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{SchedulerError, SchedulerResult};

/// Runs a task immediately and then once per interval until cancelled.
///
/// Task errors are logged and the loop keeps ticking, unless the error is
/// fatal (see [`SchedulerError::is_fatal`]), in which case `run` returns it.
#[derive(Debug, Clone)]
pub struct IntervalRunner {
    name: String,
    interval: Duration,
    noop: bool,
}

impl IntervalRunner {
    pub fn new(name: impl Into<String>, interval: Duration) -> SchedulerResult<Self> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }

        Ok(Self {
            name: name.into(),
            interval,
            noop: false,
        })
    }

    /// In noop mode the runner signals ready and waits for cancellation
    /// without ever invoking the task.
    pub fn noop(mut self, noop: bool) -> Self {
        self.noop = noop;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drive `task` until `cancel` fires.
    ///
    /// `ready` is signalled after the first invocation completes. Each
    /// invocation receives a child of `cancel`; a running invocation is
    /// never interrupted, it observes the token and winds down itself.
    pub async fn run<F, Fut>(
        &self,
        cancel: CancellationToken,
        ready: Option<oneshot::Sender<()>>,
        mut task: F,
    ) -> SchedulerResult<()>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = SchedulerResult<()>>,
    {
        if self.noop {
            info!(runner = %self.name, "Interval runner in noop mode");
            signal(ready);
            cancel.cancelled().await;
            return Ok(());
        }

        info!(
            runner = %self.name,
            interval_ms = self.interval.as_millis() as u64,
            "Interval runner started"
        );

        self.invoke(&cancel, &mut task).await?;
        signal(ready);

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(runner = %self.name, "Interval runner shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.invoke(&cancel, &mut task).await?;
                }
            }
        }
    }

    async fn invoke<F, Fut>(&self, cancel: &CancellationToken, task: &mut F) -> SchedulerResult<()>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = SchedulerResult<()>>,
    {
        match task(cancel.child_token()).await {
            Ok(()) => {
                debug!(runner = %self.name, "Tick completed");
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(runner = %self.name, error = %e, "Tick failed");
                Ok(())
            }
        }
    }
}

fn signal(ready: Option<oneshot::Sender<()>>) {
    if let Some(ready) = ready {
        let _ = ready.send(());
    }
}
