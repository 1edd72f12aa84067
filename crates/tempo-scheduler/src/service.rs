//! Scheduler service: one runner per pipeline, sharing one job guard.

use std::sync::Arc;
use tempo_config::SchedulerConfig;
use tempo_core::{BuildFactory, Engine, Pipeline};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::guard::JobGuard;
use crate::metrics::{Metrics, TracingMetrics};
use crate::resolve::{FreshAlgorithm, SnapshotInputMapper};
use crate::runner::Runner;
use crate::scheduler::Scheduler;
use crate::starter::BuildStarter;
use crate::{SchedulerError, SchedulerResult};

/// How a pipeline's runner ended.
#[derive(Debug)]
pub struct RunnerExit {
    pub pipeline: String,
    pub result: SchedulerResult<()>,
}

/// Owns the shared job guard and every pipeline runner.
pub struct SchedulerService {
    config: SchedulerConfig,
    guard: JobGuard,
    factory: Arc<dyn BuildFactory>,
    engine: Arc<dyn Engine>,
    metrics: Arc<dyn Metrics>,
    cancel: CancellationToken,
    runners: JoinSet<RunnerExit>,
}

impl SchedulerService {
    pub fn new(
        config: SchedulerConfig,
        factory: Arc<dyn BuildFactory>,
        engine: Arc<dyn Engine>,
    ) -> SchedulerResult<Self> {
        config.validate()?;

        Ok(Self {
            guard: JobGuard::new(config.max_concurrent_jobs),
            config,
            factory,
            engine,
            metrics: Arc::new(TracingMetrics),
            cancel: CancellationToken::new(),
            runners: JoinSet::new(),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn guard(&self) -> &JobGuard {
        &self.guard
    }

    /// Token that stops every runner when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of runners still running.
    pub fn running(&self) -> usize {
        self.runners.len()
    }

    /// Build the runner for a pipeline with the standard collaborators.
    pub fn runner_for(&self, pipeline: Arc<dyn Pipeline>) -> Runner {
        let starter = BuildStarter::new(
            Arc::clone(&self.factory),
            Arc::clone(&self.engine),
            Arc::new(FreshAlgorithm::new(Arc::clone(&pipeline))),
        );
        let scheduler = Scheduler::new(
            Arc::new(SnapshotInputMapper),
            starter,
            Arc::clone(&self.metrics),
        );

        Runner::new(
            pipeline,
            Arc::new(scheduler),
            self.guard.clone(),
            self.config.interval,
            Arc::clone(&self.metrics),
        )
    }

    /// Start scheduling a pipeline. Returns once its first tick has run.
    pub async fn add_pipeline(&mut self, pipeline: Arc<dyn Pipeline>) {
        let runner = self.runner_for(pipeline);
        self.spawn(runner).await;
    }

    /// Start a runner built elsewhere. Returns once its first tick has run.
    pub async fn spawn(&mut self, runner: Runner) {
        let name = runner.pipeline().name().to_string();
        let cancel = self.cancel.child_token();
        let noop = self.config.noop;
        let (ready_tx, ready_rx) = oneshot::channel();

        info!(pipeline = %name, "Starting pipeline runner");
        self.runners.spawn(async move {
            let result = runner.run(cancel, Some(ready_tx), noop).await;
            RunnerExit {
                pipeline: runner.pipeline().name().to_string(),
                result,
            }
        });

        // The sender is dropped without signalling if the runner exits first.
        if ready_rx.await.is_err() {
            info!(pipeline = %name, "Pipeline runner exited before becoming ready");
        }
    }

    /// Wait for the next runner to exit on its own.
    ///
    /// A runner whose pipeline was removed exits cleanly: its result is
    /// reported as `Ok`.
    pub async fn next_exit(&mut self) -> Option<RunnerExit> {
        loop {
            match self.runners.join_next().await? {
                Ok(exit) => return Some(normalize(exit)),
                Err(e) => error!(error = %e, "Pipeline runner task failed"),
            }
        }
    }

    /// Cancel every runner and wait for them to finish their current tick.
    pub async fn shutdown(mut self) -> Vec<RunnerExit> {
        info!(runners = self.runners.len(), "Shutting down scheduler");
        self.cancel.cancel();

        let mut exits = Vec::new();
        while let Some(exit) = self.next_exit().await {
            exits.push(exit);
        }
        exits
    }
}

fn normalize(exit: RunnerExit) -> RunnerExit {
    match exit.result {
        Err(SchedulerError::PipelineRemoved(_)) => {
            info!(pipeline = %exit.pipeline, "Pipeline removed, runner stopped");
            RunnerExit {
                pipeline: exit.pipeline,
                result: Ok(()),
            }
        }
        Err(ref e) => {
            error!(pipeline = %exit.pipeline, error = %e, "Pipeline runner failed");
            exit
        }
        Ok(()) => exit,
    }
}
