//! Build scheduling for the Tempo CI engine.
//!
//! On every tick, each pipeline's [`Runner`] fans out over its jobs. Every
//! job is scheduled under a TTL-bounded lock and a token from the shared
//! [`JobGuard`]. The [`Scheduler`] creates pending builds for new trigger
//! inputs and the [`BuildStarter`] starts pending builds in order.

pub mod error;
pub mod guard;
pub mod interval;
pub mod metrics;
pub mod resolve;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod starter;
pub mod strategy;

pub use error::{SchedulerError, SchedulerResult};
pub use guard::{DEFAULT_CAPACITY, HeldLock, JobGuard};
pub use interval::IntervalRunner;
pub use metrics::{Metrics, TracingMetrics};
pub use resolve::{FreshAlgorithm, SnapshotInputMapper, resolve};
pub use runner::{JobOutcome, JobReport, Runner, SkipReason, TickReport};
pub use scheduler::{JobSchedule, Scheduler};
pub use service::{RunnerExit, SchedulerService};
pub use starter::{BuildStarter, StartOutcome};
pub use strategy::{BuildInputs, BuildStartStrategy, StrategyKind, strategy_for};
