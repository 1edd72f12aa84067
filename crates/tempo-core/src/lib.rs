//! Core domain types and traits for the Tempo build scheduler.
//!
//! This crate contains:
//! - Identifiers and error types
//! - Builds, jobs, pipelines and resources, plus their storage traits
//! - Version snapshots and input mappings
//! - Collaborator traits: input resolution, plan compilation, build engine
//! - Distributed lock abstraction

pub mod algorithm;
pub mod build;
pub mod engine;
pub mod error;
pub mod id;
pub mod job;
pub mod lock;
pub mod pipeline;
pub mod plan;
pub mod resource;
pub mod versions;

pub use algorithm::{Algorithm, InputComputation, InputMapper, RelatedJobs};
pub use build::{Build, BuildInput, BuildStatus};
pub use engine::{Engine, RunningBuild};
pub use error::{Error, Result};
pub use id::{BuildId, InstanceId, JobId, PipelineId, ResourceId};
pub use job::{Job, JobConfig, JobInputConfig, Step, VersionPolicy};
pub use lock::{Lock, LockId};
pub use pipeline::Pipeline;
pub use plan::{BuildFactory, Plan};
pub use resource::{ResourceConfig, ResourceType, Resources, SchedulerResource};
pub use versions::{InputMapping, InputResult, ResolvedInput, Version, VersionsDb};
