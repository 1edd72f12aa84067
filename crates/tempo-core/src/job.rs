//! Job configuration and the job storage interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::build::Build;
use crate::lock::Lock;
use crate::versions::{InputMapping, Version};
use crate::{JobId, PipelineId, Result};

/// A step in a job's build plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Fetch a resource version. Every `get` is a job input.
    Get {
        name: String,
        /// Resource to fetch; defaults to `name`.
        #[serde(default)]
        resource: Option<String>,
        /// Whether new versions automatically create builds.
        #[serde(default)]
        trigger: bool,
        /// Jobs the version must have passed through successfully.
        #[serde(default)]
        passed: Vec<String>,
        #[serde(default)]
        version: VersionPolicy,
    },
    /// Push to a resource.
    Put {
        name: String,
        #[serde(default)]
        resource: Option<String>,
    },
    /// Run a task.
    Task { name: String, file: String },
}

/// Which version of an input a build should use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionPolicy {
    #[default]
    Latest,
    Every,
    Pinned(Version),
}

/// A job input, derived from a `get` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInputConfig {
    pub name: String,
    pub resource: String,
    pub trigger: bool,
    pub passed: Vec<String>,
    pub version: VersionPolicy,
}

/// Configuration of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub plan: Vec<Step>,
    /// Cap on running builds. Zero means unlimited unless the job is serial.
    #[serde(default)]
    pub max_in_flight: u32,
    #[serde(default)]
    pub serial: bool,
    #[serde(default)]
    pub serial_groups: Vec<String>,
}

impl JobConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The job's inputs, in plan order.
    pub fn inputs(&self) -> Vec<JobInputConfig> {
        self.plan
            .iter()
            .filter_map(|step| match step {
                Step::Get {
                    name,
                    resource,
                    trigger,
                    passed,
                    version,
                } => Some(JobInputConfig {
                    name: name.clone(),
                    resource: resource.clone().unwrap_or_else(|| name.clone()),
                    trigger: *trigger,
                    passed: passed.clone(),
                    version: version.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Effective max-in-flight. Serial jobs default to one build at a time.
    pub fn effective_max_in_flight(&self) -> u32 {
        if self.max_in_flight > 0 {
            return self.max_in_flight;
        }
        if self.serial || !self.serial_groups.is_empty() {
            return 1;
        }
        0
    }

    pub fn with_get(mut self, name: impl Into<String>, trigger: bool) -> Self {
        self.plan.push(Step::Get {
            name: name.into(),
            resource: None,
            trigger,
            passed: Vec::new(),
            version: VersionPolicy::Latest,
        });
        self
    }

    pub fn with_task(mut self, name: impl Into<String>, file: impl Into<String>) -> Self {
        self.plan.push(Step::Task {
            name: name.into(),
            file: file.into(),
        });
        self
    }
}

/// Storage interface for a job.
///
/// Getters return state as of the last load or [`Job::reload`].
#[async_trait]
pub trait Job: Send + Sync {
    fn id(&self) -> JobId;

    fn name(&self) -> &str;

    fn pipeline_id(&self) -> PipelineId;

    fn pipeline_name(&self) -> &str;

    fn config(&self) -> JobConfig;

    fn paused(&self) -> bool;

    /// Whether the last resolved mapping contained a first-occurrence version.
    fn has_new_inputs(&self) -> bool;

    /// When a scheduling pass was last requested.
    fn schedule_requested_time(&self) -> DateTime<Utc>;

    /// Request time covered by the last complete scheduling pass.
    fn last_scheduled(&self) -> DateTime<Utc>;

    /// Whether a pass was requested after the last complete one.
    fn needs_scheduling(&self) -> bool {
        self.schedule_requested_time() > self.last_scheduled()
    }

    /// Whether the last claim was refused for max-in-flight.
    fn max_in_flight_reached(&self) -> bool;

    /// Refresh state. Returns false if the job no longer exists.
    async fn reload(&self) -> Result<bool>;

    /// Try to take this job's scheduling lock for `ttl`. Never waits.
    async fn acquire_scheduling_lock(&self, ttl: Duration) -> Result<Option<Box<dyn Lock>>>;

    /// Claim a pending build for this instance.
    ///
    /// Claiming a build this instance already claimed succeeds again. Returns
    /// false if another instance holds the claim, either job or pipeline is
    /// paused, or max-in-flight is reached. The max-in-flight outcome is
    /// saved on the job.
    async fn schedule_build(&self, build: &dyn Build) -> Result<bool>;

    /// Pending builds in start order.
    async fn get_pending_builds(&self) -> Result<Vec<Arc<dyn Build>>>;

    /// Create a pending build unless one already exists.
    async fn ensure_pending_build_exists(&self) -> Result<()>;

    async fn save_next_input_mapping(&self, mapping: &InputMapping, resolved: bool) -> Result<()>;

    async fn set_has_new_inputs(&self, has_new_inputs: bool) -> Result<()>;

    /// Ask for another scheduling pass.
    async fn request_schedule(&self) -> Result<()>;

    /// Record that a pass covering requests up to `requested` completed.
    async fn update_last_scheduled(&self, requested: DateTime<Utc>) -> Result<()>;
}
