//! Executable build plans and the factory that compiles them.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::build::BuildInput;
use crate::job::JobConfig;
use crate::resource::{ResourceConfig, ResourceType};
use crate::versions::Version;

/// A compiled, executable plan for one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// Run the sub-plans in order.
    Do(Vec<Plan>),
    Get(GetPlan),
    Put(PutPlan),
    Task(TaskPlan),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPlan {
    pub name: String,
    pub resource: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub source: serde_json::Value,
    pub version: Option<Version>,
    pub resource_types: Vec<ResourceType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutPlan {
    pub name: String,
    pub resource: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub source: serde_json::Value,
    pub resource_types: Vec<ResourceType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub name: String,
    pub file: String,
}

/// Compiles a job's configuration and resolved inputs into a [`Plan`].
pub trait BuildFactory: Send + Sync {
    fn create(
        &self,
        job: &JobConfig,
        resources: &[ResourceConfig],
        resource_types: &[ResourceType],
        inputs: &[BuildInput],
    ) -> Result<Plan>;
}
