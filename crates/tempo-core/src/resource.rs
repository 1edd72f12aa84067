//! Resources and resource types as the scheduler sees them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;
use crate::versions::Version;

/// Static configuration of a resource, as handed to the build factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub source: serde_json::Value,
}

/// A custom resource type declared by a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceType {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub source: serde_json::Value,
    #[serde(default)]
    pub privileged: bool,
}

/// A resource together with the scheduling-relevant state loaded with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerResource {
    pub id: ResourceId,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub source: serde_json::Value,
    /// Version pinned by an operator, overriding resolution.
    pub pinned_version: Option<Version>,
    /// When checking last finished for this resource. `None` if never checked.
    pub last_check_end_time: Option<DateTime<Utc>>,
}

impl SchedulerResource {
    pub fn current_pinned_version(&self) -> Option<&Version> {
        self.pinned_version.as_ref()
    }

    pub fn config(&self) -> ResourceConfig {
        ResourceConfig {
            name: self.name.clone(),
            type_: self.type_.clone(),
            source: self.source.clone(),
        }
    }
}

/// The resources of a pipeline, loaded once per scheduled job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(Vec<SchedulerResource>);

impl Resources {
    pub fn new(resources: Vec<SchedulerResource>) -> Self {
        Self(resources)
    }

    /// Find a resource by name.
    pub fn lookup(&self, name: &str) -> Option<&SchedulerResource> {
        self.0.iter().find(|r| r.name == name)
    }

    pub fn configs(&self) -> Vec<ResourceConfig> {
        self.0.iter().map(SchedulerResource::config).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SchedulerResource> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<SchedulerResource>> for Resources {
    fn from(resources: Vec<SchedulerResource>) -> Self {
        Self(resources)
    }
}

impl<'a> IntoIterator for &'a Resources {
    type Item = &'a SchedulerResource;
    type IntoIter = std::slice::Iter<'a, SchedulerResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
