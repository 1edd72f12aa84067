//! Resource versions and the per-tick versions snapshot.
//!
//! A [`VersionsDb`] is loaded once per pipeline tick and shared read-only by
//! every job scheduled in that tick. It holds everything input resolution
//! needs: the versions each resource has produced, and which versions went
//! into or came out of which builds.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::{BuildId, JobId, ResourceId};

/// A resource version, e.g. `{"ref": "abc123"}`.
pub type Version = BTreeMap<String, String>;

/// A version as saved by resource checking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedVersion {
    pub resource_id: ResourceId,
    pub version: Version,
    /// Monotonic order in which checking discovered the version. Higher is newer.
    pub check_order: i64,
    /// Disabled versions are never picked as inputs.
    pub disabled: bool,
}

/// A version that was an input to, or an output of, a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildVersion {
    pub build_id: BuildId,
    pub job_id: JobId,
    /// Input or output name within the job.
    pub name: String,
    pub resource_id: ResourceId,
    pub version: Version,
    /// Whether the build finished successfully.
    pub succeeded: bool,
}

/// A resolved version for one job input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInput {
    pub resource_id: ResourceId,
    pub version: Version,
    /// True when no earlier build of the job consumed this version for this input.
    pub first_occurrence: bool,
}

/// Resolution result for one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputResult {
    Resolved(ResolvedInput),
    Unresolved { reason: String },
}

impl InputResult {
    pub fn resolved(&self) -> Option<&ResolvedInput> {
        match self {
            InputResult::Resolved(input) => Some(input),
            InputResult::Unresolved { .. } => None,
        }
    }

    pub fn is_first_occurrence(&self) -> bool {
        self.resolved().is_some_and(|input| input.first_occurrence)
    }
}

/// Input name to resolution result for a job's next build.
pub type InputMapping = BTreeMap<String, InputResult>;

/// Immutable snapshot of versions, build inputs and build outputs.
#[derive(Debug, Clone, Default)]
pub struct VersionsDb {
    resource_versions: HashMap<ResourceId, Vec<SavedVersion>>,
    build_inputs: Vec<BuildVersion>,
    build_outputs: Vec<BuildVersion>,
    job_ids: HashMap<String, JobId>,
}

impl VersionsDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a saved version. Versions are kept newest first.
    pub fn with_version(mut self, version: SavedVersion) -> Self {
        let versions = self
            .resource_versions
            .entry(version.resource_id)
            .or_default();
        versions.push(version);
        versions.sort_by(|a, b| b.check_order.cmp(&a.check_order));
        self
    }

    pub fn with_build_input(mut self, input: BuildVersion) -> Self {
        self.build_inputs.push(input);
        self
    }

    pub fn with_build_output(mut self, output: BuildVersion) -> Self {
        self.build_outputs.push(output);
        self
    }

    pub fn with_job(mut self, name: impl Into<String>, id: JobId) -> Self {
        self.job_ids.insert(name.into(), id);
        self
    }

    /// Id of a job in the snapshot's pipeline, by name.
    pub fn job_id(&self, name: &str) -> Option<JobId> {
        self.job_ids.get(name).copied()
    }

    /// Enabled versions of a resource, newest first.
    pub fn versions_of(&self, resource_id: ResourceId) -> impl Iterator<Item = &SavedVersion> {
        self.resource_versions
            .get(&resource_id)
            .into_iter()
            .flatten()
            .filter(|v| !v.disabled)
    }

    pub fn latest_version(&self, resource_id: ResourceId) -> Option<&SavedVersion> {
        self.versions_of(resource_id).next()
    }

    /// Whether an enabled version with exactly these fields exists.
    pub fn contains_version(&self, resource_id: ResourceId, version: &Version) -> bool {
        self.versions_of(resource_id).any(|v| &v.version == version)
    }

    /// Whether any build of `job_id` consumed `version` of `resource_id` as input `name`.
    pub fn used_by_job(
        &self,
        job_id: JobId,
        name: &str,
        resource_id: ResourceId,
        version: &Version,
    ) -> bool {
        self.build_inputs.iter().any(|input| {
            input.job_id == job_id
                && input.name == name
                && input.resource_id == resource_id
                && &input.version == version
        })
    }

    /// Whether a successful build of `job_id` had `version` as an input or output.
    pub fn passed_by(&self, job_id: JobId, resource_id: ResourceId, version: &Version) -> bool {
        self.build_inputs
            .iter()
            .chain(self.build_outputs.iter())
            .any(|record| {
                record.succeeded
                    && record.job_id == job_id
                    && record.resource_id == resource_id
                    && &record.version == version
            })
    }
}

/// Build a [`Version`] from key/value pairs.
pub fn version<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Version {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
