//! Identifiers.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
            Serialize, Deserialize, Display, From,
        )]
        #[display("{_0}")]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

integer_id!(
    /// Identifies a pipeline.
    PipelineId
);

integer_id!(
    /// Identifies a job within the whole installation (not just its pipeline).
    JobId
);

integer_id!(
    /// Identifies a build. Zero never names a real build.
    BuildId
);

integer_id!(
    /// Identifies a resource.
    ResourceId
);

impl BuildId {
    /// The "no build" sentinel used by `rerun_of` on builds that are not reruns.
    pub const NONE: BuildId = BuildId(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// Identity of one scheduler instance, used as the owner of the locks it holds.
/// Uses UUIDv7 so owners sort by start time in lock tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for InstanceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::str::FromStr for InstanceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_id_sentinel() {
        assert!(BuildId::NONE.is_none());
        assert!(BuildId::default().is_none());
        assert!(!BuildId::new(4).is_none());
    }

    #[test]
    fn test_ids_display_as_integers() {
        assert_eq!(JobId::new(12).to_string(), "12");
        assert_eq!(i64::from(PipelineId::from(3)), 3);
    }

    #[test]
    fn test_instance_ids_are_unique() {
        let a = InstanceId::new();
        let b = InstanceId::new();
        assert_ne!(a, b);

        let parsed: InstanceId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
    }
}
