//! Distributed locks.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{JobId, Result};

/// Names a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum LockId {
    /// Held while a job is being scheduled.
    #[display("job-scheduling:{_0}")]
    JobScheduling(JobId),
}

/// A held lock. Release is idempotent.
#[async_trait]
pub trait Lock: Send + Sync {
    fn id(&self) -> LockId;

    async fn release(&self) -> Result<()>;
}
