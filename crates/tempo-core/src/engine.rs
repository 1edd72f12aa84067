//! Engine trait.
//!
//! The engine runs a started build's plan (containers, steps, etc.). The
//! scheduler only hands builds over; it never waits for them to finish.

use async_trait::async_trait;
use std::sync::Arc;

use crate::build::Build;
use crate::plan::Plan;
use crate::{BuildId, Result};

/// Trait for build engines.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Name of this engine.
    fn name(&self) -> &'static str;

    /// Bind a plan to a started build, ready for execution.
    async fn create_build(&self, build: Arc<dyn Build>, plan: Plan) -> Result<Box<dyn RunningBuild>>;
}

/// A build handed to the engine.
#[async_trait]
pub trait RunningBuild: Send {
    fn build_id(&self) -> BuildId;

    /// Execute the plan to completion.
    async fn resume(self: Box<Self>);
}
