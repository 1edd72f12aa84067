//! Storage layer for the Tempo build scheduler.
//!
//! Provides an in-memory implementation of the `tempo-core` storage traits,
//! shared by tests and single-process embeddings.

pub mod error;
pub mod store;

pub use error::{DbError, DbResult};
pub use store::*;
