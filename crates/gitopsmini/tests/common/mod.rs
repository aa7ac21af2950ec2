//! Shared test utilities for gitopsmini integration tests.
//!
//! - `SyncHarness` wires an engine to an in-memory database, an in-memory
//!   cluster and a scripted manifest source
//! - Builders for manifests and applications

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
