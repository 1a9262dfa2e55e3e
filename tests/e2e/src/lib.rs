//! End-to-end test support for brain-core
//!
//! - [`harness`]: isolated, temp-directory-backed `BrainContext`/`Store` instances.
//! - [`mocks`]: test data generation for memories, projects, and sessions.

pub mod harness;
pub mod mocks;
