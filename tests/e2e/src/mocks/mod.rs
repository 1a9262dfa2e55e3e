//! Test data generation
//!
//! - [`fixtures`]: a factory for realistic memories, projects, and batches.

pub mod fixtures;
