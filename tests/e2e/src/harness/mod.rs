//! Test harness
//!
//! - [`db_manager`]: isolated `Store`/`BrainContext` instances for each test.

pub mod db_manager;
