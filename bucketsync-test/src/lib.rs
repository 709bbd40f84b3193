//! Test utilities for the bucketsync crates.
//!
//! See the modules for all available utilities.

pub mod server;
pub mod tracing;
