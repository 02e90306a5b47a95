//! Shared helpers for the pushsync benchmarks.

pub mod utils;
