//! # pushsync testkit
//!
//! Test utilities for pushsync.
//!
//! This crate provides:
//! - Scripted API fixtures: token, error and patch responses, and clients
//!   wired to a [`MockTransport`](pushsync_client::MockTransport)
//! - Property-based generators for JSON objects and diffs
//! - Signature test vectors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pushsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn patch_goes_out() {
//!     let client = scripted_client();
//!     // ... drive the client
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
pub use vectors::*;
