//! Common test infrastructure shared across integration tests.
//!
//! This module provides:
//! - `scripted`: A deterministic in-memory `NetworkApi` backend
//! - `test_utils`: Shared constants and helpers
//!
//! # Usage
//!
//! From any integration test file:
//! ```ignore
//! mod common;
//! use common::scripted::{ScriptedNet, SCRIPTED_PEER};
//! use common::test_utils::{init_test_tracing, test_addr};
//! // Or use the re-exported items:
//! use common::{test_addr, ScriptedNet};
//! ```

pub mod scripted;
pub mod test_utils;

// Re-export commonly used items for convenience.
// These are public utilities for integration tests - allow unused until tests adopt them.
#[allow(unused_imports)]
pub use scripted::{ScriptedNet, SCRIPTED_PEER};

#[allow(unused_imports)]
pub use test_utils::{init_test_tracing, test_addr};
