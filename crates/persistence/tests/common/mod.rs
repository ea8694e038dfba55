//! Test infrastructure for the persistence layer.
//!
//! This module provides dataset fixtures, store builders and recording
//! fakes shared by the integration tests.

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;

// Re-export commonly used items
pub use assertions::*;
pub use fixtures::*;
