//! Shared test utilities for montage integration tests.
//!
//! This module provides:
//! - `TestHarness`, an orchestrator over a temp data directory
//! - deterministic stand-ins for the segmenter, captioner and assembler

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
