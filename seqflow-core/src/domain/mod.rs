//! Core domain types
//!
//! This module contains the domain structures shared across seqflow crates.
//! The store, runner and orchestrator all speak in these types.

pub mod artifact;
pub mod outcome;
pub mod sample;
pub mod stage;
