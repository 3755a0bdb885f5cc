//! Seqflow Orchestrator
//!
//! Coordinates the per-sample stage pipeline on top of a `TaskRunner` and
//! two artifact stores.
//!
//! Architecture:
//! - `cache`: decides from existing outputs whether a stage must run
//! - `transfer`: read downloads with size verification, result uploads
//! - `join`: concurrent bounded polling over outstanding stage handles
//! - `Orchestrator`: the per-sample state machine
//! - `dispatcher`: groups a listing into samples and runs them in parallel

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod join;
mod pipeline;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use dispatcher::{DispatchOptions, Plan, dispatch};
pub use join::{JoinReport, JoinTiming, Resolution, join_handles};
pub use pipeline::Orchestrator;
pub use transfer::{Transfers, UploadSummary};
