//! Classification pipeline for bhasha.
//!
//! Adapters for Spotify, Genius and the language scorer, the CSV
//! reports, and the resumable pipeline that ties them to the state store.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod adapters;
pub mod config;
pub mod error;
pub mod genius;
pub mod pipeline;
pub mod report;
pub mod resilience;
pub mod scorer;
pub mod spotify;

pub use config::Config;
pub use error::{AdapterError, AdapterResult, PipelineError, PipelineResult};
pub use pipeline::{Adapters, Pipeline, PipelineSettings, RunFailure, RunOptions, RunSummary};
pub use report::Reports;
