//! Core domain model for bhasha.
//!
//! This crate defines the track and language model, the threshold policy
//! that routes a track-language pair to a playlist or to manual review, and
//! the SQLite-backed classification state store that makes the pipeline
//! resumable.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod schema;

pub use error::{Error, Result};
