//! critic-core — the panel engine.
//!
//! This crate defines the rubric catalog, persona prompt rendering, model
//! response extraction, and the fan-out/fan-in engine that runs one
//! evaluation per persona and merges the votes.

pub mod engine;
pub mod error;
pub mod extract;
pub mod model;
pub mod parser;
pub mod prompt;
pub mod report;
pub mod task;
pub mod traits;
pub mod votes;
