//! Core pipeline orchestration for paperfilter.
//!
//! This crate ties the feed, the relevance scorer, the artifact fetcher and
//! the snapshot store into one run (see [`Pipeline::run`]).

pub mod pipeline;

pub use pipeline::{ItemOutcome, Pipeline, PipelineConfig, ProgressReporter, RunReport, SilentProgress};
