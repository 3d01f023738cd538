//! infer-resume - checkpoint-resume controller for an external inference engine
//!
//! This library drives a pre-built inference engine in bounded steps, reads
//! back the checkpoint record each step writes, keeps a rolling window of
//! checkpoint generations on disk, and promotes the last full generation once
//! the engine reports that inference has finished.

pub mod artifacts;
pub mod checkpoint;
pub mod cli;
pub mod commands;
pub mod compressed;
pub mod config;
pub mod controller;
pub mod error;
pub mod profiling;
pub mod retention;
pub mod runner;
pub mod store;
pub mod workspace;

pub use controller::{run_checkpoint_loop, CheckpointLoop, LoopRequest, SelectedCheckpoint};
pub use error::{ResumeError, Result};
