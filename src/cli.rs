//! CLI argument parsing for infer-resume

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::runner::Profiler;

#[derive(Parser, Debug)]
#[command(name = "infer-resume")]
#[command(version)]
#[command(about = "Run an inference engine in bounded steps and keep the last full checkpoint", long_about = None)]
pub struct Cli {
    /// Tool configuration file (TOML)
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Dataset store root (overrides the configuration file)
    #[arg(long = "store", value_name = "DIR", global = true)]
    pub store: Option<PathBuf>,

    /// Print where the checkpoint loop spent its time
    #[arg(long = "profile-self", global = true)]
    pub profile_self: bool,

    /// Tracing output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Grab last full checkpoint for profiling, or list available datasets
    LoadCheckpoint {
        /// Dataset name; omit to list datasets ready for inference
        name: Option<String>,

        /// Wall-clock budget per engine step, in seconds
        #[arg(long = "period-sec", value_name = "SECONDS", default_value = "5")]
        period_sec: f64,

        /// Use the debug engine build and keep the workspace on failure
        #[arg(long)]
        debug: bool,
    },

    /// Run inference from the saved checkpoint, or list available datasets
    InferCheckpoint {
        /// Dataset name; omit to list datasets ready for inference
        name: Option<String>,

        /// Wall-clock budget for the engine, in seconds (0 runs to completion)
        #[arg(long = "period-sec", value_name = "SECONDS", default_value = "0")]
        period_sec: f64,

        /// Run engine kernels in parallel
        #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
        parallel: bool,

        /// Use the debug engine build
        #[arg(long)]
        debug: bool,

        /// Profiler wrapping the engine process
        #[arg(long, value_enum, default_value = "time")]
        profile: Profiler,
    },

    /// List profilers available for wrapping the engine
    Profilers,
}

impl Cli {
    /// True if any subcommand asked for the debug engine build
    pub fn debug(&self) -> bool {
        match &self.command {
            Command::LoadCheckpoint { debug, .. } | Command::InferCheckpoint { debug, .. } => *debug,
            Command::Profilers => false,
        }
    }
}
