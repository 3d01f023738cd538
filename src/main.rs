use anyhow::Result;
use clap::Parser;
use infer_resume::cli::{Cli, Command};
use infer_resume::commands::{self, InferCheckpointArgs, LoadCheckpointArgs, Outcome};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for -v / --debug output
fn init_tracing(verbose: u8, debug: bool) {
    let level = match (verbose, debug) {
        (0, false) => return,
        (0, true) | (1, _) => tracing::Level::INFO,
        (2, _) => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    init_tracing(args.verbose, args.debug());

    let outcome = match &args.command {
        Command::Profilers => commands::profilers(),
        Command::LoadCheckpoint {
            name,
            period_sec,
            debug,
        } => {
            let settings = commands::resolve_settings(args.config.as_deref(), args.store.as_deref())?;
            commands::load_checkpoint(
                &settings,
                &LoadCheckpointArgs {
                    name: name.as_deref(),
                    period_sec: *period_sec,
                    debug: *debug,
                    profile_self: args.profile_self,
                },
            )?
        }
        Command::InferCheckpoint {
            name,
            period_sec,
            parallel,
            debug,
            profile,
        } => {
            let settings = commands::resolve_settings(args.config.as_deref(), args.store.as_deref())?;
            commands::infer_checkpoint(
                &settings,
                &InferCheckpointArgs {
                    name: name.as_deref(),
                    period_sec: *period_sec,
                    parallel: *parallel,
                    debug: *debug,
                    profile: *profile,
                    profile_self: args.profile_self,
                },
            )?
        }
    };

    Ok(match outcome {
        Outcome::Done => ExitCode::SUCCESS,
        Outcome::ListedOptions => ExitCode::FAILURE,
    })
}
