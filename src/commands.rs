//! Command implementations behind the CLI

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::artifacts::GenerationArtifacts;
use crate::config::{InferConfig, ToolConfig};
use crate::controller::{CheckpointLoop, ConsoleObserver, LoopRequest};
use crate::error::{require_exists, ResumeError};
use crate::profiling::{LoopProfile, Phase};
use crate::runner::{EngineRunner, InferenceStepRunner, Profiler, StepInputs, StepInvocation};
use crate::store::{Requirement, Store};
use crate::workspace::Workspace;

/// How a command ended, for the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The command did its work
    Done,
    /// No dataset was named; the candidates were listed instead
    ListedOptions,
}

/// Print datasets providing `requirements`
pub fn list_options(store: &Store, requirements: &[Requirement]) -> Result<Outcome> {
    println!("try one of:");
    for name in store.list_datasets(requirements)? {
        println!("  {}", name);
    }
    Ok(Outcome::ListedOptions)
}

/// Options for `load-checkpoint`
#[derive(Debug, Clone)]
pub struct LoadCheckpointArgs<'a> {
    pub name: Option<&'a str>,
    pub period_sec: f64,
    pub debug: bool,
    pub profile_self: bool,
}

/// Run the checkpoint loop for a dataset and save its last full checkpoint
pub fn load_checkpoint(settings: &ToolConfig, args: &LoadCheckpointArgs<'_>) -> Result<Outcome> {
    let store = Store::new(&settings.store);
    let Some(name) = args.name else {
        return list_options(&store, &[Requirement::Init, Requirement::Shuffled]);
    };

    if !(args.period_sec.is_finite() && args.period_sec > 0.0) {
        anyhow::bail!(
            "Invalid value for --period-sec: {} (must be > 0)",
            args.period_sec
        );
    }

    let dataset = store.dataset(name);
    require_exists(&dataset.init, "First init")?;
    require_exists(&dataset.shuffled, "First shuffle")?;

    let destin = store.checkpoints(name);
    let request = LoopRequest {
        config: InferConfig::default(),
        initial_model: dataset.init,
        initial_groups: None,
        rows: dataset.shuffled,
        tare: dataset.tare,
        time_budget_per_step: args.period_sec,
    };
    let runner = EngineRunner::new(settings.engine.clone(), args.debug);
    let work_parent = store.root().join(name);

    tracing::info!(dataset = name, period_sec = args.period_sec, "loading checkpoint");
    let selected = Workspace::scoped(&work_parent, !args.debug, |work| {
        let mut controller = CheckpointLoop::new(runner, work).with_observer(ConsoleObserver);
        let result = controller.run(&request, &destin);
        if args.profile_self {
            controller.profile().print_summary();
        }
        Ok(result?)
    })?;

    println!(
        "saved generation {} of {} (tardis_iter {}) to {}",
        selected.step,
        selected.final_step,
        selected.iteration_count,
        selected.path.display()
    );
    Ok(Outcome::Done)
}

/// Options for `infer-checkpoint`
#[derive(Debug, Clone)]
pub struct InferCheckpointArgs<'a> {
    pub name: Option<&'a str>,
    pub period_sec: f64,
    pub parallel: bool,
    pub debug: bool,
    pub profile: Profiler,
    pub profile_self: bool,
}

/// Run the engine once, resuming from the saved checkpoint
pub fn infer_checkpoint(settings: &ToolConfig, args: &InferCheckpointArgs<'_>) -> Result<Outcome> {
    let store = Store::new(&settings.store);
    let Some(name) = args.name else {
        return list_options(
            &store,
            &[Requirement::Init, Requirement::Shuffled, Requirement::Checkpoints],
        );
    };

    if !(args.period_sec.is_finite() && args.period_sec >= 0.0) {
        anyhow::bail!(
            "Invalid value for --period-sec: {} (must be >= 0)",
            args.period_sec
        );
    }

    let dataset = store.dataset(name);
    require_exists(&dataset.init, "First init")?;
    require_exists(&dataset.shuffled, "First shuffle")?;
    let checkpoint = store.checkpoints(name);
    require_exists(&checkpoint, "First load checkpoint")?;
    let prior = GenerationArtifacts::existing(&checkpoint)?;

    let results = store.infer_checkpoint(name);
    fs::create_dir_all(&results.root)
        .with_context(|| format!("Failed to create {}", results.root.display()))?;

    let mut config = InferConfig::with_period(args.period_sec);
    if !args.parallel {
        config = config.sequential();
    }
    config.dump(&results.config)?;

    let inputs = StepInputs {
        config_in: results.config.clone(),
        rows_in: dataset.shuffled,
        tare_in: dataset.tare,
    };
    let invocation = StepInvocation::resume_without_outputs(&inputs, &prior).with_log(&results.log);

    let mut runner =
        EngineRunner::new(settings.engine.clone(), args.debug).with_profiler(args.profile);
    let mut profile = LoopProfile::new();
    tracing::info!(dataset = name, profiler = args.profile.name(), "inferring from checkpoint");
    profile.measure(Phase::EngineStep, || runner.run_step(&invocation))?;
    profile.record_step();
    if args.profile_self {
        profile.print_summary();
    }

    println!("inference results in {}", results.root.display());
    Ok(Outcome::Done)
}

/// Print the profilers `--profile` accepts
pub fn profilers() -> Outcome {
    println!("available profilers:");
    for profiler in Profiler::ALL {
        let prefix = profiler.prefix().join(" ");
        if prefix.is_empty() {
            println!("  {:12} (run the engine directly)", profiler.name());
        } else {
            println!("  {:12} {}", profiler.name(), prefix);
        }
    }
    Outcome::Done
}

/// Settings from an optional TOML file, env overrides, and `--store`
pub fn resolve_settings(config: Option<&Path>, store: Option<&Path>) -> Result<ToolConfig> {
    let mut settings = ToolConfig::resolve(config).map_err(|e| match e {
        ResumeError::Io { path, source } => {
            anyhow::anyhow!("Failed to read configuration {}: {}", path.display(), source)
        }
        other => other.into(),
    })?;
    if let Some(store) = store {
        settings.store = store.to_path_buf();
    }
    tracing::debug!(store = %settings.store.display(), engine = %settings.engine.release.display(), "resolved settings");
    Ok(settings)
}
