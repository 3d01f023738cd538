//! Bounded inference steps
//!
//! The loop never runs inference itself. It asks an [`InferenceStepRunner`]
//! to run one bounded step from a prior generation into a new one. The
//! production runner spawns the engine binary; tests inject fakes.

use clap::ValueEnum;
use std::ffi::OsString;
use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use crate::artifacts::GenerationArtifacts;
use crate::config::EngineConfig;
use crate::error::{ResumeError, Result};

/// Placeholder the engine reads as "no such input"
pub const NONE_ARG: &str = "--none";

/// Inputs shared by every step of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInputs {
    pub config_in: PathBuf,
    pub rows_in: PathBuf,
    pub tare_in: PathBuf,
}

/// Everything one engine invocation reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInvocation {
    pub config_in: PathBuf,
    pub rows_in: PathBuf,
    pub tare_in: PathBuf,
    pub model_in: PathBuf,
    pub groups_in: Option<PathBuf>,
    pub assign_in: Option<PathBuf>,
    pub checkpoint_in: Option<PathBuf>,
    /// Generation to write; `None` passes `--none` for every output
    pub output: Option<GenerationArtifacts>,
    pub log_out: Option<PathBuf>,
}

impl StepInvocation {
    /// First step: start from an initial model, optionally with initial groups
    pub fn initial(
        inputs: &StepInputs,
        model_in: &Path,
        groups_in: Option<&Path>,
        output: GenerationArtifacts,
    ) -> Self {
        Self {
            config_in: inputs.config_in.clone(),
            rows_in: inputs.rows_in.clone(),
            tare_in: inputs.tare_in.clone(),
            model_in: model_in.to_path_buf(),
            groups_in: groups_in.map(Path::to_path_buf),
            assign_in: None,
            checkpoint_in: None,
            output: Some(output),
            log_out: None,
        }
    }

    /// Resume from every artifact of a prior generation
    pub fn resume(
        inputs: &StepInputs,
        prior: &GenerationArtifacts,
        output: GenerationArtifacts,
    ) -> Self {
        Self {
            output: Some(output),
            ..Self::resume_without_outputs(inputs, prior)
        }
    }

    /// Resume from a prior generation without writing a new one
    ///
    /// Used to run inference to completion from a saved checkpoint, where
    /// only the log is of interest.
    pub fn resume_without_outputs(inputs: &StepInputs, prior: &GenerationArtifacts) -> Self {
        Self {
            config_in: inputs.config_in.clone(),
            rows_in: inputs.rows_in.clone(),
            tare_in: inputs.tare_in.clone(),
            model_in: prior.model.clone(),
            groups_in: Some(prior.groups.clone()),
            assign_in: Some(prior.assign.clone()),
            checkpoint_in: Some(prior.checkpoint.clone()),
            output: None,
            log_out: None,
        }
    }

    pub fn with_log(mut self, log_out: impl Into<PathBuf>) -> Self {
        self.log_out = Some(log_out.into());
        self
    }

    /// Inputs that must exist before the engine starts
    pub fn required_inputs(&self) -> Vec<&Path> {
        let mut inputs = vec![
            self.config_in.as_path(),
            self.rows_in.as_path(),
            self.tare_in.as_path(),
            self.model_in.as_path(),
        ];
        inputs.extend(
            [&self.groups_in, &self.assign_in, &self.checkpoint_in]
                .into_iter()
                .flatten()
                .map(PathBuf::as_path),
        );
        inputs
    }

    /// Positional engine arguments, absent inputs and outputs as `--none`
    pub fn to_args(&self) -> Vec<OsString> {
        fn opt(path: Option<&PathBuf>) -> OsString {
            path.map(|p| p.as_os_str().to_os_string())
                .unwrap_or_else(|| OsString::from(NONE_ARG))
        }

        let output = self.output.as_ref();
        vec![
            self.config_in.clone().into_os_string(),
            self.rows_in.clone().into_os_string(),
            self.tare_in.clone().into_os_string(),
            self.model_in.clone().into_os_string(),
            opt(self.groups_in.as_ref()),
            opt(self.assign_in.as_ref()),
            opt(self.checkpoint_in.as_ref()),
            opt(output.map(|o| &o.model)),
            opt(output.map(|o| &o.groups)),
            opt(output.map(|o| &o.assign)),
            opt(output.map(|o| &o.checkpoint)),
            opt(self.log_out.as_ref()),
        ]
    }
}

/// Runs one bounded inference step
pub trait InferenceStepRunner {
    /// Run the step to completion or to the engine's time budget
    ///
    /// On success every artifact of `step.output`, if any, has been written.
    fn run_step(&mut self, step: &StepInvocation) -> Result<()>;
}

impl<R: InferenceStepRunner + ?Sized> InferenceStepRunner for &mut R {
    fn run_step(&mut self, step: &StepInvocation) -> Result<()> {
        (**self).run_step(step)
    }
}

/// Command prefixes for profiling an engine run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Profiler {
    /// Run the engine directly
    #[default]
    None,
    /// Resource usage via /usr/bin/time
    Time,
    /// Memcheck with leak checking
    Valgrind,
    /// Cache simulation
    Cachegrind,
    /// Call-graph profiling
    Callgrind,
    /// Thread error detection
    Helgrind,
}

impl Profiler {
    /// Every profiler, in listing order
    pub const ALL: [Profiler; 6] = [
        Profiler::None,
        Profiler::Time,
        Profiler::Valgrind,
        Profiler::Cachegrind,
        Profiler::Callgrind,
        Profiler::Helgrind,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Profiler::None => "none",
            Profiler::Time => "time",
            Profiler::Valgrind => "valgrind",
            Profiler::Cachegrind => "cachegrind",
            Profiler::Callgrind => "callgrind",
            Profiler::Helgrind => "helgrind",
        }
    }

    /// Command words placed before the engine binary
    pub fn prefix(&self) -> &'static [&'static str] {
        match self {
            Profiler::None => &[],
            Profiler::Time => &["/usr/bin/time", "--verbose"],
            Profiler::Valgrind => &["valgrind", "--leak-check=full", "--track-origins=yes"],
            Profiler::Cachegrind => &["valgrind", "--tool=cachegrind"],
            Profiler::Callgrind => &[
                "valgrind",
                "--tool=callgrind",
                "--callgrind-out-file=callgrind.out",
            ],
            Profiler::Helgrind => &["valgrind", "--tool=helgrind", "--read-var-info=yes"],
        }
    }
}

/// Runs each step by spawning the engine binary
#[derive(Debug, Clone)]
pub struct EngineRunner {
    engine: EngineConfig,
    debug: bool,
    profiler: Profiler,
    invocations: u64,
}

impl EngineRunner {
    pub fn new(engine: EngineConfig, debug: bool) -> Self {
        Self {
            engine,
            debug,
            profiler: Profiler::None,
            invocations: 0,
        }
    }

    pub fn with_profiler(mut self, profiler: Profiler) -> Self {
        self.profiler = profiler;
        self
    }

    /// Engine binary for this runner's build flavour
    pub fn binary(&self) -> &Path {
        self.engine.binary(self.debug)
    }

    /// Number of engine processes started so far
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Full command line for a step, profiler prefix included
    pub fn command_line(&self, step: &StepInvocation) -> Vec<OsString> {
        let mut argv: Vec<OsString> = self.profiler.prefix().iter().map(OsString::from).collect();
        argv.push(self.binary().as_os_str().to_os_string());
        argv.extend(step.to_args());
        argv
    }
}

impl InferenceStepRunner for EngineRunner {
    fn run_step(&mut self, step: &StepInvocation) -> Result<()> {
        for input in step.required_inputs() {
            if !input.exists() {
                return Err(ResumeError::precondition(format!(
                    "missing engine input {}",
                    input.display()
                )));
            }
        }
        if let Some(output) = &step.output {
            fs::create_dir_all(&output.groups).map_err(|e| ResumeError::io(&output.groups, e))?;
        }

        let argv = self.command_line(step);
        let engine = self.binary().display().to_string();
        tracing::debug!(?argv, "spawning inference engine");

        let status = Command::new(&argv[0])
            .args(&argv[1..])
            .status()
            .map_err(|source| ResumeError::EngineSpawn {
                engine: engine.clone(),
                source,
            })?;
        self.invocations += 1;

        if status.success() {
            tracing::trace!(%engine, "engine step completed");
            Ok(())
        } else {
            Err(ResumeError::EngineFailed {
                engine,
                status: describe_status(status),
            })
        }
    }
}

/// Human-readable exit status, naming the signal if one killed the process
pub fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status {}", code);
    }
    match status.signal() {
        Some(raw) => match nix::sys::signal::Signal::try_from(raw) {
            Ok(signal) => format!("killed by {}", signal.as_str()),
            Err(_) => format!("killed by signal {}", raw),
        },
        None => status.to_string(),
    }
}
