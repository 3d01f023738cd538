//! Checkpoint-resume control loop
//!
//! Drives an external inference engine in bounded increments. Each
//! increment reads the previous generation and writes the next one into a
//! numbered directory under the work root. After each increment the loop
//! reads the generation's checkpoint record and stops once the engine reports
//! `finished`. Only the newest three generations are kept on disk.
//!
//! The generation promoted to the output directory is the one two steps
//! behind the finishing generation: the two newest may still be partially
//! written when `finished` flips.
//!
//! # States
//! - `Running(step)`: generation `step` is being computed
//! - `Finished(step)`: generation `step` reported `finished`; selection runs once

use std::fs;
use std::path::{Path, PathBuf};

use crate::artifacts::{Generation, GenerationArtifacts};
use crate::checkpoint::Checkpoint;
use crate::config::InferConfig;
use crate::error::{ResumeError, Result};
use crate::profiling::{LoopProfile, Phase};
use crate::retention::{RetentionWindow, DEFAULT_RETENTION};
use crate::runner::{InferenceStepRunner, StepInputs, StepInvocation};
use crate::workspace;

/// Engine config file written into the work root
pub const CONFIG_FILE: &str = "config.pb.gz";

/// Generations between the finishing one and the one promoted
pub const SELECTION_LAG: u64 = 2;

/// Inputs of one checkpoint loop run
#[derive(Debug, Clone)]
pub struct LoopRequest {
    /// Base engine configuration; the time budget is filled in per run
    pub config: InferConfig,
    /// Model generation 0 starts from
    pub initial_model: PathBuf,
    /// Groups generation 0 starts from, if any
    pub initial_groups: Option<PathBuf>,
    /// Shuffled row stream, passed to every step unchanged
    pub rows: PathBuf,
    /// Tare row the rows are sparsified against
    pub tare: PathBuf,
    /// Wall-clock budget for each engine invocation, in seconds
    pub time_budget_per_step: f64,
}

/// Current position of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running(u64),
    Finished(u64),
}

/// The generation promoted as the run's result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedCheckpoint {
    /// Generation that was promoted
    pub step: u64,
    /// Generation whose record reported `finished`
    pub final_step: u64,
    /// Passes completed according to the final record
    pub iteration_count: u64,
    /// Where the generation now lives
    pub path: PathBuf,
}

/// Progress callbacks, one per loop event
pub trait LoopObserver {
    /// About to run generation `step`; `iteration_count` is from the prior record
    fn step_started(&mut self, _step: u64, _iteration_count: u64) {}

    /// Generation `step` reported `finished`
    fn finished(&mut self, _step: u64, _checkpoint: &Checkpoint) {}

    /// The selected generation was moved into place
    fn saved(&mut self, _selected: &SelectedCheckpoint) {}
}

impl<O: LoopObserver + ?Sized> LoopObserver for &mut O {
    fn step_started(&mut self, step: u64, iteration_count: u64) {
        (**self).step_started(step, iteration_count)
    }

    fn finished(&mut self, step: u64, checkpoint: &Checkpoint) {
        (**self).finished(step, checkpoint)
    }

    fn saved(&mut self, selected: &SelectedCheckpoint) {
        (**self).saved(selected)
    }
}

/// Observer that reports nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl LoopObserver for SilentObserver {}

/// Observer that prints one progress line per event to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleObserver;

impl LoopObserver for ConsoleObserver {
    fn step_started(&mut self, step: u64, iteration_count: u64) {
        println!("running checkpoint {}, tardis_iter {}", step, iteration_count);
    }

    fn finished(&mut self, step: u64, checkpoint: &Checkpoint) {
        println!(
            "final checkpoint {}, tardis_iter {}",
            step, checkpoint.iteration_count
        );
    }

    fn saved(&mut self, selected: &SelectedCheckpoint) {
        println!(
            "saving checkpoint {}, tardis_iter {}",
            selected.step, selected.iteration_count
        );
    }
}

/// The checkpoint loop over one work root
pub struct CheckpointLoop<R, O = SilentObserver> {
    runner: R,
    observer: O,
    work_dir: PathBuf,
    window: RetentionWindow,
    profile: LoopProfile,
    state: LoopState,
}

impl<R: InferenceStepRunner> CheckpointLoop<R, SilentObserver> {
    /// Loop that computes generations under `work_dir`
    pub fn new(runner: R, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            observer: SilentObserver,
            work_dir: work_dir.into(),
            window: RetentionWindow::new(DEFAULT_RETENTION),
            profile: LoopProfile::new(),
            state: LoopState::Running(0),
        }
    }
}

impl<R: InferenceStepRunner, O: LoopObserver> CheckpointLoop<R, O> {
    pub fn with_observer<P: LoopObserver>(self, observer: P) -> CheckpointLoop<R, P> {
        CheckpointLoop {
            runner: self.runner,
            observer,
            work_dir: self.work_dir,
            window: self.window,
            profile: self.profile,
            state: self.state,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn profile(&self) -> &LoopProfile {
        &self.profile
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Steps still retained under the work root
    pub fn retained_steps(&self) -> Vec<u64> {
        self.window.steps()
    }

    /// Run generations until the engine finishes, then promote the last full one
    ///
    /// `output_dir` is cleared before the run and receives the selected
    /// generation directory on success.
    ///
    /// # Errors
    /// - `TooFewCheckpoints` if the engine finished before generation 2
    /// - any runner failure, unchanged
    /// - `MalformedCheckpoint` if a record cannot be read back
    pub fn run(&mut self, request: &LoopRequest, output_dir: &Path) -> Result<SelectedCheckpoint> {
        prepare_output(output_dir)?;
        fs::create_dir_all(&self.work_dir).map_err(|e| ResumeError::io(&self.work_dir, e))?;
        tracing::debug!(
            work_dir = %self.work_dir.display(),
            retention = self.window.capacity(),
            "starting checkpoint loop"
        );

        let config_in = self.work_dir.join(CONFIG_FILE);
        let mut config = request.config.clone();
        config.schedule.checkpoint_period_sec = request.time_budget_per_step;
        config.dump(&config_in)?;

        let inputs = StepInputs {
            config_in,
            rows_in: request.rows.clone(),
            tare_in: request.tare.clone(),
        };

        let mut step = 0;
        self.state = LoopState::Running(step);
        self.observer.step_started(step, 0);
        let generation = Generation::under(&self.work_dir, step);
        let invocation = StepInvocation::initial(
            &inputs,
            &request.initial_model,
            request.initial_groups.as_deref(),
            generation.artifacts(),
        );
        let mut checkpoint = self.run_generation(generation, &invocation)?;

        while !checkpoint.finished {
            step += 1;
            self.state = LoopState::Running(step);
            self.observer.step_started(step, checkpoint.iteration_count);

            let prior = GenerationArtifacts::existing(self.work_dir.join((step - 1).to_string()))?;
            let generation = Generation::under(&self.work_dir, step);
            let invocation = StepInvocation::resume(&inputs, &prior, generation.artifacts());
            checkpoint = self.run_generation(generation, &invocation)?;
        }

        self.state = LoopState::Finished(step);
        tracing::info!(step, iteration_count = checkpoint.iteration_count, "inference finished");
        self.observer.finished(step, &checkpoint);

        let selected = self.promote(step, output_dir)?;
        let selected = SelectedCheckpoint {
            step: selected,
            final_step: step,
            iteration_count: checkpoint.iteration_count,
            path: output_dir.to_path_buf(),
        };
        self.observer.saved(&selected);
        Ok(selected)
    }

    /// Run one engine step into `generation`, read its record, retain it
    fn run_generation(
        &mut self,
        generation: Generation,
        invocation: &StepInvocation,
    ) -> Result<Checkpoint> {
        generation.create()?;
        tracing::debug!(step = generation.step, dir = %generation.dir.display(), "running generation");

        let runner = &mut self.runner;
        self.profile
            .measure(Phase::EngineStep, || runner.run_step(invocation))?;
        self.profile.record_step();

        let record_path = generation.artifacts().checkpoint;
        let checkpoint = self
            .profile
            .measure(Phase::CheckpointRead, || Checkpoint::load(&record_path))?;
        tracing::debug!(
            step = generation.step,
            finished = checkpoint.finished,
            iteration_count = checkpoint.iteration_count,
            "read checkpoint"
        );

        let window = &mut self.window;
        self.profile
            .measure(Phase::Retention, || window.push(generation))?;
        Ok(checkpoint)
    }

    /// Move generation `final_step - 2` to `output_dir`
    fn promote(&mut self, final_step: u64, output_dir: &Path) -> Result<u64> {
        let too_few = || ResumeError::TooFewCheckpoints { final_step };
        let selected_step = final_step.checked_sub(SELECTION_LAG).ok_or_else(too_few)?;
        let selected = self
            .window
            .get(selected_step)
            .filter(|g| g.exists())
            .cloned()
            .ok_or_else(too_few)?;
        selected.artifacts().verify_complete()?;

        self.profile.measure(Phase::Promotion, || {
            workspace::move_dir(&selected.dir, output_dir)
        })?;
        self.window.take(selected_step);
        tracing::info!(step = selected_step, dest = %output_dir.display(), "saved checkpoint");
        Ok(selected_step)
    }
}

/// Clear `output_dir` and make sure its parent exists
fn prepare_output(output_dir: &Path) -> Result<()> {
    workspace::remove_if_exists(output_dir)?;
    if let Some(parent) = output_dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ResumeError::io(parent, e))?;
    }
    Ok(())
}

/// Run the checkpoint loop with a silent observer
pub fn run_checkpoint_loop<R: InferenceStepRunner>(
    runner: R,
    request: &LoopRequest,
    work_dir: &Path,
    output_dir: &Path,
) -> Result<SelectedCheckpoint> {
    CheckpointLoop::new(runner, work_dir).run(request, output_dir)
}
