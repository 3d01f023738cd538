//! Checkpoint loop scenarios against a fake inference engine
//!
//! The fake writes a complete generation on every call and reports
//! `finished` from a chosen generation on, so the loop's selection and
//! retention behaviour can be checked without the real engine.

use infer_resume::artifacts::GenerationArtifacts;
use infer_resume::checkpoint::Checkpoint;
use infer_resume::config::InferConfig;
use infer_resume::controller::{CheckpointLoop, LoopObserver, LoopState, SelectedCheckpoint};
use infer_resume::error::ResumeError;
use infer_resume::runner::{InferenceStepRunner, StepInvocation};
use infer_resume::LoopRequest;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Generation directories (numeric names) currently under `work`
fn generation_dirs(work: &Path) -> Vec<u64> {
    let mut steps: Vec<u64> = fs::read_dir(work)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().to_str().and_then(|s| s.parse().ok()))
                .collect()
        })
        .unwrap_or_default();
    steps.sort_unstable();
    steps
}

fn write_generation(out: &GenerationArtifacts, checkpoint: &Checkpoint) {
    fs::create_dir_all(&out.groups).unwrap();
    fs::write(out.groups.join("mixture.000.pbs.gz"), b"groups").unwrap();
    fs::write(&out.model, b"model").unwrap();
    fs::write(&out.assign, b"assign").unwrap();
    checkpoint.save(&out.checkpoint).unwrap();
}

/// Fake engine: finished from generation `finish_at`, optional failure
struct FakeEngine {
    work: PathBuf,
    finish_at: u64,
    fail_at: Option<u64>,
    outputs: Vec<PathBuf>,
    max_dirs_seen: usize,
}

impl FakeEngine {
    fn new(work: &Path, finish_at: u64) -> Self {
        Self {
            work: work.to_path_buf(),
            finish_at,
            fail_at: None,
            outputs: Vec::new(),
            max_dirs_seen: 0,
        }
    }

    fn failing_at(mut self, step: u64) -> Self {
        self.fail_at = Some(step);
        self
    }
}

impl InferenceStepRunner for FakeEngine {
    fn run_step(&mut self, step: &StepInvocation) -> infer_resume::Result<()> {
        let index = self.outputs.len() as u64;
        let output = step.output.as_ref().unwrap();
        self.outputs.push(output.model.parent().unwrap().to_path_buf());
        self.max_dirs_seen = self.max_dirs_seen.max(generation_dirs(&self.work).len());

        if self.fail_at == Some(index) {
            return Err(ResumeError::EngineFailed {
                engine: "fake".to_string(),
                status: "exit status 1".to_string(),
            });
        }
        let checkpoint = Checkpoint::new(index >= self.finish_at, index + 1);
        write_generation(output, &checkpoint);
        Ok(())
    }
}

/// Records what was on disk when the loop reported `finished`
#[derive(Default)]
struct DiskObserver {
    work: PathBuf,
    started: Vec<(u64, u64)>,
    on_disk_at_finish: Vec<u64>,
    saved: Option<SelectedCheckpoint>,
}

impl LoopObserver for DiskObserver {
    fn step_started(&mut self, step: u64, iteration_count: u64) {
        self.started.push((step, iteration_count));
    }

    fn finished(&mut self, _step: u64, _checkpoint: &Checkpoint) {
        self.on_disk_at_finish = generation_dirs(&self.work);
    }

    fn saved(&mut self, selected: &SelectedCheckpoint) {
        self.saved = Some(selected.clone());
    }
}

fn request(root: &Path) -> LoopRequest {
    let data = root.join("data");
    fs::create_dir_all(&data).unwrap();
    for name in ["init.pb.gz", "shuffled.pbs.gz", "tare.pbs.gz"] {
        fs::write(data.join(name), b"x").unwrap();
    }
    LoopRequest {
        config: InferConfig::default(),
        initial_model: data.join("init.pb.gz"),
        initial_groups: None,
        rows: data.join("shuffled.pbs.gz"),
        tare: data.join("tare.pbs.gz"),
        time_budget_per_step: 5.0,
    }
}

#[test]
fn test_finish_at_four_selects_two() {
    let root = TempDir::new().unwrap();
    let work = root.path().join("work");
    let output = root.path().join("checkpoints");

    let mut observer = DiskObserver {
        work: work.clone(),
        ..Default::default()
    };
    let mut controller =
        CheckpointLoop::new(FakeEngine::new(&work, 4), &work).with_observer(&mut observer);
    let selected = controller.run(&request(root.path()), &output).unwrap();

    assert_eq!(selected.step, 2);
    assert_eq!(selected.final_step, 4);
    assert_eq!(selected.path, output);
    assert_eq!(controller.state(), LoopState::Finished(4));
    assert_eq!(controller.retained_steps(), vec![3, 4]);
    drop(controller);

    assert_eq!(observer.on_disk_at_finish, vec![2, 3, 4]);
    assert_eq!(generation_dirs(&work), vec![3, 4]);
    assert!(output.join("model.pb.gz").is_file());
}

#[test]
fn test_progress_reports_prior_iteration_count() {
    let root = TempDir::new().unwrap();
    let work = root.path().join("work");
    let output = root.path().join("checkpoints");

    let mut observer = DiskObserver {
        work: work.clone(),
        ..Default::default()
    };
    {
        let mut controller = CheckpointLoop::new(FakeEngine::new(&work, 3), &work)
            .with_observer(&mut observer);
        controller.run(&request(root.path()), &output).unwrap();
    }

    assert_eq!(observer.started, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    assert_eq!(observer.on_disk_at_finish, vec![1, 2, 3]);
    let saved = observer.saved.expect("saved event");
    assert_eq!(saved.step, 1);
    assert_eq!(saved.iteration_count, 4);
}

#[test]
fn test_never_more_than_four_generations_on_disk() {
    let root = TempDir::new().unwrap();
    let work = root.path().join("work");
    let output = root.path().join("checkpoints");

    let mut controller = CheckpointLoop::new(FakeEngine::new(&work, 12), &work);
    controller.run(&request(root.path()), &output).unwrap();

    assert!(controller.runner().max_dirs_seen <= 4);
    assert_eq!(controller.runner().max_dirs_seen, 4);
}

#[test]
fn test_generations_strictly_increasing_without_gaps() {
    let root = TempDir::new().unwrap();
    let work = root.path().join("work");
    let output = root.path().join("checkpoints");

    let mut controller = CheckpointLoop::new(FakeEngine::new(&work, 6), &work);
    controller.run(&request(root.path()), &output).unwrap();

    let expected: Vec<PathBuf> = (0..=6).map(|step| work.join(step.to_string())).collect();
    assert_eq!(controller.runner().outputs, expected);
}

#[test]
fn test_selected_output_is_complete() {
    let root = TempDir::new().unwrap();
    let work = root.path().join("work");
    let output = root.path().join("store").join("ds").join("checkpoints");

    let mut controller = CheckpointLoop::new(FakeEngine::new(&work, 5), &work);
    controller.run(&request(root.path()), &output).unwrap();

    let mut entries: Vec<String> = fs::read_dir(&output)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(
        entries,
        vec!["assign.pbs.gz", "checkpoint.pb.gz", "groups", "model.pb.gz"]
    );
    GenerationArtifacts::in_dir(&output).verify_complete().unwrap();

    let record = Checkpoint::load(output.join("checkpoint.pb.gz")).unwrap();
    assert!(!record.finished);
    assert_eq!(record.iteration_count, 4);
}

#[test]
fn test_finish_immediately_is_too_few_checkpoints() {
    let root = TempDir::new().unwrap();
    let work = root.path().join("work");
    let output = root.path().join("checkpoints");

    let mut controller = CheckpointLoop::new(FakeEngine::new(&work, 0), &work);
    let err = controller.run(&request(root.path()), &output).unwrap_err();

    assert!(matches!(err, ResumeError::TooFewCheckpoints { final_step: 0 }));
    assert!(err.to_string().contains("too few checkpoints"));
    assert!(!output.exists());
    assert_eq!(controller.runner().outputs.len(), 1);
}

#[test]
fn test_finish_at_two_is_enough() {
    let root = TempDir::new().unwrap();
    let work = root.path().join("work");
    let output = root.path().join("checkpoints");

    let mut controller = CheckpointLoop::new(FakeEngine::new(&work, 2), &work);
    let selected = controller.run(&request(root.path()), &output).unwrap();
    assert_eq!(selected.step, 0);
}

#[test]
fn test_engine_failure_at_two_aborts() {
    let root = TempDir::new().unwrap();
    let work = root.path().join("work");
    let output = root.path().join("checkpoints");

    let engine = FakeEngine::new(&work, 10).failing_at(2);
    let mut controller = CheckpointLoop::new(engine, &work);
    let err = controller.run(&request(root.path()), &output).unwrap_err();

    match err {
        ResumeError::EngineFailed { status, .. } => assert_eq!(status, "exit status 1"),
        other => panic!("Expected EngineFailed, got {:?}", other),
    }
    assert!(work.join("0").join("checkpoint.pb.gz").is_file());
    assert!(work.join("1").join("checkpoint.pb.gz").is_file());
    assert!(!work.join("2").join("checkpoint.pb.gz").exists());
    assert!(!output.exists());
    assert_eq!(controller.state(), LoopState::Running(2));
    assert_eq!(controller.runner().outputs.len(), 3);
}

#[test]
fn test_malformed_record_stops_loop() {
    struct GarbageEngine;

    impl InferenceStepRunner for GarbageEngine {
        fn run_step(&mut self, step: &StepInvocation) -> infer_resume::Result<()> {
            fs::write(&step.output.as_ref().unwrap().checkpoint, b"not a record").unwrap();
            Ok(())
        }
    }

    let root = TempDir::new().unwrap();
    let work = root.path().join("work");
    let output = root.path().join("checkpoints");

    let mut controller = CheckpointLoop::new(GarbageEngine, &work);
    let err = controller.run(&request(root.path()), &output).unwrap_err();
    match err {
        ResumeError::MalformedCheckpoint { path, .. } => {
            assert_eq!(path, work.join("0").join("checkpoint.pb.gz"));
        }
        other => panic!("Expected MalformedCheckpoint, got {:?}", other),
    }
}
