//! Wall-clock accounting for the checkpoint loop
//!
//! Tracks where a `load-checkpoint` run spends its time: waiting on engine
//! steps, reading checkpoint records back, evicting old generations, and the
//! final promotion. Printed with `--profile-self`.

use std::time::{Duration, Instant};

/// Phases of the checkpoint loop that can be timed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Blocking on one bounded engine invocation
    EngineStep,
    /// Decoding a checkpoint record
    CheckpointRead,
    /// Deleting generations that left the retention window
    Retention,
    /// Moving the selected generation into place
    Promotion,
}

/// Per-phase timings for one loop run
#[derive(Debug, Default)]
pub struct LoopProfile {
    /// Engine invocations completed
    step_count: u64,
    engine_time: Duration,
    checkpoint_time: Duration,
    retention_time: Duration,
    promotion_time: Duration,
    start_time: Option<Instant>,
}

impl LoopProfile {
    /// Start the wall clock
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Record that an engine step completed
    pub fn record_step(&mut self) {
        self.step_count += 1;
    }

    /// Time `f` and charge it to `phase`
    ///
    /// # Example
    /// ```
    /// use infer_resume::profiling::{LoopProfile, Phase};
    ///
    /// let mut profile = LoopProfile::new();
    /// let value = profile.measure(Phase::CheckpointRead, || 7);
    /// assert_eq!(value, 7);
    /// ```
    pub fn measure<F, R>(&mut self, phase: Phase, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.record_time(phase, start.elapsed());
        result
    }

    pub fn record_time(&mut self, phase: Phase, duration: Duration) {
        match phase {
            Phase::EngineStep => self.engine_time += duration,
            Phase::CheckpointRead => self.checkpoint_time += duration,
            Phase::Retention => self.retention_time += duration,
            Phase::Promotion => self.promotion_time += duration,
        }
    }

    pub fn wall_time(&self) -> Duration {
        self.start_time
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn time_in_phase(&self, phase: Phase) -> Duration {
        match phase {
            Phase::EngineStep => self.engine_time,
            Phase::CheckpointRead => self.checkpoint_time,
            Phase::Retention => self.retention_time,
            Phase::Promotion => self.promotion_time,
        }
    }

    /// Time spent in the controller itself, engine excluded
    pub fn overhead_time(&self) -> Duration {
        self.checkpoint_time + self.retention_time + self.promotion_time
    }

    /// Print the summary to stderr
    pub fn print_summary(&self) {
        let wall = self.wall_time();
        let engine = self.engine_time;

        eprintln!("\n╔════════════════════════════════════════════════════════════╗");
        eprintln!("║  Checkpoint Loop Profile                                   ║");
        eprintln!("╚════════════════════════════════════════════════════════════╝");
        eprintln!();
        eprintln!("Engine steps run:          {}", self.step_count);
        eprintln!("Total wall time:           {:.3}s", wall.as_secs_f64());
        eprintln!(
            "  - Engine time:           {:.3}s ({:.1}%)",
            engine.as_secs_f64(),
            percent(engine, wall)
        );
        if self.step_count > 0 {
            eprintln!(
                "  - Mean per step:         {:.3}s",
                engine.as_secs_f64() / self.step_count as f64
            );
        }
        eprintln!();
        eprintln!("Controller breakdown:");
        let overhead = self.overhead_time();
        print_phase("Checkpoint reads", self.checkpoint_time, overhead);
        print_phase("Retention", self.retention_time, overhead);
        print_phase("Promotion", self.promotion_time, overhead);
        eprintln!();
    }
}

fn percent(part: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        0.0
    } else {
        part.as_secs_f64() / total.as_secs_f64() * 100.0
    }
}

fn print_phase(name: &str, time: Duration, total: Duration) {
    if time > Duration::ZERO {
        eprintln!(
            "  - {:20} {:.3}s ({:.1}%)",
            format!("{}:", name),
            time.as_secs_f64(),
            percent(time, total)
        );
    }
}
