//! Bounded window of on-disk checkpoint generations
//!
//! The loop keeps only the newest few generations. Pushing a generation past
//! capacity deletes the oldest one immediately, which bounds disk usage for
//! long-running resume loops.

use std::collections::VecDeque;

use crate::artifacts::Generation;
use crate::error::Result;

/// Generations retained by the checkpoint loop
pub const DEFAULT_RETENTION: usize = 3;

/// Bounded queue of generation handles with eager eviction
#[derive(Debug)]
pub struct RetentionWindow {
    capacity: usize,
    generations: VecDeque<Generation>,
}

impl RetentionWindow {
    /// Create an empty window
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "retention window needs room for one generation");
        Self {
            capacity,
            generations: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Append a generation, deleting the oldest one if the window overflows
    ///
    /// Returns the evicted generation. Its directory has already been
    /// removed; an already-absent directory is not an error.
    pub fn push(&mut self, generation: Generation) -> Result<Option<Generation>> {
        self.generations.push_back(generation);
        if self.generations.len() <= self.capacity {
            return Ok(None);
        }

        match self.generations.pop_front() {
            Some(evicted) => {
                tracing::debug!(step = evicted.step, dir = %evicted.dir.display(), "evicting generation");
                evicted.remove()?;
                Ok(Some(evicted))
            }
            None => Ok(None),
        }
    }

    pub fn contains(&self, step: u64) -> bool {
        self.get(step).is_some()
    }

    pub fn get(&self, step: u64) -> Option<&Generation> {
        self.generations.iter().find(|g| g.step == step)
    }

    /// Remove a generation from the window without deleting it
    pub fn take(&mut self, step: u64) -> Option<Generation> {
        let index = self.generations.iter().position(|g| g.step == step)?;
        self.generations.remove(index)
    }

    /// Retained steps, oldest first
    pub fn steps(&self) -> Vec<u64> {
        self.generations.iter().map(|g| g.step).collect()
    }

    pub fn newest(&self) -> Option<&Generation> {
        self.generations.back()
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}
