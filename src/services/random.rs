//! Injectable random source
//!
//! Sample generation and the alert trigger draw from a `RandomSource` so the
//! stochastic branches can be forced in tests.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Uniform draws in `[0, 1)`
pub trait RandomSource: Send + Sync {
    fn next_f64(&self) -> f64;

    /// Uniform draw in `[min, max)`
    fn in_range(&self, min: f64, max: f64) -> f64 {
        min + self.next_f64() * (max - min)
    }
}

/// Thread-local OS-seeded generator
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Reproducible generator for simulations and rate tests
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}

/// Replays a fixed sequence, then repeats `fallback` forever
pub struct ScriptedRandom {
    values: Mutex<VecDeque<f64>>,
    fallback: f64,
}

impl ScriptedRandom {
    pub fn new(values: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self { values: Mutex::new(values.into_iter().collect()), fallback }
    }

    /// Always returns the same value
    pub fn constant(value: f64) -> Self {
        Self::new(std::iter::empty(), value)
    }

    /// Draws not yet consumed
    pub fn remaining(&self) -> usize {
        self.values.lock().len()
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&self) -> f64 {
        self.values.lock().pop_front().unwrap_or(self.fallback)
    }
}
