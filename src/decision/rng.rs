use parking_lot::Mutex;
use rand::RngExt;
use std::collections::VecDeque;

/// Single seam for every probability roll in the core. The decision engine
/// is the only caller; tests swap in [`ScriptedRandom`] to force outcomes.
pub trait RandomSource: Send + Sync {
    /// Uniform draw in `[0, 1)`.
    fn roll(&self) -> f64;
}

/// Production source backed by the thread-local CSPRNG.
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn roll(&self) -> f64 {
        rand::rng().random()
    }
}

/// Deterministic source for tests: replays a fixed sequence, then a fallback.
pub struct ScriptedRandom {
    rolls: Mutex<VecDeque<f64>>,
    fallback: f64,
}

impl ScriptedRandom {
    pub fn new(rolls: Vec<f64>) -> Self {
        Self {
            rolls: Mutex::new(rolls.into()),
            fallback: 1.0 - f64::EPSILON,
        }
    }

    /// Every draw returns the same value.
    pub fn always(value: f64) -> Self {
        Self {
            rolls: Mutex::new(VecDeque::new()),
            fallback: value,
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn roll(&self) -> f64 {
        self.rolls.lock().pop_front().unwrap_or(self.fallback)
    }
}
