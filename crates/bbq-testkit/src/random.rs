//! Deterministic random handlers

use bbq_core::effects::RandomEffects;
use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::collections::VecDeque;

/// Seeded ChaCha20 stream, reproducible across runs
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<ChaCha20Rng>,
}

impl SeededRandom {
    /// Create from a 64-bit seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
        }
    }
}

impl RandomEffects for SeededRandom {
    fn random_u64(&self) -> u64 {
        self.rng.lock().next_u64()
    }
}

/// Replays a fixed script of values, then falls back to a counter
///
/// Used to force id and token collisions.
#[derive(Debug)]
pub struct ScriptedRandom {
    script: Mutex<VecDeque<u64>>,
    fallback: Mutex<u64>,
}

impl ScriptedRandom {
    /// Values are returned in order; afterwards `1000, 1001, ...`
    pub fn new(values: impl IntoIterator<Item = u64>) -> Self {
        Self {
            script: Mutex::new(values.into_iter().collect()),
            fallback: Mutex::new(1000),
        }
    }

    /// Script entries not consumed yet
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl RandomEffects for ScriptedRandom {
    fn random_u64(&self) -> u64 {
        if let Some(value) = self.script.lock().pop_front() {
            return value;
        }
        let mut next = self.fallback.lock();
        let value = *next;
        *next += 1;
        value
    }
}
