//! Deterministic simulation RNG.
//!
//! Every random draw inside the simulation must come from this stream so
//! that all hosts in a lockstep session advance it identically. The only
//! consumer in the locomotion core is the skid-spin draw.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::math::Fixed;

/// Seeded deterministic RNG for synced simulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedRng {
    inner: ChaCha8Rng,
    draws: u64,
}

impl SyncedRng {
    /// Create a new stream from a session seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
            draws: 0,
        }
    }

    /// Number of draws taken so far; feeds the state hash so a missed or
    /// extra draw on one host is caught as a desync.
    #[must_use]
    pub const fn draw_count(&self) -> u64 {
        self.draws
    }

    /// Uniform fixed-point value in [0, 1).
    pub fn next_fixed01(&mut self) -> Fixed {
        self.draws += 1;
        let bits = self.inner.next_u32();
        Fixed::from_bits(i64::from(bits))
    }
}
