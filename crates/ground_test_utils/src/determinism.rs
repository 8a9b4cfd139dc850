//! Determinism testing harness.

use ground_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical final hashes.
    pub is_deterministic: bool,
    /// Final state hash of each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated per run.
    pub ticks: u64,
}

impl DeterminismResult {
    /// All unique hashes; one entry for a deterministic simulation.
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert determinism with a detailed failure message.
    ///
    /// # Panics
    ///
    /// Panics when the runs diverged.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic,
            "simulation is non-deterministic!\n\
             runs: {}\n\
             ticks: {}\n\
             unique hashes: {} (expected 1)\n\
             all hashes: {:?}",
            self.hashes.len(),
            self.ticks,
            self.unique_hashes().len(),
            self.hashes,
        );
    }
}

/// Build `runs` identical simulations, advance each `ticks` times, and
/// compare their final state hashes.
pub fn run_determinism_test<F: Fn() -> Simulation>(
    build: F,
    runs: usize,
    ticks: u64,
) -> DeterminismResult {
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut sim = build();
        for _ in 0..ticks {
            sim.tick();
        }
        hashes.push(sim.state_hash());
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use ground_core::math::{Fixed, Vec3Fixed};

    #[test]
    fn test_empty_simulation_is_deterministic() {
        let result = run_determinism_test(|| fixtures::flat_sim(64, 1), 3, 32);
        result.assert_deterministic();
    }

    #[test]
    fn test_moving_units_are_deterministic() {
        let build = || {
            let mut sim = fixtures::flat_sim(64, 99);
            let a = fixtures::spawn_tank(&mut sim, 100, 100);
            let b = fixtures::spawn_tank(&mut sim, 160, 100);
            sim.order_move(a, Vec3Fixed::from_ints(400, 0, 160), Fixed::from_num(8))
                .unwrap();
            sim.order_move(b, Vec3Fixed::from_ints(400, 0, 80), Fixed::from_num(8))
                .unwrap();
            sim
        };

        run_determinism_test(build, 3, 64).assert_deterministic();
    }
}
