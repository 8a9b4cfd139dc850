//! # Ground Test Utilities
//!
//! Shared testing utilities for the locomotion core:
//! - Determinism test harness
//! - World and unit fixtures
//! - A scripted path planner for driving movers through planner edge cases
//!
//! Lockstep simulations must be 100% deterministic. The usual suspects are
//! floating-point math (the core is fixed-point throughout), hash-map
//! iteration order (the core iterates sorted ids), and unseeded randomness
//! (the core draws from one seeded stream). The harness here catches
//! regressions on all three by hashing parallel runs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;
