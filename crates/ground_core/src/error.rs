//! Error types for the locomotion core.

use thiserror::Error;

/// Result type alias using [`GroundError`].
pub type Result<T> = std::result::Result<T, GroundError>;

/// Top-level error type for the locomotion core.
///
/// The simulation loop itself never unwinds: stuck or unreachable movers are
/// expressed through progress-state transitions. Errors surface only at the
/// embedding boundary (spawning, commanding, state sync) and in the fallible
/// tree-view constructor.
#[derive(Debug, Error)]
pub enum GroundError {
    /// A unit id did not resolve to a live unit.
    #[error("Unit not found: {0}")]
    UnitNotFound(u32),

    /// A feature id did not resolve to a live feature.
    #[error("Feature not found: {0}")]
    FeatureNotFound(u32),

    /// The unit exists but has no ground mover attached.
    #[error("Unit {0} has no ground mover")]
    NotAMover(u32),

    /// A position outside the playable map rectangle was supplied.
    #[error("Position ({x}, {z}) is outside the map")]
    OutOfBounds {
        /// World-space x coordinate.
        x: f64,
        /// World-space z coordinate.
        z: f64,
    },

    /// The advanced tree view cannot be constructed on this host.
    #[error("Tree view content error: {0}")]
    TreeViewContent(String),

    /// State (de)serialization failed.
    #[error("State sync error: {0}")]
    StateSync(String),

    /// Desync detected between two hosts.
    #[error("Desync detected at tick {tick}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Tick where the desync occurred.
        tick: u64,
        /// Local simulation hash.
        local_hash: u64,
        /// Remote simulation hash.
        remote_hash: u64,
    },
}
