//! # Ground Core
//!
//! Deterministic ground-unit locomotion and collision core for a lockstep
//! RTS engine.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point state (fixed-point throughout)
//!
//! Every tick advances all ground movers in ascending-id order: each asks
//! the path planner for waypoints, steers around neighbors, integrates its
//! velocity, and resolves contact against units, features, structures, and
//! terrain. External impulses knock units into a ballistic skid state that
//! hands control back once linear and angular motion die out.
//!
//! ## Crate Structure
//!
//! - [`simulation`] - the tick driver and arena storage
//! - [`locomotion`] - the per-unit locomotion state machine
//! - [`collision`] - the contact resolver
//! - [`skid`] - ballistic skid and drop dynamics
//! - [`avoidance`] - obstacle avoidance steering
//! - [`path`] - planner and path-policy contracts plus the grid planner
//! - [`map`] / [`blocking`] / [`spatial`] - world services
//! - [`math`] / [`heading`] - fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod avoidance;
pub mod blocking;
pub mod collision;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod features;
pub mod heading;
pub mod line_table;
pub mod locomotion;
pub mod map;
pub mod math;
pub mod move_def;
pub mod path;
pub mod rng;
pub mod simulation;
pub mod skid;
pub mod spatial;
pub mod tree_view;
pub mod unit;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::blocking::{BlockFlags, BlockingMap, ObjectId};
    pub use crate::commands::{Command, CommandQueue};
    pub use crate::config::{ConfigStore, ModInfo};
    pub use crate::error::{GroundError, Result};
    pub use crate::events::{Event, EventListener, Explosion};
    pub use crate::features::{Feature, FeatureDrawType, FeatureId};
    pub use crate::heading::{heading_from_vector, vector_from_heading, Heading};
    pub use crate::locomotion::{GroundMover, ProgressState, WorldView};
    pub use crate::map::{HeightMap, SQUARE_SIZE};
    pub use crate::math::{Fixed, Vec3Fixed};
    pub use crate::move_def::{MoveDef, MoveFamily};
    pub use crate::path::{
        DefaultPathController, GridPlanner, PathController, PathId, PathPlanner,
    };
    pub use crate::simulation::{Simulation, UnitSpawnParams};
    pub use crate::tree_view::{TreeView, TreeViewKind, ViewCaps};
    pub use crate::unit::{
        FpsControl, MainWeapon, PhysicalState, Unit, UnitData, UnitId,
    };
}
