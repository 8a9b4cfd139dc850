//! Spawning fixtures and a scriptable path planner.

use std::collections::HashMap;

use ground_core::blocking::{BlockingMap, ObjectId};
use ground_core::config::ModInfo;
use ground_core::events::Event;
use ground_core::features::FeatureArena;
use ground_core::locomotion::{GroundMover, WorldView};
use ground_core::map::HeightMap;
use ground_core::math::{Fixed, Vec3Fixed};
use ground_core::move_def::{MoveDef, MoveFamily};
use ground_core::path::{exhausted_waypoint, PathId, PathPlanner};
use ground_core::rng::SyncedRng;
use ground_core::simulation::{Simulation, UnitSpawnParams};
use ground_core::spatial::SpatialGrid;
use ground_core::unit::{Unit, UnitArena, UnitData, UnitId};

/// A flat-ground simulation of `squares`² terrain squares.
#[must_use]
pub fn flat_sim(squares: i32, seed: u64) -> Simulation {
    Simulation::new(
        HeightMap::flat(squares, squares, Fixed::ZERO),
        ModInfo::default(),
        seed,
    )
}

/// The standard test tank profile.
#[must_use]
pub fn tank_data() -> UnitData {
    UnitData::default()
}

/// Spawn a tank-family unit at integer coordinates.
pub fn spawn_tank(sim: &mut Simulation, x: i32, z: i32) -> UnitId {
    sim.spawn_unit(UnitSpawnParams {
        pos: Vec3Fixed::from_ints(x, 0, z),
        data: tank_data(),
        move_def: Some(MoveDef::new(MoveFamily::Tank, 2, 2)),
        ..Default::default()
    })
}

/// A standalone world for driving a single mover outside a [`Simulation`],
/// with any planner implementation injected per view.
pub struct WorldFixture {
    /// Terrain.
    pub map: HeightMap,
    /// Blocking map.
    pub blocking: BlockingMap,
    /// Spatial index.
    pub spatial: SpatialGrid,
    /// Other units.
    pub units: UnitArena,
    /// Features.
    pub features: FeatureArena,
    /// Other movers.
    pub movers: Vec<Option<GroundMover>>,
    /// Event sink.
    pub events: Vec<Event>,
    /// RNG stream.
    pub rng: SyncedRng,
    /// Rules.
    pub mod_info: ModInfo,
    /// Current tick.
    pub frame: u64,
}

impl WorldFixture {
    /// A flat world of `squares`² terrain squares.
    #[must_use]
    pub fn flat(squares: i32) -> Self {
        let map = HeightMap::flat(squares, squares, Fixed::ZERO);
        let blocking = BlockingMap::new(&map);
        let spatial = SpatialGrid::new(&map);
        Self {
            map,
            blocking,
            spatial,
            units: UnitArena::new(),
            features: FeatureArena::new(),
            movers: Vec::new(),
            events: Vec::new(),
            rng: SyncedRng::new(1337),
            mod_info: ModInfo::default(),
            frame: 0,
        }
    }

    /// A standalone tank at integer coordinates (not inserted anywhere).
    #[must_use]
    pub fn standalone_tank(x: i32, z: i32) -> (Unit, GroundMover) {
        let unit = Unit::new(
            Vec3Fixed::from_ints(x, 0, z),
            tank_data(),
            Some(MoveDef::new(MoveFamily::Tank, 2, 2)),
        );
        let mover = GroundMover::new(&unit);
        (unit, mover)
    }

    /// Build a per-tick world view around an injected planner.
    pub fn view<'a>(&'a mut self, planner: &'a mut dyn PathPlanner) -> WorldView<'a> {
        WorldView {
            frame: self.frame,
            map: &self.map,
            blocking: &mut self.blocking,
            spatial: &self.spatial,
            planner,
            units: &mut self.units,
            features: &mut self.features,
            movers: &mut self.movers,
            events: &mut self.events,
            rng: &mut self.rng,
            mod_info: &self.mod_info,
        }
    }

    /// Advance the fixture clock.
    pub fn advance(&mut self) {
        self.frame += 1;
    }
}

/// A planner that replays a scripted sequence of waypoint responses.
///
/// Useful for exercising the sentinel-waypoint protocol: queue a few
/// "pending" responses (y = −1) followed by real waypoints and watch the
/// mover hold still until they resolve.
pub struct ScriptedPlanner {
    next_id: PathId,
    responses: Vec<Vec3Fixed>,
    cursor: usize,
    /// When set, `request_path` reports failure.
    pub fail_requests: bool,
    updated_flags: HashMap<PathId, bool>,
}

impl ScriptedPlanner {
    /// A planner that will serve the given waypoint responses in order,
    /// repeating the last one forever.
    #[must_use]
    pub fn new(responses: Vec<Vec3Fixed>) -> Self {
        Self {
            next_id: 1,
            responses,
            cursor: 0,
            fail_requests: false,
            updated_flags: HashMap::new(),
        }
    }

    /// A pending waypoint at (x, z): position known, height flagged −1.
    #[must_use]
    pub fn pending_at(x: i32, z: i32) -> Vec3Fixed {
        Vec3Fixed::new(Fixed::from_num(x), Fixed::from_num(-1), Fixed::from_num(z))
    }

    /// Queue the in-place-revision flag for a path.
    pub fn mark_updated(&mut self, path: PathId) {
        self.updated_flags.insert(path, true);
    }

    /// Number of responses consumed so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.cursor
    }
}

impl PathPlanner for ScriptedPlanner {
    fn request_path(
        &mut self,
        _map: &HeightMap,
        _blocking: &BlockingMap,
        _owner: ObjectId,
        _move_def: &MoveDef,
        _from: Vec3Fixed,
        _to: Vec3Fixed,
        _radius: Fixed,
    ) -> PathId {
        if self.fail_requests {
            return 0;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn next_waypoint(
        &mut self,
        _path: PathId,
        _reference: Vec3Fixed,
        _search_radius: Fixed,
    ) -> Vec3Fixed {
        match self.responses.get(self.cursor) {
            Some(&point) => {
                if self.cursor + 1 < self.responses.len() {
                    self.cursor += 1;
                }
                point
            }
            None => exhausted_waypoint(),
        }
    }

    fn path_updated(&mut self, path: PathId) -> bool {
        self.updated_flags.remove(&path).unwrap_or(false)
    }

    fn delete_path(&mut self, _path: PathId) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use ground_core::path::waypoint_pending;

    #[test]
    fn test_scripted_planner_replays_in_order() {
        let mut planner = ScriptedPlanner::new(vec![
            ScriptedPlanner::pending_at(10, 10),
            Vec3Fixed::from_ints(20, 0, 20),
        ]);

        let first = planner.next_waypoint(1, Vec3Fixed::ZERO, Fixed::ZERO);
        assert!(waypoint_pending(first));
        let second = planner.next_waypoint(1, Vec3Fixed::ZERO, Fixed::ZERO);
        assert!(!waypoint_pending(second));
        // the last response repeats
        let third = planner.next_waypoint(1, Vec3Fixed::ZERO, Fixed::ZERO);
        assert_eq!(second, third);
    }

    #[test]
    fn test_failing_planner_returns_zero() {
        let mut planner = ScriptedPlanner::new(Vec::new());
        planner.fail_requests = true;

        let map = HeightMap::flat(8, 8, Fixed::ZERO);
        let blocking = BlockingMap::new(&map);
        let md = MoveDef::new(MoveFamily::Tank, 2, 2);
        let id = planner.request_path(
            &map,
            &blocking,
            ObjectId::Unit(0),
            &md,
            Vec3Fixed::ZERO,
            Vec3Fixed::from_ints(50, 0, 50),
            Fixed::ZERO,
        );
        assert_eq!(id, 0);
    }
}
