//! Path planning and per-unit path policy.
//!
//! [`PathPlanner`] is the contract the locomotion controller consumes:
//! opaque handles, incremental waypoints, and two sentinel encodings — a
//! waypoint with y = −1 means "not resolved yet", one with x = z = −1 means
//! "no more waypoints". [`GridPlanner`] is the bundled implementation: an
//! A* search over terrain squares with deterministic tie-breaking, followed
//! by a line-table smoothing pass.
//!
//! [`PathController`] is the per-unit policy object that shapes speed and
//! heading deltas and may veto waypoint promotion.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::blocking::{BlockFlags, BlockingMap, ObjectId};
use crate::heading::Heading;
use crate::line_table::LineTable;
use crate::map::{HeightMap, SQUARE_SIZE};
use crate::math::{Fixed, Vec3Fixed};
use crate::move_def::MoveDef;
use crate::unit::UnitId;

/// Opaque path handle; 0 means "no path".
pub type PathId = u32;

/// The not-yet-resolved waypoint sentinel.
#[must_use]
pub fn pending_waypoint() -> Vec3Fixed {
    Vec3Fixed::new(Fixed::ZERO, Fixed::from_num(-1), Fixed::ZERO)
}

/// The no-more-waypoints sentinel.
#[must_use]
pub fn exhausted_waypoint() -> Vec3Fixed {
    Vec3Fixed::new(Fixed::from_num(-1), Fixed::from_num(-1), Fixed::from_num(-1))
}

/// Whether a waypoint is still unresolved (y = −1).
#[must_use]
pub fn waypoint_pending(p: Vec3Fixed) -> bool {
    p.y == Fixed::from_num(-1)
}

/// Whether the planner reported the end of the path (x = z = −1).
#[must_use]
pub fn waypoint_exhausted(p: Vec3Fixed) -> bool {
    p.x == Fixed::from_num(-1) && p.z == Fixed::from_num(-1)
}

/// The planner contract consumed by the locomotion controller.
pub trait PathPlanner {
    /// Plan a path; returns 0 on failure.
    #[allow(clippy::too_many_arguments)]
    fn request_path(
        &mut self,
        map: &HeightMap,
        blocking: &BlockingMap,
        owner: ObjectId,
        move_def: &MoveDef,
        from: Vec3Fixed,
        to: Vec3Fixed,
        radius: Fixed,
    ) -> PathId;

    /// Next waypoint along the path past `search_radius` of `reference`.
    fn next_waypoint(&mut self, path: PathId, reference: Vec3Fixed, search_radius: Fixed)
        -> Vec3Fixed;

    /// Per-tick hook for the handle.
    fn update_path(&mut self, _path: PathId) {}

    /// True once after the planner revised the path in place.
    fn path_updated(&mut self, path: PathId) -> bool;

    /// Release the handle.
    fn delete_path(&mut self, path: PathId);
}

/// Per-unit policy shaping the mover's speed and heading changes.
pub trait PathController {
    /// Shape the speed change toward `target_speed`.
    #[allow(clippy::too_many_arguments)]
    fn get_delta_speed(
        &self,
        path: PathId,
        target_speed: Fixed,
        current_speed: Fixed,
        acc_rate: Fixed,
        dec_rate: Fixed,
        want_reverse: bool,
        reversing: bool,
    ) -> Fixed;

    /// Shape the heading change toward `wanted`.
    fn get_delta_heading(
        &self,
        path: PathId,
        wanted: Heading,
        current: Heading,
        turn_rate: Fixed,
    ) -> i16;

    /// Whether waypoint promotion is currently allowed.
    fn allow_set_temp_goal_position(&self, _path: PathId, _point: Vec3Fixed) -> bool {
        true
    }

    /// Observe the working waypoint.
    fn set_temp_goal_position(&mut self, _path: PathId, _point: Vec3Fixed) {}

    /// Observe the final goal.
    fn set_real_goal_position(&mut self, _path: PathId, _point: Vec3Fixed) {}

    /// Whether a specific contact should be ignored entirely.
    fn ignore_collision(&self, _collider: UnitId, _collidee: ObjectId) -> bool {
        false
    }
}

/// The stock policy: symmetric clamp on speed deltas, shortest-arc clamp on
/// heading deltas, no vetoes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DefaultPathController;

impl PathController for DefaultPathController {
    fn get_delta_speed(
        &self,
        _path: PathId,
        target_speed: Fixed,
        current_speed: Fixed,
        acc_rate: Fixed,
        dec_rate: Fixed,
        want_reverse: bool,
        reversing: bool,
    ) -> Fixed {
        // signed, forward-positive frame
        let target_sign = if want_reverse { -Fixed::ONE } else { Fixed::ONE };
        let current_sign = if reversing { -Fixed::ONE } else { Fixed::ONE };
        let raw = target_speed * target_sign - current_speed * current_sign;

        raw.clamp(-dec_rate, acc_rate)
    }

    fn get_delta_heading(
        &self,
        _path: PathId,
        wanted: Heading,
        current: Heading,
        turn_rate: Fixed,
    ) -> i16 {
        let raw = i32::from(wanted.wrapping_sub(current));
        let limit: i32 = turn_rate.round().to_num::<i64>().clamp(0, 32767) as i32;
        raw.clamp(-limit, limit) as i16
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlannedPath {
    waypoints: Vec<Vec3Fixed>,
    cursor: usize,
    goal: Vec3Fixed,
    updated: bool,
}

/// A* planner over terrain squares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridPlanner {
    next_id: PathId,
    paths: HashMap<PathId, PlannedPath>,
    line_table: LineTable,
}

impl Default for GridPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl GridPlanner {
    /// Create an empty planner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            paths: HashMap::new(),
            line_table: LineTable::new(),
        }
    }

    /// Number of live path handles.
    #[must_use]
    pub fn live_paths(&self) -> usize {
        self.paths.len()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct SearchNode {
    x: i32,
    z: i32,
    f_score: Fixed,
    tie_breaker: u64,
}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for min-heap behavior; ties broken by square index
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

fn tie_breaker(x: i32, z: i32) -> u64 {
    ((z as u64) << 32) | (x as u64 & 0xffff_ffff)
}

fn square_passable(
    map: &HeightMap,
    blocking: &BlockingMap,
    owner: ObjectId,
    move_def: &MoveDef,
    x: i32,
    z: i32,
) -> bool {
    if move_def.square_speed_mod(map, x, z) <= Fixed::from_num(0.01) {
        return false;
    }
    !move_def
        .square_blocked(blocking, x, z, Some(owner))
        .contains(BlockFlags::STRUCTURE)
}

fn chebyshev(x1: i32, z1: i32, x2: i32, z2: i32) -> Fixed {
    Fixed::from_num((x1 - x2).abs().max((z1 - z2).abs()))
}

impl GridPlanner {
    #[allow(clippy::too_many_arguments)]
    fn search(
        &self,
        map: &HeightMap,
        blocking: &BlockingMap,
        owner: ObjectId,
        move_def: &MoveDef,
        start: (i32, i32),
        goal: (i32, i32),
        radius_squares: i32,
    ) -> Option<Vec<(i32, i32)>> {
        let mut open: BinaryHeap<SearchNode> = BinaryHeap::new();
        let mut came_from: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
        let mut g_score: HashMap<(i32, i32), Fixed> = HashMap::new();

        g_score.insert(start, Fixed::ZERO);
        open.push(SearchNode {
            x: start.0,
            z: start.1,
            f_score: chebyshev(start.0, start.1, goal.0, goal.1),
            tie_breaker: tie_breaker(start.0, start.1),
        });

        while let Some(current) = open.pop() {
            let cur = (current.x, current.z);
            let arrived = cur == goal
                || chebyshev(cur.0, cur.1, goal.0, goal.1) <= Fixed::from_num(radius_squares);
            if arrived {
                let mut path = vec![cur];
                let mut walk = cur;
                while let Some(&prev) = came_from.get(&walk) {
                    path.push(prev);
                    walk = prev;
                }
                path.reverse();
                return Some(path);
            }

            let current_g = g_score.get(&cur).copied().unwrap_or(Fixed::MAX);

            for &(dx, dz) in &DIRECTIONS {
                let nx = current.x + dx;
                let nz = current.z + dz;

                if nx < 0 || nz < 0 || nx >= map.xsquares() || nz >= map.zsquares() {
                    continue;
                }
                if !square_passable(map, blocking, owner, move_def, nx, nz) {
                    continue;
                }
                // no corner cutting through blocked squares
                if dx != 0
                    && dz != 0
                    && (!square_passable(map, blocking, owner, move_def, current.x + dx, current.z)
                        || !square_passable(
                            map,
                            blocking,
                            owner,
                            move_def,
                            current.x,
                            current.z + dz,
                        ))
                {
                    continue;
                }

                let speed_mod = move_def.square_speed_mod(map, nx, nz);
                let move_cost = Fixed::ONE / speed_mod;
                let tentative = current_g + move_cost;
                let neighbor_g = g_score.get(&(nx, nz)).copied().unwrap_or(Fixed::MAX);

                if tentative < neighbor_g {
                    came_from.insert((nx, nz), cur);
                    g_score.insert((nx, nz), tentative);
                    open.push(SearchNode {
                        x: nx,
                        z: nz,
                        f_score: tentative + chebyshev(nx, nz, goal.0, goal.1),
                        tie_breaker: tie_breaker(nx, nz),
                    });
                }
            }
        }

        None
    }

    /// Drop intermediate squares when the line-table says the straight
    /// segment between their neighbors stays passable.
    fn smooth(
        &self,
        map: &HeightMap,
        blocking: &BlockingMap,
        owner: ObjectId,
        move_def: &MoveDef,
        path: &[(i32, i32)],
    ) -> Vec<(i32, i32)> {
        if path.len() <= 2 {
            return path.to_vec();
        }

        let clear = |from: (i32, i32), to: (i32, i32)| -> bool {
            let (dx, dz) = (to.0 - from.0, to.1 - from.1);
            if !LineTable::covers(dx, dz) {
                return false;
            }
            self.line_table
                .squares(dx, dz)
                .iter()
                .all(|&(ox, oz)| {
                    square_passable(map, blocking, owner, move_def, from.0 + ox, from.1 + oz)
                })
        };

        let mut out = vec![path[0]];
        let mut i = 0;
        while i < path.len() - 1 {
            let mut furthest = i + 1;
            for j in (i + 2)..path.len() {
                if clear(path[i], path[j]) {
                    furthest = j;
                }
            }
            out.push(path[furthest]);
            i = furthest;
        }
        out
    }
}

impl PathPlanner for GridPlanner {
    fn request_path(
        &mut self,
        map: &HeightMap,
        blocking: &BlockingMap,
        owner: ObjectId,
        move_def: &MoveDef,
        from: Vec3Fixed,
        to: Vec3Fixed,
        radius: Fixed,
    ) -> PathId {
        let start = map.world_to_square(from);
        let goal = map.world_to_square(to);
        let radius_squares: i64 = (radius / Fixed::from_num(SQUARE_SIZE)).floor().to_num();

        let Some(squares) =
            self.search(map, blocking, owner, move_def, start, goal, radius_squares as i32)
        else {
            return 0;
        };

        let squares = self.smooth(map, blocking, owner, move_def, &squares);

        let mut waypoints: Vec<Vec3Fixed> =
            squares.iter().map(|&(x, z)| map.square_center(x, z)).collect();
        // steer at the exact goal position, not the goal square center
        waypoints.push(to.flat());

        let id = self.next_id;
        self.next_id += 1;
        self.paths.insert(
            id,
            PlannedPath {
                waypoints,
                cursor: 0,
                goal: to.flat(),
                updated: false,
            },
        );
        id
    }

    fn next_waypoint(
        &mut self,
        path: PathId,
        reference: Vec3Fixed,
        search_radius: Fixed,
    ) -> Vec3Fixed {
        let Some(planned) = self.paths.get_mut(&path) else {
            return exhausted_waypoint();
        };

        while planned.cursor < planned.waypoints.len()
            && planned.waypoints[planned.cursor].distance2d(reference) <= search_radius
        {
            planned.cursor += 1;
        }

        if planned.cursor < planned.waypoints.len() {
            let point = planned.waypoints[planned.cursor];
            planned.cursor += 1;
            point
        } else {
            planned.goal
        }
    }

    fn path_updated(&mut self, path: PathId) -> bool {
        match self.paths.get_mut(&path) {
            Some(planned) => std::mem::take(&mut planned.updated),
            None => false,
        }
    }

    fn delete_path(&mut self, path: PathId) {
        self.paths.remove(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::move_def::MoveFamily;

    fn setup() -> (HeightMap, BlockingMap, MoveDef) {
        let map = HeightMap::flat(32, 32, Fixed::ZERO);
        let blocking = BlockingMap::new(&map);
        let md = MoveDef::new(MoveFamily::Tank, 2, 2);
        (map, blocking, md)
    }

    #[test]
    fn test_straight_path_found() {
        let (map, blocking, md) = setup();
        let mut planner = GridPlanner::new();
        let owner = ObjectId::Unit(0);

        let id = planner.request_path(
            &map,
            &blocking,
            owner,
            &md,
            Vec3Fixed::from_ints(20, 0, 100),
            Vec3Fixed::from_ints(200, 0, 100),
            Fixed::from_num(8),
        );
        assert_ne!(id, 0);

        let wp = planner.next_waypoint(id, Vec3Fixed::from_ints(20, 0, 100), Fixed::from_num(10));
        assert!(!waypoint_pending(wp));
        assert!(!waypoint_exhausted(wp));
        assert!(wp.x > Fixed::from_num(20));
    }

    #[test]
    fn test_exhausted_path_returns_goal() {
        let (map, blocking, md) = setup();
        let mut planner = GridPlanner::new();
        let owner = ObjectId::Unit(0);
        let goal = Vec3Fixed::from_ints(60, 0, 100);

        let id = planner.request_path(
            &map,
            &blocking,
            owner,
            &md,
            Vec3Fixed::from_ints(20, 0, 100),
            goal,
            Fixed::from_num(8),
        );
        assert_ne!(id, 0);

        let mut last = Vec3Fixed::ZERO;
        for _ in 0..16 {
            last = planner.next_waypoint(id, Vec3Fixed::from_ints(20, 0, 100), Fixed::ZERO);
        }
        assert_eq!(last, goal.flat());
    }

    #[test]
    fn test_unreachable_goal_fails() {
        let (map, mut blocking, md) = setup();
        for z in 0..32 {
            blocking.block(
                ObjectId::Feature(100 + z as u32),
                BlockFlags::STRUCTURE,
                Vec3Fixed::new(Fixed::from_num(128), Fixed::ZERO, Fixed::from_num(z * 8 + 4)),
                2,
                2,
                false,
                Fixed::ZERO,
            );
        }

        let mut planner = GridPlanner::new();
        let owner = ObjectId::Unit(0);
        let id = planner.request_path(
            &map,
            &blocking,
            owner,
            &md,
            Vec3Fixed::from_ints(20, 0, 100),
            Vec3Fixed::from_ints(250, 0, 100),
            Fixed::ZERO,
        );
        assert_eq!(id, 0);
    }

    #[test]
    fn test_path_around_structure() {
        let (map, mut blocking, md) = setup();
        blocking.block(
            ObjectId::Unit(50),
            BlockFlags::STRUCTURE,
            Vec3Fixed::from_ints(128, 0, 100),
            6,
            6,
            false,
            Fixed::ZERO,
        );

        let mut planner = GridPlanner::new();
        let owner = ObjectId::Unit(0);
        let id = planner.request_path(
            &map,
            &blocking,
            owner,
            &md,
            Vec3Fixed::from_ints(60, 0, 100),
            Vec3Fixed::from_ints(200, 0, 100),
            Fixed::ZERO,
        );
        assert_ne!(id, 0);

        // walk the waypoint stream; none may sit on a structure square
        let mut reference = Vec3Fixed::from_ints(60, 0, 100);
        for _ in 0..64 {
            let wp = planner.next_waypoint(id, reference, Fixed::from_num(4));
            let (sx, sz) = map.world_to_square(wp);
            assert!(!blocking
                .square_blocked(sx, sz, Some(owner))
                .contains(BlockFlags::STRUCTURE));
            reference = wp;
        }
    }

    #[test]
    fn test_delete_path_frees_handle() {
        let (map, blocking, md) = setup();
        let mut planner = GridPlanner::new();
        let id = planner.request_path(
            &map,
            &blocking,
            ObjectId::Unit(0),
            &md,
            Vec3Fixed::from_ints(20, 0, 20),
            Vec3Fixed::from_ints(100, 0, 100),
            Fixed::ZERO,
        );
        planner.delete_path(id);
        assert_eq!(planner.live_paths(), 0);
        assert!(waypoint_exhausted(planner.next_waypoint(
            id,
            Vec3Fixed::ZERO,
            Fixed::ZERO
        )));
    }

    #[test]
    fn test_default_controller_speed_clamp() {
        let ctl = DefaultPathController;
        let acc = Fixed::from_num(0.2);
        let dec = Fixed::from_num(0.4);

        // accelerate forward, clamped by acc rate
        let d = ctl.get_delta_speed(1, Fixed::from_num(3), Fixed::ZERO, acc, dec, false, false);
        assert_eq!(d, acc);

        // brake from forward motion, clamped by dec rate
        let d = ctl.get_delta_speed(1, Fixed::ZERO, Fixed::from_num(3), acc, dec, false, false);
        assert_eq!(d, -dec);

        // reverse target from standstill accelerates negative
        let d = ctl.get_delta_speed(1, Fixed::from_num(2), Fixed::ZERO, acc, dec, true, false);
        assert!(d < Fixed::ZERO);
    }

    #[test]
    fn test_default_controller_heading_clamp() {
        let ctl = DefaultPathController;
        let tr = Fixed::from_num(500);

        assert_eq!(ctl.get_delta_heading(1, 400, 0, tr), 400);
        assert_eq!(ctl.get_delta_heading(1, 5000, 0, tr), 500);
        assert_eq!(ctl.get_delta_heading(1, -5000, 0, tr), -500);

        // wraparound picks the short arc
        let d = ctl.get_delta_heading(1, -32000, 32000, tr);
        assert_eq!(d, 500);
    }
}
