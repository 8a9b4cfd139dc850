//! The ground locomotion controller.
//!
//! One [`GroundMover`] drives one unit: it follows planner waypoints, shapes
//! speed and heading through the unit's path controller, watches itself for
//! stuck states, and hands control to the skid component when physics takes
//! over. All mutation flows through explicit handles in a [`WorldView`]; the
//! mover holds nothing but its own state and a path handle.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blocking::{BlockFlags, BlockingMap};
use crate::config::ModInfo;
use crate::events::Event;
use crate::features::FeatureArena;
use crate::heading::{heading_from_vector, pi, Heading, CIRCLE_DIVS, HALF_CIRCLE};
use crate::map::{HeightMap, SQUARE_SIZE};
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::path::{
    waypoint_exhausted, waypoint_pending, DefaultPathController, PathController, PathId,
    PathPlanner,
};
use crate::rng::SyncedRng;
use crate::spatial::SpatialGrid;
use crate::unit::{PhysicalState, Unit, UnitArena};

/// Simulation ticks per second.
pub const GAME_SPEED: i32 = 30;

/// Ticks between coarse watchdog updates.
pub const SLOWUPDATE_RATE: u64 = 16;

/// Slow-update idlings after which a stuck mover gives up.
pub const MAX_IDLING_SLOWUPDATES: i32 = 16;

/// Damage scale for hard collisions and ground impacts.
#[must_use]
pub fn collision_damage_mult() -> Fixed {
    Fixed::from_num(0.02)
}

/// Sanity ceiling on per-tick speeds.
#[must_use]
pub fn max_unit_speed() -> Fixed {
    Fixed::from_num(1000)
}

/// Where the mover stands with respect to its current goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProgressState {
    /// Idle; at rest or at goal, holding no path.
    #[default]
    Done,
    /// Pursuing (or requesting) a path.
    Active,
    /// The last attempt gave up.
    Failed,
}

/// Per-tick bundle of world handles handed to every mover.
///
/// The simulation owns all of these; movers only ever see them through this
/// struct, which keeps the core testable against substitute worlds.
pub struct WorldView<'a> {
    /// Current tick number.
    pub frame: u64,
    /// Terrain queries.
    pub map: &'a HeightMap,
    /// Footprint registration and structure masks.
    pub blocking: &'a mut BlockingMap,
    /// Radius queries, rebuilt at tick start.
    pub spatial: &'a SpatialGrid,
    /// The path planner.
    pub planner: &'a mut dyn PathPlanner,
    /// All other units (the updating unit's slot is vacant).
    pub units: &'a mut UnitArena,
    /// All features.
    pub features: &'a mut FeatureArena,
    /// Locomotion state of all other units, indexed like the unit arena.
    pub movers: &'a mut Vec<Option<GroundMover>>,
    /// Event sink for this tick.
    pub events: &'a mut Vec<Event>,
    /// The synced RNG stream.
    pub rng: &'a mut SyncedRng,
    /// Game-rule switches.
    pub mod_info: &'a ModInfo,
}

fn default_controller() -> Box<dyn PathController> {
    Box::new(DefaultPathController)
}

/// Locomotion state machine for one ground unit.
#[derive(Serialize, Deserialize)]
pub struct GroundMover {
    /// Turn rate in heading units per tick.
    #[serde(with = "fixed_serde")]
    pub(crate) turn_rate: Fixed,
    #[serde(with = "fixed_serde")]
    pub(crate) acc_rate: Fixed,
    #[serde(with = "fixed_serde")]
    pub(crate) dec_rate: Fixed,

    #[serde(with = "fixed_serde")]
    pub(crate) max_speed: Fixed,
    #[serde(with = "fixed_serde")]
    pub(crate) max_reverse_speed: Fixed,
    #[serde(with = "fixed_serde")]
    pub(crate) wanted_speed: Fixed,
    #[serde(with = "fixed_serde")]
    pub(crate) current_speed: Fixed,
    #[serde(with = "fixed_serde")]
    pub(crate) delta_speed: Fixed,
    #[serde(with = "fixed_serde")]
    pub(crate) max_wanted_speed: Fixed,

    pub(crate) path_id: PathId,
    pub(crate) goal_pos: Vec3Fixed,
    #[serde(with = "fixed_serde")]
    pub(crate) goal_radius: Fixed,

    pub(crate) curr_way_point: Vec3Fixed,
    pub(crate) next_way_point: Vec3Fixed,
    pub(crate) at_goal: bool,
    pub(crate) at_end_of_path: bool,

    #[serde(with = "fixed_serde")]
    pub(crate) curr_way_point_dist: Fixed,
    #[serde(with = "fixed_serde")]
    pub(crate) prev_way_point_dist: Fixed,

    pub(crate) path_request_delay: u64,

    pub(crate) num_idling_updates: i32,
    pub(crate) num_idling_slow_updates: i32,
    pub(crate) wanted_heading: Heading,

    pub(crate) next_obstacle_avoidance_update: u64,

    pub(crate) skidding: bool,
    pub(crate) flying: bool,
    pub(crate) reversing: bool,
    pub(crate) idling: bool,
    pub(crate) can_reverse: bool,
    pub(crate) use_main_heading: bool,

    pub(crate) waypoint_dir: Vec3Fixed,
    pub(crate) flat_front_dir: Vec3Fixed,
    pub(crate) last_avoidance_dir: Vec3Fixed,
    pub(crate) main_heading_pos: Vec3Fixed,

    pub(crate) skid_rot_vector: Vec3Fixed,
    #[serde(with = "fixed_serde")]
    pub(crate) skid_rot_speed: Fixed,
    #[serde(with = "fixed_serde")]
    pub(crate) skid_rot_accel: Fixed,
    pub(crate) old_phys_state: PhysicalState,

    pub(crate) old_pos: Vec3Fixed,
    pub(crate) progress_state: ProgressState,

    #[serde(skip, default = "default_controller")]
    pub(crate) controller: Box<dyn PathController>,
}

impl std::fmt::Debug for GroundMover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroundMover")
            .field("progress_state", &self.progress_state)
            .field("path_id", &self.path_id)
            .field("current_speed", &self.current_speed)
            .field("skidding", &self.skidding)
            .field("goal_pos", &self.goal_pos)
            .finish_non_exhaustive()
    }
}

impl GroundMover {
    /// Create a mover for a unit, caching its kinematic rates.
    #[must_use]
    pub fn new(owner: &Unit) -> Self {
        Self {
            turn_rate: owner.data.turn_rate,
            acc_rate: owner.data.acc_rate.max(Fixed::from_num(0.01)),
            dec_rate: owner.data.dec_rate.max(Fixed::from_num(0.01)),
            max_speed: owner.data.max_speed,
            max_reverse_speed: owner.data.max_reverse_speed,
            wanted_speed: Fixed::ZERO,
            current_speed: Fixed::ZERO,
            delta_speed: Fixed::ZERO,
            max_wanted_speed: Fixed::ZERO,
            path_id: 0,
            goal_pos: Vec3Fixed::ZERO,
            goal_radius: Fixed::ZERO,
            curr_way_point: Vec3Fixed::ZERO,
            next_way_point: Vec3Fixed::ZERO,
            at_goal: false,
            at_end_of_path: false,
            curr_way_point_dist: Fixed::ZERO,
            prev_way_point_dist: Fixed::ZERO,
            path_request_delay: 0,
            num_idling_updates: 0,
            num_idling_slow_updates: 0,
            wanted_heading: 0,
            next_obstacle_avoidance_update: 0,
            skidding: false,
            flying: false,
            reversing: false,
            idling: false,
            can_reverse: owner.data.max_reverse_speed > Fixed::ZERO,
            use_main_heading: false,
            waypoint_dir: Vec3Fixed::ZERO,
            flat_front_dir: Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::ONE),
            last_avoidance_dir: Vec3Fixed::ZERO,
            main_heading_pos: Vec3Fixed::ZERO,
            skid_rot_vector: Vec3Fixed::UP,
            skid_rot_speed: Fixed::ZERO,
            skid_rot_accel: Fixed::ZERO,
            old_phys_state: PhysicalState::OnGround,
            old_pos: owner.pos,
            progress_state: ProgressState::Done,
            controller: default_controller(),
        }
    }

    /// Progress toward the current goal.
    #[must_use]
    pub fn progress_state(&self) -> ProgressState {
        self.progress_state
    }

    /// The held path handle; 0 while Done.
    #[must_use]
    pub fn path_id(&self) -> PathId {
        self.path_id
    }

    /// Scalar driving speed; sign carried by [`Self::is_reversing`].
    #[must_use]
    pub fn current_speed(&self) -> Fixed {
        self.current_speed
    }

    /// Requested speed cap.
    #[must_use]
    pub fn wanted_speed(&self) -> Fixed {
        self.wanted_speed
    }

    /// Whether the mover is driving backwards.
    #[must_use]
    pub fn is_reversing(&self) -> bool {
        self.reversing
    }

    /// Whether the mover is in the ballistic skid state.
    #[must_use]
    pub fn is_skidding(&self) -> bool {
        self.skidding
    }

    /// Whether the mover is airborne.
    #[must_use]
    pub fn is_flying(&self) -> bool {
        self.flying
    }

    /// Whether the last tick counted as idling.
    #[must_use]
    pub fn is_idling(&self) -> bool {
        self.idling
    }

    /// Current goal position.
    #[must_use]
    pub fn goal_pos(&self) -> Vec3Fixed {
        self.goal_pos
    }

    /// Whether the mover has declared arrival.
    #[must_use]
    pub fn at_goal(&self) -> bool {
        self.at_goal
    }

    /// Fast idle counter.
    #[must_use]
    pub fn num_idling_updates(&self) -> i32 {
        self.num_idling_updates
    }

    /// Slow idle counter.
    #[must_use]
    pub fn num_idling_slow_updates(&self) -> i32 {
        self.num_idling_slow_updates
    }

    /// Working waypoint pair.
    #[must_use]
    pub fn waypoints(&self) -> (Vec3Fixed, Vec3Fixed) {
        (self.curr_way_point, self.next_way_point)
    }

    /// Replace the path policy object.
    pub fn set_controller(&mut self, controller: Box<dyn PathController>) {
        self.controller = controller;
    }

    // ------------------------------------------------------------------
    // public operations
    // ------------------------------------------------------------------

    /// Start moving toward `goal`, arriving within `radius`.
    pub fn start_moving(
        &mut self,
        owner: &mut Unit,
        world: &mut WorldView,
        goal: Vec3Fixed,
        radius: Fixed,
    ) {
        let speed = if self.reversing {
            self.max_reverse_speed
        } else {
            self.max_speed
        };
        self.start_moving_with_speed(owner, world, goal, radius, speed);
    }

    /// Start moving toward `goal` with an explicit speed cap.
    pub fn start_moving_with_speed(
        &mut self,
        owner: &mut Unit,
        world: &mut WorldView,
        goal: Vec3Fixed,
        radius: Fixed,
        speed: Fixed,
    ) {
        if self.progress_state == ProgressState::Active {
            self.stop_engine(owner, world);
        }

        self.goal_pos = Vec3Fixed::new(goal.x, Fixed::ZERO, goal.z);
        self.goal_radius = radius;
        self.at_goal = false;
        self.max_wanted_speed = speed;

        self.use_main_heading = false;
        self.progress_state = ProgressState::Active;

        self.num_idling_updates = 0;
        self.num_idling_slow_updates = 0;

        self.curr_way_point_dist = Fixed::ZERO;
        self.prev_way_point_dist = Fixed::ZERO;

        debug!(unit = owner.id, "StartMoving: starting engine");

        self.start_engine(owner, world);
    }

    /// Abandon the current move and go idle.
    pub fn stop_moving(&mut self, owner: &mut Unit, world: &mut WorldView) {
        debug!(unit = owner.id, "StopMoving: stopping engine");

        self.stop_engine(owner, world);

        self.use_main_heading = false;
        self.progress_state = ProgressState::Done;
    }

    /// Advance one tick; true when the position changed meaningfully.
    pub fn update(&mut self, owner: &mut Unit, world: &mut WorldView) -> bool {
        debug_assert!(owner.speed.is_sane_speed(max_unit_speed()));

        if owner.transporter.is_some() {
            world.blocking.unblock(owner.object_id());
            return false;
        }

        if self.on_slope(owner, world.map, Fixed::ONE) {
            self.skidding = true;
        }
        if self.skidding {
            self.update_skid(owner, world);
            return false;
        }

        if owner.falling {
            self.update_controlled_drop(owner, world);
            return false;
        }

        let heading_before = owner.heading;

        if owner.stunned || owner.being_built {
            self.change_speed(owner, world, Fixed::ZERO, false, false);
        } else if owner.fps_control.is_some() {
            let _ = self.update_direct_control(owner, world);
        } else {
            let _ = self.follow_path(owner, world);
        }

        // run even when stunned so restoring terrain can push the unit out
        self.update_owner_pos(owner, world);
        self.adjust_pos_to_water_line(owner, world.map, world.mod_info);
        self.handle_object_collisions(owner, world);

        debug_assert!(owner.speed.is_sane_speed(max_unit_speed()));

        let eps = Fixed::from_num(0.0001);
        let cmp_eps = Vec3Fixed::new(eps, eps * Fixed::from_num(0.01), eps);
        let pos_dif = owner.pos - self.old_pos;

        let has_moved;
        if pos_dif.equals_eps(Vec3Fixed::ZERO, cmp_eps) {
            // the equality test is inexact, so an epsilon speed vector may
            // survive it; nullify to stop visual micro-stutter
            owner.speed = Vec3Fixed::ZERO;

            // sentinel waypoints mean the planner is still working; waiting
            // on them must not count as idling or the path gets re-requested
            // forever. Pure turning-in-place is not idling either.
            let turn_step = i32::from(owner.heading.wrapping_sub(heading_before)).abs();
            self.idling = true;
            self.idling &= !waypoint_pending(self.curr_way_point)
                && !waypoint_pending(self.next_way_point);
            self.idling &= Fixed::from_num(turn_step) < self.turn_rate;
            has_moved = false;
        } else {
            // the distance to the waypoint shrinks slowly when moving
            // orthogonal to it; compare against the projected displacement
            // instead of raw speed
            self.old_pos = owner.pos;

            let ffd = self.flat_front_dir * (pos_dif.sq_length() * Fixed::from_num(0.5));
            let dir_sign = if self.reversing { -Fixed::ONE } else { Fixed::ONE };
            let wpd = self.waypoint_dir * dir_sign;
            let dist_delta = self.curr_way_point_dist - self.prev_way_point_dist;

            self.idling = true;
            self.idling &= pos_dif.y.abs() < (cmp_eps.y * owner.pos.y).abs();
            self.idling &= (dist_delta * dist_delta) < ffd.dot(wpd);
            has_moved = true;
        }

        has_moved
    }

    /// Coarse watchdog, run every [`SLOWUPDATE_RATE`] ticks.
    pub fn slow_update(&mut self, owner: &mut Unit, world: &mut WorldView) {
        if owner.transporter.is_some() {
            if self.progress_state == ProgressState::Active {
                self.stop_engine(owner, world);
            }
            return;
        }

        if self.progress_state == ProgressState::Active {
            if self.path_id != 0 {
                if self.idling {
                    self.num_idling_slow_updates =
                        (self.num_idling_slow_updates + 1).min(MAX_IDLING_SLOWUPDATES);
                } else {
                    self.num_idling_slow_updates = (self.num_idling_slow_updates - 1).max(0);
                }

                let idle_limit = if self.turn_rate > Fixed::ZERO {
                    (Fixed::from_num(HALF_CIRCLE) / self.turn_rate).to_num::<i64>() as i32
                } else {
                    i32::MAX
                };

                if self.num_idling_updates > idle_limit {
                    debug!(
                        unit = owner.id,
                        path = self.path_id,
                        failures = self.num_idling_updates,
                        "SlowUpdate: unit has path but is not moving"
                    );

                    if self.num_idling_slow_updates < MAX_IDLING_SLOWUPDATES {
                        self.stop_engine(owner, world);
                        self.start_engine(owner, world);
                    } else {
                        // likely stranded on a non-traversable square or
                        // wedged in a non-moving crowd
                        self.fail(owner, world);
                    }
                }
            } else if world.frame > self.path_request_delay {
                debug!(unit = owner.id, "SlowUpdate: unit has no path");

                self.stop_engine(owner, world);
                self.start_engine(owner, world);
            }
        }

        if !self.flying && !world.map.in_bounds(owner.pos) {
            owner.pos = world.map.clamp_in_bounds(owner.pos);
            self.old_pos = owner.pos;
        }
    }

    /// Request an in-place rotation so the main weapon can cover `pos`.
    pub fn keep_pointing_to(&mut self, owner: &Unit, pos: Vec3Fixed, aggressive: bool) {
        self.main_heading_pos = pos;
        self.use_main_heading = aggressive;

        if !self.use_main_heading {
            return;
        }
        let Some(weapon) = owner.weapon else {
            return;
        };

        if !weapon.water_weapon {
            self.main_heading_pos.y = self.main_heading_pos.y.max(Fixed::ZERO);
        }

        let dir1 = weapon.main_dir;
        if dir1 == Vec3Fixed::UP {
            return;
        }
        let dir1 = dir1.normalize2d();
        let dir2 = (self.main_heading_pos - owner.pos).normalize2d();
        if dir2 == Vec3Fixed::ZERO {
            return;
        }

        let heading =
            heading_from_vector(dir2.x, dir2.z).wrapping_sub(heading_from_vector(dir1.x, dir1.z));
        if owner.heading == heading {
            return;
        }

        if !weapon.try_target(owner, self.main_heading_pos) {
            self.progress_state = ProgressState::Active;
        }
    }

    /// Nudge slightly above ground so an unloaded unit does not clip in.
    pub fn leave_transport(&mut self, owner: &Unit) {
        self.old_pos = owner.pos + Vec3Fixed::UP * Fixed::from_num(0.001);
    }

    // ------------------------------------------------------------------
    // path following
    // ------------------------------------------------------------------

    pub(crate) fn follow_path(&mut self, owner: &mut Unit, world: &mut WorldView) -> bool {
        let mut want_reverse = false;

        if self.path_id == 0 {
            self.change_speed(owner, world, Fixed::ZERO, false, false);
            self.set_main_heading(owner, world);
        } else {
            self.prev_way_point_dist = self.curr_way_point_dist;
            self.curr_way_point_dist = owner.pos.distance2d(self.curr_way_point);

            {
                // measured from the unit, not the waypoint: a build-order
                // goal radius is a build range and must not widen
                let cur_goal_dist_sq = (owner.pos - self.goal_pos).sq_length2d();
                let min_goal_dist_sq = self.arrival_radius_sq(owner);

                self.at_goal |= cur_goal_dist_sq < min_goal_dist_sq;
            }

            if !self.at_goal {
                if self.idling {
                    self.num_idling_updates = (self.num_idling_updates + 1).min(HALF_CIRCLE);
                } else {
                    self.num_idling_updates = (self.num_idling_updates - 1).max(0);
                }
            }

            if !self.at_end_of_path {
                self.get_next_way_point(owner, world);
            } else if self.at_goal {
                self.arrived(owner, world);
            }

            // direction to the waypoint AFTER possibly promoting it
            self.waypoint_dir = (self.curr_way_point - owner.pos).normalize2d();

            if self.waypoint_dir.dot(self.flat_front_dir) < Fixed::ZERO {
                want_reverse = self.want_reverse(owner);
            }

            let dir_sign = if want_reverse { -Fixed::ONE } else { Fixed::ONE };
            let raw_wanted_dir = self.waypoint_dir * dir_sign;
            let mod_wanted_dir = self.get_obstacle_avoidance_dir(owner, world, raw_wanted_dir);

            self.change_heading(
                owner,
                world.map,
                heading_from_vector(mod_wanted_dir.x, mod_wanted_dir.z),
            );
            self.change_speed(owner, world, self.max_wanted_speed, want_reverse, false);
        }

        world.planner.update_path(self.path_id);
        want_reverse
    }

    /// Arrival tolerance: widened while a plain move order idles, strict for
    /// everything else.
    fn arrival_radius_sq(&self, owner: &Unit) -> Fixed {
        let r = if owner.commands.head_is_move() {
            self.goal_radius * Fixed::from_num(self.num_idling_slow_updates + 1)
        } else {
            self.goal_radius
        };
        r * r
    }

    pub(crate) fn change_speed(
        &mut self,
        owner: &mut Unit,
        world: &mut WorldView,
        new_wanted_speed: Fixed,
        want_reverse: bool,
        fps_mode: bool,
    ) {
        self.wanted_speed = new_wanted_speed;

        // round low speeds to zero
        if self.wanted_speed <= Fixed::ZERO && self.current_speed < Fixed::from_num(0.01) {
            self.current_speed = Fixed::ZERO;
            self.delta_speed = Fixed::ZERO;
            return;
        }

        let mut target_speed = if want_reverse {
            self.max_reverse_speed
        } else {
            self.max_speed
        };

        // hold still until an actual path arrives; driving blind on queuing
        // lag sends units into cliffs
        if waypoint_pending(self.curr_way_point) && waypoint_pending(self.next_way_point) {
            target_speed = Fixed::ZERO;
        } else if self.wanted_speed > Fixed::ZERO {
            let Some(md) = owner.move_def.as_ref() else {
                self.delta_speed = Fixed::ZERO;
                return;
            };

            // the planner samples only the center square for terrain, so the
            // speed modifier does the same
            let ground_speed_mod = md.pos_speed_mod_dir(world.map, owner.pos, self.flat_front_dir);

            let cur_goal_dist_sq = (owner.pos - self.goal_pos).sq_length2d();
            let braking_dist = self.braking_distance(self.current_speed);
            let min_goal_dist_sq = braking_dist * braking_dist;

            // every move order carries a trailing speed-cap command
            let start_braking =
                owner.commands.len() <= 2 && cur_goal_dist_sq <= min_goal_dist_sq;

            let dir_sign = if self.reversing { -Fixed::ONE } else { Fixed::ONE };
            let waypoint_dif = self.waypoint_dir * dir_sign;
            let turn_delta_heading = owner
                .heading
                .wrapping_sub(heading_from_vector(waypoint_dif.x, waypoint_dif.z));

            if !fps_mode && turn_delta_heading != 0 {
                // auto-adjust speed for turns outside of direct control
                let req_turn_angle = Fixed::from_num(
                    i32::from(owner.heading.wrapping_sub(self.wanted_heading)).abs(),
                ) * Fixed::from_num(180)
                    / Fixed::from_num(HALF_CIRCLE);
                let max_turn_angle =
                    (self.turn_rate / Fixed::from_num(CIRCLE_DIVS)) * Fixed::from_num(360);

                let mut turn_speed = if self.reversing {
                    self.max_reverse_speed
                } else {
                    self.max_speed
                };

                if req_turn_angle != Fixed::ZERO {
                    turn_speed *= (max_turn_angle / req_turn_angle).min(Fixed::ONE);
                }

                if self.waypoint_dir.sq_length() > Fixed::from_num(0.1) {
                    if !owner.data.turn_in_place {
                        target_speed = owner.data.turn_in_place_speed_limit.max(turn_speed);
                    } else if req_turn_angle > owner.data.turn_in_place_angle_limit {
                        target_speed = turn_speed;
                    }
                }

                if self.at_end_of_path && self.turn_rate > Fixed::ZERO {
                    // waypoints are no longer advancing; slow down or the
                    // unit orbits the last one forever
                    let orbit_cap = (self.curr_way_point_dist * pi())
                        / (Fixed::from_num(CIRCLE_DIVS) / self.turn_rate);
                    target_speed = target_speed.min(orbit_cap);
                }
            }

            // raise wantedSpeed only for terrain bonuses (> 1) so the bonus
            // is reachable; penalties stay on targetSpeed alone
            self.wanted_speed *= ground_speed_mod.max(Fixed::ONE);
            target_speed *= ground_speed_mod;
            if start_braking {
                target_speed = Fixed::ZERO;
            }
            target_speed = target_speed.min(self.wanted_speed);
        } else {
            target_speed = Fixed::ZERO;
        }

        self.delta_speed = self.controller.get_delta_speed(
            self.path_id,
            target_speed,
            self.current_speed,
            self.acc_rate,
            self.dec_rate,
            want_reverse,
            self.reversing,
        );
    }

    pub(crate) fn change_heading(&mut self, owner: &mut Unit, map: &HeightMap, wanted: Heading) {
        if self.flying {
            return;
        }
        if owner.transporter.is_some() {
            return;
        }

        self.wanted_heading = wanted;
        let delta =
            self.controller
                .get_delta_heading(self.path_id, wanted, owner.heading, self.turn_rate);
        owner.heading = owner.heading.wrapping_add(delta);

        owner.update_dir_vectors(!owner.data.upright && self.max_speed > Fixed::ZERO, map);

        self.flat_front_dir = owner.frontdir.normalize2d();
    }

    // ------------------------------------------------------------------
    // waypoint management
    // ------------------------------------------------------------------

    pub(crate) fn can_get_next_way_point(&mut self, owner: &mut Unit, world: &mut WorldView) -> bool {
        if self.path_id == 0 {
            return false;
        }
        if !self
            .controller
            .allow_set_temp_goal_position(self.path_id, self.next_way_point)
        {
            return false;
        }

        if !waypoint_pending(self.curr_way_point) && !waypoint_pending(self.next_way_point) {
            let pos = owner.pos;

            if world.planner.path_updated(self.path_id) {
                // the path was revised in place (terrain change) without a
                // new handle; re-sample the pair directly
                let sq = Fixed::from_num(SQUARE_SIZE) * Fixed::from_num(1.25);
                self.curr_way_point = world.planner.next_waypoint(self.path_id, pos, sq);
                self.next_way_point =
                    world.planner.next_waypoint(self.path_id, self.curr_way_point, sq);
            }

            // turning-circle check: take the DIAMETER so the trajectory does
            // not snake between waypoints it can steer through at speed
            let dir_sign = if self.reversing { -Fixed::ONE } else { Fixed::ONE };
            if self.turn_rate > Fixed::ZERO {
                let turn_frames = Fixed::from_num(CIRCLE_DIVS) / self.turn_rate;
                let turn_radius =
                    (owner.speed.length() * turn_frames) / (pi() * Fixed::from_num(2));
                let waypoint_dot = self
                    .waypoint_dir
                    .dot(self.flat_front_dir * dir_sign)
                    .clamp(-Fixed::ONE, Fixed::ONE);

                if self.curr_way_point_dist > turn_radius * Fixed::from_num(2) {
                    return false;
                }
                if self.curr_way_point_dist > Fixed::from_num(SQUARE_SIZE)
                    && waypoint_dot >= Fixed::from_num(0.995)
                {
                    return false;
                }
            }

            {
                // scan the square rectangle between us and the waypoint for
                // anything that would invalidate the segment
                let sq = Fixed::from_num(SQUARE_SIZE);
                let cwp_x: i64 = (self.curr_way_point.x / sq).floor().to_num();
                let cwp_z: i64 = (self.curr_way_point.z / sq).floor().to_num();
                let pos_x: i64 = (pos.x / sq).floor().to_num();
                let pos_z: i64 = (pos.z / sq).floor().to_num();

                let xmin = (cwp_x.min(pos_x) - 1) as i32;
                let xmax = (cwp_x.max(pos_x) + 1) as i32;
                let zmin = (cwp_z.min(pos_z) - 1) as i32;
                let zmax = (cwp_z.max(pos_z) + 1) as i32;

                if let Some(md) = owner.move_def.as_ref() {
                    'scan: for x in xmin..xmax {
                        for z in zmin..zmax {
                            let no_struct_block = !md
                                .square_blocked(world.blocking, x, z, Some(owner.object_id()))
                                .contains(BlockFlags::STRUCTURE);
                            let no_ground_block =
                                md.pos_speed_mod(world.map, pos) >= Fixed::from_num(0.01);

                            if no_struct_block && no_ground_block {
                                continue;
                            }
                            if (pos - self.curr_way_point).sq_length() > sq * sq {
                                return false;
                            }
                            break 'scan;
                        }
                    }
                }
            }

            {
                let cur_goal_dist_sq = (self.curr_way_point - self.goal_pos).sq_length2d();
                let min_goal_dist_sq = self.arrival_radius_sq(owner);

                // trigger Arrived on the next tick, but only off real
                // waypoints
                self.at_end_of_path |= cur_goal_dist_sq < min_goal_dist_sq;
            }

            if self.at_end_of_path {
                self.curr_way_point = self.goal_pos;
                self.next_way_point = self.goal_pos;
                return false;
            }
        }

        true
    }

    pub(crate) fn get_next_way_point(&mut self, owner: &mut Unit, world: &mut WorldView) {
        if self.can_get_next_way_point(owner, world) {
            self.controller
                .set_temp_goal_position(self.path_id, self.next_way_point);

            self.curr_way_point = self.next_way_point;
            self.next_way_point = world.planner.next_waypoint(
                self.path_id,
                self.curr_way_point,
                Fixed::from_num(SQUARE_SIZE) * Fixed::from_num(1.25),
            );
        }

        if waypoint_exhausted(self.next_way_point) {
            self.fail(owner, world);
        } else if let Some(md) = owner.move_def.as_ref() {
            let (cx, cz) = world.map.world_to_square(self.curr_way_point);
            let (nx, nz) = world.map.world_to_square(self.next_way_point);
            let me = Some(owner.object_id());

            let cwp_blocked = md
                .square_blocked(world.blocking, cx, cz, me)
                .contains(BlockFlags::STRUCTURE);
            let nwp_blocked = md
                .square_blocked(world.blocking, nx, nz, me)
                .contains(BlockFlags::STRUCTURE);

            if cwp_blocked || nwp_blocked {
                // a crushed feature can spawn a blocker we cannot crush
                // right on the waypoint
                self.stop_engine(owner, world);
                self.start_engine(owner, world);
            }
        }
    }

    // ------------------------------------------------------------------
    // engine control
    // ------------------------------------------------------------------

    fn get_new_path(&mut self, owner: &mut Unit, world: &mut WorldView) {
        debug_assert!(self.path_id == 0);

        if let Some(md) = owner.move_def.as_ref() {
            self.path_id = world.planner.request_path(
                world.map,
                world.blocking,
                owner.object_id(),
                md,
                owner.pos,
                self.goal_pos,
                self.goal_radius,
            );
        }

        if self.path_id != 0 {
            self.at_goal = false;
            self.at_end_of_path = false;

            let sq = Fixed::from_num(SQUARE_SIZE) * Fixed::from_num(1.25);
            self.curr_way_point = world.planner.next_waypoint(self.path_id, owner.pos, sq);
            self.next_way_point =
                world.planner.next_waypoint(self.path_id, self.curr_way_point, sq);

            let goal = self.goal_pos;
            let cwp = self.curr_way_point;
            self.controller.set_real_goal_position(self.path_id, goal);
            self.controller.set_temp_goal_position(self.path_id, cwp);
        } else {
            self.fail(owner, world);
        }

        // bound the rate of watchdog re-requests
        self.path_request_delay = world.frame + (SLOWUPDATE_RATE << 1);
    }

    pub(crate) fn start_engine(&mut self, owner: &mut Unit, world: &mut WorldView) {
        if self.path_id == 0 && !self.at_goal {
            self.get_new_path(owner, world);

            if self.path_id != 0 {
                world.planner.update_path(self.path_id);
                owner.moving = true;
            }
        }

        self.next_obstacle_avoidance_update = world.frame;
    }

    pub(crate) fn stop_engine(&mut self, owner: &mut Unit, world: &mut WorldView) {
        if self.path_id != 0 {
            world.planner.delete_path(self.path_id);
            self.path_id = 0;

            if !self.at_goal {
                self.curr_way_point = self.here(owner);
            }

            debug!(unit = owner.id, "StopEngine: engine stopped");
        }

        owner.moving = false;
        self.wanted_speed = Fixed::ZERO;
    }

    pub(crate) fn arrived(&mut self, owner: &mut Unit, world: &mut WorldView) {
        if self.progress_state != ProgressState::Active {
            return;
        }

        self.stop_engine(owner, world);
        self.progress_state = ProgressState::Done;

        // the command AI sometimes misses that a unit reached its goal;
        // two waits force its queue to advance
        owner.commands.give(crate::commands::Command::Wait);
        owner.commands.give(crate::commands::Command::Wait);

        if !owner.commands.has_more_move_commands() {
            // arrival may have been indirect (shared goal with a collider);
            // pin the front move order to where we actually stopped
            owner.commands.set_front_move_pos(owner.pos);
        }

        debug!(unit = owner.id, "Arrived: unit arrived");
    }

    /// Re-request the held path after state restoration; planner handles do
    /// not survive a reload.
    pub(crate) fn post_load(&mut self, owner: &mut Unit, world: &mut WorldView) {
        if self.path_id == 0 {
            return;
        }

        world.planner.delete_path(self.path_id);
        self.path_id = 0;

        if let Some(md) = owner.move_def.as_ref() {
            self.path_id = world.planner.request_path(
                world.map,
                world.blocking,
                owner.object_id(),
                md,
                owner.pos,
                self.goal_pos,
                self.goal_radius,
            );
        }

        if self.path_id != 0 {
            let sq = Fixed::from_num(SQUARE_SIZE) * Fixed::from_num(1.25);
            self.curr_way_point = world.planner.next_waypoint(self.path_id, owner.pos, sq);
            self.next_way_point =
                world.planner.next_waypoint(self.path_id, self.curr_way_point, sq);
        }
    }

    pub(crate) fn fail(&mut self, owner: &mut Unit, world: &mut WorldView) {
        debug!(unit = owner.id, "Fail: unit failed");

        self.stop_engine(owner, world);
        self.progress_state = ProgressState::Failed;

        world.events.push(Event::UnitMoveFailed { unit: owner.id });
    }

    // ------------------------------------------------------------------
    // kinematics
    // ------------------------------------------------------------------

    /// Distance covered before stopping from `speed` at full brake.
    #[must_use]
    pub fn braking_distance(&self, speed: Fixed) -> Fixed {
        let rate = if self.reversing {
            self.acc_rate
        } else {
            self.dec_rate
        };
        let rate = rate.max(Fixed::from_num(0.001));
        let time = speed / rate;
        Fixed::from_num(0.5) * rate * time * time
    }

    /// The position a full-brake stop from current velocity ends at.
    #[must_use]
    pub fn here(&self, owner: &Unit) -> Vec3Fixed {
        let dist = self.braking_distance(self.current_speed);
        let sign = if self.reversing { -Fixed::ONE } else { Fixed::ONE };

        owner.pos.flat() + self.flat_front_dir * (dist * sign)
    }

    pub(crate) fn want_reverse(&self, owner: &Unit) -> bool {
        if !self.can_reverse {
            return false;
        }
        // overridable rates can be zeroed out; avoid div0
        if self.max_reverse_speed <= Fixed::ZERO {
            return false;
        }
        if self.max_speed <= Fixed::ZERO {
            return true;
        }
        if self.acc_rate <= Fixed::ZERO || self.dec_rate <= Fixed::ZERO {
            return false;
        }
        if self.turn_rate <= Fixed::ZERO {
            return false;
        }

        // ETA estimates against the final goal
        let waypoint_dif = (self.goal_pos - owner.pos).flat();
        let waypoint_dist = waypoint_dif.length();
        let waypoint_fwd_eta = waypoint_dist / self.max_speed;
        let waypoint_rev_eta = waypoint_dist / self.max_reverse_speed;

        let turn_angle = Fixed::from_num(
            i32::from(
                heading_from_vector(self.waypoint_dir.x, self.waypoint_dir.z)
                    .wrapping_sub(owner.heading),
            )
            .abs(),
        );
        let rev_angle = Fixed::from_num(HALF_CIRCLE) - turn_angle;

        // acceleration starts before the turn completes
        let turn_time_mod = Fixed::from_num(5);
        let turn_angle_time = (turn_angle / self.turn_rate - turn_time_mod).max(Fixed::ZERO);
        let rev_angle_time = (rev_angle / self.turn_rate - turn_time_mod).max(Fixed::ZERO);

        let braking = Fixed::from_num(0.125);
        let apx_speed_after_turn =
            (self.current_speed - braking * (turn_angle_time * self.dec_rate)).max(Fixed::ZERO);
        let apx_rev_spd_after_turn =
            (self.current_speed - braking * (rev_angle_time * self.dec_rate)).max(Fixed::ZERO);

        let (rev_bit, fwd_bit) = if self.reversing {
            (Fixed::ONE, Fixed::ZERO)
        } else {
            (Fixed::ZERO, Fixed::ONE)
        };

        let dec_time = (rev_bit * apx_speed_after_turn) / self.dec_rate;
        let rev_dec_time = (fwd_bit * apx_rev_spd_after_turn) / self.dec_rate;
        let acc_time = (self.max_speed - fwd_bit * apx_speed_after_turn) / self.acc_rate;
        let rev_acc_time = (self.max_reverse_speed - rev_bit * apx_rev_spd_after_turn) / self.acc_rate;

        let fwd_eta = waypoint_fwd_eta + turn_angle_time + acc_time + dec_time;
        let rev_eta = waypoint_rev_eta + rev_angle_time + rev_dec_time + rev_acc_time;

        fwd_eta > rev_eta
    }

    // ------------------------------------------------------------------
    // terrain coupling
    // ------------------------------------------------------------------

    pub(crate) fn on_slope(&self, owner: &Unit, map: &HeightMap, min_slide_tolerance: Fixed) -> bool {
        let Some(md) = owner.move_def.as_ref() else {
            return false;
        };

        if owner.data.slide_tolerance < min_slide_tolerance {
            return false;
        }
        if owner.data.float_on_water && owner.in_water() {
            return false;
        }
        if !map.in_bounds(owner.pos) {
            return false;
        }

        // a zero tolerance threshold means the raw slope limit applies, so
        // a stopped unit is not teleported off a legal path square
        let ground_slope = map.slope(owner.pos.x, owner.pos.z);
        let unit_slope = md.max_slope
            * if min_slide_tolerance <= Fixed::ZERO {
                Fixed::ONE
            } else {
                owner.data.slide_tolerance
            };

        ground_slope > unit_slope
    }

    pub(crate) fn ground_normal(&self, owner: &Unit, map: &HeightMap) -> Vec3Fixed {
        if owner.in_water() && owner.data.float_on_water {
            return Vec3Fixed::UP;
        }
        map.normal(owner.pos.x, owner.pos.z)
    }

    pub(crate) fn ground_height_at(&self, owner: &Unit, map: &HeightMap, pos: Vec3Fixed) -> Fixed {
        if owner.data.float_on_water {
            let h = map.height_above_water(pos.x, pos.z);
            if h <= Fixed::ZERO {
                h - owner.data.waterline
            } else {
                h
            }
        } else {
            map.height_real(pos.x, pos.z)
        }
    }

    pub(crate) fn adjust_pos_to_water_line(
        &mut self,
        owner: &mut Unit,
        map: &HeightMap,
        mod_info: &ModInfo,
    ) {
        if owner.falling {
            return;
        }
        if self.flying {
            return;
        }

        if mod_info.allow_ground_unit_gravity {
            let terrain = map.height_real(owner.pos.x, owner.pos.z);
            if owner.data.float_on_water {
                owner.set_height(terrain.max(-owner.data.waterline));
            } else {
                owner.set_height(terrain.max(owner.pos.y));
            }
        } else {
            let h = self.ground_height_at(owner, map, owner.pos);
            owner.set_height(h);
        }
    }

    /// Next-frame velocity from the current one plus accelerations.
    pub(crate) fn get_new_speed_vector(
        &self,
        owner: &mut Unit,
        map: &HeightMap,
        mod_info: &ModInfo,
        h_acc: Fixed,
        v_acc: Fixed,
    ) -> Vec3Fixed {
        if !mod_info.allow_ground_unit_gravity {
            // velocity may have been overridden externally; derive the
            // scalar from the vector, not from current_speed
            let speed_sign = if self.reversing { -Fixed::ONE } else { Fixed::ONE };
            let speed_scale = owner.speed.length() * speed_sign + h_acc;
            return owner.frontdir * speed_scale;
        }

        let next_pos = owner.pos + owner.speed;
        let apply_gravity =
            (owner.pos.y + owner.speed.y) >= self.ground_height_at(owner, map, next_pos);

        let in_air =
            (owner.pos.y - self.ground_height_at(owner, map, owner.pos)) > Fixed::ONE;

        // the drag terms guarantee decay when wanted and delta speed are 0
        let drag_coeff = if in_air {
            Fixed::from_num(0.9999)
        } else {
            Fixed::from_num(0.99)
        };
        let slip_coeff = if in_air {
            Fixed::from_num(0.9999)
        } else {
            Fixed::from_num(0.95)
        };

        // terrain-tangent vector; unlike frontdir it ignores `upright`
        let gnd_norm_vec = self.ground_normal(owner, map);
        let gnd_tang_vec = gnd_norm_vec.cross(owner.rightdir);
        let flat_speed = owner.speed.flat();

        // never drop below terrain
        owner.speed.y = if apply_gravity {
            owner.speed.dot(Vec3Fixed::UP)
        } else {
            gnd_tang_vec.y * owner.speed.dot(gnd_tang_vec)
        };

        let hover_strafing = owner
            .move_def
            .as_ref()
            .is_some_and(|md| md.family == crate::move_def::MoveFamily::Hover)
            && mod_info.allow_hover_unit_strafing;

        let mut speed_vector = Vec3Fixed::ZERO;
        if !hover_strafing {
            let accel_vec = gnd_tang_vec * h_acc + Vec3Fixed::UP * v_acc;
            let speed_vec = owner.speed + accel_vec;

            speed_vector += (self.flat_front_dir * speed_vec.dot(self.flat_front_dir)) * drag_coeff;
            speed_vector += Vec3Fixed::UP * speed_vec.dot(Vec3Fixed::UP);
        } else {
            let tang_speed = owner.speed.dot(gnd_tang_vec);
            speed_vector += (gnd_tang_vec * (tang_speed + h_acc).max(Fixed::ZERO)) * drag_coeff;
            speed_vector += (flat_speed - gnd_tang_vec * tang_speed) * slip_coeff;
            speed_vector +=
                Vec3Fixed::UP * (owner.speed + Vec3Fixed::UP * v_acc).dot(Vec3Fixed::UP);
        }

        speed_vector
    }

    pub(crate) fn update_owner_pos(&mut self, owner: &mut Unit, world: &mut WorldView) {
        let speed_vector =
            self.get_new_speed_vector(owner, world.map, world.mod_info, self.delta_speed, world.map.gravity());

        // nanoframes sit slightly off the ground and would jitter under
        // gravity; they cannot move anyway
        if owner.being_built {
            return;
        }

        if speed_vector != Vec3Fixed::ZERO {
            // simple Euler step; structure blockage and impassable terrain
            // entered sideways are the collision handler's problem
            owner.speed = speed_vector;
            owner.move_by(speed_vector);

            if let Some(md) = owner.move_def.as_ref() {
                if !md.test_move_pos(world.map, owner.pos) {
                    owner.move_by(-speed_vector);
                }
            }
        }

        self.reversing = speed_vector.dot(self.flat_front_dir) < Fixed::ZERO;
        self.current_speed = speed_vector.dot(self.flat_front_dir).abs();
        self.delta_speed = Fixed::ZERO;

        debug_assert!(self.current_speed < Fixed::from_num(1_000_000));
    }

    // ------------------------------------------------------------------
    // direct control and in-place aiming
    // ------------------------------------------------------------------

    pub(crate) fn update_direct_control(&mut self, owner: &mut Unit, world: &mut WorldView) -> bool {
        let con = owner.fps_control.unwrap_or_default();
        let want_reverse = con.back && !con.forward;

        // project the working waypoint ahead along (or behind) the facing
        let project = if want_reverse {
            Fixed::from_num(-100)
        } else {
            Fixed::from_num(100)
        };
        let projected = owner.pos + owner.frontdir * project;
        self.curr_way_point = world.map.clamp_in_bounds(projected).flat();

        if con.forward {
            self.change_speed(owner, world, self.max_speed, want_reverse, true);
            owner.moving = true;
        } else if con.back {
            self.change_speed(owner, world, self.max_reverse_speed, want_reverse, true);
            owner.moving = true;
        } else {
            self.change_speed(owner, world, Fixed::ZERO, false, true);
            owner.moving = false;
        }

        let turn_step = self.turn_rate.round().to_num::<i64>().clamp(0, 32767) as i16;
        if con.left {
            let wanted = owner.heading.wrapping_add(turn_step);
            self.change_heading(owner, world.map, wanted);
        }
        if con.right {
            let wanted = owner.heading.wrapping_sub(turn_step);
            self.change_heading(owner, world.map, wanted);
        }

        want_reverse
    }

    /// Turn in place so the main weapon's arc includes the held target.
    pub(crate) fn set_main_heading(&mut self, owner: &mut Unit, world: &mut WorldView) {
        if !self.use_main_heading {
            return;
        }
        let Some(weapon) = owner.weapon else {
            return;
        };

        let dir1 = weapon.main_dir.normalize2d();
        let dir2 = (self.main_heading_pos - owner.pos).normalize2d();
        if dir2 == Vec3Fixed::ZERO {
            return;
        }

        let new_heading =
            heading_from_vector(dir2.x, dir2.z).wrapping_sub(heading_from_vector(dir1.x, dir1.z));

        if self.progress_state == ProgressState::Active {
            if owner.heading == new_heading {
                owner.moving = false;
                self.progress_state = ProgressState::Done;
            } else {
                self.change_heading(owner, world.map, new_heading);
            }
        } else if owner.heading != new_heading
            && !weapon.try_target(owner, self.main_heading_pos)
        {
            self.progress_state = ProgressState::Active;
            owner.moving = true;
            self.change_heading(owner, world.map, new_heading);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::UnitData;

    fn test_unit() -> Unit {
        Unit::new(
            Vec3Fixed::from_ints(100, 0, 100),
            UnitData::default(),
            Some(crate::move_def::MoveDef::new(
                crate::move_def::MoveFamily::Tank,
                2,
                2,
            )),
        )
    }

    #[test]
    fn test_new_mover_is_done_without_path() {
        let unit = test_unit();
        let mover = GroundMover::new(&unit);
        assert_eq!(mover.progress_state(), ProgressState::Done);
        assert_eq!(mover.path_id(), 0);
        assert_eq!(mover.wanted_speed(), Fixed::ZERO);
    }

    #[test]
    fn test_braking_distance_quadratic() {
        let unit = test_unit();
        let mover = GroundMover::new(&unit);

        let d1 = mover.braking_distance(Fixed::from_num(1));
        let d2 = mover.braking_distance(Fixed::from_num(2));
        // doubling the speed quadruples the stopping distance
        assert!((d2 - d1 * Fixed::from_num(4)).abs() < Fixed::from_num(0.001));
    }

    #[test]
    fn test_here_projects_along_facing() {
        let unit = test_unit();
        let mut mover = GroundMover::new(&unit);
        mover.current_speed = Fixed::from_num(3);

        let stop = mover.here(&unit);
        assert!(stop.z > unit.pos.z);
        assert_eq!(stop.y, Fixed::ZERO);
    }

    #[test]
    fn test_want_reverse_needs_reverse_speed() {
        let unit = test_unit();
        let mover = GroundMover::new(&unit);
        assert!(!mover.want_reverse(&unit));
    }

    #[test]
    fn test_want_reverse_for_goal_behind() {
        let mut unit = test_unit();
        unit.data.max_reverse_speed = unit.data.max_speed;
        let mut mover = GroundMover::new(&unit);
        mover.can_reverse = true;
        mover.max_reverse_speed = unit.data.max_speed;

        // goal directly behind, waypoint direction anti-parallel to facing
        mover.goal_pos = unit.pos - Vec3Fixed::from_ints(0, 0, 50);
        mover.waypoint_dir = Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, -Fixed::ONE);

        assert!(mover.want_reverse(&unit));
    }

    #[test]
    fn test_on_slope_needs_tolerance() {
        let map = HeightMap::from_fn(32, 32, |cx, _| Fixed::from_num(cx * 8));
        let mut unit = test_unit();
        let mover = GroundMover::new(&unit);

        assert!(!mover.on_slope(&unit, &map, Fixed::ONE));

        unit.data.slide_tolerance = Fixed::from_num(1.5);
        assert!(mover.on_slope(&unit, &map, Fixed::ONE));
    }
}
