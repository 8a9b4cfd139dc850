//! Short-horizon obstacle avoidance steering.
//!
//! Before hard collision resolution ever engages, the desired waypoint
//! direction is bent around nearby solids: each relevant neighbor
//! contributes a lateral component in the mover's frame, anti-parallel
//! encounters are forced to agree on a side, and the result is blended and
//! temporally smoothed so the steering never oscillates.

use crate::blocking::ObjectId;
use crate::locomotion::{GroundMover, WorldView, GAME_SPEED};
use crate::math::{fixed_sqrt, Fixed, Vec3Fixed};
use crate::move_def::footprint_radius;
use crate::unit::{PhysicalState, Unit};

/// Neighbor attributes the steering filter cares about.
struct Avoidee {
    pos: Vec3Fixed,
    speed: Vec3Fixed,
    frontdir: Vec3Fixed,
    rightdir: Vec3Fixed,
    mass: Fixed,
    radius: Fixed,
    physical_state: PhysicalState,
    blocking: bool,
    crushable: bool,
    crush_resistance: Fixed,
    mobile: bool,
    movable: bool,
    is_moving: bool,
    ally_team: Option<u8>,
}

impl GroundMover {
    /// Blend the desired direction with per-neighbor lateral responses.
    pub(crate) fn get_obstacle_avoidance_dir(
        &mut self,
        owner: &Unit,
        world: &mut WorldView,
        desired_dir: Vec3Fixed,
    ) -> Vec3Fixed {
        // only meaningful while the unit wants to move somewhere
        if self.path_id == 0 {
            return Vec3Fixed::ZERO;
        }

        if world.frame < self.next_obstacle_avoidance_update {
            return self.last_avoidance_dir;
        }

        self.last_avoidance_dir = desired_dir;
        self.next_obstacle_avoidance_update = world.frame + 1;

        // facing anti-parallel to the desired direction: stay out of the
        // way of normal waypoint steering or the two fight over the turn
        if owner.frontdir.dot(desired_dir) < Fixed::ZERO {
            return self.last_avoidance_dir;
        }

        let desired_dir_weight = Fixed::from_num(0.5);
        // cos(120°); anything further off-center is not in our way
        let max_avoidee_cosine = Fixed::from_num(-0.5);
        let last_dir_mix_alpha = Fixed::from_num(0.7);

        let Some(avoider_md) = owner.move_def.as_ref() else {
            return desired_dir;
        };

        let avoidance_radius =
            self.current_speed.max(Fixed::ONE) * (owner.radius * Fixed::from_num(2));
        let avoider_radius = footprint_radius(avoider_md.xsize, avoider_md.zsize, Fixed::ONE);

        let mut avoidance_vec = Vec3Fixed::ZERO;

        let solids = world
            .spatial
            .solids_exact(owner.pos, avoidance_radius, world.units, world.features);

        for obj in solids {
            let avoidee = match obj {
                ObjectId::Unit(uid) => {
                    let Some(u) = world.units.get(uid) else { continue };
                    Avoidee {
                        pos: u.pos,
                        speed: u.speed,
                        frontdir: u.frontdir,
                        rightdir: u.rightdir,
                        mass: u.mass,
                        radius: u
                            .move_def
                            .as_ref()
                            .map_or(footprint_radius(u.xsize, u.zsize, Fixed::ONE), |md| {
                                footprint_radius(md.xsize, md.zsize, Fixed::ONE)
                            }),
                        physical_state: u.physical_state,
                        blocking: u.blocking,
                        crushable: u.data.crushable,
                        crush_resistance: u.data.crush_resistance,
                        mobile: u.move_def.is_some(),
                        movable: !u.data.push_resistant,
                        is_moving: u.moving,
                        ally_team: Some(u.ally_team),
                    }
                }
                ObjectId::Feature(fid) => {
                    let Some(f) = world.features.get(fid) else { continue };
                    Avoidee {
                        pos: f.pos,
                        speed: f.speed,
                        frontdir: Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::ONE),
                        rightdir: Vec3Fixed::new(-Fixed::ONE, Fixed::ZERO, Fixed::ZERO),
                        mass: f.mass,
                        radius: footprint_radius(f.xsize, f.zsize, Fixed::ONE),
                        physical_state: PhysicalState::OnGround,
                        blocking: f.blocking,
                        crushable: f.crushable,
                        crush_resistance: f.crush_resistance,
                        mobile: false,
                        movable: false,
                        is_moving: f.is_moving,
                        ally_team: None,
                    }
                }
            };

            if matches!(
                avoidee.physical_state,
                PhysicalState::Hovering | PhysicalState::Flying
            ) {
                continue;
            }
            if avoider_md.is_non_blocking(avoidee.blocking, avoidee.physical_state) {
                continue;
            }
            // crushable-by-us obstacles are not obstacles
            if avoider_md.can_crush(avoidee.crushable, avoidee.crush_resistance) {
                continue;
            }

            let avoidee_vector = (owner.pos + owner.speed) - (avoidee.pos + avoidee.speed);
            let avoidance_radius_sum = avoider_radius + avoidee.radius;
            let avoidance_mass_sum = owner.mass + avoidee.mass;
            let avoidee_mass_scale = if avoidee.mobile {
                avoidee.mass / avoidance_mass_sum
            } else {
                Fixed::ONE
            };
            let avoidee_dist_sq = avoidee_vector.sq_length();
            let avoidee_dist = fixed_sqrt(avoidee_dist_sq) + Fixed::from_num(0.01);

            // idling mobiles get shoved aside by collision handling anyway
            if avoidee.mobile && avoidee.movable {
                let idling_ally =
                    !avoidee.is_moving && avoidee.ally_team == Some(owner.ally_team);
                if !avoider_md.avoid_mobiles_on_path || idling_ally {
                    continue;
                }
            }

            // dropping far-off-center objects too eagerly makes this flag
            // flap from tick to tick and the steering oscillate
            if owner.frontdir.dot(-(avoidee_vector / avoidee_dist)) < max_avoidee_cosine {
                continue;
            }

            let reach = self.current_speed.max(Fixed::ONE) * Fixed::from_num(GAME_SPEED)
                + avoidance_radius_sum;
            if avoidee_dist_sq >= reach * reach {
                continue;
            }
            if avoidee_dist_sq >= owner.pos.distance_sq2d(self.goal_pos) {
                continue;
            }

            let mut avoider_turn_sign = if (avoidee.pos.dot(owner.rightdir)
                - owner.pos.dot(owner.rightdir))
                <= Fixed::ZERO
            {
                Fixed::ONE
            } else {
                -Fixed::ONE
            };
            let avoidee_turn_sign = if (owner.pos.dot(avoidee.rightdir)
                - avoidee.pos.dot(avoidee.rightdir))
                <= Fixed::ZERO
            {
                Fixed::ONE
            } else {
                -Fixed::ONE
            };

            // response peaks when the parties face each other head-on
            let mobile_bit = if avoidee.mobile { Fixed::ONE } else { Fixed::ZERO };
            let avoidance_cos_angle = owner
                .frontdir
                .dot(avoidee.frontdir)
                .clamp(-Fixed::ONE, Fixed::ONE);
            let avoidance_response =
                (Fixed::ONE - avoidance_cos_angle * mobile_bit) + Fixed::from_num(0.1);
            let avoidance_fall_off = Fixed::ONE
                - (avoidee_dist / (Fixed::from_num(5) * avoidance_radius_sum)).min(Fixed::ONE);

            // anti-parallel parties must turn the same local-space way or
            // they dodge into each other
            if avoidance_cos_angle < Fixed::ZERO {
                avoider_turn_sign = avoider_turn_sign.max(avoidee_turn_sign);
            }

            let avoidance_dir = owner.rightdir * avoider_turn_sign;
            avoidance_vec +=
                avoidance_dir * (avoidance_response * avoidance_fall_off * avoidee_mass_scale);
        }

        // weighted combination with the desired direction, then linear
        // smoothing against the previous tick's result
        let mut avoidance_dir = (desired_dir * desired_dir_weight + avoidance_vec).normalize();
        avoidance_dir = self.last_avoidance_dir * last_dir_mix_alpha
            + avoidance_dir * (Fixed::ONE - last_dir_mix_alpha);

        self.last_avoidance_dir = avoidance_dir;
        avoidance_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::BlockingMap;
    use crate::config::ModInfo;
    use crate::events::Event;
    use crate::features::FeatureArena;
    use crate::map::HeightMap;
    use crate::path::GridPlanner;
    use crate::rng::SyncedRng;
    use crate::spatial::SpatialGrid;
    use crate::unit::{Unit, UnitArena, UnitData};

    struct Fixture {
        map: HeightMap,
        blocking: BlockingMap,
        spatial: SpatialGrid,
        planner: GridPlanner,
        units: UnitArena,
        features: FeatureArena,
        movers: Vec<Option<GroundMover>>,
        events: Vec<Event>,
        rng: SyncedRng,
        mod_info: ModInfo,
    }

    impl Fixture {
        fn new() -> Self {
            let map = HeightMap::flat(64, 64, Fixed::ZERO);
            let blocking = BlockingMap::new(&map);
            let spatial = SpatialGrid::new(&map);
            Self {
                map,
                blocking,
                spatial,
                planner: GridPlanner::new(),
                units: UnitArena::new(),
                features: FeatureArena::new(),
                movers: Vec::new(),
                events: Vec::new(),
                rng: SyncedRng::new(3),
                mod_info: ModInfo::default(),
            }
        }

        fn world(&mut self, frame: u64) -> WorldView<'_> {
            WorldView {
                frame,
                map: &self.map,
                blocking: &mut self.blocking,
                spatial: &self.spatial,
                planner: &mut self.planner,
                units: &mut self.units,
                features: &mut self.features,
                movers: &mut self.movers,
                events: &mut self.events,
                rng: &mut self.rng,
                mod_info: &self.mod_info,
            }
        }
    }

    fn tank_at(x: i32, z: i32) -> Unit {
        Unit::new(
            Vec3Fixed::from_ints(x, 0, z),
            UnitData::default(),
            Some(crate::move_def::MoveDef::new(
                crate::move_def::MoveFamily::Tank,
                2,
                2,
            )),
        )
    }

    #[test]
    fn test_no_path_means_no_steering() {
        let mut fx = Fixture::new();
        let owner = tank_at(200, 200);
        let mut mover = GroundMover::new(&owner);

        let mut world = fx.world(10);
        let dir = mover.get_obstacle_avoidance_dir(
            &owner,
            &mut world,
            Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::ONE),
        );
        assert_eq!(dir, Vec3Fixed::ZERO);
    }

    #[test]
    fn test_empty_surroundings_keep_desired_dir() {
        let mut fx = Fixture::new();
        let owner = tank_at(200, 200);
        let mut mover = GroundMover::new(&owner);
        mover.path_id = 1;
        mover.goal_pos = Vec3Fixed::from_ints(200, 0, 400);

        let desired = Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::ONE);
        // prime the smoothing history, then steer
        let mut world = fx.world(10);
        let _ = mover.get_obstacle_avoidance_dir(&owner, &mut world, desired);
        let mut world = fx.world(11);
        let dir = mover.get_obstacle_avoidance_dir(&owner, &mut world, desired);

        assert!(dir.dot(desired) > Fixed::from_num(0.95));
    }

    #[test]
    fn test_head_on_pair_turns_same_local_side() {
        let mut fx = Fixture::new();

        // a facing +z at z=200, b facing -z at z=230
        let a = tank_at(200, 200);
        let mut b = tank_at(200, 230);
        b.heading = i16::MIN;
        b.update_dir_vectors(false, &fx.map);
        b.moving = true;
        let _bid = fx.units.insert(b.clone());
        fx.movers.push(Some(GroundMover::new(&b)));
        fx.spatial.rebuild(&fx.units, &fx.features);

        let mut mover_a = GroundMover::new(&a);
        mover_a.path_id = 1;
        mover_a.current_speed = Fixed::from_num(2);
        mover_a.goal_pos = Vec3Fixed::from_ints(200, 0, 400);

        let desired_a = Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::ONE);
        let dir_a = {
            let mut world = fx.world(10);
            mover_a.get_obstacle_avoidance_dir(&a, &mut world, desired_a)
        };

        // now the mirrored query from b's side, against a
        fx.units.remove(0);
        let _aid2 = fx.units.insert(a.clone());
        fx.spatial.rebuild(&fx.units, &fx.features);

        let mut mover_b = GroundMover::new(&b);
        mover_b.path_id = 2;
        mover_b.current_speed = Fixed::from_num(2);
        mover_b.goal_pos = Vec3Fixed::from_ints(200, 0, 0);

        let desired_b = Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, -Fixed::ONE);
        let dir_b = {
            let mut world = fx.world(10);
            mover_b.get_obstacle_avoidance_dir(&b, &mut world, desired_b)
        };

        // both deflections point to the same local side: the x components
        // in each unit's own frame have the same sign
        let local_a = dir_a.dot(a.rightdir);
        let local_b = dir_b.dot(b.rightdir);
        assert!(local_a != Fixed::ZERO, "a did not deflect");
        assert!(local_b != Fixed::ZERO, "b did not deflect");
        assert_eq!(local_a > Fixed::ZERO, local_b > Fixed::ZERO);
    }

    #[test]
    fn test_throttled_to_one_update_per_frame() {
        let mut fx = Fixture::new();
        let owner = tank_at(200, 200);
        let mut mover = GroundMover::new(&owner);
        mover.path_id = 1;
        mover.goal_pos = Vec3Fixed::from_ints(200, 0, 400);

        let desired = Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::ONE);
        let first = {
            let mut world = fx.world(20);
            mover.get_obstacle_avoidance_dir(&owner, &mut world, desired)
        };
        // same frame again: cached result, no recompute
        let second = {
            let mut world = fx.world(20);
            mover.get_obstacle_avoidance_dir(&owner, &mut world, desired)
        };
        assert_eq!(first, second);
    }
}
