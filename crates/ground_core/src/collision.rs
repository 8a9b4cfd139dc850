//! Contact resolution between a moving unit and everything solid.
//!
//! Runs every tick after position integration: mobile neighbors get a
//! mass-and-momentum-weighted bilateral push, static obstacles and blocked
//! squares get a strafe-plus-bounce response, and anything soft enough under
//! a heavy mover gets crushed. Every push is gated by a passability test so
//! no party ends up on terrain it cannot leave.

use crate::blocking::{BlockFlags, ObjectId};
use crate::events::Event;
use crate::locomotion::{GroundMover, ProgressState, WorldView};
use crate::map::SQUARE_SIZE;
use crate::math::{Fixed, Vec3Fixed};
use crate::move_def::{footprint_radius, MoveDef};
use crate::unit::Unit;

/// The static party of a static-object collision.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StaticCollidee {
    pos: Vec3Fixed,
    xsize: i32,
    zsize: i32,
}

fn sign_of(cond: bool) -> Fixed {
    if cond {
        Fixed::ONE
    } else {
        -Fixed::ONE
    }
}

impl GroundMover {
    /// Full per-tick contact pass, ending with footprint re-registration.
    pub(crate) fn handle_object_collisions(&mut self, owner: &mut Unit, world: &mut WorldView) {
        if let Some(md) = owner.move_def.clone() {
            // the mobile footprint radius: 0.75·√2 ≈ 1, a circle maximally
            // bounded by the footprint square
            let collider_speed = owner.speed.length();
            let collider_radius = footprint_radius(md.xsize, md.zsize, Fixed::from_num(0.75));

            self.handle_unit_collisions(owner, world, collider_speed, collider_radius, &md);
            self.handle_feature_collisions(owner, world, collider_speed, collider_radius, &md);

            let own_box = StaticCollidee {
                pos: owner.pos,
                xsize: owner.xsize,
                zsize: owner.zsize,
            };
            self.handle_static_object_collision(
                owner,
                world,
                &md,
                collider_radius,
                Fixed::ZERO,
                Vec3Fixed::ZERO,
                own_box,
                true,
                false,
                true,
            );
        }

        if owner.blocking && owner.transporter.is_none() && !self.flying {
            let (fx, fz) = owner.footprint();
            world.blocking.block(
                owner.object_id(),
                BlockFlags::MOVING,
                owner.pos,
                fx,
                fz,
                owner.data.crushable,
                owner.data.crush_resistance,
            );
        }
    }

    pub(crate) fn handle_unit_collisions(
        &mut self,
        owner: &mut Unit,
        world: &mut WorldView,
        collider_speed: Fixed,
        collider_radius: Fixed,
        md: &MoveDef,
    ) {
        let search_radius = collider_speed.max(Fixed::ONE) * collider_radius;
        let near_units = world.spatial.units_exact(owner.pos, search_radius, world.units);

        let dir_sign = if self.reversing { -Fixed::ONE } else { Fixed::ONE };
        let crush_impulse = owner.speed * (owner.mass * dir_sign);

        for cid in near_units {
            let Some(collidee) = world.units.get(cid).cloned() else {
                continue;
            };

            let collidee_mobile = collidee.move_def.is_some();
            let collidee_speed = collidee.speed.length();
            let collidee_radius = collidee.radius;

            let separation = owner.pos - collidee.pos;
            let min_dist = collider_radius + collidee_radius;
            if separation.sq_length() - min_dist * min_dist > Fixed::from_num(0.01) {
                continue;
            }

            let (cm_skidding, cm_flying, cm_progress, cm_goal) = world
                .movers
                .get(cid as usize)
                .and_then(Option::as_ref)
                .map_or((false, false, ProgressState::Done, Vec3Fixed::ZERO), |m| {
                    (m.skidding, m.flying, m.progress_state, m.goal_pos)
                });
            if cm_skidding || cm_flying {
                continue;
            }

            // no contact inside a transporter relationship
            if owner.transporter == Some(cid) {
                continue;
            }
            if collidee.transporter.is_some() {
                continue;
            }
            if owner.loading_transport == Some(cid) {
                continue;
            }
            if collidee.loading_transport == Some(owner.id) {
                continue;
            }

            let allied = owner.ally_team == collidee.ally_team;
            let collidee_yields = owner.moving && !collidee.moving;
            let ignore_collidee = collidee_yields && allied;

            let mut push_collider = true;
            let mut push_collidee = collidee_mobile;
            push_collider &= allied
                || world.mod_info.allow_pushing_enemy_units
                || !owner.block_enemy_pushing;
            push_collidee &= allied
                || world.mod_info.allow_pushing_enemy_units
                || !collidee.block_enemy_pushing;
            push_collider &= !owner.being_built
                && !owner.using_script_move_type
                && !owner.data.push_resistant;
            push_collidee &= !collidee.being_built
                && !collidee.using_script_move_type
                && !collidee.data.push_resistant;

            let mut crush_collidee = !allied || world.mod_info.allow_crushing_allied_units;
            crush_collidee &= (collider_speed * owner.mass) > (collidee_speed * collidee.mass);

            if md.is_non_blocking(collidee.blocking, collidee.physical_state) {
                continue;
            }
            if let Some(collidee_md) = collidee.move_def.as_ref() {
                if collidee_md.is_non_blocking(owner.blocking, owner.physical_state) {
                    continue;
                }
            }

            if crush_collidee && md.can_crush(collidee.data.crushable, collidee.data.crush_resistance)
            {
                if let Some(c) = world.units.get_mut(cid) {
                    c.kill(crush_impulse);
                }
            }

            if self.controller.ignore_collision(owner.id, ObjectId::Unit(cid)) {
                continue;
            }

            world.events.push(Event::UnitUnitCollision {
                collider: owner.id,
                collidee: cid,
            });

            if (!collidee_mobile && !collidee.is_air_unit) || (!push_collider && !push_collidee) {
                // a building (axis-aligned, possibly yard-mapped) or a pair
                // too stubborn to push; treat as a static obstacle
                let collidee_box = StaticCollidee {
                    pos: collidee.pos,
                    xsize: collidee.xsize,
                    zsize: collidee.zsize,
                };
                self.handle_static_object_collision(
                    owner,
                    world,
                    md,
                    collider_radius,
                    collidee_radius,
                    separation,
                    collidee_box,
                    world.frame > self.path_request_delay,
                    collidee.is_factory,
                    false,
                );
                continue;
            }

            // a collidee parked on our shared goal wins the spot; declare
            // arrival instead of fighting a pushing contest
            if (self.goal_pos - cm_goal).sq_length2d() < Fixed::from_num(2)
                && owner.moving
                && self.progress_state == ProgressState::Active
                && !collidee.moving
                && cm_progress == ProgressState::Done
                && collidee.commands.is_empty()
            {
                self.at_end_of_path = true;
                self.at_goal = true;
            }

            let radius_sum = collider_radius + collidee_radius;
            let collider_rel_radius = collider_radius / radius_sum;
            let collidee_rel_radius = collidee_radius / radius_sum;
            let collision_radius_sum = if world.mod_info.allow_unit_collision_overlap {
                collider_radius * collider_rel_radius + collidee_radius * collidee_rel_radius
            } else {
                radius_sum
            };

            let sep_distance = separation.length() + Fixed::from_num(0.1);
            let pen_distance = (collision_radius_sum - sep_distance).max(Fixed::ONE);
            let sep_response =
                (pen_distance * Fixed::from_num(0.5)).min(Fixed::from_num(SQUARE_SIZE * 2));

            let sep_direction = separation / sep_distance;
            let col_response_vec = sep_direction.flat() * sep_response;

            let m1 = owner.mass;
            let m2 = collidee.mass;
            let v1 = collider_speed.max(Fixed::ONE);
            let v2 = collidee_speed.max(Fixed::ONE);
            // head-on contacts respond harder than glancing ones
            let c1 = Fixed::ONE
                + (Fixed::ONE - owner.frontdir.dot(-sep_direction).abs()) * Fixed::from_num(5);
            let c2 = Fixed::ONE
                + (Fixed::ONE - collidee.frontdir.dot(sep_direction).abs()) * Fixed::from_num(5);
            let s1 = m1 * v1 * c1;
            let s2 = m2 * v2 * c2;
            let r1 = s1 / (s1 + s2 + Fixed::ONE);
            let r2 = s2 / (s1 + s2 + Fixed::ONE);

            // far from a realistic treatment, but it works
            let overlap_scale_collider = if world.mod_info.allow_unit_collision_overlap {
                Fixed::ONE / collider_rel_radius
            } else {
                Fixed::ONE
            };
            let overlap_scale_collidee = if world.mod_info.allow_unit_collision_overlap {
                Fixed::ONE / collidee_rel_radius
            } else {
                Fixed::ONE
            };
            let collider_mass_scale = (Fixed::ONE - r1)
                .clamp(Fixed::from_num(0.01), Fixed::from_num(0.99))
                * overlap_scale_collider;
            let collidee_mass_scale = (Fixed::ONE - r2)
                .clamp(Fixed::from_num(0.01), Fixed::from_num(0.99))
                * overlap_scale_collidee;

            let collider_slide_sign = sign_of(separation.dot(owner.rightdir) >= Fixed::ZERO);
            let collidee_slide_sign = sign_of(-separation.dot(collidee.rightdir) >= Fixed::ZERO);

            let ignore_scale = if ignore_collidee { Fixed::ZERO } else { Fixed::ONE };
            let collider_push_vec = col_response_vec * (collider_mass_scale * ignore_scale);
            let collidee_push_vec = -col_response_vec * collidee_mass_scale;
            // the tangential slide breaks symmetric deadlocks
            let collider_slide_vec =
                owner.rightdir * (collider_slide_sign * (Fixed::ONE / pen_distance) * r2);
            let collidee_slide_vec =
                collidee.rightdir * (collidee_slide_sign * (Fixed::ONE / pen_distance) * r1);

            if push_collider || !push_collidee {
                let me = owner.object_id();
                if md.test_move_square(world.map, world.blocking, me, owner.pos + collider_push_vec)
                {
                    owner.move_by(collider_push_vec);
                }
                if md.test_move_square(world.map, world.blocking, me, owner.pos + collider_slide_vec)
                {
                    owner.move_by(collider_slide_vec);
                }
            }

            if (push_collidee || !push_collider) && collidee_mobile {
                if let Some(collidee_md) = collidee.move_def.as_ref() {
                    let them = ObjectId::Unit(cid);
                    if collidee_md.test_move_square(
                        world.map,
                        world.blocking,
                        them,
                        collidee.pos + collidee_push_vec,
                    ) {
                        if let Some(c) = world.units.get_mut(cid) {
                            c.move_by(collidee_push_vec);
                        }
                    }
                    if collidee_md.test_move_square(
                        world.map,
                        world.blocking,
                        them,
                        collidee.pos + collidee_slide_vec,
                    ) {
                        if let Some(c) = world.units.get_mut(cid) {
                            c.move_by(collidee_slide_vec);
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn handle_feature_collisions(
        &mut self,
        owner: &mut Unit,
        world: &mut WorldView,
        collider_speed: Fixed,
        collider_radius: Fixed,
        md: &MoveDef,
    ) {
        let search_radius = collider_speed.max(Fixed::ONE) * collider_radius;
        let near_features = world
            .spatial
            .features_exact(owner.pos, search_radius, world.features);

        let dir_sign = if self.reversing { -Fixed::ONE } else { Fixed::ONE };
        let crush_impulse = owner.speed * (owner.mass * dir_sign);

        for fid in near_features {
            let Some(feature) = world.features.get(fid).cloned() else {
                continue;
            };

            let collidee_radius = feature.radius;
            let collision_radius_sum = collider_radius + collidee_radius;

            let separation = owner.pos - feature.pos;
            if separation.sq_length() - collision_radius_sum * collision_radius_sum
                > Fixed::from_num(0.01)
            {
                continue;
            }

            if md.is_non_blocking(feature.blocking, crate::unit::PhysicalState::OnGround) {
                continue;
            }
            if md.can_crush(feature.crushable, feature.crush_resistance) {
                if let Some(f) = world.features.get_mut(fid) {
                    f.kill(crush_impulse);
                }
            }

            if self
                .controller
                .ignore_collision(owner.id, ObjectId::Feature(fid))
            {
                continue;
            }

            world.events.push(Event::UnitFeatureCollision {
                collider: owner.id,
                collidee: fid,
            });

            if feature.is_moving {
                let collidee_box = StaticCollidee {
                    pos: feature.pos,
                    xsize: feature.xsize,
                    zsize: feature.zsize,
                };
                self.handle_static_object_collision(
                    owner,
                    world,
                    md,
                    collider_radius,
                    collidee_radius,
                    separation,
                    collidee_box,
                    world.frame > self.path_request_delay,
                    false,
                    false,
                );
                continue;
            }

            let sep_distance = separation.length() + Fixed::from_num(0.1);
            let pen_distance = (collision_radius_sum - sep_distance).max(Fixed::ONE);
            let sep_response =
                (pen_distance * Fixed::from_num(0.5)).min(Fixed::from_num(SQUARE_SIZE * 2));

            let sep_direction = separation / sep_distance;
            let col_response_vec = sep_direction.flat() * sep_response;

            // weight the feature mass way up so heavy wrecks do not pinball
            // light units around
            let m1 = owner.mass;
            let m2 = feature.mass * Fixed::from_num(10000);
            let v1 = collider_speed.max(Fixed::ONE);
            let v2 = Fixed::ONE;
            let c1 =
                (Fixed::ONE - owner.frontdir.dot(-sep_direction).abs()) * Fixed::from_num(5);
            let c2 =
                (Fixed::ONE - (-owner.frontdir).dot(sep_direction).abs()) * Fixed::from_num(5);
            let s1 = m1 * v1 * c1;
            let s2 = m2 * v2 * c2;
            let r1 = s1 / (s1 + s2 + Fixed::ONE);
            let r2 = s2 / (s1 + s2 + Fixed::ONE);

            let collider_mass_scale =
                (Fixed::ONE - r1).clamp(Fixed::from_num(0.01), Fixed::from_num(0.99));
            let collidee_mass_scale =
                (Fixed::ONE - r2).clamp(Fixed::from_num(0.01), Fixed::from_num(0.99));

            owner.move_by(col_response_vec * collider_mass_scale);

            if let Some(f) = world.features.get_mut(fid) {
                let old_pos = f.pos;
                f.pos += -col_response_vec * collidee_mass_scale;
                if f.pos != old_pos {
                    f.is_moving = true;
                    let (fx, fz) = (f.xsize, f.zsize);
                    let (id, pos, blocking_flag, draw_type) =
                        (f.id, f.pos, f.blocking, f.draw_type);
                    let (crushable, resistance) = (f.crushable, f.crush_resistance);
                    if blocking_flag {
                        world.blocking.block(
                            ObjectId::Feature(id),
                            BlockFlags::STRUCTURE.union(BlockFlags::STATIC),
                            pos,
                            fx,
                            fz,
                            crushable,
                            resistance,
                        );
                    }
                    world.events.push(Event::RenderFeatureMoved {
                        feature: id,
                        old_pos,
                        new_pos: pos,
                        draw_type,
                    });
                }
            }
        }
    }

    /// Shared response against structures, blocked squares, and impassable
    /// terrain.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn handle_static_object_collision(
        &mut self,
        owner: &mut Unit,
        world: &mut WorldView,
        md: &MoveDef,
        collider_radius: Fixed,
        collidee_radius: Fixed,
        separation: Vec3Fixed,
        collidee: StaticCollidee,
        can_request_path: bool,
        check_yard_map: bool,
        check_terrain: bool,
    ) {
        if check_terrain {
            let in_air = (owner.pos.y - self.ground_height_at(owner, world.map, owner.pos))
                > Fixed::ONE;
            if !owner.moving || in_air {
                return;
            }
        }

        // extend the yard box by our half-footprint so the passability map
        // and the contact test agree about open factories
        let sq = Fixed::from_num(SQUARE_SIZE);
        let xext = Fixed::from_num(collidee.xsize / 2 + md.xsizeh().max(1)) * sq;
        let zext = Fixed::from_num(collidee.zsize / 2 + md.zsizeh().max(1)) * sq;

        let exiting_yard_map = owner.frontdir.dot(separation) > Fixed::ZERO
            && owner.speed.dot(separation) > Fixed::ZERO;
        let inside_yard_map = (owner.pos.x - collidee.pos.x).abs() <= xext
            && (owner.pos.z - collidee.pos.z).abs() <= zext;

        let wants_request_path;

        if (check_yard_map && inside_yard_map) || check_terrain {
            let xmid: i64 = ((owner.pos.x + owner.speed.x) / sq).floor().to_num();
            let zmid: i64 = ((owner.pos.z + owner.speed.z) / sq).floor().to_num();
            let (xmid, zmid) = (xmid as i32, zmid as i32);

            let xmin = (-1).min(-md.xsizeh());
            let xmax = 1.max(md.xsizeh());
            let zmin = (-1).min(-md.zsizeh());
            let zmax = 1.max(md.zsizeh());

            let mut strafe_vec = Vec3Fixed::ZERO;
            let mut bounce_vec = Vec3Fixed::ZERO;
            let mut sq_center_sum = Vec3Fixed::ZERO;

            let mut sq_pen_distance_sum = Fixed::ZERO;
            let mut sq_pen_distance_ctr = Fixed::ZERO;

            // treat every blocked square in the footprint zone as its own
            // collidee and sum the separation responses
            for z in zmin..=zmax {
                for x in xmin..=xmax {
                    let xabs = xmid + x;
                    let zabs = zmid + z;

                    if check_terrain {
                        if md.square_speed_mod(world.map, xabs, zabs) > Fixed::from_num(0.01) {
                            continue;
                        }
                    } else if !md
                        .square_blocked(world.blocking, xabs, zabs, Some(owner.object_id()))
                        .contains(BlockFlags::STRUCTURE)
                    {
                        continue;
                    }

                    let square_pos = Vec3Fixed::new(
                        Fixed::from_num(xabs * SQUARE_SIZE + SQUARE_SIZE / 2),
                        Fixed::ZERO,
                        Fixed::from_num(zabs * SQUARE_SIZE + SQUARE_SIZE / 2),
                    );
                    let square_vec = owner.pos - square_pos;

                    // ignore squares we are already pulling away from
                    if square_vec.dot(owner.speed) > Fixed::ZERO {
                        continue;
                    }

                    // √(2·(SQUARE_SIZE/2)²), the radius of one square
                    let sq_col_radius_sum = collider_radius + Fixed::from_num(5.656854249);
                    let sq_sep_distance = square_vec.length2d() + Fixed::from_num(0.1);
                    let sq_pen_distance =
                        (sq_sep_distance - sq_col_radius_sum).min(Fixed::ZERO);

                    bounce_vec += square_vec / sq_sep_distance;

                    sq_pen_distance_sum += sq_pen_distance;
                    sq_pen_distance_ctr += Fixed::ONE;
                    sq_center_sum += square_pos;
                }
            }

            let mut pushed = false;
            if sq_pen_distance_ctr > Fixed::ZERO {
                let sq_center_position = sq_center_sum / sq_pen_distance_ctr;
                let sq_pen_distance_avg = sq_pen_distance_sum / sq_pen_distance_ctr;

                let strafe_sign = sign_of(
                    (sq_center_position.dot(owner.rightdir) - owner.pos.dot(owner.rightdir))
                        < Fixed::ZERO,
                );
                let strafe_scale = self
                    .current_speed
                    .min((-sq_pen_distance_avg * Fixed::from_num(0.5)).max(Fixed::ZERO));
                let bounce_scale = (-sq_pen_distance_avg).max(Fixed::ZERO);

                strafe_vec = (owner.rightdir * strafe_sign).normalize2d();
                bounce_vec = bounce_vec.normalize2d();

                let me = owner.object_id();
                let strafe_step = strafe_vec * strafe_scale;
                let bounce_step = bounce_vec * bounce_scale;

                if md.test_move_square(world.map, world.blocking, me, owner.pos + strafe_step) {
                    owner.move_by(strafe_step);
                }
                if md.test_move_square(world.map, world.blocking, me, owner.pos + bounce_step) {
                    owner.move_by(bounce_step);
                }
                pushed = true;
            }

            wants_request_path = pushed && (strafe_vec + bounce_vec) != Vec3Fixed::ZERO;
        } else {
            let col_radius_sum = collider_radius + collidee_radius;
            let sep_distance = separation.length() + Fixed::from_num(0.1);
            let pen_distance = (sep_distance - col_radius_sum).min(Fixed::ZERO);
            let col_slide_sign = sign_of(
                (collidee.pos.dot(owner.rightdir) - owner.pos.dot(owner.rightdir))
                    <= Fixed::ZERO,
            );

            // leaving a yard, insideYardMap drops before contact ends; do
            // not add a parting shove
            let exit_scale = if exiting_yard_map { Fixed::ZERO } else { Fixed::ONE };
            let yard_exit_scale = if check_yard_map && exiting_yard_map {
                Fixed::ZERO
            } else {
                Fixed::ONE
            };

            let strafe_scale = self
                .current_speed
                .min((-pen_distance * Fixed::from_num(0.5)).max(Fixed::ZERO))
                * exit_scale;
            let bounce_scale = (-pen_distance).max(Fixed::ZERO) * yard_exit_scale;

            owner.move_by(owner.rightdir * (col_slide_sign * strafe_scale));
            owner.move_by((separation / sep_distance) * bounce_scale);

            wants_request_path = pen_distance < Fixed::ZERO;
        }

        if can_request_path && wants_request_path {
            let goal = self.goal_pos;
            let radius = self.goal_radius;
            if owner.commands.head_is_move() {
                // restart from zero speed or we ram the obstacle again; a
                // non-move head order would never lift the cap back up, so
                // those restart at full speed
                self.start_moving_with_speed(owner, world, goal, radius, Fixed::ZERO);
            } else {
                self.start_moving(owner, world, goal, radius);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::BlockingMap;
    use crate::config::ModInfo;
    use crate::features::{Feature, FeatureArena};
    use crate::map::HeightMap;
    use crate::path::GridPlanner;
    use crate::rng::SyncedRng;
    use crate::spatial::SpatialGrid;
    use crate::unit::{UnitArena, UnitData};

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
                rng: SyncedRng::new(1),
                mod_info: ModInfo::default(),
            }
        }

        fn world(&mut self) -> WorldView<'_> {
            WorldView {
                frame: 100,
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
    fn test_overlapping_units_separate() {
        let mut fx = Fixture::new();
        let mut collider = tank_at(200, 200);
        collider.moving = true;
        collider.speed = Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::ONE);

        let other = tank_at(200, 206);
        let cid = fx.units.insert(other);
        fx.movers
            .push(Some(GroundMover::new(fx.units.get(cid).unwrap())));
        fx.spatial.rebuild(&fx.units, &fx.features);

        let mut mover = GroundMover::new(&collider);
        let before = collider.pos;
        let other_before = fx.units.get(cid).unwrap().pos;

        {
            let mut world = fx.world();
            mover.handle_object_collisions(&mut collider, &mut world);
        }

        let other_after = fx.units.get(cid).unwrap().pos;
        // the pair must have been driven apart along z
        let gap_before = (other_before - before).length2d();
        let gap_after = (other_after - collider.pos).length2d();
        assert!(gap_after > gap_before, "{gap_before} -> {gap_after}");
        assert!(fx
            .events
            .iter()
            .any(|e| matches!(e, Event::UnitUnitCollision { .. })));
    }

    #[test]
    fn test_heavy_mover_crushes_light_feature() {
        let mut fx = Fixture::new();
        let mut collider = tank_at(200, 200);
        collider.mass = Fixed::from_num(1000);
        collider.moving = true;
        collider.speed = Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::from_num(3));

        let wreck = Feature::new(Vec3Fixed::from_ints(200, 0, 206), 2, 2, Fixed::from_num(5));
        let fid = fx.features.insert(wreck);
        fx.movers.push(None);
        fx.spatial.rebuild(&fx.units, &fx.features);

        let mut mover = GroundMover::new(&collider);
        let speed_before = collider.speed.length();

        {
            let mut world = fx.world();
            mover.handle_object_collisions(&mut collider, &mut world);
        }

        let wreck = fx.features.get(fid).unwrap();
        assert!(wreck.dead);
        // crush impulse carried the collider's momentum into the wreck
        assert!(wreck.speed.z > Fixed::ZERO);
        // the collider barely slows down
        assert!(collider.speed.length() >= speed_before * Fixed::from_num(0.9));
    }

    #[test]
    fn test_push_respects_structure_blocking() {
        let mut fx = Fixture::new();

        // wall directly behind the collidee
        fx.blocking.block(
            ObjectId::Unit(90),
            BlockFlags::STRUCTURE,
            Vec3Fixed::from_ints(200, 0, 224),
            4,
            2,
            false,
            Fixed::ZERO,
        );

        let mut collider = tank_at(200, 206);
        collider.moving = true;
        collider.speed = Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::ONE);

        let blocked = tank_at(200, 214);
        let cid = fx.units.insert(blocked);
        fx.movers
            .push(Some(GroundMover::new(fx.units.get(cid).unwrap())));
        fx.spatial.rebuild(&fx.units, &fx.features);

        let mut mover = GroundMover::new(&collider);
        {
            let mut world = fx.world();
            let radius = collider.radius;
            let move_def = collider.move_def.clone().unwrap();
            mover.handle_unit_collisions(
                &mut collider,
                &mut world,
                Fixed::ONE,
                radius,
                &move_def,
            );
        }

        // the collidee may slide but must not be pushed into the wall
        let pos = fx.units.get(cid).unwrap().pos;
        let (sx, sz) = fx.map.world_to_square(pos);
        assert!(!fx
            .blocking
            .square_blocked(sx, sz, Some(ObjectId::Unit(cid)))
            .contains(BlockFlags::STRUCTURE));
    }

    #[test]
    fn test_goal_share_tiebreak() {
        let mut fx = Fixture::new();
        let goal = Vec3Fixed::from_ints(200, 0, 210);

        let mut parked = tank_at(200, 208);
        parked.moving = false;
        let cid = fx.units.insert(parked);
        let mut parked_mover = GroundMover::new(fx.units.get(cid).unwrap());
        parked_mover.goal_pos = goal;
        parked_mover.progress_state = ProgressState::Done;
        fx.movers.push(Some(parked_mover));
        fx.spatial.rebuild(&fx.units, &fx.features);

        let mut collider = tank_at(200, 202);
        collider.moving = true;
        let mut mover = GroundMover::new(&collider);
        mover.goal_pos = goal;
        mover.progress_state = ProgressState::Active;

        {
            let mut world = fx.world();
            let radius = collider.radius;
            let move_def = collider.move_def.clone().unwrap();
            mover.handle_unit_collisions(
                &mut collider,
                &mut world,
                Fixed::ONE,
                radius,
                &move_def,
            );
        }

        assert!(mover.at_goal());
    }

    #[test]
    fn test_terrain_sweep_bounces_off_impassable() {
        let mut fx = Fixture::new();
        // a cliff wall to the north (larger z)
        fx.map = HeightMap::from_fn(64, 64, |_, cz| {
            if cz >= 28 {
                Fixed::from_num(200)
            } else {
                Fixed::ZERO
            }
        });

        let mut collider = tank_at(200, 210);
        collider.moving = true;
        collider.speed = Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::from_num(2));
        let mut mover = GroundMover::new(&collider);
        mover.current_speed = Fixed::from_num(2);

        let z_before = collider.pos.z;
        {
            let mut world = fx.world();
            let md = collider.move_def.clone().unwrap();
            let own_box = StaticCollidee {
                pos: collider.pos,
                xsize: collider.xsize,
                zsize: collider.zsize,
            };
            let radius = collider.radius;
            mover.handle_static_object_collision(
                &mut collider,
                &mut world,
                &md,
                radius,
                Fixed::ZERO,
                Vec3Fixed::ZERO,
                own_box,
                false,
                false,
                true,
            );
        }

        assert!(collider.pos.z <= z_before);
    }
}
