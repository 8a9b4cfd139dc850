//! Ballistic skid dynamics.
//!
//! A large enough impulse knocks a unit out of normal locomotion: heading
//! control is frozen, gravity and ground contact integrate the velocity, and
//! a Rodrigues rotation spins the basis vectors until linear and angular
//! motion die out together. A parachute drop is the tame cousin of the same
//! state.

use crate::blocking::BlockFlags;
use crate::heading::{cos_rad, pi, sin_rad};
use crate::locomotion::{collision_damage_mult, max_unit_speed, GroundMover, WorldView, GAME_SPEED};
use crate::math::{Fixed, Vec3Fixed};
use crate::unit::{PhysicalState, Unit};

impl GroundMover {
    /// Offer an impulse; true when it tips the unit into the skid state.
    pub fn can_apply_impulse(
        &mut self,
        owner: &mut Unit,
        world: &mut WorldView,
        impulse: Vec3Fixed,
    ) -> bool {
        if owner.being_built {
            return false;
        }
        if owner.transporter.is_some() {
            return false;
        }
        if impulse.sq_length() <= Fixed::from_num(0.01) {
            return false;
        }
        // small charges accumulate on the residual slot until the threshold
        if owner.residual_impulse.sq_length() <= Fixed::from_num(9) {
            return false;
        }

        self.skidding = true;
        owner.use_heading = false;

        self.skid_rot_speed = Fixed::ZERO;
        self.skid_rot_accel = Fixed::ZERO;

        let new_speed = owner.speed + owner.residual_impulse;
        let mut skid_dir = owner.frontdir;

        if new_speed.sq_length2d() >= Fixed::from_num(0.01) {
            skid_dir = new_speed.normalize2d();
        }

        self.skid_rot_vector = skid_dir.cross(Vec3Fixed::UP);

        self.old_phys_state = owner.physical_state;
        owner.physical_state = PhysicalState::Flying;

        let normal = world.map.normal(owner.pos.x, owner.pos.z);
        if new_speed.dot(normal) > Fixed::from_num(0.2) {
            self.skid_rot_accel =
                (world.rng.next_fixed01() - Fixed::from_num(0.5)) * Fixed::from_num(0.04);
            self.flying = true;
        }

        debug_assert!(new_speed.is_sane_speed(max_unit_speed()));
        true
    }

    /// One skid tick: ballistic integration, ground contact, spin.
    pub(crate) fn update_skid(&mut self, owner: &mut Unit, world: &mut WorldView) {
        let ground_height = self.ground_height_at(owner, world.map, owner.pos);

        if self.flying {
            // water drag
            if owner.pos.y < Fixed::ZERO {
                owner.speed *= Fixed::from_num(0.95);
            }

            let impact_normal = if world.map.in_bounds(owner.pos) {
                world.map.normal(owner.pos.x, owner.pos.z)
            } else {
                Vec3Fixed::UP
            };
            let impact_speed = -owner.speed.dot(impact_normal);
            let impact_damage = impact_speed * owner.mass * collision_damage_mult();
            let min_col = owner.data.min_collision_speed;
            let do_damage = world.mod_info.allow_unit_collision_damage
                && impact_speed > min_col
                && min_col >= Fixed::ZERO;

            if ground_height > owner.pos.y {
                // ground impact, stop flying
                self.flying = false;
                owner.set_height(ground_height);

                if do_damage {
                    owner.do_damage(impact_damage);
                }

                self.skid_rot_speed = Fixed::ZERO;
            } else {
                owner.speed.y += world.map.gravity();
            }
        } else {
            let mut speedf = owner.speed.length();
            let skid_rot_spd;

            let on_slope = self.on_slope(owner, world.map, Fixed::from_num(-1));
            let speed_reduction = Fixed::from_num(0.35);

            if speedf < speed_reduction && !on_slope {
                // stop skidding
                owner.speed = Vec3Fixed::ZERO;

                self.skidding = false;
                owner.use_heading = true;
                owner.physical_state = self.old_phys_state;

                skid_rot_spd = (self.skid_rot_speed + self.skid_rot_accel + Fixed::from_num(0.5))
                    .floor();
                self.skid_rot_accel = (skid_rot_spd - self.skid_rot_speed) * Fixed::from_num(0.5);
                self.skid_rot_accel *= pi() / Fixed::from_num(180);

                let heading = owner.heading;
                self.change_heading(owner, world.map, heading);
            } else {
                if on_slope {
                    let normal = world.map.normal(owner.pos.x, owner.pos.z);
                    let gravity_vec = Vec3Fixed::UP * world.map.gravity();
                    let normal_force = normal * normal.dot(gravity_vec);
                    let new_force = gravity_vec - normal_force;

                    owner.speed += new_force;
                    speedf = owner.speed.length();
                    owner.speed *= Fixed::ONE - Fixed::from_num(0.1) * normal.y;
                } else {
                    owner.speed *= Fixed::ONE - (speed_reduction / speedf).min(Fixed::ONE);
                }

                // ticks until the spin must reach zero, synced to the
                // linear slowdown
                let rem_time = (speedf / speed_reduction).max(Fixed::ONE);

                skid_rot_spd = (self.skid_rot_speed
                    + self.skid_rot_accel * (rem_time - Fixed::ONE)
                    + Fixed::from_num(0.5))
                .floor();
                self.skid_rot_accel = (skid_rot_spd - self.skid_rot_speed) / rem_time;
                self.skid_rot_accel *= pi() / Fixed::from_num(180);

                if self.skid_rot_speed.floor()
                    != (self.skid_rot_speed + self.skid_rot_accel).floor()
                {
                    self.skid_rot_speed = Fixed::ZERO;
                    self.skid_rot_accel = Fixed::ZERO;
                }
            }

            if (ground_height - owner.pos.y) < (owner.speed.y + world.map.gravity()) {
                // leaving the ground
                owner.speed.y += world.map.gravity();

                self.flying = true;
                self.skidding = true;
                owner.use_heading = false;
            } else if (ground_height - owner.pos.y) > owner.speed.y {
                // hard ground contact; bounce
                let normal = if world.map.in_bounds(owner.pos) {
                    world.map.normal(owner.pos.x, owner.pos.z)
                } else {
                    Vec3Fixed::UP
                };
                let dot = owner.speed.dot(normal);

                if dot > Fixed::ZERO {
                    owner.speed *= Fixed::from_num(0.95);
                } else {
                    owner.speed +=
                        normal * (dot.abs() + Fixed::from_num(0.1)) * Fixed::from_num(1.9);
                    owner.speed *= Fixed::from_num(0.8);
                }
            }
        }

        // translate before rotating; stay matched to the terrain normal
        let step = owner.speed;
        owner.move_by(step);
        owner.update_dir_vectors(true, world.map);

        if self.skidding {
            self.calc_skid_rot(owner);
            self.check_collision_skid(owner, world);

            if self.flying {
                world.blocking.unblock(owner.object_id());
            } else if owner.blocking {
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
        } else {
            // normal Update() already returned for this tick
            self.handle_object_collisions(owner, world);
        }

        // refresh old_pos every skid tick or the speed makes an extreme
        // jump on the transition back to driving
        self.old_pos = owner.pos;

        debug_assert!(owner.speed.is_sane_speed(max_unit_speed()));
    }

    /// Parachute drop integration.
    pub(crate) fn update_controlled_drop(&mut self, owner: &mut Unit, world: &mut WorldView) {
        if !owner.falling {
            return;
        }

        owner.speed.y += world.map.gravity() * owner.data.fall_speed;
        owner.speed.y = owner.speed.y.min(Fixed::ZERO);

        let step = owner.speed;
        owner.move_by(step);

        // water drag
        if owner.pos.y < Fixed::ZERO {
            owner.speed *= Fixed::from_num(0.9);
        }

        let ground_height = self.ground_height_at(owner, world.map, owner.pos);
        if ground_height > owner.pos.y {
            owner.set_height(ground_height);
            owner.falling = false;
        }
    }

    /// Rotate the basis vectors around the skid axis.
    pub(crate) fn calc_skid_rot(&mut self, owner: &mut Unit) {
        self.skid_rot_speed += self.skid_rot_accel;
        self.skid_rot_speed *= Fixed::from_num(0.999);
        self.skid_rot_accel *= Fixed::from_num(0.95);

        let angle = (self.skid_rot_speed / Fixed::from_num(GAME_SPEED))
            * (pi() * Fixed::from_num(2));
        let cosp = cos_rad(angle);
        let sinp = sin_rad(angle);

        let axis = self.skid_rot_vector;

        let f1 = axis * axis.dot(owner.frontdir);
        let f2 = owner.frontdir - f1;

        let r1 = axis * axis.dot(owner.rightdir);
        let r2 = owner.rightdir - r1;

        let u1 = axis * axis.dot(owner.updir);
        let u2 = owner.updir - u1;

        let f2 = f2 * cosp + f2.cross(axis) * sinp;
        let r2 = r2 * cosp + r2.cross(axis) * sinp;
        let u2 = u2 * cosp + u2.cross(axis) * sinp;

        owner.frontdir = f1 + f2;
        owner.rightdir = r1 + r2;
        owner.updir = u1 + u2;
    }

    /// Momentum-exchanging contact pass used on every skid tick.
    pub(crate) fn check_collision_skid(&mut self, owner: &mut Unit, world: &mut WorldView) {
        let pos = owner.pos;
        let mod_info = *world.mod_info;

        let near_units = world.spatial.units_exact(pos, owner.radius, world.units);
        for cid in near_units {
            let Some(collidee) = world.units.get(cid).cloned() else {
                continue;
            };

            let sq_dist = (pos - collidee.pos).sq_length();
            let tot_rad = owner.radius + collidee.radius;
            if sq_dist >= tot_rad * tot_rad || sq_dist <= Fixed::from_num(0.01) {
                continue;
            }

            // stop units from reaching escape velocity
            let dif = (pos - collidee.pos).normalize();

            let collider_min_col = owner.data.min_collision_speed;
            let collidee_min_col = collidee.data.min_collision_speed;

            if collidee.move_def.is_none() {
                let impact_speed = -owner.speed.dot(dif);
                let impact_damage =
                    (impact_speed * owner.mass * collision_damage_mult()).min(max_unit_speed());

                let do_collider_damage = mod_info.allow_unit_collision_damage
                    && impact_speed > collider_min_col
                    && collider_min_col >= Fixed::ZERO;
                let do_collidee_damage = mod_info.allow_unit_collision_damage
                    && impact_speed > collidee_min_col
                    && collidee_min_col >= Fixed::ZERO;

                if impact_speed <= Fixed::ZERO {
                    continue;
                }

                owner.move_by(dif * impact_speed);
                owner.speed += dif * impact_speed * Fixed::from_num(1.8);

                if do_collider_damage {
                    owner.do_damage(impact_damage);
                }
                if do_collidee_damage {
                    if let Some(c) = world.units.get_mut(cid) {
                        c.do_damage(impact_damage);
                    }
                }
            } else {
                debug_assert!(owner.mass > Fixed::ZERO && collidee.mass > Fixed::ZERO);

                // impact speed is halved, so neither truly elastic nor
                // truly inelastic; tight groups must not blow up
                let impact_speed =
                    (collidee.speed - owner.speed).dot(dif) * Fixed::from_num(0.5);
                let collider_rel_mass = owner.mass / (owner.mass + collidee.mass);
                let collider_rel_impact = impact_speed * (Fixed::ONE - collider_rel_mass);
                let collidee_rel_impact = impact_speed * collider_rel_mass;

                let collider_damage = (collider_rel_impact * owner.mass * collision_damage_mult())
                    .min(max_unit_speed());
                let collidee_damage = (collidee_rel_impact * owner.mass * collision_damage_mult())
                    .min(max_unit_speed());

                let do_collider_damage = mod_info.allow_unit_collision_damage
                    && impact_speed > collider_min_col
                    && collider_min_col >= Fixed::ZERO;
                let do_collidee_damage = mod_info.allow_unit_collision_damage
                    && impact_speed > collidee_min_col
                    && collidee_min_col >= Fixed::ZERO;

                if impact_speed <= Fixed::ZERO {
                    continue;
                }

                owner.move_by(dif * collider_rel_impact);
                owner.speed += dif * collider_rel_impact;

                if let Some(c) = world.units.get_mut(cid) {
                    c.move_by(-(dif * collidee_rel_impact));
                    c.speed -= dif * collidee_rel_impact;

                    if do_collidee_damage {
                        c.do_damage(collidee_damage);
                    }
                }

                if do_collider_damage {
                    owner.do_damage(collider_damage);
                }
            }
        }

        let near_features = world
            .spatial
            .features_exact(pos, owner.radius, world.features);
        for fid in near_features {
            let Some(feature) = world.features.get(fid) else {
                continue;
            };
            if !feature.blocking {
                continue;
            }

            let sq_dist = (pos - feature.pos).sq_length();
            let tot_rad = owner.radius + feature.radius;
            if sq_dist >= tot_rad * tot_rad || sq_dist <= Fixed::from_num(0.01) {
                continue;
            }

            let dif = (pos - feature.pos).normalize();
            let impact_speed = -owner.speed.dot(dif);
            let impact_damage =
                (impact_speed * owner.mass * collision_damage_mult()).min(max_unit_speed());
            let impact_impulse = dif * impact_speed;

            let min_col = owner.data.min_collision_speed;
            let do_collider_damage = mod_info.allow_unit_collision_damage
                && impact_speed > min_col
                && min_col >= Fixed::ZERO;

            if impact_speed <= Fixed::ZERO {
                continue;
            }

            owner.move_by(impact_impulse);
            owner.speed += impact_impulse * Fixed::from_num(1.8);

            if do_collider_damage {
                owner.do_damage(impact_damage);
            }

            if let Some(f) = world.features.get_mut(fid) {
                f.do_damage(impact_damage);
            }
        }

        debug_assert!(owner.speed.is_sane_speed(max_unit_speed()));
    }
}
