//! Per-unit-type movement profiles.
//!
//! A [`MoveDef`] describes how a family of units traverses terrain: footprint
//! extent, slope and depth limits, per-terrain speed scaling, crush strength,
//! and the passability predicates used by both the path planner and the
//! collision resolver.

use serde::{Deserialize, Serialize};

use crate::blocking::{BlockFlags, BlockingMap, ObjectId};
use crate::map::{HeightMap, SQUARE_SIZE};
use crate::math::{fixed_serde, fixed_sqrt, Fixed, Vec3Fixed};
use crate::unit::PhysicalState;

/// Movement family; selects slope/depth rules and the hover strafe switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveFamily {
    /// Tracked or wheeled ground vehicle.
    Tank,
    /// Walker.
    KBot,
    /// Hovercraft: ignores water depth, keeps lateral momentum.
    Hover,
    /// Surface vessel: requires a minimum water depth.
    Ship,
}

/// Per-unit-type movement profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveDef {
    /// Movement family.
    pub family: MoveFamily,
    /// Footprint width in squares.
    pub xsize: i32,
    /// Footprint depth in squares.
    pub zsize: i32,
    /// Maximum traversable slope (`1 − normal.y`).
    #[serde(with = "fixed_serde")]
    pub max_slope: Fixed,
    /// Speed falloff per unit of slope.
    #[serde(with = "fixed_serde")]
    pub slope_mod: Fixed,
    /// Maximum wading depth (Tank/KBot); minimum water depth for Ship.
    #[serde(with = "fixed_serde")]
    pub depth: Fixed,
    /// Speed falloff per elmo of wading depth.
    #[serde(with = "fixed_serde")]
    pub depth_mod: Fixed,
    /// Crush strength; objects with lower crush resistance are flattened.
    #[serde(with = "fixed_serde")]
    pub crush_strength: Fixed,
    /// Whether the steering filter reacts to mobile objects on the path.
    pub avoid_mobiles_on_path: bool,
}

impl MoveDef {
    /// Create a profile with family-typical limits.
    #[must_use]
    pub fn new(family: MoveFamily, xsize: i32, zsize: i32) -> Self {
        let (max_slope, depth) = match family {
            MoveFamily::Tank => (Fixed::from_num(0.12), Fixed::from_num(16)),
            MoveFamily::KBot => (Fixed::from_num(0.30), Fixed::from_num(22)),
            MoveFamily::Hover => (Fixed::from_num(0.12), Fixed::MAX),
            MoveFamily::Ship => (Fixed::MAX, Fixed::from_num(10)),
        };

        Self {
            family,
            xsize,
            zsize,
            max_slope,
            slope_mod: Fixed::from_num(4),
            depth,
            depth_mod: Fixed::from_num(0.1),
            crush_strength: Fixed::from_num(10),
            avoid_mobiles_on_path: true,
        }
    }

    /// Builder: override the maximum slope.
    #[must_use]
    pub fn with_max_slope(mut self, max_slope: Fixed) -> Self {
        self.max_slope = max_slope;
        self
    }

    /// Builder: override the crush strength.
    #[must_use]
    pub fn with_crush_strength(mut self, crush_strength: Fixed) -> Self {
        self.crush_strength = crush_strength;
        self
    }

    /// Half-extent of the footprint along x, in squares.
    #[must_use]
    pub const fn xsizeh(&self) -> i32 {
        self.xsize / 2
    }

    /// Half-extent of the footprint along z, in squares.
    #[must_use]
    pub const fn zsizeh(&self) -> i32 {
        self.zsize / 2
    }

    /// Whether a solid object in the given state blocks this profile at all.
    #[must_use]
    pub fn is_non_blocking(&self, collidee_blocking: bool, collidee_state: PhysicalState) -> bool {
        if !collidee_blocking {
            return true;
        }
        // submerged objects never obstruct surface movers and vice versa
        match (self.family, collidee_state) {
            (MoveFamily::Tank | MoveFamily::KBot | MoveFamily::Hover, PhysicalState::Submarine) => {
                true
            }
            (MoveFamily::Ship, PhysicalState::Submarine) => true,
            _ => matches!(collidee_state, PhysicalState::Flying),
        }
    }

    /// Whether this profile can crush an object with the given resistance.
    #[must_use]
    pub fn can_crush(&self, crushable: bool, crush_resistance: Fixed) -> bool {
        crushable && crush_resistance < self.crush_strength
    }

    fn speed_mod_from(&self, slope: Fixed, height: Fixed) -> Fixed {
        match self.family {
            MoveFamily::Tank | MoveFamily::KBot => {
                let wade_depth = (-height).max(Fixed::ZERO);
                if slope > self.max_slope || wade_depth > self.depth {
                    return Fixed::ZERO;
                }
                let slope_scale = Fixed::ONE + slope * self.slope_mod;
                let depth_scale = Fixed::ONE + wade_depth * self.depth_mod;
                Fixed::ONE / (slope_scale * depth_scale)
            }
            MoveFamily::Hover => {
                if slope > self.max_slope && height > Fixed::ZERO {
                    return Fixed::ZERO;
                }
                Fixed::ONE / (Fixed::ONE + slope * self.slope_mod)
            }
            MoveFamily::Ship => {
                let water_depth = -height;
                if water_depth < self.depth {
                    Fixed::ZERO
                } else {
                    Fixed::ONE
                }
            }
        }
    }

    /// Ground speed modifier at a square center.
    #[must_use]
    pub fn square_speed_mod(&self, map: &HeightMap, sx: i32, sz: i32) -> Fixed {
        if sx < 0 || sz < 0 || sx >= map.xsquares() || sz >= map.zsquares() {
            return Fixed::ZERO;
        }
        let center = map.square_center(sx, sz);
        let slope = map.slope(center.x, center.z);
        let height = map.height_real(center.x, center.z);
        self.speed_mod_from(slope, height)
    }

    /// Ground speed modifier at a world position.
    #[must_use]
    pub fn pos_speed_mod(&self, map: &HeightMap, pos: Vec3Fixed) -> Fixed {
        let slope = map.slope(pos.x, pos.z);
        let height = map.height_real(pos.x, pos.z);
        self.speed_mod_from(slope, height)
    }

    /// Ground speed modifier at a world position, scaled by how hard the
    /// move direction climbs; downhill motion pays no slope penalty.
    #[must_use]
    pub fn pos_speed_mod_dir(&self, map: &HeightMap, pos: Vec3Fixed, dir: Vec3Fixed) -> Fixed {
        let normal = map.normal(pos.x, pos.z);
        let slope = Fixed::ONE - normal.y;
        let height = map.height_real(pos.x, pos.z);

        let uphill = Vec3Fixed::new(-normal.x, Fixed::ZERO, -normal.z).normalize2d();
        let climb = dir.dot2d(uphill).max(Fixed::ZERO);

        self.speed_mod_from(slope * climb, height)
    }

    /// Blocking bits on a square as seen by this profile: anything it can
    /// crush is invisible to it.
    #[must_use]
    pub fn square_blocked(
        &self,
        blocking: &BlockingMap,
        sx: i32,
        sz: i32,
        ignore: Option<ObjectId>,
    ) -> BlockFlags {
        blocking.square_blocked_where(sx, sz, ignore, |crushable, resistance| {
            !self.can_crush(crushable, resistance)
        })
    }

    /// Terrain-only passability of the center square under `pos`.
    #[must_use]
    pub fn test_move_pos(&self, map: &HeightMap, pos: Vec3Fixed) -> bool {
        if !map.in_bounds(pos) {
            return false;
        }
        self.pos_speed_mod(map, pos) > Fixed::from_num(0.01)
    }

    /// Full passability test of the footprint under `pos`: center-square
    /// terrain plus structure blocking over every footprint square.
    #[must_use]
    pub fn test_move_square(
        &self,
        map: &HeightMap,
        blocking: &BlockingMap,
        self_id: ObjectId,
        pos: Vec3Fixed,
    ) -> bool {
        if !self.test_move_pos(map, pos) {
            return false;
        }

        let (sx, sz) = map.world_to_square(pos);
        for dz in -self.zsizeh()..=self.zsizeh() {
            for dx in -self.xsizeh()..=self.xsizeh() {
                let flags = self.square_blocked(blocking, sx + dx, sz + dz, Some(self_id));
                if flags.contains(BlockFlags::STRUCTURE) {
                    return false;
                }
            }
        }
        true
    }
}

/// Radius of a footprint, optionally scaled.
///
/// With scale 0.75 the circle is maximally bounded by (rather than minimally
/// bounding) a square footprint.
#[must_use]
pub fn footprint_radius(xsize: i32, zsize: i32, scale: Fixed) -> Fixed {
    let xs = Fixed::from_num(xsize);
    let zs = Fixed::from_num(zsize);
    fixed_sqrt(xs * xs + zs * zs) * Fixed::from_num(0.5) * Fixed::from_num(SQUARE_SIZE) * scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_ground_full_speed() {
        let map = HeightMap::flat(16, 16, Fixed::ZERO);
        let md = MoveDef::new(MoveFamily::Tank, 2, 2);
        let m = md.pos_speed_mod(&map, Vec3Fixed::from_ints(64, 0, 64));
        assert_eq!(m, Fixed::ONE);
    }

    #[test]
    fn test_steep_slope_impassable_for_tank() {
        let map = HeightMap::from_fn(16, 16, |cx, _| Fixed::from_num(cx * 8));
        let md = MoveDef::new(MoveFamily::Tank, 2, 2);
        let m = md.pos_speed_mod(&map, Vec3Fixed::from_ints(64, 0, 64));
        assert_eq!(m, Fixed::ZERO);

        let kbot = MoveDef::new(MoveFamily::KBot, 2, 2).with_max_slope(Fixed::from_num(0.9));
        let m = kbot.pos_speed_mod(&map, Vec3Fixed::from_ints(64, 0, 64));
        assert!(m > Fixed::ZERO && m < Fixed::ONE);
    }

    #[test]
    fn test_deep_water_blocks_tank_not_ship() {
        let map = HeightMap::flat(16, 16, Fixed::from_num(-30));
        let tank = MoveDef::new(MoveFamily::Tank, 2, 2);
        let ship = MoveDef::new(MoveFamily::Ship, 3, 3);
        let pos = Vec3Fixed::from_ints(64, 0, 64);

        assert_eq!(tank.pos_speed_mod(&map, pos), Fixed::ZERO);
        assert_eq!(ship.pos_speed_mod(&map, pos), Fixed::ONE);
    }

    #[test]
    fn test_downhill_pays_no_slope_penalty() {
        let map = HeightMap::from_fn(16, 16, |cx, _| Fixed::from_num(cx * 2));
        let md = MoveDef::new(MoveFamily::Tank, 2, 2);
        let pos = Vec3Fixed::from_ints(64, 0, 64);

        let downhill = md.pos_speed_mod_dir(&map, pos, Vec3Fixed::from_ints(1, 0, 0));
        let uphill = md.pos_speed_mod_dir(&map, pos, Vec3Fixed::from_ints(-1, 0, 0));
        assert!(downhill > uphill);
    }

    #[test]
    fn test_structure_blocks_footprint() {
        let map = HeightMap::flat(16, 16, Fixed::ZERO);
        let mut blocking = BlockingMap::new(&map);
        let md = MoveDef::new(MoveFamily::Tank, 2, 2);
        let me = ObjectId::Unit(1);

        let pos = Vec3Fixed::from_ints(64, 0, 64);
        assert!(md.test_move_square(&map, &blocking, me, pos));

        blocking.block(
            ObjectId::Unit(2),
            BlockFlags::STRUCTURE,
            pos,
            2,
            2,
            false,
            Fixed::ZERO,
        );
        assert!(!md.test_move_square(&map, &blocking, me, pos));
    }

    #[test]
    fn test_crushable_wreck_does_not_block() {
        let map = HeightMap::flat(16, 16, Fixed::ZERO);
        let mut blocking = BlockingMap::new(&map);
        let md = MoveDef::new(MoveFamily::Tank, 2, 2);
        let me = ObjectId::Unit(1);
        let pos = Vec3Fixed::from_ints(64, 0, 64);

        blocking.block(
            ObjectId::Feature(7),
            BlockFlags::STRUCTURE.union(BlockFlags::STATIC),
            pos,
            2,
            2,
            true,
            Fixed::ZERO,
        );
        assert!(md.test_move_square(&map, &blocking, me, pos));
    }

    #[test]
    fn test_footprint_radius() {
        let r = footprint_radius(2, 2, Fixed::ONE);
        // sqrt(8) * 0.5 * 8 ≈ 11.31
        assert!((r - Fixed::from_num(11.3137)).abs() < Fixed::from_num(0.01));
    }
}
