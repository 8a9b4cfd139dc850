//! Unit state and arena storage.
//!
//! A [`Unit`] is a solid object the locomotion core can steer: position,
//! velocity, a 16-bit heading with derived basis vectors, a footprint, and
//! the kinematic profile of its type. Units live in a slot arena and are
//! referred to by integer id everywhere; nothing holds long-lived references
//! across ticks.

use serde::{Deserialize, Serialize};

use crate::blocking::ObjectId;
use crate::commands::CommandQueue;
use crate::heading::{basis_from_heading, Heading};
use crate::map::HeightMap;
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::move_def::MoveDef;

/// Unique identifier for units.
pub type UnitId = u32;

/// Where the object sits relative to ground and water.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PhysicalState {
    /// Resting on terrain.
    #[default]
    OnGround,
    /// Hovering just above terrain or water.
    Hovering,
    /// Floating on the water surface.
    Floating,
    /// Fully submerged.
    Submarine,
    /// Airborne (also the ballistic skid state).
    Flying,
}

/// Per-tick first-person control inputs for a directly driven unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FpsControl {
    /// Throttle forward.
    pub forward: bool,
    /// Throttle backward.
    pub back: bool,
    /// Turn left.
    pub left: bool,
    /// Turn right.
    pub right: bool,
}

/// The unit's primary weapon, as far as in-place aiming cares about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainWeapon {
    /// Aim axis in the unit's local frame (z forward, x right).
    pub main_dir: Vec3Fixed,
    /// Whether the weapon can engage targets below the water line.
    pub water_weapon: bool,
    /// Cosine of the half-arc within which the weapon can fire.
    #[serde(with = "fixed_serde")]
    pub max_angle_cos: Fixed,
}

impl MainWeapon {
    /// A forward-facing turretless weapon with the given arc cosine.
    #[must_use]
    pub fn forward(max_angle_cos: Fixed) -> Self {
        Self {
            main_dir: Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::ONE),
            water_weapon: false,
            max_angle_cos,
        }
    }

    /// World-space aim axis given the owner's basis vectors.
    #[must_use]
    pub fn world_dir(&self, owner: &Unit) -> Vec3Fixed {
        (owner.frontdir * self.main_dir.z
            + owner.rightdir * self.main_dir.x
            + owner.updir * self.main_dir.y)
            .normalize()
    }

    /// Whether the arc covers `target` from the owner's current pose.
    #[must_use]
    pub fn try_target(&self, owner: &Unit, target: Vec3Fixed) -> bool {
        let to_target = (target - owner.pos).normalize2d();
        if to_target == Vec3Fixed::ZERO {
            return true;
        }
        self.world_dir(owner).flat().normalize().dot(to_target) >= self.max_angle_cos
    }
}

/// Per-type kinematic and interaction profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitData {
    /// Maximum forward speed, elmos per tick.
    #[serde(with = "fixed_serde")]
    pub max_speed: Fixed,
    /// Maximum reverse speed, elmos per tick; 0 disables reversing.
    #[serde(with = "fixed_serde")]
    pub max_reverse_speed: Fixed,
    /// Acceleration, elmos per tick squared.
    #[serde(with = "fixed_serde")]
    pub acc_rate: Fixed,
    /// Braking rate, elmos per tick squared.
    #[serde(with = "fixed_serde")]
    pub dec_rate: Fixed,
    /// Turn rate in heading units per tick.
    #[serde(with = "fixed_serde")]
    pub turn_rate: Fixed,
    /// Whether the unit may pivot without forward motion.
    pub turn_in_place: bool,
    /// Speed floor used while turning when pivoting is disabled.
    #[serde(with = "fixed_serde")]
    pub turn_in_place_speed_limit: Fixed,
    /// Required turn angle (degrees) above which a pivoting unit slows down.
    #[serde(with = "fixed_serde")]
    pub turn_in_place_angle_limit: Fixed,
    /// Slope-slide tolerance factor; below 1 the unit never slope-skids.
    #[serde(with = "fixed_serde")]
    pub slide_tolerance: Fixed,
    /// Minimum impact speed before collision damage applies; negative
    /// disables collision damage for this type.
    #[serde(with = "fixed_serde")]
    pub min_collision_speed: Fixed,
    /// Gravity multiplier while parachuting.
    #[serde(with = "fixed_serde")]
    pub fall_speed: Fixed,
    /// Floating draft depth below the water surface.
    #[serde(with = "fixed_serde")]
    pub waterline: Fixed,
    /// Rides the water surface instead of the sea floor.
    pub float_on_water: bool,
    /// Keeps its up axis vertical instead of tilting with terrain.
    pub upright: bool,
    /// Refuses to be pushed aside by collisions.
    pub push_resistant: bool,
    /// Can be flattened by heavier movers.
    pub crushable: bool,
    /// Resistance compared against the crusher's crush strength.
    #[serde(with = "fixed_serde")]
    pub crush_resistance: Fixed,
}

impl Default for UnitData {
    fn default() -> Self {
        Self {
            max_speed: Fixed::from_num(3),
            max_reverse_speed: Fixed::ZERO,
            acc_rate: Fixed::from_num(0.15),
            dec_rate: Fixed::from_num(0.3),
            turn_rate: Fixed::from_num(600),
            turn_in_place: true,
            turn_in_place_speed_limit: Fixed::from_num(0.6),
            turn_in_place_angle_limit: Fixed::from_num(10),
            slide_tolerance: Fixed::ZERO,
            min_collision_speed: Fixed::ONE,
            fall_speed: Fixed::from_num(0.2),
            waterline: Fixed::ZERO,
            float_on_water: false,
            upright: false,
            push_resistant: false,
            crushable: false,
            crush_resistance: Fixed::from_num(50),
        }
    }
}

/// A controllable solid object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Arena id.
    pub id: UnitId,
    /// Alliance group; equal values are allied.
    pub ally_team: u8,
    /// World position.
    pub pos: Vec3Fixed,
    /// Velocity in elmos per tick.
    pub speed: Vec3Fixed,
    /// 16-bit heading.
    pub heading: Heading,
    /// Forward basis vector.
    pub frontdir: Vec3Fixed,
    /// Right basis vector.
    pub rightdir: Vec3Fixed,
    /// Up basis vector.
    pub updir: Vec3Fixed,
    /// Ground/water relationship.
    pub physical_state: PhysicalState,
    /// Instance footprint width in squares.
    pub xsize: i32,
    /// Instance footprint depth in squares.
    pub zsize: i32,
    /// Mass.
    #[serde(with = "fixed_serde")]
    pub mass: Fixed,
    /// Collision radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Hit points.
    #[serde(with = "fixed_serde")]
    pub health: Fixed,
    /// Kinematic profile.
    pub data: UnitData,
    /// Movement profile; `None` for structures and landed aircraft.
    pub move_def: Option<MoveDef>,
    /// Order queue.
    pub commands: CommandQueue,
    /// Currently driving along a path.
    pub moving: bool,
    /// Still a nanoframe under construction.
    pub being_built: bool,
    /// Paralyzed; commands zero speed but still gets pushed.
    pub stunned: bool,
    /// In the parachute drop state.
    pub falling: bool,
    /// Heading control currently owned by locomotion (false while skidding).
    pub use_heading: bool,
    /// Position is driven by a script, not by this core.
    pub using_script_move_type: bool,
    /// Refuses pushes from non-allied units.
    pub block_enemy_pushing: bool,
    /// Participates in blocking and collisions at all.
    pub blocking: bool,
    /// Immobile structure.
    pub is_structure: bool,
    /// Factory with a yard that can open for traffic.
    pub is_factory: bool,
    /// Yard currently open (units may drive through).
    pub yard_open: bool,
    /// Aircraft (possibly landed).
    pub is_air_unit: bool,
    /// Transport currently carrying this unit.
    pub transporter: Option<UnitId>,
    /// Transport this unit is walking into.
    pub loading_transport: Option<UnitId>,
    /// Accumulated impulse not yet converted into a skid.
    pub residual_impulse: Vec3Fixed,
    /// First-person control inputs, when a player is driving.
    pub fps_control: Option<FpsControl>,
    /// Primary weapon for in-place aiming.
    pub weapon: Option<MainWeapon>,
    /// Marked for removal at the end of the tick.
    pub dead: bool,
}

impl Unit {
    /// Create a unit at a position with the given profile.
    #[must_use]
    pub fn new(pos: Vec3Fixed, data: UnitData, move_def: Option<MoveDef>) -> Self {
        let (xsize, zsize) = move_def.as_ref().map_or((2, 2), |md| (md.xsize, md.zsize));
        let radius = crate::move_def::footprint_radius(xsize, zsize, Fixed::from_num(0.75));

        Self {
            id: 0,
            ally_team: 0,
            pos,
            speed: Vec3Fixed::ZERO,
            heading: 0,
            frontdir: Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::ONE),
            rightdir: Vec3Fixed::new(-Fixed::ONE, Fixed::ZERO, Fixed::ZERO),
            updir: Vec3Fixed::UP,
            physical_state: PhysicalState::OnGround,
            xsize,
            zsize,
            mass: Fixed::from_num(100),
            radius,
            health: Fixed::from_num(100),
            data,
            move_def,
            commands: CommandQueue::new(),
            moving: false,
            being_built: false,
            stunned: false,
            falling: false,
            use_heading: true,
            using_script_move_type: false,
            block_enemy_pushing: false,
            blocking: true,
            is_structure: false,
            is_factory: false,
            yard_open: false,
            is_air_unit: false,
            transporter: None,
            loading_transport: None,
            residual_impulse: Vec3Fixed::ZERO,
            fps_control: None,
            weapon: None,
            dead: false,
        }
    }

    /// Blocking-map identity of this unit.
    #[must_use]
    pub const fn object_id(&self) -> ObjectId {
        ObjectId::Unit(self.id)
    }

    /// Translate by a delta.
    pub fn move_by(&mut self, delta: Vec3Fixed) {
        self.pos += delta;
    }

    /// Replace the height coordinate.
    pub fn set_height(&mut self, y: Fixed) {
        self.pos.y = y;
    }

    /// Whether the unit's base is below the water surface.
    #[must_use]
    pub fn in_water(&self) -> bool {
        self.pos.y < Fixed::ZERO
    }

    /// Rebuild the basis vectors from the heading, tilting the up axis to
    /// the terrain normal when requested.
    pub fn update_dir_vectors(&mut self, use_ground_normal: bool, map: &HeightMap) {
        self.updir = if use_ground_normal && map.in_bounds(self.pos) {
            map.normal(self.pos.x, self.pos.z)
        } else {
            Vec3Fixed::UP
        };
        let (front, right) = basis_from_heading(self.heading, self.updir);
        self.frontdir = front;
        self.rightdir = right;
    }

    /// Apply damage; marks the unit dead at zero health.
    pub fn do_damage(&mut self, amount: Fixed) {
        if amount <= Fixed::ZERO {
            return;
        }
        self.health = (self.health - amount).max(Fixed::ZERO);
        if self.health == Fixed::ZERO {
            self.dead = true;
        }
    }

    /// Kill outright, transferring a death impulse into the wreck velocity.
    pub fn kill(&mut self, impulse: Vec3Fixed) {
        self.dead = true;
        self.health = Fixed::ZERO;
        if self.mass > Fixed::ZERO {
            self.speed += impulse / self.mass;
        }
    }

    /// Footprint used for blocking: the movement profile's when mobile, the
    /// instance's otherwise.
    #[must_use]
    pub fn footprint(&self) -> (i32, i32) {
        self.move_def
            .as_ref()
            .map_or((self.xsize, self.zsize), |md| (md.xsize, md.zsize))
    }
}

/// Slot arena of units; ids are slot indices and stay stable for a unit's
/// whole lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitArena {
    slots: Vec<Option<Unit>>,
}

impl UnitArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a unit and return its id.
    pub fn insert(&mut self, mut unit: Unit) -> UnitId {
        let id = self.slots.len() as UnitId;
        unit.id = id;
        self.slots.push(Some(unit));
        id
    }

    /// Shared access by id.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    /// Mutable access by id.
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.slots.get_mut(id as usize).and_then(Option::as_mut)
    }

    /// Remove the unit from its slot for exclusive processing.
    pub fn take(&mut self, id: UnitId) -> Option<Unit> {
        self.slots.get_mut(id as usize).and_then(Option::take)
    }

    /// Return a taken unit to its slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot is occupied or the id was never allocated.
    pub fn put_back(&mut self, id: UnitId, unit: Unit) {
        let slot = &mut self.slots[id as usize];
        assert!(slot.is_none(), "slot {id} is occupied");
        *slot = Some(unit);
    }

    /// Remove a unit permanently.
    pub fn remove(&mut self, id: UnitId) -> Option<Unit> {
        self.take(id)
    }

    /// Live unit ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<UnitId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i as UnitId))
            .collect()
    }

    /// Number of live units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether no units are alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate live units in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.slots.iter().filter_map(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::move_def::MoveFamily;

    #[test]
    fn test_arena_insert_take_put_back() {
        let mut arena = UnitArena::new();
        let id = arena.insert(Unit::new(
            Vec3Fixed::from_ints(10, 0, 10),
            UnitData::default(),
            Some(MoveDef::new(MoveFamily::Tank, 2, 2)),
        ));

        let unit = arena.take(id).unwrap();
        assert!(arena.get(id).is_none());
        arena.put_back(id, unit);
        assert_eq!(arena.get(id).unwrap().id, id);
    }

    #[test]
    fn test_ids_ascending() {
        let mut arena = UnitArena::new();
        for _ in 0..4 {
            arena.insert(Unit::new(Vec3Fixed::ZERO, UnitData::default(), None));
        }
        arena.remove(2);
        assert_eq!(arena.ids(), vec![0, 1, 3]);
    }

    #[test]
    fn test_damage_and_kill() {
        let mut unit = Unit::new(Vec3Fixed::ZERO, UnitData::default(), None);
        unit.do_damage(Fixed::from_num(40));
        assert!(!unit.dead);
        unit.do_damage(Fixed::from_num(100));
        assert!(unit.dead);
    }

    #[test]
    fn test_kill_impulse_scales_by_mass() {
        let mut unit = Unit::new(Vec3Fixed::ZERO, UnitData::default(), None);
        unit.mass = Fixed::from_num(50);
        unit.kill(Vec3Fixed::from_ints(100, 0, 0));
        assert_eq!(unit.speed.x, Fixed::from_num(2));
    }

    #[test]
    fn test_update_dir_vectors_flat() {
        let map = HeightMap::flat(16, 16, Fixed::ZERO);
        let mut unit = Unit::new(Vec3Fixed::from_ints(64, 0, 64), UnitData::default(), None);
        unit.heading = 16384;
        unit.update_dir_vectors(true, &map);
        assert!((unit.frontdir.x - Fixed::ONE).abs() < Fixed::from_num(0.01));
        assert_eq!(unit.updir, Vec3Fixed::UP);
    }
}
