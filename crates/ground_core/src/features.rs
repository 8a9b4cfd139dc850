//! World features: wrecks, rocks, trees.
//!
//! Features are passive solids. They block, can be crushed, and can be
//! shoved a little by collision responses, but they never steer.

use serde::{Deserialize, Serialize};

use crate::blocking::ObjectId;
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::move_def::footprint_radius;

/// Unique identifier for features.
pub type FeatureId = u32;

/// How the render layer represents a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FeatureDrawType {
    /// Regular model (wreck, rock).
    #[default]
    Model,
    /// Tree of the given kind; handled by the tree view.
    Tree(u8),
}

/// A passive solid object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Arena id.
    pub id: FeatureId,
    /// World position.
    pub pos: Vec3Fixed,
    /// Velocity; nonzero only after a shove or while toppling.
    pub speed: Vec3Fixed,
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
    /// Whether the feature obstructs movement.
    pub blocking: bool,
    /// Whether heavy movers may flatten it.
    pub crushable: bool,
    /// Resistance compared against the crusher's crush strength.
    #[serde(with = "fixed_serde")]
    pub crush_resistance: Fixed,
    /// Currently being shoved or toppling.
    pub is_moving: bool,
    /// Render classification.
    pub draw_type: FeatureDrawType,
    /// Marked for removal at the end of the tick.
    pub dead: bool,
}

impl Feature {
    /// Create a blocking, crushable feature.
    #[must_use]
    pub fn new(pos: Vec3Fixed, xsize: i32, zsize: i32, mass: Fixed) -> Self {
        Self {
            id: 0,
            pos,
            speed: Vec3Fixed::ZERO,
            xsize,
            zsize,
            mass,
            radius: footprint_radius(xsize, zsize, Fixed::from_num(0.75)),
            health: Fixed::from_num(50),
            blocking: true,
            crushable: true,
            crush_resistance: Fixed::ZERO,
            is_moving: false,
            draw_type: FeatureDrawType::Model,
            dead: false,
        }
    }

    /// Builder: mark as a tree of the given kind.
    #[must_use]
    pub fn as_tree(mut self, kind: u8) -> Self {
        self.draw_type = FeatureDrawType::Tree(kind);
        self
    }

    /// Builder: set crush resistance.
    #[must_use]
    pub fn with_crush_resistance(mut self, resistance: Fixed) -> Self {
        self.crush_resistance = resistance;
        self
    }

    /// Blocking-map identity of this feature.
    #[must_use]
    pub const fn object_id(&self) -> ObjectId {
        ObjectId::Feature(self.id)
    }

    /// Apply damage; marks the feature dead at zero health.
    pub fn do_damage(&mut self, amount: Fixed) {
        if amount <= Fixed::ZERO {
            return;
        }
        self.health = (self.health - amount).max(Fixed::ZERO);
        if self.health == Fixed::ZERO {
            self.dead = true;
        }
    }

    /// Destroy outright, transferring the impulse into topple velocity.
    pub fn kill(&mut self, impulse: Vec3Fixed) {
        self.dead = true;
        self.health = Fixed::ZERO;
        if self.mass > Fixed::ZERO {
            self.speed += impulse / self.mass;
        }
    }
}

/// Slot arena of features; ids are stable slot indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureArena {
    slots: Vec<Option<Feature>>,
}

impl FeatureArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a feature and return its id.
    pub fn insert(&mut self, mut feature: Feature) -> FeatureId {
        let id = self.slots.len() as FeatureId;
        feature.id = id;
        self.slots.push(Some(feature));
        id
    }

    /// Shared access by id.
    #[must_use]
    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    /// Mutable access by id.
    pub fn get_mut(&mut self, id: FeatureId) -> Option<&mut Feature> {
        self.slots.get_mut(id as usize).and_then(Option::as_mut)
    }

    /// Remove a feature permanently.
    pub fn remove(&mut self, id: FeatureId) -> Option<Feature> {
        self.slots.get_mut(id as usize).and_then(Option::take)
    }

    /// Live feature ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<FeatureId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i as FeatureId))
            .collect()
    }

    /// Iterate live features in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.slots.iter().filter_map(Option::as_ref)
    }
}
