//! Mod-rule flags and the persistent option store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Game-rule switches consumed by the locomotion core.
///
/// These are read-only during a session; changing one mid-game would desync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModInfo {
    /// Units take damage from hard collisions and ground impacts.
    pub allow_unit_collision_damage: bool,
    /// Collision radii shrink proportionally so pairs may overlap slightly.
    pub allow_unit_collision_overlap: bool,
    /// Enemy units can be pushed aside instead of acting as obstacles.
    pub allow_pushing_enemy_units: bool,
    /// Allied units can be crushed by heavier movers.
    pub allow_crushing_allied_units: bool,
    /// Ground units are subject to gravity and terrain-tangent integration.
    pub allow_ground_unit_gravity: bool,
    /// Hovercraft keep lateral momentum when turning.
    pub allow_hover_unit_strafing: bool,
}

impl Default for ModInfo {
    fn default() -> Self {
        Self {
            allow_unit_collision_damage: true,
            allow_unit_collision_overlap: true,
            allow_pushing_enemy_units: false,
            allow_crushing_allied_units: false,
            allow_ground_unit_gravity: true,
            allow_hover_unit_strafing: true,
        }
    }
}

/// Key of the persistent tree draw-radius option.
pub const CFG_TREE_RADIUS: &str = "TreeRadius";

/// Key of the persistent 3D-trees option.
pub const CFG_TREES_3D: &str = "3DTrees";

/// Persistent option store.
///
/// A string key/value map with registered defaults; the embedder loads it at
/// startup and persists it on shutdown. Consumers read their options once at
/// construction and write them back when torn down.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigStore {
    values: BTreeMap<String, String>,
}

impl ConfigStore {
    /// Create a store with the built-in defaults registered.
    #[must_use]
    pub fn new() -> Self {
        let mut store = Self::default();
        store.set_int(CFG_TREE_RADIUS, (5.5f64 * 256.0) as i64);
        store.set_bool(CFG_TREES_3D, true);
        store
    }

    /// Integer option; falls back to `default` when missing or malformed.
    #[must_use]
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.values
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Boolean option; falls back to `default` when missing or malformed.
    #[must_use]
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Set an integer option.
    pub fn set_int(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_owned(), value.to_string());
    }

    /// Set a boolean option.
    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_owned(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_registered() {
        let store = ConfigStore::new();
        assert_eq!(store.get_int(CFG_TREE_RADIUS, 0), 1408);
        assert!(store.get_bool(CFG_TREES_3D, false));
    }

    #[test]
    fn test_set_and_get_round_trip() {
        let mut store = ConfigStore::new();
        store.set_int(CFG_TREE_RADIUS, 512);
        assert_eq!(store.get_int(CFG_TREE_RADIUS, 0), 512);
        store.set_bool(CFG_TREES_3D, false);
        assert!(!store.get_bool(CFG_TREES_3D, true));
    }

    #[test]
    fn test_malformed_value_falls_back() {
        let mut store = ConfigStore::new();
        store.values.insert(CFG_TREE_RADIUS.into(), "wat".into());
        assert_eq!(store.get_int(CFG_TREE_RADIUS, 77), 77);
    }
}
