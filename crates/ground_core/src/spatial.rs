//! Uniform-grid spatial index for radius queries.
//!
//! Rebuilt once per tick from arena state; query results are returned in
//! ascending id order so iteration over neighbors is host-independent.

use serde::{Deserialize, Serialize};

use crate::blocking::ObjectId;
use crate::features::{FeatureArena, FeatureId};
use crate::map::HeightMap;
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::unit::{UnitArena, UnitId};

/// Side length of one index cell in world units.
const CELL_SIZE: i32 = 32;

/// Spatial index over units and features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialGrid {
    xcells: i32,
    zcells: i32,
    unit_cells: Vec<Vec<UnitId>>,
    feature_cells: Vec<Vec<FeatureId>>,
    #[serde(with = "fixed_serde")]
    max_unit_radius: Fixed,
    #[serde(with = "fixed_serde")]
    max_feature_radius: Fixed,
}

impl SpatialGrid {
    /// Create an empty index covering the map.
    #[must_use]
    pub fn new(map: &HeightMap) -> Self {
        let xcells = (map.xsquares() * crate::map::SQUARE_SIZE + CELL_SIZE - 1) / CELL_SIZE;
        let zcells = (map.zsquares() * crate::map::SQUARE_SIZE + CELL_SIZE - 1) / CELL_SIZE;
        Self {
            xcells: xcells.max(1),
            zcells: zcells.max(1),
            unit_cells: vec![Vec::new(); (xcells.max(1) * zcells.max(1)) as usize],
            feature_cells: vec![Vec::new(); (xcells.max(1) * zcells.max(1)) as usize],
            max_unit_radius: Fixed::ZERO,
            max_feature_radius: Fixed::ZERO,
        }
    }

    fn cell_of(&self, pos: Vec3Fixed) -> (i32, i32) {
        let cx: i64 = (pos.x / Fixed::from_num(CELL_SIZE)).floor().to_num();
        let cz: i64 = (pos.z / Fixed::from_num(CELL_SIZE)).floor().to_num();
        (
            (cx as i32).clamp(0, self.xcells - 1),
            (cz as i32).clamp(0, self.zcells - 1),
        )
    }

    fn index(&self, cx: i32, cz: i32) -> usize {
        (cz * self.xcells + cx) as usize
    }

    /// Repopulate the index from current arena state.
    pub fn rebuild(&mut self, units: &UnitArena, features: &FeatureArena) {
        for cell in &mut self.unit_cells {
            cell.clear();
        }
        for cell in &mut self.feature_cells {
            cell.clear();
        }
        self.max_unit_radius = Fixed::ZERO;
        self.max_feature_radius = Fixed::ZERO;

        for unit in units.iter() {
            let (cx, cz) = self.cell_of(unit.pos);
            let i = self.index(cx, cz);
            self.unit_cells[i].push(unit.id);
            self.max_unit_radius = self.max_unit_radius.max(unit.radius);
        }
        for feature in features.iter() {
            let (cx, cz) = self.cell_of(feature.pos);
            let i = self.index(cx, cz);
            self.feature_cells[i].push(feature.id);
            self.max_feature_radius = self.max_feature_radius.max(feature.radius);
        }
    }

    fn cell_range(&self, center: Vec3Fixed, reach: Fixed) -> (i32, i32, i32, i32) {
        let lo = Vec3Fixed::new(center.x - reach, Fixed::ZERO, center.z - reach);
        let hi = Vec3Fixed::new(center.x + reach, Fixed::ZERO, center.z + reach);
        let (cx1, cz1) = self.cell_of(lo);
        let (cx2, cz2) = self.cell_of(hi);
        (cx1, cz1, cx2, cz2)
    }

    /// Units whose collision circles intersect the query circle, ascending id.
    ///
    /// An object counts as inside when `|center − pos| < radius + obj.radius`,
    /// measured in 3D like every other contact test.
    #[must_use]
    pub fn units_exact(&self, center: Vec3Fixed, radius: Fixed, units: &UnitArena) -> Vec<UnitId> {
        let (cx1, cz1, cx2, cz2) = self.cell_range(center, radius + self.max_unit_radius);
        let mut out = Vec::new();

        for cz in cz1..=cz2 {
            for cx in cx1..=cx2 {
                for &id in &self.unit_cells[self.index(cx, cz)] {
                    let Some(unit) = units.get(id) else { continue };
                    let reach = radius + unit.radius;
                    if center.distance_sq(unit.pos) < reach * reach {
                        out.push(id);
                    }
                }
            }
        }

        out.sort_unstable();
        out
    }

    /// Features whose collision circles intersect the query circle, ascending id.
    #[must_use]
    pub fn features_exact(
        &self,
        center: Vec3Fixed,
        radius: Fixed,
        features: &FeatureArena,
    ) -> Vec<FeatureId> {
        let (cx1, cz1, cx2, cz2) = self.cell_range(center, radius + self.max_feature_radius);
        let mut out = Vec::new();

        for cz in cz1..=cz2 {
            for cx in cx1..=cx2 {
                for &id in &self.feature_cells[self.index(cx, cz)] {
                    let Some(feature) = features.get(id) else { continue };
                    let reach = radius + feature.radius;
                    if center.distance_sq(feature.pos) < reach * reach {
                        out.push(id);
                    }
                }
            }
        }

        out.sort_unstable();
        out
    }

    /// All solids inside the query circle: units first, then features, each
    /// in ascending id order.
    #[must_use]
    pub fn solids_exact(
        &self,
        center: Vec3Fixed,
        radius: Fixed,
        units: &UnitArena,
        features: &FeatureArena,
    ) -> Vec<ObjectId> {
        let mut out: Vec<ObjectId> = self
            .units_exact(center, radius, units)
            .into_iter()
            .map(ObjectId::Unit)
            .collect();
        out.extend(
            self.features_exact(center, radius, features)
                .into_iter()
                .map(ObjectId::Feature),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{Unit, UnitData};

    fn setup() -> (HeightMap, UnitArena, FeatureArena, SpatialGrid) {
        let map = HeightMap::flat(64, 64, Fixed::ZERO);
        let grid = SpatialGrid::new(&map);
        (map, UnitArena::new(), FeatureArena::new(), grid)
    }

    #[test]
    fn test_units_within_radius() {
        let (_map, mut units, features, mut grid) = setup();
        let a = units.insert(Unit::new(
            Vec3Fixed::from_ints(100, 0, 100),
            UnitData::default(),
            None,
        ));
        let b = units.insert(Unit::new(
            Vec3Fixed::from_ints(130, 0, 100),
            UnitData::default(),
            None,
        ));
        let _far = units.insert(Unit::new(
            Vec3Fixed::from_ints(400, 0, 400),
            UnitData::default(),
            None,
        ));

        grid.rebuild(&units, &features);
        let found = grid.units_exact(Vec3Fixed::from_ints(100, 0, 100), Fixed::from_num(25), &units);
        assert_eq!(found, vec![a, b]);
    }

    #[test]
    fn test_query_crosses_cell_borders() {
        let (_map, mut units, features, mut grid) = setup();
        let a = units.insert(Unit::new(
            Vec3Fixed::from_ints(31, 0, 31),
            UnitData::default(),
            None,
        ));
        let b = units.insert(Unit::new(
            Vec3Fixed::from_ints(33, 0, 33),
            UnitData::default(),
            None,
        ));

        grid.rebuild(&units, &features);
        let found = grid.units_exact(Vec3Fixed::from_ints(32, 0, 32), Fixed::from_num(10), &units);
        assert_eq!(found, vec![a, b]);
    }

    #[test]
    fn test_solids_order_units_then_features() {
        let (_map, mut units, mut features, mut grid) = setup();
        let u = units.insert(Unit::new(
            Vec3Fixed::from_ints(64, 0, 64),
            UnitData::default(),
            None,
        ));
        let f = features.insert(crate::features::Feature::new(
            Vec3Fixed::from_ints(70, 0, 64),
            2,
            2,
            Fixed::from_num(10),
        ));

        grid.rebuild(&units, &features);
        let found = grid.solids_exact(
            Vec3Fixed::from_ints(64, 0, 64),
            Fixed::from_num(32),
            &units,
            &features,
        );
        assert_eq!(found, vec![ObjectId::Unit(u), ObjectId::Feature(f)]);
    }
}
