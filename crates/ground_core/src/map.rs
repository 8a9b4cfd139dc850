//! Terrain height field and the queries the locomotion core needs from it.
//!
//! The map is a grid of squares, [`SQUARE_SIZE`] world units (elmos) on a
//! side, with heights stored at square corners. Height lookups interpolate
//! bilinearly; normals and slopes are per-square.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec3Fixed};

/// Side length of one terrain square in world units.
pub const SQUARE_SIZE: i32 = 8;

/// Terrain height field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightMap {
    xsquares: i32,
    zsquares: i32,
    /// Corner heights, row-major, (xsquares + 1) × (zsquares + 1).
    corners: Vec<Fixed>,
    /// Gravity in elmos per tick squared (negative, pulls down).
    #[serde(with = "fixed_serde")]
    gravity: Fixed,
}

impl HeightMap {
    /// Create a flat map at the given height level.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is zero.
    #[must_use]
    pub fn flat(xsquares: i32, zsquares: i32, level: Fixed) -> Self {
        Self::from_fn(xsquares, zsquares, |_, _| level)
    }

    /// Create a map from a corner-height function.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is zero.
    pub fn from_fn<F: FnMut(i32, i32) -> Fixed>(xsquares: i32, zsquares: i32, mut f: F) -> Self {
        assert!(xsquares > 0, "map xsquares must be positive");
        assert!(zsquares > 0, "map zsquares must be positive");

        let mut corners = Vec::with_capacity(((xsquares + 1) * (zsquares + 1)) as usize);
        for cz in 0..=zsquares {
            for cx in 0..=xsquares {
                corners.push(f(cx, cz));
            }
        }

        Self {
            xsquares,
            zsquares,
            corners,
            gravity: Fixed::from_num(-0.144),
        }
    }

    /// Replace the gravity constant (elmos per tick squared, negative).
    #[must_use]
    pub fn with_gravity(mut self, gravity: Fixed) -> Self {
        self.gravity = gravity;
        self
    }

    /// Gravity in elmos per tick squared (negative).
    #[must_use]
    pub const fn gravity(&self) -> Fixed {
        self.gravity
    }

    /// Map width in squares.
    #[must_use]
    pub const fn xsquares(&self) -> i32 {
        self.xsquares
    }

    /// Map depth in squares.
    #[must_use]
    pub const fn zsquares(&self) -> i32 {
        self.zsquares
    }

    /// Map width in world units.
    #[must_use]
    pub fn width(&self) -> Fixed {
        Fixed::from_num(self.xsquares * SQUARE_SIZE)
    }

    /// Map depth in world units.
    #[must_use]
    pub fn depth(&self) -> Fixed {
        Fixed::from_num(self.zsquares * SQUARE_SIZE)
    }

    fn corner(&self, cx: i32, cz: i32) -> Fixed {
        let cx = cx.clamp(0, self.xsquares);
        let cz = cz.clamp(0, self.zsquares);
        self.corners[(cz * (self.xsquares + 1) + cx) as usize]
    }

    /// Square indices containing the world position, clamped into the map.
    #[must_use]
    pub fn world_to_square(&self, pos: Vec3Fixed) -> (i32, i32) {
        let sx: i64 = (pos.x / Fixed::from_num(SQUARE_SIZE)).floor().to_num();
        let sz: i64 = (pos.z / Fixed::from_num(SQUARE_SIZE)).floor().to_num();
        (
            (sx as i32).clamp(0, self.xsquares - 1),
            (sz as i32).clamp(0, self.zsquares - 1),
        )
    }

    /// World-space center of a square.
    #[must_use]
    pub fn square_center(&self, sx: i32, sz: i32) -> Vec3Fixed {
        let half = Fixed::from_num(SQUARE_SIZE / 2);
        Vec3Fixed::new(
            Fixed::from_num(sx * SQUARE_SIZE) + half,
            Fixed::ZERO,
            Fixed::from_num(sz * SQUARE_SIZE) + half,
        )
    }

    /// True terrain height (may be below the water line).
    #[must_use]
    pub fn height_real(&self, x: Fixed, z: Fixed) -> Fixed {
        let sq = Fixed::from_num(SQUARE_SIZE);
        let fx = (x / sq).clamp(Fixed::ZERO, Fixed::from_num(self.xsquares));
        let fz = (z / sq).clamp(Fixed::ZERO, Fixed::from_num(self.zsquares));

        let ix: i64 = fx.floor().to_num();
        let iz: i64 = fz.floor().to_num();
        let ix = (ix as i32).min(self.xsquares - 1);
        let iz = (iz as i32).min(self.zsquares - 1);

        let tx = fx - Fixed::from_num(ix);
        let tz = fz - Fixed::from_num(iz);

        let h00 = self.corner(ix, iz);
        let h10 = self.corner(ix + 1, iz);
        let h01 = self.corner(ix, iz + 1);
        let h11 = self.corner(ix + 1, iz + 1);

        let hx0 = h00 + (h10 - h00) * tx;
        let hx1 = h01 + (h11 - h01) * tx;
        hx0 + (hx1 - hx0) * tz
    }

    /// Terrain height clamped to the water surface.
    #[must_use]
    pub fn height_above_water(&self, x: Fixed, z: Fixed) -> Fixed {
        self.height_real(x, z).max(Fixed::ZERO)
    }

    /// Upward surface normal of the square containing (x, z).
    #[must_use]
    pub fn normal(&self, x: Fixed, z: Fixed) -> Vec3Fixed {
        let (sx, sz) = self.world_to_square(Vec3Fixed::new(x, Fixed::ZERO, z));
        let sq = Fixed::from_num(SQUARE_SIZE);

        let h00 = self.corner(sx, sz);
        let h10 = self.corner(sx + 1, sz);
        let h01 = self.corner(sx, sz + 1);
        let h11 = self.corner(sx + 1, sz + 1);

        let two = Fixed::from_num(2);
        let dhdx = ((h10 + h11) - (h00 + h01)) / (two * sq);
        let dhdz = ((h01 + h11) - (h00 + h10)) / (two * sq);

        Vec3Fixed::new(-dhdx, Fixed::ONE, -dhdz).normalize()
    }

    /// Terrain slope at (x, z): `1 − normal.y`, 0 on flat ground.
    #[must_use]
    pub fn slope(&self, x: Fixed, z: Fixed) -> Fixed {
        Fixed::ONE - self.normal(x, z).y
    }

    /// Whether a position lies inside the playable rectangle.
    #[must_use]
    pub fn in_bounds(&self, pos: Vec3Fixed) -> bool {
        pos.x >= Fixed::ZERO && pos.x < self.width() && pos.z >= Fixed::ZERO && pos.z < self.depth()
    }

    /// Clamp a position into the playable rectangle.
    #[must_use]
    pub fn clamp_in_bounds(&self, pos: Vec3Fixed) -> Vec3Fixed {
        let margin = Fixed::from_num(0.001);
        Vec3Fixed::new(
            pos.x.clamp(Fixed::ZERO, self.width() - margin),
            pos.y,
            pos.z.clamp(Fixed::ZERO, self.depth() - margin),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_map_heights() {
        let map = HeightMap::flat(16, 16, Fixed::from_num(10));
        assert_eq!(
            map.height_real(Fixed::from_num(50), Fixed::from_num(77)),
            Fixed::from_num(10)
        );
        assert_eq!(map.slope(Fixed::from_num(50), Fixed::from_num(77)), Fixed::ZERO);
        assert_eq!(
            map.normal(Fixed::from_num(3), Fixed::from_num(3)),
            Vec3Fixed::UP
        );
    }

    #[test]
    fn test_height_above_water_clamps() {
        let map = HeightMap::flat(8, 8, Fixed::from_num(-20));
        assert_eq!(
            map.height_above_water(Fixed::from_num(10), Fixed::from_num(10)),
            Fixed::ZERO
        );
        assert_eq!(
            map.height_real(Fixed::from_num(10), Fixed::from_num(10)),
            Fixed::from_num(-20)
        );
    }

    #[test]
    fn test_ramp_slope_is_positive() {
        let map = HeightMap::from_fn(16, 16, |cx, _| Fixed::from_num(cx * 4));
        let slope = map.slope(Fixed::from_num(60), Fixed::from_num(60));
        assert!(slope > Fixed::from_num(0.05), "slope = {slope}");
        let n = map.normal(Fixed::from_num(60), Fixed::from_num(60));
        assert!(n.x < Fixed::ZERO);
    }

    #[test]
    fn test_world_to_square_and_back() {
        let map = HeightMap::flat(32, 32, Fixed::ZERO);
        let (sx, sz) = map.world_to_square(Vec3Fixed::from_ints(20, 0, 250));
        assert_eq!((sx, sz), (2, 31));
        let center = map.square_center(2, 31);
        assert_eq!(center.x, Fixed::from_num(20));
        assert_eq!(center.z, Fixed::from_num(252));
    }

    #[test]
    fn test_clamp_in_bounds() {
        let map = HeightMap::flat(8, 8, Fixed::ZERO);
        let p = map.clamp_in_bounds(Vec3Fixed::from_ints(-5, 3, 1000));
        assert!(map.in_bounds(p));
        assert_eq!(p.y, Fixed::from_num(3));
    }
}
