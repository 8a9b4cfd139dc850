//! Precomputed straight-segment square cache.
//!
//! For every (dx, dz) offset inside an 11×11 window the table stores the
//! grid squares a segment from the window center to that offset passes
//! through. Segment passability checks then become a handful of table
//! lookups instead of a fresh line walk.

use serde::{Deserialize, Serialize};

use crate::math::Fixed;

/// Window side length; offsets range over [−5, +5] in both axes.
pub const LINETABLE_SIZE: i32 = 11;

const HALF: i32 = LINETABLE_SIZE / 2;

/// Square-offset cache for straight segments inside the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineTable {
    entries: Vec<Vec<(i32, i32)>>,
}

impl Default for LineTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LineTable {
    /// Build the table. Pure fixed-point arithmetic, identical on all hosts.
    #[must_use]
    pub fn new() -> Self {
        let mut entries = vec![Vec::new(); (LINETABLE_SIZE * LINETABLE_SIZE) as usize];

        for zt in 0..LINETABLE_SIZE {
            for xt in 0..LINETABLE_SIZE {
                let cell = &mut entries[(zt * LINETABLE_SIZE + xt) as usize];

                let half = Fixed::from_num(0.5);
                let start_x = half;
                let start_z = half;
                let to_x = Fixed::from_num(xt - HALF) + half;
                let to_z = Fixed::from_num(zt - HALF) + half;

                let dx = to_x - start_x;
                let dz = to_z - start_z;

                if xt == HALF {
                    let end: i64 = to_z.floor().to_num();
                    if dz > Fixed::ZERO {
                        for a in 1..=end as i32 {
                            cell.push((0, a));
                        }
                    } else {
                        let mut a = -1;
                        while a >= end as i32 {
                            cell.push((0, a));
                            a -= 1;
                        }
                    }
                } else if zt == HALF {
                    let end: i64 = to_x.floor().to_num();
                    if dx > Fixed::ZERO {
                        for a in 1..=end as i32 {
                            cell.push((a, 0));
                        }
                    } else {
                        let mut a = -1;
                        while a >= end as i32 {
                            cell.push((a, 0));
                            a -= 1;
                        }
                    }
                } else {
                    let mut xp = start_x;
                    let mut zp = start_z;
                    let nudge = Fixed::from_num(0.0001);
                    let mut keepgoing = true;

                    while keepgoing {
                        let xn = if dx > Fixed::ZERO {
                            (xp.floor() + Fixed::ONE - xp) / dx
                        } else {
                            (xp.floor() - xp) / dx
                        };
                        let zn = if dz > Fixed::ZERO {
                            (zp.floor() + Fixed::ONE - zp) / dz
                        } else {
                            (zp.floor() - zp) / dz
                        };

                        let step = if xn < zn { xn } else { zn } + nudge;
                        xp += step * dx;
                        zp += step * dz;

                        keepgoing = (xp - start_x).abs() <= (to_x - start_x).abs()
                            && (zp - start_z).abs() <= (to_z - start_z).abs();

                        let px: i64 = xp.floor().to_num();
                        let pz: i64 = zp.floor().to_num();
                        let (px, pz) = (px as i32, pz as i32);

                        if px < -HALF || px > HALF || pz < -HALF || pz > HALF {
                            continue;
                        }
                        cell.push((px, pz));
                    }
                }
            }
        }

        Self { entries }
    }

    /// Square offsets crossed by a segment from the center to (dx, dz).
    ///
    /// # Panics
    ///
    /// Panics when either offset lies outside [−5, +5].
    #[must_use]
    pub fn squares(&self, dx: i32, dz: i32) -> &[(i32, i32)] {
        assert!(dx.abs() <= HALF && dz.abs() <= HALF, "offset outside window");
        &self.entries[((dz + HALF) * LINETABLE_SIZE + (dx + HALF)) as usize]
    }

    /// Whether an offset fits inside the window.
    #[must_use]
    pub fn covers(dx: i32, dz: i32) -> bool {
        dx.abs() <= HALF && dz.abs() <= HALF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_aligned_runs() {
        let table = LineTable::new();
        assert_eq!(table.squares(0, 3), &[(0, 1), (0, 2), (0, 3)]);
        assert_eq!(table.squares(-2, 0), &[(-1, 0), (-2, 0)]);
        assert!(table.squares(0, 0).is_empty());
    }

    #[test]
    fn test_diagonal_contains_target() {
        let table = LineTable::new();
        let squares = table.squares(3, 3);
        assert!(squares.contains(&(3, 3)), "squares = {squares:?}");
        assert!(squares.len() >= 3);
    }

    #[test]
    fn test_all_entries_within_window() {
        let table = LineTable::new();
        for dz in -5..=5 {
            for dx in -5..=5 {
                for &(x, z) in table.squares(dx, dz) {
                    assert!(x.abs() <= 5 && z.abs() <= 5);
                }
            }
        }
    }

    #[test]
    fn test_deterministic_build() {
        let a = LineTable::new();
        let b = LineTable::new();
        for dz in -5..=5 {
            for dx in -5..=5 {
                assert_eq!(a.squares(dx, dz), b.squares(dx, dz));
            }
        }
    }
}
