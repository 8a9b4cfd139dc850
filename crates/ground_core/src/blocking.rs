//! Ground blocking map.
//!
//! Every grounded solid object occupies a rectangle of terrain squares. The
//! map records, per square, which objects cover it, whether they count as
//! structures, and how crush-resistant they are; movers consult it for
//! passability and re-register their footprint after every collision pass.
//! A square covered only by objects a mover can crush is passable to it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::map::{HeightMap, SQUARE_SIZE};
use crate::math::{fixed_serde, Fixed, Vec3Fixed};

/// Identifier of a blockable solid object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectId {
    /// A unit.
    Unit(u32),
    /// A world feature.
    Feature(u32),
}

/// Per-square blocking classification bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockFlags(u8);

impl BlockFlags {
    /// No blockers on the square.
    pub const NONE: Self = Self(0);
    /// A mobile object occupies the square.
    pub const MOVING: Self = Self(1 << 0);
    /// A static (non-structure) object occupies the square.
    pub const STATIC: Self = Self(1 << 1);
    /// A structure occupies the square.
    pub const STRUCTURE: Self = Self(1 << 2);

    /// Union of two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether all bits of `other` are set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Whether no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct BlockEntry {
    id: ObjectId,
    flags: BlockFlags,
    crushable: bool,
    #[serde(with = "fixed_serde")]
    crush_resistance: Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct BlockRect {
    x1: i32,
    z1: i32,
    x2: i32,
    z2: i32,
}

/// Grid of square occupancy records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingMap {
    xsquares: i32,
    zsquares: i32,
    cells: Vec<Vec<BlockEntry>>,
    rects: BTreeMap<ObjectId, BlockRect>,
}

impl BlockingMap {
    /// Create an empty blocking map matching the terrain dimensions.
    #[must_use]
    pub fn new(map: &HeightMap) -> Self {
        let xsquares = map.xsquares();
        let zsquares = map.zsquares();
        Self {
            xsquares,
            zsquares,
            cells: vec![Vec::new(); (xsquares * zsquares) as usize],
            rects: BTreeMap::new(),
        }
    }

    fn index(&self, sx: i32, sz: i32) -> Option<usize> {
        if sx < 0 || sz < 0 || sx >= self.xsquares || sz >= self.zsquares {
            None
        } else {
            Some((sz * self.xsquares + sx) as usize)
        }
    }

    /// Register an object footprint centered on `pos`.
    ///
    /// Any previous registration of the same id is removed first, so callers
    /// may re-block every tick without bookkeeping of their own. Crushable
    /// objects record their resistance so profile-aware queries can look
    /// through them.
    #[allow(clippy::too_many_arguments)]
    pub fn block(
        &mut self,
        id: ObjectId,
        flags: BlockFlags,
        pos: Vec3Fixed,
        xsize: i32,
        zsize: i32,
        crushable: bool,
        crush_resistance: Fixed,
    ) {
        self.unblock(id);

        let sx: i64 = (pos.x / Fixed::from_num(SQUARE_SIZE)).floor().to_num();
        let sz: i64 = (pos.z / Fixed::from_num(SQUARE_SIZE)).floor().to_num();
        let (sx, sz) = (sx as i32, sz as i32);

        let rect = BlockRect {
            x1: sx - xsize / 2,
            z1: sz - zsize / 2,
            x2: sx - xsize / 2 + (xsize - 1).max(0),
            z2: sz - zsize / 2 + (zsize - 1).max(0),
        };

        for z in rect.z1..=rect.z2 {
            for x in rect.x1..=rect.x2 {
                if let Some(i) = self.index(x, z) {
                    let cell = &mut self.cells[i];
                    cell.push(BlockEntry {
                        id,
                        flags,
                        crushable,
                        crush_resistance,
                    });
                    cell.sort_unstable_by_key(|e| e.id);
                }
            }
        }

        self.rects.insert(id, rect);
    }

    /// Remove an object's footprint registration, if any.
    pub fn unblock(&mut self, id: ObjectId) {
        let Some(rect) = self.rects.remove(&id) else {
            return;
        };
        for z in rect.z1..=rect.z2 {
            for x in rect.x1..=rect.x2 {
                if let Some(i) = self.index(x, z) {
                    self.cells[i].retain(|e| e.id != id);
                }
            }
        }
    }

    /// Whether the object currently has a registered footprint.
    #[must_use]
    pub fn is_blocked_in(&self, id: ObjectId) -> bool {
        self.rects.contains_key(&id)
    }

    /// Combined blocking bits on a square, ignoring `ignore` (the querying
    /// object itself). Out-of-map squares report as structure-blocked.
    #[must_use]
    pub fn square_blocked(&self, sx: i32, sz: i32, ignore: Option<ObjectId>) -> BlockFlags {
        self.square_blocked_where(sx, sz, ignore, |_, _| true)
    }

    /// Like [`Self::square_blocked`], counting only entries for which `keep`
    /// returns true given (crushable, crush resistance). Movement profiles
    /// use this to look through anything they can flatten.
    #[must_use]
    pub fn square_blocked_where<F: FnMut(bool, Fixed) -> bool>(
        &self,
        sx: i32,
        sz: i32,
        ignore: Option<ObjectId>,
        mut keep: F,
    ) -> BlockFlags {
        let Some(i) = self.index(sx, sz) else {
            return BlockFlags::STRUCTURE.union(BlockFlags::STATIC);
        };

        let mut flags = BlockFlags::NONE;
        for entry in &self.cells[i] {
            if Some(entry.id) == ignore {
                continue;
            }
            if !keep(entry.crushable, entry.crush_resistance) {
                continue;
            }
            flags = flags.union(entry.flags);
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> HeightMap {
        HeightMap::flat(32, 32, Fixed::ZERO)
    }

    fn block_plain(
        blocking: &mut BlockingMap,
        id: ObjectId,
        flags: BlockFlags,
        pos: Vec3Fixed,
        xsize: i32,
        zsize: i32,
    ) {
        blocking.block(id, flags, pos, xsize, zsize, false, Fixed::ZERO);
    }

    #[test]
    fn test_block_and_query() {
        let m = map();
        let mut blocking = BlockingMap::new(&m);
        let id = ObjectId::Unit(3);

        block_plain(
            &mut blocking,
            id,
            BlockFlags::MOVING,
            Vec3Fixed::from_ints(100, 0, 100),
            2,
            2,
        );
        let flags = blocking.square_blocked(12, 12, None);
        assert!(flags.contains(BlockFlags::MOVING));
        assert!(!flags.contains(BlockFlags::STRUCTURE));
    }

    #[test]
    fn test_self_is_ignored() {
        let m = map();
        let mut blocking = BlockingMap::new(&m);
        let id = ObjectId::Unit(3);

        block_plain(
            &mut blocking,
            id,
            BlockFlags::MOVING,
            Vec3Fixed::from_ints(100, 0, 100),
            2,
            2,
        );
        assert!(blocking.square_blocked(12, 12, Some(id)).is_empty());
    }

    #[test]
    fn test_reblock_moves_footprint() {
        let m = map();
        let mut blocking = BlockingMap::new(&m);
        let id = ObjectId::Unit(1);

        block_plain(
            &mut blocking,
            id,
            BlockFlags::MOVING,
            Vec3Fixed::from_ints(100, 0, 100),
            2,
            2,
        );
        block_plain(
            &mut blocking,
            id,
            BlockFlags::MOVING,
            Vec3Fixed::from_ints(200, 0, 200),
            2,
            2,
        );

        assert!(blocking.square_blocked(12, 12, None).is_empty());
        assert!(blocking
            .square_blocked(25, 25, None)
            .contains(BlockFlags::MOVING));
    }

    #[test]
    fn test_out_of_map_is_structure_blocked() {
        let m = map();
        let blocking = BlockingMap::new(&m);
        assert!(blocking
            .square_blocked(-1, 4, None)
            .contains(BlockFlags::STRUCTURE));
        assert!(blocking
            .square_blocked(4, 32, None)
            .contains(BlockFlags::STRUCTURE));
    }

    #[test]
    fn test_crushable_entries_can_be_filtered() {
        let m = map();
        let mut blocking = BlockingMap::new(&m);
        let wreck = ObjectId::Feature(5);

        blocking.block(
            wreck,
            BlockFlags::STRUCTURE.union(BlockFlags::STATIC),
            Vec3Fixed::from_ints(100, 0, 100),
            2,
            2,
            true,
            Fixed::from_num(2),
        );

        // a profile with crush strength 10 looks through it
        let strong = blocking.square_blocked_where(12, 12, None, |crushable, resistance| {
            !(crushable && resistance < Fixed::from_num(10))
        });
        assert!(strong.is_empty());

        // one with crush strength 1 does not
        let weak = blocking.square_blocked_where(12, 12, None, |crushable, resistance| {
            !(crushable && resistance < Fixed::ONE)
        });
        assert!(weak.contains(BlockFlags::STRUCTURE));
    }

    #[test]
    fn test_unblock_clears_all_squares() {
        let m = map();
        let mut blocking = BlockingMap::new(&m);
        let id = ObjectId::Feature(9);

        block_plain(
            &mut blocking,
            id,
            BlockFlags::STATIC,
            Vec3Fixed::from_ints(64, 0, 64),
            4,
            4,
        );
        blocking.unblock(id);

        for z in 0..32 {
            for x in 0..32 {
                assert!(blocking.square_blocked(x, z, None).is_empty());
            }
        }
    }
}
