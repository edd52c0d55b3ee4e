//! `Climber`: a transient tree walker used to resolve a subset's bounding box.

use crate::error::ClimberError;
use crate::geometry::{BBox, Direction};
use crate::id::Id;
use crate::structure::Structure;

/// Descends a tree one child at a time, tracking the current tree index and bounding
/// region. Used only to compute a subset shard's spatial extent; the index algebra
/// itself never needs a stateful walker.
pub struct Climber {
    factor: u64,
    index: Id,
    bbox: BBox,
}

impl Climber {
    pub fn new(factor: u64, bbox: BBox) -> Climber {
        Climber {
            factor,
            index: Id::ZERO,
            bbox,
        }
    }

    pub fn index(&self) -> Id {
        self.index
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    /// Step to the `direction` child: `child(i, c) = i*factor + 1 + c` for the
    /// level-order numbering this crate uses for tree indices.
    pub fn go(&mut self, direction: Direction, child: u64) {
        self.bbox = self.bbox.go(direction);
        self.index = self.index.mul_small(self.factor) + Id::new(1) + Id::from(child);
    }
}

/// Compute the bounding region of a subset shard by descending `log_4(splits)` times,
/// decoding two bits of `id` per step.
///
/// 3D splitting is not supported; unknown `splits` values are rejected (though by
/// construction a [`Structure`] can only ever carry a validated `splits` of `{4, 16, 64}`).
pub fn subset_bbox(structure: &Structure, full: BBox) -> Result<BBox, ClimberError> {
    if structure.is_3d() {
        return Err(ClimberError::UnsupportedSplit3D);
    }

    let (id, splits) = structure.subset();
    let times = match splits {
        0 => 0,
        4 => 1,
        16 => 2,
        64 => 3,
        other => return Err(ClimberError::UnknownSplit(other)),
    };

    let mut climber = Climber::new(structure.factor(), full);
    for step in 0..times {
        let bits = ((id >> (2 * step)) & 0b11) as u8;
        let direction = Direction::from_2d_bits(bits);
        climber.go(direction, bits as u64);
    }
    Ok(climber.bbox())
}
