//! Points, bounding boxes, and the eight tree-child directions.

use derive_more::{Add, AddAssign, Display, Sub, SubAssign};

/// Ordered triple of double-precision coordinates.
///
/// In 2D mode `z` is carried but ignored by every geometric operation.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Display, Add, AddAssign, Sub, SubAssign,
)]
#[display("<x={x} y={y} z={z}>")]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn new_2d(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    fn midpoint(self, other: Point) -> Point {
        Point::new(
            (self.x + other.x) / 2.0,
            (self.y + other.y) / 2.0,
            (self.z + other.z) / 2.0,
        )
    }
}

/// One of the (up to) eight child-region directions of a tree node.
///
/// The first four variants are the 2D quadrant directions used by subset decoding
/// (`nwd = 0, ned = 1, swd = 2, sed = 3`); the `u`/`d` (up/down) suffix distinguishes
/// the vertical half in 3D mode, where it is ignored in 2D.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Nwd,
    Ned,
    Swd,
    Sed,
    Nwu,
    Neu,
    Swu,
    Seu,
}

impl Direction {
    /// Decode two bits into a 2D quadrant direction (`nwd=0, ned=1, swd=2, sed=3`).
    pub fn from_2d_bits(bits: u8) -> Direction {
        match bits & 0b11 {
            0 => Direction::Nwd,
            1 => Direction::Ned,
            2 => Direction::Swd,
            3 => Direction::Sed,
            _ => unreachable!(),
        }
    }

    fn west(self) -> bool {
        matches!(self, Direction::Nwd | Direction::Nwu | Direction::Swd | Direction::Swu)
    }

    fn north(self) -> bool {
        matches!(self, Direction::Nwd | Direction::Nwu | Direction::Ned | Direction::Neu)
    }

    fn up(self) -> bool {
        matches!(self, Direction::Nwu | Direction::Neu | Direction::Swu | Direction::Seu)
    }
}

/// A 2D or 3D axis-aligned bounding region.
///
/// Invariant: `min.i <= max.i` for every active axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
    pub is_3d: bool,
}

impl BBox {
    pub fn new(min: Point, max: Point, is_3d: bool) -> Self {
        assert!(min.x <= max.x, "BBox.min.x must be <= max.x");
        assert!(min.y <= max.y, "BBox.min.y must be <= max.y");
        if is_3d {
            assert!(min.z <= max.z, "BBox.min.z must be <= max.z");
        }
        Self { min, max, is_3d }
    }

    pub fn volume(&self) -> f64 {
        let dx = self.max.x - self.min.x;
        let dy = self.max.y - self.min.y;
        if self.is_3d {
            dx * dy * (self.max.z - self.min.z)
        } else {
            dx * dy
        }
    }

    /// Compute the child region for `direction`, halving each active axis.
    pub fn go(&self, direction: Direction) -> BBox {
        let mid = self.min.midpoint(self.max);

        let (x_lo, x_hi) = if direction.west() {
            (self.min.x, mid.x)
        } else {
            (mid.x, self.max.x)
        };
        let (y_lo, y_hi) = if direction.north() {
            (mid.y, self.max.y)
        } else {
            (self.min.y, mid.y)
        };
        let (z_lo, z_hi) = if self.is_3d {
            if direction.up() {
                (mid.z, self.max.z)
            } else {
                (self.min.z, mid.z)
            }
        } else {
            (self.min.z, self.max.z)
        };

        BBox::new(
            Point::new(x_lo, y_lo, z_lo),
            Point::new(x_hi, y_hi, z_hi),
            self.is_3d,
        )
    }

    pub fn go_nwd(&self) -> BBox {
        self.go(Direction::Nwd)
    }

    pub fn go_ned(&self) -> BBox {
        self.go(Direction::Ned)
    }

    pub fn go_swd(&self) -> BBox {
        self.go(Direction::Swd)
    }

    pub fn go_sed(&self) -> BBox {
        self.go(Direction::Sed)
    }
}
