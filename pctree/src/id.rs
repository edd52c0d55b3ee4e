//! Arbitrary-width (within a `u128`) non-negative tree index.

use std::ops::{Add, Sub};

/// A non-negative integer wide enough to hold any tree index this crate produces.
///
/// A fixed 128-bit unsigned integer is sufficient for all realistic depth/chunk
/// configurations (see DESIGN.md); arithmetic is checked and panics on overflow or
/// underflow, since those indicate a corrupted `Structure` or a caller bug rather than
/// a recoverable condition.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
pub struct Id(u128);

impl Id {
    pub const ZERO: Id = Id(0);

    pub const fn new(value: u128) -> Self {
        Id(value)
    }

    pub const fn get(self) -> u128 {
        self.0
    }

    /// Multiply by a small integer. Panics on overflow.
    pub fn mul_small(self, k: u64) -> Id {
        Id(self
            .0
            .checked_mul(k as u128)
            .unwrap_or_else(|| panic!("Id overflow: {} * {}", self.0, k)))
    }

    /// Left-shift by a small bit count. Panics on overflow.
    pub fn shl(self, bits: u32) -> Id {
        Id(self
            .0
            .checked_shl(bits)
            .filter(|v| (*v >> bits) == self.0)
            .unwrap_or_else(|| panic!("Id overflow: {} << {}", self.0, bits)))
    }

    /// Division with remainder by a small integer.
    pub fn div_mod(self, k: u64) -> (Id, Id) {
        assert!(k != 0, "Id::div_mod by zero");
        let k = k as u128;
        (Id(self.0 / k), Id(self.0 % k))
    }

    pub fn div_small(self, k: u64) -> Id {
        self.div_mod(k).0
    }

    /// Narrow to a `u64`. Panics (`CapacityExceeded`) if the value is too wide.
    pub fn as_simple(self) -> u64 {
        u64::try_from(self.0)
            .unwrap_or_else(|_| panic!("Id {} exceeds u64 capacity (CapacityExceeded)", self.0))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Id(value as u128)
    }
}

impl Add for Id {
    type Output = Id;

    fn add(self, rhs: Id) -> Id {
        Id(self
            .0
            .checked_add(rhs.0)
            .unwrap_or_else(|| panic!("Id overflow: {} + {}", self.0, rhs.0)))
    }
}

impl Sub for Id {
    type Output = Id;

    fn sub(self, rhs: Id) -> Id {
        Id(self
            .0
            .checked_sub(rhs.0)
            .unwrap_or_else(|| panic!("Id underflow: {} - {}", self.0, rhs.0)))
    }
}
