//! Typed errors for the recoverable boundary failures called out in the error design.
//!
//! Everything else in the index algebra (`IndexOutOfBand`, `CapacityExceeded`) is a
//! panic, not a value here, because those indicate a corrupted `Structure` or a
//! caller-level bug rather than a condition a caller should be expected to handle.

use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum StructureError {
    #[error("invalid structure configuration: {0}")]
    ConfigInvalid(String),
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ClimberError {
    #[error("octree split not yet supported")]
    UnsupportedSplit3D,
    #[error("unknown subset split value: {0}")]
    UnknownSplit(u64),
}
