//! `Structure`: the index configuration and its derived depth/chunk boundaries.

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkInfo;
use crate::error::StructureError;
use crate::id::Id;

/// Parameters used to construct a [`Structure`] directly (as opposed to from a
/// persisted [`StructureMetadata`] document).
#[derive(Clone, Debug)]
pub struct StructureParams {
    pub dimensions: u8,
    pub null_end: u64,
    pub base_end: u64,
    /// `None` means the cold band is unbounded.
    pub cold_end: Option<u64>,
    pub chunk_points: u64,
    pub dynamic_chunks: bool,
    /// `None`/zero means "never sparse".
    pub num_points_hint: Option<u64>,
    /// `(id, splits)`; `splits == 0` means "whole" (no subset).
    pub subset: (u64, u64),
}

/// The wire format for persisted `Structure` configuration (§6 of the spec).
///
/// `cold_depth == 0` is the on-disk sentinel for "unbounded", matching the external
/// contract; internally this is carried as `Option<u64>` instead (see DESIGN.md).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StructureMetadata {
    pub null_depth: u64,
    pub base_depth: u64,
    pub cold_depth: u64,
    pub chunk_points: u64,
    pub dimensions: u64,
    pub num_points_hint: u64,
    pub dynamic_chunks: bool,
    pub subset: [u64; 2],
}

impl From<&StructureParams> for StructureMetadata {
    fn from(p: &StructureParams) -> Self {
        StructureMetadata {
            null_depth: p.null_end,
            base_depth: p.base_end,
            cold_depth: p.cold_end.unwrap_or(0),
            chunk_points: p.chunk_points,
            dimensions: p.dimensions as u64,
            num_points_hint: p.num_points_hint.unwrap_or(0),
            dynamic_chunks: p.dynamic_chunks,
            subset: [p.subset.0, p.subset.1],
        }
    }
}

impl From<&StructureMetadata> for StructureParams {
    fn from(m: &StructureMetadata) -> Self {
        StructureParams {
            dimensions: m.dimensions as u8,
            null_end: m.null_depth,
            base_end: m.base_depth,
            cold_end: if m.cold_depth == 0 { None } else { Some(m.cold_depth) },
            chunk_points: m.chunk_points,
            dynamic_chunks: m.dynamic_chunks,
            num_points_hint: if m.num_points_hint == 0 { None } else { Some(m.num_points_hint) },
            subset: (m.subset[0], m.subset[1]),
        }
    }
}

/// Immutable index configuration plus its once-computed derived boundaries.
#[derive(Clone, Debug, PartialEq)]
pub struct Structure {
    dimensions: u8,
    factor: u64,
    bits_per_level: u32,

    null_end: u64,
    base_end: u64,
    cold_end: Option<u64>,
    chunk_points: u64,
    dynamic_chunks: bool,
    num_points_hint: u64,
    subset_id: u64,
    subset_splits: u64,

    null_index_end: Id,
    base_index_end: Id,
    cold_index_begin: Id,
    cold_index_end: Option<Id>,
    nominal_chunk_depth: u64,
    nominal_chunk_index: Id,
    sparse_depth_begin: Option<u64>,
    sparse_index_begin: Option<Id>,
}

impl Structure {
    pub fn new(params: StructureParams) -> Result<Structure, StructureError> {
        load_index_values(params)
    }

    pub fn from_metadata(meta: &StructureMetadata) -> Result<Structure, StructureError> {
        Structure::new(StructureParams::from(meta))
    }

    pub fn to_metadata(&self) -> StructureMetadata {
        StructureMetadata {
            null_depth: self.null_end,
            base_depth: self.base_end,
            cold_depth: self.cold_end.unwrap_or(0),
            chunk_points: self.chunk_points,
            dimensions: self.dimensions as u64,
            num_points_hint: self.num_points_hint,
            dynamic_chunks: self.dynamic_chunks,
            subset: [self.subset_id, self.subset_splits],
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.to_metadata()).expect("StructureMetadata is always valid JSON")
    }

    pub fn from_json(json: &str) -> Result<Structure, StructureError> {
        let meta: StructureMetadata = serde_json::from_str(json)
            .map_err(|e| StructureError::ConfigInvalid(format!("invalid metadata JSON: {e}")))?;
        Structure::from_metadata(&meta)
    }

    pub fn dimensions(&self) -> u8 {
        self.dimensions
    }

    pub fn is_3d(&self) -> bool {
        self.dimensions == 3
    }

    pub fn factor(&self) -> u64 {
        self.factor
    }

    pub fn null_end(&self) -> u64 {
        self.null_end
    }

    pub fn base_end(&self) -> u64 {
        self.base_end
    }

    pub fn cold_end(&self) -> Option<u64> {
        self.cold_end
    }

    pub fn base_chunk_points(&self) -> u64 {
        self.chunk_points
    }

    pub fn dynamic_chunks(&self) -> bool {
        self.dynamic_chunks
    }

    pub fn num_points_hint(&self) -> u64 {
        self.num_points_hint
    }

    pub fn subset(&self) -> (u64, u64) {
        (self.subset_id, self.subset_splits)
    }

    pub fn is_subset(&self) -> bool {
        self.subset_splits != 0
    }

    /// The string appended to chunk store artifact names when this is a subset shard,
    /// e.g. `"-3"`; empty when this is the whole index.
    pub fn subset_postfix(&self) -> String {
        if self.is_subset() {
            format!("-{}", self.subset_id)
        } else {
            String::new()
        }
    }

    /// Clear subset identity, used when merging shards into a coherent whole index.
    pub fn make_whole(&self) -> Structure {
        let mut out = self.clone();
        out.subset_id = 0;
        out.subset_splits = 0;
        out
    }

    pub fn cold_index_begin(&self) -> Id {
        self.cold_index_begin
    }

    pub fn cold_index_end(&self) -> Option<Id> {
        self.cold_index_end
    }

    pub fn sparse_depth_begin(&self) -> Option<u64> {
        self.sparse_depth_begin
    }

    pub fn sparse_index_begin(&self) -> Option<Id> {
        self.sparse_index_begin
    }

    pub fn nominal_chunk_depth(&self) -> u64 {
        self.nominal_chunk_depth
    }

    pub fn nominal_chunk_index(&self) -> Id {
        self.nominal_chunk_index
    }

    /// Whether dynamic chunking is in effect past depth `d` (i.e. `d` is past the
    /// sparse threshold and dynamic chunking is enabled).
    pub(crate) fn is_sparse_at_depth(&self, d: u64) -> bool {
        self.dynamic_chunks && self.sparse_depth_begin.is_some_and(|sdb| d > sdb)
    }

    /// `levelIndex(d) = (factor^d - 1) / (factor - 1)`, the first tree index at depth `d`.
    pub fn level_index(&self, d: u64) -> Id {
        pow_factor(self.factor).level_index(d)
    }

    /// `pointsAtDepth(d) = factor^d`, the slot count at exactly depth `d`.
    pub fn points_at_depth(&self, d: u64) -> Id {
        pow_factor(self.factor).pow(d)
    }

    /// Number of chunks wholly at depth `d` (constant past the sparse threshold when
    /// dynamic chunking is active — the defining property of dynamic chunks).
    pub fn num_chunks_at_depth(&self, d: u64) -> Id {
        if self.is_sparse_at_depth(d) {
            let sdb = self
                .sparse_depth_begin
                .expect("is_sparse_at_depth(d) true implies sparse_depth_begin is set");
            self.points_at_depth(sdb).div_small(self.chunk_points)
        } else {
            let span = self.level_index(d + 1) - self.level_index(d);
            span.div_small(self.chunk_points)
        }
    }

    /// Left-inverse of `ChunkInfo::chunk_num`: map a chunk ordinal back to a `ChunkInfo`.
    pub fn get_info_from_num(&self, n: u64) -> ChunkInfo {
        if self.chunk_points == 0 {
            // No cold band: everything collapses to the root chunk.
            return ChunkInfo::from_index(self, Id::ZERO);
        }

        let chunk_id = match self.sparse_depth_begin {
            Some(sdb) if self.dynamic_chunks => {
                let end_fixed = self.level_index(sdb + 1);
                let fixed_span = end_fixed - self.cold_index_begin;
                let fixed_num = fixed_span.div_small(self.chunk_points).as_simple();

                if n < fixed_num {
                    self.cold_index_begin + Id::from(n).mul_small(self.chunk_points)
                } else {
                    let leftover = n - fixed_num;
                    let cps = self.num_chunks_at_depth(sdb).as_simple();
                    let depth = sdb + 1 + leftover / cps;
                    let slot = leftover % cps;
                    let chunk_size = self.points_at_depth(depth).div_small(cps).as_simple();
                    self.level_index(depth) + Id::from(slot).mul_small(chunk_size)
                }
            }
            _ => self.cold_index_begin + Id::from(n).mul_small(self.chunk_points),
        };

        ChunkInfo::from_index(self, chunk_id)
    }

    pub(crate) fn bits_per_level(&self) -> u32 {
        self.bits_per_level
    }
}

/// `(factor^d - 1) / (factor - 1)` computed without intermediate overflow, plus the
/// matching `factor^d` power-table helper used throughout `Structure`.
struct FactorPow(u64);

impl FactorPow {
    fn pow(&self, d: u64) -> Id {
        let mut acc = Id::new(1);
        for _ in 0..d {
            acc = acc.mul_small(self.0);
        }
        acc
    }

    fn level_index(&self, d: u64) -> Id {
        let numerator = self.pow(d) - Id::new(1);
        numerator.div_small(self.0 - 1)
    }
}

fn pow_factor(factor: u64) -> FactorPow {
    FactorPow(factor)
}

/// Exact `floor(log_factor(value))` for a value known to be a perfect power of `factor`
/// (or zero depth otherwise); used to recover `nominalChunkDepth` from `chunkPoints`,
/// returning the remainder-tracked quotient so callers can detect a non-exact input.
fn exact_log_factor(value: u64, factor: u64) -> Option<u64> {
    if value == 0 {
        return None;
    }
    let mut v = value;
    let mut n = 0u64;
    while v > 1 {
        if v % factor != 0 {
            return None;
        }
        v /= factor;
        n += 1;
    }
    Some(n)
}

/// `floor(log_factor(x))`, exact, for `x` produced as `i*(factor-1)+1` (an exact
/// power-sum range boundary) — used by [`crate::chunk::ChunkInfo`]'s depth derivation.
/// `factor` must be a power of two (4 or 8, i.e. `bits_per_level` 2 or 3).
pub(crate) fn ilog_factor(x: u128, bits_per_level: u32) -> u64 {
    assert!(x > 0, "ilog_factor of zero is undefined");
    (x.ilog2() / bits_per_level) as u64
}

/// `ceil(log_factor(value))`: the smallest `d` with `factor^d >= value`. Differs from
/// `value.ilog(factor)` whenever `value` isn't an exact power of `factor` — which is the
/// common case for a user-supplied `numPointsHint` — so `sparseDepthBegin` derivation
/// below must use this rather than the floored `ilog`.
fn ceil_log_factor(value: u64, factor: u64) -> u64 {
    let floor = value.ilog(factor) as u64;
    let floor_pow = (factor as u128).pow(floor as u32);
    if floor_pow == value as u128 {
        floor
    } else {
        floor + 1
    }
}

fn load_index_values(params: StructureParams) -> Result<Structure, StructureError> {
    let StructureParams {
        dimensions,
        null_end,
        base_end,
        cold_end,
        chunk_points,
        dynamic_chunks,
        num_points_hint,
        subset,
    } = params;

    if dimensions != 2 && dimensions != 3 {
        return Err(StructureError::ConfigInvalid(format!(
            "dimensions must be 2 or 3, got {dimensions}"
        )));
    }
    let factor = 1u64 << dimensions;
    let bits_per_level = dimensions as u32;

    if base_end < 4 {
        return Err(StructureError::ConfigInvalid(format!(
            "base depth end must be >= 4, got {base_end}"
        )));
    }
    if null_end > base_end {
        return Err(StructureError::ConfigInvalid(
            "null depth end must not exceed base depth end".to_string(),
        ));
    }
    if let Some(ce) = cold_end
        && ce < base_end
    {
        return Err(StructureError::ConfigInvalid(
            "cold depth end must be >= cold depth begin (base depth end)".to_string(),
        ));
    }

    let has_cold_band = cold_end.is_none_or(|ce| ce > base_end);

    if has_cold_band && chunk_points != 0 && exact_log_factor(chunk_points, factor).is_none() {
        return Err(StructureError::ConfigInvalid(format!(
            "chunkPoints ({chunk_points}) must be factor^n (factor={factor}) when a cold band exists"
        )));
    }

    let pow = pow_factor(factor);
    let null_index_end = pow.level_index(null_end);
    let base_index_end = pow.level_index(base_end);
    let cold_index_begin = base_index_end;
    let cold_index_end = cold_end.map(|ce| pow.level_index(ce));

    let nominal_chunk_depth = exact_log_factor(chunk_points, factor).unwrap_or(0);
    let nominal_chunk_index = pow.level_index(nominal_chunk_depth);

    let num_points_hint = num_points_hint.unwrap_or(0);
    if num_points_hint == 0 {
        log::warn!(
            "Structure constructed with numPointsHint=0; chunk-layout performance may degrade past a few billion points"
        );
    }
    let sparse_depth_begin = if num_points_hint > 0 {
        Some(std::cmp::max(ceil_log_factor(num_points_hint, factor) + 1, base_end))
    } else {
        None
    };
    let sparse_index_begin = sparse_depth_begin.map(|d| pow.level_index(d));

    let (subset_id, subset_splits) = subset;
    if subset_splits != 0 {
        if !matches!(subset_splits, 4 | 16 | 64) {
            return Err(StructureError::ConfigInvalid(format!(
                "subset splits must be one of {{4, 16, 64}}, got {subset_splits}"
            )));
        }
        if subset_id >= subset_splits {
            return Err(StructureError::ConfigInvalid(format!(
                "subset id ({subset_id}) must be < splits ({subset_splits})"
            )));
        }
        if null_end == 0 {
            return Err(StructureError::ConfigInvalid(
                "subset requires nullDepthEnd > 0".to_string(),
            ));
        }
        let quad_capacity = pow_factor(4).pow(null_end).as_simple();
        if quad_capacity < subset_splits {
            return Err(StructureError::ConfigInvalid(format!(
                "4^nullDepthEnd ({quad_capacity}) must be >= splits ({subset_splits})"
            )));
        }
        if has_cold_band && chunk_points != 0 {
            let pts_at_cold_begin = pow.pow(base_end);
            let (chunks_at_cold_begin, rem) = pts_at_cold_begin.div_mod(chunk_points);
            if !rem.is_zero() {
                return Err(StructureError::ConfigInvalid(
                    "subset arithmetic failed: chunk count at cold begin is not exact".to_string(),
                ));
            }
            let chunks_at_cold_begin = chunks_at_cold_begin.as_simple();
            if chunks_at_cold_begin < subset_splits || chunks_at_cold_begin % subset_splits != 0 {
                return Err(StructureError::ConfigInvalid(format!(
                    "subset arithmetic failed: chunk count at cold begin ({chunks_at_cold_begin}) must be divisible by and >= splits ({subset_splits})"
                )));
            }
        }
    }

    Ok(Structure {
        dimensions,
        factor,
        bits_per_level,
        null_end,
        base_end,
        cold_end,
        chunk_points,
        dynamic_chunks,
        num_points_hint,
        subset_id,
        subset_splits,
        null_index_end,
        base_index_end,
        cold_index_begin,
        cold_index_end,
        nominal_chunk_depth,
        nominal_chunk_index,
        sparse_depth_begin,
        sparse_index_begin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn octree_s1() -> Structure {
        Structure::new(StructureParams {
            dimensions: 3,
            null_end: 6,
            base_end: 8,
            cold_end: Some(12),
            chunk_points: 262_144, // 8^6
            dynamic_chunks: false,
            num_points_hint: None,
            subset: (0, 0),
        })
        .unwrap()
    }

    fn quadtree_s2() -> Structure {
        Structure::new(StructureParams {
            dimensions: 2,
            null_end: 6,
            base_end: 10,
            cold_end: None,
            chunk_points: 65_536, // 4^8
            dynamic_chunks: true,
            num_points_hint: Some(4_000_000_000),
            subset: (0, 0),
        })
        .unwrap()
    }

    #[test]
    fn level_index_identity() {
        // levelIndex(d+1) = levelIndex(d)*factor + 1
        let s = octree_s1();
        for d in 0..12 {
            let lhs = s.level_index(d + 1);
            let rhs = s.level_index(d).mul_small(s.factor()) + Id::new(1);
            assert_eq!(lhs, rhs, "failed at depth {d}");
        }
    }

    #[test]
    fn points_at_depth_is_factor_power() {
        let s = octree_s1();
        assert_eq!(s.points_at_depth(0), Id::new(1));
        assert_eq!(s.points_at_depth(3), Id::new(8 * 8 * 8));
    }

    #[test]
    fn s1_derived_boundaries() {
        let s = octree_s1();
        assert_eq!(s.nominal_chunk_depth(), 6);
        assert_eq!(s.level_index(8), Id::new(2_396_745));
        assert_eq!(s.cold_index_begin(), Id::new(2_396_745));
    }

    #[test]
    fn s2_sparse_depth_begin() {
        let s = quadtree_s2();
        assert_eq!(s.sparse_depth_begin(), Some(17));
    }

    #[test]
    fn reject_base_depth_too_small() {
        let err = Structure::new(StructureParams {
            dimensions: 3,
            null_end: 0,
            base_end: 3,
            cold_end: None,
            chunk_points: 0,
            dynamic_chunks: false,
            num_points_hint: None,
            subset: (0, 0),
        })
        .unwrap_err();
        assert!(matches!(err, StructureError::ConfigInvalid(_)));
    }

    #[test]
    fn reject_non_power_chunk_points() {
        let err = Structure::new(StructureParams {
            dimensions: 2,
            null_end: 0,
            base_end: 4,
            cold_end: Some(6),
            chunk_points: 1000,
            dynamic_chunks: false,
            num_points_hint: None,
            subset: (0, 0),
        })
        .unwrap_err();
        assert!(matches!(err, StructureError::ConfigInvalid(_)));
    }

    #[test]
    fn reject_subset_id_out_of_range() {
        let err = Structure::new(StructureParams {
            dimensions: 2,
            null_end: 2,
            base_end: 4,
            cold_end: None,
            chunk_points: 0,
            dynamic_chunks: false,
            num_points_hint: None,
            subset: (5, 4),
        })
        .unwrap_err();
        assert!(matches!(err, StructureError::ConfigInvalid(_)));
    }

    #[test]
    fn json_round_trip() {
        let s = octree_s1();
        let json = s.to_json();
        let back = Structure::from_json(&json).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn make_whole_clears_subset() {
        let s = Structure::new(StructureParams {
            dimensions: 2,
            null_end: 2,
            base_end: 4,
            cold_end: None,
            chunk_points: 0,
            dynamic_chunks: false,
            num_points_hint: None,
            subset: (3, 16),
        })
        .unwrap();
        assert!(s.is_subset());
        let whole = s.make_whole();
        assert!(!whole.is_subset());
        assert_eq!(whole.subset_postfix(), "");
        assert_eq!(s.subset_postfix(), "-3");
    }

    #[test]
    fn num_chunks_at_depth_constant_past_sparse_threshold() {
        let s = quadtree_s2();
        let sdb = s.sparse_depth_begin().unwrap();
        let a = s.num_chunks_at_depth(sdb + 1);
        let b = s.num_chunks_at_depth(sdb + 5);
        assert_eq!(a, b);
    }

    #[test]
    fn non_dynamic_chunk_points_never_change() {
        let s = octree_s1();
        for d in 8..12 {
            let info = ChunkInfo::from_index(&s, s.level_index(d));
            assert_eq!(info.chunk_points(), s.base_chunk_points());
        }
    }
}
