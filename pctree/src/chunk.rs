//! `ChunkInfo`: derive `(depth, chunkId, chunkNum, chunkOffset, chunkPoints)` for a
//! single tree index.

use crate::id::Id;
use crate::structure::{self, Structure};

/// The chunk-geometry facts about a single tree index, computed in O(1) from a
/// [`Structure`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChunkInfo {
    depth: u64,
    chunk_id: Id,
    chunk_num: u64,
    chunk_offset: u64,
    chunk_points: u64,
}

impl ChunkInfo {
    /// Resolve `index` against `structure`.
    ///
    /// # Panics
    ///
    /// Panics (`IndexOutOfBand`) if `index` falls below the cold band — callers are
    /// responsible for routing null/base-band indices elsewhere before reaching here.
    pub fn from_index(structure: &Structure, index: Id) -> ChunkInfo {
        assert!(
            index >= structure.cold_index_begin(),
            "IndexOutOfBand: index {index} is below coldIndexBegin {}",
            structure.cold_index_begin()
        );

        let factor_minus_one = structure.factor() - 1;
        let arg = index.get() * (factor_minus_one as u128) + 1;
        let depth = structure::ilog_factor(arg, structure.bits_per_level());

        let level_begin = structure.level_index(depth);
        let base_chunk_points = structure.base_chunk_points();

        if !structure.is_sparse_at_depth(depth) {
            let (q, r) = (index - structure.cold_index_begin()).div_mod(base_chunk_points);
            let chunk_num = q.as_simple();
            let chunk_offset = r.as_simple();
            let chunk_id = structure.cold_index_begin() + q.mul_small(base_chunk_points);
            ChunkInfo {
                depth,
                chunk_id,
                chunk_num,
                chunk_offset,
                chunk_points: base_chunk_points,
            }
        } else {
            let sparse_depth_begin = structure
                .sparse_depth_begin()
                .expect("dynamic chunking active implies a sparse threshold");
            let sparse_first_span = structure.points_at_depth(sparse_depth_begin).as_simple();
            let chunks_per_sparse_depth = sparse_first_span / base_chunk_points;
            let k = depth - sparse_depth_begin;
            let mut chunk_points_id = Id::from(base_chunk_points);
            for _ in 0..k {
                chunk_points_id = chunk_points_id.mul_small(structure.factor());
            }
            let chunk_points = chunk_points_id.as_simple();

            let sparse_index_begin = structure
                .sparse_index_begin()
                .expect("dynamic chunking active implies a sparse threshold");
            let cold_span = sparse_index_begin - structure.cold_index_begin();
            let num_cold_chunks = cold_span.div_small(base_chunk_points).as_simple();
            let prev = num_cold_chunks + chunks_per_sparse_depth * k;

            let level_offset = (index - level_begin).as_simple();
            let slot = level_offset / chunk_points;
            let chunk_num = prev + slot;
            let chunk_offset = level_offset % chunk_points;
            let chunk_id = level_begin + Id::from(slot).mul_small(chunk_points);

            ChunkInfo {
                depth,
                chunk_id,
                chunk_num,
                chunk_offset,
                chunk_points,
            }
        }
    }

    pub fn depth(&self) -> u64 {
        self.depth
    }

    pub fn chunk_id(&self) -> Id {
        self.chunk_id
    }

    pub fn chunk_num(&self) -> u64 {
        self.chunk_num
    }

    pub fn chunk_offset(&self) -> u64 {
        self.chunk_offset
    }

    pub fn chunk_points(&self) -> u64 {
        self.chunk_points
    }
}
