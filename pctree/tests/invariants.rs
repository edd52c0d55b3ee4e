//! Randomized sweeps over the universally-quantified invariants, complementing the
//! fixed scenarios covered by the in-module unit tests.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use pctree::chunk::ChunkInfo;
use pctree::id::Id;
use pctree::structure::{Structure, StructureParams};

fn fixed_octree() -> Structure {
    Structure::new(StructureParams {
        dimensions: 3,
        null_end: 6,
        base_end: 8,
        cold_end: Some(14),
        chunk_points: 262_144,
        dynamic_chunks: false,
        num_points_hint: None,
        subset: (0, 0),
    })
    .unwrap()
}

fn dynamic_quadtree() -> Structure {
    Structure::new(StructureParams {
        dimensions: 2,
        null_end: 6,
        base_end: 10,
        cold_end: None,
        chunk_points: 65_536,
        dynamic_chunks: true,
        num_points_hint: Some(4_000_000_000),
        subset: (0, 0),
    })
    .unwrap()
}

/// Invariant 1/2: `chunkOffset < chunkPoints` and `chunkId <= i < chunkId + chunkPoints`
/// with `i - chunkId == chunkOffset`, over randomly sampled indices in the cold band.
#[test]
fn chunk_info_bounds_hold_for_random_indices() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    for structure in [fixed_octree(), dynamic_quadtree()] {
        let begin = structure.cold_index_begin().get();
        let end = structure
            .cold_index_end()
            .map(|e| e.get())
            .unwrap_or(begin + 10_000_000_000);
        for _ in 0..2_000 {
            let offset: u128 = rng.random_range(0..(end - begin).min(1u128 << 40));
            let index = Id::new(begin + offset);
            let info = ChunkInfo::from_index(&structure, index);
            assert!(info.chunk_offset() < info.chunk_points());
            let chunk_id = info.chunk_id();
            assert!(chunk_id <= index);
            assert!(index < chunk_id + Id::from(info.chunk_points()));
            assert_eq!(index - chunk_id, Id::from(info.chunk_offset()));
        }
    }
}

/// Invariant 3: `get_info_from_num` is a left-inverse of `chunk_num` over every valid
/// chunk ordinal.
#[test]
fn get_info_from_num_is_left_inverse_of_chunk_num() {
    let mut rng = StdRng::seed_from_u64(0xFACADE);
    let structure = dynamic_quadtree();
    let sdb = structure.sparse_depth_begin().unwrap();
    // bound the sampled ordinal to a range that stays within a few sparse depths so
    // the test runs in bounded time regardless of numPointsHint.
    let fixed_span = structure.level_index(sdb + 1) - structure.cold_index_begin();
    let fixed_num = fixed_span.div_small(structure.base_chunk_points()).as_simple();
    let cps = structure.num_chunks_at_depth(sdb).as_simple();
    let upper = fixed_num + cps * 4;

    for _ in 0..500 {
        let n: u64 = rng.random_range(0..upper);
        let info = structure.get_info_from_num(n);
        assert_eq!(info.chunk_num(), n, "failed at n={n}");
    }
}

/// Invariant 4: `levelIndex(d+1) = levelIndex(d)*factor + 1` and `pointsAtDepth(d) =
/// factor^d`, for both quadtree and octree factors.
#[test]
fn level_index_and_points_at_depth_identities() {
    for structure in [fixed_octree(), dynamic_quadtree()] {
        let mut expected_points = Id::new(1);
        for d in 0..20 {
            assert_eq!(structure.points_at_depth(d), expected_points);
            let lhs = structure.level_index(d + 1);
            let rhs = structure.level_index(d).mul_small(structure.factor()) + Id::new(1);
            assert_eq!(lhs, rhs, "failed at depth {d}");
            expected_points = expected_points.mul_small(structure.factor());
        }
    }
}

/// Invariant 5: JSON round-trip is exact, for a handful of randomly perturbed but
/// valid configurations.
#[test]
fn json_round_trip_holds_for_random_valid_configs() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    for _ in 0..200 {
        let dimensions = if rng.random_bool(0.5) { 2 } else { 3 };
        let null_end = rng.random_range(0..4);
        let base_end = (null_end + rng.random_range(4..8)).max(4);
        let dynamic_chunks = rng.random_bool(0.5);
        let num_points_hint = if rng.random_bool(0.5) {
            Some(rng.random_range(1..10_000_000_000u64))
        } else {
            None
        };
        let params = StructureParams {
            dimensions,
            null_end,
            base_end,
            cold_end: None,
            chunk_points: 0,
            dynamic_chunks,
            num_points_hint,
            subset: (0, 0),
        };
        let Ok(structure) = Structure::new(params) else {
            continue;
        };
        let json = structure.to_json();
        let back = Structure::from_json(&json).unwrap();
        assert_eq!(structure, back);
    }
}

/// Invariant 6: past the sparse threshold, `numChunksAtDepth` is constant.
#[test]
fn num_chunks_at_depth_is_constant_in_sparse_regime() {
    let structure = dynamic_quadtree();
    let sdb = structure.sparse_depth_begin().unwrap();
    let baseline = structure.num_chunks_at_depth(sdb + 1);
    for d in (sdb + 2)..(sdb + 30) {
        assert_eq!(structure.num_chunks_at_depth(d), baseline, "failed at depth {d}");
    }
}

/// Invariant 7: with `dynamicChunks` off, `ChunkInfo.chunk_points` is always
/// `baseChunkPoints`, regardless of depth.
#[test]
fn chunk_points_constant_without_dynamic_chunks() {
    let structure = fixed_octree();
    for d in structure.base_end()..(structure.base_end() + 10) {
        let idx = structure.level_index(d);
        let info = ChunkInfo::from_index(&structure, idx);
        assert_eq!(info.chunk_points(), structure.base_chunk_points());
    }
}
