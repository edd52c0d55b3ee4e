//! Chunk store boundary: persists and retrieves chunk payloads, named by `chunkId` plus
//! the owning structure's subset postfix.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;

use crate::id::Id;
use crate::structure::Structure;

/// Something that can store and retrieve chunk payloads keyed by tree index.
///
/// Implementations don't interpret the bytes; a chunk's payload is opaque point data
/// produced by whatever writes through the [`crate::reader`] pipeline.
pub trait ChunkStore: Send + Sync {
    fn put(&self, structure: &Structure, chunk_id: Id, bytes: Bytes) -> io::Result<()>;
    fn get(&self, structure: &Structure, chunk_id: Id) -> io::Result<Option<Bytes>>;
    fn exists(&self, structure: &Structure, chunk_id: Id) -> bool;
}

/// Maps a `(chunkId, subsetPostfix)` pair to the on-disk artifact name a store uses for
/// it, e.g. chunk `2396745` of subset `3` names `"2396745-3"`.
fn chunk_name(structure: &Structure, chunk_id: Id) -> String {
    format!("{chunk_id}{}", structure.subset_postfix())
}

/// A [`ChunkStore`] backed by one file per chunk under a root directory, with a bounded
/// in-process read cache in front of the filesystem.
pub struct FsChunkStore {
    root: PathBuf,
    cache: Mutex<LruCache<String, Arc<Bytes>>>,
}

impl FsChunkStore {
    pub fn new(root: impl Into<PathBuf>, cache_capacity: usize) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let capacity = std::num::NonZeroUsize::new(cache_capacity.max(1)).unwrap();
        Ok(Self {
            root,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ChunkStore for FsChunkStore {
    fn put(&self, structure: &Structure, chunk_id: Id, bytes: Bytes) -> io::Result<()> {
        let name = chunk_name(structure, chunk_id);
        fs::write(self.path_for(&name), &bytes)?;
        self.cache.lock().put(name, Arc::new(bytes));
        Ok(())
    }

    fn get(&self, structure: &Structure, chunk_id: Id) -> io::Result<Option<Bytes>> {
        let name = chunk_name(structure, chunk_id);

        if let Some(cached) = self.cache.lock().get(&name) {
            return Ok(Some(Bytes::clone(cached)));
        }

        match fs::read(self.path_for(&name)) {
            Ok(raw) => {
                let bytes = Bytes::from(raw);
                self.cache.lock().put(name, Arc::new(bytes.clone()));
                Ok(Some(bytes))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn exists(&self, structure: &Structure, chunk_id: Id) -> bool {
        let name = chunk_name(structure, chunk_id);
        self.cache.lock().contains(&name) || self.path_for(&name).is_file()
    }
}

/// Resolve where chunk `chunk_id` lives under `root` without touching the cache; used
/// by tooling that needs the path directly (e.g. to hand to an external compressor).
pub fn chunk_path(root: &Path, structure: &Structure, chunk_id: Id) -> PathBuf {
    root.join(chunk_name(structure, chunk_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::StructureParams;

    fn whole() -> Structure {
        Structure::new(StructureParams {
            dimensions: 3,
            null_end: 6,
            base_end: 8,
            cold_end: Some(12),
            chunk_points: 262_144,
            dynamic_chunks: false,
            num_points_hint: None,
            subset: (0, 0),
        })
        .unwrap()
    }

    fn subset() -> Structure {
        Structure::new(StructureParams {
            dimensions: 2,
            null_end: 2,
            base_end: 4,
            cold_end: None,
            chunk_points: 0,
            dynamic_chunks: false,
            num_points_hint: None,
            subset: (3, 16),
        })
        .unwrap()
    }

    fn tmp_root(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("pctree-store-test-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&p);
        p
    }

    #[test]
    fn chunk_name_includes_subset_postfix() {
        let s = subset();
        assert_eq!(chunk_name(&s, Id::new(42)), "42-3");
        assert_eq!(chunk_name(&whole(), Id::new(42)), "42");
    }

    #[test]
    fn put_then_get_round_trips() {
        let root = tmp_root("roundtrip");
        let store = FsChunkStore::new(&root, 4).unwrap();
        let s = whole();
        let payload = Bytes::from_static(b"some point bytes");
        store.put(&s, Id::new(7), payload.clone()).unwrap();
        assert!(store.exists(&s, Id::new(7)));
        assert_eq!(store.get(&s, Id::new(7)).unwrap(), Some(payload));
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn missing_chunk_returns_none() {
        let root = tmp_root("missing");
        let store = FsChunkStore::new(&root, 4).unwrap();
        let s = whole();
        assert!(!store.exists(&s, Id::new(99)));
        assert_eq!(store.get(&s, Id::new(99)).unwrap(), None);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn read_cache_survives_file_removal() {
        let root = tmp_root("cache");
        let store = FsChunkStore::new(&root, 4).unwrap();
        let s = whole();
        let payload = Bytes::from_static(b"cached bytes");
        store.put(&s, Id::new(1), payload.clone()).unwrap();
        fs::remove_file(chunk_path(&root, &s, Id::new(1))).unwrap();
        // still served from the cache even though the file is gone
        assert_eq!(store.get(&s, Id::new(1)).unwrap(), Some(payload));
        fs::remove_dir_all(&root).ok();
    }
}
