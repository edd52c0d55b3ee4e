//! Reader-pipeline adapter: the external-facing boundary that resolves a source path
//! to a format driver, optionally reprojects, and emits points into a pooled table.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use arcstr::ArcStr;
use bytes::BytesMut;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use crate::geometry::{BBox, Point};

/// Interned dimension names and SRS identifiers, so repeated previews of sources that
/// share an SRS (or the "X"/"Y"/"Z" dimension names every text source reports) don't
/// each allocate their own `String`.
#[derive(Default)]
struct SrsInterner {
    seen: RwLock<HashMap<ArcStr, ()>>,
}

impl SrsInterner {
    fn intern<S: AsRef<str>>(&self, name: S) -> ArcStr {
        let lock = self.seen.read();
        if let Some((k, _)) = lock.get_key_value(name.as_ref()) {
            return k.clone();
        }
        drop(lock);
        let mut lock = self.seen.write();
        if let Some((k, _)) = lock.get_key_value(name.as_ref()) {
            k.clone()
        } else {
            let k = ArcStr::from(name.as_ref());
            lock.insert(k.clone(), ());
            k
        }
    }
}

static SRS_INTERNER: OnceLock<SrsInterner> = OnceLock::new();

fn intern_name<S: AsRef<str>>(name: S) -> ArcStr {
    SRS_INTERNER.get_or_init(SrsInterner::default).intern(name)
}

/// A reprojection request; `in_srs` empty means "use whatever SRS the driver infers".
#[derive(Clone, Debug)]
pub struct Reprojection {
    pub out_srs: String,
    pub in_srs: String,
}

/// Summary of a source returned by [`DriverRegistry::preview`], without reading every
/// point.
#[derive(Clone, Debug)]
pub struct Preview {
    pub bbox: BBox,
    pub point_count: u64,
    pub srs: Option<ArcStr>,
    pub dim_names: Vec<ArcStr>,
}

/// A pooled destination for points emitted by a reader driver.
///
/// The `scratch` buffer is reused across `run` calls so repeated ingestion doesn't
/// reallocate a fresh read buffer per source file.
pub struct PointTable {
    points: Vec<Point>,
    scratch: BytesMut,
}

impl PointTable {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            scratch: BytesMut::new(),
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            points: Vec::with_capacity(cap),
            scratch: BytesMut::new(),
        }
    }

    pub fn push(&mut self, p: Point) {
        self.points.push(p);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Borrow the pooled scratch buffer, ensuring it is empty and has room for at
    /// least `hint` bytes without reallocating on the common path.
    fn take_scratch(&mut self, hint: usize) -> BytesMut {
        let mut buf = std::mem::take(&mut self.scratch);
        buf.clear();
        buf.reserve(hint);
        buf
    }

    fn return_scratch(&mut self, buf: BytesMut) {
        self.scratch = buf;
    }
}

impl Default for PointTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A format driver: something that can summarize or fully read a source path.
pub trait ReaderDriver: Send + Sync {
    fn preview(&self, path: &Path) -> io::Result<Preview>;
    fn run(&self, path: &Path, table: &mut PointTable) -> io::Result<()>;
    /// The SRS this driver falls back to when a reprojection is requested with an
    /// empty source SRS and the source format carries no SRS metadata of its own.
    fn default_srs(&self) -> Option<ArcStr> {
        None
    }
}

/// Reads whitespace-separated `x y z` (or `x y` in 2D) rows. Provided so the pipeline
/// is runnable without an external point-cloud format library; real drivers (LAS/LAZ/
/// etc.) are the external collaborator this component adapts to.
pub struct TextReaderDriver {
    pub is_3d: bool,
}

impl TextReaderDriver {
    fn parse_row(line: &str, is_3d: bool) -> Option<Point> {
        let mut parts = line.split_whitespace();
        let x: f64 = parts.next()?.parse().ok()?;
        let y: f64 = parts.next()?.parse().ok()?;
        let z: f64 = if is_3d {
            parts.next()?.parse().ok()?
        } else {
            0.0
        };
        Some(Point::new(x, y, z))
    }
}

impl ReaderDriver for TextReaderDriver {
    fn preview(&self, path: &Path) -> io::Result<Preview> {
        let contents = fs::read_to_string(path)?;
        let mut count = 0u64;
        let mut min = Point::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(p) = Self::parse_row(line, self.is_3d) else {
                continue;
            };
            count += 1;
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        if count == 0 {
            min = Point::default();
            max = Point::default();
        }
        let dim_names = if self.is_3d {
            vec![intern_name("X"), intern_name("Y"), intern_name("Z")]
        } else {
            vec![intern_name("X"), intern_name("Y")]
        };
        Ok(Preview {
            bbox: BBox::new(min, max, self.is_3d),
            point_count: count,
            srs: None,
            dim_names,
        })
    }

    fn run(&self, path: &Path, table: &mut PointTable) -> io::Result<()> {
        let raw = fs::read(path)?;
        let mut scratch = table.take_scratch(raw.len());
        scratch.extend_from_slice(&raw);
        let text = String::from_utf8_lossy(&scratch).into_owned();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(p) = Self::parse_row(line, self.is_3d) {
                table.push(p);
            }
        }
        table.return_scratch(scratch);
        Ok(())
    }
}

type DriverFactory = fn() -> Arc<dyn ReaderDriver>;

/// Serializes access to a shared format-driver registry with a mutex; once a driver
/// instance is constructed it is owned independently and does no further locking, so
/// the heavy point-emission work in [`run`](DriverRegistry::run) happens outside the
/// critical section.
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
    cache: Mutex<LruCache<&'static str, Arc<dyn ReaderDriver>>>,
}

impl DriverRegistry {
    pub fn new(is_3d: bool) -> Self {
        let mut factories: HashMap<&'static str, DriverFactory> = HashMap::new();
        let factory: DriverFactory = if is_3d {
            || Arc::new(TextReaderDriver { is_3d: true })
        } else {
            || Arc::new(TextReaderDriver { is_3d: false })
        };
        factories.insert("text", factory);
        Self {
            factories,
            cache: Mutex::new(LruCache::new(std::num::NonZeroUsize::new(8).unwrap())),
        }
    }

    fn infer_reader_driver(path: &Path) -> Option<&'static str> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("xyz") | Some("txt") => Some("text"),
            _ => None,
        }
    }

    /// Acquire (constructing and caching if necessary) the driver for `tag`. The
    /// registry mutex is held only for the lookup/construction; the returned `Arc` is
    /// then used lock-free.
    fn acquire_driver(&self, tag: &'static str) -> Option<Arc<dyn ReaderDriver>> {
        let mut cache = self.cache.lock();
        if let Some(driver) = cache.get(&tag) {
            return Some(driver.clone());
        }
        let factory = self.factories.get(tag)?;
        let driver = factory();
        cache.put(tag, driver.clone());
        Some(driver)
    }

    pub fn good(&self, path: &Path) -> bool {
        Self::infer_reader_driver(path)
            .and_then(|tag| self.acquire_driver(tag))
            .is_some()
    }

    pub fn preview(&self, path: &Path, reprojection: Option<&Reprojection>) -> Option<Preview> {
        let tag = Self::infer_reader_driver(path)?;
        let driver = self.acquire_driver(tag)?;
        let mut preview = driver.preview(path).ok()?;
        preview.srs = resolve_srs(reprojection, preview.srs.as_ref(), driver.as_ref())?;
        Some(preview)
    }

    /// Run the pipeline for `path`, emitting points into `table`. Blocking: the
    /// underlying driver performs its own I/O.
    pub fn run(
        &self,
        table: &mut PointTable,
        path: &Path,
        reprojection: Option<&Reprojection>,
    ) -> bool {
        let Some(tag) = Self::infer_reader_driver(path) else {
            log::warn!("DriverUnknown: no driver for {}", path.display());
            return false;
        };
        let Some(driver) = self.acquire_driver(tag) else {
            log::warn!("DriverUnknown: driver {tag} not registered");
            return false;
        };

        // SRS resolution happens before the (potentially large) point emission, so a
        // ReprojectionUnresolved failure doesn't cost a full read.
        if let Some(reproj) = reprojection
            && reproj.in_srs.is_empty()
            && driver.default_srs().is_none()
        {
            log::warn!(
                "ReprojectionUnresolved: {} has no inferred SRS and none was supplied",
                path.display()
            );
            return false;
        }

        match driver.run(path, table) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("reader pipeline failed for {}: {err}", path.display());
                false
            }
        }
    }
}

fn resolve_srs(
    reprojection: Option<&Reprojection>,
    inferred: Option<&ArcStr>,
    driver: &dyn ReaderDriver,
) -> Option<Option<ArcStr>> {
    match reprojection {
        None => Some(inferred.cloned()),
        Some(r) => {
            let source_known = if !r.in_srs.is_empty() {
                true
            } else {
                inferred.is_some() || driver.default_srs().is_some()
            };
            if !source_known {
                return None;
            }
            Some(Some(intern_name(&r.out_srs)))
        }
    }
}
