use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use pctree::chunk::ChunkInfo;
use pctree::climber::subset_bbox;
use pctree::geometry::{BBox, Point};
use pctree::id::Id;
use pctree::reader::{DriverRegistry, PointTable};
use pctree::structure::Structure;

#[derive(Debug, clap::Parser)]
struct Cli {
    #[arg(long, default_value_t = false)]
    no_color: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Load a Structure and print its derived boundaries.
    Describe { config: PathBuf },
    /// Resolve a tree index to its ChunkInfo.
    ChunkInfo { config: PathBuf, index: u128 },
    /// Invert a chunk number to its ChunkInfo.
    FromNum { config: PathBuf, n: u64 },
    /// Compute a subset's bounding box within a full-extent bbox.
    SubsetBbox {
        config: PathBuf,
        minx: f64,
        miny: f64,
        maxx: f64,
        maxy: f64,
    },
    /// Run the reader-pipeline adapter against a source path.
    Ingest {
        config: PathBuf,
        source: PathBuf,
        out_dir: PathBuf,
    },
}

fn load_structure(path: &PathBuf) -> Result<Structure> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading structure config at {}", path.display()))?;
    Structure::from_json(&json).map_err(|e| anyhow!(e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(!cli.no_color)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    match cli.command {
        Commands::Describe { config } => {
            let span = tracing::info_span!("describe");
            let _enter = span.enter();
            let s = load_structure(&config)?;
            println!("dimensions: {}", s.dimensions());
            println!("factor: {}", s.factor());
            println!("nullDepthEnd / baseDepthEnd: {} / {}", s.null_end(), s.base_end());
            println!("coldDepthEnd: {:?}", s.cold_end());
            println!("coldIndexBegin: {}", s.cold_index_begin());
            println!("coldIndexEnd: {:?}", s.cold_index_end());
            println!("nominalChunkDepth: {}", s.nominal_chunk_depth());
            println!("baseChunkPoints: {}", s.base_chunk_points());
            println!("dynamicChunks: {}", s.dynamic_chunks());
            println!("sparseDepthBegin: {:?}", s.sparse_depth_begin());
            println!("subsetPostfix: {:?}", s.subset_postfix());
        }
        Commands::ChunkInfo { config, index } => {
            let span = tracing::info_span!("chunk_info");
            let _enter = span.enter();
            let s = load_structure(&config)?;
            let info = ChunkInfo::from_index(&s, Id::new(index));
            print_chunk_info(&info);
        }
        Commands::FromNum { config, n } => {
            let span = tracing::info_span!("from_num");
            let _enter = span.enter();
            let s = load_structure(&config)?;
            let info = s.get_info_from_num(n);
            print_chunk_info(&info);
        }
        Commands::SubsetBbox {
            config,
            minx,
            miny,
            maxx,
            maxy,
        } => {
            let span = tracing::info_span!("subset_bbox");
            let _enter = span.enter();
            let s = load_structure(&config)?;
            let full = BBox::new(Point::new_2d(minx, miny), Point::new_2d(maxx, maxy), false);
            let sub = subset_bbox(&s, full).map_err(|e| anyhow!(e))?;
            println!(
                "min=({}, {}) max=({}, {})",
                sub.min.x, sub.min.y, sub.max.x, sub.max.y
            );
        }
        Commands::Ingest {
            config,
            source,
            out_dir,
        } => {
            let span = tracing::info_span!("ingest");
            let _enter = span.enter();
            let s = load_structure(&config)?;
            let registry = DriverRegistry::new(s.is_3d());
            let Some(preview) = registry.preview(&source, None) else {
                return Err(anyhow!("no driver could preview {}", source.display()));
            };
            println!(
                "preview: {} points, bbox {:?}..{:?}, dims {:?}",
                preview.point_count, preview.bbox.min, preview.bbox.max, preview.dim_names
            );

            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("creating {}", out_dir.display()))?;
            let mut table = PointTable::new();
            if !registry.run(&mut table, &source, None) {
                return Err(anyhow!("reader pipeline failed for {}", source.display()));
            }
            log::info!("ingested {} points from {}", table.len(), source.display());
        }
    }

    Ok(())
}

fn print_chunk_info(info: &ChunkInfo) {
    println!("depth: {}", info.depth());
    println!("chunkId: {}", info.chunk_id());
    println!("chunkNum: {}", info.chunk_num());
    println!("chunkOffset: {}", info.chunk_offset());
    println!("chunkPoints: {}", info.chunk_points());
}
