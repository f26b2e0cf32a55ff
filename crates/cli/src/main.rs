//! chronoseg CLI - superpixel segmentation of image time series

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use chronoseg_algorithms::segmentation::{
    enforce_connectivity, snitc, EmptyClusterPolicy, Lattice, RepairParams, SnitcParams,
};
use chronoseg_algorithms::statistics::segment_statistics;
use chronoseg_algorithms::vector::{export_segments, PolygonizeParams};
use chronoseg_core::io::{read_stack, write_label_geotiff, GeoJsonWriter};
use chronoseg_core::{output_stem, Normalization, RasterStack};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "chronoseg")]
#[command(author, version, about = "Superpixel segmentation of satellite image time series", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a time series raster
    Info {
        /// One multiband file, or one file per time step in order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Segment a time series raster into superpixels
    Segment(SegmentArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Geojson,
    Tiff,
    Both,
}

#[derive(Clone, Copy, ValueEnum)]
enum NormalizationArg {
    /// v * 0.5 + 0.5, maps [-1, 1] to [0, 1]
    Affine,
    /// Rescale the stack's value range to [0, 1]
    Minmax,
    None,
}

#[derive(Clone, Copy, ValueEnum)]
enum LatticeArg {
    Hexagonal,
    Square,
}

#[derive(clap::Args)]
struct SegmentArgs {
    /// One multiband file, or one file per time step in order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Output name; files are written as <name>_<k>_<m>.<ext>
    #[arg(short, long)]
    output: PathBuf,
    /// Number of superpixels
    #[arg(short, long)]
    k: Option<usize>,
    /// Compactness
    #[arg(short, long)]
    m: Option<f64>,
    /// Assignment/update rounds
    #[arg(short, long)]
    rounds: Option<usize>,
    #[arg(short, long, value_enum)]
    lattice: Option<LatticeArg>,
    #[arg(short, long, value_enum)]
    normalization: Option<NormalizationArg>,
    /// Stop early once the residual error falls below this value
    #[arg(long)]
    convergence: Option<f64>,
    /// Fail instead of keeping the previous center when a cluster empties
    #[arg(long)]
    strict: bool,
    /// JSON file with segmentation parameters; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Label-then-sieve passes of the connectivity repair
    #[arg(long, default_value = "2")]
    passes: usize,
    /// Smallest region kept by the repair, in pixels (default: S² / 2)
    #[arg(long)]
    min_size: Option<usize>,
    /// Output format
    #[arg(short, long, value_enum, default_value = "geojson")]
    format: OutputFormat,
    /// Attach per-band statistics, area and length to each polygon
    #[arg(long)]
    stats: bool,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Read one multiband file, or stack single-band files in the given order
fn read_series(inputs: &[PathBuf]) -> Result<RasterStack> {
    let pb = spinner("Reading time series...");
    let stack = if let [single] = inputs {
        read_stack(single).with_context(|| format!("Failed to read {}", single.display()))?
    } else {
        let mut bands = Vec::new();
        for path in inputs {
            let stack =
                read_stack(path).with_context(|| format!("Failed to read {}", path.display()))?;
            if stack.bands() > 1 {
                warn!("{} has {} bands, using all of them", path.display(), stack.bands());
            }
            for b in 0..stack.bands() {
                bands.push(stack.band(b)?);
            }
        }
        RasterStack::from_bands(&bands).context("Input rasters do not line up")?
    };
    pb.finish_and_clear();
    info!(
        "Input: {} x {}, {} time steps",
        stack.cols(),
        stack.rows(),
        stack.bands()
    );
    Ok(stack)
}

fn load_params(args: &SegmentArgs) -> Result<SnitcParams> {
    let mut params = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => SnitcParams::default(),
    };

    if let Some(k) = args.k {
        params.k = k;
    }
    if let Some(m) = args.m {
        params.compactness = m;
    }
    if let Some(rounds) = args.rounds {
        params.rounds = rounds;
    }
    if let Some(lattice) = args.lattice {
        params.lattice = match lattice {
            LatticeArg::Hexagonal => Lattice::Hexagonal,
            LatticeArg::Square => Lattice::Square,
        };
    }
    if let Some(normalization) = args.normalization {
        params.normalization = match normalization {
            NormalizationArg::Affine => Normalization::default(),
            NormalizationArg::Minmax => Normalization::MinMax,
            NormalizationArg::None => Normalization::None,
        };
    }
    if args.convergence.is_some() {
        params.convergence = args.convergence;
    }
    if args.strict {
        params.empty_cluster = EmptyClusterPolicy::Fail;
    }
    params.validate()?;
    Ok(params)
}

fn with_extension(stem: &str, ext: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", stem, ext))
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Commands ───────────────────────────────────────────────────────────

fn info_command(inputs: &[PathBuf]) -> Result<()> {
    let stack = read_series(inputs)?;
    let (bands, rows, cols) = stack.shape();
    let bounds = stack.transform().bounds(cols, rows);

    for input in inputs {
        println!("File: {}", input.display());
    }
    println!("Dimensions: {} x {} ({} pixels)", cols, rows, rows * cols);
    println!("Time steps: {}", bands);
    println!("Cell size: {}", stack.transform().cell_size());
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(crs) = stack.crs() {
        println!("CRS: {}", crs);
    }
    match stack.value_range() {
        Some((min, max)) => println!("Value range: {:.6} .. {:.6}", min, max),
        None => println!("Value range: no valid values"),
    }
    Ok(())
}

fn segment_command(args: SegmentArgs) -> Result<()> {
    let params = load_params(&args)?;
    let stack = read_series(&args.inputs)?;
    let start = Instant::now();

    let pb = spinner("Segmenting...");
    let seg = snitc(&stack, &params).context("Segmentation failed")?;
    pb.finish_and_clear();
    info!(
        "{} clusters, spacing {}, {} rounds{}",
        seg.clusters.len(),
        seg.spacing,
        seg.rounds_completed,
        if seg.converged { " (converged)" } else { "" }
    );
    if !seg.empty_clusters.is_empty() {
        warn!("{} empty-cluster events", seg.empty_clusters.len());
    }

    let pb = spinner("Enforcing connectivity...");
    let repair = RepairParams {
        passes: args.passes,
        min_size: args.min_size,
        ..Default::default()
    };
    let labels = enforce_connectivity(&seg.labels, seg.spacing, &repair)
        .context("Connectivity repair failed")?;
    pb.finish_and_clear();

    let stem = output_stem(&args.output.to_string_lossy(), params.k, params.compactness);

    if matches!(args.format, OutputFormat::Tiff | OutputFormat::Both) {
        let path = with_extension(&stem, "tif");
        let pb = spinner("Writing label raster...");
        write_label_geotiff(&labels, &path).context("Failed to write label raster")?;
        pb.finish_and_clear();
        done("Label raster", &path, start.elapsed());
    }

    if matches!(args.format, OutputFormat::Geojson | OutputFormat::Both) {
        let stats = if args.stats {
            Some(segment_statistics(&stack, &labels).context("Failed to compute statistics")?)
        } else {
            None
        };
        let path = with_extension(&stem, "geojson");
        let pb = spinner("Writing polygons...");
        let mut writer = GeoJsonWriter::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let written = export_segments(
            &labels,
            &PolygonizeParams::default(),
            stats.as_ref(),
            &mut writer,
        )
        .context("Failed to write polygons")?;
        pb.finish_and_clear();
        info!("{} segments", written);
        done("Segments", &path, start.elapsed());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { inputs } => info_command(&inputs),
        Commands::Segment(args) => segment_command(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_segment() {
        let cli = Cli::try_parse_from([
            "chronoseg", "segment", "a.tif", "b.tif", "-o", "out/area", "-k", "250", "-m", "0.5",
            "--format", "both", "--stats",
        ])
        .unwrap();
        let Commands::Segment(args) = cli.command else {
            panic!("expected segment");
        };
        assert_eq!(args.inputs.len(), 2);
        let params = load_params(&args).unwrap();
        assert_eq!(params.k, 250);
        assert_eq!(params.compactness, 0.5);
        assert_eq!(params.rounds, 10);
        assert_eq!(
            output_stem(&args.output.to_string_lossy(), params.k, params.compactness),
            "out/area_250_0.5"
        );
    }

    #[test]
    fn test_flags_override_config() {
        let dir = std::env::temp_dir().join(format!("chronoseg-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = dir.join("params.json");
        std::fs::write(&config, r#"{"k": 40, "compactness": 2.0, "lattice": "square"}"#).unwrap();

        let cli = Cli::try_parse_from([
            "chronoseg",
            "segment",
            "a.tif",
            "-o",
            "x",
            "-m",
            "0.25",
            "--config",
            config.to_str().unwrap(),
        ])
        .unwrap();
        let Commands::Segment(args) = cli.command else {
            panic!("expected segment");
        };
        let params = load_params(&args).unwrap();
        assert_eq!(params.k, 40);
        assert_eq!(params.compactness, 0.25);
        assert_eq!(params.lattice, Lattice::Square);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_k_rejected() {
        let cli =
            Cli::try_parse_from(["chronoseg", "segment", "a.tif", "-o", "x", "-k", "0"]).unwrap();
        let Commands::Segment(args) = cli.command else {
            panic!("expected segment");
        };
        assert!(load_params(&args).is_err());
    }
}
