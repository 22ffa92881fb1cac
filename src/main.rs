use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use log::{info, warn};
use psviz::core::baseline::BaselineTableBuilder;
use psviz::core::export::{ExportParams, Exporter};
use psviz::core::pipeline::{IngestParams, IngestPipeline, DEFAULT_MAX_POINTS};
use psviz::core::selection::parse_id_list;
use psviz::core::trend::TrendMethod;
use psviz::core::view::{
    ColorBy, ColorScale, Dashboard, MapStyle, ViewParams, DEFAULT_MARKER_SIZE, MIN_BIN_WIDTH,
};
use psviz::StampsReader;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "psviz")]
#[command(author, version, about = "PS-InSAR (SNAP-StAMPS) displacement viewer engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse, filter and sample a .mat pair; print a summary
    Ingest(IngestArgs),
    /// Build the dashboard view models as JSON
    View(ViewArgs),
    /// Print the baseline table as JSON
    Baseline(PairArgs),
    /// Export the full dataset as a point layer and IDW velocity raster
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct PairArgs {
    /// The StAMPS time-series and scalar .mat exports
    #[arg(required = true, num_args = 2, value_hint = ValueHint::FilePath)]
    files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct IngestArgs {
    #[command(flatten)]
    pair: PairArgs,

    /// Maximum number of rows kept after filtering
    #[arg(short = 'n', long, default_value_t = DEFAULT_MAX_POINTS)]
    max_points: usize,

    /// Keep every row instead of sampling
    #[arg(long, action = ArgAction::SetTrue)]
    all: bool,

    /// Vector file restricting the area of interest
    #[arg(long, value_hint = ValueHint::FilePath)]
    subset: Option<PathBuf>,

    /// Vector file whose first feature is excluded
    #[arg(long, value_hint = ValueHint::FilePath)]
    mask: Option<PathBuf>,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,
}

impl IngestArgs {
    fn params(&self) -> IngestParams {
        IngestParams {
            max_points: if self.all { None } else { Some(self.max_points) },
            subset: self.subset.clone(),
            mask: self.mask.clone(),
            seed: self.seed,
        }
    }
}

#[derive(Args, Debug)]
struct ViewArgs {
    #[command(flatten)]
    ingest: IngestArgs,

    /// Map date (YYYY-MM-DD), defaults to the 4th acquisition
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Comma separated scatterer ids for the time series
    #[arg(long, default_value = "")]
    ids: String,

    /// Value used to colour the map: displacement or average
    #[arg(long, default_value = "displacement")]
    color_by: ColorBy,

    /// Base map style id, e.g. carto-darkmatter or open-street-map
    #[arg(long = "style", default_value = "carto-darkmatter")]
    map_style: MapStyle,

    /// Map colour scale, e.g. Electric or Viridis
    #[arg(long = "scale", default_value = "Electric")]
    color_scale: ColorScale,

    #[arg(long, default_value_t = DEFAULT_MARKER_SIZE)]
    marker_size: u32,

    #[arg(long, default_value_t = MIN_BIN_WIDTH)]
    bin_width: u32,

    /// Trend line: linear or loess
    #[arg(long, default_value = "linear")]
    trend: TrendMethod,

    /// Pretty-print the JSON output
    #[arg(long, action = ArgAction::SetTrue)]
    pretty: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    pair: PairArgs,

    /// Directory receiving the point layer and raster
    #[arg(short, long, default_value = "export", value_hint = ValueHint::DirPath)]
    output_dir: PathBuf,

    /// Raster file name
    #[arg(long, default_value = "velocity.tif")]
    name: String,

    #[arg(long, default_value_t = 256)]
    width: usize,

    #[arg(long, default_value_t = 256)]
    height: usize,

    /// Inverse distance weighting power
    #[arg(long, default_value_t = 2.0)]
    power: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Ingest(args) => ingest(&args),
        Command::View(args) => view(&args),
        Command::Baseline(args) => baseline(&args),
        Command::Export(args) => export(&args),
    }
}

#[derive(Serialize)]
struct IngestSummary {
    rows: usize,
    scatterers: usize,
    dates: Vec<NaiveDate>,
    reference_date: Option<NaiveDate>,
    warning: Option<String>,
}

fn ingest(args: &IngestArgs) -> Result<()> {
    let ingested = IngestPipeline::new(args.params())
        .run(&args.pair.files)
        .context("ingesting StAMPS export")?;

    if let Some(warning) = &ingested.warning {
        warn!("{}", warning);
    }

    let summary = IngestSummary {
        rows: ingested.points.len(),
        scatterers: ingested.points.ids_in_order().len(),
        dates: ingested.points.dates(),
        reference_date: ingested.baseline.reference().map(|r| r.date),
        warning: ingested.warning.map(|w| w.to_string()),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn view(args: &ViewArgs) -> Result<()> {
    let ingested = IngestPipeline::new(args.ingest.params())
        .run(&args.ingest.pair.files)
        .context("ingesting StAMPS export")?;

    let params = ViewParams {
        date: args.date,
        ids: parse_id_list(&args.ids)?,
        color_by: args.color_by,
        map_style: args.map_style,
        color_scale: args.color_scale,
        marker_size: args.marker_size,
        bin_width: args.bin_width,
        trend: args.trend,
    };

    let dashboard = Dashboard::build(&ingested, &params)?;
    let json = if args.pretty {
        serde_json::to_string_pretty(&dashboard)?
    } else {
        serde_json::to_string(&dashboard)?
    };
    println!("{}", json);
    Ok(())
}

fn baseline(args: &PairArgs) -> Result<()> {
    let arrays = StampsReader::read_pair(&args.files).context("reading StAMPS export")?;
    let table = BaselineTableBuilder::build(&arrays)?;
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}

fn export(args: &ExportArgs) -> Result<()> {
    let params = ExportParams {
        output_dir: args.output_dir.clone(),
        raster_name: args.name.clone(),
        width: args.width,
        height: args.height,
        power: args.power,
        ..ExportParams::default()
    };

    let report = Exporter::new(params).export(&args.pair.files)?;

    info!(
        "Wrote {} rows to {} and raster {}",
        report.rows_written,
        report.vector_path.display(),
        report.raster_path.display()
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
