use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_obs_atlas::aggregate::{
    ALL_OBS_FILE, ALL_OBS_STANDARD_COUNTS_FILE, ALL_OBS_STANDARD_FILE, CategoryCensus,
    Provenance, RunSummary, concat_frames, concat_tallies, persist_frame,
};
use kira_obs_atlas::app::{App, ApplyOptions, ApplyReport, ProgressSink};
use kira_obs_atlas::catalog::Catalog;
use kira_obs_atlas::config::{ConfigLoader, ResolvedConfig};
use kira_obs_atlas::domain::CatalogFormat;
use kira_obs_atlas::error::AtlasError;
use kira_obs_atlas::output::{CatalogSummary, JsonOutput, LogSink, OutputMode, TextOutput};
use kira_obs_atlas::reader::H5adObsReader;
use kira_obs_atlas::s3::{S3ClientOptions, S3HttpClient};
use kira_obs_atlas::store::Store;
use kira_obs_atlas::transform::{
    AllowList, AllowListTally, CategorySummary, DropHighCardinality, ObsTransform,
};

#[derive(Parser)]
#[command(name = "kira-obs")]
#[command(about = "Aggregate per-cell annotation tables across the CELLxGENE h5ad corpus")]
#[command(version, author)]
struct Cli {
    /// JSON config file (defaults to ./kira-obs.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print summaries as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Parse a dataset catalog and report what it lists")]
    Catalog(SourceArgs),
    #[command(about = "Collect every low-cardinality obs column (all_obs.tsv.gz)")]
    AllObs(AllObsArgs),
    #[command(about = "Collect the standardized obs columns (all_obs_standard.tsv.gz)")]
    StandardObs(RunArgs),
    #[command(about = "Count cells per standardized value combination")]
    StandardCounts(RunArgs),
    #[command(about = "Census of category counts per column and dataset")]
    Categories(RunArgs),
}

#[derive(Args, Clone)]
struct SourceArgs {
    #[arg(long)]
    catalog: Option<String>,

    #[arg(long)]
    format: Option<CatalogFormat>,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    max_datasets: Option<usize>,

    #[arg(long)]
    results_dir: Option<String>,

    #[arg(long)]
    scratch: Option<String>,

    #[arg(long, value_enum, default_value_t = Provenance::None)]
    provenance: Provenance,
}

#[derive(Args, Clone)]
struct AllObsArgs {
    #[command(flatten)]
    run: RunArgs,

    #[arg(long)]
    max_categories: Option<usize>,

    /// Also drop columns that are not categorical
    #[arg(long)]
    categorical_only: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(atlas) = report.downcast_ref::<AtlasError>() {
            return ExitCode::from(map_exit_code(atlas));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &AtlasError) -> u8 {
    match error {
        AtlasError::ConfigRead(_)
        | AtlasError::ConfigParse(_)
        | AtlasError::CatalogRead(_)
        | AtlasError::CatalogParse(_)
        | AtlasError::CatalogColumn(_)
        | AtlasError::InvalidLocator(_) => 2,
        AtlasError::S3Http(_) | AtlasError::S3Status { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Catalog(args) => run_catalog(&args, &resolved, output_mode),
        Commands::AllObs(args) => {
            let max_categories = args.max_categories.unwrap_or(resolved.max_categories);
            let mut transform = DropHighCardinality::new(max_categories);
            if args.categorical_only {
                transform = transform.categorical_only();
            }
            let provenance = args.run.provenance;
            run_pass(&args.run, &resolved, output_mode, &transform, |store, report| {
                let frame = concat_frames(&report.entries, provenance)?;
                Ok(vec![persist_frame(store, ALL_OBS_FILE, &frame)?])
            })
        }
        Commands::StandardObs(args) => {
            let transform = AllowList::new(resolved.allow_list.iter().cloned());
            run_pass(&args, &resolved, output_mode, &transform, |store, report| {
                let frame = concat_frames(&report.entries, args.provenance)?;
                Ok(vec![persist_frame(store, ALL_OBS_STANDARD_FILE, &frame)?])
            })
        }
        Commands::StandardCounts(args) => {
            let allow_list = AllowList::new(resolved.allow_list.iter().cloned());
            let transform = AllowListTally::new(allow_list);
            run_pass(&args, &resolved, output_mode, &transform, |store, report| {
                let frame = concat_tallies(&report.entries, args.provenance)?;
                Ok(vec![persist_frame(store, ALL_OBS_STANDARD_COUNTS_FILE, &frame)?])
            })
        }
        Commands::Categories(args) => {
            run_pass(&args, &resolved, output_mode, &CategorySummary, |store, report| {
                CategoryCensus::from_entries(&report.entries).persist(store)
            })
        }
    }
}

fn catalog_source(args: &SourceArgs, resolved: &ResolvedConfig) -> (Utf8PathBuf, CatalogFormat) {
    let path = args
        .catalog
        .clone()
        .map(Utf8PathBuf::from)
        .unwrap_or_else(|| resolved.catalog.clone());
    let format = args
        .format
        .or(resolved.catalog_format)
        .unwrap_or_else(|| CatalogFormat::detect(path.as_std_path()));
    (path, format)
}

fn run_catalog(
    args: &SourceArgs,
    resolved: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let (path, format) = catalog_source(args, resolved);
    let catalog = Catalog::load(path.as_std_path(), Some(format))?;
    let summary = CatalogSummary::new(path.as_str(), format, &catalog);
    match output_mode {
        OutputMode::Json => JsonOutput::print_catalog(&summary).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_catalog(&summary),
    }
    Ok(())
}

fn run_pass<T, W>(
    args: &RunArgs,
    resolved: &ResolvedConfig,
    output_mode: OutputMode,
    transform: &T,
    write: W,
) -> miette::Result<()>
where
    T: ObsTransform,
    W: FnOnce(&Store, &ApplyReport<T::Output>) -> Result<Vec<Utf8PathBuf>, AtlasError>,
{
    let started_at = Utc::now();
    let (catalog, format) = catalog_source(&args.source, resolved);
    let store = Store::new_with_paths(
        args.scratch
            .clone()
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| resolved.scratch_path.clone()),
        args.results_dir
            .clone()
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| resolved.results_dir.clone()),
    );
    let options = ApplyOptions {
        max_datasets: args.max_datasets.or(resolved.max_datasets),
    };

    let objects = S3HttpClient::new(S3ClientOptions {
        endpoint: resolved.s3_endpoint.clone(),
        request_timeout: resolved.request_timeout_secs.map(Duration::from_secs),
        ..S3ClientOptions::default()
    })?;
    let app = App::new(store.clone(), objects, H5adObsReader);

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &LogSink,
    };
    let report = app.apply_path(
        catalog.as_std_path(),
        Some(format),
        transform,
        &options,
        sink,
    )?;

    store.ensure_results_dir()?;
    let outputs = write(&store, &report)?;
    let summary = RunSummary::from_report(&report, started_at, outputs);
    summary.persist(&store)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&summary).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_run(&summary),
    }
    Ok(())
}
