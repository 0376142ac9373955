use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pixsort_core::{
    ClassLevel, Context, Event, FileNameTag, FolderSpec, Labels, OrganizeOptions, RunOutcome,
    Separator, TimePolicy, TransferMode,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LabelSet {
    En,
    ZhCn,
}

#[derive(Parser, Debug)]
#[command(name = "pixsort", version, about = "Sort photos and videos into folders by date, device and place")]
struct Cli {
    /// Source folders (override the folders of --config)
    folders: Vec<PathBuf>,

    /// Only look at the top level of each source folder
    #[arg(long)]
    no_recursive: bool,

    /// Destination root; without it files are reorganized inside the source folders
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum)]
    mode: Option<TransferMode>,

    /// Which timestamp decides a file's date
    #[arg(long = "time", value_enum)]
    time_policy: Option<TimePolicy>,

    /// Folder levels, outermost first (e.g. year,month,device-make)
    #[arg(long, value_enum, value_delimiter = ',')]
    levels: Vec<ClassLevel>,

    /// Filename tags (e.g. year,month,day,time,original or custom:Trip)
    #[arg(long = "name", value_delimiter = ',')]
    name_tags: Vec<FileNameTag>,

    #[arg(long, value_enum)]
    separator: Option<Separator>,

    /// GeoJSON province boundaries
    #[arg(long)]
    provinces: Option<PathBuf>,

    /// GeoJSON city boundaries
    #[arg(long)]
    cities: Option<PathBuf>,

    /// File that keeps reverse-geocode results between runs
    #[arg(long)]
    geocode_cache: Option<PathBuf>,

    /// exiftool binary (default: search PATH)
    #[arg(long)]
    exiftool: Option<PathBuf>,

    /// Seconds before an exiftool call is abandoned
    #[arg(long)]
    exiftool_timeout: Option<u64>,

    /// Folder and sentinel names
    #[arg(long, value_enum)]
    labels: Option<LabelSet>,

    /// JSON file with organize options; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn build_options(cli: &Cli) -> anyhow::Result<OrganizeOptions> {
    let mut options = match &cli.config {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => OrganizeOptions::default(),
    };

    if !cli.folders.is_empty() {
        options.folders = cli
            .folders
            .iter()
            .map(|path| FolderSpec::new(path, !cli.no_recursive))
            .collect();
    } else if cli.no_recursive {
        for folder in &mut options.folders {
            folder.include_subfolders = false;
        }
    }
    if cli.output.is_some() {
        options.destination = cli.output.clone();
    }
    if let Some(mode) = cli.mode {
        options.mode = mode;
    }
    if let Some(policy) = cli.time_policy {
        options.time_policy = policy;
    }
    if !cli.levels.is_empty() {
        options.levels = cli.levels.clone();
    }
    if !cli.name_tags.is_empty() {
        options.name_tags = cli.name_tags.clone();
    }
    if let Some(separator) = cli.separator {
        options.separator = separator;
    }
    match cli.labels {
        Some(LabelSet::En) => options.labels = Labels::default(),
        Some(LabelSet::ZhCn) => options.labels = Labels::zh_cn(),
        None => {}
    }
    if cli.provinces.is_some() {
        options.geo.provinces = cli.provinces.clone();
    }
    if cli.cities.is_some() {
        options.geo.cities = cli.cities.clone();
    }
    if cli.geocode_cache.is_some() {
        options.geo.cache_file = cli.geocode_cache.clone();
    }
    if cli.exiftool.is_some() {
        options.exiftool.program = cli.exiftool.clone();
    }
    if let Some(secs) = cli.exiftool_timeout {
        options.exiftool.timeout_secs = secs;
    }
    Ok(options)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let t_total = Instant::now();

    let options = build_options(&cli)?;
    options.validate()?;
    let context = Context::from_options(&options)?;
    match &context.exiftool {
        Some(tool) => tracing::info!(program = %tool.program().display(), "using exiftool"),
        None => tracing::warn!("exiftool not found; RAW, video and audio files will use file timestamps"),
    }

    let worker = pixsort_core::spawn(options, context)?;
    let token = worker.token().clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling after the current file...");
        token.cancel();
    })?;

    let pb = ProgressBar::new(100);
    pb.set_style(ProgressStyle::default_bar().template("[{bar:40}] {pos:>3}% {msg}")?);
    for event in worker.events().iter() {
        match event {
            Event::Progress(percent) => pb.set_position(u64::from(percent)),
            // already printed through tracing
            Event::Log { .. } => {}
            Event::Finished(_) => pb.finish_and_clear(),
        }
    }
    pb.finish_and_clear();

    let summary = worker.join()?;
    let counts = summary.counts;
    let outcome = match summary.outcome {
        RunOutcome::Completed => "Done!",
        RunOutcome::Cancelled => "Cancelled.",
    };
    eprintln!(
        "{} {}/{} files processed, {} succeeded, {} failed, {} empty folders removed ({:.2}s)",
        outcome,
        counts.processed_count,
        counts.total_count,
        counts.success_count,
        counts.fail_count,
        summary.removed_dirs,
        t_total.elapsed().as_secs_f64()
    );

    Ok(())
}
