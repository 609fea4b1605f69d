//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use paperfilter_artifacts::{ArtifactFailure, open_artifact};
use paperfilter_core::pipeline::{Pipeline, PipelineConfig, ProgressReporter, RunReport};
use paperfilter_shared::{
    AcceptedRecord, AppConfig, ClassifierBackend, Threshold, TopicSet, init_config, load_config,
    load_config_from,
};
use paperfilter_storage::SnapshotStore;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// paperfilter — keep only the arXiv papers you care about.
#[derive(Parser)]
#[command(
    name = "paperfilter",
    version,
    about = "Fetch the latest arXiv papers, keep the ones relevant to your topics, and download their PDFs.",
    long_about = None,
    args_conflicts_with_subcommands = true,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.paperfilter/paperfilter.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Flags for a filtering run. Unset flags fall back to the config file.
#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Number of latest papers to fetch [config default: 5].
    #[arg(long)]
    pub num_papers: Option<usize>,

    /// Comma-separated interest topics [config default: "finance,llm,machine learning"].
    #[arg(long)]
    pub preferences: Option<String>,

    /// Minimum relevance score (0-1) to keep a paper [config default: 0.5].
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Open downloaded PDFs after the run.
    #[arg(long)]
    pub open: bool,

    /// Output directory for the snapshot; PDFs go to <out>/pdfs [config default: papers].
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Papers scored and downloaded at once [config default: 1].
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Classifier backend: http, bridge, or keyword.
    #[arg(long)]
    pub backend: Option<ClassifierBackend>,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Subcommands. Without one, a filtering run is performed.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Print the papers kept by the last run.
    Show {
        /// Output directory of the run [config default: papers].
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "paperfilter=info",
        1 => "paperfilter=debug",
        _ => "paperfilter=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        None => cmd_run(config_path, &cli.run).await,
        Some(Command::Show { out }) => cmd_show(config_path, out.as_deref()),
        Some(Command::Config { action }) => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

/// Merge flags over the config file. Flags win.
fn resolve_run(args: &RunArgs, config: &mut AppConfig) -> Result<PipelineConfig> {
    if let Some(backend) = args.backend {
        config.classifier.backend = backend;
    }

    let defaults = &config.defaults;
    let preferences = args.preferences.as_deref().unwrap_or(&defaults.preferences);
    let topics = TopicSet::parse_csv(preferences)?;
    let threshold = Threshold::new(args.threshold.unwrap_or(defaults.threshold))?;

    let concurrency = args.concurrency.unwrap_or(defaults.concurrency);
    if concurrency == 0 {
        return Err(eyre!("--concurrency must be at least 1"));
    }

    let output_dir = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&defaults.output_dir));
    let artifact_dir = output_dir.join(&config.artifacts.subdir);

    Ok(PipelineConfig {
        max_count: args.num_papers.unwrap_or(defaults.num_papers),
        topics,
        threshold,
        output_dir,
        artifact_dir,
        concurrency,
    })
}

async fn cmd_run(config_path: Option<&Path>, args: &RunArgs) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    let run_config = resolve_run(args, &mut config)?;

    info!(
        num_papers = run_config.max_count,
        topics = %run_config.topics,
        threshold = %run_config.threshold,
        backend = %config.classifier.backend,
        "starting paperfilter run"
    );

    let pipeline = Pipeline::from_app_config(&config).await?;

    // Fail before touching the feed if the classifier cannot answer.
    if let Err(e) = pipeline.scorer().health_check().await {
        pipeline.scorer().shutdown().await;
        return Err(eyre!(
            "relevance classifier ({}) is not available: {e}",
            config.classifier.backend
        ));
    }

    let reporter = CliProgress::new();
    let result = pipeline.run(&run_config, &reporter).await;
    pipeline.scorer().shutdown().await;
    if result.is_err() {
        reporter.spinner.finish_and_clear();
    }
    let report = result?;

    if args.open {
        open_all(&report.accepted());
    }

    print_summary(&report);
    Ok(())
}

fn open_all(records: &[&AcceptedRecord]) {
    for record in records.iter().filter(|r| r.has_artifact()) {
        if let Err(e) = open_artifact(Path::new(&record.pdf_path)) {
            warn!(path = %record.pdf_path, error = %e, "could not open PDF");
        }
    }
}

fn print_summary(report: &RunReport) {
    println!();
    if let Some(reason) = &report.feed_failure {
        println!("  Feed unavailable: {reason}");
    }
    println!("  Found {} relevant papers.", report.accepted_count());
    for record in report.accepted() {
        println!(
            "  - {} ({:.2}){}",
            record.document.title,
            record.relevance_score,
            if record.has_artifact() { "" } else { " [no PDF]" }
        );
    }
    println!();
    println!("  Fetched:  {}", report.fetched());
    println!("  Skipped:  {}", report.rejected_count());
    if report.scoring_failed_count() > 0 {
        println!("  Unscored: {}", report.scoring_failed_count());
    }
    if report.artifact_failed_count() > 0 {
        println!("  No PDF:   {}", report.artifact_failed_count());
    }
    println!(
        "  PDFs:     {} ({:.1} KB)",
        report.saved_artifacts.len(),
        report.downloaded_bytes() as f64 / 1024.0
    );
    println!("  Snapshot: {}", report.snapshot_path.display());
    println!(
        "  Finished: {} ({:.1}s)",
        report.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.elapsed.as_secs_f64()
    );
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
///
/// Per-item lines are written around the spinner rather than through it, so
/// they still appear when the spinner is hidden (stderr not a terminal).
struct CliProgress {
    spinner: ProgressBar,
    out: Mutex<Box<dyn Write + Send>>,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self::with_output(spinner, Box::new(std::io::stderr()))
    }

    fn with_output(spinner: ProgressBar, out: Box<dyn Write + Send>) -> Self {
        Self {
            spinner,
            out: Mutex::new(out),
        }
    }

    fn line(&self, text: String) {
        self.spinner.suspend(|| {
            if let Ok(mut out) = self.out.lock() {
                let _ = writeln!(out, "{text}");
            }
        });
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_accepted(&self, record: &AcceptedRecord, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "Scoring [{current}/{total}] kept '{}'",
            record.document.title
        ));
    }

    fn item_skipped(&self, title: &str, score: f64, current: usize, total: usize) {
        self.line(format!("Skipping '{title}' (score: {score:.2})"));
        self.spinner
            .set_message(format!("Scoring [{current}/{total}]"));
    }

    fn scoring_failed(&self, title: &str, reason: &str) {
        self.line(format!("Could not score '{title}': {reason}"));
    }

    fn artifact_failed(&self, failure: &ArtifactFailure) {
        self.line(format!(
            "Failed to download PDF for {}: {}",
            failure.id, failure.reason
        ));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Other commands
// ---------------------------------------------------------------------------

fn cmd_show(config_path: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let dir = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir));

    let store = SnapshotStore::new(&dir);
    if !store.exists() {
        return Err(eyre!(
            "no snapshot at '{}'. Run paperfilter first.",
            store.path().display()
        ));
    }

    let records = store.load()?;
    println!("{} papers in {}", records.len(), store.path().display());
    for record in &records {
        println!();
        println!("  {}", record.document.title);
        println!("  Authors:   {}", record.document.authors);
        println!("  Published: {}", record.document.published);
        println!("  Score:     {:.2}", record.relevance_score);
        println!("  Link:      {}", record.document.link);
        if record.has_artifact() {
            println!("  PDF:       {}", record.pdf_path);
        }
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
