#![warn(missing_docs)]
//! FilterBench CLI Library
//!
//! Supervisor, strategy runners, baseline store and benchmark driver, plus
//! the command line that wires them together. The `filterbench` binary calls
//! [`run`]; the same binary doubles as the worker process when started with
//! the hidden `--filter-worker` flag.
//!
//! ```text
//! filterbench serial                  # measure and persist the baseline
//! filterbench pool --workers 1,2,4,8  # static chunked pool
//! filterbench futures --workers 2,4,8 # dynamic submit/await pool
//! ```

mod baseline;
mod config;
mod driver;
mod runners;
mod supervisor;

pub use baseline::*;
pub use config::*;
pub use driver::{BenchmarkDriver, DriverError, DriverState, normalize_worker_counts};
pub use runners::*;
pub use supervisor::*;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use filterbench_core::{FilterPipeline, UnitOfWork, WorkerMain, build_batch, discover_images};
use filterbench_ipc::WorkItem;
use filterbench_report::{
    BenchmarkReport, EFFICIENCY_TOLERANCE, OutputFormat, RunOutcome, format_run_block,
    format_summary_table, format_timing_summary, generate_json_report,
};
use regex::Regex;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// FilterBench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "filterbench")]
#[command(
    author,
    version,
    about = "FilterBench - parallel scaling benchmark for an image filter workload"
)]
pub struct Cli {
    /// Strategy to benchmark
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Input folder scanned recursively for images
    #[arg(long, global = true)]
    pub input: Option<PathBuf>,

    /// Root folder for every output
    #[arg(long, global = true)]
    pub output_root: Option<PathBuf>,

    /// Baseline record store (defaults to config or serial_baseline_value.csv)
    #[arg(long, global = true)]
    pub baseline: Option<PathBuf>,

    /// Per-item worker timeout (e.g., "30s", "2m")
    #[arg(long, global = true)]
    pub timeout: Option<String>,

    /// Worker isolation: process or thread
    #[arg(long, global = true)]
    pub isolation: Option<IsolationMode>,

    /// Only process input paths matching this regex
    #[arg(long, global = true)]
    pub filter: Option<String>,

    /// Output format: human, json
    #[arg(long, global = true)]
    pub format: Option<String>,

    /// Report file (stdout if not specified)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Hide progress bars and informational logs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Internal: Run as worker process (used by supervisor)
    #[arg(long = "filter-worker", hide = true)]
    pub filter_worker: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the batch serially and persist the baseline and detail log
    Serial,
    /// Benchmark the static chunked pool
    Pool {
        /// Worker counts to try, comma separated (defaults to config)
        #[arg(long, value_delimiter = ',')]
        workers: Vec<usize>,
        /// Measure the serial baseline first instead of loading it
        #[arg(long)]
        compute_baseline: bool,
    },
    /// Benchmark the dynamic future pool
    Futures {
        /// Worker counts to try, comma separated (defaults to config)
        #[arg(long, value_delimiter = ',')]
        workers: Vec<usize>,
    },
    /// Print a default filterbench.toml
    Init,
}

/// Run the FilterBench CLI with the process arguments.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the FilterBench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Worker mode first: its stdout may be the IPC channel.
    if cli.filter_worker {
        return run_worker_mode();
    }

    init_tracing(cli.verbose, cli.quiet);

    let Some(command) = cli.command.as_ref() else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    if let Commands::Init = command {
        print!("{}", FilterConfig::default_toml());
        return Ok(());
    }

    let config = FilterConfig::discover()?.unwrap_or_default();
    let settings = Settings::resolve(&cli, config)?;
    tracing::debug!(
        isolation = ?settings.isolation,
        timeout = ?settings.timeout,
        input = %settings.config.input.directory.display(),
        "resolved settings"
    );

    match command {
        Commands::Serial => run_serial(&settings),
        Commands::Pool {
            workers,
            compute_baseline,
        } => run_pool(&settings, workers, *compute_baseline),
        Commands::Futures { workers } => run_futures(&settings, workers),
        Commands::Init => Ok(()),
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "filterbench=debug"
    } else if quiet {
        "filterbench=warn"
    } else {
        "filterbench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

/// Run as a worker process (IPC mode)
fn run_worker_mode() -> anyhow::Result<()> {
    let mut worker = WorkerMain::new(workload());
    worker
        .run()
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("Worker error: {}", e))
}

fn workload() -> Arc<dyn UnitOfWork> {
    Arc::new(FilterPipeline::new())
}

/// Configuration after CLI overrides
struct Settings {
    config: FilterConfig,
    baseline_path: PathBuf,
    format: OutputFormat,
    output: Option<PathBuf>,
    timeout: Option<Duration>,
    isolation: IsolationMode,
    filter: Option<Regex>,
    show_progress: bool,
}

impl Settings {
    fn resolve(cli: &Cli, mut config: FilterConfig) -> anyhow::Result<Self> {
        if let Some(input) = &cli.input {
            config.input.directory = input.clone();
        }
        if let Some(root) = &cli.output_root {
            config.output.root = root.clone();
        }

        let baseline_path = cli
            .baseline
            .clone()
            .unwrap_or_else(|| config.output.resolve(&config.output.baseline_file));

        let format = cli
            .format
            .as_deref()
            .unwrap_or(&config.output.format)
            .parse::<OutputFormat>()
            .map_err(anyhow::Error::msg)?;

        let timeout = match &cli.timeout {
            Some(s) => Some(Duration::from_nanos(
                FilterConfig::parse_duration(s).context("invalid --timeout")?,
            )),
            None => config.runner.timeout().context("invalid runner.timeout")?,
        };

        let filter = cli
            .filter
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("invalid --filter pattern")?;

        Ok(Self {
            isolation: cli.isolation.unwrap_or(config.runner.isolation),
            show_progress: !cli.quiet && std::io::stderr().is_terminal(),
            output: cli.output.clone(),
            config,
            baseline_path,
            format,
            timeout,
            filter,
        })
    }

    fn output_path(&self, path: &Path) -> PathBuf {
        self.config.output.resolve(path)
    }

    /// Run-by-run console output is suppressed when JSON goes to stdout
    fn console(&self) -> bool {
        self.format == OutputFormat::Human || self.output.is_some()
    }

    fn spawner(&self) -> anyhow::Result<Arc<dyn WorkerSpawner>> {
        let spawner: Arc<dyn WorkerSpawner> = match self.isolation {
            IsolationMode::Process => Arc::new(ProcessSpawner::current_exe(self.timeout)?),
            IsolationMode::Thread => Arc::new(ThreadSpawner::new(workload(), self.timeout)),
        };
        Ok(spawner)
    }

    fn serial_runner(&self) -> SerialRunner {
        SerialRunner::new(workload()).with_progress(self.show_progress)
    }

    /// Discover the input batch, writing transformed images under `output_dir`
    fn load_batch(&self, output_dir: &Path) -> anyhow::Result<Vec<WorkItem>> {
        let input = &self.config.input.directory;
        let mut paths = match discover_images(input, &self.config.input.extensions) {
            Ok(paths) => paths,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(input = %input.display(), "input folder does not exist");
                Vec::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to scan {}", input.display()));
            }
        };
        if let Some(filter) = &self.filter {
            paths.retain(|path| filter.is_match(&path.to_string_lossy()));
        }
        tracing::info!(items = paths.len(), input = %input.display(), "discovered input images");
        Ok(build_batch(&paths, output_dir))
    }
}

fn run_serial(settings: &Settings) -> anyhow::Result<()> {
    let output_dir = settings.output_path(&settings.config.output.serial_dir);
    let mut driver = BenchmarkDriver::new(settings.load_batch(&output_dir)?)?;
    let batch = driver.batch().to_vec();

    if settings.console() {
        println!("Starting SERIAL processing of {} images...", batch.len());
    }
    let run = driver.compute_baseline(&settings.serial_runner(), &batch)?;
    let seconds = run.duration.as_secs_f64();

    let store = BaselineStore::new(&settings.baseline_path);
    store.save_baseline(seconds)?;
    let detail_log = settings.output_path(&settings.config.output.detail_log);
    write_detail_log(&detail_log, &run.detail_rows())?;

    let outcome = RunOutcome::tally_as(1, run.duration, &run.results, run.worker);
    if settings.console() {
        print!("{}", format_run_block(&outcome));
        if let Some(summary) = run.timing_summary() {
            print!("{}", format_timing_summary(&summary));
        }
        println!("   Baseline saved to {}", store.path().display());
        println!("   Detail log saved to {}", detail_log.display());
    }

    if settings.format == OutputFormat::Json {
        let report = BenchmarkReport::new("serial", batch.len(), seconds, vec![outcome]);
        emit_report(settings, &report)?;
    }
    Ok(())
}

fn run_pool(settings: &Settings, workers: &[usize], compute_baseline: bool) -> anyhow::Result<()> {
    let output_dir = settings.output_path(&settings.config.output.pool_dir);
    let mut driver = BenchmarkDriver::new(settings.load_batch(&output_dir)?)?;
    let store = BaselineStore::new(&settings.baseline_path);

    if compute_baseline {
        let baseline_dir = settings.output_path(&settings.config.output.baseline_run_dir);
        let baseline_batch: Vec<WorkItem> = driver
            .batch()
            .iter()
            .map(|item| WorkItem::new(&item.source, &baseline_dir))
            .collect();
        if settings.console() {
            println!(
                "Measuring serial baseline over {} images...",
                baseline_batch.len()
            );
        }
        let run = driver.compute_baseline(&settings.serial_runner(), &baseline_batch)?;
        store.save_baseline(run.duration.as_secs_f64())?;
    } else {
        driver.load_baseline(&store)?;
    }

    let counts = worker_counts(workers, &settings.config.runner.pool_workers);
    let runner = PoolRunner::new(settings.spawner()?)
        .with_chunks_per_worker(settings.config.runner.chunks_per_worker);
    run_strategy(settings, driver, &runner, &counts)
}

fn run_futures(settings: &Settings, workers: &[usize]) -> anyhow::Result<()> {
    let output_dir = settings.output_path(&settings.config.output.futures_dir);
    let mut driver = BenchmarkDriver::new(settings.load_batch(&output_dir)?)?;
    driver.load_baseline(&BaselineStore::new(&settings.baseline_path))?;

    let counts = worker_counts(workers, &settings.config.runner.futures_workers);
    let runner = FutureRunner::new(settings.spawner()?);
    run_strategy(settings, driver, &runner, &counts)
}

fn worker_counts(cli: &[usize], configured: &[usize]) -> Vec<usize> {
    if cli.is_empty() {
        configured.to_vec()
    } else {
        cli.to_vec()
    }
}

fn run_strategy<R: Runner>(
    settings: &Settings,
    mut driver: BenchmarkDriver,
    runner: &R,
    counts: &[usize],
) -> anyhow::Result<()> {
    let console = settings.console();
    if console {
        println!(
            "Starting {} benchmark over {} images (isolation: {:?})",
            runner.name().to_uppercase(),
            driver.batch().len(),
            settings.isolation
        );
    }

    driver.run(runner, counts, |outcome| {
        if console {
            println!("\n--- {} workers ---", outcome.worker_count);
            print!("{}", format_run_block(outcome));
        }
        if outcome.unattributed() > 0 {
            tracing::warn!(
                workers = outcome.worker_count,
                items = outcome.unattributed(),
                "items failed without a known worker"
            );
        }
    })?;

    let report = driver.report(runner.name())?;
    for row in report.superlinear_rows() {
        eprintln!(
            "Warning: {} workers reached {:.1}% efficiency (above {:.0}%); the serial baseline looks mismeasured",
            row.worker_count,
            row.efficiency.unwrap_or_default() * 100.0,
            (1.0 + EFFICIENCY_TOLERANCE) * 100.0
        );
    }
    if report.total_failures() > 0 {
        tracing::warn!(failures = report.total_failures(), "some items failed");
    }

    emit_report(settings, &report)
}

fn emit_report(settings: &Settings, report: &BenchmarkReport) -> anyhow::Result<()> {
    let output = match settings.format {
        OutputFormat::Json => generate_json_report(report)?,
        OutputFormat::Human => format_summary_table(report),
    };

    if let Some(path) = &settings.output {
        std::fs::write(path, output.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Report written to: {}", path.display());
    } else {
        print!("{}", output);
    }
    Ok(())
}
