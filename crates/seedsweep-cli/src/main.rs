//! Multi-seed regression runner for an external UVM simulator.
//!
//! Compiles the design once, runs the configured test with a series of seeds
//! (strictly one after another), merges the coverage the runs left behind and
//! prints a summary table. The exit code is 0 only if no seed failed, died
//! fatally or timed out.
//!
//! # Usage
//!
//! ```bash
//! # Ten random seeds of the configured test
//! seedsweep
//!
//! # Explicit seeds, different test, shorter timeout
//! seedsweep -s 1 2 3 -t riscv_rtype_test --timeout 60
//!
//! # Only check that the design compiles
//! seedsweep --compile-only
//!
//! # Reuse a previous compile, wipe old results first
//! seedsweep --no-compile --clean -n 50
//!
//! # Use a config file other than ./seedsweep.json
//! seedsweep -c regress/nightly.json
//! ```
//!
//! Diagnostics go to stderr (`RUST_LOG`, default `warn`) and, in full, to
//! `seedsweep.log` in the results directory.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use seedsweep_core::classifier::{RunResult, RunStatus};
use seedsweep_core::config::{ConfigError, RegressionConfig, TRACE_LOG_FILENAME};
use seedsweep_core::coverage::CoverageOutcome;
use seedsweep_core::process::SystemRunner;
use seedsweep_core::regression::{random_seeds, RegressError, Regression};
use seedsweep_core::summary::{Paint, RegressionSummary, Report};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Multi-seed regression runner for an external UVM simulator.
#[derive(Parser, Debug)]
#[command(name = "seedsweep")]
#[command(about = "Run a UVM test across many seeds and summarise the results")]
#[command(version)]
struct Cli {
    /// Number of random seeds to run
    #[arg(short, long, default_value_t = 10, conflicts_with = "seeds")]
    num_seeds: usize,

    /// Explicit seeds to run, in order
    #[arg(short, long, num_args = 1..)]
    seeds: Vec<u32>,

    /// UVM test name (overrides the config file)
    #[arg(short, long)]
    test: Option<String>,

    /// Per-seed timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Compile the design and exit
    #[arg(long, conflicts_with = "no_compile")]
    compile_only: bool,

    /// Skip compilation and reuse the existing work library
    #[arg(long)]
    no_compile: bool,

    /// Remove the results directory before starting
    #[arg(long)]
    clean: bool,

    /// Config file (default: ./seedsweep.json if present)
    #[arg(short, long, env = "SEEDSWEEP_CONFIG")]
    config: Option<PathBuf>,

    /// Results directory (overrides the config file)
    #[arg(short = 'o', long)]
    results_dir: Option<PathBuf>,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn load_config(cli: &Cli) -> Result<RegressionConfig, ConfigError> {
    let mut config = match &cli.config {
        // An explicitly named file has to exist.
        Some(path) if !path.exists() => {
            return Err(ConfigError::Io {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            })
        }
        Some(path) => RegressionConfig::load(path)?,
        None => RegressionConfig::discover()?,
    };
    if let Some(test) = &cli.test {
        config.test = test.clone();
    }
    if let Some(dir) = &cli.results_dir {
        config.results_dir = dir.clone();
    }
    Ok(config)
}

/// Stderr filtered by `RUST_LOG`, plus a JSON trace log in the results dir.
fn init_tracing(results_dir: &Path) {
    let stderr = fmt::layer().with_writer(std::io::stderr).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    );
    let file = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(tracing_appender::rolling::never(results_dir, TRACE_LOG_FILENAME))
        .with_filter(EnvFilter::new("seedsweep=debug,seedsweep_core=debug"));

    tracing_subscriber::registry().with(stderr).with(file).init();
}

fn section(paint: &Paint, title: &str) {
    println!("\n{}", paint.heading(&format!("══════ {title} ══════")));
}

fn progress_line(paint: &Paint, index: usize, total: usize, r: &RunResult) -> String {
    let outcome = match r.status {
        RunStatus::Pass => format!("{}  ({} checks)", paint.success("PASS"), r.pass_count),
        RunStatus::Timeout => paint.warning("TIMEOUT"),
        status => format!(
            "{}  (err={}, fatal={}, fail={})",
            paint.status(status, status.as_str()),
            r.error_count,
            r.fatal_count,
            r.fail_count
        ),
    };
    format!("[{index}/{total}] Seed {} ... {outcome}", r.seed)
}

fn report_coverage(paint: &Paint, outcome: &CoverageOutcome) {
    match outcome {
        CoverageOutcome::Skipped => {
            println!("{}", paint.warning("No coverage databases found, skipping merge"));
        }
        CoverageOutcome::Failed { log } => {
            println!(
                "{}",
                paint.warning(&format!("Coverage merge failed — see {}", log.display()))
            );
        }
        CoverageOutcome::Merged {
            inputs,
            report,
            percent,
        } => {
            println!("Merged {inputs} coverage database(s)");
            match percent {
                Some(pct) => println!("Merged coverage: {}", paint.coverage(*pct)),
                None => println!(
                    "{}",
                    paint.warning(&format!("No coverage total found in {}", report.display()))
                ),
            }
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, RegressError> {
    let config = load_config(&cli)?;
    let paint = Paint::new(!cli.no_color && std::io::stdout().is_terminal());
    let timeout = Duration::from_secs(cli.timeout);
    let started = Instant::now();

    let regression = Regression::new(config, Arc::new(SystemRunner));
    regression.prepare(cli.clean)?;
    init_tracing(&regression.config().results_dir);

    let test = &regression.config().test;
    println!(
        "{}",
        paint.heading(&format!("seedsweep regression — {test}"))
    );
    println!("Date: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    tracing::info!(test = %test, results = %regression.config().results_dir.display(), "regression starting");

    if !cli.no_compile {
        section(&paint, "COMPILING DESIGN");
        match regression.compile().await {
            Ok(()) => println!("{}", paint.success("Compile OK")),
            Err(RegressError::CompileFailed { log }) => {
                println!(
                    "{}",
                    paint.failure(&format!("COMPILE FAILED — see {}", log.display()))
                );
                return Ok(ExitCode::from(1));
            }
            Err(e) => return Err(e),
        }
    }
    if cli.compile_only {
        return Ok(ExitCode::SUCCESS);
    }

    let seeds = if cli.seeds.is_empty() {
        random_seeds(cli.num_seeds)
    } else {
        cli.seeds.clone()
    };

    section(&paint, &format!("RUNNING {} SEEDS", seeds.len()));
    let results = regression
        .run_all(&seeds, timeout, |index, total, result| {
            println!("{}", progress_line(&paint, index, total, result));
        })
        .await;

    section(&paint, "MERGING COVERAGE");
    let coverage = regression.merge_coverage(&results).await;
    report_coverage(&paint, &coverage);

    let summary = RegressionSummary::from_results(&results, coverage.percent(), started.elapsed());
    let report = Report::new(&results, &summary, &regression.config().results_dir, paint);
    print!("{}", report.render());

    tracing::info!(
        passed = summary.passed(),
        failed = summary.failed(),
        timed_out = summary.timed_out(),
        "regression finished"
    );
    Ok(ExitCode::from(summary.exit_code()))
}
