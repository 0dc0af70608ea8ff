//! Launching the external simulator.
//!
//! The [`Invoker`] owns the compile step and the per-seed launches. For each
//! seed it writes a small control script that tells the simulator which test
//! to run, with which seed, and where to save coverage, then runs the
//! simulator in batch mode with that script. It reports only whether the run
//! completed or timed out; reading the log is the classifier's job.
//!
//! Per-seed layout under the results directory:
//!
//! ```text
//! seed_<N>/run_<N>.do     control script
//! seed_<N>/sim_<N>.log    combined stdout/stderr
//! seed_<N>/cov_<N>.acdb   coverage database, if the simulator saved one
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{CommandSpec, RegressionConfig};
use crate::process::{ProcessError, ProcessOutcome, ProcessRunner};

/// How a seed's simulator process ended, as far as classification cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited by itself (any exit code, or none if it never
    /// started).
    Completed { exit_code: Option<i32> },
    /// The process was killed after exceeding the per-seed timeout.
    TimedOut,
}

/// Raw record of one seed's launch, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedRun {
    pub seed: u32,
    pub outcome: RunOutcome,
    pub log_path: PathBuf,
    /// Where the control script asked the simulator to save coverage. The
    /// file may not exist.
    pub coverage_path: PathBuf,
}

/// File locations for one seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedLayout {
    pub dir: PathBuf,
    pub script: PathBuf,
    pub log: PathBuf,
    pub coverage: PathBuf,
}

impl SeedLayout {
    pub fn new(results_dir: &Path, seed: u32) -> Self {
        let dir = results_dir.join(format!("seed_{seed}"));
        Self {
            script: dir.join(format!("run_{seed}.do")),
            log: dir.join(format!("sim_{seed}.log")),
            coverage: dir.join(format!("cov_{seed}.acdb")),
            dir,
        }
    }
}

/// Appends a `--- <cmd> ---` header to a shared log file.
pub(crate) fn write_log_header(log: &Path, command: &CommandSpec) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new().create(true).append(true).open(log)?;
    writeln!(file, "\n--- {} ---", command.display_line())
}

/// Drives the external simulator's compile step and per-seed runs.
pub struct Invoker {
    config: Arc<RegressionConfig>,
    runner: Arc<dyn ProcessRunner>,
}

impl Invoker {
    pub fn new(config: Arc<RegressionConfig>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    /// Renders the per-seed control script.
    pub fn control_script(&self, seed: u32, test: &str, coverage_path: &Path) -> String {
        let sim = &self.config.simulator;
        let mut load = vec![sim.load_command.clone()];
        load.extend(sim.plusargs.iter().cloned());
        load.push(format!("+UVM_TESTNAME={test}"));
        load.push("-sv_seed".to_string());
        load.push(seed.to_string());
        load.push(sim.top_module.clone());

        format!(
            "{};\nrun -all;\nacdb save -db {};\nexit;\n",
            load.join(" "),
            coverage_path.display()
        )
    }

    /// Runs every configured compile step, in order, into `compile.log`.
    ///
    /// Returns `Ok(true)` if all steps exited 0. Stops at the first step
    /// that fails, times out or cannot be launched and returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the compile log itself cannot be written.
    pub async fn compile(&self) -> Result<bool, std::io::Error> {
        let log = self.config.compile_log_path();
        fs::write(&log, "")?;

        for step in &self.config.compile {
            write_log_header(&log, step)?;
            info!(cmd = %step.display_line(), "compile step");
            match self.runner.run(step, &log, None).await {
                Ok(outcome) if outcome.success() => {}
                Ok(outcome) => {
                    warn!(cmd = %step.display_line(), ?outcome, "compile step failed");
                    return Ok(false);
                }
                Err(e) => {
                    warn!(cmd = %step.display_line(), error = %e, "compile step could not run");
                    let mut file = fs::OpenOptions::new().append(true).open(&log)?;
                    writeln!(file, "{e}")?;
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Runs one seed of `test`, bounded by `timeout`.
    ///
    /// The seed directory, control script and log are left on disk even when
    /// the run times out. Logs and coverage databases from an earlier run of
    /// the same seed are removed first.
    ///
    /// Never fails. If the seed cannot be set up, launched or waited on, the
    /// log is removed and the run reads as having produced no output.
    pub async fn run_seed(&self, seed: u32, test: &str, timeout: Duration) -> SeedRun {
        let layout = SeedLayout::new(&self.config.results_dir, seed);

        let outcome = match self.launch(seed, test, &layout, timeout).await {
            Ok(ProcessOutcome::TimedOut) => RunOutcome::TimedOut,
            Ok(ProcessOutcome::Exited { code }) => RunOutcome::Completed { exit_code: code },
            Err(e) => {
                warn!(seed, error = %e, "seed could not be run");
                discard(&layout.log);
                RunOutcome::Completed { exit_code: None }
            }
        };

        SeedRun {
            seed,
            outcome,
            log_path: layout.log,
            coverage_path: layout.coverage,
        }
    }

    async fn launch(
        &self,
        seed: u32,
        test: &str,
        layout: &SeedLayout,
        timeout: Duration,
    ) -> Result<ProcessOutcome, ProcessError> {
        fs::create_dir_all(&layout.dir)?;
        fs::write(&layout.script, self.control_script(seed, test, &layout.coverage))?;
        remove_stale(&layout.log)?;
        remove_stale(&layout.coverage)?;

        let command = self.config.simulator.batch_command(&layout.script);
        debug!(seed, cmd = %command.display_line(), "launching seed");
        self.runner.run(&command, &layout.log, Some(timeout)).await
    }
}

/// Removes `path` if present.
fn remove_stale(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Removes a log that must not be classified.
fn discard(log: &Path) {
    if let Err(e) = remove_stale(log) {
        warn!(log = %log.display(), error = %e, "could not remove log of failed seed");
    }
}
