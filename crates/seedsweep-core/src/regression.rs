//! One regression from start to finish: compile, run seeds, merge coverage.
//!
//! [`Regression`] wires the [`Invoker`], the classifier and the
//! [`CoverageMerger`] together around a shared config and process runner.
//! Seeds run strictly one after another. Presentation is left to the caller,
//! which is notified after each seed through the `on_result` callback of
//! [`Regression::run_all`].

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use crate::classifier::{classify_run, RunResult};
use crate::config::{ConfigError, RegressionConfig};
use crate::coverage::{CoverageMerger, CoverageOutcome};
use crate::invoker::Invoker;
use crate::process::ProcessRunner;

/// Smallest seed handed to the simulator.
pub const MIN_SEED: u32 = 1;
/// Largest seed handed to the simulator.
pub const MAX_SEED: u32 = 99_999;

/// Errors that abort a regression.
///
/// Per-seed problems (timeouts, missing or garbled logs, seeds that could
/// not be launched) and coverage problems are not errors; they surface as
/// statuses and as missing coverage respectively.
#[derive(Error, Debug)]
pub enum RegressError {
    /// A compile step failed. Nothing can be simulated.
    #[error("compilation failed, see {}", .log.display())]
    CompileFailed { log: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Draws `n` seeds uniformly from `1..=99999`. Duplicates are possible.
pub fn random_seeds(n: usize) -> Vec<u32> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen_range(MIN_SEED..=MAX_SEED)).collect()
}

/// A configured regression.
pub struct Regression {
    config: Arc<RegressionConfig>,
    invoker: Invoker,
    merger: CoverageMerger,
}

impl Regression {
    pub fn new(config: RegressionConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let config = Arc::new(config);
        Self {
            invoker: Invoker::new(config.clone(), runner.clone()),
            merger: CoverageMerger::new(config.clone(), runner),
            config,
        }
    }

    pub fn config(&self) -> &RegressionConfig {
        &self.config
    }

    /// Creates the results directory, wiping it first when `clean` is set.
    pub fn prepare(&self, clean: bool) -> Result<(), RegressError> {
        let root = &self.config.results_dir;
        if clean && root.exists() {
            info!(dir = %root.display(), "removing previous results");
            fs::remove_dir_all(root)?;
        }
        fs::create_dir_all(root)?;
        Ok(())
    }

    /// Runs the compile steps.
    ///
    /// # Errors
    ///
    /// [`RegressError::CompileFailed`] if any step fails. No seed should be
    /// run after that.
    pub async fn compile(&self) -> Result<(), RegressError> {
        if self.invoker.compile().await? {
            info!("compile ok");
            Ok(())
        } else {
            let log = self.config.compile_log_path();
            warn!(log = %log.display(), "compile failed");
            Err(RegressError::CompileFailed { log })
        }
    }

    /// Runs and classifies a single seed of the configured test.
    ///
    /// A seed that cannot be run at all is reported as `NO_LOG` rather than
    /// as an error, so one bad seed never costs the rest of the batch.
    pub async fn run_seed(&self, seed: u32, timeout: Duration) -> RunResult {
        let run = self.invoker.run_seed(seed, &self.config.test, timeout).await;
        let result = classify_run(&run);
        info!(seed, status = %result.status, "seed finished");
        result
    }

    /// Runs `seeds` in order, calling `on_result(index, total, &result)`
    /// after each one. `index` starts at 1.
    pub async fn run_all<F>(
        &self,
        seeds: &[u32],
        timeout: Duration,
        mut on_result: F,
    ) -> Vec<RunResult>
    where
        F: FnMut(usize, usize, &RunResult),
    {
        let total = seeds.len();
        let mut results = Vec::with_capacity(total);
        for (i, &seed) in seeds.iter().enumerate() {
            let result = self.run_seed(seed, timeout).await;
            on_result(i + 1, total, &result);
            results.push(result);
        }
        results
    }

    /// Merges the coverage databases left by `results`. Never fails.
    pub async fn merge_coverage(&self, results: &[RunResult]) -> CoverageOutcome {
        self.merger.merge(results).await
    }
}
