//! Merging per-seed coverage databases and reading the merged percentage.
//!
//! The database format belongs to the simulator, so merging and reporting are
//! both delegated to its own `acdb merge` / `acdb report` sub-commands, run
//! through batch control scripts. The only thing read back is one overall
//! percentage, scraped from the text report.
//!
//! Coverage is supplementary to the pass/fail verdict: every failure here
//! degrades to "no percentage available" and never fails the regression.
//! "No percentage" is always `None`, never `0.0`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{info, warn};

use crate::classifier::RunResult;
use crate::config::RegressionConfig;
use crate::invoker::write_log_header;
use crate::process::ProcessRunner;

/// Known phrasings of the overall coverage line, matched case-insensitively.
const COVERAGE_PATTERNS: [&str; 3] = [
    r"(?i)CUMULATIVE.*?COVERAGE:\s*([\d.]+)%",
    r"(?i)TOTAL\s+COVERAGE:\s*([\d.]+)%",
    r"(?i)Total\s+Coverage\s+By\s+(?:Instance|Design\s+Unit).*?:\s*([\d.]+)%",
];

fn coverage_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        COVERAGE_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("valid coverage pattern"))
            .collect()
    })
}

/// Extracts the overall coverage percentage from report text.
///
/// Lines are scanned in order and the first line matching any known phrasing
/// with a parseable number wins.
pub fn parse_coverage(text: &str) -> Option<f64> {
    text.lines().find_map(|line| {
        coverage_res().iter().find_map(|re| {
            re.captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .filter(|pct| pct.is_finite())
        })
    })
}

/// Coverage databases from `results` that are present on disk, each listed
/// once, in run order.
pub fn collect_artifacts(results: &[RunResult]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    results
        .iter()
        .filter_map(|r| r.coverage_path.as_ref())
        .filter(|p| p.exists() && seen.insert(*p))
        .cloned()
        .collect()
}

/// What the merge step produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverageOutcome {
    /// No run left a coverage database; nothing was merged.
    Skipped,
    /// The merge or report command failed. Details are in `log`.
    Failed { log: PathBuf },
    /// Merge and report both ran. `percent` is `None` if the report is
    /// missing or has no recognised total line.
    Merged {
        inputs: usize,
        report: PathBuf,
        percent: Option<f64>,
    },
}

impl CoverageOutcome {
    pub fn percent(&self) -> Option<f64> {
        match self {
            CoverageOutcome::Merged { percent, .. } => *percent,
            _ => None,
        }
    }
}

/// Runs the simulator's merge and report sub-commands.
pub struct CoverageMerger {
    config: Arc<RegressionConfig>,
    runner: Arc<dyn ProcessRunner>,
}

impl CoverageMerger {
    pub fn new(config: Arc<RegressionConfig>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    fn merged_db_path(&self) -> PathBuf {
        self.config.results_dir.join(&self.config.coverage.merged_db)
    }

    fn text_report_path(&self) -> PathBuf {
        self.config.results_dir.join(&self.config.coverage.text_report)
    }

    pub fn merge_script(&self, inputs: &[PathBuf]) -> String {
        let mut script = format!("acdb merge -o {}", self.merged_db_path().display());
        for db in inputs {
            script.push_str(&format!(" -i {}", db.display()));
        }
        script.push_str(";\nexit;\n");
        script
    }

    pub fn report_script(&self) -> String {
        let merged = self.merged_db_path();
        let mut script = format!(
            "acdb report -db {} -txt -o {} -verbose;\n",
            merged.display(),
            self.text_report_path().display()
        );
        if let Some(html) = &self.config.coverage.html_report {
            script.push_str(&format!(
                "acdb report -db {} -html -o {};\n",
                merged.display(),
                self.config.results_dir.join(html).display()
            ));
        }
        script.push_str("exit;\n");
        script
    }

    /// Writes `script` to `name` under the results directory and runs it
    /// in batch mode. Returns whether it exited cleanly.
    async fn run_script(&self, name: &str, script: &str, log: &Path) -> std::io::Result<bool> {
        let path = self.config.results_dir.join(name);
        fs::write(&path, script)?;
        let command = self.config.simulator.batch_command(&path);
        write_log_header(log, &command)?;

        match self
            .runner
            .run(&command, log, Some(self.config.coverage.timeout()))
            .await
        {
            Ok(outcome) if outcome.success() => Ok(true),
            Ok(outcome) => {
                warn!(script = name, ?outcome, "coverage step failed");
                Ok(false)
            }
            Err(e) => {
                warn!(script = name, error = %e, "coverage step could not run");
                Ok(false)
            }
        }
    }

    /// Merge, then report. Stops after the first step that fails.
    async fn run_steps(&self, inputs: &[PathBuf], log: &Path) -> std::io::Result<bool> {
        fs::write(log, "")?;
        if !self.run_script("merge.do", &self.merge_script(inputs), log).await? {
            return Ok(false);
        }
        self.run_script("report.do", &self.report_script(), log).await
    }

    /// Merges every existing coverage database in `results`.
    pub async fn merge(&self, results: &[RunResult]) -> CoverageOutcome {
        let inputs = collect_artifacts(results);
        if inputs.is_empty() {
            info!("no coverage databases to merge");
            return CoverageOutcome::Skipped;
        }

        let log = self.config.merge_log_path();
        info!(inputs = inputs.len(), "merging coverage");

        match self.run_steps(&inputs, &log).await {
            Ok(true) => {}
            Ok(false) => return CoverageOutcome::Failed { log },
            Err(e) => {
                warn!(error = %e, "coverage scripts could not be written");
                return CoverageOutcome::Failed { log };
            }
        }

        let report = self.text_report_path();
        let percent = match fs::read(&report) {
            Ok(bytes) => {
                let percent = parse_coverage(&String::from_utf8_lossy(&bytes));
                if percent.is_none() {
                    warn!(report = %report.display(), "no total coverage line found in report");
                }
                percent
            }
            Err(e) => {
                warn!(report = %report.display(), error = %e, "merged report not readable");
                None
            }
        };

        CoverageOutcome::Merged {
            inputs: inputs.len(),
            report,
            percent,
        }
    }
}
