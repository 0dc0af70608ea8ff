//! Aggregating per-seed results into a verdict and rendering the summary.
//!
//! [`RegressionSummary`] folds a batch of [`RunResult`]s into per-status
//! counts and scoreboard totals. [`Report`] renders those as a fixed-column
//! table followed by the totals block. The rendered text is the only form
//! in which a summary ever leaves the process.
//!
//! The regression succeeds when no run is `FAIL`, `FATAL` or `TIMEOUT`.
//! `UNKNOWN` and `NO_LOG` runs do not fail it on their own; they are counted
//! as unresolved and flagged with a `?` marker in the table.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crossterm::style::{Color, Stylize};

use crate::classifier::{RunResult, RunStatus};

const RULE_WIDTH: usize = 62;

/// ANSI colouring that can be switched off as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paint {
    enabled: bool,
}

impl Paint {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn plain() -> Self {
        Self::new(false)
    }

    fn fg(&self, text: &str, color: Color) -> String {
        if self.enabled {
            text.to_string().with(color).to_string()
        } else {
            text.to_string()
        }
    }

    /// Passing results and healthy numbers.
    pub fn success(&self, text: &str) -> String {
        self.fg(text, Color::Green)
    }

    /// Failures.
    pub fn failure(&self, text: &str) -> String {
        self.fg(text, Color::Red)
    }

    /// Timeouts, unresolved runs and skipped steps.
    pub fn warning(&self, text: &str) -> String {
        self.fg(text, Color::Yellow)
    }

    /// Section banners.
    pub fn heading(&self, text: &str) -> String {
        if self.enabled {
            text.to_string().bold().to_string()
        } else {
            text.to_string()
        }
    }

    /// Colours `text` by what `status` means for the verdict.
    pub fn status(&self, status: RunStatus, text: &str) -> String {
        match status {
            RunStatus::Pass => self.success(text),
            RunStatus::Fail | RunStatus::Fatal => self.failure(text),
            RunStatus::Timeout | RunStatus::NoLog | RunStatus::Unknown => self.warning(text),
        }
    }

    /// Colours a coverage figure: green from 95%, yellow from 80%, red below.
    pub fn coverage(&self, percent: f64) -> String {
        let text = format!("{percent:.2}%");
        if percent >= 95.0 {
            self.success(&text)
        } else if percent >= 80.0 {
            self.warning(&text)
        } else {
            self.failure(&text)
        }
    }
}

/// Aggregate view over one regression's results.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionSummary {
    counts: BTreeMap<RunStatus, usize>,
    pub total: usize,
    /// Sum of scoreboard passes over all runs.
    pub total_checks: u64,
    /// Sum of scoreboard failures over all runs.
    pub total_failures: u64,
    /// Merged coverage, `None` when nothing was merged or no total was found.
    pub coverage: Option<f64>,
    pub elapsed: Duration,
}

impl RegressionSummary {
    pub fn from_results(results: &[RunResult], coverage: Option<f64>, elapsed: Duration) -> Self {
        let mut counts = BTreeMap::new();
        for r in results {
            *counts.entry(r.status).or_insert(0) += 1;
        }
        Self {
            counts,
            total: results.len(),
            total_checks: results.iter().map(|r| r.pass_count).sum(),
            total_failures: results.iter().map(|r| r.fail_count).sum(),
            coverage,
            elapsed,
        }
    }

    pub fn count(&self, status: RunStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn passed(&self) -> usize {
        self.count(RunStatus::Pass)
    }

    /// `FAIL` plus `FATAL`.
    pub fn failed(&self) -> usize {
        self.count(RunStatus::Fail) + self.count(RunStatus::Fatal)
    }

    pub fn timed_out(&self) -> usize {
        self.count(RunStatus::Timeout)
    }

    /// `UNKNOWN` plus `NO_LOG`.
    pub fn unresolved(&self) -> usize {
        self.count(RunStatus::Unknown) + self.count(RunStatus::NoLog)
    }

    /// True iff no run failed, died fatally or timed out.
    pub fn succeeded(&self) -> bool {
        self.failed() == 0 && self.timed_out() == 0
    }

    /// Process exit code carrying the verdict: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}

/// Renders the per-seed table plus totals.
pub struct Report<'a> {
    results: &'a [RunResult],
    summary: &'a RegressionSummary,
    results_dir: &'a Path,
    paint: Paint,
}

impl<'a> Report<'a> {
    pub fn new(
        results: &'a [RunResult],
        summary: &'a RegressionSummary,
        results_dir: &'a Path,
        paint: Paint,
    ) -> Self {
        Self {
            results,
            summary,
            results_dir,
            paint,
        }
    }

    fn status_cell(&self, status: RunStatus) -> String {
        let label = if status.is_unresolved() {
            format!("? {status}")
        } else {
            status.to_string()
        };
        self.paint.status(status, &format!("{label:^10}"))
    }

    /// Shows `n` in `paint` when non-zero, plain `0` otherwise.
    fn nonzero<N: PartialEq + Default + ToString>(&self, n: N, paint: fn(&Paint, &str) -> String) -> String {
        if n == N::default() {
            "0".to_string()
        } else {
            paint(&self.paint, &n.to_string())
        }
    }

    pub fn render(&self) -> String {
        let p = &self.paint;
        let s = self.summary;
        let double = p.heading(&"═".repeat(RULE_WIDTH));
        let header = format!(
            "  {:>8}  {:^10}  {:>6}  {:>6}  {:>7}  {:>7}",
            "Seed", "Status", "Pass", "Fail", "Errors", "Fatals"
        );
        let underline = format!("  {}", "─".repeat(header.chars().count() - 2));

        let mut lines = vec![
            String::new(),
            double.clone(),
            p.heading("                    REGRESSION SUMMARY"),
            double.clone(),
            header,
            underline,
        ];

        lines.extend(self.results.iter().map(|r| {
            format!(
                "  {:>8}  {}  {:>6}  {:>6}  {:>7}  {:>7}",
                r.seed,
                self.status_cell(r.status),
                r.pass_count,
                r.fail_count,
                r.error_count,
                r.fatal_count
            )
        }));

        lines.push(String::new());
        lines.push(p.heading(&"─".repeat(RULE_WIDTH)));
        lines.push(format!("  Seeds run     : {}", s.total));
        lines.push(format!("  Passed        : {}", p.success(&s.passed().to_string())));
        lines.push(format!("  Failed        : {}", self.nonzero(s.failed(), Paint::failure)));
        lines.push(format!("  Timeout       : {}", self.nonzero(s.timed_out(), Paint::warning)));
        lines.push(format!("  Unresolved    : {}", self.nonzero(s.unresolved(), Paint::warning)));
        lines.push(format!("  Total checks  : {}", s.total_checks));
        lines.push(format!("  Total failures: {}", self.nonzero(s.total_failures, Paint::failure)));
        if let Some(pct) = s.coverage {
            lines.push(format!("  Merged cov    : {}", p.coverage(pct)));
        }
        lines.push(format!("  Elapsed       : {:.1}s", s.elapsed.as_secs_f64()));
        lines.push(format!("  Results dir   : {}/", self.results_dir.display()));
        lines.push(double);

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}
