//! Turning a finished run's captured output into a status.
//!
//! The log format belongs to the simulator and the UVM testbench, so nothing
//! here parses it structurally. [`scan`] pulls a handful of counters out with
//! single-line patterns; [`classify`] maps those counters onto a
//! [`RunStatus`] by a fixed precedence. Both are pure functions, so they are
//! safe to call for any run at any time.
//!
//! Recognised markers (the first occurrence of each wins):
//!
//! | Marker                    | Field                          |
//! |---------------------------|--------------------------------|
//! | `UVM_ERROR : <n>`         | `error_count`                  |
//! | `UVM_FATAL : <n>`         | `fatal_count`                  |
//! | `<n> passed, <m> failed`  | `pass_count`, `fail_count`     |
//!
//! # Example
//!
//! ```
//! use seedsweep_core::classifier::{classify, scan, RunStatus};
//!
//! let counters = scan("UVM_ERROR : 2\n8 passed, 2 failed\n");
//! assert_eq!(counters.error_count, 2);
//! assert_eq!(classify(Some(&counters), false), RunStatus::Fail);
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::invoker::{RunOutcome, SeedRun};

/// Final status of one seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RunStatus {
    Pass,
    Fail,
    Fatal,
    Timeout,
    /// The run left no log file at all.
    NoLog,
    /// A log exists but carries none of the recognised markers.
    Unknown,
}

impl RunStatus {
    pub const ALL: [RunStatus; 6] = [
        RunStatus::Pass,
        RunStatus::Fail,
        RunStatus::Fatal,
        RunStatus::Timeout,
        RunStatus::NoLog,
        RunStatus::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pass => "PASS",
            RunStatus::Fail => "FAIL",
            RunStatus::Fatal => "FATAL",
            RunStatus::Timeout => "TIMEOUT",
            RunStatus::NoLog => "NO_LOG",
            RunStatus::Unknown => "UNKNOWN",
        }
    }

    /// Statuses that fail the overall regression.
    pub fn fails_regression(&self) -> bool {
        matches!(self, RunStatus::Fail | RunStatus::Fatal | RunStatus::Timeout)
    }

    /// Statuses that carry no verdict either way and are flagged in reports.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, RunStatus::NoLog | RunStatus::Unknown)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Counters scraped from one log. Absent markers read as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogCounters {
    pub error_count: u64,
    pub fatal_count: u64,
    pub pass_count: u64,
    pub fail_count: u64,
}

/// Classified result of one seed. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub seed: u32,
    pub status: RunStatus,
    pub error_count: u64,
    pub fatal_count: u64,
    pub pass_count: u64,
    pub fail_count: u64,
    /// Coverage database, recorded only when the file exists after the run.
    pub coverage_path: Option<PathBuf>,
    pub log_path: PathBuf,
}

fn uvm_error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"UVM_ERROR\s*:\s*(\d+)").expect("valid UVM_ERROR pattern"))
}

fn uvm_fatal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"UVM_FATAL\s*:\s*(\d+)").expect("valid UVM_FATAL pattern"))
}

fn scoreboard_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+)\s+passed,\s+(\d+)\s+failed").expect("valid scoreboard pattern")
    })
}

/// Parses capture group `group` of the first match of `re`, or 0.
fn first_count(re: &Regex, text: &str, group: usize) -> u64 {
    re.captures(text)
        .and_then(|caps| caps.get(group))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Extracts the counters from raw log text.
///
/// Each field is parsed independently; a capture that does not fit in a
/// `u64` reads as 0 without affecting the others.
pub fn scan(text: &str) -> LogCounters {
    let (pass_count, fail_count) = match scoreboard_re().captures(text) {
        Some(caps) => {
            let field = |i: usize| {
                caps.get(i)
                    .and_then(|m| m.as_str().parse::<u64>().ok())
                    .unwrap_or(0)
            };
            (field(1), field(2))
        }
        None => (0, 0),
    };

    LogCounters {
        error_count: first_count(uvm_error_re(), text, 1),
        fatal_count: first_count(uvm_fatal_re(), text, 1),
        pass_count,
        fail_count,
    }
}

/// Maps a run onto its status.
///
/// `counters` is `None` when the run produced no log. Precedence, first
/// match wins: timeout, no log, fatal, error or scoreboard failure, passes,
/// unknown.
pub fn classify(counters: Option<&LogCounters>, timed_out: bool) -> RunStatus {
    if timed_out {
        return RunStatus::Timeout;
    }
    let Some(c) = counters else {
        return RunStatus::NoLog;
    };
    if c.fatal_count > 0 {
        RunStatus::Fatal
    } else if c.error_count > 0 || c.fail_count > 0 {
        RunStatus::Fail
    } else if c.pass_count > 0 {
        RunStatus::Pass
    } else {
        RunStatus::Unknown
    }
}

/// Reads a finished run's log and builds its [`RunResult`].
///
/// A timed-out run is not parsed at all. A log that exists but cannot be
/// read is treated as carrying no markers.
pub fn classify_run(run: &SeedRun) -> RunResult {
    let timed_out = run.outcome == RunOutcome::TimedOut;

    let counters = if timed_out {
        None
    } else {
        match std::fs::read(&run.log_path) {
            Ok(bytes) => Some(scan(&String::from_utf8_lossy(&bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(seed = run.seed, log = %run.log_path.display(), error = %e, "log unreadable");
                Some(LogCounters::default())
            }
        }
    };

    let status = classify(counters.as_ref(), timed_out);
    let counters = counters.unwrap_or_default();
    let coverage_path = (!timed_out && run.coverage_path.exists()).then(|| run.coverage_path.clone());

    debug!(seed = run.seed, %status, ?counters, has_coverage = coverage_path.is_some(), "seed classified");

    RunResult {
        seed: run.seed,
        status,
        error_count: counters.error_count,
        fatal_count: counters.fatal_count,
        pass_count: counters.pass_count,
        fail_count: counters.fail_count,
        coverage_path,
        log_path: run.log_path.clone(),
    }
}
