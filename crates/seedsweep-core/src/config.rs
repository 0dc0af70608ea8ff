//! Regression configuration.
//!
//! Everything that used to be a hard-coded constant (results directory,
//! simulator command, top-level module, compile command lines) lives in
//! [`RegressionConfig`]. A config value is handed to each component at
//! construction, so two regressions in the same process never share state.
//!
//! Settings are read from `seedsweep.json` in the working directory when it
//! exists. Every field is optional in the file.
//!
//! # Example
//!
//! ```no_run
//! use seedsweep_core::config::RegressionConfig;
//!
//! let config = RegressionConfig::discover().unwrap_or_default();
//! println!("results go to {}", config.results_dir.display());
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name looked up by [`RegressionConfig::discover`].
pub const CONFIG_FILENAME: &str = "seedsweep.json";

/// Structured trace log written inside the results directory.
pub const TRACE_LOG_FILENAME: &str = "seedsweep.log";

/// Errors that can occur while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for [`RegressionConfig`].
    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A single external command: a program plus its argument list.
///
/// Commands are never joined into a shell string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Human-readable form used in log headers. Not meant to be executed.
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How the simulator is launched in batch mode and what the control
/// scripts tell it to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Executable launched for every batch invocation.
    pub program: String,
    /// Arguments placed before the control-script path.
    pub batch_args: Vec<String>,
    /// Command written at the top of each per-seed control script.
    pub load_command: String,
    /// Name of the top-level testbench module.
    pub top_module: String,
    /// Extra `+plusargs` passed to the load command.
    pub plusargs: Vec<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            program: "vsim".to_string(),
            batch_args: vec!["-c".to_string(), "-do".to_string()],
            load_command: "vsim".to_string(),
            top_module: "riscv_tb".to_string(),
            plusargs: vec!["+access+r".to_string()],
        }
    }
}

impl SimulatorConfig {
    /// Builds the batch invocation for a given control script.
    pub fn batch_command(&self, script: &Path) -> CommandSpec {
        let mut args = self.batch_args.clone();
        args.push(script.display().to_string());
        CommandSpec {
            program: self.program.clone(),
            args,
        }
    }
}

/// Output names and limits for the coverage merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Merged database file name, relative to the results directory.
    pub merged_db: String,
    /// Text report file name, relative to the results directory.
    pub text_report: String,
    /// Optional HTML report name. When set, a second report is generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_report: Option<String>,
    /// Upper bound for each merge/report invocation.
    pub timeout_secs: u64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            merged_db: "merged_coverage.acdb".to_string(),
            text_report: "merged_coverage.txt".to_string(),
            html_report: None,
            timeout_secs: 600,
        }
    }
}

impl CoverageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Complete configuration for one regression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    /// Root directory for every artifact the regression produces.
    pub results_dir: PathBuf,
    /// UVM test name passed as `+UVM_TESTNAME`.
    pub test: String,
    pub simulator: SimulatorConfig,
    /// Compile steps, run in order before any seed.
    pub compile: Vec<CommandSpec>,
    pub coverage: CoverageConfig,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("regression_results"),
            test: "riscv_random_test".to_string(),
            simulator: SimulatorConfig::default(),
            compile: default_compile_steps(),
            coverage: CoverageConfig::default(),
        }
    }
}

fn default_compile_steps() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("vlib", ["work"]),
        CommandSpec::new(
            "vlog",
            [
                "-sv",
                "-timescale",
                "1ns/1ps",
                "+incdir+.",
                // package first, then interfaces, RTL and the testbench
                "riscv_pkg.sv",
                "imem_if.sv",
                "dmem_if.sv",
                "riscv_core.sv",
                "riscv_assertions.sv",
                "riscv_bind.sv",
                "riscv_tb.sv",
            ],
        ),
    ]
}

impl RegressionConfig {
    /// Load config from `path`.
    ///
    /// Returns [`Default`] if the file does not exist. A file that exists but
    /// cannot be read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `seedsweep.json` from the current directory, or defaults.
    pub fn discover() -> Result<Self, ConfigError> {
        Self::load(Path::new(CONFIG_FILENAME))
    }

    pub fn compile_log_path(&self) -> PathBuf {
        self.results_dir.join("compile.log")
    }

    pub fn merge_log_path(&self) -> PathBuf {
        self.results_dir.join("merge.log")
    }
}
