//! Shared test helpers for seedsweep-core integration tests.
//!
//! [`FakeRunner`] stands in for the simulator. It reads the control script
//! it is handed, works out what kind of step it is (compile, seed, merge or
//! report) and plays back a canned behaviour, writing to the log and to the
//! artifact paths named in the script the way the real tool would.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use seedsweep_core::config::{CommandSpec, RegressionConfig};
use seedsweep_core::process::{ProcessError, ProcessOutcome, ProcessRunner};

/// What a fake seed run does.
#[derive(Debug, Clone)]
pub enum SeedBehavior {
    /// Writes `log`, saves no coverage, exits 0.
    Log(String),
    /// Writes `log`, saves the coverage database, exits 0.
    LogWithCoverage(String),
    /// Writes `partial` to the log and then hangs past the timeout.
    Hang { partial: String },
    /// The simulator cannot be launched.
    Unlaunchable,
    /// The simulator starts and writes `partial`, then waiting on it fails.
    WaitFails { partial: String },
}

/// Scripted stand-in for the simulator and its compile tools.
pub struct FakeRunner {
    seeds: HashMap<u32, SeedBehavior>,
    compile_exit: i32,
    merge_exit: i32,
    report_exit: i32,
    report_text: Option<String>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            seeds: HashMap::new(),
            compile_exit: 0,
            merge_exit: 0,
            report_exit: 0,
            report_text: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn seed(mut self, seed: u32, behavior: SeedBehavior) -> Self {
        self.seeds.insert(seed, behavior);
        self
    }

    pub fn compile_exit(mut self, code: i32) -> Self {
        self.compile_exit = code;
        self
    }

    pub fn merge_exit(mut self, code: i32) -> Self {
        self.merge_exit = code;
        self
    }

    pub fn report_exit(mut self, code: i32) -> Self {
        self.report_exit = code;
        self
    }

    /// Text the report step writes to the text report path.
    pub fn report(mut self, text: &str) -> Self {
        self.report_text = Some(text.to_string());
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls whose control script contains `needle`.
    pub fn script_calls(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter_map(|c| c.args.last())
            .filter(|a| a.ends_with(".do"))
            .filter(|a| fs::read_to_string(a).map(|s| s.contains(needle)).unwrap_or(false))
            .count()
    }
}

fn append(log: &Path, text: &str) {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

/// Token following `flag` on the first line that contains `marker`.
fn arg_after(script: &str, marker: &str, flag: &str) -> Option<String> {
    let line = script.lines().find(|l| l.contains(marker))?;
    let mut tokens = line.split_whitespace();
    tokens.find(|t| *t == flag)?;
    tokens.next().map(|t| t.trim_end_matches(';').to_string())
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        log: &Path,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutcome, ProcessError> {
        self.calls.lock().unwrap().push(command.clone());

        let script_path = command.args.last().filter(|a| a.ends_with(".do"));
        let Some(script_path) = script_path else {
            append(log, &format!("{} done\n", command.program));
            return Ok(ProcessOutcome::Exited {
                code: Some(self.compile_exit),
            });
        };
        let script = fs::read_to_string(script_path).unwrap();

        if script.contains("acdb merge") {
            append(log, "merging\n");
            if self.merge_exit == 0 {
                let merged = arg_after(&script, "acdb merge", "-o").unwrap();
                fs::write(merged, b"merged").unwrap();
            }
            return Ok(ProcessOutcome::Exited {
                code: Some(self.merge_exit),
            });
        }

        if script.contains("acdb report") {
            append(log, "reporting\n");
            if let Some(text) = &self.report_text {
                let report = arg_after(&script, "-txt", "-o").unwrap();
                fs::write(report, text).unwrap();
            }
            return Ok(ProcessOutcome::Exited {
                code: Some(self.report_exit),
            });
        }

        let seed: u32 = arg_after(&script, "-sv_seed", "-sv_seed")
            .unwrap()
            .parse()
            .unwrap();
        let coverage = PathBuf::from(arg_after(&script, "acdb save", "-db").unwrap());

        match self.seeds.get(&seed).cloned() {
            Some(SeedBehavior::Log(text)) => {
                append(log, &text);
                Ok(ProcessOutcome::Exited { code: Some(0) })
            }
            Some(SeedBehavior::LogWithCoverage(text)) => {
                append(log, &text);
                fs::write(&coverage, b"acdb").unwrap();
                Ok(ProcessOutcome::Exited { code: Some(0) })
            }
            Some(SeedBehavior::Hang { partial }) => {
                assert!(timeout.is_some(), "seed runs must be bounded");
                append(log, &partial);
                Ok(ProcessOutcome::TimedOut)
            }
            Some(SeedBehavior::Unlaunchable) => Err(ProcessError::Spawn {
                program: command.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
            Some(SeedBehavior::WaitFails { partial }) => {
                append(log, &partial);
                Err(ProcessError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "wait failed",
                )))
            }
            None => {
                append(log, "no scripted behaviour\n");
                Ok(ProcessOutcome::Exited { code: Some(0) })
            }
        }
    }
}

/// Default config rooted at `dir`.
pub fn config_in(dir: &Path) -> RegressionConfig {
    RegressionConfig {
        results_dir: dir.join("regression_results"),
        ..Default::default()
    }
}
