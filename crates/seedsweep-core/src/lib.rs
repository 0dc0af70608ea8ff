//! # seedsweep-core
//!
//! Core library for running multi-seed regressions against an external
//! hardware simulator.
//!
//! The simulator is a black box: this crate only relies on its exit code,
//! on literal markers in its captured text output, and on the existence of
//! the files it is told to write. Everything between those points is
//! delegated to the tool itself.
//!
//! ## Modules
//!
//! - [`config`] - Regression configuration (paths, simulator command line, compile steps)
//! - [`process`] - Subprocess runner trait with combined output capture and timeouts
//! - [`invoker`] - Compile step, per-seed control scripts and simulator launches
//! - [`classifier`] - Log scraping and per-seed status classification
//! - [`coverage`] - Coverage database merge and percentage extraction
//! - [`summary`] - Aggregate statistics, overall verdict and the summary table
//! - [`regression`] - Orchestration of compile, seeds, merge and summary
//!
//! ## External Dependencies
//!
//! A simulator that accepts a batch control script (by default `vsim -c -do <script>`)
//! and provides `acdb save/merge/report` sub-commands must be on `PATH`.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use seedsweep_core::config::RegressionConfig;
//! use seedsweep_core::process::SystemRunner;
//! use seedsweep_core::regression::Regression;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let regression = Regression::new(RegressionConfig::discover()?, Arc::new(SystemRunner));
//! regression.prepare(false)?;
//! regression.compile().await?;
//!
//! let results = regression
//!     .run_all(&[1, 2, 3], Duration::from_secs(300), |_, _, _| {})
//!     .await;
//! let coverage = regression.merge_coverage(&results).await;
//! println!("{} runs, coverage {:?}", results.len(), coverage);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod coverage;
pub mod invoker;
pub mod process;
pub mod regression;
pub mod summary;
