//! End-to-end regression flow against a scripted simulator.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{config_in, FakeRunner, SeedBehavior};
use seedsweep_core::classifier::RunStatus;
use seedsweep_core::coverage::CoverageOutcome;
use seedsweep_core::regression::{RegressError, Regression};
use seedsweep_core::summary::RegressionSummary;

const TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::test]
async fn three_seed_mixed_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        FakeRunner::new()
            .seed(1, SeedBehavior::Log("# 10 passed, 0 failed\n".into()))
            .seed(
                2,
                SeedBehavior::Hang {
                    partial: "# 99 passed, 0 failed\n".into(),
                },
            )
            .seed(
                3,
                SeedBehavior::Log("UVM_ERROR : 2\n# 8 passed, 2 failed\n".into()),
            ),
    );
    let regression = Regression::new(config_in(dir.path()), runner.clone());
    regression.prepare(false).unwrap();
    regression.compile().await.unwrap();

    let mut progress = Vec::new();
    let results = regression
        .run_all(&[1, 2, 3], TIMEOUT, |i, n, r| progress.push((i, n, r.seed, r.status)))
        .await;

    assert_eq!(
        progress,
        vec![
            (1, 3, 1, RunStatus::Pass),
            (2, 3, 2, RunStatus::Timeout),
            (3, 3, 3, RunStatus::Fail),
        ]
    );

    // Text captured before the kill is not parsed.
    assert_eq!(results[1].pass_count, 0);

    let coverage = regression.merge_coverage(&results).await;
    assert_eq!(coverage, CoverageOutcome::Skipped);

    let summary = RegressionSummary::from_results(&results, coverage.percent(), Duration::ZERO);
    assert_eq!(summary.passed(), 1);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.timed_out(), 1);
    assert_eq!(summary.total_checks, 18);
    assert_eq!(summary.total_failures, 2);
    assert_eq!(summary.coverage, None);
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn seeds_run_in_given_order_with_layout_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::new());
    let regression = Regression::new(config_in(dir.path()), runner.clone());
    regression.prepare(false).unwrap();

    let results = regression.run_all(&[42, 7, 42], TIMEOUT, |_, _, _| {}).await;
    let seeds: Vec<u32> = results.iter().map(|r| r.seed).collect();
    assert_eq!(seeds, vec![42, 7, 42]);

    let root = dir.path().join("regression_results");
    assert!(root.join("seed_42/run_42.do").exists());
    assert!(root.join("seed_42/sim_42.log").exists());
    assert!(root.join("seed_7/run_7.do").exists());

    // A repeated seed starts from a fresh log.
    let log = std::fs::read_to_string(root.join("seed_42/sim_42.log")).unwrap();
    assert_eq!(log, "no scripted behaviour\n");
    assert_eq!(results[0].status, RunStatus::Unknown);
}

#[tokio::test]
async fn compile_failure_stops_before_any_seed() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::new().compile_exit(2));
    let regression = Regression::new(config_in(dir.path()), runner.clone());
    regression.prepare(false).unwrap();

    let err = regression.compile().await.unwrap_err();
    let RegressError::CompileFailed { log } = &err else {
        panic!("expected CompileFailed, got {err:?}");
    };
    assert!(log.ends_with("compile.log"));

    // Only the first compile step ran.
    assert_eq!(runner.calls().len(), 1);
    let text = std::fs::read_to_string(log).unwrap();
    assert!(text.contains("--- vlib work ---"));
    assert!(!text.contains("vlog"));

    let seed_dirs = std::fs::read_dir(dir.path().join("regression_results"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("seed_"))
        .count();
    assert_eq!(seed_dirs, 0);
}

#[tokio::test]
async fn compile_runs_every_step_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::new());
    let regression = Regression::new(config_in(dir.path()), runner.clone());
    regression.prepare(false).unwrap();
    regression.compile().await.unwrap();

    let programs: Vec<String> = runner.calls().into_iter().map(|c| c.program).collect();
    assert_eq!(programs, vec!["vlib", "vlog"]);
}

#[tokio::test]
async fn unlaunchable_simulator_is_no_log() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::new().seed(5, SeedBehavior::Unlaunchable));
    let regression = Regression::new(config_in(dir.path()), runner);
    regression.prepare(false).unwrap();

    let result = regression.run_seed(5, TIMEOUT).await;
    assert_eq!(result.status, RunStatus::NoLog);
    assert!(!result.log_path.exists());

    let summary = RegressionSummary::from_results(&[result], None, Duration::ZERO);
    assert_eq!(summary.unresolved(), 1);
    assert!(summary.succeeded());
}

#[tokio::test]
async fn coverage_merged_and_percentage_read() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        FakeRunner::new()
            .seed(1, SeedBehavior::LogWithCoverage("# 3 passed, 0 failed\n".into()))
            .seed(2, SeedBehavior::Log("# 4 passed, 0 failed\n".into()))
            .seed(3, SeedBehavior::LogWithCoverage("# 5 passed, 0 failed\n".into()))
            .report("Coverage Report\n    CUMULATIVE DESIGN COVERAGE: 87.50%\n"),
    );
    let regression = Regression::new(config_in(dir.path()), runner.clone());
    regression.prepare(false).unwrap();

    let results = regression.run_all(&[1, 2, 3], TIMEOUT, |_, _, _| {}).await;
    assert!(results[0].coverage_path.is_some());
    assert!(results[1].coverage_path.is_none());

    let outcome = regression.merge_coverage(&results).await;
    let CoverageOutcome::Merged { inputs, percent, .. } = &outcome else {
        panic!("expected Merged, got {outcome:?}");
    };
    assert_eq!(*inputs, 2);
    assert_eq!(*percent, Some(87.5));
    assert_eq!(runner.script_calls("acdb merge"), 1);
    assert_eq!(runner.script_calls("acdb report"), 1);

    let root = dir.path().join("regression_results");
    let merge_log = std::fs::read_to_string(root.join("merge.log")).unwrap();
    assert!(merge_log.contains("merging"));
    assert!(merge_log.contains("reporting"));
}

#[tokio::test]
async fn report_without_total_line_is_absent_coverage() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        FakeRunner::new()
            .seed(1, SeedBehavior::LogWithCoverage("# 3 passed, 0 failed\n".into()))
            .report("Statement coverage 50%\n"),
    );
    let regression = Regression::new(config_in(dir.path()), runner);
    regression.prepare(false).unwrap();

    let results = regression.run_all(&[1], TIMEOUT, |_, _, _| {}).await;
    let outcome = regression.merge_coverage(&results).await;
    assert!(matches!(outcome, CoverageOutcome::Merged { percent: None, .. }));
}

#[tokio::test]
async fn merge_failure_does_not_change_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        FakeRunner::new()
            .seed(1, SeedBehavior::LogWithCoverage("# 3 passed, 0 failed\n".into()))
            .merge_exit(1)
            .report("TOTAL COVERAGE: 99.00%\n"),
    );
    let regression = Regression::new(config_in(dir.path()), runner.clone());
    regression.prepare(false).unwrap();

    let results = regression.run_all(&[1], TIMEOUT, |_, _, _| {}).await;
    let outcome = regression.merge_coverage(&results).await;
    assert!(matches!(outcome, CoverageOutcome::Failed { .. }));
    assert_eq!(outcome.percent(), None);
    // Report is not attempted after a failed merge.
    assert_eq!(runner.script_calls("acdb report"), 0);

    let summary = RegressionSummary::from_results(&results, outcome.percent(), Duration::ZERO);
    assert!(summary.succeeded());
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn timed_out_run_contributes_no_coverage() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::new().seed(
        9,
        SeedBehavior::Hang {
            partial: "UVM_FATAL : 1\n".into(),
        },
    ));
    let regression = Regression::new(config_in(dir.path()), runner);
    regression.prepare(false).unwrap();

    // A stale database from an earlier run must not be picked up.
    let cov = dir.path().join("regression_results/seed_9/cov_9.acdb");
    std::fs::create_dir_all(cov.parent().unwrap()).unwrap();
    std::fs::write(&cov, b"old").unwrap();

    let result = regression.run_seed(9, TIMEOUT).await;
    assert_eq!(result.status, RunStatus::Timeout);
    assert_eq!(result.fatal_count, 0);
    assert_eq!(result.coverage_path, None);
}

#[tokio::test]
async fn stale_coverage_from_earlier_run_is_not_merged() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        FakeRunner::new()
            .seed(9, SeedBehavior::Log("# 3 passed, 0 failed\n".into()))
            .report("TOTAL COVERAGE: 99.00%\n"),
    );
    let regression = Regression::new(config_in(dir.path()), runner.clone());
    regression.prepare(false).unwrap();

    let cov = dir.path().join("regression_results/seed_9/cov_9.acdb");
    std::fs::create_dir_all(cov.parent().unwrap()).unwrap();
    std::fs::write(&cov, b"old").unwrap();

    let results = regression.run_all(&[9], TIMEOUT, |_, _, _| {}).await;
    assert_eq!(results[0].status, RunStatus::Pass);
    assert_eq!(results[0].coverage_path, None);
    assert!(!cov.exists());

    let outcome = regression.merge_coverage(&results).await;
    assert_eq!(outcome, CoverageOutcome::Skipped);
    assert_eq!(runner.script_calls("acdb merge"), 0);
}

#[tokio::test]
async fn one_seed_failing_to_run_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        FakeRunner::new()
            .seed(1, SeedBehavior::Log("# 10 passed, 0 failed\n".into()))
            .seed(
                2,
                SeedBehavior::WaitFails {
                    partial: "UVM_INFO starting\n".into(),
                },
            )
            .seed(3, SeedBehavior::Log("# 4 passed, 0 failed\n".into())),
    );
    let regression = Regression::new(config_in(dir.path()), runner);
    regression.prepare(false).unwrap();

    let mut seen = Vec::new();
    let results = regression
        .run_all(&[1, 2, 3], TIMEOUT, |i, _, r| seen.push((i, r.status)))
        .await;

    assert_eq!(
        seen,
        vec![
            (1, RunStatus::Pass),
            (2, RunStatus::NoLog),
            (3, RunStatus::Pass),
        ]
    );
    assert!(!results[1].log_path.exists());

    let summary = RegressionSummary::from_results(&results, None, Duration::ZERO);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.unresolved(), 1);
    assert_eq!(summary.total_checks, 14);
    assert!(summary.succeeded());
}

#[tokio::test]
async fn report_failure_is_absent_coverage() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        FakeRunner::new()
            .seed(1, SeedBehavior::LogWithCoverage("# 3 passed, 0 failed\n".into()))
            .report("TOTAL COVERAGE: 99.00%\n")
            .report_exit(2),
    );
    let regression = Regression::new(config_in(dir.path()), runner.clone());
    regression.prepare(false).unwrap();

    let results = regression.run_all(&[1], TIMEOUT, |_, _, _| {}).await;
    let outcome = regression.merge_coverage(&results).await;

    // The report was written, but the step's exit status decides.
    assert!(matches!(outcome, CoverageOutcome::Failed { .. }));
    assert_eq!(outcome.percent(), None);
    assert_eq!(runner.script_calls("acdb report"), 1);
}

#[tokio::test]
async fn repeated_seed_is_merged_once() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        FakeRunner::new()
            .seed(4, SeedBehavior::LogWithCoverage("# 3 passed, 0 failed\n".into()))
            .report("TOTAL COVERAGE: 70.00%\n"),
    );
    let regression = Regression::new(config_in(dir.path()), runner);
    regression.prepare(false).unwrap();

    let results = regression.run_all(&[4, 4], TIMEOUT, |_, _, _| {}).await;
    assert_eq!(results.len(), 2);

    let outcome = regression.merge_coverage(&results).await;
    assert!(matches!(outcome, CoverageOutcome::Merged { inputs: 1, .. }));

    let merge_do =
        std::fs::read_to_string(dir.path().join("regression_results/merge.do")).unwrap();
    assert_eq!(merge_do.matches(" -i ").count(), 1);
}
