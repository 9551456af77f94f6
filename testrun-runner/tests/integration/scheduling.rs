// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::tempdir;
use color_eyre::eyre::{Result, ensure};
use pretty_assertions::assert_eq;
use std::time::Duration;
use testrun_metadata::TestRunExitCode;
use testrun_runner::{
    cache::RuleKeyFileHelper,
    config::TestThreads,
    coverage::{CoverageOptions, LibraryUnderTest},
    errors::TestRunnerExecuteError,
    reporter::TestEventKind,
    signal::{ManualInterrupt, ShutdownEvent, SignalHandlerKind},
    target::BuildTarget,
    test_results::ResultType,
};
use testrun_xml::{TestStatus, TestsReport};

#[test]
fn cached_parallel_and_fresh_serial() -> Result<()> {
    test_init();
    let workspace = tempdir()?;
    let store = workspace.path().join("store");
    let tracker = ConcurrencyTracker::default();

    let cached = FakeRule::new("//a:test", &store, &tracker).with_result_files();
    write_rule_key(&cached, "key-a");
    let fresh = FakeRule::new("//b:test", &store, &tracker).run_separately();
    let fresh_rule_key_path = RuleKeyFileHelper::rule_key_path(&fresh);

    let engine = FakeBuildEngine::default()
        .with_rule_key("//a:test", "key-a")
        .with_rule_key("//b:test", "key-b");
    let output = RunSetup::new(workspace.path()).run(into_rules(vec![cached, fresh]), &engine);
    let finished = output.res.as_ref().expect("run finished");

    assert_eq!(finished.outcome.exit_code, TestRunExitCode::OK);
    let targets: Vec<_> = finished.results.iter().map(|r| r.target.as_str()).collect();
    assert_eq!(targets, vec!["//a:test", "//b:test"]);
    ensure!(finished.results[0].is_cached(), "a's results are replayed");
    ensure!(!finished.results[1].is_cached(), "b's results are fresh");

    assert_eq!(
        tracker.executed(),
        vec![BuildTarget::new("//b:test")],
        "only b's steps ran"
    );
    assert_eq!(std::fs::read_to_string(fresh_rule_key_path)?, "key-b\n");

    let started: Vec<_> = output
        .kinds()
        .filter_map(|kind| match kind {
            TestEventKind::TargetStarted { target } => Some(target.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["//b:test"]);

    let cached_steps = output.kinds().find_map(|kind| match kind {
        TestEventKind::StepsStarted { target, step_count } if target.as_str() == "//a:test" => {
            Some(*step_count)
        }
        _ => None,
    });
    assert_eq!(cached_steps, Some(0));

    ensure!(
        matches!(output.kinds().last(), Some(TestEventKind::RunFinished { .. })),
        "RunFinished is the last event"
    );
    Ok(())
}

#[test]
fn execution_error_becomes_failing_result() -> Result<()> {
    test_init();
    let workspace = tempdir()?;
    let store = workspace.path().join("store");
    let tracker = ConcurrencyTracker::default();

    let rules = into_rules(vec![
        FakeRule::new("//a:test", &store, &tracker).behavior(FakeBehavior::FailStep),
        FakeRule::new("//b:test", &store, &tracker),
    ]);
    let output = RunSetup::new(workspace.path()).run(rules, &FakeBuildEngine::default());
    let finished = output.res.as_ref().expect("run finished");

    assert_eq!(finished.outcome.exit_code, TestRunExitCode::TEST_FAILURES);
    ensure!(finished.outcome.any_failure, "a failed");

    let failed = finished
        .results
        .iter()
        .find(|results| results.target.as_str() == "//a:test")
        .expect("a has results");
    assert_eq!(failed.test_count(), 1);
    let result = &failed.test_cases[0].results[0];
    assert_eq!(result.result_type, ResultType::Failure);
    assert_eq!(result.test_case_name, "//a:test");
    assert_eq!(result.test_name, "//a:test");
    assert_eq!(result.message.as_deref(), Some("step `fake`: I/O error"));
    ensure!(
        result
            .stack_trace
            .as_deref()
            .is_some_and(|trace| trace.contains("disk on fire")),
        "stack trace includes the cause"
    );
    Ok(())
}

#[test]
fn serial_runs_wait_for_parallel_group() -> Result<()> {
    test_init();
    let workspace = tempdir()?;
    let store = workspace.path().join("store");
    let tracker = ConcurrencyTracker::default();

    let mut rules = vec![
        FakeRule::new("//serial:first", &store, &tracker).run_separately(),
        FakeRule::new("//serial:second", &store, &tracker).run_separately(),
    ];
    for (i, millis) in [40, 10, 30].into_iter().enumerate() {
        rules.push(
            FakeRule::new(&format!("//parallel:t{i}"), &store, &tracker)
                .behavior(FakeBehavior::Pass(Duration::from_millis(millis))),
        );
    }

    let output = RunSetup::new(workspace.path()).run(into_rules(rules), &FakeBuildEngine::default());
    let finished = output.res.as_ref().expect("run finished");

    let first_serial_steps = output
        .position(|kind| {
            matches!(kind, TestEventKind::StepsStarted { target, .. }
                if target.as_str().starts_with("//serial:"))
        })
        .expect("serial steps started");
    let parallel_finished: Vec<_> = output
        .events
        .iter()
        .enumerate()
        .filter_map(|(i, event)| match &event.kind {
            TestEventKind::TargetFinished { results }
                if results.target.as_str().starts_with("//parallel:") =>
            {
                Some(i)
            }
            _ => None,
        })
        .collect();
    assert_eq!(parallel_finished.len(), 3);
    ensure!(
        parallel_finished.iter().all(|&i| i < first_serial_steps),
        "every parallel run finished before the first serial run started"
    );

    // Every run is scheduled up front, serial ones included, before any steps execute.
    let last_scheduled = output
        .events
        .iter()
        .rposition(|event| matches!(event.kind, TestEventKind::TargetStarted { .. }))
        .expect("targets were scheduled");
    let first_steps = output
        .position(|kind| matches!(kind, TestEventKind::StepsStarted { .. }))
        .expect("steps started");
    ensure!(
        last_scheduled < first_steps,
        "serial targets are scheduled before the parallel group runs"
    );

    // Serial results come last, in input order.
    let serial: Vec<_> = finished.results[3..]
        .iter()
        .map(|results| results.target.as_str())
        .collect();
    assert_eq!(serial, vec!["//serial:first", "//serial:second"]);
    Ok(())
}

#[test]
fn sequence_numbers_are_a_permutation() -> Result<()> {
    test_init();
    let workspace = tempdir()?;
    let store = workspace.path().join("store");
    let tracker = ConcurrencyTracker::default();

    let rules: Vec<_> = (0..8u64)
        .map(|i| {
            let rule = FakeRule::new(&format!("//pkg:t{i}"), &store, &tracker)
                .behavior(FakeBehavior::Pass(Duration::from_millis((i * 7) % 20)));
            if i % 4 == 0 { rule.run_separately() } else { rule }
        })
        .collect();

    let mut setup = RunSetup::new(workspace.path());
    setup.test_threads = TestThreads::Count(3);
    let output = setup.run(into_rules(rules), &FakeBuildEngine::default());
    let finished = output.res.as_ref().expect("run finished");

    let mut sequence_numbers: Vec<_> = finished
        .results
        .iter()
        .map(|results| results.sequence_number)
        .collect();
    sequence_numbers.sort_unstable();
    assert_eq!(sequence_numbers, (1..=8).collect::<Vec<u32>>());
    ensure!(
        finished
            .results
            .iter()
            .all(|results| results.total_number_of_tests == 8),
        "every result knows the total"
    );
    ensure!(
        tracker.max() <= 3,
        "at most 3 runs at once, saw {}",
        tracker.max()
    );
    Ok(())
}

#[test]
fn interrupt_cancels_run() -> Result<()> {
    test_init();
    let workspace = tempdir()?;
    let store = workspace.path().join("store");
    let tracker = ConcurrencyTracker::default();

    let rules = into_rules(vec![
        FakeRule::new("//a:test", &store, &tracker).behavior(FakeBehavior::Hang),
    ]);
    let interrupt = ManualInterrupt::new();
    // The interrupt is delivered as soon as the runner starts waiting.
    interrupt.interrupt();

    let mut setup = RunSetup::new(workspace.path());
    setup.signal_handler = SignalHandlerKind::Manual(interrupt);
    let output = setup.run(rules, &FakeBuildEngine::default());

    ensure!(
        matches!(
            output.res,
            Err(TestRunnerExecuteError::Interrupted(ShutdownEvent::Interrupt))
        ),
        "expected an interrupt, got {:?}",
        output.res
    );
    ensure!(
        output
            .position(|kind| matches!(kind, TestEventKind::RunFinished { .. }))
            .is_none(),
        "an interrupted run doesn't finish"
    );
    Ok(())
}

#[test]
fn parallel_phase_failure_skips_serial_group() -> Result<()> {
    test_init();
    let workspace = tempdir()?;
    let store = workspace.path().join("store");
    let tracker = ConcurrencyTracker::default();

    let rules = into_rules(vec![
        FakeRule::new("//a:test", &store, &tracker).behavior(FakeBehavior::BreakProtocol),
        FakeRule::new("//b:test", &store, &tracker).run_separately(),
    ]);
    let output = RunSetup::new(workspace.path()).run(rules, &FakeBuildEngine::default());

    ensure!(
        matches!(output.res, Err(TestRunnerExecuteError::ParallelPhase(_))),
        "expected a parallel phase error, got {:?}",
        output.res
    );
    assert_eq!(
        tracker.executed(),
        vec![BuildTarget::new("//a:test")],
        "serial run never started"
    );
    Ok(())
}

#[test]
fn empty_run_succeeds() -> Result<()> {
    test_init();
    let workspace = tempdir()?;

    let output = RunSetup::new(workspace.path()).run(Vec::new(), &FakeBuildEngine::default());
    let finished = output.res.as_ref().expect("run finished");
    ensure!(finished.results.is_empty(), "no results");
    assert_eq!(finished.outcome.exit_code, TestRunExitCode::OK);
    Ok(())
}

#[test]
fn writes_xml_report() -> Result<()> {
    test_init();
    let workspace = tempdir()?;
    let store = workspace.path().join("store");
    let tracker = ConcurrencyTracker::default();

    let rules = into_rules(vec![
        FakeRule::new("//a:test", &store, &tracker),
        FakeRule::new("//b:test", &store, &tracker).behavior(FakeBehavior::FailStep),
    ]);
    let mut setup = RunSetup::new(workspace.path());
    setup.options.xml_output_path = Some("results.xml".into());
    let output = setup.run(rules, &FakeBuildEngine::default());
    output.res.as_ref().expect("run finished");

    let xml = std::fs::read_to_string(workspace.path().join("results.xml"))?;
    let report = TestsReport::parse_str(&xml)?;
    let mut statuses: Vec<_> = report
        .tests
        .iter()
        .map(|test| (test.name.as_str(), test.status))
        .collect();
    statuses.sort_unstable_by_key(|(name, _)| *name);
    assert_eq!(
        statuses,
        vec![("//b:test", TestStatus::Fail), ("Suite", TestStatus::Pass)]
    );
    Ok(())
}

#[test]
fn missing_xml_directory_is_fatal() -> Result<()> {
    test_init();
    let workspace = tempdir()?;
    let store = workspace.path().join("store");
    let tracker = ConcurrencyTracker::default();

    let mut setup = RunSetup::new(workspace.path());
    setup.options.xml_output_path = Some("missing/dir/results.xml".into());
    let output = setup.run(
        into_rules(vec![FakeRule::new("//a:test", &store, &tracker)]),
        &FakeBuildEngine::default(),
    );

    ensure!(
        matches!(output.res, Err(TestRunnerExecuteError::FinishRun(_))),
        "expected an XML write error, got {:?}",
        output.res
    );
    Ok(())
}

#[cfg(unix)]
#[test]
fn coverage_report_failure_is_infrastructure_failure() -> Result<()> {
    test_init();
    let workspace = tempdir()?;
    let store = workspace.path().join("store");
    let tracker = ConcurrencyTracker::default();

    let rule = FakeRule::new("//a:test", &store, &tracker).with_library(LibraryUnderTest {
        target: BuildTarget::new("//a:lib"),
        sources: Vec::new(),
        classes_dir: Some("store/a/classes".into()),
    });

    let mut setup = RunSetup::new(workspace.path());
    setup.options.coverage = Some(CoverageOptions {
        output_dir: "coverage".into(),
        format: Default::default(),
        title: "Coverage".to_owned(),
        includes: Vec::new(),
        excludes: Vec::new(),
        // `false` ignores its arguments and exits with 1.
        launcher: vec!["false".to_owned()],
        generated_dir: "store".into(),
        package_finder: None,
    });
    let output = setup.run(into_rules(vec![rule]), &FakeBuildEngine::default());
    let finished = output.res.as_ref().expect("run finished");

    ensure!(!finished.outcome.any_failure, "tests passed");
    assert_eq!(
        finished.outcome.exit_code,
        TestRunExitCode::INFRASTRUCTURE_FAILURE
    );
    ensure!(
        workspace.path().join("coverage").is_dir(),
        "coverage directory was prepared"
    );
    Ok(())
}
