// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end runs of manifest targets through real processes.

#![cfg(unix)]

use crate::fixtures::*;
use camino::Utf8Path;
use camino_tempfile::tempdir;
use color_eyre::eyre::{Result, ensure};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use testrun_metadata::TestRunExitCode;
use testrun_runner::{
    manifest::{ManifestBuildEngine, TestManifest},
    reporter::TestEventKind,
    rule::TestRule,
    test_results::ResultType,
};

const MANIFEST: &str = indoc! {r#"
    [[target]]
    name = "//app:streaming"
    command = "sh"
    args = ["-c", "echo run >> runs.log; echo '##testrun test-begin Suite a'; echo '##testrun test-end Suite a pass 2'"]
    streaming = true
    inputs = ["input.txt"]

    [[target]]
    name = "//app:failing"
    command = "sh"
    args = ["-c", "echo run >> runs.log; echo doomed; exit 2"]
    run-separately = true
    contacts = ["oncall@example.com"]
"#};

fn run_manifest(workspace_root: &Utf8Path) -> Result<RunOutput> {
    let manifest = TestManifest::parse(workspace_root.join("testrun.toml"), MANIFEST)?;
    let rules: Vec<Arc<dyn TestRule>> = manifest
        .rules(workspace_root, Utf8Path::new("target/testrun"))
        .into_iter()
        .map(|rule| rule as Arc<dyn TestRule>)
        .collect();
    let engine = ManifestBuildEngine::new(&manifest, workspace_root);
    Ok(RunSetup::new(workspace_root).run(rules, &engine))
}

fn run_count(workspace_root: &Utf8Path) -> Result<usize> {
    Ok(std::fs::read_to_string(workspace_root.join("runs.log"))?
        .lines()
        .count())
}

#[test]
fn manifest_run_then_cached_replay() -> Result<()> {
    test_init();
    let workspace = tempdir()?;
    std::fs::write(workspace.path().join("input.txt"), "v1")?;

    let output = run_manifest(workspace.path())?;
    let finished = output.res.as_ref().expect("first run finished");
    assert_eq!(finished.outcome.exit_code, TestRunExitCode::TEST_FAILURES);
    assert_eq!(run_count(workspace.path())?, 2);

    let [streaming, failing] = finished.results.as_slice() else {
        panic!("expected two results, got {:?}", finished.results);
    };
    assert_eq!(streaming.target.as_str(), "//app:streaming");
    assert_eq!(streaming.test_cases[0].results[0].test_name, "a");
    ensure!(streaming.is_success(), "streaming target passed");

    assert_eq!(failing.target.as_str(), "//app:failing");
    let result = &failing.test_cases[0].results[0];
    assert_eq!(result.result_type, ResultType::Failure);
    assert_eq!(
        result.message.as_deref(),
        Some("test process exited with exit code 2")
    );
    assert_eq!(result.stdout.as_deref(), Some("doomed\n"));
    ensure!(
        failing.contacts.contains("oncall@example.com"),
        "contacts come from the manifest"
    );

    let streamed_tests = output
        .kinds()
        .filter(|kind| matches!(kind, TestEventKind::TestCaseFinished { .. }))
        .count();
    assert_eq!(streamed_tests, 2, "one streamed and one synthesized");

    // Nothing changed, so both targets are replayed, failures included.
    let output = run_manifest(workspace.path())?;
    let finished = output.res.as_ref().expect("second run finished");
    assert_eq!(run_count(workspace.path())?, 2, "no process ran again");
    ensure!(
        finished.results.iter().all(|results| results.is_cached()),
        "every result was replayed"
    );
    assert_eq!(finished.outcome.exit_code, TestRunExitCode::TEST_FAILURES);

    // Changing an input invalidates only the target that declares it.
    std::fs::write(workspace.path().join("input.txt"), "v2")?;
    let output = run_manifest(workspace.path())?;
    let finished = output.res.as_ref().expect("third run finished");
    assert_eq!(run_count(workspace.path())?, 3);
    let cached: Vec<_> = finished
        .results
        .iter()
        .map(|results| (results.target.as_str(), results.is_cached()))
        .collect();
    assert_eq!(
        cached,
        vec![("//app:streaming", false), ("//app:failing", true)]
    );
    Ok(())
}

#[test]
fn selectors_bypass_the_cache() -> Result<()> {
    test_init();
    let workspace = tempdir()?;
    std::fs::write(workspace.path().join("input.txt"), "v1")?;

    run_manifest(workspace.path())?.res.expect("first run finished");
    assert_eq!(run_count(workspace.path())?, 2);

    let manifest = TestManifest::parse(workspace.path().join("testrun.toml"), MANIFEST)?;
    let rules: Vec<Arc<dyn TestRule>> = manifest
        .rules(workspace.path(), Utf8Path::new("target/testrun"))
        .into_iter()
        .map(|rule| rule as Arc<dyn TestRule>)
        .collect();
    let engine = ManifestBuildEngine::new(&manifest, workspace.path());
    let mut setup = RunSetup::new(workspace.path());
    setup.options.test_selectors = vec!["Suite#a".to_owned()];
    setup.options.run_all_tests = false;
    setup.run(rules, &engine).res.expect("second run finished");

    assert_eq!(run_count(workspace.path())?, 4, "every target ran again");
    Ok(())
}
