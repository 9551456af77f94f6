// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Step;
use crate::{
    errors::ExecutionError,
    helpers::display_exited_with,
    reporter::{TestReportingCallback, TestStatusMessage},
    rule::ExecutionContext,
    stopwatch::stopwatch,
    target::BuildTarget,
    test_results::{ResultType, TestCaseSummary, TestResultSummary},
};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use futures::future::BoxFuture;
use std::{collections::BTreeMap, io, process::Stdio, sync::Arc, time::Duration};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{debug, warn};

/// The prefix of lines a streaming test process prints to report progress.
pub const PROTOCOL_PREFIX: &str = "##testrun ";

/// Runs a test process and records its results in a JSON result file.
///
/// If the process streams, lines on its standard output starting with [`PROTOCOL_PREFIX`] are
/// parsed and forwarded to the reporting callback as they arrive:
///
/// ```text
/// ##testrun status-begin <message>
/// ##testrun status-end <message>
/// ##testrun test-begin <test case> <test name>
/// ##testrun test-end <test case> <test name> <pass|fail|skip|disabled> <millis> [message]
/// ```
///
/// Otherwise, or if the process reported no tests, the whole process is recorded as a single test
/// named after the target, which passes if the process exits successfully.
///
/// A failing test process doesn't fail the step: failures are recorded in the result file.
#[derive(Debug)]
pub struct TestCommandStep {
    target: BuildTarget,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    results_path: Utf8PathBuf,
    streaming: bool,
    callback: DebugIgnore<Arc<dyn TestReportingCallback>>,
}

impl TestCommandStep {
    /// Creates a new `TestCommandStep` that writes results for `target` to `results_path`.
    pub fn new(
        target: BuildTarget,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
        results_path: impl Into<Utf8PathBuf>,
        callback: Arc<dyn TestReportingCallback>,
    ) -> Self {
        Self {
            target,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            results_path: results_path.into(),
            streaming: false,
            callback: DebugIgnore(callback),
        }
    }

    /// Sets environment variables for the test process.
    pub fn envs(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    /// Sets whether the test process streams protocol lines.
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Returns the path results are written to.
    pub fn results_path(&self) -> &Utf8Path {
        &self.results_path
    }

    fn command_line(&self) -> String {
        shell_words::join(
            std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str)),
        )
    }

    fn io_error(&self, error: io::Error) -> ExecutionError {
        ExecutionError::Io {
            step: self.short_name().to_owned(),
            error,
        }
    }

    async fn run(&self, cx: &ExecutionContext) -> Result<(), ExecutionError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .current_dir(&cx.workspace_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let watch = stopwatch();
        let mut child = cmd.spawn().map_err(|error| ExecutionError::Spawn {
            step: self.short_name().to_owned(),
            command: self.command_line(),
            error,
        })?;
        let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(self.io_error(io::Error::other("child output was not captured")));
        };

        if self.streaming {
            self.callback.tests_did_begin();
        }

        let mut collector = StreamCollector::default();
        let read_stdout = async {
            // Test output isn't necessarily UTF-8, so split on raw newlines and decode lossily.
            let mut segments = BufReader::new(stdout).split(b'\n');
            while let Some(mut segment) = segments.next_segment().await? {
                if segment.last() == Some(&b'\r') {
                    segment.pop();
                }
                self.handle_line(String::from_utf8_lossy(&segment).into_owned(), &mut collector);
            }
            Ok::<_, io::Error>(())
        };
        let mut stderr_bytes = Vec::new();
        let read_stderr = stderr.read_to_end(&mut stderr_bytes);

        let (stdout_res, stderr_res, status) = tokio::join!(read_stdout, read_stderr, child.wait());
        stdout_res.map_err(|error| self.io_error(error))?;
        stderr_res.map_err(|error| self.io_error(error))?;
        let status = status.map_err(|error| self.io_error(error))?;
        let elapsed = watch.elapsed();
        let stderr_buf = String::from_utf8_lossy(&stderr_bytes).into_owned();
        debug!(target = %self.target, %status, "test process exited");

        let mut test_cases = collector.test_cases;
        let reported_failure = test_cases.iter().any(|case| !case.is_success());
        if test_cases.is_empty() || (!status.success() && !reported_failure) {
            let mut result = TestResultSummary::new(
                self.target.as_str(),
                self.target.as_str(),
                if status.success() {
                    ResultType::Success
                } else {
                    ResultType::Failure
                },
                elapsed,
            );
            if !status.success() {
                result.message = Some(format!("test process {}", display_exited_with(status)));
            }
            if self.streaming {
                self.callback
                    .test_did_begin(&result.test_case_name, &result.test_name);
                self.callback.test_did_end(&result);
            }
            push_result(&mut test_cases, result);
        }

        if let Some(first) = test_cases.first_mut().and_then(|case| case.results.first_mut()) {
            first.stdout = Some(collector.stdout).filter(|s| !s.is_empty());
            first.stderr = Some(stderr_buf).filter(|s| !s.is_empty());
        }

        if self.streaming {
            self.callback.tests_did_end(&test_cases);
        }

        let json = serde_json::to_vec_pretty(&test_cases).map_err(io::Error::from);
        let path = cx.workspace_root.join(&self.results_path);
        tokio::fs::write(&path, json.map_err(|error| self.io_error(error))?)
            .await
            .map_err(|error| self.io_error(error))
    }

    fn handle_line(&self, line: String, collector: &mut StreamCollector) {
        if !self.streaming {
            collector.push_output(&line);
            return;
        }

        match parse_protocol_line(&line) {
            None => collector.push_output(&line),
            Some(Ok(ProtocolLine::StatusBegin(message))) => {
                self.callback
                    .status_did_begin(TestStatusMessage::new(message));
            }
            Some(Ok(ProtocolLine::StatusEnd(message))) => {
                self.callback.status_did_end(TestStatusMessage::new(message));
            }
            Some(Ok(ProtocolLine::TestBegin {
                test_case_name,
                test_name,
            })) => {
                self.callback.test_did_begin(&test_case_name, &test_name);
            }
            Some(Ok(ProtocolLine::TestEnd(summary))) => {
                self.callback.test_did_end(&summary);
                push_result(&mut collector.test_cases, summary);
            }
            Some(Err(reason)) => {
                warn!(target = %self.target, "ignoring malformed protocol line `{line}`: {reason}");
                collector.push_output(&line);
            }
        }
    }
}

impl Step for TestCommandStep {
    fn short_name(&self) -> &str {
        "test"
    }

    fn description(&self, _cx: &ExecutionContext) -> String {
        self.command_line()
    }

    fn execute<'a>(&'a self, cx: &'a ExecutionContext) -> BoxFuture<'a, Result<(), ExecutionError>> {
        Box::pin(self.run(cx))
    }
}

#[derive(Debug, Default)]
struct StreamCollector {
    test_cases: Vec<TestCaseSummary>,
    stdout: String,
}

impl StreamCollector {
    fn push_output(&mut self, line: &str) {
        self.stdout.push_str(line);
        self.stdout.push('\n');
    }
}

fn push_result(test_cases: &mut Vec<TestCaseSummary>, result: TestResultSummary) {
    match test_cases
        .iter_mut()
        .find(|case| case.test_case_name == result.test_case_name)
    {
        Some(case) => case.results.push(result),
        None => test_cases.push(TestCaseSummary::new(
            result.test_case_name.clone(),
            vec![result],
        )),
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum ProtocolLine {
    StatusBegin(String),
    StatusEnd(String),
    TestBegin {
        test_case_name: String,
        test_name: String,
    },
    TestEnd(TestResultSummary),
}

/// Returns `None` if `line` isn't a protocol line, and an error describing the problem if it's a
/// malformed one.
fn parse_protocol_line(line: &str) -> Option<Result<ProtocolLine, String>> {
    let rest = line.strip_prefix(PROTOCOL_PREFIX)?;
    let Some(([command], rest)) = split_fields(rest) else {
        return Some(Err("missing command".to_owned()));
    };
    Some(match command {
        "status-begin" => Ok(ProtocolLine::StatusBegin(rest.to_owned())),
        "status-end" => Ok(ProtocolLine::StatusEnd(rest.to_owned())),
        "test-begin" => match split_fields(rest) {
            Some(([test_case_name, test_name], "")) => Ok(ProtocolLine::TestBegin {
                test_case_name: test_case_name.to_owned(),
                test_name: test_name.to_owned(),
            }),
            _ => Err("expected `test-begin <test case> <test name>`".to_owned()),
        },
        "test-end" => parse_test_end(rest).map(ProtocolLine::TestEnd),
        other => Err(format!("unknown command `{other}`")),
    })
}

/// Splits the first `N` whitespace-separated fields off `s`, returning them along with the
/// remainder with leading and trailing whitespace removed.
fn split_fields<const N: usize>(s: &str) -> Option<([&str; N], &str)> {
    let mut fields = [""; N];
    let mut rest = s;
    for field in &mut fields {
        let trimmed = rest.trim_start();
        let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        if end == 0 {
            return None;
        }
        *field = &trimmed[..end];
        rest = &trimmed[end..];
    }
    Some((fields, rest.trim()))
}

fn parse_test_end(rest: &str) -> Result<TestResultSummary, String> {
    let Some(([test_case_name, test_name, result, millis], message)) = split_fields(rest) else {
        return Err(
            "expected `test-end <test case> <test name> <result> <millis> [message]`".to_owned(),
        );
    };

    let result_type = match result {
        "pass" => ResultType::Success,
        "fail" => ResultType::Failure,
        "skip" => ResultType::AssumptionViolation,
        "disabled" => ResultType::Disabled,
        other => return Err(format!("unknown result `{other}`")),
    };
    let millis: u64 = millis
        .parse()
        .map_err(|error| format!("invalid time `{millis}`: {error}"))?;

    let mut summary = TestResultSummary::new(
        test_case_name,
        test_name,
        result_type,
        Duration::from_millis(millis),
    );
    summary.message = Some(message)
        .filter(|message| !message.is_empty())
        .map(str::to_owned);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{EventBus, StatusEventCorrelator, TestEventKind};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("plain output" ; "not a protocol line")]
    #[test_case("##testrunner test-begin A b" ; "prefix must be followed by a space")]
    fn non_protocol_lines(line: &str) {
        assert_eq!(parse_protocol_line(line), None);
    }

    #[test]
    fn parse_valid_lines() {
        assert_eq!(
            parse_protocol_line("##testrun status-begin starting emulator"),
            Some(Ok(ProtocolLine::StatusBegin("starting emulator".to_owned())))
        );
        assert_eq!(
            parse_protocol_line("##testrun test-begin Suite works"),
            Some(Ok(ProtocolLine::TestBegin {
                test_case_name: "Suite".to_owned(),
                test_name: "works".to_owned(),
            }))
        );

        let Some(Ok(ProtocolLine::TestEnd(summary))) =
            parse_protocol_line("##testrun test-end Suite breaks fail 12 expected 1, got 2")
        else {
            panic!("test-end line parses");
        };
        assert_eq!(summary.result_type, ResultType::Failure);
        assert_eq!(summary.time, Duration::from_millis(12));
        assert_eq!(summary.message.as_deref(), Some("expected 1, got 2"));
    }

    #[test]
    fn repeated_separators_are_tolerated() {
        assert_eq!(
            parse_protocol_line("##testrun test-begin Suite  a"),
            Some(Ok(ProtocolLine::TestBegin {
                test_case_name: "Suite".to_owned(),
                test_name: "a".to_owned(),
            }))
        );

        let Some(Ok(ProtocolLine::TestEnd(summary))) =
            parse_protocol_line("##testrun test-end Suite  a\tfail  1   boom")
        else {
            panic!("test-end line parses");
        };
        assert_eq!(summary.test_case_name, "Suite");
        assert_eq!(summary.test_name, "a");
        assert_eq!(summary.result_type, ResultType::Failure);
        assert_eq!(summary.time, Duration::from_millis(1));
        assert_eq!(summary.message.as_deref(), Some("boom"));
    }

    #[test_case("##testrun test-begin Suite" ; "test-begin missing name")]
    #[test_case("##testrun test-begin Suite a extra" ; "test-begin extra field")]
    #[test_case("##testrun " ; "missing command")]
    #[test_case("##testrun test-end Suite a pass" ; "test-end missing time")]
    #[test_case("##testrun test-end Suite a maybe 1" ; "unknown result")]
    #[test_case("##testrun test-end Suite a pass soon" ; "invalid time")]
    #[test_case("##testrun explode" ; "unknown command")]
    fn malformed_lines(line: &str) {
        assert!(matches!(parse_protocol_line(line), Some(Err(_))));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::reporter::EventReceiver;
        use pretty_assertions::assert_eq;
        use camino_tempfile::Utf8TempDir;

        fn setup(streaming: bool, script: &str) -> (Utf8TempDir, TestCommandStep, EventReceiver) {
            let dir = camino_tempfile::tempdir().expect("tempdir created");
            let target = BuildTarget::new("//foo:test");
            let (bus, receiver) = EventBus::new();
            let callback = Arc::new(StatusEventCorrelator::new(target.clone(), bus));
            let step = TestCommandStep::new(target, "sh", ["-c", script], "results.json", callback)
                .streaming(streaming);
            (dir, step, receiver)
        }

        async fn run(dir: &Utf8TempDir, step: &TestCommandStep) -> Vec<TestCaseSummary> {
            let cx = ExecutionContext::new(dir.path());
            step.execute(&cx).await.expect("step succeeds");
            let contents = std::fs::read(dir.path().join("results.json")).expect("results written");
            serde_json::from_slice(&contents).expect("results parse")
        }

        #[tokio::test]
        async fn non_streaming_exit_status() {
            let (dir, step, _receiver) = setup(false, "echo hello; echo oops >&2; exit 3");
            let cases = run(&dir, &step).await;

            assert_eq!(cases.len(), 1);
            let result = &cases[0].results[0];
            assert_eq!(result.test_case_name, "//foo:test");
            assert_eq!(result.test_name, "//foo:test");
            assert_eq!(result.result_type, ResultType::Failure);
            assert_eq!(
                result.message.as_deref(),
                Some("test process exited with exit code 3")
            );
            assert_eq!(result.stdout.as_deref(), Some("hello\n"));
            assert_eq!(result.stderr.as_deref(), Some("oops\n"));
        }

        #[tokio::test]
        async fn streaming_reports_events() {
            let script = "\
                echo '##testrun status-begin warming up'; \
                echo '##testrun status-end warmed up'; \
                echo '##testrun test-begin Suite a'; \
                echo '##testrun test-end Suite a pass 3'; \
                echo '##testrun test-begin Suite b'; \
                echo 'noise'; \
                echo '##testrun test-end Suite b fail 4 boom'; \
                exit 1";
            let (dir, step, mut receiver) = setup(true, script);
            let cases = run(&dir, &step).await;

            assert_eq!(cases.len(), 1);
            let names: Vec<_> = cases[0]
                .results
                .iter()
                .map(|result| (result.test_name.as_str(), result.result_type))
                .collect();
            assert_eq!(
                names,
                vec![("a", ResultType::Success), ("b", ResultType::Failure)]
            );
            assert_eq!(cases[0].results[0].stdout.as_deref(), Some("noise\n"));

            let kinds: Vec<_> = receiver
                .drain()
                .into_iter()
                .map(|event| match event.kind {
                    TestEventKind::StatusMessageStarted { .. } => "status-started",
                    TestEventKind::StatusMessageFinished { .. } => "status-finished",
                    TestEventKind::TestCaseStarted { .. } => "test-started",
                    TestEventKind::TestCaseFinished { .. } => "test-finished",
                    other => panic!("unexpected event {other:?}"),
                })
                .collect();
            assert_eq!(
                kinds,
                vec![
                    "status-started",
                    "status-finished",
                    "test-started",
                    "test-finished",
                    "test-started",
                    "test-finished",
                ]
            );
        }

        #[tokio::test]
        async fn non_utf8_output_is_decoded_lossily() {
            let (dir, step, _receiver) =
                setup(false, r"printf 'ok\377\376\n'; printf 'err\377' >&2; exit 0");
            let cases = run(&dir, &step).await;

            let result = &cases[0].results[0];
            assert_eq!(result.result_type, ResultType::Success);
            assert_eq!(result.stdout.as_deref(), Some("ok\u{FFFD}\u{FFFD}\n"));
            assert_eq!(result.stderr.as_deref(), Some("err\u{FFFD}"));
        }

        #[tokio::test]
        async fn streaming_tolerates_repeated_separators() {
            let script = "\
                echo '##testrun test-begin Suite  a'; \
                echo '##testrun test-end Suite  a fail 1 boom'; \
                exit 1";
            let (dir, step, _receiver) = setup(true, script);
            let cases = run(&dir, &step).await;

            assert_eq!(cases.len(), 1);
            let result = &cases[0].results[0];
            assert_eq!(
                (result.test_case_name.as_str(), result.test_name.as_str()),
                ("Suite", "a")
            );
            assert_eq!(result.result_type, ResultType::Failure);
            assert_eq!(result.message.as_deref(), Some("boom"));
        }

        #[tokio::test]
        async fn streaming_crash_without_reported_failure() {
            let script = "\
                echo '##testrun test-begin Suite a'; \
                echo '##testrun test-end Suite a pass 3'; \
                exit 9";
            let (dir, step, _receiver) = setup(true, script);
            let cases = run(&dir, &step).await;

            assert_eq!(cases.len(), 2);
            assert!(cases[0].is_success());
            assert_eq!(cases[1].test_case_name, "//foo:test");
            assert_eq!(cases[1].results[0].result_type, ResultType::Failure);
        }

        #[tokio::test]
        async fn missing_program_is_a_spawn_error() {
            let dir = camino_tempfile::tempdir().expect("tempdir created");
            let step = TestCommandStep::new(
                BuildTarget::new("//foo:test"),
                "testrun-definitely-not-a-program",
                Vec::<String>::new(),
                "results.json",
                Arc::new(StatusEventCorrelator::new(
                    BuildTarget::new("//foo:test"),
                    EventBus::noop(),
                )),
            );
            let cx = ExecutionContext::new(dir.path());
            let error = step.execute(&cx).await.expect_err("spawn fails");
            assert!(matches!(error, ExecutionError::Spawn { .. }));
        }
    }
}
