// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints out test events as a run progresses.

use super::{TestEvent, TestEventKind};
use crate::{
    helpers::{format_duration, plural},
    test_results::{ResultType, TestResultSummary, TestResults},
};
use owo_colors::{OwoColorize, Style};
use std::io::{self, Write};

/// Writes human-readable progress lines for [`TestEvent`]s.
///
/// By default, one line is written per finished target, plus details of any failing tests. In
/// verbose mode, every test and status message is also written.
#[derive(Debug, Default)]
pub struct TestDisplayer {
    verbose: bool,
    styles: Styles,
    passed: usize,
    failed: usize,
    cached: usize,
}

impl TestDisplayer {
    /// Creates a new displayer.
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Writes the lines for `event` to `writer`.
    pub fn write_event(&mut self, event: &TestEvent, writer: &mut dyn Write) -> io::Result<()> {
        match &event.kind {
            TestEventKind::RunStarted {
                targets,
                run_all_tests,
                test_selectors,
            } => {
                writeln!(writer, "{}", hbar(12))?;
                write!(writer, "{:>12} ", "Starting".style(self.styles.pass))?;
                write!(
                    writer,
                    "{} {}",
                    targets.len().style(self.styles.count),
                    plural::targets_str(targets.len()),
                )?;
                if !test_selectors.is_empty() {
                    write!(
                        writer,
                        " with {} {}",
                        test_selectors.len().style(self.styles.count),
                        if test_selectors.len() == 1 {
                            "selector"
                        } else {
                            "selectors"
                        },
                    )?;
                } else if !run_all_tests {
                    write!(writer, " (default tests only)")?;
                }
                writeln!(writer)?;
            }
            TestEventKind::TargetStarted { target } => {
                if self.verbose {
                    writeln!(writer, "{:>12} {target}", "SCHEDULED".style(self.styles.pass))?;
                }
            }
            TestEventKind::StepsStarted { .. } | TestEventKind::StepsFinished { .. } => {}
            TestEventKind::StatusMessageStarted { target, message } => {
                if self.verbose {
                    writeln!(
                        writer,
                        "{:>12} {target}: {}",
                        "STATUS".style(self.styles.skip),
                        message.message,
                    )?;
                }
            }
            TestEventKind::StatusMessageFinished {
                target,
                finished,
                elapsed,
                ..
            } => {
                if self.verbose {
                    writeln!(
                        writer,
                        "{:>12} [{}] {target}: {}",
                        "STATUS".style(self.styles.skip),
                        format_duration(*elapsed),
                        finished.message,
                    )?;
                }
            }
            TestEventKind::TestCaseStarted { .. } => {}
            TestEventKind::TestCaseFinished {
                target, summary, ..
            } => {
                if self.verbose {
                    self.write_test_line(&target.to_string(), summary, writer)?;
                }
            }
            TestEventKind::TargetFinished { results } => {
                self.write_target_finished(results, writer)?;
            }
            TestEventKind::RunFinished { results, outcome } => {
                let summary_style = if outcome.any_failure {
                    self.styles.fail
                } else {
                    self.styles.pass
                };
                write!(
                    writer,
                    "{}\n{:>12} ",
                    hbar(12),
                    "Summary".style(summary_style)
                )?;
                write!(writer, "[{}] ", format_duration(event.elapsed))?;

                let total = results.len();
                write!(
                    writer,
                    "{} {} run: {} {}",
                    total.style(self.styles.count),
                    plural::targets_str(total),
                    self.passed.style(self.styles.count),
                    "passed".style(self.styles.pass),
                )?;
                if self.cached > 0 {
                    write!(
                        writer,
                        " ({} {})",
                        self.cached.style(self.styles.count),
                        "cached".style(self.styles.skip),
                    )?;
                }
                if self.failed > 0 {
                    write!(
                        writer,
                        ", {} {}",
                        self.failed.style(self.styles.count),
                        "failed".style(self.styles.fail),
                    )?;
                }
                writeln!(writer)?;
            }
        }

        Ok(())
    }

    fn write_target_finished(
        &mut self,
        results: &TestResults,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let success = results.is_success();
        let (label, style) = if !success {
            self.failed += 1;
            ("FAIL", self.styles.fail)
        } else if results.is_cached() {
            self.passed += 1;
            self.cached += 1;
            ("CACHED", self.styles.skip)
        } else {
            self.passed += 1;
            ("PASS", self.styles.pass)
        };

        let test_count = results.test_count();
        writeln!(
            writer,
            "{:>12} [{}] ({}/{}) {}: {} {}",
            label.style(style),
            format_duration(results.total_time()),
            results.sequence_number.style(self.styles.count),
            results.total_number_of_tests.style(self.styles.count),
            results.target.style(self.styles.target),
            test_count.style(self.styles.count),
            plural::tests_str(test_count),
        )?;

        if !success {
            // Failures are always shown, with their messages.
            for case in &results.test_cases {
                for result in case.results.iter().filter(|result| !result.is_success()) {
                    self.write_test_line(&case.test_case_name, result, writer)?;
                    if let Some(message) = &result.message {
                        for line in message.lines() {
                            writeln!(writer, "{:>12}   {line}", "")?;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn write_test_line(
        &self,
        prefix: &str,
        summary: &TestResultSummary,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let style = match summary.result_type {
            ResultType::Success => self.styles.pass,
            ResultType::Failure => self.styles.fail,
            ResultType::AssumptionViolation
            | ResultType::Disabled
            | ResultType::Excluded
            | ResultType::DryRun => self.styles.skip,
        };
        writeln!(
            writer,
            "{:>12} [{}] {prefix} {}",
            summary.result_type.label().style(style),
            format_duration(summary.time),
            summary.test_name,
        )
    }
}

fn hbar(width: usize) -> String {
    "-".repeat(width)
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    target: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.target = Style::new().magenta().bold();
    }
}
