// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{CoverageOptions, LibraryUnderTest, source_folders};
use crate::{errors::CoverageError, step::CommandStep};
use camino::Utf8Path;
use itertools::Itertools;
use std::collections::BTreeSet;

/// The command that generates a coverage report.
///
/// The command line is the configured launcher followed by:
///
/// ```text
/// --output-dir <dir> --format <format> --title <title>
///     --classes-dir <dir>[:<dir>...] --source-dir <dir>[:<dir>...]
///     [--includes <pattern>[:<pattern>...]] [--excludes <pattern>[:<pattern>...]]
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoverageReportCommand {
    program: String,
    args: Vec<String>,
}

impl CoverageReportCommand {
    /// Builds the command for `libraries`.
    pub fn new(
        options: &CoverageOptions,
        libraries: &[LibraryUnderTest],
        workspace_root: &Utf8Path,
    ) -> Result<Self, CoverageError> {
        let mut source_dirs = BTreeSet::new();
        let mut classes_dirs = BTreeSet::new();
        for library in libraries {
            source_dirs.extend(source_folders(
                library,
                options.package_finder.as_ref(),
                workspace_root,
                &options.generated_dir,
            )?);
            if let Some(classes_dir) = &library.classes_dir {
                classes_dirs.insert(classes_dir.to_string());
            }
        }

        let mut launcher = options.launcher.iter().cloned();
        let program = launcher
            .next()
            .unwrap_or_else(|| DEFAULT_LAUNCHER.to_owned());
        let mut args: Vec<String> = launcher.collect();

        args.extend([
            "--output-dir".to_owned(),
            options.output_dir.to_string(),
            "--format".to_owned(),
            options.format.to_string(),
            "--title".to_owned(),
            options.title.clone(),
            "--classes-dir".to_owned(),
            classes_dirs.iter().join(":"),
            "--source-dir".to_owned(),
            source_dirs.iter().join(":"),
        ]);
        if !options.includes.is_empty() {
            args.push("--includes".to_owned());
            args.push(options.includes.join(":"));
        }
        if !options.excludes.is_empty() {
            args.push("--excludes".to_owned());
            args.push(options.excludes.join(":"));
        }

        Ok(Self { program, args })
    }

    /// Returns the program and its arguments.
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }

    /// Returns a step that runs this command.
    pub fn into_step(self) -> CommandStep {
        CommandStep::new("coverage_report", self.program, self.args)
    }
}

/// The report generator used if no launcher is configured.
pub const DEFAULT_LAUNCHER: &str = "coverage-report";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coverage::{CoverageReportFormat, PackageFinder},
        target::BuildTarget,
    };
    use camino::Utf8PathBuf;
    use pretty_assertions::assert_eq;

    fn options() -> CoverageOptions {
        CoverageOptions {
            output_dir: "target/testrun/coverage".into(),
            format: CoverageReportFormat::Xml,
            title: "Code-Coverage Analysis".to_owned(),
            includes: Vec::new(),
            excludes: Vec::new(),
            launcher: vec!["java".to_owned(), "-jar".to_owned(), "report.jar".to_owned()],
            generated_dir: "target/testrun".into(),
            package_finder: Some(PackageFinder::new(["java/"], Vec::<String>::new())),
        }
    }

    fn libraries() -> Vec<LibraryUnderTest> {
        vec![
            LibraryUnderTest {
                target: BuildTarget::new("//java/a:a"),
                sources: vec![Utf8PathBuf::from("java/a/A.java")],
                classes_dir: Some("target/testrun/a/classes".into()),
            },
            LibraryUnderTest {
                target: BuildTarget::new("//java/b:b"),
                sources: vec![Utf8PathBuf::from("java/b/B.java")],
                classes_dir: Some("target/testrun/b/classes".into()),
            },
        ]
    }

    #[test]
    fn builds_command_line() {
        let command = CoverageReportCommand::new(&options(), &libraries(), Utf8Path::new("/ws"))
            .expect("command built");
        assert_eq!(
            command.argv().collect::<Vec<_>>(),
            vec![
                "java",
                "-jar",
                "report.jar",
                "--output-dir",
                "target/testrun/coverage",
                "--format",
                "xml",
                "--title",
                "Code-Coverage Analysis",
                "--classes-dir",
                "target/testrun/a/classes:target/testrun/b/classes",
                "--source-dir",
                "java/",
            ]
        );
    }

    #[test]
    fn filters_are_appended() {
        let mut options = options();
        options.includes = vec!["com.example.*".to_owned()];
        options.excludes = vec!["*Test".to_owned(), "*Fake".to_owned()];
        options.launcher.clear();

        let command = CoverageReportCommand::new(&options, &[], Utf8Path::new("/ws"))
            .expect("command built");
        let argv: Vec<_> = command.argv().collect();
        assert_eq!(argv[0], DEFAULT_LAUNCHER);
        assert_eq!(
            &argv[argv.len() - 4..],
            &["--includes", "com.example.*", "--excludes", "*Test:*Fake"]
        );
    }

    #[test]
    fn step_runs_the_command() {
        let command = CoverageReportCommand::new(&options(), &libraries(), Utf8Path::new("/ws"))
            .expect("command built");
        let expected = shell_words::join(command.argv());
        assert_eq!(command.into_step().command_line(), expected);
    }
}
