// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code coverage reports for libraries under test.
//!
//! When coverage is requested and at least one rule measures coverage for a library, the
//! [`CoverageReportCommand`] runs once after every test has finished. The source folders passed to
//! it are discovered with a [`PackageFinder`].

mod command;
mod package_finder;

pub use command::*;
pub use package_finder::*;

use crate::target::BuildTarget;
use camino::Utf8PathBuf;
use serde::Deserialize;
use std::fmt;

/// The format of the generated coverage report.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageReportFormat {
    /// An HTML report.
    #[default]
    Html,

    /// An XML report.
    Xml,

    /// A CSV report.
    Csv,
}

impl fmt::Display for CoverageReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Html => write!(f, "html"),
            Self::Xml => write!(f, "xml"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Options for generating a coverage report.
#[derive(Clone, Debug)]
pub struct CoverageOptions {
    /// The directory the report is written to. It's cleaned before any test runs.
    pub output_dir: Utf8PathBuf,

    /// The report format.
    pub format: CoverageReportFormat,

    /// The report title.
    pub title: String,

    /// Class name patterns to include.
    pub includes: Vec<String>,

    /// Class name patterns to exclude.
    pub excludes: Vec<String>,

    /// The program (and leading arguments) that generates the report.
    pub launcher: Vec<String>,

    /// Generated source files live under this directory, and are never treated as sources.
    pub generated_dir: Utf8PathBuf,

    /// Locates source folders. `None` if no source roots or path elements are configured.
    pub package_finder: Option<PackageFinder>,
}

/// A library whose coverage is measured by a test rule.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LibraryUnderTest {
    /// The library's target.
    pub target: BuildTarget,

    /// The library's source files, relative to the workspace root.
    pub sources: Vec<Utf8PathBuf>,

    /// The directory the library's compiled classes are in, if any.
    pub classes_dir: Option<Utf8PathBuf>,
}
