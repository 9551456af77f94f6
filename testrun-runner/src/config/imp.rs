// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestThreads;
use crate::{
    coverage::{CoverageOptions, CoverageReportFormat, PackageFinder},
    errors::{ConfigParseError, ConfigParseErrorKind},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::warn;

/// Handles warnings produced while reading configuration.
pub trait ConfigWarnings {
    /// Called with the keys in `config_file` that testrun doesn't know about.
    fn unknown_config_keys(
        &mut self,
        config_file: &Utf8Path,
        workspace_root: &Utf8Path,
        unknown: &BTreeSet<String>,
    );
}

/// Logs configuration warnings through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(
        &mut self,
        config_file: &Utf8Path,
        workspace_root: &Utf8Path,
        unknown: &BTreeSet<String>,
    ) {
        let mut unknown_str = String::new();
        if let [key] = unknown.iter().collect::<Vec<_>>().as_slice() {
            // Print this on the same line.
            unknown_str.push_str("key: ");
            unknown_str.push_str(key);
        } else {
            unknown_str.push_str("keys:\n");
            for ignored_key in unknown {
                unknown_str.push('\n');
                unknown_str.push_str("  - ");
                unknown_str.push_str(ignored_key);
            }
        }

        warn!(
            "in config file {}, ignoring unknown configuration {unknown_str}",
            config_file
                .strip_prefix(workspace_root)
                .unwrap_or(config_file),
        );
    }
}

/// Overall configuration for testrun.
#[derive(Clone, Debug)]
pub struct TestrunConfig {
    workspace_root: Utf8PathBuf,
    inner: TestrunConfigImpl,
}

impl TestrunConfig {
    /// The default location of the config within the workspace: `.config/testrun.toml`.
    pub const CONFIG_PATH: &'static str = ".config/testrun.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the config from `config_file`, or if not specified from `.config/testrun.toml` in the
    /// workspace root.
    ///
    /// If no config file is specified and the workspace doesn't have `.config/testrun.toml`, uses
    /// the default config options. Unknown keys are logged as warnings.
    pub fn from_sources(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_with_warnings(workspace_root, config_file, &mut DefaultConfigWarnings)
    }

    /// Like [`Self::from_sources`], but reports warnings to `warnings`.
    pub fn from_sources_with_warnings(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let workspace_root = workspace_root.into();

        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (inner, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            warnings.unknown_config_keys(&config_file, &workspace_root, &unknown);
        }

        Ok(Self {
            workspace_root,
            inner,
        })
    }

    /// Returns the default config.
    pub fn default_config(workspace_root: impl Into<Utf8PathBuf>) -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");
        let inner = config
            .try_deserialize()
            .expect("default config is always valid");
        Self {
            workspace_root: workspace_root.into(),
            inner,
        }
    }

    /// Returns the workspace root the config was read for.
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Returns the number of runs the parallel group executes simultaneously.
    pub fn test_threads(&self) -> TestThreads {
        self.inner.test_threads
    }

    /// Returns true if results from a previous run may be replayed.
    pub fn results_cache_enabled(&self) -> bool {
        self.inner.results_cache
    }

    /// Returns the store directory, relative to the workspace root.
    pub fn store_dir(&self) -> &Utf8Path {
        &self.inner.store.dir
    }

    /// Returns the path the XML report is written to, relative to the workspace root.
    pub fn xml_path(&self) -> Option<&Utf8Path> {
        self.inner.xml.path.as_deref()
    }

    /// Returns options for generating a coverage report.
    ///
    /// Files under the store directory are generated, and never treated as sources.
    pub fn coverage_options(&self) -> CoverageOptions {
        let coverage = &self.inner.coverage;
        let package_finder = PackageFinder::new(
            coverage.source_roots.iter().cloned(),
            coverage.path_elements.iter().cloned(),
        );
        CoverageOptions {
            output_dir: coverage.output_dir.clone(),
            format: coverage.format,
            title: coverage.title.clone(),
            includes: coverage.includes.clone(),
            excludes: coverage.excludes.clone(),
            launcher: coverage.launcher.clone(),
            generated_dir: self.inner.store.dir.clone(),
            package_finder: (!package_finder.is_empty()).then_some(package_finder),
        }
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// Returns a tuple of (config, unknown keys).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(TestrunConfigImpl, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut unknown = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            unknown.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: TestrunConfigImpl =
            serde_path_to_error::deserialize(ignored_de).map_err(|error| {
                // serde_path_to_error already reports the key, so drop it from the config error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, unknown))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TestrunConfigImpl {
    test_threads: TestThreads,
    results_cache: bool,
    store: StoreConfigImpl,
    #[serde(default)]
    xml: XmlConfigImpl,
    coverage: CoverageConfigImpl,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StoreConfigImpl {
    dir: Utf8PathBuf,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct XmlConfigImpl {
    #[serde(default)]
    path: Option<Utf8PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CoverageConfigImpl {
    output_dir: Utf8PathBuf,
    format: CoverageReportFormat,
    title: String,
    #[serde(default)]
    includes: Vec<String>,
    #[serde(default)]
    excludes: Vec<String>,
    #[serde(default)]
    launcher: Vec<String>,
    #[serde(default)]
    source_roots: Vec<String>,
    #[serde(default)]
    path_elements: Vec<String>,
}
