// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    coverage::LibraryUnderTest, errors::ManifestParseError, manifest::ManifestTestRule,
    target::BuildTarget,
};
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::debug;

/// A parsed test manifest.
#[derive(Clone, Debug)]
pub struct TestManifest {
    path: Utf8PathBuf,
    targets: Vec<TargetDefinition>,
}

impl TestManifest {
    /// Reads a manifest from `path`.
    pub fn from_path(path: impl Into<Utf8PathBuf>) -> Result<Self, ManifestParseError> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path).map_err(|error| ManifestParseError::Read {
            path: path.clone(),
            error,
        })?;
        Self::parse(path, &contents)
    }

    /// Parses a manifest from `contents`. `path` is only used for error reporting.
    pub fn parse(path: impl Into<Utf8PathBuf>, contents: &str) -> Result<Self, ManifestParseError> {
        let path = path.into();
        let manifest: ManifestDeserialize =
            toml::from_str(contents).map_err(|error| ManifestParseError::Deserialize {
                path: path.clone(),
                error: Box::new(error),
            })?;

        let duplicates: Vec<_> = manifest
            .targets
            .iter()
            .map(|target| &target.name)
            .duplicates()
            .cloned()
            .collect();
        if !duplicates.is_empty() {
            return Err(ManifestParseError::DuplicateTargets {
                path,
                targets: duplicates,
            });
        }

        debug!(%path, targets = manifest.targets.len(), "parsed test manifest");
        Ok(Self {
            path,
            targets: manifest.targets,
        })
    }

    /// Returns the path the manifest was read from.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the targets in the order they were declared.
    pub fn targets(&self) -> &[TargetDefinition] {
        &self.targets
    }

    /// Creates one rule per target, in declaration order.
    ///
    /// Each rule writes its outputs to a directory under `store_dir`, which is resolved against
    /// `workspace_root`.
    pub fn rules(&self, workspace_root: &Utf8Path, store_dir: &Utf8Path) -> Vec<Arc<ManifestTestRule>> {
        let store_dir = workspace_root.join(store_dir);
        self.targets
            .iter()
            .map(|definition| Arc::new(ManifestTestRule::new(definition.clone(), &store_dir)))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestDeserialize {
    #[serde(default, rename = "target")]
    targets: Vec<TargetDefinition>,
}

/// A `[[target]]` entry in a manifest.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TargetDefinition {
    /// The target's name, for example `//app:unit`.
    pub name: BuildTarget,

    /// The test program. Relative paths are resolved against the workspace root.
    pub command: String,

    /// Arguments passed to the test program.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables set for the test program.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// True if this target must not run alongside any other target.
    #[serde(default)]
    pub run_separately: bool,

    /// True if the test program prints protocol lines as its tests run.
    #[serde(default)]
    pub streaming: bool,

    /// People to contact about failures.
    #[serde(default)]
    pub contacts: BTreeSet<String>,

    /// Labels attached to this target.
    #[serde(default)]
    pub labels: BTreeSet<String>,

    /// Files, relative to the workspace root, whose contents are part of the target's rule key.
    #[serde(default)]
    pub inputs: Vec<Utf8PathBuf>,

    /// Libraries whose coverage this target's tests measure.
    #[serde(default)]
    pub under_test: Vec<LibraryDefinition>,
}

/// A library under test, declared as part of a [`TargetDefinition`].
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LibraryDefinition {
    /// The library's target.
    pub name: BuildTarget,

    /// The library's source files, relative to the workspace root.
    #[serde(default)]
    pub sources: Vec<Utf8PathBuf>,

    /// The directory the library's compiled classes are in.
    #[serde(default)]
    pub classes_dir: Option<Utf8PathBuf>,
}

impl From<&LibraryDefinition> for LibraryUnderTest {
    fn from(library: &LibraryDefinition) -> Self {
        Self {
            target: library.name.clone(),
            sources: library.sources.clone(),
            classes_dir: library.classes_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use maplit::{btreemap, btreeset};
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_full_target() {
        let manifest = TestManifest::parse(
            "testrun.toml",
            indoc! {r#"
                [[target]]
                name = "//app:unit"
                command = "./run.sh"
                args = ["--fast"]
                env = { RUST_LOG = "debug" }
                run-separately = true
                streaming = true
                contacts = ["oncall@example.com"]
                labels = ["unit"]
                inputs = ["app/src/lib.rs"]

                [[target.under-test]]
                name = "//app:lib"
                sources = ["app/src/Lib.java"]
                classes-dir = "target/app/classes"

                [[target]]
                name = "//app:smoke"
                command = "true"
            "#},
        )
        .expect("manifest is valid");

        let [unit, smoke] = manifest.targets() else {
            panic!("expected two targets, got {:?}", manifest.targets());
        };
        assert_eq!(
            unit,
            &TargetDefinition {
                name: BuildTarget::new("//app:unit"),
                command: "./run.sh".to_owned(),
                args: vec!["--fast".to_owned()],
                env: btreemap! {"RUST_LOG".to_owned() => "debug".to_owned()},
                run_separately: true,
                streaming: true,
                contacts: btreeset! {"oncall@example.com".to_owned()},
                labels: btreeset! {"unit".to_owned()},
                inputs: vec!["app/src/lib.rs".into()],
                under_test: vec![LibraryDefinition {
                    name: BuildTarget::new("//app:lib"),
                    sources: vec!["app/src/Lib.java".into()],
                    classes_dir: Some("target/app/classes".into()),
                }],
            }
        );
        assert_eq!(smoke.name.as_str(), "//app:smoke");
        assert!(!smoke.run_separately);
        assert!(smoke.args.is_empty());
    }

    #[test]
    fn empty_manifest_has_no_targets() {
        let manifest = TestManifest::parse("testrun.toml", "").expect("empty manifest is valid");
        assert!(manifest.targets().is_empty());
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let error = TestManifest::parse(
            "testrun.toml",
            indoc! {r#"
                [[target]]
                name = "//a:test"
                command = "true"

                [[target]]
                name = "//b:test"
                command = "true"

                [[target]]
                name = "//a:test"
                command = "false"
            "#},
        )
        .expect_err("duplicate targets");
        assert_eq!(
            error.to_string(),
            "manifest at `testrun.toml` declares these targets more than once: //a:test"
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = TestManifest::parse(
            "testrun.toml",
            indoc! {r#"
                [[target]]
                name = "//a:test"
                command = "true"
                timeout = 10
            "#},
        )
        .expect_err("unknown field");
        assert!(matches!(error, ManifestParseError::Deserialize { .. }));
    }

    #[test]
    fn missing_manifest_is_a_read_error() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let error = TestManifest::from_path(dir.path().join("testrun.toml"))
            .expect_err("manifest is missing");
        assert!(matches!(error, ManifestParseError::Read { .. }));
    }

    #[test]
    fn rules_are_in_declaration_order() {
        let manifest = TestManifest::parse(
            "testrun.toml",
            indoc! {r#"
                [[target]]
                name = "//b:test"
                command = "true"

                [[target]]
                name = "//a:test"
                command = "true"
            "#},
        )
        .expect("manifest is valid");

        let rules = manifest.rules(Utf8Path::new("/ws"), Utf8Path::new("target/testrun"));
        let names: Vec<_> = rules.iter().map(|rule| rule.definition().name.as_str()).collect();
        assert_eq!(names, vec!["//b:test", "//a:test"]);
        assert!(rules[0].results_path().starts_with("/ws/target/testrun"));
    }
}
