// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::BuildEngine;
use crate::{
    errors::{ExecutionError, RuleKeyFileError},
    rule::{ExecutionContext, TestRule},
    step::Step,
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use futures::future::BoxFuture;
use std::{fmt, io, io::Write};
use tracing::debug;

/// A fingerprint of a rule's inputs and configuration.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RuleKey(String);

impl RuleKey {
    /// Creates a new rule key from its string form.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Creates a rule key from a 64-bit hash.
    pub fn from_hash(hash: u64) -> Self {
        Self(format!("{hash:016x}"))
    }

    /// Returns the string form of this key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads and writes the rule key marker stored next to a rule's test results.
///
/// The marker records the rule key the results were produced with, so that results left behind by
/// a different version of the rule are never replayed.
pub struct RuleKeyFileHelper<'a> {
    build_engine: &'a dyn BuildEngine,
}

impl<'a> RuleKeyFileHelper<'a> {
    /// The name of the marker file inside a rule's output directory.
    pub const RULE_KEY_FILE_NAME: &'static str = ".rulekey";

    /// Creates a new helper.
    pub fn new(build_engine: &'a dyn BuildEngine) -> Self {
        Self { build_engine }
    }

    /// Returns the path to the marker file for `rule`.
    pub fn rule_key_path(rule: &dyn TestRule) -> Utf8PathBuf {
        rule.output_dir().join(Self::RULE_KEY_FILE_NAME)
    }

    /// Returns true if the marker for `rule` exists and matches the current rule key.
    pub fn is_rule_key_in_dir(&self, rule: &dyn TestRule) -> Result<bool, RuleKeyFileError> {
        let Some(current) = self.build_engine.rule_key(rule.target()) else {
            debug!(target = %rule.target(), "no current rule key, treating marker as stale");
            return Ok(false);
        };

        let path = Self::rule_key_path(rule);
        let on_disk = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(RuleKeyFileError::Read { path, error }),
        };

        Ok(on_disk.trim() == current.as_str())
    }

    /// Returns a step that records the current rule key for `rule`.
    ///
    /// Returns `None` if the build engine doesn't know the rule key.
    pub fn create_rule_key_in_dir_step(&self, rule: &dyn TestRule) -> Option<Box<dyn Step>> {
        let rule_key = self.build_engine.rule_key(rule.target())?;
        Some(Box::new(WriteRuleKeyStep {
            path: Self::rule_key_path(rule),
            rule_key,
        }))
    }
}

/// Atomically writes a rule key marker.
#[derive(Debug)]
pub struct WriteRuleKeyStep {
    path: Utf8PathBuf,
    rule_key: RuleKey,
}

impl WriteRuleKeyStep {
    /// Returns the path the marker is written to.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn write(&self) -> Result<(), RuleKeyFileError> {
        AtomicFile::new(&self.path, OverwriteBehavior::AllowOverwrite)
            .write(|file| {
                file.write_all(self.rule_key.as_str().as_bytes())?;
                file.write_all(b"\n")
            })
            .map_err(|error| RuleKeyFileError::Write {
                path: self.path.clone(),
                error,
            })
    }
}

impl Step for WriteRuleKeyStep {
    fn short_name(&self) -> &str {
        "write_rule_key"
    }

    fn description(&self, _cx: &ExecutionContext) -> String {
        format!("write rule key {} to {}", self.rule_key, self.path)
    }

    fn execute<'a>(&'a self, _cx: &'a ExecutionContext) -> BoxFuture<'a, Result<(), ExecutionError>> {
        Box::pin(async move {
            self.write().map_err(|error| ExecutionError::RuleKey {
                step: self.short_name().to_owned(),
                error,
            })
        })
    }
}
