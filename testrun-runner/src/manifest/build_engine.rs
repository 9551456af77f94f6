// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{TargetDefinition, TestManifest};
use crate::{
    cache::{BuildEngine, BuildResult, BuildRuleSuccessType, RuleKey},
    target::BuildTarget,
};
use camino::Utf8Path;
use std::{collections::HashMap, io};
use tracing::{debug, warn};
use xxhash_rust::xxh3::Xxh3;

/// A build engine for manifest targets.
///
/// Manifest targets have nothing to build, so every known target is reported as having matched its
/// existing artifacts. Whether cached results may be replayed then comes down to the rule key,
/// which covers the target's command line, environment and input files.
#[derive(Clone, Debug)]
pub struct ManifestBuildEngine {
    rule_keys: HashMap<BuildTarget, Option<RuleKey>>,
}

impl ManifestBuildEngine {
    /// Computes rule keys for every target in `manifest`.
    ///
    /// Input files are resolved against `workspace_root`. A target with an unreadable input has no
    /// rule key, so its cached results are never replayed.
    pub fn new(manifest: &TestManifest, workspace_root: &Utf8Path) -> Self {
        let rule_keys = manifest
            .targets()
            .iter()
            .map(|definition| {
                let rule_key = match compute_rule_key(definition, workspace_root) {
                    Ok(rule_key) => {
                        debug!(target = %definition.name, %rule_key, "computed rule key");
                        Some(rule_key)
                    }
                    Err(error) => {
                        warn!(
                            target = %definition.name,
                            "unable to compute rule key, tests will always run: {error}",
                        );
                        None
                    }
                };
                (definition.name.clone(), rule_key)
            })
            .collect();
        Self { rule_keys }
    }
}

impl BuildEngine for ManifestBuildEngine {
    fn build_rule_result(&self, target: &BuildTarget) -> Option<BuildResult> {
        self.rule_keys.contains_key(target).then_some(BuildResult {
            success: BuildRuleSuccessType::MatchingRuleKey,
        })
    }

    fn rule_key(&self, target: &BuildTarget) -> Option<RuleKey> {
        self.rule_keys.get(target).cloned().flatten()
    }
}

fn compute_rule_key(definition: &TargetDefinition, workspace_root: &Utf8Path) -> io::Result<RuleKey> {
    let mut hasher = Xxh3::new();
    hasher.update(definition.command.as_bytes());
    hasher.update(b"\0");
    for arg in &definition.args {
        hasher.update(arg.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(b"\0env\0");
    // BTreeMap iteration is sorted, so the key doesn't depend on declaration order.
    for (key, value) in &definition.env {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(b"\0inputs\0");
    for input in &definition.inputs {
        let path = workspace_root.join(input);
        let contents = std::fs::read(&path)
            .map_err(|error| io::Error::new(error.kind(), format!("reading `{path}`: {error}")))?;
        hasher.update(input.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(&(contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }
    Ok(RuleKey::from_hash(hasher.digest()))
}
