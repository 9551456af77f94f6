// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RuleKey, RuleKeyFileHelper};
use crate::{
    errors::DisplayErrorChain,
    rule::{ExecutionContext, TestRule, TestRunningOptions},
    target::BuildTarget,
};
use tracing::{debug, warn};

/// How a build rule came to be successfully built.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BuildRuleSuccessType {
    /// The rule was built locally.
    BuiltLocally,

    /// The rule's outputs were fetched from a remote cache.
    FetchedFromCache,

    /// The rule key matched the existing artifacts, so nothing was rebuilt.
    MatchingRuleKey,

    /// The input-based rule key matched the existing artifacts.
    MatchingInputBasedRuleKey,

    /// The dependency-file rule key matched the existing artifacts.
    MatchingDepFileRuleKey,
}

impl BuildRuleSuccessType {
    /// Returns true if the existing artifacts were reused as-is.
    ///
    /// Only an exact rule key match counts: a match on the input-based or dep-file keys still
    /// means the outputs were relinked, and test result files can't be trusted.
    pub fn matched_existing_artifact(self) -> bool {
        matches!(self, Self::MatchingRuleKey)
    }
}

/// The result of building a rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BuildResult {
    /// How the rule was built.
    pub success: BuildRuleSuccessType,
}

/// Access to build results and rule keys.
pub trait BuildEngine: Send + Sync {
    /// Returns the result of building `target`, or `None` if the target wasn't built in this
    /// invocation.
    fn build_rule_result(&self, target: &BuildTarget) -> Option<BuildResult>;

    /// Returns the current rule key for `target`, if known.
    fn rule_key(&self, target: &BuildTarget) -> Option<RuleKey>;
}

/// Everything the cache decision for one target depends on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CacheDecisionInputs {
    /// A debugger will attach to the test process.
    pub debug_enabled: bool,

    /// Explicit test selectors are in effect.
    pub using_test_selectors: bool,

    /// At least one environment override is configured.
    pub has_environment_overrides: bool,

    /// The build result for the target, if it was built.
    pub build_result: Option<BuildResult>,

    /// The results cache is enabled.
    pub results_cache_enabled: bool,

    /// The target has result files on disk from a previous run.
    pub has_test_result_files: bool,

    /// The rule key recorded next to those result files matches the current rule key.
    pub rule_key_matches: bool,
}

impl CacheDecisionInputs {
    /// Gathers the inputs for `rule` from the execution context, options and build engine.
    ///
    /// The on-disk rule key is only read when every other condition for reusing results holds.
    /// Errors reading it are treated as a mismatch.
    pub fn gather(
        cx: &ExecutionContext,
        options: &TestRunningOptions,
        rule: &dyn TestRule,
        build_engine: &dyn BuildEngine,
    ) -> Self {
        let build_result = build_engine.build_rule_result(rule.target());
        let has_test_result_files = rule.has_test_result_files();

        let mut inputs = Self {
            debug_enabled: cx.debug_enabled,
            using_test_selectors: options.is_using_test_selectors(),
            has_environment_overrides: options.has_environment_overrides(),
            build_result,
            results_cache_enabled: options.results_cache_enabled,
            has_test_result_files,
            rule_key_matches: false,
        };

        if inputs.could_reuse_results() {
            let helper = RuleKeyFileHelper::new(build_engine);
            inputs.rule_key_matches = match helper.is_rule_key_in_dir(rule) {
                Ok(matches) => matches,
                Err(error) => {
                    warn!(
                        target = %rule.target(),
                        "treating rule key as stale: {}",
                        DisplayErrorChain::new(error),
                    );
                    false
                }
            };
        }

        inputs
    }

    /// Returns true if every condition for reusing results holds, except possibly the rule key
    /// match.
    fn could_reuse_results(&self) -> bool {
        !self.debug_enabled
            && !self.using_test_selectors
            && !self.has_environment_overrides
            && self
                .build_result
                .is_some_and(|result| result.success.matched_existing_artifact())
            && self.results_cache_enabled
            && self.has_test_result_files
    }
}

/// Decides whether a target's tests must run.
///
/// Rules are evaluated in order, and the first match wins:
///
/// 1. If debugging is enabled, the tests run: a debugger can't attach to a cached result.
/// 2. If explicit test selectors are in effect, the tests run.
/// 3. If any environment override is configured, the tests run.
/// 4. Otherwise, the tests are skipped only if the target's artifacts matched an existing build,
///    the results cache is enabled, result files exist on disk and the rule key recorded next to
///    them matches.
/// 5. In every other case, the tests run.
pub fn is_test_run_required(inputs: &CacheDecisionInputs) -> bool {
    if inputs.debug_enabled {
        debug!("debugging enabled, test run required");
        true
    } else if inputs.using_test_selectors {
        debug!("test selectors in use, test run required");
        true
    } else if inputs.has_environment_overrides {
        debug!("environment overrides in use, test run required");
        true
    } else {
        let reusable = inputs
            .build_result
            .is_some_and(|result| result.success.matched_existing_artifact())
            && inputs.results_cache_enabled
            && inputs.has_test_result_files
            && inputs.rule_key_matches;
        if reusable {
            debug!("results are up to date, replaying them");
        }
        !reusable
    }
}
