// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Step;
use crate::{errors::ExecutionError, rule::ExecutionContext};
use futures::future::BoxFuture;
use smol_str::SmolStr;
use std::{collections::BTreeMap, process::Stdio};
use tracing::debug;

/// Runs a command to completion. The step fails if the command exits unsuccessfully.
///
/// The command runs in the workspace root, with its output inherited from testrun.
#[derive(Clone, Debug)]
pub struct CommandStep {
    short_name: SmolStr,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl CommandStep {
    /// Creates a new `CommandStep` from a program and its arguments.
    pub fn new(
        short_name: impl AsRef<str>,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            short_name: SmolStr::new(short_name),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        }
    }

    /// Sets an environment variable for the command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Returns the program and its arguments.
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }

    /// Returns the command line, quoted for a POSIX shell.
    pub fn command_line(&self) -> String {
        shell_words::join(self.argv())
    }
}

impl Step for CommandStep {
    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn description(&self, _cx: &ExecutionContext) -> String {
        self.command_line()
    }

    fn execute<'a>(&'a self, cx: &'a ExecutionContext) -> BoxFuture<'a, Result<(), ExecutionError>> {
        Box::pin(async move {
            let mut cmd = tokio::process::Command::new(&self.program);
            cmd.args(&self.args)
                .envs(&self.env)
                .current_dir(&cx.workspace_root)
                .stdin(Stdio::null());

            let status = cmd.status().await.map_err(|error| ExecutionError::Spawn {
                step: self.short_name().to_owned(),
                command: self.command_line(),
                error,
            })?;
            debug!(step = self.short_name(), %status, "command exited");

            if status.success() {
                Ok(())
            } else {
                Err(ExecutionError::step_failed(self.short_name(), status))
            }
        })
    }
}
