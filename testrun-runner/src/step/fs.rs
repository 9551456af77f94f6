// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Step;
use crate::{errors::ExecutionError, rule::ExecutionContext};
use camino::{Utf8Path, Utf8PathBuf};
use futures::future::BoxFuture;
use std::io;

/// Removes a directory and everything in it, then recreates it empty.
///
/// Relative paths are resolved against the workspace root.
#[derive(Clone, Debug)]
pub struct MakeCleanDirectoryStep {
    path: Utf8PathBuf,
}

impl MakeCleanDirectoryStep {
    /// Creates a new `MakeCleanDirectoryStep`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the directory this step cleans.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Step for MakeCleanDirectoryStep {
    fn short_name(&self) -> &str {
        "make_clean_dir"
    }

    fn description(&self, cx: &ExecutionContext) -> String {
        format!("rm -rf {0} && mkdir -p {0}", cx.workspace_root.join(&self.path))
    }

    fn execute<'a>(&'a self, cx: &'a ExecutionContext) -> BoxFuture<'a, Result<(), ExecutionError>> {
        Box::pin(async move {
            let path = cx.workspace_root.join(&self.path);
            let io_error = |error| ExecutionError::Io {
                step: self.short_name().to_owned(),
                error,
            };

            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(io_error(error)),
            }
            tokio::fs::create_dir_all(&path).await.map_err(io_error)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cleans_existing_directory() {
        let root = camino_tempfile::tempdir().expect("tempdir created");
        let out = root.path().join("out");
        std::fs::create_dir_all(out.join("nested")).expect("created nested dir");
        std::fs::write(out.join("nested/stale.json"), "{}").expect("wrote stale file");

        let cx = ExecutionContext::new(root.path());
        MakeCleanDirectoryStep::new("out")
            .execute(&cx)
            .await
            .expect("step succeeds");

        assert!(out.is_dir());
        let entries = std::fs::read_dir(&out).expect("dir readable").count();
        assert_eq!(entries, 0, "directory is empty");
    }

    #[tokio::test]
    async fn creates_missing_directory() {
        let root = camino_tempfile::tempdir().expect("tempdir created");
        let cx = ExecutionContext::new(root.path());
        MakeCleanDirectoryStep::new("a/b/c")
            .execute(&cx)
            .await
            .expect("step succeeds");
        assert!(root.path().join("a/b/c").is_dir());
    }
}
