// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::LibraryUnderTest;
use crate::errors::CoverageError;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;
use tracing::trace;

/// Finds the source folders that contain a library's sources.
///
/// A source folder is the directory that package paths are relative to, for example `src/` in
/// `src/com/example/Foo.java`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PackageFinder {
    paths_from_root: BTreeSet<String>,
    path_elements: BTreeSet<String>,
}

impl PackageFinder {
    /// Creates a new `PackageFinder`.
    ///
    /// * `paths_from_root` are source folders relative to the workspace root.
    /// * `path_elements` are directory names that mark a source folder wherever they appear.
    pub fn new(
        paths_from_root: impl IntoIterator<Item = impl Into<String>>,
        path_elements: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            paths_from_root: paths_from_root.into_iter().map(Into::into).collect(),
            path_elements: path_elements.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the configured source folders relative to the workspace root.
    pub fn paths_from_root(&self) -> &BTreeSet<String> {
        &self.paths_from_root
    }

    /// Returns the directory names that mark a source folder.
    pub fn path_elements(&self) -> &BTreeSet<String> {
        &self.path_elements
    }

    /// Returns true if neither source roots nor path elements are configured.
    pub fn is_empty(&self) -> bool {
        self.paths_from_root.is_empty() && self.path_elements.is_empty()
    }
}

/// Returns the source folders for `library`.
///
/// For every source file, in order:
///
/// 1. generated files, under `generated_dir`, are skipped;
/// 2. files under a folder that was already found are skipped;
/// 3. if the file is under a configured source root, the root is used;
/// 4. otherwise, the nearest ancestor directory named after a path element is used, with a
///    trailing `/`. Files with no such ancestor are skipped.
///
/// Returns an error if the library has sources but `package_finder` is `None`.
pub fn source_folders(
    library: &LibraryUnderTest,
    package_finder: Option<&PackageFinder>,
    workspace_root: &Utf8Path,
    generated_dir: &Utf8Path,
) -> Result<BTreeSet<String>, CoverageError> {
    // Libraries with only resources have no sources.
    if library.sources.is_empty() {
        return Ok(BTreeSet::new());
    }

    let Some(finder) = package_finder else {
        return Err(CoverageError::NoPackageFinder {
            library: library.target.clone(),
        });
    };

    let absolute_generated = workspace_root.join(generated_dir);
    let mut folders = BTreeSet::new();

    for source in &library.sources {
        let absolute = workspace_root.join(source);
        if source.starts_with(generated_dir) || absolute.starts_with(&absolute_generated) {
            trace!(%source, "skipping generated source");
            continue;
        }

        let already_known = folders
            .iter()
            .any(|folder: &String| source.starts_with(folder) || absolute.starts_with(folder));
        if already_known {
            continue;
        }

        if let Some(root) = finder
            .paths_from_root
            .iter()
            .find(|root| source.starts_with(root.as_str()))
        {
            folders.insert(root.clone());
            continue;
        }

        if let Some(folder) = nearest_path_element(&absolute, &finder.path_elements) {
            let mut folder = folder.to_string();
            if !folder.ends_with('/') {
                folder.push('/');
            }
            folders.insert(folder);
        }
    }

    Ok(folders)
}

fn nearest_path_element(source: &Utf8Path, path_elements: &BTreeSet<String>) -> Option<Utf8PathBuf> {
    if path_elements.is_empty() {
        return None;
    }
    source
        .ancestors()
        .skip(1)
        .find(|dir| {
            dir.file_name()
                .is_some_and(|name| path_elements.contains(name))
        })
        .map(Utf8Path::to_path_buf)
}
