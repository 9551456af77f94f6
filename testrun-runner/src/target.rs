// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build target identities.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{borrow::Borrow, fmt};

/// The identity of one independently buildable and testable unit, for example `//foo:bar-tests`.
///
/// Cheap to clone.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildTarget(SmolStr);

impl BuildTarget {
    /// Creates a new `BuildTarget`.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(SmolStr::new(name))
    }

    /// Returns the target as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BuildTarget {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl Borrow<str> for BuildTarget {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}
