// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for testrun-runner.

use std::{process::ExitStatus, time::Duration};

/// Utilities for pluralizing various words based on count.
pub(crate) mod plural {
    /// Returns "target" if `count` is 1, otherwise "targets".
    pub(crate) fn targets_str(count: usize) -> &'static str {
        if count == 1 { "target" } else { "targets" }
    }

    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }
}

/// Serializes a [`Duration`] as a whole number of milliseconds.
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(crate) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Durations longer than u64::MAX milliseconds are not a practical concern.
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

pub(crate) fn display_exited_with(exit_status: ExitStatus) -> String {
    match exit_status.code() {
        Some(code) => format!("exited with exit code {code}"),
        None => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = exit_status.signal() {
                    return format!("aborted with signal {signal}");
                }
            }
            "exited with an unknown error".to_owned()
        }
    }
}

/// Formats a duration as seconds with millisecond precision, right-aligned to the given width.
pub(crate) fn format_duration(duration: Duration) -> String {
    format!("{:>8.3}s", duration.as_secs_f64())
}
