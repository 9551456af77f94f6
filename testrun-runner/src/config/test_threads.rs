// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::TestThreadsParseError;
use serde::{
    Deserialize, Deserializer,
    de::{self, Visitor},
};
use std::{cmp::Ordering, fmt, str::FromStr, sync::LazyLock};
use tracing::warn;

/// Type for the test-threads config key: how many runs of the parallel group execute at once.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestThreads {
    /// Run this many test runs at once.
    Count(usize),

    /// Run as many test runs at once as there are logical CPUs.
    NumCpus,
}

impl TestThreads {
    /// Gets the actual number of test threads computed at runtime.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(threads) => threads,
            Self::NumCpus => get_num_cpus(),
        }
    }

    /// Interprets a signed count: positive counts are absolute, negative ones are subtracted from
    /// the number of CPUs (bottoming out at 1), and zero is rejected.
    fn from_signed(count: i64) -> Result<Self, &'static str> {
        match count.cmp(&0) {
            Ordering::Greater => Ok(Self::Count(count.unsigned_abs() as usize)),
            Ordering::Less => {
                let remaining = get_num_cpus().saturating_sub(count.unsigned_abs() as usize);
                Ok(Self::Count(remaining.max(1)))
            }
            Ordering::Equal => Err("test-threads may not be 0"),
        }
    }
}

impl FromStr for TestThreads {
    type Err = TestThreadsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }
        let count: i64 = s
            .parse()
            .map_err(|error: std::num::ParseIntError| TestThreadsParseError::new(s, error.to_string()))?;
        Self::from_signed(count).map_err(|message| TestThreadsParseError::new(s, message))
    }
}

impl fmt::Display for TestThreads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(threads) => write!(f, "{threads}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}

/// Accepts the same values as the command line: an integer, or a string that parses as one of
/// the values [`FromStr`] accepts.
impl<'de> Deserialize<'de> for TestThreads {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TestThreadsVisitor;

        impl Visitor<'_> for TestThreadsVisitor {
            type Value = TestThreads;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a non-zero integer or \"num-cpus\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TestThreads, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<TestThreads, E> {
                TestThreads::from_signed(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<TestThreads, E> {
                let v = i64::try_from(v).map_err(E::custom)?;
                self.visit_i64(v)
            }
        }

        deserializer.deserialize_any(TestThreadsVisitor)
    }
}

/// Returns the number of logical CPUs, or 1 if it can't be determined.
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}
