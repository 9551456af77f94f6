// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod fixtures;
mod manifest;
mod scheduling;
