// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting for test runs.
//!
//! The runner posts [`TestEvent`]s to an [`EventBus`]. Consumers such as the [`TestDisplayer`]
//! read them from the matching [`EventReceiver`].

mod bus;
mod correlator;
mod displayer;
mod events;
mod xml;

pub use bus::*;
pub use correlator::*;
pub use displayer::*;
pub use events::*;
pub use xml::*;
