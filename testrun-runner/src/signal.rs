// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for handling signals in testrun.

use crate::errors::SignalHandlerSetupError;
use std::{fmt, sync::Arc};
use tokio::sync::Notify;

/// The kind of signal handling to set up for a test run.
///
/// A `SignalHandlerKind` can be passed into
/// [`TestRunnerBuilder::build`](crate::runner::TestRunnerBuilder::build).
#[derive(Clone, Debug)]
pub enum SignalHandlerKind {
    /// The standard signal handler. Capture interrupt and termination signals depending on the
    /// platform.
    Standard,

    /// A no-op signal handler. Useful for tests.
    Noop,

    /// A handler that only fires when [`ManualInterrupt::interrupt`] is called. Useful for tests.
    Manual(ManualInterrupt),
}

impl SignalHandlerKind {
    pub(crate) fn build(self) -> Result<SignalHandler, SignalHandlerSetupError> {
        match self {
            Self::Standard => SignalHandler::new(),
            Self::Noop => Ok(SignalHandler::noop()),
            Self::Manual(interrupt) => Ok(SignalHandler {
                source: SignalSource::Manual(interrupt),
            }),
        }
    }
}

/// A handle that simulates an interrupt signal.
#[derive(Clone, Debug, Default)]
pub struct ManualInterrupt {
    notify: Arc<Notify>,
}

impl ManualInterrupt {
    /// Creates a new `ManualInterrupt`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers an interrupt to the run this handle was passed to.
    ///
    /// If the run isn't waiting yet, the interrupt is delivered as soon as it starts waiting.
    pub fn interrupt(&self) {
        self.notify.notify_one();
    }
}

/// The signal handler implementation.
#[derive(Debug)]
pub(crate) struct SignalHandler {
    source: SignalSource,
}

#[derive(Debug)]
enum SignalSource {
    Os(imp::Signals),
    Manual(ManualInterrupt),
    Noop,
}

impl SignalHandler {
    /// Creates a new `SignalHandler` that handles Ctrl-C and other signals.
    ///
    /// Must be called from within a Tokio runtime context.
    pub(crate) fn new() -> Result<Self, SignalHandlerSetupError> {
        let signals = imp::Signals::new()?;
        Ok(Self {
            source: SignalSource::Os(signals),
        })
    }

    /// Creates a new `SignalHandler` that does nothing.
    pub(crate) fn noop() -> Self {
        Self {
            source: SignalSource::Noop,
        }
    }

    /// Waits for the next shutdown signal.
    ///
    /// Returns `None` if no more signals can be received.
    pub(crate) async fn recv(&mut self) -> Option<ShutdownEvent> {
        match &mut self.source {
            SignalSource::Os(signals) => signals.recv().await,
            SignalSource::Manual(interrupt) => {
                interrupt.notify.notified().await;
                Some(ShutdownEvent::Interrupt)
            }
            SignalSource::Noop => None,
        }
    }
}

#[cfg(unix)]
mod imp {
    use super::*;
    use tokio::signal::unix::{Signal, SignalKind, signal};

    /// Signals for SIGINT, SIGTERM and SIGHUP on Unix.
    #[derive(Debug)]
    pub(super) struct Signals {
        sigint: SignalWithDone,
        sighup: SignalWithDone,
        sigterm: SignalWithDone,
    }

    impl Signals {
        pub(super) fn new() -> std::io::Result<Self> {
            let sigint = SignalWithDone::new(SignalKind::interrupt())?;
            let sighup = SignalWithDone::new(SignalKind::hangup())?;
            let sigterm = SignalWithDone::new(SignalKind::terminate())?;

            Ok(Self {
                sigint,
                sighup,
                sigterm,
            })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownEvent> {
            loop {
                tokio::select! {
                    recv = self.sigint.signal.recv(), if !self.sigint.done => {
                        match recv {
                            Some(()) => break Some(ShutdownEvent::Interrupt),
                            None => self.sigint.done = true,
                        }
                    }
                    recv = self.sighup.signal.recv(), if !self.sighup.done => {
                        match recv {
                            Some(()) => break Some(ShutdownEvent::Hangup),
                            None => self.sighup.done = true,
                        }
                    }
                    recv = self.sigterm.signal.recv(), if !self.sigterm.done => {
                        match recv {
                            Some(()) => break Some(ShutdownEvent::Term),
                            None => self.sigterm.done = true,
                        }
                    }
                    else => {
                        break None
                    }
                }
            }
        }
    }

    #[derive(Debug)]
    struct SignalWithDone {
        signal: Signal,
        done: bool,
    }

    impl SignalWithDone {
        fn new(kind: SignalKind) -> std::io::Result<Self> {
            let signal = signal(kind)?;
            Ok(Self {
                signal,
                done: false,
            })
        }
    }
}

#[cfg(windows)]
mod imp {
    use super::*;
    use tokio::signal::windows::{CtrlC, ctrl_c};

    #[derive(Debug)]
    pub(super) struct Signals {
        ctrl_c: CtrlC,
        ctrl_c_done: bool,
    }

    impl Signals {
        pub(super) fn new() -> std::io::Result<Self> {
            let ctrl_c = ctrl_c()?;
            Ok(Self {
                ctrl_c,
                ctrl_c_done: false,
            })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownEvent> {
            if self.ctrl_c_done {
                return None;
            }

            match self.ctrl_c.recv().await {
                Some(()) => Some(ShutdownEvent::Interrupt),
                None => {
                    self.ctrl_c_done = true;
                    None
                }
            }
        }
    }
}

/// A signal event that causes a test run to shut down.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShutdownEvent {
    /// SIGHUP.
    #[cfg(unix)]
    Hangup,

    /// SIGTERM.
    #[cfg(unix)]
    Term,

    /// SIGINT, or Ctrl-C on Windows.
    Interrupt,
}

impl fmt::Display for ShutdownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(unix)]
            Self::Hangup => f.write_str("SIGHUP"),
            #[cfg(unix)]
            Self::Term => f.write_str("SIGTERM"),
            Self::Interrupt => f.write_str("interrupt"),
        }
    }
}
