/* Copyright © 2018 Gianmarco Garrisi

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>. */

use thiserror::Error;

/// Structural/kernel-level failures: invariant violations raised
/// synchronously by the API call that broke them, plus the internal
/// `EmptySchedule` sentinel.
///
/// These are distinct from [`crate::Failure`], which carries the
/// user-domain payload of a failed *event*.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum Error {
    #[error("negative timeout delay: {0}")]
    NegativeDelay(f64),

    #[error("`until` ({at}) must be greater than the current simulation time ({now})")]
    UntilNotAfterNow { at: f64, now: f64 },

    #[error("event has already been triggered")]
    AlreadyTriggered,

    #[error("cannot mix events from different environments in a condition")]
    EnvironmentMismatch,

    #[error("a condition cannot admit an event that has already been processed")]
    ConditionChildAlreadyTriggered,

    #[error("a process is not allowed to interrupt itself")]
    SelfInterrupt,

    #[error("process has terminated and cannot be interrupted")]
    InterruptTerminatedProcess,

    #[error("no more events to process")]
    EmptySchedule,

    #[error("value of event is not yet available")]
    ValueNotReady,
}

/// The outcome of [`crate::Environment::step`]: either a structural
/// kernel error, or an unhandled (non-defused) event failure escaping
/// to the caller.
#[derive(Debug, Clone)]
pub enum StepError<Err> {
    Kernel(Error),
    Unhandled(crate::Failure<Err>),
}

impl<Err: std::fmt::Debug> std::fmt::Display for StepError<Err> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepError::Kernel(e) => write!(f, "{e}"),
            StepError::Unhandled(failure) => {
                write!(f, "unhandled event failure: {failure:?}")
            }
        }
    }
}

impl<Err: std::fmt::Debug> std::error::Error for StepError<Err> {}

impl<Err> From<Error> for StepError<Err> {
    fn from(e: Error) -> Self {
        StepError::Kernel(e)
    }
}
