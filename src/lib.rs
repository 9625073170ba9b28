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

//! A discrete-event simulation kernel in the shape of SimPy: a priority
//! queue of scheduled events drives cooperatively-scheduled *processes*
//! over a virtual time axis.
//!
//! # Simulation
//! A simulation is built around an [`Environment`], which owns the
//! virtual clock and the event queue. Processes are plain Rust closures
//! that suspend by yielding an [`Event`] (a [`Timeout`], another
//! [`Process`], or a composite [`Condition`]) and resume with either the
//! event's value or a thrown [`Failure`].
//!
//! ```
//! use simkernel::{Environment, Until};
//!
//! let env: Environment<i64, String> = Environment::new(0.0);
//! let env2 = env.clone();
//! let proc = env.process(move |cx| {
//!     let t = env2.timeout(5.0, 42).unwrap();
//!     let v = cx.wait(t)?;
//!     Ok(v.into_payload().unwrap())
//! });
//! env.run(Until::Forever).unwrap();
//! assert_eq!(env.now(), 5.0);
//! assert!(!proc.is_alive());
//! ```
//!
//! # Process
//! A [`Process`] is driven by a stackful coroutine; it suspends at
//! explicit `wait()` points and is resumed exactly once per target event.
//!
//! # Condition
//! [`Condition`] groups several events and fires once an and/or
//! predicate over them becomes true; `&`/`|` build new composites while
//! `&=`/`|=` merge into an existing same-kind composite in place.

mod condition;
mod environment;
mod error;
mod event;
mod process;
mod timeout;
mod value;

pub use condition::Condition;
pub use environment::{Environment, Priority, Until};
pub use error::{Error, StepError};
pub use event::Event;
pub use process::{Process, ProcessContext};
pub use timeout::Timeout;
pub use value::{EventValue, Failure, Interrupt};

/// Identifies an event for the lifetime of the simulation that created
/// it. Used as the key type in a [`Condition`]'s flattened result map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub(crate) fn new(raw: u64) -> Self {
        EventId(raw)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event#{}", self.0)
    }
}

/// Convenience for stopping the current routine with a return value:
/// `return simkernel::exit(value);` reads the same as a plain early
/// return but doubles as documentation at the call site.
pub fn exit<T, Err>(value: T) -> Result<T, Failure<Err>> {
    Ok(value)
}
