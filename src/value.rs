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

use crate::EventId;

/// The resolved success value of an event.
///
/// Every event kind except [`crate::Condition`] produces [`EventValue::Payload`].
/// A Condition's value is a flat map from each leaf child's id to its own
/// payload, built by [`crate::Condition`]'s flattening pass; nesting is
/// resolved away before the value is ever observed.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue<T> {
    Payload(T),
    Composite(Vec<(EventId, EventValue<T>)>),
}

impl<T> EventValue<T> {
    /// Returns the plain payload, if this is not a composite (Condition) value.
    pub fn payload(&self) -> Option<&T> {
        match self {
            EventValue::Payload(v) => Some(v),
            EventValue::Composite(_) => None,
        }
    }

    pub fn into_payload(self) -> Option<T> {
        match self {
            EventValue::Payload(v) => Some(v),
            EventValue::Composite(_) => None,
        }
    }

    /// Returns the flattened leaf map, if this is a Condition's value.
    pub fn entries(&self) -> Option<&[(EventId, EventValue<T>)]> {
        match self {
            EventValue::Composite(entries) => Some(entries),
            EventValue::Payload(_) => None,
        }
    }
}

/// The cause carried by an [`Interrupt`]. Reuses the environment's `Err`
/// type rather than introducing a third generic parameter: interrupts are
/// exceptional-by-nature, so their cause naturally lives in the same space
/// as other domain failures.
#[derive(Debug, Clone)]
pub struct Interrupt<Err> {
    pub cause: Option<Err>,
}

impl<Err> Interrupt<Err> {
    pub fn new(cause: Option<Err>) -> Self {
        Interrupt { cause }
    }

    pub fn cause(&self) -> Option<&Err> {
        self.cause.as_ref()
    }
}

/// The failure payload of a failed event: either a plain domain error
/// (`Event::fail`, or a routine raising) or an interrupt delivered by
/// another process.
#[derive(Debug, Clone)]
pub enum Failure<Err> {
    Error(Err),
    Interrupt(Interrupt<Err>),
}

impl<Err> Failure<Err> {
    pub fn as_error(&self) -> Option<&Err> {
        match self {
            Failure::Error(e) => Some(e),
            Failure::Interrupt(_) => None,
        }
    }

    pub fn as_interrupt(&self) -> Option<&Interrupt<Err>> {
        match self {
            Failure::Interrupt(i) => Some(i),
            Failure::Error(_) => None,
        }
    }
}
