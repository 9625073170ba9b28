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

use crate::environment::Priority;
use crate::{Environment, Error, Event, EventValue};

/// An event auto-scheduled at construction time with a non-negative
/// `delay`, firing successfully at `env.now() + delay` with low
/// priority — after ordinary events and interrupts scheduled for the
/// same instant.
pub struct Timeout<T, Err> {
    event: Event<T, Err>,
}

impl<T, Err> Timeout<T, Err> {
    pub(crate) fn new(env: &Environment<T, Err>, delay: f64, value: T) -> Result<Self, Error> {
        if delay < 0.0 {
            return Err(Error::NegativeDelay(delay));
        }
        let event = Event::new(env);
        // Born already-resolved: there is no separate pending window to
        // observe between construction and success.
        let resolved = event.succeed_at(value, Priority::Low, delay)?;
        log::trace!("scheduled timeout {} at delay {delay}", resolved.id());
        Ok(Timeout { event: resolved })
    }

    pub fn into_event(self) -> Event<T, Err> {
        self.event
    }

    pub fn event(&self) -> Event<T, Err> {
        self.event.clone()
    }

    pub fn value(&self) -> EventValue<T>
    where
        T: Clone,
        Err: Clone,
    {
        self.event
            .value()
            .expect("a Timeout is always already triggered")
            .expect("a Timeout never fails")
    }
}

impl<T, Err> From<Timeout<T, Err>> for Event<T, Err> {
    fn from(t: Timeout<T, Err>) -> Event<T, Err> {
        t.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Environment;

    #[test]
    fn negative_delay_is_rejected() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let err = Timeout::new(&env, -1.0, 0).unwrap_err();
        assert_eq!(err, Error::NegativeDelay(-1.0));
    }

    #[test]
    fn is_already_triggered_at_construction() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let t = Timeout::new(&env, 5.0, 42).unwrap();
        assert!(t.event().triggered());
        assert_eq!(t.value().into_payload().unwrap(), 42);
    }
}
