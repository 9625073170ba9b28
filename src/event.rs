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

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::environment::{EnvironmentInner, Priority};
use crate::{Condition, Environment, Error, EventId, EventValue, Failure};

pub(crate) type Callback<T, Err> = Box<dyn FnMut(&Event<T, Err>)>;

/// A handle returned by [`Event::add_callback`] that lets the holder
/// later retract its callback before the event has fired — used when a
/// process's target event is superseded by an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallbackToken(u64);

pub(crate) enum CallbackList<T, Err> {
    Open(Vec<(CallbackToken, Callback<T, Err>)>),
    Closed,
}

pub(crate) enum EventState<T, Err> {
    Pending,
    Done(Result<EventValue<T>, Failure<Err>>),
}

pub(crate) struct EventInner<T, Err> {
    pub(crate) id: EventId,
    pub(crate) env: Weak<RefCell<EnvironmentInner<T, Err>>>,
    pub(crate) state: EventState<T, Err>,
    pub(crate) callbacks: CallbackList<T, Err>,
    pub(crate) defused: bool,
    next_cb: u64,
}

/// A one-shot value carrier with a callback fan-out, processed at most
/// once at a scheduled `(time, priority)`.
///
/// Every other event kind in this crate ([`Timeout`](crate::Timeout),
/// [`Condition`], [`Process`](crate::Process)) is built on top of one of
/// these handles.
pub struct Event<T, Err> {
    pub(crate) inner: Rc<RefCell<EventInner<T, Err>>>,
}

impl<T, Err> Clone for Event<T, Err> {
    fn clone(&self) -> Self {
        Event {
            inner: self.inner.clone(),
        }
    }
}

impl<T, Err> PartialEq for Event<T, Err> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
impl<T, Err> Eq for Event<T, Err> {}

impl<T, Err> std::fmt::Debug for Event<T, Err> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event({})", self.id())
    }
}

impl<T, Err> Event<T, Err> {
    /// Creates a fresh pending event bound to `env`, registered under no
    /// callbacks yet.
    pub fn new(env: &Environment<T, Err>) -> Self {
        let id = env.next_event_id();
        Event {
            inner: Rc::new(RefCell::new(EventInner {
                id,
                env: Rc::downgrade(&env.inner),
                state: EventState::Pending,
                callbacks: CallbackList::Open(Vec::new()),
                defused: false,
                next_cb: 0,
            })),
        }
    }

    pub fn id(&self) -> EventId {
        self.inner.borrow().id
    }

    /// The environment this event lives in. Panics if the environment
    /// has already been dropped (events never outlive their environment
    /// in normal use).
    pub fn env(&self) -> Environment<T, Err> {
        let rc = self
            .inner
            .borrow()
            .env
            .upgrade()
            .expect("event outlived its environment");
        Environment { inner: rc }
    }

    pub fn triggered(&self) -> bool {
        !matches!(self.inner.borrow().state, EventState::Pending)
    }

    pub fn processed(&self) -> bool {
        matches!(self.inner.borrow().callbacks, CallbackList::Closed)
    }

    pub fn defused(&self) -> bool {
        self.inner.borrow().defused
    }

    pub(crate) fn mark_defused(&self) {
        self.inner.borrow_mut().defused = true;
    }

    pub(crate) fn is_ok(&self) -> Option<bool> {
        match &self.inner.borrow().state {
            EventState::Pending => None,
            EventState::Done(r) => Some(r.is_ok()),
        }
    }

    /// The event's resolved value: the outer `Result` is `Err` only if
    /// the event is still pending; the inner `Result` is the event's own
    /// success/failure outcome, returned uniformly regardless of
    /// whether a failure was defused (see §4.7).
    pub fn value(&self) -> Result<Result<EventValue<T>, Failure<Err>>, Error>
    where
        T: Clone,
        Err: Clone,
    {
        match &self.inner.borrow().state {
            EventState::Pending => Err(Error::ValueNotReady),
            EventState::Done(r) => Ok(r.clone()),
        }
    }

    /// Marks this event as successful with `value`, scheduling it at
    /// `now` with default priority.
    pub fn succeed(&self, value: T) -> Result<Self, Error> {
        self.resolve(Ok(EventValue::Payload(value)), Priority::Default, 0.0)
    }

    /// Marks this event as failed with `error`, scheduling it at `now`
    /// with default priority.
    pub fn fail(&self, error: Err) -> Result<Self, Error> {
        self.resolve(Err(Failure::Error(error)), Priority::Default, 0.0)
    }

    pub(crate) fn fail_with(&self, failure: Failure<Err>) -> Result<Self, Error> {
        self.resolve(Err(failure), Priority::Default, 0.0)
    }

    pub(crate) fn succeed_at(&self, value: T, priority: Priority, delay: f64) -> Result<Self, Error> {
        self.resolve(Ok(EventValue::Payload(value)), priority, delay)
    }

    /// Marks this event as successfully triggered with a (possibly
    /// placeholder) composite value. Used only by [`Condition`], whose
    /// final flattened map is filled in later via
    /// [`Event::overwrite_success_value`] once the condition itself is
    /// processed.
    pub(crate) fn succeed_composite(&self, entries: Vec<(EventId, EventValue<T>)>) -> Result<Self, Error> {
        self.resolve(Ok(EventValue::Composite(entries)), Priority::Default, 0.0)
    }

    /// Replaces the value of an already-succeeded event in place,
    /// without re-running the "already triggered" guard or rescheduling
    /// it. Used exclusively by [`Condition::collect_values`] to
    /// populate the final flattened result after the placeholder
    /// `succeed` call that drove scheduling.
    pub(crate) fn overwrite_success_value(&self, value: EventValue<T>) {
        let mut inner = self.inner.borrow_mut();
        if let EventState::Done(Ok(_)) = &inner.state {
            inner.state = EventState::Done(Ok(value));
        }
    }

    pub(crate) fn same_env(&self, other: &Event<T, Err>) -> bool {
        let a = self.inner.borrow().env.upgrade();
        let b = other.inner.borrow().env.upgrade();
        match (a, b) {
            (Some(a), Some(b)) => Rc::ptr_eq(&a, &b),
            _ => false,
        }
    }

    pub(crate) fn resolve(
        &self,
        outcome: Result<EventValue<T>, Failure<Err>>,
        priority: Priority,
        delay: f64,
    ) -> Result<Self, Error> {
        {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, EventState::Pending) {
                return Err(Error::AlreadyTriggered);
            }
            inner.state = EventState::Done(outcome);
        }
        let env = self.env();
        env.schedule(self.clone(), priority, delay);
        Ok(self.clone())
    }

    /// Copies `ok`/`value` from `other` and schedules self. Intended to
    /// be used directly as a callback that forwards another event's
    /// outcome.
    pub fn trigger(&self, other: &Event<T, Err>) -> Result<Self, Error>
    where
        T: Clone,
        Err: Clone,
    {
        let outcome = match &other.inner.borrow().state {
            EventState::Pending => return Err(Error::ValueNotReady),
            EventState::Done(r) => r.clone(),
        };
        self.resolve(outcome, Priority::Default, 0.0)
    }

    /// Registers `callback` to run (in registration order) when this
    /// event is processed. Fails if the event has already been
    /// processed (its callback list is closed).
    pub(crate) fn add_callback(&self, callback: Callback<T, Err>) -> Result<CallbackToken, Error> {
        let mut inner = self.inner.borrow_mut();
        match &mut inner.callbacks {
            CallbackList::Closed => Err(Error::AlreadyTriggered),
            CallbackList::Open(list) => {
                let token = CallbackToken(inner_next_cb(&mut inner.next_cb));
                list.push((token, callback));
                Ok(token)
            }
        }
    }

    /// Removes a previously-registered callback, if the event has not
    /// yet been processed. A no-op if it already fired (nothing to
    /// remove: the callback already ran or is about to as part of the
    /// in-flight `step()`).
    pub(crate) fn remove_callback(&self, token: CallbackToken) {
        if let CallbackList::Open(list) = &mut self.inner.borrow_mut().callbacks {
            list.retain(|(t, _)| *t != token);
        }
    }

    /// Runs all registered callbacks in order, then closes the list.
    /// Called exactly once, by `Environment::step`.
    pub(crate) fn run_callbacks(&self) {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            match std::mem::replace(&mut inner.callbacks, CallbackList::Closed) {
                CallbackList::Open(list) => list,
                CallbackList::Closed => Vec::new(),
            }
        };
        for (_, mut callback) in callbacks {
            callback(self);
        }
    }
}

fn inner_next_cb(counter: &mut u64) -> u64 {
    let id = *counter;
    *counter += 1;
    id
}

impl<T: Clone + 'static, Err: Clone + 'static> std::ops::BitAnd for Event<T, Err> {
    type Output = Event<T, Err>;

    /// `a & b` always builds a new all-of [`Condition`] over `[a, b]`.
    fn bitand(self, other: Event<T, Err>) -> Event<T, Err> {
        let env = self.env();
        Condition::all_of(&env, vec![self, other])
            .expect("mixing events from different environments, or an already-triggered event, in `&`")
            .into_event()
    }
}

impl<T: Clone + 'static, Err: Clone + 'static> std::ops::BitOr for Event<T, Err> {
    type Output = Event<T, Err>;

    /// `a | b` always builds a new any-of [`Condition`] over `[a, b]`.
    fn bitor(self, other: Event<T, Err>) -> Event<T, Err> {
        let env = self.env();
        Condition::any_of(&env, vec![self, other])
            .expect("mixing events from different environments, or an already-triggered event, in `|`")
            .into_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Environment;

    #[test]
    fn succeed_twice_is_an_error() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let event = Event::new(&env);
        assert!(event.succeed(1).is_ok());
        assert_eq!(event.succeed(2).unwrap_err(), Error::AlreadyTriggered);
    }

    #[test]
    fn fail_after_succeed_is_an_error() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let event = Event::new(&env);
        event.succeed(1).unwrap();
        assert_eq!(event.fail("boom".to_string()).unwrap_err(), Error::AlreadyTriggered);
    }

    #[test]
    fn value_is_not_ready_until_triggered() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let event = Event::new(&env);
        assert_eq!(event.value().unwrap_err(), Error::ValueNotReady);
        event.succeed(7).unwrap();
        assert_eq!(event.value().unwrap().unwrap().into_payload().unwrap(), 7);
    }
}
