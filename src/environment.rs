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

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::process::ProcessContext;
use crate::{Condition, Error, Event, EventId, EventValue, Failure, Process, StepError, Timeout};

/// Relative ordering of same-instant events. Lower fires first: an
/// `Initialize` or `Interrupt` jumps ahead of ordinary events, which in
/// turn jump ahead of `Timeout`s scheduled for the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High,
    Default,
    Low,
}

struct ScheduledEvent<T, Err> {
    time: f64,
    priority: Priority,
    seq: u64,
    event: Event<T, Err>,
}

impl<T, Err> PartialEq for ScheduledEvent<T, Err> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.priority == other.priority && self.seq == other.seq
    }
}
impl<T, Err> Eq for ScheduledEvent<T, Err> {}

impl<T, Err> PartialOrd for ScheduledEvent<T, Err> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, Err> Ord for ScheduledEvent<T, Err> {
    /// Reversed so a max-heap ([`BinaryHeap`]) pops the earliest
    /// `(time, priority, seq)` first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .partial_cmp(&self.time)
            .expect("simulation time must never be NaN")
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub(crate) struct EnvironmentInner<T, Err> {
    now: f64,
    queue: BinaryHeap<ScheduledEvent<T, Err>>,
    next_event_id: u64,
    next_seq: u64,
    active_process: Option<Event<T, Err>>,
}

/// The clock, event queue and scheduler driving a single simulation.
///
/// `T` is the payload type carried by successful events; `Err` is the
/// domain error type carried by failed ones. An `Environment` is a
/// cheap `Rc`-backed handle — cloning it shares the same underlying
/// queue and clock.
pub struct Environment<T, Err> {
    pub(crate) inner: Rc<RefCell<EnvironmentInner<T, Err>>>,
}

impl<T, Err> Clone for Environment<T, Err> {
    fn clone(&self) -> Self {
        Environment {
            inner: self.inner.clone(),
        }
    }
}

impl<T, Err> Environment<T, Err> {
    /// Creates a new, empty environment with its clock starting at
    /// `initial_time`.
    pub fn new(initial_time: f64) -> Self {
        Environment {
            inner: Rc::new(RefCell::new(EnvironmentInner {
                now: initial_time,
                queue: BinaryHeap::new(),
                next_event_id: 0,
                next_seq: 0,
                active_process: None,
            })),
        }
    }

    pub fn now(&self) -> f64 {
        self.inner.borrow().now
    }

    /// The time of the next scheduled event, if any, without processing it.
    pub fn peek(&self) -> Option<f64> {
        self.inner.borrow().queue.peek().map(|s| s.time)
    }

    pub(crate) fn next_event_id(&self) -> EventId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_event_id;
        inner.next_event_id += 1;
        EventId::new(id)
    }

    pub(crate) fn schedule(&self, event: Event<T, Err>, priority: Priority, delay: f64) {
        let mut inner = self.inner.borrow_mut();
        let time = inner.now + delay;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.queue.push(ScheduledEvent {
            time,
            priority,
            seq,
            event,
        });
    }

    pub(crate) fn active_process(&self) -> Option<Event<T, Err>> {
        self.inner.borrow().active_process.clone()
    }

    pub(crate) fn set_active_process(&self, proc: Option<Event<T, Err>>) {
        self.inner.borrow_mut().active_process = proc;
    }
}

impl<T: Default, Err> Default for Environment<T, Err> {
    fn default() -> Self {
        Environment::new(0.0)
    }
}

/// What [`Environment::run`] should stop at.
pub enum Until<T, Err> {
    /// Run until the schedule is empty.
    Forever,
    /// Run until the clock reaches `at`, which must be strictly after
    /// the current time.
    Time(f64),
    /// Run until `event` fires, returning its outcome.
    Event(Event<T, Err>),
}

impl<T, Err> From<Event<T, Err>> for Until<T, Err> {
    fn from(event: Event<T, Err>) -> Self {
        Until::Event(event)
    }
}

impl<T: Clone + 'static, Err: Clone + 'static> Environment<T, Err> {
    pub fn process<F>(&self, routine: F) -> Process<T, Err>
    where
        F: FnOnce(ProcessContext<T, Err>) -> Result<T, Failure<Err>> + 'static,
    {
        Process::new(self, routine)
    }

    pub fn timeout(&self, delay: f64, value: T) -> Result<Timeout<T, Err>, Error> {
        Timeout::new(self, delay, value)
    }

    /// A bare, unresolved event. Useful for signals the caller itself
    /// will `succeed`/`fail` directly rather than scheduling through one
    /// of the other factories.
    pub fn event(&self) -> Event<T, Err> {
        Event::new(self)
    }

    /// Alias of [`Environment::event`].
    pub fn suspend(&self) -> Event<T, Err> {
        self.event()
    }

    pub fn all_of(&self, children: Vec<Event<T, Err>>) -> Result<Condition<T, Err>, Error> {
        Condition::all_of(self, children)
    }

    pub fn any_of(&self, children: Vec<Event<T, Err>>) -> Result<Condition<T, Err>, Error> {
        Condition::any_of(self, children)
    }

    /// Pops and processes the single earliest-scheduled event: advances
    /// the clock to its time, runs its callbacks, then — unless it was
    /// defused by one of those callbacks — surfaces an unhandled
    /// failure as [`StepError::Unhandled`].
    pub fn step(&self) -> Result<(), StepError<Err>> {
        let scheduled = {
            let mut inner = self.inner.borrow_mut();
            match inner.queue.pop() {
                Some(s) => s,
                None => return Err(StepError::Kernel(Error::EmptySchedule)),
            }
        };
        {
            let mut inner = self.inner.borrow_mut();
            inner.now = scheduled.time;
        }
        let event = scheduled.event;
        event.run_callbacks();
        if !event.defused() {
            if let Ok(Err(failure)) = event.value() {
                return Err(StepError::Unhandled(failure));
            }
        }
        Ok(())
    }

    /// Steps the simulation until `until` is satisfied.
    ///
    /// A numeric [`Until::Time`] bound is modeled internally as a
    /// high-priority marker event competing in the same queue, so a
    /// plain time bound stops the clock exactly at that instant even if
    /// no other event is scheduled there. Either way, stopping is driven
    /// by a callback appended to the target event rather than by
    /// polling `triggered()`: a fresh event is already `triggered()` the
    /// instant it's resolved, well before it's actually dequeued and
    /// processed, so polling ahead of `step()` would return before the
    /// target's own callbacks — including a [`Condition`]'s value
    /// flattening — have run.
    pub fn run(&self, until: Until<T, Err>) -> Result<Option<EventValue<T>>, StepError<Err>> {
        let (target, surface_value) = match until {
            Until::Forever => (None, false),
            Until::Time(at) => {
                let now = self.now();
                if at <= now {
                    return Err(StepError::Kernel(Error::UntilNotAfterNow { at, now }));
                }
                let marker = Event::new(self);
                marker.resolve(Ok(EventValue::Composite(Vec::new())), Priority::High, at - now)?;
                (Some(marker), false)
            }
            Until::Event(event) => (Some(event), true),
        };

        let stopped = Rc::new(Cell::new(false));
        if let Some(target) = &target {
            if target.processed() {
                // Already fully processed before `run` was even called
                // (e.g. the caller re-passed an event from an earlier
                // run): there's nothing left to wait for.
                stopped.set(true);
            } else {
                let flag = stopped.clone();
                target
                    .add_callback(Box::new(move |_| flag.set(true)))
                    .expect("a not-yet-processed event's callback list is open");
            }
        }

        loop {
            if stopped.get() {
                break;
            }
            match self.step() {
                Ok(()) => continue,
                Err(StepError::Kernel(Error::EmptySchedule)) if target.is_none() => return Ok(None),
                Err(e) => return Err(e),
            }
        }

        if !surface_value {
            return Ok(None);
        }
        match target {
            None => Ok(None),
            Some(target) => match target.value() {
                Ok(Ok(value)) => Ok(Some(value)),
                Ok(Err(failure)) => Err(StepError::Unhandled(failure)),
                Err(_) => unreachable!("the run loop only exits once `target` has been processed"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Event;
    use std::cell::RefCell;

    #[test]
    fn events_dispatch_in_time_priority_sequence_order() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let order = Rc::new(RefCell::new(Vec::new()));

        let a = Event::new(&env);
        let b = Event::new(&env);
        let c = Event::new(&env);

        for (label, event, priority) in [
            ("b-default", &b, Priority::Default),
            ("a-high", &a, Priority::High),
            ("c-low", &c, Priority::Low),
        ] {
            let order = order.clone();
            event
                .add_callback(Box::new(move |_| order.borrow_mut().push(label)))
                .unwrap();
            event
                .resolve(Ok(EventValue::Payload(0)), priority, 0.0)
                .unwrap();
        }

        while env.step().is_ok() {}

        assert_eq!(*order.borrow(), vec!["a-high", "b-default", "c-low"]);
    }

    #[test]
    fn now_is_non_decreasing_and_advances_to_the_next_event() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let e1 = Event::new(&env);
        let e2 = Event::new(&env);
        e1.resolve(Ok(EventValue::Payload(0)), Priority::Default, 3.0).unwrap();
        e2.resolve(Ok(EventValue::Payload(0)), Priority::Default, 1.0).unwrap();

        assert_eq!(env.now(), 0.0);
        env.step().unwrap();
        assert_eq!(env.now(), 1.0);
        env.step().unwrap();
        assert_eq!(env.now(), 3.0);
    }

    #[test]
    fn run_until_time_rejects_a_non_future_bound() {
        let env: Environment<i64, String> = Environment::new(5.0);
        let err = env.run(Until::Time(5.0)).unwrap_err();
        match err {
            StepError::Kernel(Error::UntilNotAfterNow { at, now }) => {
                assert_eq!(at, 5.0);
                assert_eq!(now, 5.0);
            }
            other => panic!("expected UntilNotAfterNow, got {:?}", other),
        }
    }

    #[test]
    fn run_until_time_advances_the_clock_with_nothing_else_scheduled() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let result = env.run(Until::Time(5.0)).unwrap();
        assert!(result.is_none());
        assert_eq!(env.now(), 5.0);
    }

    #[test]
    fn run_until_event_waits_for_the_target_to_be_processed_not_just_triggered() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let e = Event::new(&env);
        e.resolve(Ok(EventValue::Payload(9)), Priority::Default, 4.0).unwrap();

        let result = env.run(Until::Event(e)).unwrap();
        assert_eq!(env.now(), 4.0);
        assert_eq!(result.unwrap().into_payload().unwrap(), 9);
    }

    #[test]
    fn run_forever_drains_the_queue_and_returns_none() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let e = Event::new(&env);
        e.resolve(Ok(EventValue::Payload(1)), Priority::Default, 2.0).unwrap();

        let result = env.run(Until::Forever).unwrap();
        assert!(result.is_none());
        assert_eq!(env.now(), 2.0);
    }
}
