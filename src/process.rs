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
use std::rc::Rc;

use corosensei::{Coroutine, CoroutineResult, Yielder};

use crate::environment::Priority;
use crate::{Environment, Error, Event, EventValue, Failure, Interrupt};

/// What a process routine receives each time it is resumed: the outcome
/// of the event it last yielded. The very first invocation (driven by
/// the internal `Initialize` event) passes a throwaway `Ok` value that
/// the routine never observes directly — control only reaches user code
/// at or after its first `wait()` call.
type RoutineInput<T, Err> = Result<EventValue<T>, Failure<Err>>;
type RoutineYield<T, Err> = Event<T, Err>;
/// A routine's final outcome: `Ok` on normal return, `Err` on an
/// unhandled raise — exactly the two ways a Process's own termination
/// event can resolve.
type RoutineReturn<T, Err> = Result<T, Failure<Err>>;

/// Handed to a process routine on every invocation. The only suspension
/// point a routine has is [`ProcessContext::wait`]: yield an event,
/// block until it fires, and either receive its value or have its
/// failure raised back into the routine via the `?` operator.
pub struct ProcessContext<'y, T, Err> {
    yielder: &'y Yielder<RoutineInput<T, Err>, RoutineYield<T, Err>>,
}

impl<'y, T, Err> ProcessContext<'y, T, Err> {
    /// Suspends until `event` fires, returning its value on success or
    /// its failure (propagate with `?` to let it terminate the routine,
    /// or `match` on it to recover locally).
    pub fn wait(&self, event: impl Into<Event<T, Err>>) -> Result<EventValue<T>, Failure<Err>> {
        self.yielder.suspend(event.into())
    }
}

struct ProcessState<T, Err> {
    coroutine: Coroutine<RoutineInput<T, Err>, RoutineYield<T, Err>, RoutineReturn<T, Err>>,
    target: Option<Event<T, Err>>,
    target_token: Option<crate::event::CallbackToken>,
}

/// A coroutine-driven routine, also an [`Event`] that fires on its own
/// termination: waiters yield a `Process` to receive either its return
/// value (success) or its raised failure.
pub struct Process<T, Err> {
    event: Event<T, Err>,
    state: Rc<RefCell<ProcessState<T, Err>>>,
}

impl<T, Err> Clone for Process<T, Err> {
    fn clone(&self) -> Self {
        Process {
            event: self.event.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T, Err> std::ops::Deref for Process<T, Err> {
    type Target = Event<T, Err>;
    fn deref(&self) -> &Event<T, Err> {
        &self.event
    }
}

impl<T, Err> From<Process<T, Err>> for Event<T, Err> {
    fn from(p: Process<T, Err>) -> Event<T, Err> {
        p.event
    }
}

impl<T: Clone + 'static, Err: Clone + 'static> Process<T, Err> {
    pub(crate) fn new<F>(env: &Environment<T, Err>, routine: F) -> Process<T, Err>
    where
        F: FnOnce(ProcessContext<T, Err>) -> Result<T, Failure<Err>> + 'static,
    {
        let event = Event::new(env);
        let coroutine = Coroutine::new(move |yielder, _first: RoutineInput<T, Err>| {
            let cx = ProcessContext { yielder };
            routine(cx)
        });
        let state = Rc::new(RefCell::new(ProcessState {
            coroutine,
            target: None,
            target_token: None,
        }));

        // Initialize: an internal high-priority event that resumes a
        // freshly-created process at `now`, ahead of ordinary
        // same-instant events.
        let init = Event::new(env);
        {
            let proc_event = event.clone();
            let proc_state = state.clone();
            init.add_callback(Box::new(move |fired: &Event<T, Err>| {
                resume(&proc_event, &proc_state, fired);
            }))
            .expect("a fresh event's callback list is always open");
        }
        init.resolve(Ok(EventValue::Composite(Vec::new())), Priority::High, 0.0)
            .expect("a fresh event can always be scheduled for the first time");

        log::trace!("process {} created", event.id());
        Process { event, state }
    }

    /// `true` until the process's own termination event has triggered.
    pub fn is_alive(&self) -> bool {
        !self.event.triggered()
    }

    /// The event this process is currently suspended on. `None` if it
    /// hasn't started yet, just terminated, or was just interrupted and
    /// hasn't yielded a new target.
    pub fn target(&self) -> Option<Event<T, Err>> {
        self.state.borrow().target.clone()
    }

    /// Interrupts this process, optionally with a `cause`. Fails if the
    /// process has already terminated, or if the caller is the process
    /// itself (a process cannot interrupt itself).
    pub fn interrupt(&self, cause: Option<Err>) -> Result<(), Error> {
        if self.event.triggered() {
            return Err(Error::InterruptTerminatedProcess);
        }
        let env = self.event.env();
        if let Some(active) = env.active_process() {
            if active == self.event {
                return Err(Error::SelfInterrupt);
            }
        }

        let interrupt_event = Event::new(&env);
        {
            let proc_event = self.event.clone();
            let proc_state = self.state.clone();
            interrupt_event
                .add_callback(Box::new(move |fired: &Event<T, Err>| {
                    resume(&proc_event, &proc_state, fired);
                }))
                .expect("a fresh event's callback list is always open");
        }
        // Interrupts do not, by themselves, crash the simulation: they
        // are defused up front, before anything observes them.
        interrupt_event.mark_defused();
        interrupt_event
            .resolve(Err(Failure::Interrupt(Interrupt::new(cause))), Priority::High, 0.0)
            .expect("a fresh event can always be scheduled for the first time");

        log::debug!("process {} interrupted", self.event.id());
        Ok(())
    }

    pub fn into_event(self) -> Event<T, Err> {
        self.event
    }

    pub fn event(&self) -> Event<T, Err> {
        self.event.clone()
    }
}

/// The process driver: called whenever an event this process is
/// waiting on fires — its bootstrap `Initialize`, a forwarded
/// interrupt, or its ordinary yielded target.
fn resume<T: Clone + 'static, Err: Clone + 'static>(
    proc_event: &Event<T, Err>,
    state: &Rc<RefCell<ProcessState<T, Err>>>,
    delivered: &Event<T, Err>,
) {
    // 1. Ignore dead processes: multiple concurrently-scheduled
    // interrupts can cause redundant resumes after termination.
    if proc_event.triggered() {
        return;
    }

    // 2. If the delivered event isn't the recorded target (an interrupt
    // arriving while waiting on something else), drop this process's
    // stale registration so that original target doesn't resume it again.
    {
        let mut st = state.borrow_mut();
        if let Some(stale) = st.target.take() {
            if &stale != delivered {
                if let Some(token) = st.target_token.take() {
                    stale.remove_callback(token);
                }
            } else {
                st.target_token = None;
            }
        }
    }

    // 3. Mark this process active for the duration of the driver loop.
    let env = proc_event.env();
    env.set_active_process(Some(proc_event.clone()));

    let mut event = delivered.clone();
    let mut outcome = event
        .value()
        .expect("a callback only runs once its event has triggered");

    let final_target = loop {
        if outcome.is_err() {
            // The routine has no choice but to handle the failed event
            // (or fail itself); either way it is now defused.
            event.mark_defused();
        }

        let step_result = state.borrow_mut().coroutine.resume(outcome);

        match step_result {
            CoroutineResult::Return(result) => {
                match result {
                    Ok(value) => {
                        let _ = proc_event.succeed(value);
                    }
                    Err(failure) => {
                        let _ = proc_event.fail_with(failure);
                    }
                }
                break None;
            }
            CoroutineResult::Yield(next_event) => {
                let proc_event2 = proc_event.clone();
                let state2 = state.clone();
                let registration = next_event.add_callback(Box::new(move |fired: &Event<T, Err>| {
                    resume(&proc_event2, &state2, fired);
                }));
                match registration {
                    Ok(token) => {
                        state.borrow_mut().target_token = Some(token);
                        break Some(next_event);
                    }
                    Err(_) => {
                        // The yielded event is already processed (e.g.
                        // re-yielding something that already fired and
                        // closed). Feed its value straight back in
                        // without suspending.
                        event = next_event;
                        outcome = event
                            .value()
                            .expect("an already-processed event always has a value");
                        continue;
                    }
                }
            }
        }
    };

    state.borrow_mut().target = final_target;
    env.set_active_process(None); // 5. clear active-process
}
