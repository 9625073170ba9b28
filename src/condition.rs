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
use std::collections::HashMap;
use std::rc::Rc;

use crate::{Environment, Error, Event, EventId, EventValue, Failure};

type Outcome<T, Err> = Result<EventValue<T>, Failure<Err>>;

/// The and/or test a [`Condition`] evaluates over its children.
pub(crate) enum Predicate<T, Err> {
    AllOf,
    AnyOf,
    #[allow(dead_code)]
    Custom(Rc<dyn Fn(&[Event<T, Err>], &HashMap<EventId, Outcome<T, Err>>) -> bool>),
}

impl<T, Err> Predicate<T, Err> {
    fn evaluate(&self, children: &[Event<T, Err>], interim: &HashMap<EventId, Outcome<T, Err>>) -> bool {
        match self {
            Predicate::AllOf => children.len() == interim.len(),
            Predicate::AnyOf => !interim.is_empty() || children.is_empty(),
            Predicate::Custom(f) => f(children, interim),
        }
    }

    fn is_all_of(&self) -> bool {
        matches!(self, Predicate::AllOf)
    }

    fn is_any_of(&self) -> bool {
        matches!(self, Predicate::AnyOf)
    }
}

struct ConditionState<T, Err> {
    predicate: Predicate<T, Err>,
    children: Vec<Event<T, Err>>,
    /// Every value recorded so far for a completed child, success or
    /// failure, in the order children complete (not necessarily the
    /// order they were registered in).
    interim: HashMap<EventId, Outcome<T, Err>>,
}

/// A composite event that fires when an and/or predicate over its
/// children becomes true, or fails when a child fails.
///
/// On success its value is a flat map from leaf child id to that
/// child's own payload — nested conditions are resolved away.
pub struct Condition<T, Err> {
    event: Event<T, Err>,
    state: Rc<RefCell<ConditionState<T, Err>>>,
}

impl<T, Err> Clone for Condition<T, Err> {
    fn clone(&self) -> Self {
        Condition {
            event: self.event.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T, Err> std::ops::Deref for Condition<T, Err> {
    type Target = Event<T, Err>;
    fn deref(&self) -> &Event<T, Err> {
        &self.event
    }
}

impl<T, Err> From<Condition<T, Err>> for Event<T, Err> {
    fn from(c: Condition<T, Err>) -> Event<T, Err> {
        c.event
    }
}

impl<T: Clone + 'static, Err: Clone + 'static> Condition<T, Err> {
    pub fn all_of(env: &Environment<T, Err>, children: Vec<Event<T, Err>>) -> Result<Self, Error> {
        Self::new(env, Predicate::AllOf, children)
    }

    pub fn any_of(env: &Environment<T, Err>, children: Vec<Event<T, Err>>) -> Result<Self, Error> {
        Self::new(env, Predicate::AnyOf, children)
    }

    pub(crate) fn new(
        env: &Environment<T, Err>,
        predicate: Predicate<T, Err>,
        children: Vec<Event<T, Err>>,
    ) -> Result<Self, Error> {
        let event = Event::new(env);
        let state = Rc::new(RefCell::new(ConditionState {
            predicate,
            children: Vec::new(),
            interim: HashMap::new(),
        }));

        for child in children {
            Self::admit(&event, &state, child)?;
        }

        let state_for_collect = state.clone();
        event.add_callback(Box::new(move |fired: &Event<T, Err>| {
            Self::collect_values(fired, &state_for_collect);
        }))?;

        let already_satisfied = {
            let st = state.borrow();
            st.predicate.evaluate(&st.children, &st.interim)
        };
        if already_satisfied {
            event.succeed_composite(Vec::new())?;
        }

        Ok(Condition { event, state })
    }

    fn admit(
        cond_event: &Event<T, Err>,
        state: &Rc<RefCell<ConditionState<T, Err>>>,
        child: Event<T, Err>,
    ) -> Result<(), Error> {
        if !child.same_env(cond_event) {
            return Err(Error::EnvironmentMismatch);
        }
        if child.processed() {
            return Err(Error::ConditionChildAlreadyTriggered);
        }

        let cond_event = cond_event.clone();
        let state_for_check = state.clone();
        child.add_callback(Box::new(move |fired: &Event<T, Err>| {
            Self::check(&cond_event, &state_for_check, fired);
        }))?;

        state.borrow_mut().children.push(child);
        Ok(())
    }

    fn check(cond_event: &Event<T, Err>, state: &Rc<RefCell<ConditionState<T, Err>>>, child: &Event<T, Err>) {
        let outcome = child
            .value()
            .expect("a condition's _check callback only runs once its child has triggered");
        state.borrow_mut().interim.insert(child.id(), outcome.clone());

        if cond_event.triggered() {
            // Already resolved (e.g. a previous sibling already failed
            // the condition); still record interim for introspection,
            // but don't resolve again.
            return;
        }

        match outcome {
            Err(failure) => {
                child.mark_defused();
                let _ = cond_event.fail_with(failure);
            }
            Ok(_) => {
                let should_succeed = {
                    let st = state.borrow();
                    st.predicate.evaluate(&st.children, &st.interim)
                };
                if should_succeed {
                    let _ = cond_event.succeed_composite(Vec::new());
                }
            }
        }
    }

    /// Runs once, when the condition's own event is processed: flattens
    /// nested conditions' interim maps into a single leaf map.
    fn collect_values(cond_event: &Event<T, Err>, state: &Rc<RefCell<ConditionState<T, Err>>>) {
        if cond_event.is_ok() != Some(true) {
            return;
        }
        let st = state.borrow();
        let mut flat = Vec::with_capacity(st.children.len());
        for child in &st.children {
            match st.interim.get(&child.id()) {
                Some(Ok(EventValue::Composite(entries))) => flat.extend(entries.iter().cloned()),
                Some(Ok(value @ EventValue::Payload(_))) => flat.push((child.id(), value.clone())),
                _ => {}
            }
        }
        drop(st);
        cond_event.overwrite_success_value(EventValue::Composite(flat));
    }

    /// Merges `other`'s children into `self` if both are the same kind
    /// of composite (all-of/all-of or any-of/any-of); otherwise returns
    /// `Err` so the caller can fall back to the non-in-place `&`/`|`.
    fn merge(&mut self, other: Condition<T, Err>) -> Result<(), Error> {
        let other_children = {
            let st = other.state.borrow();
            st.children.clone()
        };
        for child in other_children {
            Self::admit(&self.event, &self.state, child)?;
        }
        Ok(())
    }

    pub fn into_event(self) -> Event<T, Err> {
        self.event
    }

    pub fn event(&self) -> Event<T, Err> {
        self.event.clone()
    }

    /// The children registered directly on this condition (not
    /// recursively flattened — use [`Event::value`] for the flattened
    /// leaf map once triggered).
    pub fn children(&self) -> Vec<Event<T, Err>> {
        self.state.borrow().children.clone()
    }
}

/// `A &= B`: merges `B`'s children into `A` if `A` is an all-of
/// condition; otherwise falls back to building a new all-of over
/// `[A, B]` (the non-in-place `&` semantics), per §4.3.
impl<T: Clone + 'static, Err: Clone + 'static> std::ops::BitAndAssign<Condition<T, Err>> for Condition<T, Err> {
    fn bitand_assign(&mut self, rhs: Condition<T, Err>) {
        let is_all_of = self.state.borrow().predicate.is_all_of();
        if is_all_of {
            self.merge(rhs)
                .expect("merging a condition's children failed: environment mismatch or already-triggered child");
        } else {
            let env = self.event.env();
            let combined = Condition::all_of(&env, vec![self.event.clone(), rhs.into_event()])
                .expect("building the fallback all-of condition failed");
            *self = combined;
        }
    }
}

/// `A |= B`: merges `B`'s children into `A` if `A` is an any-of
/// condition; otherwise falls back to building a new any-of over
/// `[A, B]`.
impl<T: Clone + 'static, Err: Clone + 'static> std::ops::BitOrAssign<Condition<T, Err>> for Condition<T, Err> {
    fn bitor_assign(&mut self, rhs: Condition<T, Err>) {
        let is_any_of = self.state.borrow().predicate.is_any_of();
        if is_any_of {
            self.merge(rhs)
                .expect("merging a condition's children failed: environment mismatch or already-triggered child");
        } else {
            let env = self.event.env();
            let combined = Condition::any_of(&env, vec![self.event.clone(), rhs.into_event()])
                .expect("building the fallback any-of condition failed");
            *self = combined;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Environment;

    #[test]
    fn and_assign_merges_same_kind_children_in_place() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let a0 = env.timeout(0.0, 0).unwrap().into_event();
        let a1 = env.timeout(1.0, 1).unwrap().into_event();
        let b0 = env.timeout(0.0, 0).unwrap().into_event();
        let b1 = env.timeout(1.0, 1).unwrap().into_event();

        let mut a = Condition::all_of(&env, vec![a0, a1]).unwrap();
        let b = Condition::all_of(&env, vec![b0, b1]).unwrap();
        a &= b;

        assert_eq!(a.children().len(), 4);
    }

    #[test]
    fn and_assign_on_mismatched_kind_falls_back_to_new_composite() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let a0 = env.timeout(0.0, 0).unwrap().into_event();
        let b0 = env.timeout(0.0, 0).unwrap().into_event();
        let b1 = env.timeout(1.0, 1).unwrap().into_event();

        let mut any = Condition::any_of(&env, vec![a0]).unwrap();
        let all = Condition::all_of(&env, vec![b0, b1]).unwrap();
        any &= all;

        // Falling back built a brand-new all-of over [any's old event, all's
        // event] rather than merging, so there are exactly two children: the
        // original any-of (now nested) and the all-of.
        assert_eq!(any.children().len(), 2);
    }

    #[test]
    fn admitting_an_already_processed_child_is_rejected() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let already_processed = env.timeout(0.0, 0).unwrap().into_event();
        env.step().unwrap();
        assert!(already_processed.processed());

        let err = Condition::all_of(&env, vec![already_processed]).unwrap_err();
        assert_eq!(err, Error::ConditionChildAlreadyTriggered);
    }

    #[test]
    fn admitting_a_triggered_but_not_yet_processed_child_succeeds() {
        let env: Environment<i64, String> = Environment::new(0.0);
        let pre_armed = env.timeout(0.0, 0).unwrap().into_event();
        assert!(pre_armed.triggered());
        assert!(!pre_armed.processed());

        let cond = Condition::all_of(&env, vec![pre_armed]).unwrap();
        env.run(crate::Until::Event(cond.event())).unwrap();
        assert_eq!(cond.event().value().unwrap().unwrap().entries().unwrap().len(), 1);
    }
}
