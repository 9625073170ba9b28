use simkernel::{Condition, Environment, Failure, StepError, Until};

fn sorted_payloads(value: &simkernel::EventValue<i64>) -> Vec<i64> {
    let mut values: Vec<i64> = value
        .entries()
        .expect("expected a composite Condition value")
        .iter()
        .map(|(_, v)| *v.payload().expect("leaf entries are plain payloads"))
        .collect();
    values.sort();
    values
}

/// All-of over ten timeouts with delays/values 0..9: the result map holds
/// every child and the clock lands on the latest delay.
#[test]
fn all_of_over_ten_timeouts() {
    let env: Environment<i64, String> = Environment::new(0.0);
    let children: Vec<_> = (0..10i64)
        .map(|i| env.timeout(i as f64, i).unwrap().into_event())
        .collect();
    let cond = Condition::all_of(&env, children).unwrap();

    env.run(Until::Event(cond.event())).unwrap();

    assert_eq!(env.now(), 9.0);
    let value = cond.event().value().unwrap().unwrap();
    assert_eq!(value.entries().unwrap().len(), 10);
    assert_eq!(sorted_payloads(&value), (0..10).collect::<Vec<_>>());
}

/// All-of with a failing child: a process that sleeps 2 then raises
/// short-circuits the condition at the process's completion time, before
/// the third (slower) timeout ever fires.
#[test]
fn all_of_with_a_failing_child() {
    let env: Environment<i64, String> = Environment::new(0.0);
    let env2 = env.clone();

    let t0 = env.timeout(1.0, 1).unwrap().into_event();
    let flaky = env.process(move |cx| {
        let nap = env2.timeout(2.0, 0).unwrap();
        cx.wait(nap)?;
        Err(Failure::Error("crashing".to_string()))
    });
    let t2 = env.timeout(3.0, 3).unwrap().into_event();

    let cond = Condition::all_of(&env, vec![t0, flaky.into(), t2]).unwrap();

    let result = env.run(Until::Event(cond.event()));
    assert_eq!(env.now(), 2.0);
    match result {
        Err(StepError::Unhandled(Failure::Error(msg))) => assert_eq!(msg, "crashing"),
        other => panic!("expected the condition's own unhandled failure, got {other:?}"),
    }
}

/// Any-of over ten timeouts resolves as soon as the earliest one fires,
/// with a result map containing only that child.
#[test]
fn any_of_over_ten_timeouts() {
    let env: Environment<i64, String> = Environment::new(0.0);
    let children: Vec<_> = (0..10i64)
        .map(|i| env.timeout(i as f64, i).unwrap().into_event())
        .collect();
    let cond = Condition::any_of(&env, children).unwrap();

    env.run(Until::Event(cond.event())).unwrap();

    assert_eq!(env.now(), 0.0);
    let value = cond.event().value().unwrap().unwrap();
    let entries = value.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(*entries[0].1.payload().unwrap(), 0);
}

/// `(t0 & t2) | t1` with delays 0,1,2 resolves at t=1 once t1 outraces the
/// still-pending and-of-two.
#[test]
fn nested_mixed_composite() {
    let env: Environment<i64, String> = Environment::new(0.0);
    let t0 = env.timeout(0.0, 0).unwrap().into_event();
    let t1 = env.timeout(1.0, 1).unwrap().into_event();
    let t2 = env.timeout(2.0, 2).unwrap().into_event();

    let combined = (t0 & t2) | t1;

    env.run(Until::Event(combined.clone())).unwrap();

    assert_eq!(env.now(), 1.0);
    let value = combined.value().unwrap().unwrap();
    assert_eq!(sorted_payloads(&value), vec![0, 1]);
}

/// `A &= B` merges `B`'s children into `A` directly rather than nesting:
/// the flattened result contains all four leaf values.
#[test]
fn chaining_flattens_merged_children() {
    let env: Environment<i64, String> = Environment::new(0.0);
    let a0 = env.timeout(0.0, 0).unwrap().into_event();
    let a1 = env.timeout(1.0, 1).unwrap().into_event();
    let b0 = env.timeout(0.0, 0).unwrap().into_event();
    let b1 = env.timeout(1.0, 1).unwrap().into_event();

    let mut a = Condition::all_of(&env, vec![a0, a1]).unwrap();
    let b = Condition::all_of(&env, vec![b0, b1]).unwrap();
    a &= b;

    env.run(Until::Event(a.event())).unwrap();

    let value = a.event().value().unwrap().unwrap();
    assert_eq!(sorted_payloads(&value), vec![0, 0, 1, 1]);
}

/// A result observed right after a Condition fires stays unchanged even
/// after the rest of the schedule (including the slower inner and-of-two
/// it raced against) plays out.
#[test]
fn results_are_immutable_after_later_completions() {
    let env: Environment<i64, String> = Environment::new(0.0);
    let t0 = env.timeout(0.0, 0).unwrap().into_event();
    let t1 = env.timeout(1.0, 1).unwrap().into_event();
    let t2 = env.timeout(2.0, 2).unwrap().into_event();

    let inner = t1 & t2;
    let cond = t0 | inner;

    env.run(Until::Event(cond.clone())).unwrap();
    assert_eq!(env.now(), 0.0);
    let snapshot = cond.value().unwrap().unwrap();
    assert_eq!(sorted_payloads(&snapshot), vec![0]);

    env.run(Until::Forever).unwrap();
    assert_eq!(env.now(), 2.0);

    let later = cond.value().unwrap().unwrap();
    assert_eq!(later, snapshot);
}

/// A process interrupted while waiting on a timeout observes the
/// interrupt instead of the timeout, and the superseded timeout firing
/// later (the run drains the whole schedule) does not wake it a second
/// time.
#[test]
fn interrupt_supersedes_the_current_target() {
    let env: Environment<String, String> = Environment::new(0.0);
    let env2 = env.clone();

    let proc = env.process(move |cx| {
        let long_nap = env2.timeout(10.0, "asleep".to_string()).unwrap();
        match cx.wait(long_nap) {
            Err(Failure::Interrupt(interrupt)) => Ok(interrupt.cause().cloned().unwrap_or_default()),
            Ok(_) => Ok("never interrupted".to_string()),
            Err(Failure::Error(e)) => Ok(e),
        }
    });

    proc.interrupt(Some("wake up".to_string())).unwrap();
    env.run(Until::Forever).unwrap();

    assert!(!proc.is_alive());
    assert_eq!(
        proc.event().value().unwrap().unwrap().into_payload().unwrap(),
        "wake up"
    );
}
