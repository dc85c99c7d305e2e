#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use pretty_assertions::assert_eq;

use super::*;
use crate::print_handler::silent_handler;

fn runtime() -> Arc<Runtime> {
    Runtime::new(RuntimeConfig::default(), silent_handler())
}

fn main_waiter(rt: &Arc<Runtime>) -> Arc<Waiter> {
    let w = rt.new_waiter();
    rt.set_main(&w);
    w
}

fn panic_kind(unwind: Unwind) -> PanicKind {
    match unwind {
        Unwind::Panic(p) | Unwind::Fatal(p) => p.kind,
        Unwind::Exit => panic!("unexpected exit"),
    }
}

#[test]
fn buffered_channel_takes_cap_sends_without_blocking() {
    let rt = runtime();
    let w = main_waiter(&rt);
    let ch = Arc::new(Channel::new(3));
    for i in 0..3 {
        rt.send(Some(&ch), Value::Int(i), &w, true).unwrap();
    }
    assert_eq!(ch.len(), 3);
    assert_eq!(ch.cap(), 3);
}

#[test]
fn send_past_capacity_waits_for_receiver() {
    let rt = runtime();
    let w = main_waiter(&rt);
    let ch = Arc::new(Channel::new(1));
    rt.send(Some(&ch), Value::Int(1), &w, true).unwrap();

    let (rt2, ch2) = (Arc::clone(&rt), Arc::clone(&ch));
    let got = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&got);
    rt.spawn(move || {
        let gw = rt2.new_waiter();
        for _ in 0..2 {
            let v = rt2.recv(Some(&ch2), &gw, false).unwrap();
            sink.lock().push(v.unwrap());
        }
    })
    .unwrap();

    // Blocks until the goroutine drains the first value.
    rt.send(Some(&ch), Value::Int(2), &w, true).unwrap();
    rt.shutdown();
    assert_eq!(*got.lock(), vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn close_drains_buffer_before_reporting_closed() {
    let rt = runtime();
    let w = main_waiter(&rt);
    let ch = Arc::new(Channel::new(2));
    rt.send(Some(&ch), Value::from("a"), &w, true).unwrap();
    rt.send(Some(&ch), Value::from("b"), &w, true).unwrap();
    rt.close(Some(&ch)).unwrap();
    assert_eq!(rt.recv(Some(&ch), &w, true).unwrap(), Some(Value::from("a")));
    assert_eq!(rt.recv(Some(&ch), &w, true).unwrap(), Some(Value::from("b")));
    assert_eq!(rt.recv(Some(&ch), &w, true).unwrap(), None);
}

#[test]
fn closing_twice_and_sending_on_closed_panic() {
    let rt = runtime();
    let w = main_waiter(&rt);
    let ch = Arc::new(Channel::new(0));
    rt.close(Some(&ch)).unwrap();
    assert_eq!(
        panic_kind(rt.close(Some(&ch)).unwrap_err()),
        PanicKind::ClosedChannel
    );
    assert_eq!(
        panic_kind(rt.send(Some(&ch), Value::Int(1), &w, true).unwrap_err()),
        PanicKind::ClosedChannel
    );
    assert_eq!(panic_kind(rt.close(None).unwrap_err()), PanicKind::ClosedChannel);
}

#[test]
fn unbuffered_channel_rendezvous() {
    let rt = runtime();
    let w = main_waiter(&rt);
    let ch = Arc::new(Channel::new(0));
    let (rt2, ch2) = (Arc::clone(&rt), Arc::clone(&ch));
    rt.spawn(move || {
        let gw = rt2.new_waiter();
        rt2.send(Some(&ch2), Value::Int(42), &gw, false).unwrap();
    })
    .unwrap();
    assert_eq!(rt.recv(Some(&ch), &w, true).unwrap(), Some(Value::Int(42)));
    rt.shutdown();
}

#[test]
fn receive_with_no_other_task_is_a_deadlock() {
    let rt = runtime();
    let w = main_waiter(&rt);
    let ch = Arc::new(Channel::new(0));
    let err = rt.recv(Some(&ch), &w, true).unwrap_err();
    assert!(matches!(&err, Unwind::Fatal(p) if p.kind == PanicKind::Deadlock));
}

#[test]
fn nil_channel_blocks_until_deadlock() {
    let rt = runtime();
    let w = main_waiter(&rt);
    let err = rt.send(None, Value::Int(1), &w, true).unwrap_err();
    assert_eq!(panic_kind(err), PanicKind::Deadlock);
}

#[test]
fn select_completes_exactly_one_ready_case() {
    for _ in 0..50 {
        let rt = runtime();
        let w = main_waiter(&rt);
        let out = Arc::new(Channel::new(1));
        let inp = Arc::new(Channel::new(1));
        rt.send(Some(&inp), Value::Int(7), &w, true).unwrap();

        let arms = [
            SelectArm::Send {
                chan: Some(Arc::clone(&out)),
                value: Value::Int(1),
            },
            SelectArm::Recv {
                chan: Some(Arc::clone(&inp)),
            },
        ];
        match rt.select(&arms, false, &w, true).unwrap() {
            SelectResult::Sent(0) => {
                assert_eq!((out.len(), inp.len()), (1, 1));
            }
            SelectResult::Received { case: 1, value } => {
                assert_eq!(value, Some(Value::Int(7)));
                assert_eq!((out.len(), inp.len()), (0, 0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn select_runs_default_when_nothing_is_ready() {
    let rt = runtime();
    let w = main_waiter(&rt);
    let ch = Arc::new(Channel::new(0));
    let arms = [SelectArm::Recv { chan: Some(ch) }, SelectArm::Recv { chan: None }];
    assert!(matches!(
        rt.select(&arms, true, &w, true).unwrap(),
        SelectResult::Default
    ));
}

#[test]
fn parked_select_is_completed_by_a_sender() {
    let rt = runtime();
    let w = main_waiter(&rt);
    let a = Arc::new(Channel::new(0));
    let b = Arc::new(Channel::new(0));
    let (rt2, b2) = (Arc::clone(&rt), Arc::clone(&b));
    rt.spawn(move || {
        let gw = rt2.new_waiter();
        rt2.send(Some(&b2), Value::from("hi"), &gw, false).unwrap();
    })
    .unwrap();
    let arms = [
        SelectArm::Recv {
            chan: Some(Arc::clone(&a)),
        },
        SelectArm::Recv {
            chan: Some(Arc::clone(&b)),
        },
    ];
    match rt.select(&arms, false, &w, true).unwrap() {
        SelectResult::Received { case, value } => {
            assert_eq!(case, 1);
            assert_eq!(value, Some(Value::from("hi")));
        }
        other => panic!("unexpected {other:?}"),
    }
    rt.shutdown();
}

#[test]
fn goroutine_failure_reaches_parked_main() {
    let rt = runtime();
    let w = main_waiter(&rt);
    let ch = Arc::new(Channel::new(0));
    let rt2 = Arc::clone(&rt);
    rt.spawn(move || {
        rt2.fail(Box::new(Panic::new(Value::from("boom"), PanicKind::Explicit)));
    })
    .unwrap();
    let err = rt.recv(Some(&ch), &w, true).unwrap_err();
    match err {
        Unwind::Fatal(p) => assert_eq!(p.message, "boom"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(rt.stopped());
    rt.shutdown();
}
