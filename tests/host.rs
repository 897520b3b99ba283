//! Driving the loop from a host: run-soon hook and cross-thread handle.
//!
//! Run with: cargo test --test host

use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;

use spark_event::{
    Component, ComponentType, PropSpec, Value, clear_integration, find_component, handle,
    has_pending, integrate, iter, reset_runtime,
};

fn counter_type() -> ComponentType {
    ComponentType::builder("Counter")
        .property("count", PropSpec::int(0).settable())
        .property("echo", PropSpec::int(0).settable())
        .action("bump", |this, _| {
            let n = this.get("count")?.as_int().unwrap_or(0);
            this.mutate("count", n + 1).map(drop)
        })
        // Copies `count` into `echo` through a second action round
        .reaction("mirror", &["count"], |this, events| {
            let last = events.last().and_then(|ev| ev.new_value()).cloned();
            this.invoke("set_echo", &[last.unwrap_or_default()])
        })
        .build()
        .unwrap()
}

fn setup() -> ComponentType {
    reset_runtime();
    clear_integration();
    counter_type()
}

#[test]
fn test_hook_driven_loop_settles() {
    let ty = setup();
    let requests = Rc::new(Cell::new(0));
    let hook_requests = requests.clone();
    integrate(move || hook_requests.set(hook_requests.get() + 1));

    let c = Component::new(&ty, vec![]).unwrap();
    assert_eq!(requests.get(), 1);
    c.invoke("bump", &[]).unwrap();
    // Already scheduled
    assert_eq!(requests.get(), 1);

    // A tiny host: one iteration per request
    let mut iterations = 0;
    while requests.get() > 0 {
        requests.set(requests.get() - 1);
        iter().unwrap();
        iterations += 1;
    }
    assert_eq!(iterations, 2);
    assert_eq!(c.get("count").unwrap(), Value::Int(1));
    assert_eq!(c.get("echo").unwrap(), Value::Int(1));
    assert!(!has_pending());
    clear_integration();
}

#[test]
fn test_remote_thread_drives_actions() {
    let ty = setup();
    let c = Component::new(&ty, vec![]).unwrap();
    iter().unwrap();

    let (wake_tx, wake_rx) = mpsc::channel::<()>();
    let loop_handle = handle();
    loop_handle.set_waker(move || {
        let _ = wake_tx.send(());
    });

    let id = c.id();
    let remote = loop_handle.clone();
    thread::spawn(move || {
        for _ in 0..5 {
            let id = id.clone();
            remote.call_soon(move || {
                if let Some(c) = find_component(&id) {
                    let _ = c.invoke("bump", &[]);
                }
            });
        }
    })
    .join()
    .unwrap();

    let mut wakes = 0;
    while wake_rx.try_recv().is_ok() {
        wakes += 1;
        iter().unwrap();
    }
    assert_eq!(wakes, 5);
    assert_eq!(c.get("count").unwrap(), Value::Int(5));

    // The mirror action was queued by the reaction phase
    iter().unwrap();
    assert_eq!(c.get("echo").unwrap(), Value::Int(5));
    loop_handle.clear_waker();
}
