use std::cell::RefCell;
use std::rc::Rc;

use persona_host_core::{EventBus, HostError, LISTENER_ERROR_EVENT};
use serde_json::json;

#[test]
fn listeners_run_in_subscription_order() {
    let bus = EventBus::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    for tag in ["a", "b", "c"] {
        let l = Rc::clone(&log);
        bus.subscribe("greet", move |ev| {
            l.borrow_mut().push(format!("{tag}:{}", ev.payload["who"]));
            Ok(())
        });
    }
    let report = bus.emit("host", "greet", json!({ "who": "world" }));
    assert_eq!(report.delivered, 3);
    assert_eq!(
        *log.borrow(),
        vec![
            "a:\"world\"".to_string(),
            "b:\"world\"".to_string(),
            "c:\"world\"".to_string()
        ]
    );
}

#[test]
fn failing_listener_does_not_stop_the_others() {
    let bus = EventBus::new();
    let hits = Rc::new(RefCell::new(Vec::new()));
    let errors = Rc::new(RefCell::new(0));

    let h = Rc::clone(&hits);
    bus.subscribe("tick", move |_| {
        h.borrow_mut().push("first");
        Ok(())
    });
    bus.subscribe("tick", |_| Err(HostError::upstream("listener broke")));
    let h = Rc::clone(&hits);
    bus.subscribe("tick", move |_| {
        h.borrow_mut().push("third");
        Ok(())
    });
    let e = Rc::clone(&errors);
    bus.subscribe(LISTENER_ERROR_EVENT, move |ev| {
        assert_eq!(ev.payload["event"], "tick");
        *e.borrow_mut() += 1;
        Ok(())
    });

    let report = bus.emit("host", "tick", json!(null));
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(*hits.borrow(), vec!["first", "third"]);
    assert_eq!(*errors.borrow(), 1);
}

#[test]
fn subscriptions_made_during_emit_wait_for_the_next_emit() {
    let bus = EventBus::new();
    let late_hits = Rc::new(RefCell::new(0));

    let bus2 = bus.clone();
    let lh = Rc::clone(&late_hits);
    bus.subscribe("ping", move |_| {
        let lh = Rc::clone(&lh);
        bus2.subscribe("ping", move |_| {
            *lh.borrow_mut() += 1;
            Ok(())
        });
        Ok(())
    });

    bus.emit("host", "ping", json!(null));
    assert_eq!(*late_hits.borrow(), 0, "new listener must not see the current emit");
    bus.emit("host", "ping", json!(null));
    assert_eq!(*late_hits.borrow(), 1);
}

#[test]
fn unsubscribing_during_emit_keeps_the_snapshot() {
    let bus = EventBus::new();
    let second_hits = Rc::new(RefCell::new(0));
    let second_handle = Rc::new(RefCell::new(None));

    let bus2 = bus.clone();
    let sh = Rc::clone(&second_handle);
    bus.subscribe("ping", move |_| {
        if let Some(handle) = sh.borrow_mut().take() {
            bus2.unsubscribe(&handle);
        }
        Ok(())
    });
    let hits = Rc::clone(&second_hits);
    let handle = bus.subscribe("ping", move |_| {
        *hits.borrow_mut() += 1;
        Ok(())
    });
    *second_handle.borrow_mut() = Some(handle);

    bus.emit("host", "ping", json!(null));
    assert_eq!(*second_hits.borrow(), 1, "removed listener still runs for the captured emit");
    bus.emit("host", "ping", json!(null));
    assert_eq!(*second_hits.borrow(), 1);
}

#[test]
fn separate_buses_do_not_leak() {
    let a = EventBus::new();
    let b = EventBus::new();
    let hits = Rc::new(RefCell::new(0));
    let h = Rc::clone(&hits);
    a.subscribe("x", move |_| {
        *h.borrow_mut() += 1;
        Ok(())
    });
    b.emit("host", "x", json!(null));
    assert_eq!(*hits.borrow(), 0);
    a.emit("host", "x", json!(null));
    assert_eq!(*hits.borrow(), 1);
}
