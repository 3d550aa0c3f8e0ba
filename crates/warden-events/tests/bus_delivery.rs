//! Integration tests for `warden-events` delivery guarantees.
//!
//! Exercises the bus through its public API only: priority ordering,
//! handler isolation, FIFO delivery within a type, and concurrent
//! publication alongside subscription churn.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use std::sync::{Arc, Mutex};
use std::thread;

use warden_events::{
    EventBus, HandlerError, PauseEvent, Priority, ShutdownEvent, Subscriber, TransportBridge,
};

fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    (Arc::clone(&log), log)
}

#[test]
fn delivery_order_is_high_normal_low_monitor() {
    let bus = EventBus::new();
    let (log, seen) = recorder();

    // Registered in scrambled order on purpose.
    for (label, priority) in [
        ("monitor", Priority::Monitor),
        ("low", Priority::Low),
        ("high", Priority::High),
        ("normal", Priority::Normal),
    ] {
        let log = Arc::clone(&log);
        bus.subscribe::<PauseEvent, _>(priority, move |_| {
            log.lock().unwrap().push(label.to_owned());
            Ok(())
        });
    }

    let report = bus.publish(PauseEvent::now());
    assert_eq!(report.delivered, 4);
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["high", "normal", "low", "monitor"]
    );
}

#[test]
fn failing_handler_does_not_block_later_handlers() {
    let bus = EventBus::new();
    let (log, seen) = recorder();

    bus.subscribe::<ShutdownEvent, _>(Priority::Normal, |_| {
        Err(HandlerError::failed("subscriber offline"))
    });
    bus.subscribe::<ShutdownEvent, _>(Priority::Normal, |_| panic!("subscriber crashed"));
    let after = Arc::clone(&log);
    bus.subscribe::<ShutdownEvent, _>(Priority::Normal, move |event| {
        after.lock().unwrap().push(event.reason.clone());
        Ok(())
    });

    let report = bus.publish(ShutdownEvent::now("drill"));
    assert_eq!(report.failed, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(*seen.lock().unwrap(), vec!["drill"]);
}

#[test]
fn back_to_back_events_arrive_in_publish_order() {
    let bus = EventBus::new();
    let (log, seen) = recorder();
    let sink = Arc::clone(&log);
    bus.subscribe::<ShutdownEvent, _>(Priority::Low, move |event| {
        sink.lock().unwrap().push(event.reason.clone());
        Ok(())
    });

    for n in 0..20 {
        let _ = bus.publish(ShutdownEvent::now(format!("r{n}")));
    }

    let expected: Vec<String> = (0..20).map(|n| format!("r{n}")).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
}

#[test]
fn concurrent_publishers_and_subscription_churn() {
    let bus = Arc::new(EventBus::new());
    let (log, seen) = recorder();
    let sink = Arc::clone(&log);
    bus.subscribe::<PauseEvent, _>(Priority::Normal, move |_| {
        sink.lock().unwrap().push("stable".to_owned());
        Ok(())
    });

    let publishers: Vec<_> = (0..4)
        .map(|_| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for _ in 0..50 {
                    let _ = bus.publish(PauseEvent::now());
                }
            })
        })
        .collect();

    let churn = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || {
            for _ in 0..50 {
                let id = bus.subscribe::<PauseEvent, _>(Priority::High, |_| Ok(()));
                assert!(bus.unsubscribe::<PauseEvent>(id));
            }
        })
    };

    for handle in publishers {
        handle.join().unwrap();
    }
    churn.join().unwrap();

    assert_eq!(seen.lock().unwrap().len(), 200);
    assert_eq!(bus.handler_count::<PauseEvent>(), 1);
}

#[tokio::test]
async fn transport_bridge_runs_after_every_other_handler() {
    let bus = EventBus::new();
    let (bridge, mut rx) = TransportBridge::new(8);
    let subs = Arc::clone(&bridge).attach(&bus);

    // A low-priority handler registered after the bridge still runs first,
    // so the queue is empty while it executes.
    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    let watcher = Arc::clone(&bridge);
    bus.subscribe::<PauseEvent, _>(Priority::Low, move |_| {
        *slot.lock().unwrap() = Some(watcher.forwarded());
        Ok(())
    });

    let _ = bus.publish_async(PauseEvent::now()).await;
    assert_eq!(*seen.lock().unwrap(), Some(0));
    assert_eq!(rx.recv().await.unwrap().name, "pause");

    assert_eq!(subs.detach(&bus), 9);
    let _ = bus.publish(PauseEvent::now());
    assert!(rx.try_recv().is_err());
}
