//! Ordering, serialization and detachment of event delivery

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use common::*;
use rvoip_call_bridge::{BridgeConfig, CallEvent, CallEventSink, EngineState};

fn fault(code: i32, message: String) -> CallEvent {
    CallEvent::Error { code, message }
}

/// Sink that holds every delivery until released
#[derive(Default)]
struct GateSink {
    open: AtomicBool,
    entered: AtomicUsize,
    events: Mutex<Vec<CallEvent>>,
}

impl GateSink {
    fn release(&self) {
        self.open.store(true, Ordering::SeqCst);
    }
}

impl CallEventSink for GateSink {
    fn on_event(&self, event: CallEvent) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(event);
        while !self.open.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Sink that fails the test if two deliveries overlap
#[derive(Default)]
struct ExclusiveSink {
    busy: AtomicBool,
    overlaps: AtomicUsize,
    events: Mutex<Vec<CallEvent>>,
}

impl CallEventSink for ExclusiveSink {
    fn on_event(&self, event: CallEvent) {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.events.lock().push(event);
        thread::yield_now();
        self.busy.store(false, Ordering::SeqCst);
    }
}

#[test]
fn test_emission_order_preserved_across_threads() {
    let (bridge, _engine, sink) = ready_bridge();

    // E1, E2, E3 each emitted by a different thread, in that order
    let (tx1, rx1) = mpsc::channel();
    let (tx2, rx2) = mpsc::channel();
    let e1 = bridge.engine_events();
    let e2 = bridge.engine_events();
    let e3 = bridge.engine_events();

    let t1 = thread::spawn(move || {
        e1.emit(fault(1, "E1".to_string()));
        tx1.send(()).unwrap();
    });
    let t2 = thread::spawn(move || {
        rx1.recv().unwrap();
        e2.emit(fault(2, "E2".to_string()));
        tx2.send(()).unwrap();
    });
    let t3 = thread::spawn(move || {
        rx2.recv().unwrap();
        e3.emit(fault(3, "E3".to_string()));
    });
    for t in [t1, t2, t3] {
        t.join().unwrap();
    }

    assert!(sink.wait_for(4, WAIT));
    let codes: Vec<Option<i32>> = sink.events()[1..].iter().map(|e| e.code()).collect();
    assert_eq!(codes, vec![Some(1), Some(2), Some(3)]);
}

#[test]
fn test_concurrent_producers_are_serialized() {
    let (bridge, _engine, _recording) = ready_bridge();
    let sink = Arc::new(ExclusiveSink::default());
    bridge.set_sink(sink.clone());

    const PRODUCERS: i32 = 4;
    const PER_PRODUCER: i32 = 200;

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let events = bridge.engine_events();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    events.emit(fault(producer, i.to_string()));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = (PRODUCERS * PER_PRODUCER) as usize;
    let deadline = std::time::Instant::now() + WAIT;
    while sink.events.lock().len() < total && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }

    let events = sink.events.lock().clone();
    assert_eq!(events.len(), total);
    assert_eq!(sink.overlaps.load(Ordering::SeqCst), 0);

    // Each producer's events arrive in the order it emitted them
    for producer in 0..PRODUCERS {
        let sequence: Vec<i32> = events
            .iter()
            .filter_map(|e| match e {
                CallEvent::Error { code, message } if *code == producer => message.parse().ok(),
                _ => None,
            })
            .collect();
        assert_eq!(sequence, (0..PER_PRODUCER).collect::<Vec<_>>());
    }
}

#[test]
fn test_no_delivery_after_clear() {
    let (bridge, _engine, _recording) = ready_bridge();
    let gate = Arc::new(GateSink::default());
    bridge.set_sink(gate.clone());

    let events = bridge.engine_events();
    events.emit(fault(1, "in flight".to_string()));
    while gate.entered.load(Ordering::SeqCst) == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    events.emit(fault(2, "queued".to_string()));
    events.emit(fault(3, "queued".to_string()));

    let releaser = {
        let gate = gate.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            gate.release();
        })
    };
    assert!(bridge.clear_sink());
    releaser.join().unwrap();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(gate.entered.load(Ordering::SeqCst), 1);
    assert!(!bridge.has_sink());
    assert_eq!(bridge.dispatch_stats().discarded, 2);
}

#[test]
fn test_new_sink_only_sees_events_after_it_was_set() {
    let (bridge, _engine, first) = ready_bridge();
    assert!(bridge.clear_sink());

    bridge.engine_events().emit(fault(1, "unobserved".to_string()));
    let second = RecordingSink::new();
    bridge.set_sink(second.clone());
    bridge.engine_events().emit(fault(2, "observed".to_string()));

    assert!(second.wait_for(1, WAIT));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(second.events(), vec![fault(2, "observed".to_string())]);
    assert_eq!(first.names(), vec!["engineInitResult"]);
}

#[test]
fn test_clear_without_sink_is_noop() {
    let (bridge, _engine, _sink) = new_bridge();
    assert!(bridge.clear_sink());
    assert!(!bridge.clear_sink());
    assert!(!bridge.clear_sink());
}

#[test]
fn test_clear_times_out_on_stuck_sink() {
    let config = BridgeConfig::default().with_clear_timeout_ms(20);
    let (bridge, _engine, _recording) = new_bridge_with(config);
    let gate = Arc::new(GateSink::default());
    bridge.set_sink(gate.clone());

    bridge.engine_events().emit(fault(1, "stuck".to_string()));
    while gate.entered.load(Ordering::SeqCst) == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    bridge.engine_events().emit(fault(2, "never delivered".to_string()));

    let started = std::time::Instant::now();
    assert!(bridge.clear_sink());
    assert!(started.elapsed() < Duration::from_secs(1));

    gate.release();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(gate.entered.load(Ordering::SeqCst), 1);
}

/// Sink that detaches itself on the first error event
struct DetachOnError {
    bridge: Mutex<Option<rvoip_call_bridge::CallBridge>>,
    seen: AtomicUsize,
}

impl CallEventSink for DetachOnError {
    fn on_error(&self, _code: i32, _message: &str) {
        self.seen.fetch_add(1, Ordering::SeqCst);
        if let Some(bridge) = self.bridge.lock().take() {
            bridge.clear_sink();
        }
    }
}

#[test]
fn test_sink_clearing_itself_does_not_deadlock() {
    let (bridge, _engine, _recording) = ready_bridge();
    let sink = Arc::new(DetachOnError {
        bridge: Mutex::new(Some(bridge.clone())),
        seen: AtomicUsize::new(0),
    });
    bridge.set_sink(sink.clone());

    let events = bridge.engine_events();
    events.emit(fault(1, "first".to_string()));
    events.emit(fault(2, "second".to_string()));

    let deadline = std::time::Instant::now() + WAIT;
    while bridge.has_sink() && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    thread::sleep(Duration::from_millis(20));
    assert!(!bridge.has_sink());
    assert_eq!(sink.seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_events_queued_before_destroy_are_delivered() {
    let (bridge, _engine, _recording) = joined_bridge(&["u2"]);
    let gate = Arc::new(GateSink::default());
    bridge.set_sink(gate.clone());

    let events = bridge.engine_events();
    events.emit(remote_left("u2", 0));
    bridge.destroy().unwrap();
    events.emit(CallEvent::EngineDestroyed);
    // Late fault after the engine is gone is absorbed
    events.emit(fault(9, "late".to_string()));
    assert_eq!(bridge.engine_state(), EngineState::Destroyed);

    gate.release();
    let deadline = std::time::Instant::now() + WAIT;
    while gate.events.lock().len() < 2 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    thread::sleep(Duration::from_millis(20));
    assert_eq!(
        *gate.events.lock(),
        vec![remote_left("u2", 0), CallEvent::EngineDestroyed]
    );
}

#[test]
fn test_full_queue_drops_and_counts() {
    let config = BridgeConfig::default().with_event_queue_capacity(2);
    let (bridge, _engine, _recording) = new_bridge_with(config);
    let gate = Arc::new(GateSink::default());
    bridge.set_sink(gate.clone());

    let events = bridge.engine_events();
    events.emit(fault(0, "held".to_string()));
    while gate.entered.load(Ordering::SeqCst) == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    for i in 1..=4 {
        events.emit(fault(i, "burst".to_string()));
    }

    let stats = bridge.dispatch_stats();
    assert_eq!(stats.published, 3);
    assert_eq!(stats.overflowed, 2);

    gate.release();
    let deadline = std::time::Instant::now() + WAIT;
    while bridge.dispatch_stats().delivered < 3 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    let codes: Vec<Option<i32>> = gate.events.lock().iter().map(|e| e.code()).collect();
    assert_eq!(codes, vec![Some(0), Some(1), Some(2)]);
}
