//! End-to-end lifecycle scenarios (S1-S6) and the round-trip/idempotence
//! properties from the testable-properties section of the design.

use procweave::{doc, downcast, Document, GraphError, NoopHooks, Processor, ProcessorBuilder, ProcessorConfig, ProcessorHooks, Status};
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

type HookResult = std::result::Result<(), Box<dyn Error + Send + Sync>>;

struct Generator {
    items: Vec<String>,
    idx: AtomicUsize,
}

impl ProcessorHooks for Generator {
    fn on_tick(&self, handle: &Processor) -> HookResult {
        let i = self.idx.fetch_add(1, Ordering::SeqCst);
        match self.items.get(i) {
            Some(item) => {
                if let Some(socket) = handle.socket("out") {
                    socket.send(doc(item.clone()));
                }
            }
            None => {
                let _ = handle.stop();
            }
        }
        Ok(())
    }
}

fn build_generator(name: &str, items: Vec<String>) -> Processor {
    ProcessorBuilder::new(
        "Generator",
        Generator {
            items,
            idx: AtomicUsize::new(0),
        },
        ProcessorConfig::named(name),
    )
    .generator(true)
    .tick_interval(Duration::from_millis(2))
    .socket("out", None)
    .build()
    .unwrap()
}

fn build_uppercase(name: &str) -> Processor {
    ProcessorBuilder::new("Uppercase", NoopHooks, ProcessorConfig::named(name))
        .socket("out", None)
        .connector(
            "in",
            None,
            16,
            Box::new(|d: Document, owner: &Processor| {
                if let Some(s) = downcast::<String>(&d) {
                    if let Some(socket) = owner.socket("out") {
                        socket.send(doc(s.to_uppercase()));
                    }
                }
                Ok(())
            }),
        )
        .build()
        .unwrap()
}

fn build_collector(name: &str, list: Arc<Mutex<Vec<String>>>) -> Processor {
    ProcessorBuilder::new("Collector", NoopHooks, ProcessorConfig::named(name))
        .connector(
            "in",
            None,
            16,
            Box::new(move |d: Document, _owner: &Processor| {
                if let Some(s) = downcast::<String>(&d) {
                    list.lock().unwrap().push(s.clone());
                }
                Ok(())
            }),
        )
        .build()
        .unwrap()
}

/// S1: A (generator) -> B (uppercase) -> C (collector).
#[test]
fn s1_linear_pipeline() {
    let items: Vec<String> = (0..10).map(|i| format!("x{i}")).collect();
    let a = build_generator("A", items);
    let b = build_uppercase("B");
    let list = Arc::new(Mutex::new(Vec::new()));
    let c = build_collector("C", Arc::clone(&list));

    Processor::subscribe(&a, None, &b, None).unwrap();
    Processor::subscribe(&b, None, &c, None).unwrap();

    a.start().unwrap();
    a.wait();
    b.wait();
    c.wait();

    let expected: Vec<String> = (0..10).map(|i| format!("X{i}")).collect();
    assert_eq!(*list.lock().unwrap(), expected);
    assert_eq!(a.status(), Status::Stopped);
    assert_eq!(b.status(), Status::Stopped);
    assert_eq!(c.status(), Status::Stopped);
    assert_eq!(a.runchan_count(), 0);
    assert_eq!(b.runchan_count(), 0);
    assert_eq!(c.runchan_count(), 0);
}

/// S2: A -> {B, C}, fan-out to two collectors.
#[test]
fn s2_fan_out() {
    let items = vec!["a".to_string(), "b".to_string()];
    let a = build_generator("A", items);
    let list_b = Arc::new(Mutex::new(Vec::new()));
    let b = build_collector("B", Arc::clone(&list_b));
    let list_c = Arc::new(Mutex::new(Vec::new()));
    let c = build_collector("C", Arc::clone(&list_c));

    Processor::subscribe(&a, None, &b, None).unwrap();
    Processor::subscribe(&a, None, &c, None).unwrap();

    a.start().unwrap();
    a.wait();
    b.wait();
    c.wait();

    assert_eq!(*list_b.lock().unwrap(), vec!["a", "b"]);
    assert_eq!(*list_c.lock().unwrap(), vec!["a", "b"]);
}

/// S3: A -> B where B has keepalive=true.
#[test]
fn s3_keepalive_keeps_subscriber_running() {
    let items = vec!["only".to_string()];
    let a = build_generator("A", items);

    let list = Arc::new(Mutex::new(Vec::new()));
    let list2 = Arc::clone(&list);
    let b = ProcessorBuilder::new("Collector", NoopHooks, ProcessorConfig::named("B"))
        .keepalive(true)
        .connector(
            "in",
            None,
            4,
            Box::new(move |d: Document, _owner: &Processor| {
                if let Some(s) = downcast::<String>(&d) {
                    list2.lock().unwrap().push(s.clone());
                }
                Ok(())
            }),
        )
        .build()
        .unwrap();

    Processor::subscribe(&a, None, &b, None).unwrap();
    a.start().unwrap();
    a.wait();

    assert_eq!(a.status(), Status::Stopped);
    // Give B's dispatcher a moment to settle; it must still be running.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(b.status(), Status::Running);

    b.stop().unwrap();
    b.wait();
    assert_eq!(b.status(), Status::Stopped);
}

/// S4: socket protocol "json" vs connector protocol "xml" must fail to connect.
#[test]
fn s4_protocol_mismatch_rejects_subscribe() {
    let a = ProcessorBuilder::new("Src", NoopHooks, ProcessorConfig::named("A"))
        .socket("out", Some("json"))
        .build()
        .unwrap();
    let b = ProcessorBuilder::new("Sink", NoopHooks, ProcessorConfig::named("B"))
        .connector("in", Some("xml"), 4, Box::new(|_d, _o| Ok(())))
        .build()
        .unwrap();

    let err = Processor::subscribe(&a, None, &b, None).unwrap_err();
    assert!(matches!(err, GraphError::ProtocolMismatch { .. }));
    assert!(!a.socket("out").unwrap().has_output());
}

/// S5: A floods B's small bounded queue; abort() must terminate quickly and
/// drain B's queue to zero.
#[test]
fn s5_abort_is_bounded_and_drains_queue() {
    struct Flooder;
    impl ProcessorHooks for Flooder {
        fn on_tick(&self, handle: &Processor) -> HookResult {
            if let Some(socket) = handle.socket("out") {
                socket.send(doc(1u32));
            }
            Ok(())
        }
    }

    let a = ProcessorBuilder::new("Flooder", Flooder, ProcessorConfig::named("A"))
        .generator(true)
        .tick_interval(Duration::from_micros(200))
        .socket("out", None)
        .build()
        .unwrap();

    let b = ProcessorBuilder::new("SlowSink", NoopHooks, ProcessorConfig::named("B"))
        .connector(
            "in",
            None,
            2,
            Box::new(|_d: Document, _o: &Processor| {
                std::thread::sleep(Duration::from_millis(30));
                Ok(())
            }),
        )
        .build()
        .unwrap();

    Processor::subscribe(&a, None, &b, None).unwrap();
    a.start().unwrap();
    std::thread::sleep(Duration::from_millis(60));

    let start = Instant::now();
    a.abort().unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));

    assert_eq!(a.status(), Status::Aborted);
    assert_eq!(b.status(), Status::Aborted);
    assert_eq!(b.connector("in").unwrap().queue_len(), 0);
}

/// S6: restart() must not re-run on_startup (or on_open) on a generator.
#[test]
fn s6_restart_does_not_rerun_startup() {
    struct Counter {
        startup: Arc<AtomicUsize>,
        open: Arc<AtomicUsize>,
    }
    impl ProcessorHooks for Counter {
        fn on_open(&self, _h: &Processor) -> HookResult {
            self.open.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn on_startup(&self, _h: &Processor) -> HookResult {
            self.startup.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn on_tick(&self, _h: &Processor) -> HookResult {
            Ok(())
        }
    }

    let startup = Arc::new(AtomicUsize::new(0));
    let open = Arc::new(AtomicUsize::new(0));
    let a = ProcessorBuilder::new(
        "Counter",
        Counter {
            startup: Arc::clone(&startup),
            open: Arc::clone(&open),
        },
        ProcessorConfig::named("A"),
    )
    .generator(true)
    .tick_interval(Duration::from_millis(3))
    .build()
    .unwrap();

    a.start().unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(startup.load(Ordering::SeqCst), 1);
    assert_eq!(open.load(Ordering::SeqCst), 1);

    a.restart().unwrap();
    std::thread::sleep(Duration::from_millis(30));

    assert_eq!(startup.load(Ordering::SeqCst), 1);
    assert_eq!(open.load(Ordering::SeqCst), 1);
    assert_eq!(a.status(), Status::Running);

    a.abort().unwrap();
}

/// Property §8.7: a round trip through `put` -> identity handler -> socket
/// -> collector connector delivers the document exactly once.
#[test]
fn round_trip_via_put_delivers_exactly_once() {
    let list = Arc::new(Mutex::new(Vec::new()));
    let list2 = Arc::clone(&list);
    let b = ProcessorBuilder::new("Sink", NoopHooks, ProcessorConfig::named("B"))
        .connector(
            "in",
            None,
            4,
            Box::new(move |d: Document, _o: &Processor| {
                if let Some(n) = downcast::<u32>(&d) {
                    list2.lock().unwrap().push(*n);
                }
                Ok(())
            }),
        )
        .build()
        .unwrap();

    let a = ProcessorBuilder::new("Identity", NoopHooks, ProcessorConfig::named("A"))
        .socket("out", None)
        .connector(
            "in",
            None,
            4,
            Box::new(|d: Document, owner: &Processor| {
                if let Some(socket) = owner.socket("out") {
                    socket.send(d);
                }
                Ok(())
            }),
        )
        .build()
        .unwrap();

    Processor::subscribe(&a, None, &b, None).unwrap();
    a.start().unwrap();
    a.put(doc(42u32), None).unwrap();
    std::thread::sleep(Duration::from_millis(80));
    a.stop().unwrap();
    a.wait();
    b.wait();

    assert_eq!(*list.lock().unwrap(), vec![42u32]);
}

/// Property §8.8: start() on a running processor, and stop()/abort() called
/// twice, are no-ops past the first call.
#[test]
fn lifecycle_calls_are_idempotent() {
    let items = vec!["x".to_string()];
    let a = build_generator("A", items);

    a.start().unwrap();
    a.start().unwrap();
    assert_eq!(a.status(), Status::Running);

    a.abort().unwrap();
    let after_first_abort = a.status();
    assert_eq!(after_first_abort, Status::Aborted);
    a.abort().unwrap();
    assert_eq!(a.status(), after_first_abort);
}

/// An `AmbiguousTerminal` is raised when `put`/`add_callback` can't resolve
/// a default among several terminals of the same kind.
#[test]
fn ambiguous_terminal_without_a_default() {
    let p = ProcessorBuilder::new("TwoConnectors", NoopHooks, ProcessorConfig::named("P"))
        .connector("a", None, 4, Box::new(|_d, _o| Ok(())))
        .connector("b", None, 4, Box::new(|_d, _o| Ok(())))
        .build()
        .unwrap();

    let err = p.put(doc(1u32), None).unwrap_err();
    assert!(matches!(err, GraphError::AmbiguousTerminal { .. }));
}
