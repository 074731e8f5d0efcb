use async_trait::async_trait;
use eventify::dispatch::{BackendKind, InMemoryTransport, RemoteEnvelope, RemoteTransport};
use eventify::event;
use eventify::event::{Event, EventHeader, EventType, SharedEvent};
use eventify::listener::{EventHandler, EventListener, ListenerMode};
use eventify::{EventError, EventResult, Eventify, EventifyConfig};
use futures_core::stream::BoxStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[event(type = "order.placed")]
struct OrderPlaced {
    order_id: String,
}

#[event(type = "invoice.issued", backend = "remote")]
struct InvoiceIssued {
    invoice_no: u32,
}

fn placed(id: &str) -> Arc<OrderPlaced> {
    Arc::new(OrderPlaced {
        header: EventHeader::with_id(id),
        order_id: format!("order-{id}"),
    })
}

fn issued(id: &str, invoice_no: u32) -> Arc<InvoiceIssued> {
    Arc::new(InvoiceIssued {
        header: EventHeader::with_id(id),
        invoice_no,
    })
}

#[derive(Clone, Default)]
struct Counter(Arc<AtomicUsize>);

impl Counter {
    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

struct Counting {
    counter: Counter,
    fail: bool,
}

#[async_trait]
impl EventHandler<OrderPlaced> for Counting {
    async fn on_event(&self, _event: &OrderPlaced) -> anyhow::Result<()> {
        self.counter.0.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("listener refused order");
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler<InvoiceIssued> for Counting {
    async fn on_event(&self, _event: &InvoiceIssued) -> anyhow::Result<()> {
        self.counter.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl EventHandler<dyn Event> for Counting {
    async fn on_event(&self, _event: &dyn Event) -> anyhow::Result<()> {
        self.counter.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn counting(counter: &Counter) -> Counting {
    Counting {
        counter: counter.clone(),
        fail: false,
    }
}

async fn wait_until(counter: &Counter, expected: usize) -> bool {
    tokio::time::timeout(Duration::from_secs(2), async {
        while counter.get() < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// 发布总是失败的传输
struct BrokenTransport {
    attempts: AtomicUsize,
}

#[async_trait]
impl RemoteTransport for BrokenTransport {
    async fn publish(&self, _envelope: RemoteEnvelope) -> EventResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EventError::store("broker connection reset"))
    }

    async fn subscribe(&self) -> BoxStream<'static, EventResult<RemoteEnvelope>> {
        Box::pin(futures_util::stream::empty())
    }
}

#[tokio::test]
async fn idempotent_listener_runs_at_most_once() {
    let bus = Eventify::builder().build().unwrap();
    let counter = Counter::default();
    bus.add_listener(EventListener::typed::<OrderPlaced, _>(
        "once",
        counting(&counter),
        ListenerMode::builder().idempotent(true).build(),
    ));

    let event = placed("dup");
    bus.publish(event.clone()).await.unwrap();
    bus.publish(event.clone()).await.unwrap();

    assert_eq!(counter.get(), 1);
    assert!(bus.guard().is_processed(&*event).await.unwrap());
}

#[tokio::test]
async fn sync_and_async_idempotent_listeners() {
    let bus = Eventify::builder().build().unwrap();
    let sync_counter = Counter::default();
    let async_counter = Counter::default();
    bus.add_listener(EventListener::typed::<OrderPlaced, _>(
        "sync",
        counting(&sync_counter),
        ListenerMode::synchronous(),
    ));
    bus.add_listener(EventListener::typed::<OrderPlaced, _>(
        "async-idempotent",
        counting(&async_counter),
        ListenerMode::builder()
            .asynchronous(true)
            .idempotent(true)
            .build(),
    ));

    let e1 = placed("e1");
    bus.publish(e1.clone()).await.unwrap();
    assert_eq!(sync_counter.get(), 1);
    assert!(wait_until(&async_counter, 1).await, "async listener not observed");

    bus.publish(e1.clone()).await.unwrap();
    assert_eq!(sync_counter.get(), 2);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(async_counter.get(), 1);
}

#[tokio::test]
async fn async_without_executor_is_configuration_error() {
    let config = EventifyConfig {
        async_enabled: false,
        ..Default::default()
    };
    let bus = Eventify::builder().config(config).build().unwrap();
    let counter = Counter::default();
    bus.add_listener(EventListener::typed::<OrderPlaced, _>(
        "background",
        counting(&counter),
        ListenerMode::asynchronous(),
    ));

    let err = bus.publish(placed("no-pool")).await.unwrap_err();
    assert!(matches!(err, EventError::Configuration { .. }));
    assert_eq!(counter.get(), 0);
}

#[tokio::test]
async fn sync_failure_surfaces_after_siblings_run() {
    let bus = Eventify::builder().build().unwrap();
    let failing = Counter::default();
    let healthy = Counter::default();
    bus.add_listener(EventListener::typed::<OrderPlaced, _>(
        "failing",
        Counting {
            counter: failing.clone(),
            fail: true,
        },
        ListenerMode::synchronous(),
    ));
    bus.add_listener(EventListener::typed::<OrderPlaced, _>(
        "healthy",
        counting(&healthy),
        ListenerMode::synchronous(),
    ));

    let err = bus.publish(placed("boom")).await.unwrap_err();
    match err {
        EventError::Listener { listener, reason } => {
            assert_eq!(listener, "failing");
            assert!(reason.contains("listener refused order"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(failing.get(), 1);
    assert_eq!(healthy.get(), 1);
}

#[tokio::test]
async fn async_failure_stays_silent() {
    let bus = Eventify::builder().build().unwrap();
    let failing = Counter::default();
    bus.add_listener(EventListener::typed::<OrderPlaced, _>(
        "failing-async",
        Counting {
            counter: failing.clone(),
            fail: true,
        },
        ListenerMode::asynchronous(),
    ));

    bus.publish(placed("quiet")).await.unwrap();
    assert!(wait_until(&failing, 1).await);
}

#[tokio::test]
async fn remote_publish_failure_falls_back_to_local() {
    let transport = Arc::new(BrokenTransport {
        attempts: AtomicUsize::new(0),
    });
    let bus = Eventify::builder()
        .remote_transport(transport.clone())
        .build()
        .unwrap();
    let counter = Counter::default();
    bus.add_listener(EventListener::typed::<InvoiceIssued, _>(
        "billing",
        counting(&counter),
        ListenerMode::asynchronous(),
    ));

    bus.publish(issued("i-1", 1001)).await.unwrap();

    assert!(wait_until(&counter, 1).await, "fallback delivery not observed");
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn declared_backend_without_registration_uses_default() {
    let bus = Eventify::builder().build().unwrap();
    let counter = Counter::default();
    bus.add_listener(
        EventListener::typed::<OrderPlaced, _>(
            "remote-preferred",
            counting(&counter),
            ListenerMode::asynchronous(),
        )
        .with_backend(BackendKind::Remote),
    );

    bus.publish(placed("local")).await.unwrap();
    assert!(wait_until(&counter, 1).await);
}

#[tokio::test]
async fn remote_round_trip_through_consumer() {
    let transport = Arc::new(InMemoryTransport::new(64));
    let bus = Eventify::builder()
        .remote_transport(transport.clone())
        .build()
        .unwrap();
    bus.register_event::<InvoiceIssued>();

    let counter = Counter::default();
    bus.add_listener(EventListener::typed::<InvoiceIssued, _>(
        "billing",
        counting(&counter),
        ListenerMode::asynchronous(),
    ));

    let consumer = bus.start_remote_consumer().await.unwrap();
    assert_eq!(transport.subscriber_count(), 1);

    bus.publish(issued("i-2", 1002)).await.unwrap();
    assert!(wait_until(&counter, 1).await, "remote delivery not observed");

    // 摘除远程后端后回落到本地
    assert!(bus.deregister_backend(BackendKind::Remote).is_some());
    bus.publish(issued("i-3", 1003)).await.unwrap();
    assert!(wait_until(&counter, 2).await);

    consumer.shutdown();
    consumer.join().await;
}

#[tokio::test]
async fn supertype_listeners_receive_subtypes() {
    let bus = Eventify::builder().build().unwrap();
    bus.declare_subtype("order.placed", "order");

    let by_parent = Counter::default();
    let by_any = Counter::default();
    bus.add_listener(EventListener::dynamic(
        "order-audit",
        "order",
        counting(&by_parent),
        ListenerMode::synchronous(),
    ));
    bus.add_listener(EventListener::dynamic(
        "firehose",
        EventType::ANY,
        counting(&by_any),
        ListenerMode::synchronous(),
    ));

    bus.publish(placed("p-1")).await.unwrap();
    let unrelated: SharedEvent = issued("i-4", 1004);
    bus.publish(unrelated).await.unwrap();

    assert_eq!(by_parent.get(), 1);
    assert_eq!(by_any.get(), 2);
}

#[tokio::test]
async fn publish_to_targets_single_listener() {
    let bus = Eventify::builder().build().unwrap();
    let first = Counter::default();
    let second = Counter::default();
    bus.add_listener(EventListener::typed::<OrderPlaced, _>(
        "first",
        counting(&first),
        ListenerMode::synchronous(),
    ));
    bus.add_listener(EventListener::typed::<OrderPlaced, _>(
        "second",
        counting(&second),
        ListenerMode::synchronous(),
    ));

    bus.publish_to(placed("t-1"), "second", None).await.unwrap();
    assert_eq!((first.get(), second.get()), (0, 1));

    let err = bus.publish_to(placed("t-2"), "missing", None).await.unwrap_err();
    assert!(matches!(err, EventError::ListenerNotFound(name) if name == "missing"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn publishing_while_registering_loses_nothing() {
    let bus = Arc::new(Eventify::builder().build().unwrap());
    let steady = Counter::default();
    bus.add_listener(EventListener::typed::<OrderPlaced, _>(
        "steady",
        counting(&steady),
        ListenerMode::synchronous(),
    ));

    let late = Counter::default();
    let registrar = {
        let bus = bus.clone();
        let late = late.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                bus.add_listener(EventListener::typed::<OrderPlaced, _>(
                    format!("late-{i}"),
                    counting(&late),
                    ListenerMode::synchronous(),
                ));
                tokio::task::yield_now().await;
            }
        })
    };

    let publishers: Vec<_> = (0..100)
        .map(|i| {
            let bus = bus.clone();
            tokio::spawn(async move { bus.publish(placed(&format!("c{i}"))).await })
        })
        .collect();
    for publisher in publishers {
        publisher.await.unwrap().unwrap();
    }
    registrar.await.unwrap();

    assert_eq!(steady.get(), 100);
    assert_eq!(bus.listeners().len(), 51);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_idempotent_event_from_many_tasks() {
    let bus = Arc::new(Eventify::builder().build().unwrap());
    let counter = Counter::default();
    bus.add_listener(EventListener::typed::<OrderPlaced, _>(
        "dedup",
        counting(&counter),
        ListenerMode::builder().idempotent(true).build(),
    ));

    let event: SharedEvent = placed("shared");
    let publishers: Vec<_> = (0..8)
        .map(|_| {
            let bus = bus.clone();
            let event = event.clone();
            tokio::spawn(async move { bus.publish(event).await })
        })
        .collect();
    for publisher in publishers {
        publisher.await.unwrap().unwrap();
    }

    assert!(counter.get() >= 1);
    assert!(bus.guard().is_processed(&*event).await.unwrap());

    // 并发结束后再次发布必然被跳过
    let settled = counter.get();
    bus.publish(event.clone()).await.unwrap();
    assert_eq!(counter.get(), settled);
}
