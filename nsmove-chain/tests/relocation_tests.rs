use async_trait::async_trait;
use nsmove_chain::*;
use nsmove_core::{
    Connection, ConnectionId, Direction, Error, EventSink, KernelMechanism, RelocationEvent,
    Result,
};
use nsmove_netns::{MockNetNs, MockOp, NetNsId, NetNsWorker, RelocationConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CLIENT: &str = "/var/run/netns/client1";

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<RelocationEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<RelocationEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: RelocationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Notes where `veth0` is whenever it runs; optionally rejects requests
struct Downstream {
    mock: MockNetNs,
    reject: bool,
    seen: Mutex<Vec<(&'static str, Option<NetNsId>)>>,
}

impl Downstream {
    fn new(mock: &MockNetNs, reject: bool) -> Arc<Self> {
        Arc::new(Self {
            mock: mock.clone(),
            reject,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<(&'static str, Option<NetNsId>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetworkService for Downstream {
    async fn request(&self, _ctx: &RequestContext, conn: Connection) -> Result<Connection> {
        let location = self.mock.interface_namespace("veth0");
        self.seen.lock().unwrap().push(("request", location));
        if self.reject {
            return Err(Error::Rejected {
                message: "forwarder refused connection".to_string(),
            });
        }
        Ok(conn)
    }

    async fn close(&self, _ctx: &RequestContext, _conn: Connection) -> Result<()> {
        let location = self.mock.interface_namespace("veth0");
        self.seen.lock().unwrap().push(("close", location));
        Ok(())
    }
}

/// Never answers a request
struct Stalled;

#[async_trait]
impl NetworkService for Stalled {
    async fn request(&self, _ctx: &RequestContext, conn: Connection) -> Result<Connection> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(conn)
    }

    async fn close(&self, _ctx: &RequestContext, _conn: Connection) -> Result<()> {
        Ok(())
    }
}

struct Fixture {
    mock: MockNetNs,
    client: NetNsId,
    worker: Arc<NetNsWorker>,
    sink: Arc<RecordingSink>,
}

impl Fixture {
    fn new() -> Self {
        let mock = MockNetNs::new();
        let client = mock.add_namespace(CLIENT);
        mock.add_interface(mock.home(), "veth0");

        let worker =
            NetNsWorker::spawn(Arc::new(mock.clone()), &RelocationConfig::default()).unwrap();

        Self {
            mock,
            client,
            worker: Arc::new(worker),
            sink: Arc::new(RecordingSink::default()),
        }
    }

    fn chain(&self, downstream: &Arc<Downstream>) -> Chain {
        self.chain_with_tail(downstream.clone())
    }

    fn chain_with_tail(&self, tail: Arc<dyn NetworkService>) -> Chain {
        let worker = Arc::clone(&self.worker);
        let sink: Arc<dyn EventSink> = self.sink.clone();
        ChainBuilder::new()
            .with(move |next| {
                RelocationElement::new(worker, &RelocationConfig::default(), next)
                    .with_events(sink)
            })
            .build_with_tail(tail)
    }

    fn worker_namespace(&self) -> NetNsId {
        self.mock.thread_namespace(self.worker.thread_id())
    }

    /// Wait for the worker to finish a move back nobody is awaiting
    async fn wait_for_compensation(&self) {
        for _ in 0..200 {
            let compensated = self
                .sink
                .events()
                .iter()
                .any(|e| matches!(e, RelocationEvent::Compensated { .. }));
            if compensated {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no compensation recorded; events: {:?}", self.sink.events());
    }
}

fn connection(interface: &str) -> Connection {
    Connection::new(ConnectionId::new("conn-1").unwrap()).with_mechanism(
        KernelMechanism::new()
            .with_netns_url(format!("file://{CLIENT}"))
            .with_interface_name(interface),
    )
}

#[tokio::test]
async fn test_request_then_close_round_trip() {
    let fx = Fixture::new();
    let downstream = Downstream::new(&fx.mock, false);
    let chain = fx.chain(&downstream);
    let ctx = RequestContext::server();

    let conn = chain.request(&ctx, connection("veth0")).await.unwrap();
    assert_eq!(conn, connection("veth0"));
    assert_eq!(fx.mock.interface_namespace("veth0"), Some(fx.client));
    assert_eq!(fx.worker_namespace(), fx.mock.home());
    assert_eq!(fx.mock.open_handles(), 0);

    chain.close(&ctx, conn).await.unwrap();
    assert_eq!(fx.mock.interface_namespace("veth0"), Some(fx.mock.home()));
    assert_eq!(fx.worker_namespace(), fx.mock.home());
    assert_eq!(fx.mock.open_handles(), 0);

    // Downstream sees the interface already moved on Request, already back on Close
    assert_eq!(
        downstream.seen(),
        [("request", Some(fx.client)), ("close", Some(fx.mock.home()))]
    );

    let directions: Vec<_> = fx
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            RelocationEvent::Moved { direction, .. } => Some(direction),
            _ => None,
        })
        .collect();
    assert_eq!(directions, [Direction::ToTarget, Direction::ToHome]);
}

#[tokio::test]
async fn test_delegation_failure_moves_interface_back() {
    let fx = Fixture::new();
    let downstream = Downstream::new(&fx.mock, true);
    let chain = fx.chain(&downstream);

    let err = chain
        .request(&RequestContext::server(), connection("veth0"))
        .await
        .unwrap_err();

    let Error::Delegation { source } = err else {
        panic!("expected delegation error, got {err}");
    };
    assert!(matches!(*source, Error::Rejected { .. }));

    assert_eq!(downstream.seen(), [("request", Some(fx.client))]);
    assert_eq!(fx.mock.interface_namespace("veth0"), Some(fx.mock.home()));
    assert_eq!(fx.worker_namespace(), fx.mock.home());
    assert_eq!(fx.mock.open_handles(), 0);

    // Compensation reused the handles from the forward move
    assert_eq!(fx.mock.count(MockOp::Open), 1);
    assert!(fx
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, RelocationEvent::Compensated { .. })));
}

#[tokio::test]
async fn test_compensation_failure_keeps_downstream_error() {
    let fx = Fixture::new();
    fx.mock.fail_after(MockOp::MoveInterface, 1);
    let downstream = Downstream::new(&fx.mock, true);
    let chain = fx.chain(&downstream);

    let err = chain
        .request(&RequestContext::server(), connection("veth0"))
        .await
        .unwrap_err();

    let Error::Delegation { source } = err else {
        panic!("expected delegation error, got {err}");
    };
    assert!(matches!(*source, Error::Rejected { .. }));

    assert_eq!(fx.mock.interface_namespace("veth0"), Some(fx.client));
    assert_eq!(fx.worker_namespace(), fx.mock.home());
    assert_eq!(fx.mock.open_handles(), 0);
    assert!(!fx.worker.is_poisoned());

    let events = fx.sink.events();
    let failed = events
        .iter()
        .find(|e| matches!(e, RelocationEvent::CompensationFailed { .. }))
        .expect("compensation failure event");
    assert!(failed.is_critical());
    assert_eq!(failed.connection_id().map(ConnectionId::as_str), Some("conn-1"));
}

#[tokio::test]
async fn test_missing_interface_is_lookup_error() {
    let fx = Fixture::new();
    let downstream = Downstream::new(&fx.mock, false);
    let chain = fx.chain(&downstream);

    let err = chain
        .request(&RequestContext::server(), connection("veth-missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Lookup { .. }), "{err}");
    assert!(downstream.seen().is_empty());
    assert_eq!(fx.worker_namespace(), fx.mock.home());
    assert_eq!(fx.mock.open_handles(), 0);
    assert!(fx.sink.events().is_empty());
}

#[tokio::test]
async fn test_cancelled_request_dispatches_nothing() {
    let fx = Fixture::new();
    let downstream = Downstream::new(&fx.mock, false);
    let chain = fx.chain(&downstream);

    let (ctx, cancel) = RequestContext::server().cancellable();
    cancel.cancel();

    let err = chain.request(&ctx, connection("veth0")).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(fx.mock.calls().is_empty());
    assert!(downstream.seen().is_empty());
    assert_eq!(fx.mock.interface_namespace("veth0"), Some(fx.mock.home()));
}

#[tokio::test]
async fn test_unparsable_netns_url_is_acquisition_error() {
    let fx = Fixture::new();
    let downstream = Downstream::new(&fx.mock, false);
    let chain = fx.chain(&downstream);

    let conn = Connection::new(ConnectionId::new("conn-1").unwrap()).with_mechanism(
        KernelMechanism::new()
            .with_netns_url("http://example.com/ns")
            .with_interface_name("veth0"),
    );

    let err = chain
        .request(&RequestContext::server(), conn)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Acquisition { .. }));
    assert!(fx.mock.calls().is_empty());
}

#[tokio::test]
async fn test_close_failure_is_returned_before_delegating() {
    let fx = Fixture::new();
    let downstream = Downstream::new(&fx.mock, false);
    let chain = fx.chain(&downstream);

    // veth0 was never moved, so it is not in the client namespace
    let err = chain
        .close(&RequestContext::server(), connection("veth0"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Lookup { .. }), "{err}");
    assert!(downstream.seen().is_empty());
    assert_eq!(fx.worker_namespace(), fx.mock.home());
    assert_eq!(fx.mock.open_handles(), 0);
}

#[tokio::test]
async fn test_failed_restore_during_compensation_poisons_worker() {
    let fx = Fixture::new();
    let downstream = Downstream::new(&fx.mock, true);
    let chain = fx.chain(&downstream);
    // The forward move never switches; the compensating move cannot get back home
    fx.mock.fail_switch_into(fx.mock.home());

    let err = chain
        .request(&RequestContext::server(), connection("veth0"))
        .await
        .unwrap_err();

    // The downstream error is still what the caller sees
    assert!(matches!(err, Error::Delegation { .. }));
    assert!(fx.worker.is_poisoned());

    let events = fx.sink.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, RelocationEvent::WorkerPoisoned { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, RelocationEvent::CompensationFailed { .. })));

    fx.mock.clear_failures();
    let err = chain
        .request(&RequestContext::server(), connection("veth0"))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_concurrent_connections_share_worker() {
    let fx = Fixture::new();
    for name in ["veth1", "veth2", "veth3", "veth4"] {
        fx.mock.add_interface(fx.mock.home(), name);
    }
    let downstream = Downstream::new(&fx.mock, false);
    let chain = fx.chain(&downstream);

    let mut tasks = tokio::task::JoinSet::new();
    for (i, name) in ["veth1", "veth2", "veth3", "veth4"].into_iter().enumerate() {
        let chain = chain.clone();
        let conn = Connection::new(ConnectionId::new(format!("conn-{i}")).unwrap())
            .with_mechanism(
                KernelMechanism::new()
                    .with_netns_url(CLIENT)
                    .with_interface_name(name),
            );
        tasks.spawn(async move { chain.request(&RequestContext::client(), conn).await });
    }

    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    for name in ["veth1", "veth2", "veth3", "veth4"] {
        assert_eq!(fx.mock.interface_namespace(name), Some(fx.client));
    }
    assert_eq!(fx.worker_namespace(), fx.mock.home());
    assert_eq!(fx.mock.open_handles(), 0);
    assert!(fx
        .mock
        .calls()
        .iter()
        .filter(|c| c.op == MockOp::SetCurrent)
        .all(|c| c.thread == fx.worker.thread_id()));
}

#[tokio::test]
async fn test_timed_out_request_moves_interface_back() {
    let fx = Fixture::new();
    let chain = fx.chain_with_tail(Arc::new(Stalled));

    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        chain.request(&RequestContext::server(), connection("veth0")),
    )
    .await;
    assert!(outcome.is_err());

    fx.wait_for_compensation().await;
    assert_eq!(fx.mock.interface_namespace("veth0"), Some(fx.mock.home()));
    assert_eq!(fx.worker_namespace(), fx.mock.home());
    assert_eq!(fx.mock.open_handles(), 0);
    assert!(!fx.worker.is_poisoned());

    let events = fx.sink.events();
    assert!(matches!(
        events.first(),
        Some(RelocationEvent::Moved {
            direction: Direction::ToTarget,
            ..
        })
    ));
    assert!(!events
        .iter()
        .any(|e| matches!(e, RelocationEvent::CompensationFailed { .. })));
}

#[tokio::test]
async fn test_request_abandoned_while_queued_moves_interface_back() {
    let fx = Fixture::new();
    let downstream = Downstream::new(&fx.mock, false);
    let chain = fx.chain(&downstream);

    // Hold the worker so the forward move only runs after the caller gave up
    let (started_tx, started_rx) = std::sync::mpsc::channel();
    let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
    fx.worker
        .try_run(move |_| {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
            Ok(())
        })
        .unwrap();
    tokio::task::spawn_blocking(move || started_rx.recv().unwrap())
        .await
        .unwrap();

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        chain.request(&RequestContext::server(), connection("veth0")),
    )
    .await;
    assert!(outcome.is_err());
    gate_tx.send(()).unwrap();

    fx.wait_for_compensation().await;
    assert_eq!(fx.mock.interface_namespace("veth0"), Some(fx.mock.home()));
    assert_eq!(fx.mock.open_handles(), 0);
    assert!(downstream.seen().is_empty());
    // The forward move happened, but nobody was left to report it
    assert_eq!(fx.mock.count(MockOp::MoveInterface), 2);
}
