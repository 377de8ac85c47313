//! Dispatch Gate Integration Tests
//!
//! Reports produced while an order call is in flight must reach the host
//! only after that call has returned, in arrival order.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::time::timeout;

use gateway_bridge::infrastructure::gateway::mock::{FixedCalendar, MockGatewayTransport};
use gateway_bridge::{
    BridgeError, Credentials, EventPublisher, ExecutionReport, ExecutionReportHandler,
    GatewayClient, GatewayClientConfig, OrderSide, OrderTicket, RecordingReportHandler,
};

async fn connected(
    unlock_grace: Duration,
) -> (
    Arc<MockGatewayTransport>,
    Arc<RecordingReportHandler>,
    Arc<GatewayClient>,
) {
    let transport = Arc::new(MockGatewayTransport::new());
    let handler = Arc::new(RecordingReportHandler::new());
    let mut config = GatewayClientConfig::new("CLIENT", "ACC");
    config.unlock_grace = unlock_grace;
    let client = GatewayClient::new(
        transport.clone(),
        Arc::new(FixedCalendar::new(true)),
        handler.clone(),
        Credentials::new("trader", "secret").unwrap(),
        config,
        EventPublisher::disabled(),
    );
    transport.push_response(r#"{"status":0,"SessionId":"s1"}"#);
    client.connect().await.unwrap();
    (transport, handler, client)
}

fn ack(seq: u64, id: &str) -> String {
    format!(r#"{{"MsgType":"8","MsgSeqNum":{seq},"ClOrdID":"{id}","ExecType":"NEW","OrdStatus":"NEW"}}"#)
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

fn spawn_order(
    client: &Arc<GatewayClient>,
) -> tokio::task::JoinHandle<Result<gateway_bridge::SubmitAck, BridgeError>> {
    let client = Arc::clone(client);
    tokio::spawn(async move {
        let ticket = OrderTicket::market("SPY", OrderSide::Buy, Decimal::from(10));
        client.orders().place_order(&ticket).await
    })
}

#[tokio::test]
async fn reports_during_call_are_held_then_replayed_in_order() {
    let (transport, handler, client) = connected(Duration::ZERO).await;
    transport.set_response_delay(Duration::from_millis(100));
    transport.push_response(r#"{"status":0,"Text":"accepted"}"#);

    let order = spawn_order(&client);
    wait_until("gate locked", || client.gate().is_locked()).await;

    for (seq, id) in [(1, "A"), (2, "B"), (3, "C")] {
        assert!(transport.push_frame(&ack(seq, id)).await);
    }
    wait_until("three buffered", || client.gate().snapshot().buffered == 3).await;
    assert!(handler.is_empty());

    let ack = order.await.unwrap().unwrap();
    assert_eq!(ack.text.as_deref(), Some("accepted"));
    wait_until("replay", || handler.len() == 3).await;

    assert_eq!(handler.client_order_ids(), vec!["A", "B", "C"]);
    let gate = client.gate().snapshot();
    assert!(!gate.locked);
    assert_eq!(gate.buffered, 0);
    assert_eq!(gate.dispatched_replayed, 3);
    assert_eq!(gate.dispatched_live, 0);

    client.shutdown().await;
}

#[tokio::test]
async fn rejected_order_still_releases_reports() {
    let (transport, handler, client) = connected(Duration::ZERO).await;
    transport.set_response_delay(Duration::from_millis(50));
    transport.push_response(r#"{"status":2,"Text":"unknown symbol"}"#);

    let order = spawn_order(&client);
    wait_until("gate locked", || client.gate().is_locked()).await;
    assert!(transport.push_frame(&ack(1, "A")).await);
    wait_until("buffered", || client.gate().snapshot().buffered == 1).await;

    let err = order.await.unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::Rejected { status: 2, .. }));
    wait_until("released", || handler.len() == 1).await;
    assert!(!client.gate().is_locked());

    client.shutdown().await;
}

#[tokio::test]
async fn grace_period_holds_reports_after_the_call() {
    let grace = Duration::from_millis(150);
    let (transport, handler, client) = connected(grace).await;
    transport.set_response_delay(Duration::from_millis(30));
    transport.push_response(r#"{"status":0}"#);

    let order = spawn_order(&client);
    wait_until("gate locked", || client.gate().is_locked()).await;
    order.await.unwrap().unwrap();

    assert!(transport.push_frame(&ack(1, "late")).await);
    wait_until("buffered in grace", || client.gate().snapshot().buffered == 1).await;
    let gate = client.gate().snapshot();
    assert!(gate.locked);
    assert!(gate.release_pending);
    assert!(handler.is_empty());

    wait_until("grace release", || handler.len() == 1).await;
    assert!(!client.gate().is_locked());

    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_flushes_a_pending_release() {
    let (transport, handler, client) = connected(Duration::from_secs(30)).await;
    transport.push_response(r#"{"status":0}"#);

    spawn_order(&client).await.unwrap().unwrap();
    assert!(transport.push_frame(&ack(1, "A")).await);
    wait_until("buffered", || client.gate().snapshot().buffered == 1).await;

    timeout(Duration::from_secs(1), client.shutdown())
        .await
        .expect("shutdown should not wait for the grace period");
    assert_eq!(handler.client_order_ids(), vec!["A"]);
    assert!(!client.gate().is_locked());
}

#[tokio::test]
async fn reports_outside_calls_flow_live() {
    let (transport, handler, client) = connected(Duration::ZERO).await;

    assert!(transport.push_frame(&ack(1, "A")).await);
    wait_until("live report", || handler.len() == 1).await;
    assert_eq!(client.gate().snapshot().dispatched_live, 1);

    client.shutdown().await;
}

/// Reads the bridge snapshot from inside the callback, as a host might.
#[derive(Default)]
struct SnapshotReadingHandler {
    client: OnceLock<Weak<GatewayClient>>,
    seen: Mutex<Vec<(String, bool)>>,
}

impl ExecutionReportHandler for SnapshotReadingHandler {
    fn on_report(&self, report: ExecutionReport) {
        let locked = self
            .client
            .get()
            .and_then(Weak::upgrade)
            .is_some_and(|client| client.snapshot().gate.locked);
        self.seen.lock().push((report.client_order_id, locked));
    }
}

#[tokio::test]
async fn handler_can_read_bridge_state() {
    let transport = Arc::new(MockGatewayTransport::new());
    let handler = Arc::new(SnapshotReadingHandler::default());
    let client = GatewayClient::new(
        transport.clone(),
        Arc::new(FixedCalendar::new(true)),
        handler.clone(),
        Credentials::new("trader", "secret").unwrap(),
        GatewayClientConfig::new("CLIENT", "ACC"),
        EventPublisher::disabled(),
    );
    assert!(handler.client.set(Arc::downgrade(&client)).is_ok());
    transport.push_response(r#"{"status":0,"SessionId":"s1"}"#);
    client.connect().await.unwrap();

    transport.set_response_delay(Duration::from_millis(50));
    transport.push_response(r#"{"status":0}"#);
    let order = spawn_order(&client);
    wait_until("gate locked", || client.gate().is_locked()).await;
    assert!(transport.push_frame(&ack(1, "held")).await);
    wait_until("buffered", || client.gate().snapshot().buffered == 1).await;
    order.await.unwrap().unwrap();
    wait_until("replayed", || handler.seen.lock().len() == 1).await;

    assert!(transport.push_frame(&ack(2, "live")).await);
    wait_until("live", || handler.seen.lock().len() == 2).await;

    assert_eq!(
        *handler.seen.lock(),
        vec![("held".to_string(), true), ("live".to_string(), false)]
    );
    client.shutdown().await;
}
