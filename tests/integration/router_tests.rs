//! Integration tests for the correlation router: id allocation, reply
//! matching, deadlines, staleness, and shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use agent_conduit::router::Router;
use agent_conduit::rpc::message::{Message, RequestId, RpcError};
use agent_conduit::AppError;
use serde_json::{json, Value};

/// Router over an in-memory line channel.
fn make_router(default_timeout: Duration) -> (Arc<Router>, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(32);
    (Arc::new(Router::new(tx, default_timeout)), rx)
}

/// Parse the numeric id out of a wire line.
fn wire_id(line: &str) -> i64 {
    let value: Value = serde_json::from_str(line).expect("wire line is JSON");
    value["id"].as_i64().expect("wire line carries a numeric id")
}

/// Two concurrent requests never receive each other's reply, even when the
/// replies arrive in reverse order.
#[tokio::test]
async fn concurrent_requests_resolve_to_their_own_callers() {
    let (router, mut rx) = make_router(Duration::from_secs(2));

    let responder = {
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            let first = rx.recv().await.expect("first request line");
            let second = rx.recv().await.expect("second request line");

            // Answer in reverse order, echoing each request's method.
            for line in [second, first] {
                let value: Value = serde_json::from_str(&line).expect("request is JSON");
                let id = value["id"].as_i64().expect("numeric id");
                let method = value["method"].as_str().expect("method").to_owned();
                router
                    .handle_incoming(Message::Response {
                        id: RequestId::Num(id),
                        result: json!({ "answered": method }),
                    })
                    .await;
            }
        })
    };

    let (one, two) = tokio::join!(
        router.request("terminal/output", json!({"terminalId": "t1"})),
        router.request("terminal/wait_for_exit", json!({"terminalId": "t1"})),
    );

    responder.await.expect("responder must finish");
    assert_eq!(
        one.expect("first must resolve")["answered"],
        "terminal/output"
    );
    assert_eq!(
        two.expect("second must resolve")["answered"],
        "terminal/wait_for_exit"
    );
}

/// Outbound ids are fresh for every request, never reused while pending.
#[tokio::test]
async fn ids_are_monotonic_and_never_reused() {
    let (router, mut rx) = make_router(Duration::from_millis(50));

    // Let the three requests time out; ids must still all differ.
    let _ = tokio::join!(
        router.request("fs/read_text_file", json!({})),
        router.request("fs/read_text_file", json!({})),
        router.request("fs/read_text_file", json!({})),
    );

    let mut ids = Vec::new();
    while let Ok(line) = rx.try_recv() {
        ids.push(wire_id(&line));
    }
    assert_eq!(ids.len(), 3, "all three requests must reach the wire");
    let mut deduped = ids.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), 3, "ids must never repeat: {ids:?}");
}

/// A request with no reply resolves with the timeout error carrying its id,
/// and a reply arriving afterwards is discarded as stale.
#[tokio::test]
async fn timeout_then_late_reply_is_stale() {
    let (router, mut rx) = make_router(Duration::from_millis(40));

    let result = router.request("session/request_permission", json!({})).await;
    let line = rx.recv().await.expect("request reached the wire");
    let id = wire_id(&line);

    match result {
        Err(AppError::Timeout(timed_out)) => assert_eq!(timed_out, id),
        other => panic!("expected Err(AppError::Timeout), got: {other:?}"),
    }
    assert_eq!(router.in_flight().await, 0, "expired entry must be removed");

    // The late reply finds no pending entry and is dropped.
    router
        .handle_incoming(Message::Response {
            id: RequestId::Num(id),
            result: json!({"outcome": "too late"}),
        })
        .await;
    assert_eq!(router.in_flight().await, 0);
}

/// A failed send leaves no pending entry behind.
#[tokio::test]
async fn send_failure_leaves_no_pending_entry() {
    let (router, rx) = make_router(Duration::from_secs(1));
    drop(rx); // writer side gone

    let result = router.request("fs/write_text_file", json!({})).await;
    assert!(
        matches!(result, Err(AppError::SendFailed(_))),
        "expected Err(AppError::SendFailed), got: {result:?}"
    );
    assert_eq!(router.in_flight().await, 0);
}

/// Stopping the router resolves in-flight callers with the stopped error
/// and refuses later requests immediately.
#[tokio::test]
async fn stop_resolves_in_flight_and_refuses_new() {
    let (router, mut rx) = make_router(Duration::from_secs(5));

    let in_flight = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.request("terminal/create", json!({})).await })
    };
    // The request is in flight once its line is on the wire.
    let _line = rx.recv().await.expect("request line");

    router.stop().await;

    let result = in_flight.await.expect("task must not panic");
    assert!(
        matches!(result, Err(AppError::RouterStopped)),
        "expected Err(AppError::RouterStopped), got: {result:?}"
    );

    let after = router.request("terminal/kill", json!({})).await;
    assert!(matches!(after, Err(AppError::RouterStopped)));
    assert!(router.is_stopped());
}

/// A host error reply surfaces as the remote error, not a success.
#[tokio::test]
async fn error_reply_surfaces_as_remote() {
    let (router, mut rx) = make_router(Duration::from_secs(2));

    let call = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.request("fs/read_text_file", json!({})).await })
    };
    let line = rx.recv().await.expect("request line");
    let id = wire_id(&line);

    router
        .handle_incoming(Message::Error {
            id: RequestId::Num(id),
            error: RpcError::new(-32000, "file is outside the workspace"),
        })
        .await;

    match call.await.expect("task must not panic") {
        Err(AppError::Remote(err)) => {
            assert_eq!(err.code, -32000);
            assert_eq!(err.message, "file is outside the workspace");
        }
        other => panic!("expected Err(AppError::Remote), got: {other:?}"),
    }
}

/// Requests and notifications are not the router's concern and pass
/// through unchanged; replies are always consumed.
#[tokio::test]
async fn non_replies_pass_through() {
    let (router, _rx) = make_router(Duration::from_secs(1));

    let request = Message::Request {
        id: RequestId::Num(9),
        method: "initialize".into(),
        params: json!({}),
    };
    assert_eq!(
        router.handle_incoming(request.clone()).await,
        Some(request)
    );

    let notification = Message::Notification {
        method: "session/cancel".into(),
        params: json!({}),
    };
    assert_eq!(
        router.handle_incoming(notification.clone()).await,
        Some(notification)
    );

    // A reply for an id that was never pending is consumed and dropped.
    let stale = Message::Response {
        id: RequestId::Num(999),
        result: json!({}),
    };
    assert_eq!(router.handle_incoming(stale).await, None);
}
