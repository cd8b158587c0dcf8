//! SSE delivery: streamed responses, notification sessions, and disconnect
//! isolation between concurrent sessions.

mod common;

use std::time::Duration;

use common::{script_child, TestGateway};
use futures_util::StreamExt;
use serde_json::{json, Value};

#[tokio::test]
async fn sse_mode_delivers_the_correlated_response_as_an_event() {
    let gateway = TestGateway::start("cat", None, 5).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(&gateway.stream_url)
        .header("accept", "text/event-stream")
        .json(&json!({"op": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert!(resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream")));

    // The stream closes after the single correlated event.
    let body = resp.text().await.unwrap();
    let data_line = body
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .expect("an event with data");
    assert_eq!(
        serde_json::from_str::<Value>(data_line).unwrap(),
        json!({"op": "ping"})
    );

    gateway.stop().await;
}

#[tokio::test]
async fn disconnecting_one_session_does_not_affect_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let child = script_child(
        &dir,
        "slow-echo.sh",
        "while read -r line; do sleep 0.3; echo \"$line\"; done",
    );
    let gateway = TestGateway::start(&child, None, 10).await;
    let client = reqwest::Client::new();

    // Session A disconnects while its request is still in flight.
    let abandoned = client
        .post(&gateway.stream_url)
        .header("accept", "text/event-stream")
        .json(&json!({"op": "echo", "payload": "abandoned"}))
        .send();
    let abandoned = tokio::time::timeout(Duration::from_millis(100), abandoned).await;
    drop(abandoned);

    // Session B proceeds normally and gets exactly its own payload.
    let resp = client
        .post(&gateway.stream_url)
        .json(&json!({"op": "echo", "payload": "kept"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"op": "echo", "payload": "kept"})
    );

    // The abandoned session's entry is reclaimed once its echo drains.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(gateway.bridge.table().is_empty());

    gateway.stop().await;
}

#[tokio::test]
async fn notification_sessions_receive_server_initiated_frames() {
    let dir = tempfile::tempdir().unwrap();
    // Emits an un-correlated frame every 200ms, forever.
    let child = script_child(
        &dir,
        "notifier.sh",
        "while true; do echo '{\"method\":\"notifications/tick\"}'; sleep 0.2; done",
    );
    let gateway = TestGateway::start(&child, None, 5).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(&gateway.stream_url)
        .header("accept", "text/event-stream")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let mut stream = resp.bytes_stream();
    let mut body = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !body.contains("notifications/tick") {
        let chunk = tokio::time::timeout_at(deadline, stream.next())
            .await
            .expect("notification before deadline")
            .expect("stream still open")
            .unwrap();
        body.push_str(std::str::from_utf8(&chunk).unwrap());
    }
    assert!(body.contains("data: {\"method\":\"notifications/tick\"}"));

    // Dropping the client connection deregisters the session.
    drop(stream);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(gateway.bridge.sessions().is_empty());

    gateway.stop().await;
}
