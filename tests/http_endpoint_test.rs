//! HTTP-level integration tests for the transport bridge.
//!
//! Drives the real router (dispatch front door, SSE endpoint, submission
//! endpoint) in-process via `tower::ServiceExt::oneshot`, reading frames
//! straight off the SSE response body.

use axum::Router;
use axum::body::{Body, BodyDataStream};
use axum::http::{Request, StatusCode, header};
use futures_util::StreamExt;
use mysql_mcp_server::db::{MySqlPoolManager, QueryExecutor};
use mysql_mcp_server::protocol::{PROTOCOL_VERSION, ProtocolEngine};
use mysql_mcp_server::tools::QueryToolHandler;
use mysql_mcp_server::transport::HttpTransport;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tower::ServiceExt;

fn test_transport() -> HttpTransport {
    let pool = Arc::new(MySqlPoolManager::new());
    let handler = Arc::new(QueryToolHandler::new(pool, QueryExecutor::new()));
    let engine = Arc::new(ProtocolEngine::new(handler));
    HttpTransport::new(engine, "127.0.0.1", 0, "/sse", "/messages")
}

/// Incremental SSE frame parser over a response body stream.
struct SseReader {
    body: BodyDataStream,
    buffer: String,
}

impl SseReader {
    fn new(body: Body) -> Self {
        Self {
            body: body.into_data_stream(),
            buffer: String::new(),
        }
    }

    /// Read the next (event, data) pair, skipping keep-alive comments.
    async fn next_event(&mut self) -> (String, String) {
        loop {
            if let Some(pos) = self.buffer.find("\n\n") {
                let raw: String = self.buffer.drain(..pos + 2).collect();
                let mut event_type = String::from("message");
                let mut data = String::new();
                for line in raw.lines() {
                    if let Some(rest) = line.strip_prefix("event:") {
                        event_type = rest.trim().to_string();
                    } else if let Some(rest) = line.strip_prefix("data:") {
                        if !data.is_empty() {
                            data.push('\n');
                        }
                        data.push_str(rest.trim_start());
                    }
                }
                // Comment-only blocks (keep-alives) carry no data
                if data.is_empty() && raw.trim_start().starts_with(':') {
                    continue;
                }
                return (event_type, data);
            }

            let chunk = timeout(Duration::from_secs(5), self.body.next())
                .await
                .expect("timed out waiting for SSE data")
                .expect("SSE stream ended unexpectedly")
                .expect("SSE stream errored");
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}

async fn open_stream(router: &Router) -> SseReader {
    let response = router
        .clone()
        .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));
    SseReader::new(response.into_body())
}

async fn post_json(router: &Router, uri: &str, body: Value) -> StatusCode {
    post_raw(router, uri, body.to_string()).await
}

async fn post_raw(router: &Router, uri: &str, body: String) -> StatusCode {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let transport = test_transport();
    let router = transport.router();

    let response = router
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_without_session_id_is_bad_request() {
    let transport = test_transport();
    let router = transport.router();

    let status = post_json(&router, "/messages", json!({"jsonrpc": "2.0", "method": "ping"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_post_with_unknown_session_is_not_found() {
    let transport = test_transport();
    let router = transport.router();

    let status = post_json(
        &router,
        "/messages?session_id=unknown-id",
        json!({"jsonrpc": "2.0", "id": 0, "method": "initialize"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(transport.registry().is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let transport = test_transport();
    let router = transport.router();

    let mut stream = open_stream(&router).await;
    let (_, submit_uri) = stream.next_event().await;

    let status = post_raw(&router, &submit_uri, "this is not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A JSON body without the JSON-RPC shape is rejected too
    let status = post_raw(&router, &submit_uri, json!({"hello": "world"}).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stream_announces_submission_address() {
    let transport = test_transport();
    let router = transport.router();

    let mut stream = open_stream(&router).await;
    let (event, data) = stream.next_event().await;

    assert_eq!(event, "endpoint");
    assert!(data.starts_with("/messages?session_id="), "got: {data}");
    let session_id = data.rsplit('=').next().unwrap();
    assert!(transport.registry().contains(session_id));
}

/// The end-to-end scenario: open stream, handshake, call the tool, and
/// receive every response as a frame on the stream.
#[tokio::test]
async fn test_end_to_end_session() {
    let transport = test_transport();
    let router = transport.router();

    let mut stream = open_stream(&router).await;
    let (_, submit_uri) = stream.next_event().await;

    // initialize -> 202, response arrives as a frame with id 0
    let status = post_json(
        &router,
        &submit_uri,
        json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "e2e", "version": "0"}
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (event, data) = stream.next_event().await;
    assert_eq!(event, "message");
    let frame: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(frame["id"], json!(0));
    assert_eq!(frame["result"]["protocolVersion"], json!(PROTOCOL_VERSION));

    // initialized notification -> 202, no frame
    let status = post_json(
        &router,
        &submit_uri,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // tools/call with a write statement -> 202, execution-level error frame
    let status = post_json(
        &router,
        &submit_uri,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "query", "arguments": {"sql": "DELETE FROM t"}}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (event, data) = stream.next_event().await;
    assert_eq!(event, "message");
    let frame: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(frame["id"], json!(1));
    assert_eq!(frame["result"]["isError"], json!(true));
    let text = frame["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("INVALID_QUERY"));
}

/// A submission for an unknown session pushes nothing on open streams.
#[tokio::test]
async fn test_unknown_session_post_does_not_leak_frames() {
    let transport = test_transport();
    let router = transport.router();

    let mut stream = open_stream(&router).await;
    let (_, submit_uri) = stream.next_event().await;

    let status = post_json(
        &router,
        "/messages?session_id=someone-else",
        json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The next frame on the open stream is the response to its own ping,
    // not anything triggered by the rejected submission
    let status = post_json(
        &router,
        &submit_uri,
        json!({"jsonrpc": "2.0", "id": 42, "method": "ping"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, data) = stream.next_event().await;
    let frame: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(frame["id"], json!(42));
}

/// Closing the stream tears the session down; its id stops resolving.
#[tokio::test]
async fn test_disconnect_invalidates_session() {
    let transport = test_transport();
    let router = transport.router();

    let mut stream = open_stream(&router).await;
    let (_, submit_uri) = stream.next_event().await;
    assert_eq!(transport.registry().len(), 1);

    // Peer disconnect: the response body (and with it the pump) is dropped
    drop(stream);
    assert!(transport.registry().is_empty());

    let status = post_json(
        &router,
        &submit_uri,
        json!({"jsonrpc": "2.0", "id": 0, "method": "ping"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
