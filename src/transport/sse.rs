//! SSE transport endpoints.
//!
//! Two handlers bridge each client to its session:
//!
//! - [`event_stream`] (GET): allocates a session, announces the submission
//!   address as the first `endpoint` frame, then pumps the session's send
//!   queue as `message` frames until the peer disconnects.
//! - [`post_message`] (POST): resolves the session named by the `session_id`
//!   query parameter, enqueues the body onto its receive queue and answers
//!   202 immediately. The acknowledgement confirms enqueue only - never
//!   processing.
//!
//! The response stream owns a [`SessionGuard`], so the registry entry is
//! released on every exit path of the pump, including unwinding.

use crate::protocol::ProtocolEngine;
use crate::protocol::message::{JSONRPC_VERSION, JsonRpcRequest};
use crate::transport::session::{SessionGuard, SessionRegistry, SessionStreams};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Interval for SSE keep-alive comments. Keeps intermediaries from timing
/// out the stream and surfaces dead peers as write failures.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Shared state injected into both transport endpoints.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub engine: Arc<ProtocolEngine>,
    /// Path announced to clients for message submission
    pub messages_path: String,
}

/// Query parameters of the submission endpoint.
#[derive(Debug, Deserialize)]
pub struct MessageParams {
    session_id: Option<String>,
}

/// GET handler: open an event stream and bind a new session to it.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let SessionStreams {
        id,
        inbound_rx,
        outbound_tx,
        outbound_rx,
    } = state.registry.create();

    // The guard lives inside the response stream: dropping the stream -
    // peer disconnect, shutdown, panic - removes the session exactly once.
    let guard = SessionGuard::new(state.registry.clone(), id.clone());

    // One engine task per session. It exits when session removal closes the
    // receive queue.
    let engine = state.engine.clone();
    let session_id = id.clone();
    tokio::spawn(async move {
        engine.run(&session_id, inbound_rx, outbound_tx).await;
    });

    let submit_uri = format!("{}?session_id={}", state.messages_path, id);
    info!(session_id = %id, "Event stream connected");

    let stream = SessionEventStream {
        announce: Some(Event::default().event("endpoint").data(submit_uri)),
        outbound_rx,
        _guard: guard,
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

/// POST handler: inject one message into the session named by the query.
///
/// Transport-level failures (missing/unknown session, malformed body) are
/// answered here and never reach the protocol engine.
pub async fn post_message(
    State(state): State<AppState>,
    Query(params): Query<MessageParams>,
    body: Bytes,
) -> Response {
    let Some(session_id) = params.session_id else {
        return (StatusCode::BAD_REQUEST, "session_id is required").into_response();
    };

    let message: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            debug!(session_id = %session_id, error = %e, "Rejecting malformed message");
            return (StatusCode::BAD_REQUEST, "Could not parse message").into_response();
        }
    };
    if message.jsonrpc != JSONRPC_VERSION {
        return (StatusCode::BAD_REQUEST, "Unsupported JSON-RPC version").into_response();
    }

    match state.registry.push(&session_id, message) {
        Ok(()) => (StatusCode::ACCEPTED, "Accepted").into_response(),
        Err(_) => {
            warn!(session_id = %session_id, "Message for unknown session");
            (StatusCode::NOT_FOUND, "Could not find session").into_response()
        }
    }
}

/// The per-session SSE body: one `endpoint` announcement, then every frame
/// the protocol engine publishes, in enqueue order.
///
/// Ends when the send queue closes (engine finished after session removal).
struct SessionEventStream {
    announce: Option<Event>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    _guard: SessionGuard,
}

impl Stream for SessionEventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(event) = this.announce.take() {
            return Poll::Ready(Some(Ok(event)));
        }
        match this.outbound_rx.poll_recv(cx) {
            Poll::Ready(Some(frame)) => {
                Poll::Ready(Some(Ok(Event::default().event("message").data(frame))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
