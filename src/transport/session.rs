//! Session registry and per-session duplex channels.
//!
//! A session correlates two independently-routed HTTP interactions: the
//! long-lived SSE connection (server-to-client) and the short-lived message
//! POSTs (client-to-server). Each session owns two independent FIFO queues:
//!
//! - the receive queue carries parsed JSON-RPC requests from the submission
//!   endpoint to the protocol engine;
//! - the send queue carries serialized response frames from the engine to
//!   the SSE pump.
//!
//! The registry holds only the submission side (the receive queue's sender).
//! Invariant: a session id is present in the registry exactly while its event
//! stream is open. Removal closes the receive queue, which terminates the
//! engine task; the engine dropping its sender then ends the SSE stream.

use crate::error::{ServerError, ServerResult};
use crate::protocol::message::JsonRpcRequest;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

type SessionMap = HashMap<String, mpsc::UnboundedSender<JsonRpcRequest>>;

/// Both private ends of a freshly created session's channel pair.
///
/// The SSE endpoint keeps `outbound_rx` for the pump loop and hands
/// `inbound_rx` / `outbound_tx` to the protocol engine task.
pub struct SessionStreams {
    /// Unguessable session identifier (UUID v4)
    pub id: String,
    /// Receive queue consumer - drained by the protocol engine
    pub inbound_rx: mpsc::UnboundedReceiver<JsonRpcRequest>,
    /// Send queue producer - the protocol engine publishes frames here
    pub outbound_tx: mpsc::UnboundedSender<String>,
    /// Send queue consumer - pumped onto the event stream
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
}

/// Process-wide registry of open sessions.
///
/// Cloning is cheap; all clones share the same map. The registry is handed to
/// both transport endpoints explicitly - never reconstructed per request.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<SessionMap>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionMap> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionMap> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new session and register its submission side.
    ///
    /// The channel pair is created atomically with the registry entry; both
    /// queues live and die with the session.
    pub fn create(&self) -> SessionStreams {
        let id = Uuid::new_v4().to_string();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        self.write().insert(id.clone(), inbound_tx);
        info!(session_id = %id, "Session created");

        SessionStreams {
            id,
            inbound_rx,
            outbound_tx,
            outbound_rx,
        }
    }

    /// Enqueue an inbound message for a session.
    ///
    /// Lookup and enqueue happen under one read lock, so a session removed
    /// concurrently is reported as not found rather than silently dropping
    /// the message.
    pub fn push(&self, session_id: &str, message: JsonRpcRequest) -> ServerResult<()> {
        let sessions = self.read();
        let Some(tx) = sessions.get(session_id) else {
            return Err(ServerError::session_not_found(session_id));
        };
        // send only fails if the engine side is gone; the session is as good
        // as closed at that point
        tx.send(message)
            .map_err(|_| ServerError::session_not_found(session_id))
    }

    /// Whether a session id is currently registered.
    pub fn contains(&self, session_id: &str) -> bool {
        self.read().contains_key(session_id)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry has no open sessions.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove a session. Idempotent: removing an absent id is a no-op.
    ///
    /// Returns true if the session was present. Dropping the stored sender
    /// closes the receive queue, which terminates the session's engine task.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.write().remove(session_id).is_some();
        if removed {
            info!(session_id = %session_id, "Session removed");
        }
        removed
    }
}

/// Guard that removes a session from the registry exactly once.
///
/// Owned by the SSE response stream, so removal runs on every exit path:
/// peer disconnect, server shutdown, or unwinding. Racing an explicit
/// `remove` is harmless because removal is idempotent.
pub struct SessionGuard {
    registry: SessionRegistry,
    id: String,
}

impl SessionGuard {
    pub fn new(registry: SessionRegistry, id: String) -> Self {
        Self { registry, id }
    }

    /// The guarded session id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.registry.remove(&self.id) {
            debug!(session_id = %self.id, "Session torn down by stream guard");
        }
    }
}
