//! Transport layer: the session/transport bridge.
//!
//! Multiplexes any number of independent client sessions over one SSE
//! connection per client (server push) plus out-of-band message POSTs
//! (client push), correlated by session id into a duplex channel per
//! session that feeds the protocol engine.

pub mod http;
pub mod session;
pub mod sse;

pub use http::HttpTransport;
pub use session::{SessionGuard, SessionRegistry, SessionStreams};
