//! The message-framed connection protocol underneath `micro-view`.
//!
//! A server hands every accepted connection to the application as three things: a [`Scope`]
//! describing the connection, a stream of [`Incoming`] messages and a sink accepting [`Outgoing`]
//! messages. Each message is a record tagged by its `type` field, so the same types serialize to
//! the JSON shape servers exchange on the wire:
//!
//! ```text
//! {"type": "http.request", "body": [...], "more_body": false}
//! {"type": "http.response.start", "status": 200, "headers": [[...], [...]]}
//! {"type": "lifespan.startup.complete"}
//! ```
//!
//! # Connection kinds
//!
//! - `http`: one request/response exchange
//! - `websocket`: an upgraded connection; the view owning it speaks the websocket messages itself
//! - `lifespan`: the process startup/shutdown handshake, see [`lifespan`]
//!
//! # Architecture
//!
//! - [`protocol`]: scope, message and error types
//! - [`codec`]: header byte encodings and body chunking used when serializing responses
//! - [`transport`]: the per-connection [`Transport`] that normalizes the scope and reads the body
//! - [`lifespan`]: the startup/shutdown handshake loop
//!
//! # Example
//!
//! ```no_run
//! use futures::channel::mpsc;
//! use micro_frame::protocol::{ConnectionKind, Incoming, Outgoing, Scope};
//! use micro_frame::transport::Transport;
//!
//! # async fn run() -> Result<(), micro_frame::protocol::ProtocolError> {
//! let (mut client_tx, receive) = mpsc::channel::<Incoming>(8);
//! let (send, _client_rx) = mpsc::channel::<Outgoing>(8);
//!
//! client_tx.try_send(Incoming::http_request("abc", false)).unwrap();
//!
//! let scope = Scope::new(ConnectionKind::Http).with_method("POST");
//! let mut transport = Transport::new(scope, receive, send);
//! let body = transport.read_body().await?;
//! assert_eq!(&body[..], b"abc");
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod lifespan;
pub mod protocol;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;

pub use transport::Transport;
