//! Per-connection transport.
//!
//! A [`Transport`] owns the normalized [`Scope`] of one connection and the [`Channel`] bound to
//! it: the receive half (a stream of [`Incoming`] messages) and the send half (a sink of
//! [`Outgoing`] messages). It is created when a connection is handed to the application and
//! dropped when handling of that connection completes; it is never shared between connections.

use std::fmt::{self, Display};
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, trace};

use crate::protocol::{Incoming, Outgoing, ProtocolError, Scope};

type BoxSink = Pin<Box<dyn Sink<Outgoing, Error = ProtocolError> + Send>>;

/// The bound receive/send pair of one connection.
pub struct Channel {
    inbound: BoxStream<'static, Incoming>,
    outbound: BoxSink,
}

impl Channel {
    pub fn new<R, W>(receive: R, send: W) -> Self
    where
        R: Stream<Item = Incoming> + Send + 'static,
        W: Sink<Outgoing> + Send + 'static,
        W::Error: Display,
    {
        Self { inbound: receive.boxed(), outbound: Box::pin(send.sink_map_err(ProtocolError::send)) }
    }

    /// Receives the next message; `None` means the server closed the receive side.
    pub async fn receive(&mut self) -> Option<Incoming> {
        self.inbound.next().await
    }

    /// Sends a message and flushes it.
    pub async fn send(&mut self, message: Outgoing) -> Result<(), ProtocolError> {
        self.outbound.send(message).await
    }

    /// Buffers a message without flushing.
    pub async fn feed(&mut self, message: Outgoing) -> Result<(), ProtocolError> {
        self.outbound.feed(message).await
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Transport {
    scope: Scope,
    channel: Channel,
}

impl Transport {
    /// Binds a connection. The scope is normalized here, before anything reads it.
    pub fn new<R, W>(scope: Scope, receive: R, send: W) -> Self
    where
        R: Stream<Item = Incoming> + Send + 'static,
        W: Sink<Outgoing> + Send + 'static,
        W::Error: Display,
    {
        Self { scope: scope.normalized(), channel: Channel::new(receive, send) }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn into_parts(self) -> (Scope, Channel) {
        (self.scope, self.channel)
    }

    /// Reads the request body until a message arrives with `more_body = false`.
    ///
    /// A disconnect, or the receive side ending before the body is complete, fails with
    /// [`ProtocolError::Aborted`]; the caller drops the connection without responding. A lifespan
    /// message has no place on a request connection and fails with
    /// [`ProtocolError::UnexpectedMessage`]. Any other message (`websocket.connect` for instance)
    /// carries no body and ends the read.
    pub async fn read_body(&mut self) -> Result<Bytes, ProtocolError> {
        let mut buf: Option<BytesMut> = None;
        loop {
            match self.channel.receive().await {
                Some(Incoming::HttpRequest { body, more_body }) => {
                    if let Some(acc) = buf.as_mut() {
                        acc.extend_from_slice(&body);
                    } else if !more_body {
                        // single message body, no copy needed
                        return Ok(body);
                    } else {
                        buf = Some(BytesMut::from(body.as_ref()));
                    }

                    if !more_body {
                        break;
                    }
                }
                Some(message) if message.is_disconnect() => {
                    debug!(message_type = message.type_name(), "client disconnected while reading body");
                    return Err(ProtocolError::Aborted);
                }
                Some(message) if message.is_lifespan() => {
                    let kind = self.scope.kind();
                    debug!(message_type = message.type_name(), %kind, "lifespan message on a request connection");
                    return Err(ProtocolError::unexpected_message(message.type_name(), kind.as_str()));
                }
                Some(message) => {
                    trace!(message_type = message.type_name(), "message without body ends body read");
                    break;
                }
                None => {
                    debug!("receive side closed while reading body");
                    return Err(ProtocolError::Aborted);
                }
            }
        }

        Ok(buf.map(BytesMut::freeze).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectionKind;
    use futures::channel::mpsc;

    fn transport(scope: Scope, messages: Vec<Incoming>) -> (Transport, mpsc::Receiver<Outgoing>) {
        let (send, outgoing) = mpsc::channel(16);
        (Transport::new(scope, futures::stream::iter(messages), send), outgoing)
    }

    #[tokio::test]
    async fn single_message_body() {
        let scope = Scope::new(ConnectionKind::Http).with_method("POST");
        let (mut transport, _rx) = transport(scope, vec![Incoming::http_request("abc", false)]);

        let body = transport.read_body().await.unwrap();
        assert_eq!(body, Bytes::from_static(b"abc"));
        assert_eq!(transport.scope().method(), Some("POST"));
    }

    #[tokio::test]
    async fn body_across_messages() {
        let messages = vec![
            Incoming::http_request("hello", true),
            Incoming::http_request("", true),
            Incoming::http_request(" world", false),
            // never read
            Incoming::http_request("!", false),
        ];
        let (mut transport, _rx) = transport(Scope::new(ConnectionKind::Http), messages);

        assert_eq!(transport.read_body().await.unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn disconnect_mid_body_aborts() {
        let messages = vec![Incoming::http_request("hel", true), Incoming::HttpDisconnect];
        let (mut transport, _rx) = transport(Scope::new(ConnectionKind::Http), messages);

        assert!(transport.read_body().await.unwrap_err().is_aborted());
    }

    #[tokio::test]
    async fn closed_receive_side_aborts() {
        let (mut transport, _rx) = transport(Scope::new(ConnectionKind::Http), vec![Incoming::http_request("a", true)]);

        assert!(transport.read_body().await.unwrap_err().is_aborted());
    }

    #[tokio::test]
    async fn websocket_connect_has_empty_body() {
        let (mut transport, _rx) = transport(Scope::new(ConnectionKind::Websocket), vec![Incoming::WebsocketConnect]);

        assert!(transport.read_body().await.unwrap().is_empty());
        assert_eq!(transport.scope().method(), Some("GET"));
    }

    #[tokio::test]
    async fn lifespan_message_on_request_connection_fails() {
        let (mut transport, _rx) = transport(Scope::new(ConnectionKind::Http), vec![Incoming::LifespanShutdown]);

        let err = transport.read_body().await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedMessage { message_type: "lifespan.shutdown", kind: "http" }));
        assert!(!err.is_aborted());
    }

    #[tokio::test]
    async fn channel_send_reaches_peer() {
        let (transport, mut rx) = transport(Scope::new(ConnectionKind::Http), vec![]);
        let (_scope, mut channel) = transport.into_parts();

        channel.send(Outgoing::closing_body()).await.unwrap();
        assert_eq!(rx.try_next().unwrap(), Some(Outgoing::closing_body()));
    }

    #[tokio::test]
    async fn send_after_peer_dropped_fails() {
        let (transport, rx) = transport(Scope::new(ConnectionKind::Http), vec![]);
        drop(rx);
        let (_scope, mut channel) = transport.into_parts();

        let result = channel.send(Outgoing::closing_body()).await;
        assert!(matches!(result, Err(ProtocolError::Send { .. })));
    }
}
