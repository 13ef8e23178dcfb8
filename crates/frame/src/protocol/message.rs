//! Tagged message records exchanged over a connection.
//!
//! Every message carries its `type` as discriminator. Unit variants serialize to a bare
//! `{"type": ...}` record, the others carry their fields alongside the tag.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

fn normal_closure() -> u16 {
    1000
}

/// Messages received from the server side of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Incoming {
    /// A piece of the request body; `more_body = false` marks the last one.
    #[serde(rename = "http.request")]
    HttpRequest {
        #[serde(default)]
        body: Bytes,
        #[serde(default)]
        more_body: bool,
    },

    #[serde(rename = "http.disconnect")]
    HttpDisconnect,

    #[serde(rename = "websocket.connect")]
    WebsocketConnect,

    #[serde(rename = "websocket.receive")]
    WebsocketReceive {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<Bytes>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },

    #[serde(rename = "websocket.disconnect")]
    WebsocketDisconnect {
        #[serde(default = "normal_closure")]
        code: u16,
    },

    #[serde(rename = "lifespan.startup")]
    LifespanStartup,

    #[serde(rename = "lifespan.shutdown")]
    LifespanShutdown,
}

impl Incoming {
    pub fn http_request(body: impl Into<Bytes>, more_body: bool) -> Self {
        Self::HttpRequest { body: body.into(), more_body }
    }

    /// The wire name of this message, its `type` field.
    pub fn type_name(&self) -> &'static str {
        match self {
            Incoming::HttpRequest { .. } => "http.request",
            Incoming::HttpDisconnect => "http.disconnect",
            Incoming::WebsocketConnect => "websocket.connect",
            Incoming::WebsocketReceive { .. } => "websocket.receive",
            Incoming::WebsocketDisconnect { .. } => "websocket.disconnect",
            Incoming::LifespanStartup => "lifespan.startup",
            Incoming::LifespanShutdown => "lifespan.shutdown",
        }
    }

    /// Returns true if the client signalled it went away.
    #[inline]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Incoming::HttpDisconnect | Incoming::WebsocketDisconnect { .. })
    }

    #[inline]
    pub fn is_lifespan(&self) -> bool {
        matches!(self, Incoming::LifespanStartup | Incoming::LifespanShutdown)
    }
}

/// Messages sent to the server side of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Outgoing {
    /// Starts a response: status code plus the encoded header list.
    #[serde(rename = "http.response.start")]
    HttpResponseStart { status: u16, headers: Vec<(Bytes, Bytes)> },

    #[serde(rename = "http.response.body")]
    HttpResponseBody {
        #[serde(default)]
        body: Bytes,
        #[serde(default)]
        more_body: bool,
    },

    #[serde(rename = "websocket.accept")]
    WebsocketAccept {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subprotocol: Option<String>,
        #[serde(default)]
        headers: Vec<(Bytes, Bytes)>,
    },

    #[serde(rename = "websocket.send")]
    WebsocketSend {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<Bytes>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },

    #[serde(rename = "websocket.close")]
    WebsocketClose {
        #[serde(default = "normal_closure")]
        code: u16,
        #[serde(default)]
        reason: String,
    },

    #[serde(rename = "lifespan.startup.complete")]
    LifespanStartupComplete,

    #[serde(rename = "lifespan.startup.failed")]
    LifespanStartupFailed {
        #[serde(default)]
        message: String,
    },

    #[serde(rename = "lifespan.shutdown.complete")]
    LifespanShutdownComplete,

    #[serde(rename = "lifespan.shutdown.failed")]
    LifespanShutdownFailed {
        #[serde(default)]
        message: String,
    },
}

impl Outgoing {
    pub fn response_start(status: u16, headers: Vec<(Bytes, Bytes)>) -> Self {
        Self::HttpResponseStart { status, headers }
    }

    pub fn response_body(body: impl Into<Bytes>, more_body: bool) -> Self {
        Self::HttpResponseBody { body: body.into(), more_body }
    }

    /// The empty body frame that closes a streaming response.
    pub fn closing_body() -> Self {
        Self::HttpResponseBody { body: Bytes::new(), more_body: false }
    }

    /// The wire name of this message, its `type` field.
    pub fn type_name(&self) -> &'static str {
        match self {
            Outgoing::HttpResponseStart { .. } => "http.response.start",
            Outgoing::HttpResponseBody { .. } => "http.response.body",
            Outgoing::WebsocketAccept { .. } => "websocket.accept",
            Outgoing::WebsocketSend { .. } => "websocket.send",
            Outgoing::WebsocketClose { .. } => "websocket.close",
            Outgoing::LifespanStartupComplete => "lifespan.startup.complete",
            Outgoing::LifespanStartupFailed { .. } => "lifespan.startup.failed",
            Outgoing::LifespanShutdownComplete => "lifespan.shutdown.complete",
            Outgoing::LifespanShutdownFailed { .. } => "lifespan.shutdown.failed",
        }
    }
}
