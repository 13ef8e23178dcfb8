//! Per-connection metadata.
//!
//! A [`Scope`] is created by the server for every connection and never changes afterwards, with
//! one exception: [`Scope::normalize`] fills in the method for connection kinds that do not carry
//! one, before any request is built from the scope.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::ProtocolError;

/// The method assumed for scopes that carry none, websocket scopes in particular.
pub const DEFAULT_METHOD: &str = "GET";

/// The kind of a connection, the `type` field of its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Http,
    Websocket,
    Lifespan,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Http => "http",
            ConnectionKind::Websocket => "websocket",
            ConnectionKind::Lifespan => "lifespan",
        }
    }

    /// Returns true for the kinds that are served through the request pipeline.
    #[inline]
    pub fn is_request(&self) -> bool {
        matches!(self, ConnectionKind::Http | ConnectionKind::Websocket)
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection metadata: kind, method, path, headers and any protocol-specific fields.
///
/// Fields this crate does not interpret (`scheme`, `client`, `server`, `subprotocols`, ...) are
/// kept verbatim in [`Scope::extra`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(rename = "type")]
    kind: ConnectionKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,

    #[serde(default = "default_path")]
    path: String,

    #[serde(default)]
    root_path: String,

    #[serde(default)]
    query_string: Bytes,

    #[serde(default)]
    headers: Vec<(Bytes, Bytes)>,

    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn default_path() -> String {
    "/".to_string()
}

impl Scope {
    pub fn new(kind: ConnectionKind) -> Self {
        Self {
            kind,
            method: None,
            path: default_path(),
            root_path: String::new(),
            query_string: Bytes::new(),
            headers: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Parses a scope from its JSON representation.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        serde_json::from_value(value).map_err(ProtocolError::invalid_scope)
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    #[must_use]
    pub fn with_query_string(mut self, query_string: impl Into<Bytes>) -> Self {
        self.query_string = query_string.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Supplies [`DEFAULT_METHOD`] when the scope has no method.
    ///
    /// Websocket scopes never carry a method on the wire; other kinds may omit it too. An
    /// explicitly present method is left untouched.
    pub fn normalize(&mut self) {
        if self.method.is_none() {
            self.method = Some(DEFAULT_METHOD.to_string());
        }
    }

    /// Consuming variant of [`Scope::normalize`].
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn query_string(&self) -> &Bytes {
        &self.query_string
    }

    pub fn headers(&self) -> &[(Bytes, Bytes)] {
        &self.headers
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn websocket_without_method_defaults_to_get() {
        let scope = Scope::new(ConnectionKind::Websocket).normalized();
        assert_eq!(scope.method(), Some("GET"));
    }

    #[test]
    fn explicit_method_is_never_overwritten() {
        let scope = Scope::new(ConnectionKind::Http).with_method("POST").normalized();
        assert_eq!(scope.method(), Some("POST"));

        let scope = Scope::new(ConnectionKind::Websocket).with_method("OPTIONS").normalized();
        assert_eq!(scope.method(), Some("OPTIONS"));
    }

    #[test]
    fn http_without_method_defaults_to_get() {
        let mut scope = Scope::new(ConnectionKind::Http);
        scope.normalize();
        assert_eq!(scope.method(), Some("GET"));
    }

    #[test]
    fn parse_from_json() {
        let scope = Scope::from_value(json!({
            "type": "websocket",
            "path": "/ws/chat",
            "query_string": "room=1",
            "headers": [["host", "example.com"]],
            "scheme": "ws",
            "subprotocols": ["chat"],
        }))
        .unwrap();

        assert_eq!(scope.kind(), ConnectionKind::Websocket);
        assert_eq!(scope.method(), None);
        assert_eq!(scope.path(), "/ws/chat");
        assert_eq!(scope.root_path(), "");
        assert_eq!(scope.query_string().as_ref(), b"room=1");
        assert_eq!(scope.headers(), &[(Bytes::from("host"), Bytes::from("example.com"))]);
        assert_eq!(scope.extra().get("scheme"), Some(&json!("ws")));
        assert_eq!(scope.extra().get("subprotocols"), Some(&json!(["chat"])));
    }

    #[test]
    fn unknown_kind_is_invalid() {
        let result = Scope::from_value(json!({"type": "webtransport"}));
        assert!(matches!(result, Err(ProtocolError::InvalidScope { .. })));
    }
}
