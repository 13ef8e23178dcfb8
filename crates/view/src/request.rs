use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use micro_frame::protocol::{ConnectionKind, DEFAULT_METHOD, Scope};
use micro_frame::transport::Channel;
use thiserror::Error;
use tokio::sync::Mutex;

/// The scope and complete body of one connection, as seen by middleware and views.
///
/// A request may also hold the connection's [`Channel`]. Views serving a protocol upgrade take
/// it with [`Request::take_channel`] and drive the connection themselves; otherwise the
/// application takes it back to stream the response.
pub struct Request {
    kind: ConnectionKind,
    method: Method,
    path: String,
    path_info: String,
    headers: HeaderMap,
    body: Bytes,
    scope: Scope,
    channel: Mutex<Option<Channel>>,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid method {method:?}")]
    InvalidMethod { method: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },
}

impl Request {
    pub fn new(scope: Scope, body: Bytes) -> Result<Self, RequestError> {
        let scope = scope.normalized();

        let method_str = scope.method().unwrap_or(DEFAULT_METHOD);
        let method = Method::from_bytes(method_str.as_bytes())
            .map_err(|_| RequestError::InvalidMethod { method: method_str.to_string() })?;

        let mut headers = HeaderMap::with_capacity(scope.headers().len());
        for (name, value) in scope.headers() {
            let name = HeaderName::from_bytes(name).map_err(|e| RequestError::InvalidHeader { reason: e.to_string() })?;
            let value = HeaderValue::from_bytes(value).map_err(|e| RequestError::InvalidHeader { reason: e.to_string() })?;
            headers.append(name, value);
        }

        let path = scope.path().to_string();
        let path_info = strip_root_path(&path, scope.root_path()).to_string();

        Ok(Self {
            kind: scope.kind(),
            method,
            path,
            path_info,
            headers,
            body,
            scope,
            channel: Mutex::new(None),
        })
    }

    pub fn with_channel(self, channel: Channel) -> Self {
        Self { channel: Mutex::new(Some(channel)), ..self }
    }

    #[inline]
    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The full request path, root path included.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path below the application's root path, what routes are matched against.
    #[inline]
    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    pub fn query_string(&self) -> &[u8] {
        self.scope.query_string()
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Takes the connection channel. Only the first call gets it.
    pub async fn take_channel(&self) -> Option<Channel> {
        self.channel.lock().await.take()
    }
}

fn strip_root_path<'a>(path: &'a str, root_path: &str) -> &'a str {
    if root_path.is_empty() {
        return path;
    }
    match path.strip_prefix(root_path.trim_end_matches('/')) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("kind", &self.kind)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}
