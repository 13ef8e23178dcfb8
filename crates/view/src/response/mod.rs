//! Responses produced by views and hooks.
//!
//! A [`Response`] carries a status, an ordered header mapping, a set of cookies and a
//! [`ResponseBody`]. It may also be *deferred*: its content is rendered from a template only
//! once every template response hook has run. Callbacks registered with
//! [`Response::on_close`] run exactly once when the response is dropped, which the streamer
//! does after emitting it, whatever the outcome.

mod body;
mod cookie;
mod deferred;

pub use body::ResponseBody;
pub use cookie::Cookie;
pub use cookie::SameSite;
pub use deferred::BlockingRender;
pub use deferred::Context;
pub use deferred::Deferred;
pub use deferred::Render;
pub use deferred::Renderer;

use std::fmt;

use bytes::Bytes;
use http::StatusCode;
use tracing::trace;

const CONTENT_TYPE: &str = "Content-Type";

/// Response headers, kept in insertion order. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    entries: Vec<(String, String)>,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type CloseFn = Box<dyn FnOnce() + Send>;

pub struct Response {
    status: StatusCode,
    headers: ResponseHeaders,
    cookies: Vec<Cookie>,
    body: ResponseBody,
    deferred: Option<Deferred>,
    upgrade: bool,
    on_close: Vec<CloseFn>,
}

impl Response {
    /// A `200 OK` HTML response.
    pub fn new(body: impl Into<ResponseBody>) -> Self {
        Self::with_content_type(body.into(), mime::TEXT_HTML_UTF_8.as_ref())
    }

    /// A `200 OK` plain text response.
    pub fn text(body: impl Into<ResponseBody>) -> Self {
        Self::with_content_type(body.into(), mime::TEXT_PLAIN_UTF_8.as_ref())
    }

    /// A `200 OK` response whose content is rendered later, after template response hooks ran.
    pub fn deferred(deferred: Deferred) -> Self {
        let mut response = Self::new(ResponseBody::empty());
        response.deferred = Some(deferred);
        response
    }

    /// The response returned by a view that took the connection channel over, to drive a
    /// protocol upgrade itself. Nothing is emitted for it.
    pub fn upgrade() -> Self {
        let mut response = Self::bare(StatusCode::SWITCHING_PROTOCOLS, ResponseBody::empty());
        response.upgrade = true;
        response
    }

    fn with_content_type(body: ResponseBody, content_type: &str) -> Self {
        let mut response = Self::bare(StatusCode::OK, body);
        response.headers.insert(CONTENT_TYPE, content_type);
        response
    }

    fn bare(status: StatusCode, body: ResponseBody) -> Self {
        Self {
            status,
            headers: ResponseHeaders::new(),
            cookies: Vec::new(),
            body,
            deferred: None,
            upgrade: false,
            on_close: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    #[inline]
    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut ResponseHeaders {
        &mut self.headers
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Sets a cookie, replacing one already set with the same name.
    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.cookies.retain(|c| c.name() != cookie.name());
        self.cookies.push(cookie);
    }

    pub fn delete_cookie(&mut self, name: impl Into<String>) {
        self.set_cookie(Cookie::expired(name));
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn take_body(&mut self) -> ResponseBody {
        std::mem::take(&mut self.body)
    }

    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.body.is_streaming()
    }

    /// Replaces the body with buffered content, completing a deferred response.
    pub fn set_content(&mut self, content: Bytes) {
        self.body = ResponseBody::once(content);
        self.deferred = None;
    }

    #[inline]
    pub fn is_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    pub fn deferred_mut(&mut self) -> Option<&mut Deferred> {
        self.deferred.as_mut()
    }

    pub fn take_deferred(&mut self) -> Option<Deferred> {
        self.deferred.take()
    }

    #[inline]
    pub fn is_upgrade(&self) -> bool {
        self.upgrade
    }

    /// Registers a callback run when the response is closed.
    pub fn on_close<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_close.push(Box::new(f));
    }

    /// Releases the response, running its close callbacks in registration order.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        if !self.on_close.is_empty() {
            trace!(callbacks = self.on_close.len(), "closing response");
        }
        for f in self.on_close.drain(..) {
            f();
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("body", &self.body)
            .field("deferred", &self.deferred)
            .field("upgrade", &self.upgrade)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn headers_are_case_insensitive_and_ordered() {
        let mut headers = ResponseHeaders::new();
        headers.insert("X-First", "1");
        headers.insert("Content-Type", "text/plain");
        headers.insert("x-first", "2");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("X-FIRST"), Some("2"));
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec![("X-First", "2"), ("Content-Type", "text/plain")]);

        assert_eq!(headers.remove("content-type"), Some("text/plain".to_string()));
        assert!(!headers.contains("Content-Type"));
    }

    #[test]
    fn new_response_defaults() {
        let response = Response::new("hi");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-type"), Some("text/html; charset=utf-8"));
        assert!(!response.is_streaming());
        assert!(!response.is_deferred());
        assert!(!response.is_upgrade());
    }

    #[test]
    fn upgrade_response_has_no_headers() {
        let response = Response::upgrade();

        assert!(response.is_upgrade());
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert!(response.headers().is_empty());
    }

    #[test]
    fn cookies_replace_by_name() {
        let mut response = Response::new(());
        response.set_cookie(Cookie::new("a", "1"));
        response.set_cookie(Cookie::new("b", "2"));
        response.delete_cookie("a");

        let names: Vec<_> = response.cookies().iter().map(|c| (c.name(), c.value())).collect();
        assert_eq!(names, vec![("b", "2"), ("a", "")]);
    }

    #[test]
    fn close_callbacks_run_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut response = Response::new(());
        for _ in 0..2 {
            let closed = Arc::clone(&closed);
            response.on_close(move || {
                closed.fetch_add(1, Ordering::SeqCst);
            });
        }

        response.close();

        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn set_content_completes_deferred() {
        struct Never;
        impl BlockingRender for Never {
            fn render(&self, _: &str, _: &Context) -> Result<Bytes, crate::ViewError> {
                unreachable!()
            }
        }

        let deferred = Deferred::new("index.html", Context::new(), crate::Exec::Blocking(Arc::new(Never)));
        let mut response = Response::deferred(deferred);
        assert!(response.is_deferred());

        response.set_content(Bytes::from_static(b"<p>done</p>"));

        assert!(!response.is_deferred());
        assert_eq!(response.body().content(), Some(&b"<p>done</p>"[..]));
    }
}
