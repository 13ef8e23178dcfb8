use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::{error, warn};

use crate::error::DispatchError;
use crate::request::Request;
use crate::response::Response;

/// One layer of the request pipeline: a middleware, or the dispatcher at the core.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Arc<Request>) -> Result<Response, DispatchError>;
}

#[async_trait]
impl<T: RequestHandler + ?Sized> RequestHandler for Arc<T> {
    async fn handle(&self, request: Arc<Request>) -> Result<Response, DispatchError> {
        (**self).handle(request).await
    }
}

/// A [`RequestHandler`] backed by an async function.
pub struct FnHandler<F> {
    f: F,
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Arc<Request>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, DispatchError>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(Arc<Request>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, DispatchError>> + Send,
{
    async fn handle(&self, request: Arc<Request>) -> Result<Response, DispatchError> {
        (self.f)(request).await
    }
}

/// Turns every error escaping the wrapped layer into a response, so the layer outside of it
/// always gets one.
pub struct ExceptionConverter {
    inner: Arc<dyn RequestHandler>,
    debug: bool,
}

impl ExceptionConverter {
    pub fn new(inner: Arc<dyn RequestHandler>, debug: bool) -> Self {
        Self { inner, debug }
    }
}

pub fn convert_exception_to_response(inner: Arc<dyn RequestHandler>, debug: bool) -> Arc<dyn RequestHandler> {
    Arc::new(ExceptionConverter::new(inner, debug))
}

#[async_trait]
impl RequestHandler for ExceptionConverter {
    async fn handle(&self, request: Arc<Request>) -> Result<Response, DispatchError> {
        let path = request.path().to_string();
        match self.inner.handle(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                let response = response_for_error(&e, self.debug);
                if response.status().is_server_error() {
                    error!(path, status = response.status().as_u16(), cause = %e, "request failed");
                } else {
                    warn!(path, status = response.status().as_u16(), cause = %e, "request rejected");
                }
                Ok(response)
            }
        }
    }
}

/// The generic response for an unhandled error. Error details are only exposed in debug mode.
pub fn response_for_error(error: &DispatchError, debug: bool) -> Response {
    let status = error.status();
    let reason = status.canonical_reason().unwrap_or("Error");
    let body = if debug { format!("{} {reason}\n\n{error}\n", status.as_u16()) } else { format!("{} {reason}\n", status.as_u16()) };
    Response::text(body).with_status(status)
}

/// The response sent when the connection's scope can't be turned into a request.
pub(crate) fn bad_request(reason: &str, debug: bool) -> Response {
    let body = if debug { format!("400 Bad Request\n\n{reason}\n") } else { "400 Bad Request\n".to_string() };
    Response::text(body).with_status(StatusCode::BAD_REQUEST)
}
