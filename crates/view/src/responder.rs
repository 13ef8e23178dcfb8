//! Conversion of view return values into a [`ViewResult`].
//!
//! Views built with [`view_fn`](crate::view_fn) may return anything implementing [`Responder`]:
//! a [`Response`], text, a status paired with another responder, or a `Result` whose error
//! converts into a [`ViewError`].

use http::StatusCode;

use crate::ViewError;
use crate::response::Response;
use crate::view::ViewResult;

pub trait Responder {
    fn into_view_result(self) -> ViewResult;
}

impl Responder for Response {
    fn into_view_result(self) -> ViewResult {
        Ok(Some(self))
    }
}

/// `None` is a view that returned nothing.
impl Responder for Option<Response> {
    fn into_view_result(self) -> ViewResult {
        Ok(self)
    }
}

impl<T, E> Responder for Result<T, E>
where
    T: Responder,
    E: Into<ViewError>,
{
    fn into_view_result(self) -> ViewResult {
        match self {
            Ok(t) => t.into_view_result(),
            Err(e) => Err(e.into()),
        }
    }
}

impl<T: Responder> Responder for (StatusCode, T) {
    fn into_view_result(self) -> ViewResult {
        let (status, responder) = self;
        Ok(responder.into_view_result()?.map(|response| response.with_status(status)))
    }
}

impl<T: Responder> Responder for Box<T> {
    fn into_view_result(self) -> ViewResult {
        (*self).into_view_result()
    }
}

impl Responder for () {
    fn into_view_result(self) -> ViewResult {
        Ok(None)
    }
}

impl Responder for &'static str {
    fn into_view_result(self) -> ViewResult {
        Ok(Some(Response::text(self)))
    }
}

impl Responder for String {
    fn into_view_result(self) -> ViewResult {
        Ok(Some(Response::text(self)))
    }
}
