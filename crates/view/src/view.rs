use std::any::type_name;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::exec::Exec;
use crate::request::Request;
use crate::responder::Responder;
use crate::response::Response;
use crate::ViewError;

/// What a view produces. `Ok(None)` means it returned nothing, a configuration error surfaced
/// by the dispatcher.
pub type ViewResult = Result<Option<Response>, ViewError>;

/// A view that runs on the dispatching task.
#[async_trait]
pub trait AsyncView: Send + Sync {
    async fn call(&self, request: Arc<Request>, args: ViewArgs) -> ViewResult;

    /// Used in error messages.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// A view that blocks; it is always called on the worker pool.
pub trait BlockingView: Send + Sync {
    fn call(&self, request: &Request, args: ViewArgs) -> ViewResult;

    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

pub type View = Exec<dyn AsyncView, dyn BlockingView>;

impl View {
    pub fn name(&self) -> &'static str {
        match self {
            Exec::Async(view) => view.name(),
            Exec::Blocking(view) => view.name(),
        }
    }
}

/// Positional and named arguments captured from the request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewArgs {
    args: Vec<String>,
    kwargs: BTreeMap<String, String>,
}

impl ViewArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn kwargs(&self) -> &BTreeMap<String, String> {
        &self.kwargs
    }

    pub fn kwarg(&self, name: &str) -> Option<&str> {
        self.kwargs.get(name).map(String::as_str)
    }
}

pub struct FnView<F> {
    f: F,
}

#[async_trait]
impl<F, Fut, R> AsyncView for FnView<F>
where
    F: Fn(Arc<Request>, ViewArgs) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send,
    R: Responder,
{
    async fn call(&self, request: Arc<Request>, args: ViewArgs) -> ViewResult {
        (self.f)(request, args).await.into_view_result()
    }

    fn name(&self) -> &'static str {
        type_name::<F>()
    }
}

pub struct BlockingFnView<F> {
    f: F,
}

impl<F, R> BlockingView for BlockingFnView<F>
where
    F: Fn(&Request, ViewArgs) -> R + Send + Sync,
    R: Responder,
{
    fn call(&self, request: &Request, args: ViewArgs) -> ViewResult {
        (self.f)(request, args).into_view_result()
    }

    fn name(&self) -> &'static str {
        type_name::<F>()
    }
}

/// Wraps an async function as a [`View`].
pub fn view_fn<F, Fut, R>(f: F) -> View
where
    F: Fn(Arc<Request>, ViewArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Responder + 'static,
{
    Exec::Async(Arc::new(FnView { f }))
}

/// Wraps a blocking function as a [`View`], offloaded to the worker pool when called.
pub fn blocking_view_fn<F, R>(f: F) -> View
where
    F: Fn(&Request, ViewArgs) -> R + Send + Sync + 'static,
    R: Responder + 'static,
{
    Exec::Blocking(Arc::new(BlockingFnView { f }))
}
