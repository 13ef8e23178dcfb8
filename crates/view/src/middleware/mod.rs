//! Middleware: request handlers wrapping the rest of the pipeline, plus optional hooks the
//! dispatcher calls around the view.
//!
//! A middleware is produced by a [`MiddlewareFactory`] from the handler it wraps. The
//! [`ChainBuilder`] instantiates the configured middleware from last to first, so the first
//! identifier in the configuration becomes the outermost layer. Hooks are collected on the way:
//!
//! * view hooks run outermost first, before the view;
//! * template response hooks and exception hooks run innermost first.
//!
//! ```text
//!   configuration: [a, b, c]
//!
//!   request ─▶ a ─▶ b ─▶ c ─▶ dispatcher
//!   view hooks:               a, b, c
//!   exception hooks:          c, b, a
//! ```

mod chain;
mod registry;

pub use chain::ChainBuilder;
pub use chain::HookSet;
pub use chain::MiddlewareChain;
pub use registry::MiddlewareRegistry;

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ViewError;
use crate::exec::Exec;
use crate::handler::RequestHandler;
use crate::request::Request;
use crate::response::Response;
use crate::view::{View, ViewArgs, ViewResult};

/// Called with the resolved view before it runs. Returning a response skips the view.
#[async_trait]
pub trait ProcessView: Send + Sync {
    async fn process_view(&self, request: &Arc<Request>, view: &View, args: &ViewArgs) -> ViewResult;
}

/// Declaring one of these is a configuration error: view hooks must be async.
pub trait BlockingProcessView: Send + Sync {
    fn process_view(&self, request: &Request, view: &View, args: &ViewArgs) -> ViewResult;
}

/// Called with a deferred response before it is rendered; may return a different one.
#[async_trait]
pub trait ProcessTemplateResponse: Send + Sync {
    async fn process_template_response(&self, request: &Arc<Request>, response: Response) -> ViewResult;

    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

pub trait BlockingProcessTemplateResponse: Send + Sync {
    fn process_template_response(&self, request: &Request, response: Response) -> ViewResult;

    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// Called when the view or the render failed. The first hook returning a response wins.
#[async_trait]
pub trait ProcessException: Send + Sync {
    async fn process_exception(&self, request: &Arc<Request>, error: &ViewError) -> Option<Response>;
}

pub trait BlockingProcessException: Send + Sync {
    fn process_exception(&self, request: &Request, error: &ViewError) -> Option<Response>;
}

pub type ViewHook = Exec<dyn ProcessView, dyn BlockingProcessView>;
pub type TemplateResponseHook = Exec<dyn ProcessTemplateResponse, dyn BlockingProcessTemplateResponse>;
pub type ExceptionHook = Exec<dyn ProcessException, dyn BlockingProcessException>;

impl TemplateResponseHook {
    pub fn name(&self) -> &'static str {
        match self {
            Exec::Async(hook) => hook.name(),
            Exec::Blocking(hook) => hook.name(),
        }
    }
}

/// An optional hook a middleware declares when it is created.
#[derive(Debug, Clone)]
pub enum Capability {
    View(ViewHook),
    TemplateResponse(TemplateResponseHook),
    Exception(ExceptionHook),
}

impl Capability {
    pub fn view(hook: Arc<dyn ProcessView>) -> Self {
        Capability::View(Exec::Async(hook))
    }

    pub fn template_response(hook: Arc<dyn ProcessTemplateResponse>) -> Self {
        Capability::TemplateResponse(Exec::Async(hook))
    }

    pub fn blocking_template_response(hook: Arc<dyn BlockingProcessTemplateResponse>) -> Self {
        Capability::TemplateResponse(Exec::Blocking(hook))
    }

    pub fn exception(hook: Arc<dyn ProcessException>) -> Self {
        Capability::Exception(Exec::Async(hook))
    }

    pub fn blocking_exception(hook: Arc<dyn BlockingProcessException>) -> Self {
        Capability::Exception(Exec::Blocking(hook))
    }
}

/// A middleware instance: the handler for its layer and the hooks it declared.
#[derive(Clone)]
pub struct Middleware {
    handler: Arc<dyn RequestHandler>,
    capabilities: Vec<Capability>,
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").field("capabilities", &self.capabilities).finish_non_exhaustive()
    }
}

impl Middleware {
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self { handler, capabilities: Vec::new() }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn into_parts(self) -> (Arc<dyn RequestHandler>, Vec<Capability>) {
        (self.handler, self.capabilities)
    }
}

/// Raised by a factory to opt out of the chain. The layer is skipped.
#[derive(Debug, Default)]
pub struct MiddlewareNotUsed {
    reason: String,
}

impl fmt::Display for MiddlewareNotUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("middleware not used")?;
        if !self.reason.is_empty() {
            write!(f, ": {}", self.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for MiddlewareNotUsed {}

impl MiddlewareNotUsed {
    pub fn new<S: ToString>(reason: S) -> Self {
        Self { reason: reason.to_string() }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

pub type CreateResult = Result<Option<Middleware>, MiddlewareNotUsed>;

/// Creates a middleware wrapping `next`.
///
/// `Ok(None)` is a broken factory and fails the chain build.
pub trait MiddlewareFactory: Send + Sync {
    fn async_capable(&self) -> bool;

    fn create(&self, next: Arc<dyn RequestHandler>) -> CreateResult;
}

pub struct FnFactory<F> {
    f: F,
    async_capable: bool,
}

impl<F> FnFactory<F> {
    /// Marks the factory as sync-only, which the chain builder refuses.
    pub fn sync_only(self) -> Self {
        Self { async_capable: false, ..self }
    }
}

/// An async capable [`MiddlewareFactory`] backed by a function.
pub fn factory_fn<F>(f: F) -> FnFactory<F>
where
    F: Fn(Arc<dyn RequestHandler>) -> CreateResult + Send + Sync,
{
    FnFactory { f, async_capable: true }
}

impl<F> MiddlewareFactory for FnFactory<F>
where
    F: Fn(Arc<dyn RequestHandler>) -> CreateResult + Send + Sync,
{
    fn async_capable(&self) -> bool {
        self.async_capable
    }

    fn create(&self, next: Arc<dyn RequestHandler>) -> CreateResult {
        (self.f)(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_used_message() {
        assert_eq!(MiddlewareNotUsed::default().to_string(), "middleware not used");
        assert_eq!(MiddlewareNotUsed::new("no cache backend").to_string(), "middleware not used: no cache backend");
    }
}
