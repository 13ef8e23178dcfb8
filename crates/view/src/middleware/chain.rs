use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::dispatcher::Dispatcher;
use crate::error::{ConfigError, DispatchError};
use crate::exec::Exec;
use crate::handler::{RequestHandler, convert_exception_to_response};
use crate::middleware::{Capability, ExceptionHook, MiddlewareRegistry, ProcessView, TemplateResponseHook};
use crate::request::Request;
use crate::response::Response;

/// The hooks declared by the middleware of a chain, in the order the dispatcher calls them.
#[derive(Default)]
pub struct HookSet {
    pub(crate) view: Vec<Arc<dyn ProcessView>>,
    pub(crate) template_response: Vec<TemplateResponseHook>,
    pub(crate) exception: Vec<ExceptionHook>,
}

impl HookSet {
    pub fn view_hooks(&self) -> &[Arc<dyn ProcessView>] {
        &self.view
    }

    pub fn template_response_hooks(&self) -> &[TemplateResponseHook] {
        &self.template_response
    }

    pub fn exception_hooks(&self) -> &[ExceptionHook] {
        &self.exception
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("view", &self.view.len())
            .field("template_response", &self.template_response.len())
            .field("exception", &self.exception.len())
            .finish()
    }
}

/// A built middleware chain. Immutable and shared by every request.
pub struct MiddlewareChain {
    entry: Arc<dyn RequestHandler>,
    hooks: Arc<HookSet>,
    layers: usize,
}

impl MiddlewareChain {
    /// Runs a request through the outermost layer.
    pub async fn handle(&self, request: Arc<Request>) -> Result<Response, DispatchError> {
        self.entry.handle(request).await
    }

    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    /// The number of middleware layers, the dispatcher excluded.
    pub fn layers(&self) -> usize {
        self.layers
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain").field("layers", &self.layers).field("hooks", &self.hooks).finish()
    }
}

#[derive(Debug)]
pub struct ChainBuilder<'r> {
    registry: &'r MiddlewareRegistry,
    debug: bool,
}

impl<'r> ChainBuilder<'r> {
    pub fn new(registry: &'r MiddlewareRegistry, debug: bool) -> Self {
        Self { registry, debug }
    }

    /// Builds the chain around `dispatcher` from the middleware identifiers, outermost first.
    ///
    /// Only async mode is supported. Every layer, the dispatcher included, is wrapped in an
    /// [`ExceptionConverter`](crate::ExceptionConverter). The hooks collected here are
    /// published to the dispatcher once the whole chain has been built.
    pub fn build(&self, ids: &[String], is_async: bool, dispatcher: Dispatcher) -> Result<MiddlewareChain, ConfigError> {
        if !is_async {
            return Err(ConfigError::SyncModeUnsupported);
        }

        let hook_slot = dispatcher.hook_slot();
        let mut hooks = HookSet::default();
        let mut handler = convert_exception_to_response(Arc::new(dispatcher), self.debug);
        let mut layers = 0;

        for id in ids.iter().rev() {
            let factory = self.registry.get(id)?;
            if !factory.async_capable() {
                return Err(ConfigError::NotAsyncCapable { id: id.clone() });
            }

            let middleware = match factory.create(Arc::clone(&handler)) {
                Ok(Some(middleware)) => middleware,
                Ok(None) => return Err(ConfigError::FactoryReturnedNone { id: id.clone() }),
                Err(not_used) => {
                    if self.debug {
                        debug!(middleware = %id, reason = not_used.reason(), "middleware not used");
                    }
                    continue;
                }
            };

            let (middleware_handler, capabilities) = middleware.into_parts();
            for capability in capabilities {
                match capability {
                    Capability::View(Exec::Async(hook)) => hooks.view.insert(0, hook),
                    Capability::View(Exec::Blocking(_)) => return Err(ConfigError::BlockingViewHook { id: id.clone() }),
                    Capability::TemplateResponse(hook) => hooks.template_response.push(hook),
                    Capability::Exception(hook) => hooks.exception.push(hook),
                }
            }

            handler = convert_exception_to_response(middleware_handler, self.debug);
            layers += 1;
        }

        let hooks = Arc::new(hooks);
        hook_slot.publish(Arc::clone(&hooks));
        info!(layers, hooks = ?hooks, "middleware chain built");

        Ok(MiddlewareChain { entry: handler, hooks, layers })
    }
}
