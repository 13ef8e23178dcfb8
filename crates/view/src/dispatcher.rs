//! The innermost layer of the chain: resolve, view hooks, view, recovery, render.
//!
//! ```text
//! RESOLVE ─▶ VIEW_HOOKS ─┬─▶ EXEC ─▶ VALIDATE ─▶ TEMPLATE_HOOKS ─▶ RENDER ─▶ DONE
//!                        │     └──▶ RECOVER ──┘        (deferred only)
//!                        └────────────────────▶ VALIDATE
//! ```
//!
//! Errors from the view or from rendering go through the exception hooks (RECOVER); the first
//! hook returning a response replaces the failed result, and if none does, the original error
//! escapes to the enclosing exception converter.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::decorator::ViewDecorator;
use crate::error::{ConfigError, DispatchError, ViewError};
use crate::exec::Exec;
use crate::handler::RequestHandler;
use crate::middleware::{ExceptionHook, HookSet, TemplateResponseHook};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Resolver, ResolverMatch};
use crate::view::{View, ViewArgs, ViewResult};
use crate::worker_pool::WorkerPool;

/// Where the chain builder publishes the hooks once every middleware was instantiated.
#[derive(Clone, Default)]
pub(crate) struct HookSlot {
    cell: Arc<OnceCell<Arc<HookSet>>>,
}

impl HookSlot {
    pub(crate) fn publish(&self, hooks: Arc<HookSet>) {
        if self.cell.set(hooks).is_err() {
            warn!("middleware hooks were already published, keeping the first set");
        }
    }

    fn get(&self) -> Option<&Arc<HookSet>> {
        self.cell.get()
    }
}

pub struct Dispatcher {
    resolver: Arc<dyn Resolver>,
    decorator: Arc<dyn ViewDecorator>,
    pool: Arc<WorkerPool>,
    hooks: HookSlot,
}

impl Dispatcher {
    pub fn new(resolver: Arc<dyn Resolver>, decorator: Arc<dyn ViewDecorator>, pool: Arc<WorkerPool>) -> Self {
        Self { resolver, decorator, pool, hooks: HookSlot::default() }
    }

    pub(crate) fn hook_slot(&self) -> HookSlot {
        self.hooks.clone()
    }

    pub async fn dispatch(&self, request: Arc<Request>) -> Result<Response, DispatchError> {
        let hooks = self.hooks.get().ok_or_else(|| DispatchError::invariant("dispatching before middleware hooks were published"))?;

        let ResolverMatch { view, args, route } = self.resolver.resolve(&request)?;
        trace!(path = request.path(), route = route.as_deref(), view = view.name(), "dispatching");

        let mut short_circuit = None;
        for hook in hooks.view_hooks() {
            if let Some(response) = hook.process_view(&request, &view, &args).await? {
                debug!(view = view.name(), "view hook returned a response, skipping the view");
                short_circuit = Some(response);
                break;
            }
        }

        let mut response = match short_circuit {
            Some(response) => response,
            None => {
                let name = view.name();
                let view = self.decorator.decorate(view);
                match self.call_view(&view, &request, args).await {
                    Ok(result) => check_response(result, || format!("the view {name}"))?,
                    Err(error) => self.recover(hooks.exception_hooks(), &request, error).await?,
                }
            }
        };

        if response.is_deferred() {
            for hook in hooks.template_response_hooks() {
                let result = self.process_template_response(hook, &request, response).await?;
                response = check_response(result, || format!("{}.process_template_response", hook.name()))?;
            }

            response = match self.render(response).await {
                Ok(response) => response,
                Err(error) => self.recover(hooks.exception_hooks(), &request, error).await?,
            };
        }

        if response.is_deferred() {
            return Err(DispatchError::invariant("response is still deferred after rendering"));
        }
        Ok(response)
    }

    async fn call_view(&self, view: &View, request: &Arc<Request>, args: ViewArgs) -> ViewResult {
        match view {
            Exec::Async(view) => view.call(Arc::clone(request), args).await,
            Exec::Blocking(view) => {
                let view = Arc::clone(view);
                let request = Arc::clone(request);
                self.pool.run(move || view.call(&request, args)).await?
            }
        }
    }

    async fn process_template_response(
        &self,
        hook: &TemplateResponseHook,
        request: &Arc<Request>,
        response: Response,
    ) -> Result<Option<Response>, DispatchError> {
        let result = match hook {
            Exec::Async(hook) => hook.process_template_response(request, response).await,
            Exec::Blocking(hook) => {
                let hook = Arc::clone(hook);
                let request = Arc::clone(request);
                self.pool.run(move || hook.process_template_response(&request, response)).await?
            }
        };
        Ok(result?)
    }

    async fn render(&self, mut response: Response) -> Result<Response, ViewError> {
        let Some(deferred) = response.take_deferred() else {
            return Ok(response);
        };

        let (template, context, renderer) = deferred.into_parts();
        let content = match renderer {
            Exec::Async(renderer) => renderer.render(&template, &context).await?,
            Exec::Blocking(renderer) => self.pool.run(move || renderer.render(&template, &context)).await??,
        };
        response.set_content(content);
        Ok(response)
    }

    /// Offers `error` to the exception hooks. The first response returned wins; without one the
    /// original error is returned.
    async fn recover(&self, hooks: &[ExceptionHook], request: &Arc<Request>, error: ViewError) -> Result<Response, DispatchError> {
        let error = Arc::new(error);
        for hook in hooks {
            let handled = match hook {
                Exec::Async(hook) => hook.process_exception(request, &error).await,
                Exec::Blocking(hook) => {
                    let hook = Arc::clone(hook);
                    let request = Arc::clone(request);
                    let error = Arc::clone(&error);
                    self.pool.run(move || hook.process_exception(&request, &error)).await?
                }
            };
            if let Some(response) = handled {
                debug!(cause = %error, "exception hook recovered the request");
                return Ok(response);
            }
        }

        // blocking hooks drop their handle before their result is sent back
        let error = Arc::try_unwrap(error).map_err(|_| DispatchError::invariant("exception hook kept the error alive"))?;
        Err(DispatchError::View(error))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").field("hooks", &self.hooks.get()).finish_non_exhaustive()
    }
}

fn check_response<F>(result: Option<Response>, name: F) -> Result<Response, ConfigError>
where
    F: FnOnce() -> String,
{
    result.ok_or_else(|| ConfigError::no_response(name()))
}

#[async_trait]
impl RequestHandler for Dispatcher {
    async fn handle(&self, request: Arc<Request>) -> Result<Response, DispatchError> {
        self.dispatch(request).await
    }
}
