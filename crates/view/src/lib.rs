//! Async view dispatching over `micro-frame` connections.
//!
//! An [`Application`] is the single entry point a server calls for every connection, with the
//! connection's scope and its receive/send halves. HTTP and websocket connections go through the
//! request pipeline:
//!
//! ```text
//! Transport ─▶ Request ─▶ MiddlewareChain ─▶ Dispatcher ─▶ ResponseStreamer
//!                          (built once)       resolve
//!                                             view hooks
//!                                             view (inline or offloaded)
//!                                             exception hooks
//!                                             template hooks + render
//! ```
//!
//! Lifespan connections skip the pipeline and are answered by the
//! [`LifespanHandler`](micro_frame::lifespan::LifespanHandler).
//!
//! # Middleware
//!
//! Middleware are registered by identifier in a [`MiddlewareRegistry`] and selected, in order,
//! by [`Settings::middleware`]. Every middleware must be declared async capable; hooks are
//! declared up front as tagged [`Capability`] values rather than discovered at runtime. See
//! [`middleware`] for the ordering rules.
//!
//! # Blocking work
//!
//! Views, exception hooks, template hooks and renderers come in two flavours, [`Exec::Async`]
//! and [`Exec::Blocking`]. Async ones run on the calling task; blocking ones are offloaded to
//! the bounded [`WorkerPool`] so the event loop never stalls on them.

mod app;
mod error;
mod exec;
mod handler;
mod request;
mod responder;
mod settings;
mod view;

pub mod decorator;
pub mod dispatcher;
pub mod middleware;
pub mod response;
pub mod router;
pub mod streamer;
pub mod worker_pool;

pub use app::Application;
pub use app::ApplicationBuilder;
pub use error::ConfigError;
pub use error::DispatchError;
pub use error::ServeError;
pub use error::ViewError;
pub use exec::Exec;
pub use handler::ExceptionConverter;
pub use handler::FnHandler;
pub use handler::RequestHandler;
pub use handler::convert_exception_to_response;
pub use handler::handler_fn;
pub use handler::response_for_error;
pub use middleware::Capability;
pub use middleware::Middleware;
pub use middleware::MiddlewareRegistry;
pub use request::Request;
pub use request::RequestError;
pub use responder::Responder;
pub use response::Response;
pub use settings::Settings;
pub use view::AsyncView;
pub use view::BlockingView;
pub use view::View;
pub use view::ViewArgs;
pub use view::ViewResult;
pub use view::blocking_view_fn;
pub use view::view_fn;
pub use worker_pool::WorkerPool;

pub use micro_frame::lifespan::BoxError;
