use std::fmt::{self, Display};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Sink, Stream};
use micro_frame::Transport;
use micro_frame::lifespan::{BoxError, LifespanHandler, LifespanHooks};
use micro_frame::protocol::{Incoming, Outgoing, ProtocolError, Scope};
use once_cell::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::decorator::{IdentityDecorator, ViewDecorator};
use crate::dispatcher::Dispatcher;
use crate::error::{ConfigError, ServeError};
use crate::handler::{bad_request, response_for_error};
use crate::middleware::{ChainBuilder, MiddlewareChain, MiddlewareRegistry};
use crate::request::Request;
use crate::router::Resolver;
use crate::settings::Settings;
use crate::streamer::ResponseStreamer;
use crate::worker_pool::WorkerPool;

/// The connection-level entry point.
///
/// The middleware chain is built once, on the lifespan startup or on the first request,
/// whichever comes first. A failed build is not cached: the next call tries again.
pub struct Application {
    settings: Settings,
    registry: MiddlewareRegistry,
    resolver: Arc<dyn Resolver>,
    decorator: Arc<dyn ViewDecorator>,
    pool: Arc<WorkerPool>,
    lifespan_hooks: Vec<Arc<dyn LifespanHooks>>,
    streamer: ResponseStreamer,
    chain: OnceCell<MiddlewareChain>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether the middleware chain has been built.
    pub fn is_ready(&self) -> bool {
        self.chain.get().is_some()
    }

    /// Returns the middleware chain, building it on first use.
    pub fn load_middleware(&self) -> Result<&MiddlewareChain, ConfigError> {
        self.chain.get_or_try_init(|| {
            let dispatcher = Dispatcher::new(Arc::clone(&self.resolver), Arc::clone(&self.decorator), Arc::clone(&self.pool));
            ChainBuilder::new(&self.registry, self.settings.debug).build(&self.settings.middleware, true, dispatcher)
        })
    }

    /// Handles one connection until its response was sent or its lifespan stream ended.
    ///
    /// A client disconnecting before the request body was complete is not an error: the call
    /// returns `Ok` without sending anything.
    pub async fn call<R, W>(&self, scope: Scope, receive: R, send: W) -> Result<(), ServeError>
    where
        R: Stream<Item = Incoming> + Send + 'static,
        W: Sink<Outgoing> + Send + 'static,
        W::Error: Display,
    {
        let mut transport = Transport::new(scope, receive, send);

        if !transport.scope().kind().is_request() {
            let (_, mut channel) = transport.into_parts();
            LifespanHandler::new(self).run(&mut channel).await?;
            return Ok(());
        }

        let body = match transport.read_body().await {
            Ok(body) => body,
            Err(e) if e.is_aborted() => {
                debug!(path = transport.scope().path(), "client disconnected before the body was complete");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let chain = self.load_middleware()?;
        let (scope, mut channel) = transport.into_parts();

        let request = match Request::new(scope, body) {
            Ok(request) => Arc::new(request.with_channel(channel)),
            Err(e) => {
                warn!(cause = %e, "can't build request");
                return self.streamer.send_response(bad_request(&e.to_string(), self.settings.debug), &mut channel).await;
            }
        };

        let response = match chain.handle(Arc::clone(&request)).await {
            Ok(response) => response,
            Err(e) => {
                error!(path = request.path(), cause = %e, "error escaped the middleware chain");
                response_for_error(&e, self.settings.debug)
            }
        };

        match request.take_channel().await {
            Some(mut channel) => self.streamer.send_response(response, &mut channel).await,
            None if response.is_upgrade() => {
                response.close();
                Ok(())
            }
            None => {
                response.close();
                Err(ProtocolError::ChannelDetached.into())
            }
        }
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("settings", &self.settings)
            .field("chain", &self.chain.get())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LifespanHooks for Application {
    async fn on_startup(&self) -> Result<(), BoxError> {
        let chain = self.load_middleware()?;
        info!(layers = chain.layers(), "application ready");
        for hook in &self.lifespan_hooks {
            hook.on_startup().await?;
        }
        Ok(())
    }

    /// Runs the extra hooks' shutdown in reverse registration order.
    async fn on_shutdown(&self) -> Result<(), BoxError> {
        for hook in self.lifespan_hooks.iter().rev() {
            hook.on_shutdown().await?;
        }
        Ok(())
    }
}

pub struct ApplicationBuilder {
    settings: Settings,
    registry: MiddlewareRegistry,
    resolver: Option<Arc<dyn Resolver>>,
    decorator: Arc<dyn ViewDecorator>,
    lifespan_hooks: Vec<Arc<dyn LifespanHooks>>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            settings: Settings::default(),
            registry: MiddlewareRegistry::new(),
            resolver: None,
            decorator: Arc::new(IdentityDecorator),
            lifespan_hooks: Vec::new(),
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(mut self, registry: MiddlewareRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Sets the decorator applied to every view before it is called.
    pub fn decorator(mut self, decorator: impl ViewDecorator + 'static) -> Self {
        self.decorator = Arc::new(decorator);
        self
    }

    /// Adds process init and teardown hooks, run after the middleware chain was built.
    pub fn lifespan_hook(mut self, hooks: impl LifespanHooks + 'static) -> Self {
        self.lifespan_hooks.push(Arc::new(hooks));
        self
    }

    pub fn build(self) -> Result<Application, ConfigError> {
        self.settings.validate()?;
        let resolver = self.resolver.ok_or(ConfigError::MissingResolver)?;
        let pool = WorkerPool::new(self.settings.worker_pool.clone())?;

        Ok(Application {
            streamer: ResponseStreamer::new(self.settings.chunk_size),
            settings: self.settings,
            registry: self.registry,
            resolver,
            decorator: self.decorator,
            pool: Arc::new(pool),
            lifespan_hooks: self.lifespan_hooks,
            chain: OnceCell::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewError;
    use crate::middleware::{Middleware, factory_fn};
    use crate::response::Response;
    use crate::router::PathRouter;
    use crate::view::{ViewArgs, view_fn};
    use bytes::Bytes;
    use futures::channel::mpsc;
    use futures::{StreamExt, stream};
    use micro_frame::protocol::ConnectionKind;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn echo(request: Arc<Request>, _: ViewArgs) -> Response {
        Response::text(request.body().clone())
    }

    async fn websocket(request: Arc<Request>, _: ViewArgs) -> Result<Response, ViewError> {
        let Some(mut channel) = request.take_channel().await else {
            return Err(ViewError::bad_request("connection channel already taken"));
        };
        let accept = Outgoing::WebsocketAccept { subprotocol: None, headers: vec![] };
        channel.send(accept).await.map_err(ViewError::application)?;
        Ok(Response::upgrade())
    }

    fn router() -> PathRouter {
        PathRouter::builder()
            .route("/echo", view_fn(echo))
            .route("/ws", view_fn(websocket))
            .route("/silent", view_fn(|_, _| async {}))
            .build()
            .unwrap()
    }

    fn app(settings: Settings) -> Application {
        let registry = MiddlewareRegistry::new().register(
            "server-header",
            factory_fn(|next| {
                let handler = crate::handler_fn(move |request| {
                    let next = Arc::clone(&next);
                    async move { Ok(next.handle(request).await?.with_header("Server", "micro-view")) }
                });
                Ok(Some(Middleware::new(Arc::new(handler))))
            }),
        );
        Application::builder().settings(settings).registry(registry).resolver(router()).build().unwrap()
    }

    fn with_middleware(ids: &[&str]) -> Settings {
        Settings { middleware: ids.iter().map(|id| id.to_string()).collect(), ..Settings::default() }
    }

    async fn call(app: &Application, scope: Scope, incoming: Vec<Incoming>) -> (Result<(), ServeError>, Vec<Outgoing>) {
        let (tx, rx) = mpsc::unbounded();
        let result = app.call(scope, stream::iter(incoming), tx).await;
        (result, rx.collect().await)
    }

    fn http(path: &str) -> Scope {
        Scope::new(ConnectionKind::Http).with_method("POST").with_path(path)
    }

    #[tokio::test]
    async fn serves_a_request_through_the_chain() {
        let app = app(with_middleware(&["server-header"]));
        let incoming = vec![Incoming::http_request("hello ", true), Incoming::http_request("frame", false)];

        let (result, sent) = call(&app, http("/echo"), incoming).await;

        result.unwrap();
        let Outgoing::HttpResponseStart { status, headers } = &sent[0] else { panic!("expected start, got {:?}", sent[0]) };
        assert_eq!(*status, 200);
        assert!(headers.contains(&(Bytes::from_static(b"Server"), Bytes::from_static(b"micro-view"))));
        assert_eq!(sent[1], Outgoing::response_body("hello frame", false));
        assert_eq!(sent.len(), 2);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let app = app(Settings::default());

        let (result, sent) = call(&app, http("/missing"), vec![Incoming::http_request("", false)]).await;

        result.unwrap();
        assert!(matches!(sent[0], Outgoing::HttpResponseStart { status: 404, .. }));
    }

    #[tokio::test]
    async fn view_returning_nothing_is_500() {
        let app = app(Settings::default());

        let (result, sent) = call(&app, http("/silent"), vec![Incoming::http_request("", false)]).await;

        result.unwrap();
        assert!(matches!(sent[0], Outgoing::HttpResponseStart { status: 500, .. }));
    }

    #[tokio::test]
    async fn disconnect_mid_body_sends_nothing() {
        let app = app(Settings::default());
        let incoming = vec![Incoming::http_request("partial", true), Incoming::HttpDisconnect];

        let (result, sent) = call(&app, http("/echo"), incoming).await;

        result.unwrap();
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn invalid_scope_is_400() {
        let app = app(Settings::default());
        let scope = http("/echo").with_header("bad header", "x");

        let (result, sent) = call(&app, scope, vec![Incoming::http_request("", false)]).await;

        result.unwrap();
        assert!(matches!(sent[0], Outgoing::HttpResponseStart { status: 400, .. }));
    }

    #[tokio::test]
    async fn websocket_view_drives_the_upgrade() {
        let app = app(Settings::default());
        let scope = Scope::new(ConnectionKind::Websocket).with_path("/ws");

        let (result, sent) = call(&app, scope, vec![Incoming::WebsocketConnect]).await;

        result.unwrap();
        assert_eq!(sent, vec![Outgoing::WebsocketAccept { subprotocol: None, headers: vec![] }]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_build_the_chain_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let registry = MiddlewareRegistry::new().register(
            "counted",
            factory_fn(move |next| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Middleware::new(next)))
            }),
        );
        let app = Arc::new(
            Application::builder().settings(with_middleware(&["counted"])).registry(registry).resolver(router()).build().unwrap(),
        );

        let calls: Vec<_> = (0..16)
            .map(|_| {
                let app = Arc::clone(&app);
                tokio::spawn(async move { call(&app, http("/echo"), vec![Incoming::http_request("hi", false)]).await })
            })
            .collect();

        for task in calls {
            let (result, sent) = task.await.unwrap();
            result.unwrap();
            assert!(matches!(sent[0], Outgoing::HttpResponseStart { status: 200, .. }));
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(app.is_ready());
    }

    #[tokio::test]
    async fn lifespan_message_on_http_connection_is_rejected() {
        let app = app(Settings::default());

        let (result, sent) = call(&app, http("/echo"), vec![Incoming::LifespanStartup]).await;

        assert!(matches!(
            result,
            Err(ServeError::Protocol(ProtocolError::UnexpectedMessage { message_type: "lifespan.startup", kind: "http" }))
        ));
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn unknown_middleware_fails_requests() {
        let app = app(with_middleware(&["nope"]));

        let (result, sent) = call(&app, http("/echo"), vec![Incoming::http_request("", false)]).await;

        assert!(matches!(result, Err(ServeError::Config(ConfigError::UnknownMiddleware { .. }))));
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn lifespan_runs_hooks_in_order() {
        struct Recording(&'static str, Arc<Mutex<Vec<String>>>);

        #[async_trait]
        impl LifespanHooks for Recording {
            async fn on_startup(&self) -> Result<(), BoxError> {
                self.1.lock().unwrap().push(format!("{} up", self.0));
                Ok(())
            }

            async fn on_shutdown(&self) -> Result<(), BoxError> {
                self.1.lock().unwrap().push(format!("{} down", self.0));
                Ok(())
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let app = Application::builder()
            .resolver(router())
            .lifespan_hook(Recording("db", Arc::clone(&log)))
            .lifespan_hook(Recording("cache", Arc::clone(&log)))
            .build()
            .unwrap();

        let (result, sent) =
            call(&app, Scope::new(ConnectionKind::Lifespan), vec![Incoming::LifespanStartup, Incoming::LifespanShutdown]).await;

        result.unwrap();
        assert!(app.is_ready());
        assert_eq!(sent, vec![Outgoing::LifespanStartupComplete, Outgoing::LifespanShutdownComplete]);
        assert_eq!(*log.lock().unwrap(), ["db up", "cache up", "cache down", "db down"]);
    }

    #[tokio::test]
    async fn broken_configuration_fails_startup() {
        let app = app(with_middleware(&["nope"]));

        let (result, sent) = call(&app, Scope::new(ConnectionKind::Lifespan), vec![Incoming::LifespanStartup]).await;

        result.unwrap();
        assert!(matches!(&sent[..], [Outgoing::LifespanStartupFailed { message }] if message.contains("nope")));
    }

    #[test]
    fn builder_requires_a_resolver() {
        assert!(matches!(Application::builder().build(), Err(ConfigError::MissingResolver)));
    }
}
