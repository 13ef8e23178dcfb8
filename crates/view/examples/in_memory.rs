//! Drives an application over in-memory channels: a lifespan handshake, then a few requests.
//!
//! cargo run -p micro-view --example in_memory

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{StreamExt, stream};
use micro_frame::protocol::{ConnectionKind, Incoming, Outgoing, Scope};
use micro_view::middleware::{Capability, Middleware, ProcessException, factory_fn};
use micro_view::response::{BlockingRender, Context, Deferred, ResponseBody};
use micro_view::router::PathRouter;
use micro_view::{
    Application, Exec, Request, RequestHandler, Response, Settings, ViewArgs, ViewError, blocking_view_fn, handler_fn,
    view_fn,
};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

struct Greeting;

impl BlockingRender for Greeting {
    fn render(&self, template: &str, context: &Context) -> Result<Bytes, ViewError> {
        let name = context.get("name").and_then(|v| v.as_str()).unwrap_or("stranger");
        Ok(Bytes::from(format!("<h1>{template}: hello {name}</h1>")))
    }
}

async fn hello(_: Arc<Request>, args: ViewArgs) -> Response {
    let mut context = Context::new();
    context.insert("name".to_string(), args.kwarg("name").unwrap_or("stranger").into());
    Response::deferred(Deferred::new("hello.html", context, Exec::Blocking(Arc::new(Greeting))))
}

async fn numbers(_: Arc<Request>, _: ViewArgs) -> Response {
    let parts = stream::iter((1..=3).map(|i| Ok::<_, ViewError>(Bytes::from(format!("{i}\n")))));
    Response::text(ResponseBody::from_stream(parts))
}

struct FriendlyErrors;

#[async_trait]
impl ProcessException for FriendlyErrors {
    async fn process_exception(&self, _: &Arc<Request>, error: &ViewError) -> Option<Response> {
        Some(Response::text(format!("sorry: {error}\n")).with_status(error.status()))
    }
}

async fn call(app: &Application, scope: Scope, incoming: Vec<Incoming>) -> Vec<Outgoing> {
    let (tx, rx) = mpsc::unbounded();
    if let Err(e) = app.call(scope, stream::iter(incoming), tx).await {
        tracing::error!(cause = %e, "call failed");
    }
    rx.collect().await
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let router = PathRouter::builder()
        .route("/hello/{name}", view_fn(hello))
        .route("/numbers", view_fn(numbers))
        .route("/work", blocking_view_fn(|request: &Request, _| format!("{} bytes crunched\n", request.body().len())))
        .build()
        .expect("routes are valid");

    let registry = micro_view::MiddlewareRegistry::new()
        .register(
            "timing",
            factory_fn(|next: Arc<dyn RequestHandler>| {
                let handler = handler_fn(move |request| {
                    let next = Arc::clone(&next);
                    async move {
                        let start = std::time::Instant::now();
                        let response = next.handle(request).await?;
                        Ok(response.with_header("X-Elapsed-Micros", start.elapsed().as_micros().to_string()))
                    }
                });
                Ok(Some(Middleware::new(Arc::new(handler))))
            }),
        )
        .register(
            "friendly-errors",
            factory_fn(|next| Ok(Some(Middleware::new(next).with_capability(Capability::exception(Arc::new(FriendlyErrors)))))),
        );

    let settings = Settings::from_json(r#"{"middleware": ["timing", "friendly-errors"], "debug": true, "chunk_size": 16}"#)
        .expect("settings are valid");
    let app = Application::builder().settings(settings).registry(registry).resolver(router).build().expect("application builds");

    let lifespan = call(&app, Scope::new(ConnectionKind::Lifespan), vec![Incoming::LifespanStartup]).await;
    info!(?lifespan, "lifespan");

    let requests = [
        ("/hello/frame", vec![Incoming::http_request("", false)]),
        ("/numbers", vec![Incoming::http_request("", false)]),
        ("/work", vec![Incoming::http_request("abc", true), Incoming::http_request("def", false)]),
        ("/missing", vec![Incoming::http_request("", false)]),
    ];
    for (path, incoming) in requests {
        for frame in call(&app, Scope::new(ConnectionKind::Http).with_path(path), incoming).await {
            info!(path, ?frame, "sent");
        }
    }
}
