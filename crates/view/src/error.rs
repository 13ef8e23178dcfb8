use http::StatusCode;
use micro_frame::codec::EncodeError;
use micro_frame::protocol::ProtocolError;
use thiserror::Error;

use crate::BoxError;
use crate::worker_pool::PoolError;

/// An error raised by a view, a hook or a renderer while a request is dispatched.
///
/// These are what exception hooks get to see and possibly turn into a response.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("no route matches {path}")]
    NotFound { path: String },

    #[error("permission denied")]
    PermissionDenied,

    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    #[error("offloaded call failed: {source}")]
    Offload {
        #[from]
        source: PoolError,
    },

    #[error("{source}")]
    Application { source: BoxError },
}

impl ViewError {
    pub fn not_found<S: ToString>(path: S) -> Self {
        Self::NotFound { path: path.to_string() }
    }

    pub fn bad_request<S: ToString>(str: S) -> Self {
        Self::BadRequest { reason: str.to_string() }
    }

    pub fn application<E: Into<BoxError>>(e: E) -> Self {
        Self::Application { source: e.into() }
    }

    /// The status code of the generic response this error turns into when nothing handles it.
    pub fn status(&self) -> StatusCode {
        match self {
            ViewError::NotFound { .. } => StatusCode::NOT_FOUND,
            ViewError::PermissionDenied => StatusCode::FORBIDDEN,
            ViewError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ViewError::Offload { .. } | ViewError::Application { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A misconfiguration. Raised while the middleware chain is built, or at runtime when a view or
/// hook breaks the contract of returning a response.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("middleware can only be loaded in async mode")]
    SyncModeUnsupported,

    #[error("unknown middleware {id}")]
    UnknownMiddleware { id: String },

    #[error("middleware {id} must be declared async capable")]
    NotAsyncCapable { id: String },

    #[error("middleware factory {id} returned no handler")]
    FactoryReturnedNone { id: String },

    #[error("middleware {id} declares a view hook that is not async")]
    BlockingViewHook { id: String },

    #[error("{name} didn't return a response")]
    NoResponse { name: String },

    #[error("invalid route {route}: {reason}")]
    InvalidRoute { route: String, reason: String },

    #[error("a resolver must be set")]
    MissingResolver,

    #[error("invalid settings: {reason}")]
    InvalidSettings { reason: String },

    #[error("can't start worker pool: {source}")]
    WorkerPool {
        #[from]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn no_response<S: ToString>(name: S) -> Self {
        Self::NoResponse { name: name.to_string() }
    }

    pub fn invalid_settings<S: ToString>(str: S) -> Self {
        Self::InvalidSettings { reason: str.to_string() }
    }
}

/// Everything that can escape the dispatcher for one request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A defect inside the pipeline itself. Never coerced into a regular response silently.
    #[error("internal invariant violated: {reason}")]
    Invariant { reason: String },
}

impl DispatchError {
    pub fn invariant<S: ToString>(str: S) -> Self {
        Self::Invariant { reason: str.to_string() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::View(e) => e.status(),
            DispatchError::Config(_) | DispatchError::Invariant { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PoolError> for DispatchError {
    fn from(e: PoolError) -> Self {
        Self::View(ViewError::from(e))
    }
}

/// Errors escaping [`Application::call`](crate::Application::call). The connection is dropped.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("can't encode response headers: {source}")]
    Encode {
        #[from]
        source: EncodeError,
    },

    #[error("response body failed: {source}")]
    Body { source: BoxError },
}
