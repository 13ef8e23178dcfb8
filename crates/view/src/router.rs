//! Resolving a request path to a view.

use std::fmt;

use tracing::trace;

use crate::error::{ConfigError, ViewError};
use crate::request::Request;
use crate::view::{View, ViewArgs};

/// The view selected for a request and the arguments captured from its path.
#[derive(Debug, Clone)]
pub struct ResolverMatch {
    pub view: View,
    pub args: ViewArgs,
    pub route: Option<String>,
}

impl ResolverMatch {
    pub fn new(view: View, args: ViewArgs) -> Self {
        Self { view, args, route: None }
    }
}

/// Maps a request to a view. Failing with [`ViewError::NotFound`] is the usual outcome for
/// unknown paths. Resolver errors skip the exception hooks and go straight to the exception
/// converter.
#[cfg_attr(test, mockall::automock)]
pub trait Resolver: Send + Sync {
    fn resolve(&self, request: &Request) -> Result<ResolverMatch, ViewError>;
}

/// A [`Resolver`] matching [`Request::path_info`] against path patterns such as
/// `/users/{id}`. Captured parameters become keyword arguments.
pub struct PathRouter {
    inner: matchit::Router<(String, View)>,
}

impl fmt::Debug for PathRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathRouter").finish_non_exhaustive()
    }
}

impl PathRouter {
    pub fn builder() -> PathRouterBuilder {
        PathRouterBuilder { routes: Vec::new() }
    }
}

impl Resolver for PathRouter {
    fn resolve(&self, request: &Request) -> Result<ResolverMatch, ViewError> {
        let path = request.path_info();
        let matched = self.inner.at(path).map_err(|_| ViewError::not_found(path))?;
        let (route, view) = matched.value;

        let args = matched.params.iter().fold(ViewArgs::new(), |args, (k, v)| args.with_kwarg(k, v));
        trace!(path, route = %route, "resolved route");
        Ok(ResolverMatch { view: view.clone(), args, route: Some(route.clone()) })
    }
}

#[derive(Debug)]
pub struct PathRouterBuilder {
    routes: Vec<(String, View)>,
}

impl PathRouterBuilder {
    pub fn route(mut self, route: impl Into<String>, view: View) -> Self {
        self.routes.push((route.into(), view));
        self
    }

    pub fn build(self) -> Result<PathRouter, ConfigError> {
        let mut inner = matchit::Router::new();
        for (route, view) in self.routes {
            inner
                .insert(route.clone(), (route.clone(), view))
                .map_err(|e| ConfigError::InvalidRoute { route, reason: e.to_string() })?;
        }
        Ok(PathRouter { inner })
    }
}
