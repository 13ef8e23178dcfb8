use std::fmt;
use std::sync::Arc;

/// How a callable runs: natively async on the dispatching task, or blocking on the worker pool.
///
/// Every pluggable callable of the pipeline (views, hooks, renderers) is declared as one of the
/// two when it is registered, so the dispatcher never has to guess.
pub enum Exec<A: ?Sized, B: ?Sized> {
    Async(Arc<A>),
    Blocking(Arc<B>),
}

impl<A: ?Sized, B: ?Sized> Exec<A, B> {
    #[inline]
    pub fn is_async(&self) -> bool {
        matches!(self, Exec::Async(_))
    }
}

impl<A: ?Sized, B: ?Sized> Clone for Exec<A, B> {
    fn clone(&self) -> Self {
        match self {
            Exec::Async(a) => Exec::Async(Arc::clone(a)),
            Exec::Blocking(b) => Exec::Blocking(Arc::clone(b)),
        }
    }
}

impl<A: ?Sized, B: ?Sized> fmt::Debug for Exec<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exec::Async(_) => f.write_str("Exec::Async"),
            Exec::Blocking(_) => f.write_str("Exec::Blocking"),
        }
    }
}
