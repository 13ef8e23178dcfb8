//! Wrapping views before they are called.
//!
//! The dispatcher passes every resolved view through a [`ViewDecorator`] right before calling
//! it. That is where per-request wrappers go, a database transaction around the whole view
//! being the usual one. Decorators compose with [`DecoratorExt::and_then`].

use crate::view::View;

pub trait Decorator<In> {
    type Out;

    fn decorate(&self, raw: In) -> Self::Out;
}

pub trait DecoratorExt<In>: Decorator<In> {
    /// Applies `self`, then `decorator` to its output.
    fn and_then<D>(self, decorator: D) -> DecoratorComposer<Self, D>
    where
        Self: Sized,
    {
        DecoratorComposer::new(self, decorator)
    }

    /// Applies `decorator`, then `self` to its output.
    fn compose<D>(self, decorator: D) -> DecoratorComposer<D, Self>
    where
        Self: Sized,
    {
        DecoratorComposer::new(decorator, self)
    }
}

impl<T: Decorator<In> + ?Sized, In> DecoratorExt<In> for T {}

/// A decorator the dispatcher can hold: views in, views out.
pub trait ViewDecorator: Decorator<View, Out = View> + Send + Sync {}

impl<T> ViewDecorator for T where T: Decorator<View, Out = View> + Send + Sync {}

#[derive(Default, Clone, Copy, Debug)]
pub struct IdentityDecorator;

impl<In> Decorator<In> for IdentityDecorator {
    type Out = In;

    #[inline]
    fn decorate(&self, raw: In) -> Self::Out {
        raw
    }
}

#[derive(Default, Clone, Copy, Debug)]
pub struct DecoratorComposer<D1, D2> {
    first: D1,
    second: D2,
}

impl<D1, D2> DecoratorComposer<D1, D2> {
    pub fn new(first: D1, second: D2) -> Self {
        Self { first, second }
    }
}

impl<In, D1, D2> Decorator<In> for DecoratorComposer<D1, D2>
where
    D1: Decorator<In>,
    D2: Decorator<D1::Out>,
{
    type Out = D2::Out;

    fn decorate(&self, raw: In) -> Self::Out {
        self.second.decorate(self.first.decorate(raw))
    }
}

#[derive(Copy, Clone)]
pub struct DecoratorFn<F> {
    f: F,
}

pub fn decorator_fn<In, Out, F>(f: F) -> DecoratorFn<F>
where
    F: Fn(In) -> Out,
{
    DecoratorFn { f }
}

impl<In, Out, F> Decorator<In> for DecoratorFn<F>
where
    F: Fn(In) -> Out,
{
    type Out = Out;

    fn decorate(&self, raw: In) -> Self::Out {
        (self.f)(raw)
    }
}
