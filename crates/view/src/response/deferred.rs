use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::ViewError;
use crate::exec::Exec;

pub type Context = Map<String, Value>;

/// Renders a named template against a context.
#[async_trait]
pub trait Render: Send + Sync {
    async fn render(&self, template: &str, context: &Context) -> Result<Bytes, ViewError>;
}

pub trait BlockingRender: Send + Sync {
    fn render(&self, template: &str, context: &Context) -> Result<Bytes, ViewError>;
}

pub type Renderer = Exec<dyn Render, dyn BlockingRender>;

/// Content that is produced only after template response hooks had a chance to change the
/// template or its context.
pub struct Deferred {
    template: String,
    context: Context,
    renderer: Renderer,
}

impl Deferred {
    pub fn new(template: impl Into<String>, context: Context, renderer: Renderer) -> Self {
        Self { template: template.into(), context, renderer }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn set_template(&mut self, template: impl Into<String>) {
        self.template = template.into();
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn into_parts(self) -> (String, Context, Renderer) {
        (self.template, self.context, self.renderer)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("template", &self.template)
            .field("context", &self.context)
            .field("renderer", &self.renderer)
            .finish()
    }
}
