use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::middleware::MiddlewareFactory;

/// Middleware factories by identifier. The configured middleware list refers to these.
#[derive(Default)]
pub struct MiddlewareRegistry {
    factories: HashMap<String, Arc<dyn MiddlewareFactory>>,
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.factories.keys().collect();
        ids.sort();
        f.debug_struct("MiddlewareRegistry").field("ids", &ids).finish()
    }
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `id`, replacing a previous registration.
    pub fn register(mut self, id: impl Into<String>, factory: impl MiddlewareFactory + 'static) -> Self {
        self.factories.insert(id.into(), Arc::new(factory));
        self
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn MiddlewareFactory>, ConfigError> {
        self.factories.get(id).cloned().ok_or_else(|| ConfigError::UnknownMiddleware { id: id.to_string() })
    }
}
