use micro_frame::codec::DEFAULT_CHUNK_SIZE;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::worker_pool::WorkerPoolConfig;

/// Application settings. Every field is optional in the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Middleware identifiers, outermost first.
    pub middleware: Vec<String>,
    /// Logs skipped middleware and exposes error details in generic error responses.
    pub debug: bool,
    /// The largest `http.response.body` frame, in bytes.
    pub chunk_size: usize,
    pub worker_pool: WorkerPoolConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self { middleware: Vec::new(), debug: false, chunk_size: DEFAULT_CHUNK_SIZE, worker_pool: WorkerPoolConfig::default() }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(json).map_err(ConfigError::invalid_settings)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid_settings("chunk_size must be positive"));
        }
        if self.worker_pool.workers == 0 {
            return Err(ConfigError::invalid_settings("worker_pool.workers must be positive"));
        }
        if self.worker_pool.queue_bound == 0 {
            return Err(ConfigError::invalid_settings("worker_pool.queue_bound must be positive"));
        }
        if let Some(id) = self.middleware.iter().find(|id| id.trim().is_empty()) {
            return Err(ConfigError::invalid_settings(format!("blank middleware identifier {id:?}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker_pool::BackpressureMode;

    #[test]
    fn defaults() {
        let settings = Settings::from_json("{}").unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.chunk_size, 65536);
        assert!(!settings.debug);
    }

    #[test]
    fn full_settings() {
        let settings = Settings::from_json(
            r#"{
                "middleware": ["security", "session"],
                "debug": true,
                "chunk_size": 1024,
                "worker_pool": {"workers": 4, "queue_bound": 8, "backpressure": "shed"}
            }"#,
        )
        .unwrap();

        assert_eq!(settings.middleware, ["security", "session"]);
        assert!(settings.debug);
        assert_eq!(settings.chunk_size, 1024);
        assert_eq!(settings.worker_pool.backpressure, BackpressureMode::Shed);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        assert!(matches!(Settings::from_json(r#"{"chunk_size": 0}"#), Err(ConfigError::InvalidSettings { .. })));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(matches!(Settings::from_json(r#"{"middlewares": []}"#), Err(ConfigError::InvalidSettings { .. })));
    }
}
