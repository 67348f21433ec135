//! Engine client configuration

use serde::{Deserialize, Serialize};

/// Configuration for the external engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the elastix executable
    ///
    /// Defaults to "elastix" (assumes it's on PATH).
    pub elastix: String,

    /// Path to the transformix executable
    pub transformix: String,

    /// Timeout for a single invocation in seconds
    pub timeout_secs: u64,

    /// Thread count passed through as `-threads`
    pub threads: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            elastix: "elastix".to_string(),
            transformix: "transformix".to_string(),
            timeout_secs: 3600,
            threads: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elastix(mut self, path: impl Into<String>) -> Self {
        self.elastix = path.into();
        self
    }

    pub fn with_transformix(mut self, path: impl Into<String>) -> Self {
        self.transformix = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }
}
