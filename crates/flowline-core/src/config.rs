use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FlowlineError, Result};

/// Connection settings for the remote runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Base URL of the runner HTTP API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Optional bearer key sent as `x-api-key`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Recursion limit forwarded with each run request.
    #[serde(default)]
    pub recursion_limit: Option<u32>,

    /// Request timeout for non-streaming calls, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            recursion_limit: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RunnerConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FlowlineError::ConfigNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self =
            toml::from_str(&raw).map_err(|e| FlowlineError::Config(e.to_string()))?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("FLOWLINE_RUNNER_URL") {
            self.base_url = url;
        }
        if let Ok(key) = std::env::var("FLOWLINE_API_KEY") {
            self.api_key = Some(key);
        }
    }
}
