//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AccordError, Result};

/// Endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Timeout handed to the connection layer for request/reply exchanges,
    /// in seconds.
    pub request_timeout_secs: u64,

    /// Transport namespaces to prefer, in order, when selecting a
    /// replacement transport. Namespaces not listed fall back to manager
    /// priority order.
    pub transport_preference: Vec<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            transport_preference: Vec::new(),
        }
    }
}

impl EndpointConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| AccordError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AccordError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(secs) = std::env::var("ACCORD_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.request_timeout_secs = secs;
            }
        }
        if let Ok(preference) = std::env::var("ACCORD_TRANSPORT_PREFERENCE") {
            config.transport_preference = preference
                .split(',')
                .map(|ns| ns.trim().to_string())
                .filter(|ns| !ns.is_empty())
                .collect();
        }

        config
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(self, other: Self) -> Self {
        let defaults = Self::default();
        Self {
            request_timeout_secs: if other.request_timeout_secs != defaults.request_timeout_secs {
                other.request_timeout_secs
            } else {
                self.request_timeout_secs
            },
            transport_preference: if other.transport_preference.is_empty() {
                self.transport_preference
            } else {
                other.transport_preference
            },
        }
    }

    /// The request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
