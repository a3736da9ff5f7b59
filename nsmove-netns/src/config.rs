//! Relocation configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use nsmove_core::{Error, Result};

/// Relocation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelocationConfig {
    /// Directory bare namespace names resolve under
    pub netns_dir: PathBuf,

    /// Name of the namespace worker thread
    pub worker_name: String,

    /// How many relocation jobs may wait for the worker
    pub queue_depth: usize,
}

impl Default for RelocationConfig {
    fn default() -> Self {
        Self {
            netns_dir: PathBuf::from(Self::DEFAULT_NETNS_DIR),
            worker_name: Self::DEFAULT_WORKER_NAME.to_string(),
            queue_depth: 64,
        }
    }
}

impl RelocationConfig {
    /// Where `ip netns add` puts named namespaces
    pub const DEFAULT_NETNS_DIR: &'static str = "/var/run/netns";

    /// Default worker thread name
    pub const DEFAULT_WORKER_NAME: &'static str = "nsmove-netns";

    /// Create a new relocation configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the named namespace directory
    #[must_use]
    pub fn with_netns_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.netns_dir = dir.into();
        self
    }

    /// Set the worker thread name
    #[must_use]
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Set the job queue depth
    #[must_use]
    pub const fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Parse a JSON configuration
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or the result fails validation
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Loading relocation config");

        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check the configuration for values the worker cannot run with
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] describing the first problem found
    pub fn validate(&self) -> Result<()> {
        if !self.netns_dir.is_absolute() {
            return Err(Error::InvalidConfig {
                message: format!(
                    "netns_dir must be absolute, got {}",
                    self.netns_dir.display()
                ),
            });
        }

        if self.worker_name.is_empty() || self.worker_name.contains('\0') {
            return Err(Error::InvalidConfig {
                message: "worker_name must be non-empty and free of NUL bytes".to_string(),
            });
        }

        if self.queue_depth == 0 {
            return Err(Error::InvalidConfig {
                message: "queue_depth must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
