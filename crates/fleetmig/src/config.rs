//! Operator configuration
//!
//! Every field has a default matching a stock beta7 controller, so the
//! config file is optional and may set any subset of fields.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("reading config {}: {source}", path.display())]
    Read {
        /// Config file
        path: PathBuf,
        /// I/O error
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field has an unusable value
    #[error("invalid config field {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Paths, credentials and versions used by the operator commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    /// JSON snapshot of the controller document store
    pub store_path: PathBuf,
    /// Remote login user
    pub ssh_user: String,
    /// Private key used for every remote call
    pub identity_file: PathBuf,
    /// Agent directories on every machine
    pub agents_dir: PathBuf,
    /// Agent tools on every machine
    pub tools_dir: PathBuf,
    /// Where `distribute` installs this executable
    pub remote_binary_path: PathBuf,
    /// Tools version the agents are moved to
    pub tools_version: String,
    /// Agent version recorded in model settings
    pub agent_version: String,
    /// Directory receiving cloud credential files
    pub cert_dir: PathBuf,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("/var/lib/juju/fleetmig-store.json"),
            ssh_user: "ubuntu".into(),
            identity_file: PathBuf::from("/var/lib/juju/system-identity"),
            agents_dir: PathBuf::from("/var/lib/juju/agents"),
            tools_dir: PathBuf::from("/var/lib/juju/tools"),
            remote_binary_path: PathBuf::from("/var/lib/juju/fleetmig"),
            tools_version: "2.0.0-xenial-amd64".into(),
            agent_version: "2.0.0".into(),
            cert_dir: PathBuf::from("/etc/juju"),
        }
    }
}

impl FleetConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text; absent fields keep their defaults
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed TOML or unknown fields,
    /// `ConfigError::Invalid` if validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file
    ///
    /// # Errors
    /// `ConfigError::Read` if the file cannot be read, otherwise as
    /// [`FleetConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check field values
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssh_user.is_empty() {
            return Err(ConfigError::Invalid {
                field: "ssh_user",
                reason: "must not be empty",
            });
        }
        if self.tools_version.is_empty() {
            return Err(ConfigError::Invalid {
                field: "tools_version",
                reason: "must not be empty",
            });
        }
        Ok(())
    }

    /// With store snapshot path
    #[inline]
    #[must_use]
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    /// With remote login user
    #[inline]
    #[must_use]
    pub fn with_ssh_user(mut self, user: impl Into<String>) -> Self {
        self.ssh_user = user.into();
        self
    }

    /// With identity file
    #[inline]
    #[must_use]
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = path.into();
        self
    }

    /// With credential file directory
    #[inline]
    #[must_use]
    pub fn with_cert_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cert_dir = dir.into();
        self
    }

    /// Home directory of the remote login user
    #[must_use]
    pub fn remote_home(&self) -> String {
        format!("/home/{}", self.ssh_user)
    }
}
