//! Configuration schema: named remotes and the managed-entry policy.
//!
//! ```toml
//! default_remote = "lab"
//! managed_config_prefix = "volatile."
//! managed_devices = ["root"]
//!
//! [remotes.lab]
//! address = "https://lab.lan:8443"
//! cert = "~/.config/lxc/client.crt"
//! key = "~/.config/lxc/client.key"
//! verify_cert = false
//! ```

use crate::paths;
use anyhow::{Context, Result, bail};
use declarative::{KeyPrefix, ReservedNames};
use lxdkit::types::{MANAGED_CONFIG_PREFIX, MANAGED_ROOT_DEVICE};
use lxdkit::{EndpointIdentity, Reconciler};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name that always refers to the local daemon unless a remote claims it.
pub const LOCAL_REMOTE: &str = "local";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Remote used when none is named
    #[serde(default)]
    pub default_remote: Option<String>,

    /// Config keys with this prefix belong to the daemon
    #[serde(default = "default_config_prefix")]
    pub managed_config_prefix: String,

    /// Devices that belong to the daemon
    #[serde(default = "default_managed_devices")]
    pub managed_devices: Vec<String>,

    /// Named remotes
    #[serde(default)]
    pub remotes: BTreeMap<String, Remote>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_remote: None,
            managed_config_prefix: default_config_prefix(),
            managed_devices: default_managed_devices(),
            remotes: BTreeMap::new(),
        }
    }
}

fn default_config_prefix() -> String {
    MANAGED_CONFIG_PREFIX.to_string()
}

fn default_managed_devices() -> Vec<String> {
    vec![MANAGED_ROOT_DEVICE.to_string()]
}

fn default_true() -> bool {
    true
}

/// A daemon reachable over the network or a socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    /// `https://host:8443` or `unix:/path/to/socket`
    pub address: String,

    /// Client certificate (PEM)
    #[serde(default)]
    pub cert: Option<String>,

    /// Client key (PEM)
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default = "default_true")]
    pub verify_cert: bool,
}

impl Remote {
    fn is_socket(&self) -> bool {
        let address = self.address.trim();
        address.starts_with("unix:") || address.starts_with("http+unix://")
    }

    /// Validate the remote
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            bail!("address must not be empty");
        }
        if !self.is_socket() && (self.cert.is_none() || self.key.is_none()) {
            bail!("cert and key are required for '{}'", self.address);
        }
        Ok(())
    }

    /// Endpoint identity with credential paths expanded
    pub fn identity(&self) -> EndpointIdentity {
        let expand = |p: &String| paths::expand(p).display().to_string();
        EndpointIdentity {
            address: Some(self.address.trim().to_string()),
            cert: self.cert.as_ref().map(expand),
            key: self.key.as_ref().map(expand),
            verify_cert: self.verify_cert,
        }
    }
}

impl Config {
    /// Load from the default location; a missing file yields the defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Load from an explicit path; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to an explicit path, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Could not write config file: {}", path.display()))?;
        Ok(path.to_path_buf())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, remote) in &self.remotes {
            remote
                .validate()
                .with_context(|| format!("Invalid remote '{name}'"))?;
        }

        if let Some(default) = &self.default_remote
            && default != LOCAL_REMOTE
            && !self.remotes.contains_key(default)
        {
            bail!("default_remote '{default}' is not a configured remote");
        }
        Ok(())
    }

    /// Resolve a remote name to an endpoint identity.
    ///
    /// No name means `default_remote`, then the local daemon.
    pub fn identity(&self, name: Option<&str>) -> Result<EndpointIdentity> {
        let name = name.or(self.default_remote.as_deref());
        match name {
            None => Ok(EndpointIdentity::local()),
            Some(name) => match self.remotes.get(name) {
                Some(remote) => Ok(remote.identity()),
                None if name == LOCAL_REMOTE => Ok(EndpointIdentity::local()),
                None => bail!("Unknown remote '{name}'"),
            },
        }
    }

    /// Reconciler honoring the configured managed entries
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::with_policies(
            KeyPrefix::new(self.managed_config_prefix.clone()),
            ReservedNames::new(self.managed_devices.iter().cloned()),
        )
    }
}
