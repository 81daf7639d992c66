//! Endpoint identities and their resolution.
//!
//! An [`EndpointIdentity`] is what callers hand in; it is also the key of
//! the client pool. Resolving it checks credentials on the local
//! filesystem and yields a concrete [`Endpoint`] to connect to.

use crate::error::{Error, Result};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable pointing at the daemon's state directory.
pub const ENV_LXD_DIR: &str = "LXD_DIR";

/// State directory used when `LXD_DIR` is unset.
pub const DEFAULT_LXD_DIR: &str = "/var/lib/lxd";

/// Identity of a connection target and its credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointIdentity {
    /// `https://host:8443`, `http+unix://<path>`, or empty for the local daemon.
    #[serde(default)]
    pub address: Option<String>,
    /// PEM client certificate path.
    #[serde(default)]
    pub cert: Option<String>,
    /// PEM client key path.
    #[serde(default)]
    pub key: Option<String>,
    /// Verify the server certificate.
    #[serde(default = "default_verify")]
    pub verify_cert: bool,
}

fn default_verify() -> bool {
    true
}

impl Default for EndpointIdentity {
    fn default() -> Self {
        Self::local()
    }
}

impl EndpointIdentity {
    /// The local daemon over its default socket.
    #[must_use]
    pub fn local() -> Self {
        Self {
            address: None,
            cert: None,
            key: None,
            verify_cert: true,
        }
    }

    /// A remote daemon authenticated with a client certificate.
    pub fn remote(
        address: impl Into<String>,
        cert: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            address: Some(address.into()),
            cert: Some(cert.into()),
            key: Some(key.into()),
            verify_cert: true,
        }
    }

    /// A daemon listening on a unix socket.
    pub fn socket(path: impl AsRef<Path>) -> Self {
        Self {
            address: Some(format!("unix:{}", path.as_ref().display())),
            ..Self::local()
        }
    }

    /// Set certificate verification.
    #[must_use]
    pub fn verify(mut self, verify_cert: bool) -> Self {
        self.verify_cert = verify_cert;
        self
    }

    /// Human-readable label for logs and errors.
    #[must_use]
    pub fn label(&self) -> &str {
        match self.address.as_deref() {
            Some(addr) if !addr.trim().is_empty() => addr,
            _ => "local",
        }
    }

    /// Resolve to a concrete endpoint, validating credential files.
    ///
    /// Nothing touches the network here.
    pub fn resolve(&self) -> Result<Endpoint> {
        let address = match self.address.as_deref().map(str::trim) {
            None | Some("") => return Ok(Endpoint::Socket(default_socket_path())),
            Some(addr) => addr,
        };

        if let Some(path) = socket_path(address) {
            return Ok(Endpoint::Socket(path));
        }

        let cert = non_empty(self.cert.as_deref());
        let key = non_empty(self.key.as_deref());
        let (Some(cert), Some(key)) = (cert, key) else {
            return Err(Error::invalid(
                "you have to give a cert and key file for remote endpoints",
            ));
        };

        let cert = credential_file(cert, "cert")?;
        let key = credential_file(key, "key")?;

        Ok(Endpoint::Remote {
            url: address.trim_end_matches('/').to_string(),
            cert,
            key,
            verify: self.verify_cert,
        })
    }
}

/// A resolved connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix socket, no certificates.
    Socket(PathBuf),
    /// HTTPS endpoint with client certificate.
    Remote {
        /// Base URL.
        url: String,
        /// Expanded client certificate path.
        cert: PathBuf,
        /// Expanded client key path.
        key: PathBuf,
        /// Verify the server certificate.
        verify: bool,
    },
}

impl Endpoint {
    /// Base URL as seen by other daemons, if reachable over the network.
    #[must_use]
    pub fn public_url(&self) -> Option<&str> {
        match self {
            Self::Socket(_) => None,
            Self::Remote { url, .. } => Some(url),
        }
    }
}

/// Socket path of the local daemon.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    let dir = std::env::var(ENV_LXD_DIR)
        .ok()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_LXD_DIR.to_string());
    PathBuf::from(dir).join("unix.socket")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn socket_path(address: &str) -> Option<PathBuf> {
    let raw = address
        .strip_prefix("http+unix://")
        .or_else(|| address.strip_prefix("unix://"))
        .or_else(|| address.strip_prefix("unix:"))?;
    // Malformed escapes stay literal.
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    Some(PathBuf::from(decoded.as_ref()))
}

fn credential_file(path: &str, what: &str) -> Result<PathBuf> {
    let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
    if !expanded.is_file() {
        return Err(Error::invalid(format!(
            "you have given an invalid {what} path: \"{}\", the file does not exist or is not a file",
            expanded.display()
        )));
    }
    Ok(expanded)
}
