//! HTTPS transport authenticated with a client certificate.

use super::agent::exchange;
use super::rest::{Method, Transport};
use crate::error::{Error, Result};
use serde_json::Value;
use std::path::Path;
use ureq::Agent;
use ureq::tls::{Certificate, ClientCert, PemItem, PrivateKey, TlsConfig};

/// HTTPS transport backed by a `ureq` agent.
pub struct TlsTransport {
    agent: Agent,
    base_url: String,
}

impl TlsTransport {
    /// Build a transport presenting the given client certificate.
    ///
    /// `verify` controls verification of the server certificate. The
    /// daemon usually runs with a self-signed one.
    pub fn connect(url: &str, cert: &Path, key: &Path, verify: bool) -> Result<Self> {
        let cert_pem = std::fs::read(cert).map_err(|e| Error::io(cert, e))?;
        let key_pem = std::fs::read(key).map_err(|e| Error::io(key, e))?;

        let chain: Vec<Certificate<'static>> = ureq::tls::parse_pem(&cert_pem)
            .filter_map(|item| match item {
                Ok(PemItem::Certificate(c)) => Some(c),
                _ => None,
            })
            .collect();
        if chain.is_empty() {
            return Err(Error::invalid(format!(
                "no certificate found in {}",
                cert.display()
            )));
        }

        let private_key = PrivateKey::from_pem(&key_pem).map_err(|e| {
            Error::invalid(format!("invalid private key {}: {e}", key.display()))
        })?;

        let tls = TlsConfig::builder()
            .client_cert(Some(ClientCert::new_with_certs(&chain, private_key)))
            .disable_verification(!verify)
            .build();

        let agent: Agent = Agent::config_builder()
            .tls_config(tls)
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            agent,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }
}

impl Transport for TlsTransport {
    fn label(&self) -> &str {
        &self.base_url
    }

    fn base_url(&self) -> Option<&str> {
        Some(&self.base_url)
    }

    fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<(u16, Value)> {
        let url = format!("{}{}", self.base_url, path);
        exchange(&self.agent, &self.base_url, &url, method, body)
    }
}
