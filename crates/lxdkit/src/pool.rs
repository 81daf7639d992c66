//! Clients and the per-endpoint client pool.

use crate::accessor::Resources;
use crate::backend::Backend;
use crate::backend::rest::RestBackend;
use crate::backend::tls::TlsTransport;
use crate::endpoint::{Endpoint, EndpointIdentity};
use crate::error::{Error, Result};
use crate::types::ResourceKind;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A connected session to one daemon.
pub struct Client {
    identity: EndpointIdentity,
    backend: Box<dyn Backend>,
}

impl Client {
    /// Create a client for an identity over a backend.
    pub fn new(identity: EndpointIdentity, backend: Box<dyn Backend>) -> Self {
        Self { identity, backend }
    }

    /// Create a client with a custom backend and the local identity.
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self::new(EndpointIdentity::local(), backend)
    }

    /// Identity this client was created for.
    #[must_use]
    pub fn identity(&self) -> &EndpointIdentity {
        &self.identity
    }

    /// Underlying backend.
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Whether the daemon trusts our certificate.
    pub fn trusted(&self) -> Result<bool> {
        Ok(self.backend.server_info()?.trusted())
    }

    /// Authenticate with the trust password unless already trusted.
    ///
    /// Returns whether the client is trusted afterwards.
    pub fn authenticate(&self, password: &str) -> Result<bool> {
        if self.trusted()? {
            return Ok(true);
        }
        log::debug!("authenticating against {}", self.backend.endpoint());
        self.backend.authenticate(password)?;
        self.trusted()
    }

    /// Container accessor.
    #[must_use]
    pub fn containers(&self) -> Resources<'_> {
        Resources::new(self, ResourceKind::Container)
    }

    /// Profile accessor.
    #[must_use]
    pub fn profiles(&self) -> Resources<'_> {
        Resources::new(self, ResourceKind::Profile)
    }
}

/// Opens backends for resolved endpoints.
pub trait Connector: Send + Sync {
    /// Connect to an endpoint and verify it answers.
    fn connect(&self, identity: &EndpointIdentity, endpoint: &Endpoint) -> Result<Box<dyn Backend>>;
}

/// Connects over the unix socket or HTTPS.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnector;

impl Connector for DefaultConnector {
    fn connect(&self, identity: &EndpointIdentity, endpoint: &Endpoint) -> Result<Box<dyn Backend>> {
        let backend: Box<dyn Backend> = match endpoint {
            #[cfg(unix)]
            Endpoint::Socket(path) => Box::new(RestBackend::new(
                crate::backend::unix::UnixTransport::new(path),
            )),
            #[cfg(not(unix))]
            Endpoint::Socket(path) => {
                return Err(Error::ConnectionFailed {
                    endpoint: path.display().to_string(),
                    message: "unix sockets are not supported on this platform".to_string(),
                });
            }
            Endpoint::Remote {
                url,
                cert,
                key,
                verify,
            } => Box::new(RestBackend::new(TlsTransport::connect(
                url, cert, key, *verify,
            )?)),
        };

        backend.server_info().map_err(|e| match e {
            Error::RemoteRejected { message, .. } => Error::ConnectionFailed {
                endpoint: identity.label().to_string(),
                message,
            },
            other => other,
        })?;
        Ok(backend)
    }
}

/// Process-wide cache of clients, one per endpoint identity.
///
/// Entries live for the life of the pool.
pub struct ClientPool {
    connector: Box<dyn Connector>,
    clients: Mutex<HashMap<EndpointIdentity, Arc<Client>>>,
}

impl Default for ClientPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientPool {
    /// Pool using the default connector.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connector(Box::new(DefaultConnector))
    }

    /// Pool using a custom connector.
    pub fn with_connector(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<EndpointIdentity, Arc<Client>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the client for an identity, connecting on first use.
    ///
    /// The cache lock is not held while connecting. Failures are not
    /// cached; the next call tries again.
    pub fn acquire(&self, identity: &EndpointIdentity) -> Result<Arc<Client>> {
        if let Some(client) = self.clients().get(identity) {
            log::debug!("reusing client for {}", identity.label());
            return Ok(Arc::clone(client));
        }

        let endpoint = identity.resolve()?;
        log::debug!("connecting to {}", identity.label());
        let backend = self.connector.connect(identity, &endpoint)?;
        let client = Arc::new(Client::new(identity.clone(), backend));

        // A concurrent acquire may have inserted first; its client wins.
        let mut clients = self.clients();
        Ok(Arc::clone(clients.entry(identity.clone()).or_insert(client)))
    }

    /// Number of cached clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients().len()
    }

    /// Whether no client has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
