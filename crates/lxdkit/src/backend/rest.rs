//! REST backend: the daemon's JSON envelope over a pluggable transport.

use super::Backend;
use crate::error::{Error, Result};
use crate::types::{
    Completion, MigrationTicket, Operation, Resource, ResourceKind, ServerInfo, StateAction,
    StopOptions,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        write!(f, "{name}")
    }
}

/// One HTTP exchange with the daemon.
pub trait Transport: Send + Sync {
    /// Label for logs and errors.
    fn label(&self) -> &str;

    /// Base URL reachable by other daemons, if any.
    fn base_url(&self) -> Option<&str>;

    /// Send a request and return the status code and decoded JSON body.
    ///
    /// An empty body decodes to `Value::Null`.
    fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<(u16, Value)>;
}

/// Standard response envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_code: u16,
    #[serde(default)]
    operation: String,
    #[serde(default)]
    metadata: Value,
}

/// Backend speaking the REST API.
pub struct RestBackend<T: Transport> {
    transport: T,
}

impl<T: Transport> RestBackend<T> {
    /// Wrap a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Envelope> {
        log::debug!("{} {} {}", self.transport.label(), method, path);
        let (status, value) = self.transport.request(method, path, body)?;

        let envelope = match serde_json::from_value::<Envelope>(value) {
            Ok(envelope) => envelope,
            Err(_) if status >= 400 => {
                return Err(Error::rejected(format!("HTTP {status}"), Some(status)));
            }
            Err(e) => return Err(e.into()),
        };

        if envelope.kind == "error" || status >= 400 {
            let code = if envelope.error_code > 0 {
                envelope.error_code
            } else {
                status
            };
            let message = if envelope.error.is_empty() {
                format!("HTTP {code}")
            } else {
                envelope.error
            };
            return Err(Error::rejected(message, Some(code)));
        }
        Ok(envelope)
    }

    /// Settle an envelope: wait on its operation when asked to.
    fn settle(&self, envelope: Envelope, wait: bool) -> Result<Completion<Operation>> {
        if envelope.kind != "async" {
            return Ok(Completion::Done(Operation::default()));
        }

        let operation: Operation = serde_json::from_value(envelope.metadata)?;
        if !wait {
            return Ok(Completion::Pending(operation));
        }

        let path = if envelope.operation.is_empty() {
            operation.path()
        } else {
            envelope.operation
        };
        let waited = self.call(Method::Get, &format!("{path}/wait"), None)?;
        let finished: Operation = serde_json::from_value(waited.metadata)?;
        finished.into_result().map(Completion::Done)
    }

    fn run(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        wait: bool,
    ) -> Result<Completion<()>> {
        let envelope = self.call(method, path, body)?;
        Ok(match self.settle(envelope, wait)? {
            Completion::Done(_) => Completion::Done(()),
            Completion::Pending(op) => Completion::Pending(op),
        })
    }
}

fn last_segment(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}

impl<T: Transport> Backend for RestBackend<T> {
    fn endpoint(&self) -> &str {
        self.transport.label()
    }

    fn public_url(&self) -> Option<&str> {
        self.transport.base_url()
    }

    fn server_info(&self) -> Result<ServerInfo> {
        let envelope = self.call(Method::Get, "/1.0", None)?;
        Ok(serde_json::from_value(envelope.metadata)?)
    }

    fn authenticate(&self, password: &str) -> Result<()> {
        let body = json!({ "type": "client", "password": password });
        self.call(Method::Post, "/1.0/certificates", Some(&body))?;
        Ok(())
    }

    fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>> {
        let path = format!("{}?recursion=1", kind.collection());
        let envelope = self.call(Method::Get, &path, None)?;
        Ok(serde_json::from_value(envelope.metadata)?)
    }

    fn list_names(&self, kind: ResourceKind) -> Result<Vec<String>> {
        let envelope = self.call(Method::Get, kind.collection(), None)?;
        let urls: Vec<String> = serde_json::from_value(envelope.metadata)?;
        Ok(urls.iter().map(|u| last_segment(u).to_string()).collect())
    }

    fn get(&self, kind: ResourceKind, name: &str) -> Result<Resource> {
        let envelope = match self.call(Method::Get, &kind.path(name), None) {
            Ok(envelope) => envelope,
            Err(e) if e.is_remote_not_found() => {
                return Err(Error::not_found(format!("{kind} '{name}'")));
            }
            Err(e) => return Err(e),
        };
        Ok(serde_json::from_value(envelope.metadata)?)
    }

    fn create(&self, kind: ResourceKind, body: &Value, wait: bool) -> Result<Completion<()>> {
        self.run(Method::Post, kind.collection(), Some(body), wait)
    }

    fn update(&self, kind: ResourceKind, resource: &Resource) -> Result<()> {
        let body = resource.save_body(kind);
        self.run(Method::Put, &kind.path(&resource.name), Some(&body), true)?;
        Ok(())
    }

    fn delete(&self, kind: ResourceKind, name: &str, wait: bool) -> Result<Completion<()>> {
        self.run(Method::Delete, &kind.path(name), None, wait)
    }

    fn rename(
        &self,
        kind: ResourceKind,
        name: &str,
        new_name: &str,
        wait: bool,
    ) -> Result<Completion<()>> {
        let body = json!({ "name": new_name });
        self.run(Method::Post, &kind.path(name), Some(&body), wait)
    }

    fn change_state(
        &self,
        name: &str,
        action: StateAction,
        options: StopOptions,
        wait: bool,
    ) -> Result<Completion<()>> {
        let body = json!({
            "action": action.as_str(),
            "timeout": options.timeout,
            "force": options.force,
            "stateful": false,
        });
        let path = format!("{}/state", ResourceKind::Container.path(name));
        self.run(Method::Put, &path, Some(&body), wait)
    }

    fn migration_source(&self, name: &str) -> Result<MigrationTicket> {
        let base = self.transport.base_url().ok_or_else(|| {
            Error::InvalidOperation(format!(
                "'{}' is not reachable by other daemons, can't migrate from it",
                self.transport.label()
            ))
        })?;

        let certificate = self
            .server_info()?
            .certificate()
            .unwrap_or_default()
            .to_string();

        let body = json!({ "migration": true });
        let envelope = self.call(
            Method::Post,
            &ResourceKind::Container.path(name),
            Some(&body),
        )?;
        let operation: Operation = serde_json::from_value(envelope.metadata)?;
        let path = if envelope.operation.is_empty() {
            operation.path()
        } else {
            envelope.operation
        };
        let secrets = serde_json::from_value(operation.metadata)?;

        Ok(MigrationTicket {
            operation_url: format!("{base}{path}"),
            certificate,
            secrets,
        })
    }

    fn create_from_migration(&self, resource: &Resource, ticket: &MigrationTicket) -> Result<()> {
        let body = json!({
            "name": resource.name,
            "architecture": resource.architecture,
            "config": resource.config,
            "devices": resource.devices,
            "ephemeral": resource.ephemeral,
            "profiles": resource.profiles,
            "description": resource.description,
            "source": {
                "type": "migration",
                "mode": "pull",
                "operation": ticket.operation_url,
                "certificate": ticket.certificate,
                "secrets": ticket.secrets,
            },
        });
        self.run(
            Method::Post,
            ResourceKind::Container.collection(),
            Some(&body),
            true,
        )?;
        Ok(())
    }
}
