//! Backend trait and implementations for talking to the daemon.
//!
//! [`rest::RestBackend`] speaks the daemon's REST API over either transport
//! ([`tls::TlsTransport`] for HTTPS with client certificates,
//! [`unix::UnixTransport`] for the local socket). [`MockBackend`] keeps
//! resources in memory and records every call, for tests.
//!
//! # Testing
//!
//! ```
//! use lxdkit::backend::{Backend, Call, MockBackend};
//! use lxdkit::{Resource, ResourceKind};
//!
//! let mock = MockBackend::new();
//! mock.insert(ResourceKind::Container, Resource::new("web"));
//!
//! let web = mock.get(ResourceKind::Container, "web").unwrap();
//! assert_eq!(web.name, "web");
//! assert_eq!(mock.calls(), vec![Call::Get(ResourceKind::Container, "web".into())]);
//! ```

mod agent;
pub mod rest;
pub mod tls;
#[cfg(unix)]
pub mod unix;

use crate::error::{Error, Result};
use crate::types::{
    Completion, LifecycleStatus, MigrationTicket, Operation, Resource, ResourceKind, ServerInfo,
    StateAction, StopOptions,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The remote resource API.
///
/// Every method is one blocking round trip (plus the wait on a background
/// operation where `wait` is set). Nothing is retried.
pub trait Backend: Send + Sync {
    /// Label of the endpoint for logs and errors.
    fn endpoint(&self) -> &str;

    /// Base URL other daemons can reach this one at.
    fn public_url(&self) -> Option<&str>;

    /// Fetch `/1.0`.
    fn server_info(&self) -> Result<ServerInfo>;

    /// Ask the daemon to trust our client certificate.
    fn authenticate(&self, password: &str) -> Result<()>;

    /// Full listing of a collection.
    fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>>;

    /// Names in a collection.
    fn list_names(&self, kind: ResourceKind) -> Result<Vec<String>>;

    /// Fetch one resource.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the resource doesn't exist.
    fn get(&self, kind: ResourceKind, name: &str) -> Result<Resource>;

    /// Create a resource from a request body.
    fn create(&self, kind: ResourceKind, body: &Value, wait: bool) -> Result<Completion<()>>;

    /// Persist a resource snapshot.
    fn update(&self, kind: ResourceKind, resource: &Resource) -> Result<()>;

    /// Delete a resource.
    fn delete(&self, kind: ResourceKind, name: &str, wait: bool) -> Result<Completion<()>>;

    /// Rename a resource.
    fn rename(
        &self,
        kind: ResourceKind,
        name: &str,
        new_name: &str,
        wait: bool,
    ) -> Result<Completion<()>>;

    /// Change the lifecycle state of a container.
    fn change_state(
        &self,
        name: &str,
        action: StateAction,
        options: StopOptions,
        wait: bool,
    ) -> Result<Completion<()>>;

    /// Open a migration on the source side.
    fn migration_source(&self, name: &str) -> Result<MigrationTicket>;

    /// Create a container by pulling it from a migration source.
    fn create_from_migration(&self, resource: &Resource, ticket: &MigrationTicket) -> Result<()>;
}

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// [`Backend::server_info`]
    ServerInfo,
    /// [`Backend::authenticate`]
    Authenticate,
    /// [`Backend::list`] or [`Backend::list_names`]
    List(ResourceKind),
    /// [`Backend::get`]
    Get(ResourceKind, String),
    /// [`Backend::create`], by new name
    Create(ResourceKind, String),
    /// [`Backend::update`]
    Update(ResourceKind, String),
    /// [`Backend::delete`]
    Delete(ResourceKind, String),
    /// [`Backend::rename`], old and new name
    Rename(ResourceKind, String, String),
    /// [`Backend::change_state`]
    ChangeState(String, StateAction),
    /// [`Backend::migration_source`]
    MigrationSource(String),
    /// [`Backend::create_from_migration`]
    CreateFromMigration(String),
}

/// Operations whose failure can be injected into a [`MockBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// [`Backend::create`]
    Create,
    /// [`Backend::update`]
    Update,
    /// [`Backend::delete`]
    Delete,
    /// [`Backend::rename`]
    Rename,
    /// [`Backend::change_state`]
    ChangeState,
    /// [`Backend::migration_source`] and [`Backend::create_from_migration`]
    Migrate,
}

#[derive(Debug, Default)]
struct MockState {
    resources: HashMap<(ResourceKind, String), Resource>,
    calls: Vec<Call>,
    rejections: HashMap<MockOp, (String, u16)>,
    trusted: bool,
    password: Option<String>,
}

/// In-memory backend for tests.
///
/// Clones share state, so a test can keep a handle after boxing one into
/// a client.
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    label: String,
    url: Option<String>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new empty, trusted mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                trusted: true,
                ..MockState::default()
            })),
            label: "mock".to_string(),
            url: None,
        }
    }

    /// Give the mock a public URL so it can act as a migration source.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.label = url.clone();
        self.url = Some(url);
        self
    }

    /// Require a password before the client is trusted.
    #[must_use]
    pub fn untrusted(self, password: impl Into<String>) -> Self {
        {
            let mut state = self.lock();
            state.trusted = false;
            state.password = Some(password.into());
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: Call) -> MutexGuard<'_, MockState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }

    fn check(state: &MockState, op: MockOp) -> Result<()> {
        match state.rejections.get(&op) {
            Some((message, status)) => Err(Error::rejected(message.clone(), Some(*status))),
            None => Ok(()),
        }
    }

    /// Store a resource directly, without recording a call.
    pub fn insert(&self, kind: ResourceKind, resource: Resource) {
        self.lock()
            .resources
            .insert((kind, resource.name.clone()), resource);
    }

    /// Peek at a stored resource, without recording a call.
    #[must_use]
    pub fn resource(&self, kind: ResourceKind, name: &str) -> Option<Resource> {
        self.lock().resources.get(&(kind, name.to_string())).cloned()
    }

    /// Make every call of an operation fail with a daemon rejection.
    pub fn reject(&self, op: MockOp, message: impl Into<String>) {
        self.reject_with_status(op, message, 400);
    }

    /// Like [`reject`](Self::reject), answering with a specific HTTP status.
    pub fn reject_with_status(&self, op: MockOp, message: impl Into<String>, status: u16) {
        self.lock().rejections.insert(op, (message.into(), status));
    }

    /// All calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls matching a predicate.
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

fn not_found(kind: ResourceKind, name: &str) -> Error {
    Error::not_found(format!("{kind} '{name}'"))
}

impl Backend for MockBackend {
    fn endpoint(&self) -> &str {
        &self.label
    }

    fn public_url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn server_info(&self) -> Result<ServerInfo> {
        let state = self.record(Call::ServerInfo);
        Ok(ServerInfo {
            auth: if state.trusted { "trusted" } else { "untrusted" }.to_string(),
            api_version: "1.0".to_string(),
            environment: serde_json::json!({ "certificate": "MOCK CERTIFICATE" }),
        })
    }

    fn authenticate(&self, password: &str) -> Result<()> {
        let mut state = self.record(Call::Authenticate);
        if state.trusted || state.password.as_deref() == Some(password) {
            state.trusted = true;
            Ok(())
        } else {
            Err(Error::rejected("not authorized", Some(403)))
        }
    }

    fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>> {
        let state = self.record(Call::List(kind));
        let mut resources: Vec<Resource> = state
            .resources
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, r)| r.clone())
            .collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(resources)
    }

    fn list_names(&self, kind: ResourceKind) -> Result<Vec<String>> {
        Ok(self.list(kind)?.into_iter().map(|r| r.name).collect())
    }

    fn get(&self, kind: ResourceKind, name: &str) -> Result<Resource> {
        let state = self.record(Call::Get(kind, name.to_string()));
        state
            .resources
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| not_found(kind, name))
    }

    fn create(&self, kind: ResourceKind, body: &Value, _wait: bool) -> Result<Completion<()>> {
        let name = body
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut state = self.record(Call::Create(kind, name.clone()));
        Self::check(&state, MockOp::Create)?;

        if state.resources.contains_key(&(kind, name.clone())) {
            return Err(Error::rejected(
                format!("{kind} '{name}' already exists"),
                Some(409),
            ));
        }

        let mut resource: Resource = serde_json::from_value(body.clone())?;
        if kind == ResourceKind::Container {
            resource.status_code = Some(LifecycleStatus::STOPPED_CODE);
            resource.status = Some("Stopped".to_string());
        }
        state.resources.insert((kind, name), resource);
        Ok(Completion::Done(()))
    }

    fn update(&self, kind: ResourceKind, resource: &Resource) -> Result<()> {
        let mut state = self.record(Call::Update(kind, resource.name.clone()));
        Self::check(&state, MockOp::Update)?;

        let key = (kind, resource.name.clone());
        if !state.resources.contains_key(&key) {
            return Err(Error::rejected("not found", Some(404)));
        }
        state.resources.insert(key, resource.clone());
        Ok(())
    }

    fn delete(&self, kind: ResourceKind, name: &str, _wait: bool) -> Result<Completion<()>> {
        let mut state = self.record(Call::Delete(kind, name.to_string()));
        Self::check(&state, MockOp::Delete)?;
        state.resources.remove(&(kind, name.to_string()));
        Ok(Completion::Done(()))
    }

    fn rename(
        &self,
        kind: ResourceKind,
        name: &str,
        new_name: &str,
        wait: bool,
    ) -> Result<Completion<()>> {
        let mut state = self.record(Call::Rename(kind, name.to_string(), new_name.to_string()));
        Self::check(&state, MockOp::Rename)?;

        let mut resource = state
            .resources
            .remove(&(kind, name.to_string()))
            .ok_or_else(|| Error::rejected("not found", Some(404)))?;
        resource.name = new_name.to_string();
        state.resources.insert((kind, new_name.to_string()), resource);

        if wait {
            Ok(Completion::Done(()))
        } else {
            Ok(Completion::Pending(Operation {
                id: "mock-rename".to_string(),
                status: "Running".to_string(),
                status_code: 103,
                ..Operation::default()
            }))
        }
    }

    fn change_state(
        &self,
        name: &str,
        action: StateAction,
        _options: StopOptions,
        _wait: bool,
    ) -> Result<Completion<()>> {
        let mut state = self.record(Call::ChangeState(name.to_string(), action));
        Self::check(&state, MockOp::ChangeState)?;

        let resource = state
            .resources
            .get_mut(&(ResourceKind::Container, name.to_string()))
            .ok_or_else(|| Error::rejected("not found", Some(404)))?;
        let (code, status) = match action {
            StateAction::Start | StateAction::Restart | StateAction::Unfreeze => {
                (LifecycleStatus::RUNNING_CODE, "Running")
            }
            StateAction::Stop => (LifecycleStatus::STOPPED_CODE, "Stopped"),
            StateAction::Freeze => (LifecycleStatus::FROZEN_CODE, "Frozen"),
        };
        resource.status_code = Some(code);
        resource.status = Some(status.to_string());
        Ok(Completion::Done(()))
    }

    fn migration_source(&self, name: &str) -> Result<MigrationTicket> {
        let state = self.record(Call::MigrationSource(name.to_string()));
        Self::check(&state, MockOp::Migrate)?;

        let url = self
            .url
            .as_deref()
            .ok_or_else(|| Error::InvalidOperation("mock has no public URL".to_string()))?;
        Ok(MigrationTicket {
            operation_url: format!("{url}/1.0/operations/mock-migration"),
            certificate: "MOCK CERTIFICATE".to_string(),
            secrets: [("control".to_string(), "c".to_string())].into(),
        })
    }

    fn create_from_migration(&self, resource: &Resource, _ticket: &MigrationTicket) -> Result<()> {
        let mut state = self.record(Call::CreateFromMigration(resource.name.clone()));
        Self::check(&state, MockOp::Migrate)?;

        let mut copy = resource.clone();
        copy.status_code = Some(LifecycleStatus::STOPPED_CODE);
        copy.status = Some("Stopped".to_string());
        state
            .resources
            .insert((ResourceKind::Container, copy.name.clone()), copy);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mock_get_missing() {
        let mock = MockBackend::new();
        let err = mock.get(ResourceKind::Container, "nope").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_mock_create_sets_stopped() {
        let mock = MockBackend::new();
        mock.create(ResourceKind::Container, &json!({"name": "web"}), true)
            .unwrap();
        let web = mock.resource(ResourceKind::Container, "web").unwrap();
        assert_eq!(web.lifecycle(), Some(LifecycleStatus::Stopped));
    }

    #[test]
    fn test_mock_create_duplicate_rejected() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Profile, Resource::new("default"));
        let err = mock
            .create(ResourceKind::Profile, &json!({"name": "default"}), true)
            .unwrap_err();
        assert!(matches!(err, Error::RemoteRejected { status: Some(409), .. }));
    }

    #[test]
    fn test_mock_injected_rejection() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Container, Resource::new("web"));
        mock.reject(MockOp::Update, "Invalid config");

        let err = mock
            .update(ResourceKind::Container, &Resource::new("web"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid config");
    }

    #[test]
    fn test_mock_change_state() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Container, Resource::new("web"));
        mock.change_state("web", StateAction::Freeze, StopOptions::default(), true)
            .unwrap();
        assert_eq!(
            mock.resource(ResourceKind::Container, "web")
                .unwrap()
                .lifecycle(),
            Some(LifecycleStatus::Frozen)
        );
    }

    #[test]
    fn test_mock_authenticate() {
        let mock = MockBackend::new().untrusted("secret");
        assert!(!mock.server_info().unwrap().trusted());
        assert!(mock.authenticate("wrong").is_err());
        mock.authenticate("secret").unwrap();
        assert!(mock.server_info().unwrap().trusted());
    }

    #[test]
    fn test_mock_rename_pending() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Container, Resource::new("a"));
        let completion = mock
            .rename(ResourceKind::Container, "a", "b", false)
            .unwrap();
        assert!(matches!(completion, Completion::Pending(_)));
        assert!(mock.resource(ResourceKind::Container, "b").is_some());
    }
}
