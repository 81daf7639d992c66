//! Per-kind resource accessor.
//!
//! [`Resources`] wraps a client and a [`ResourceKind`] and implements the
//! list/get/create/delete/rename/lifecycle/save operations with the checks
//! that must run before anything is sent to the daemon.

use crate::error::{Error, Result};
use crate::normalize::{coerce_string, normalize_config, normalize_devices};
use crate::pool::{Client, ClientPool};
use crate::property::{self, MapName, PropertyValue};
use crate::endpoint::EndpointIdentity;
use crate::types::{
    Architecture, Completion, ConfigMap, DeviceMaps, LifecycleStatus, Listing, Resource,
    ResourceKind, StateAction, StopOptions,
};
use serde_json::{Value, json};

/// Parameters for creating a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    /// Container name, unique on the endpoint.
    pub name: String,
    /// Image alias string or a full source object. Absent creates an empty
    /// container.
    pub source: Option<Value>,
    /// Must be a list; `["default"]` when absent.
    pub profiles: Option<Value>,
    /// Architecture name; `x86_64` when absent.
    pub architecture: Option<String>,
    /// Desired config as a map or a list of `{key, value}` pairs.
    pub config: Value,
    /// Desired devices keyed by device name.
    pub devices: Value,
    /// Delete the container when it stops.
    pub ephemeral: bool,
    /// Free-form description.
    pub description: Option<String>,
}

impl ContainerSpec {
    /// Container built from an image alias.
    pub fn new(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Some(Value::String(alias.into())),
            ..Self::default()
        }
    }

    fn profile_names(&self) -> Result<Vec<String>> {
        match &self.profiles {
            None | Some(Value::Null) => Ok(vec!["default".to_string()]),
            Some(Value::Array(items)) => Ok(items.iter().map(coerce_string).collect()),
            Some(_) => Err(Error::invalid("'profiles' must be formatted as a list")),
        }
    }

    fn architecture(&self) -> Result<Architecture> {
        match self.architecture.as_deref() {
            None => Ok(Architecture::default()),
            Some(name) => name.parse().map_err(|_| {
                Error::invalid(format!(
                    "unknown architecture '{name}' given for container '{}'",
                    self.name
                ))
            }),
        }
    }

    fn source(&self) -> Value {
        match &self.source {
            Some(Value::String(alias)) => json!({ "type": "image", "alias": alias }),
            None | Some(Value::Null) => json!({ "type": "none" }),
            Some(other) => other.clone(),
        }
    }

    /// Validate and build the create request body.
    pub fn to_body(&self) -> Result<Value> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid("container name must not be empty"));
        }
        let profiles = self.profile_names()?;
        let architecture = self.architecture()?;
        let config = normalize_config(&self.config)?.unwrap_or_default();
        let devices = normalize_devices(&self.devices)?.unwrap_or_default();

        Ok(json!({
            "name": self.name,
            "architecture": architecture.code(),
            "profiles": profiles,
            "source": self.source(),
            "config": config,
            "devices": devices,
            "ephemeral": self.ephemeral,
            "description": self.description.clone().unwrap_or_default(),
        }))
    }
}

/// Parameters for creating a profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSpec {
    /// Profile name.
    pub name: String,
    /// Config applied to every container using the profile.
    pub config: ConfigMap,
    /// Devices applied to every container using the profile.
    pub devices: DeviceMaps,
    /// Saved only when given.
    pub description: Option<String>,
}

impl ProfileSpec {
    /// Empty profile spec.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn to_body(&self) -> Result<Value> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid("profile name must not be empty"));
        }
        let mut body = json!({
            "name": self.name,
            "config": self.config,
            "devices": self.devices,
        });
        if let Some(description) = &self.description {
            body["description"] = Value::String(description.clone());
        }
        Ok(body)
    }
}

/// Accessor for one kind of resource on one client.
#[derive(Clone, Copy)]
pub struct Resources<'a> {
    client: &'a Client,
    kind: ResourceKind,
}

impl<'a> Resources<'a> {
    pub(crate) fn new(client: &'a Client, kind: ResourceKind) -> Self {
        Self { client, kind }
    }

    /// Kind handled by this accessor.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// List names or full resources.
    pub fn list(&self, names_only: bool) -> Result<Listing> {
        let backend = self.client.backend();
        if names_only {
            Ok(Listing::Names(backend.list_names(self.kind)?))
        } else {
            Ok(Listing::Full(backend.list(self.kind)?))
        }
    }

    /// Fetch a resource snapshot.
    pub fn get(&self, name: &str) -> Result<Resource> {
        self.client.backend().get(self.kind, name)
    }

    /// Whether a resource exists.
    pub fn exists(&self, name: &str) -> Result<bool> {
        match self.get(name) {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn require_container(&self, what: &str) -> Result<()> {
        if self.kind == ResourceKind::Container {
            Ok(())
        } else {
            Err(Error::InvalidOperation(format!(
                "{what} only applies to containers"
            )))
        }
    }

    /// Create a container. Validation happens before any remote call.
    pub fn create(&self, spec: &ContainerSpec, wait: bool) -> Result<Completion<Resource>> {
        self.require_container("create")?;
        let body = spec.to_body()?;

        log::info!("creating container '{}'", spec.name);
        match self.client.backend().create(self.kind, &body, wait)? {
            Completion::Done(()) => Ok(Completion::Done(self.get(&spec.name)?)),
            Completion::Pending(op) => Ok(Completion::Pending(op)),
        }
    }

    /// Create a profile and return it.
    pub fn create_profile(&self, spec: &ProfileSpec) -> Result<Resource> {
        if self.kind != ResourceKind::Profile {
            return Err(Error::InvalidOperation(
                "create_profile only applies to profiles".to_string(),
            ));
        }
        let body = spec.to_body()?;

        log::info!("creating profile '{}'", spec.name);
        self.client.backend().create(self.kind, &body, true)?;
        self.get(&spec.name)
    }

    /// Delete a resource and wait for completion.
    ///
    /// Idempotent: a resource that is already gone counts as deleted.
    pub fn delete(&self, name: &str) -> Result<()> {
        if !self.exists(name)? {
            log::debug!("{} '{name}' already absent", self.kind);
            return Ok(());
        }

        log::info!("deleting {} '{name}'", self.kind);
        match self.client.backend().delete(self.kind, name, true) {
            Ok(_) => Ok(()),
            Err(e) if e.is_remote_not_found() => {
                log::debug!("{} '{name}' vanished before delete", self.kind);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Rename a resource. Running containers are refused.
    pub fn rename(&self, name: &str, new_name: &str, wait: bool) -> Result<Completion<Resource>> {
        let resource = self.get(name)?;
        if resource.is_running() {
            return Err(Error::InvalidOperation(format!(
                "can't rename the running {} '{name}'",
                self.kind
            )));
        }

        log::info!("renaming {} '{name}' to '{new_name}'", self.kind);
        match self
            .client
            .backend()
            .rename(self.kind, name, new_name, wait)?
        {
            Completion::Done(()) => Ok(Completion::Done(self.get(new_name)?)),
            Completion::Pending(op) => Ok(Completion::Pending(op)),
        }
    }

    fn change_state(&self, name: &str, action: StateAction, options: StopOptions) -> Result<Resource> {
        self.require_container(action.as_str())?;
        let resource = self.get(name)?;

        if let Some(target) = action.target()
            && resource.lifecycle() == Some(target)
        {
            log::debug!("container '{name}' already {target:?}, skipping {action}");
            return Ok(resource);
        }

        log::info!("{action} container '{name}'");
        self.client
            .backend()
            .change_state(name, action, options, true)?;
        self.get(name)
    }

    /// Start a container; succeeds without a call when already running.
    pub fn start(&self, name: &str) -> Result<Resource> {
        self.change_state(name, StateAction::Start, StopOptions::default())
    }

    /// Stop a container; succeeds without a call when already stopped.
    pub fn stop(&self, name: &str, options: StopOptions) -> Result<Resource> {
        self.change_state(name, StateAction::Stop, options)
    }

    /// Restart a container. Always issued.
    pub fn restart(&self, name: &str) -> Result<Resource> {
        self.change_state(name, StateAction::Restart, StopOptions::default())
    }

    /// Freeze a container; succeeds without a call when already frozen.
    pub fn freeze(&self, name: &str) -> Result<Resource> {
        self.change_state(name, StateAction::Freeze, StopOptions::default())
    }

    /// Unfreeze a container; succeeds without a call when already running.
    pub fn unfreeze(&self, name: &str) -> Result<Resource> {
        self.change_state(name, StateAction::Unfreeze, StopOptions::default())
    }

    /// Persist a resource snapshot.
    ///
    /// Any failure is reported as a daemon rejection.
    pub fn save(&self, resource: &Resource) -> Result<()> {
        log::info!("saving {} '{}'", self.kind, resource.name);
        self.client
            .backend()
            .update(self.kind, resource)
            .map_err(|e| match e {
                Error::RemoteRejected { .. } => e,
                other => Error::rejected(other.to_string(), None),
            })
    }

    /// Read one config value.
    pub fn config_get(&self, name: &str, key: &str) -> Result<String> {
        let resource = self.get(name)?;
        match property::get(&resource, MapName::Config, key)? {
            PropertyValue::Config(value) => Ok(value),
            PropertyValue::Device(_) => Err(Error::InvalidResponse(
                "config lookup returned a device".to_string(),
            )),
        }
    }

    /// Set one config value and persist.
    pub fn config_set(&self, name: &str, key: &str, value: &Value) -> Result<Resource> {
        let mut resource = self.get(name)?;
        property::set(self, &mut resource, MapName::Config, key, value)
    }

    /// Delete one config value and persist.
    pub fn config_delete(&self, name: &str, key: &str) -> Result<()> {
        let mut resource = self.get(name)?;
        property::delete(self, &mut resource, MapName::Config, key)
    }

    /// Read one device entry.
    pub fn device_get(&self, name: &str, device: &str) -> Result<PropertyValue> {
        let resource = self.get(name)?;
        property::get(&resource, MapName::Devices, device)
    }

    /// Add a device and persist. Existing devices are refused.
    pub fn device_add(&self, name: &str, device: &str, entry: &Value) -> Result<Resource> {
        let mut resource = self.get(name)?;
        property::set(self, &mut resource, MapName::Devices, device, entry)
    }

    /// Delete a device and persist.
    pub fn device_delete(&self, name: &str, device: &str) -> Result<()> {
        let mut resource = self.get(name)?;
        property::delete(self, &mut resource, MapName::Devices, device)
    }
}

/// Move a container from one daemon to another.
///
/// The source is deleted only after the copy succeeded. There is no
/// rollback: a failure after the copy leaves both copies in place.
pub fn migrate(
    pool: &ClientPool,
    name: &str,
    source: &EndpointIdentity,
    destination: &EndpointIdentity,
    stop_and_start: bool,
) -> Result<Resource> {
    let src = pool.acquire(source)?;
    let dst = pool.acquire(destination)?;

    let resource = src.containers().get(name)?;
    let was_running = resource.lifecycle() == Some(LifecycleStatus::Running);

    if was_running && stop_and_start {
        src.containers().stop(name, StopOptions::default())?;
    }

    log::info!(
        "migrating container '{name}' from {} to {}",
        source.label(),
        destination.label()
    );
    let ticket = src.backend().migration_source(name)?;
    dst.backend()
        .create_from_migration(&resource, &ticket)
        .map_err(|e| match e {
            Error::RemoteRejected { .. } => e,
            other => Error::rejected(other.to_string(), None),
        })?;

    src.containers().delete(name)?;

    if was_running && stop_and_start {
        return dst.containers().start(name);
    }
    dst.containers().get(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, Call, MockBackend, MockOp};
    use crate::endpoint::Endpoint;
    use crate::pool::Connector;
    use std::collections::HashMap;

    fn container(name: &str, code: i64) -> Resource {
        let mut resource = Resource::new(name);
        resource.status_code = Some(code);
        resource
    }

    fn client_with(mock: &MockBackend) -> Client {
        Client::with_backend(Box::new(mock.clone()))
    }

    #[test]
    fn test_create_defaults() {
        let body = ContainerSpec::new("web", "ubuntu/22.04").to_body().unwrap();
        assert_eq!(body["profiles"], json!(["default"]));
        assert_eq!(body["architecture"], "2");
        assert_eq!(body["source"], json!({"type": "image", "alias": "ubuntu/22.04"}));
    }

    #[test]
    fn test_create_rejects_bad_profiles_before_call() {
        let mock = MockBackend::new();
        let client = client_with(&mock);
        let spec = ContainerSpec {
            profiles: Some(json!("default")),
            ..ContainerSpec::new("web", "ubuntu")
        };
        let err = client.containers().create(&spec, true).err().unwrap();
        assert!(err.is_invocation());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_create_rejects_unknown_architecture() {
        let spec = ContainerSpec {
            architecture: Some("amd64".into()),
            ..ContainerSpec::new("web", "ubuntu")
        };
        let err = spec.to_body().unwrap_err();
        assert!(err.to_string().contains("amd64"));
    }

    #[test]
    fn test_create_normalizes_config() {
        let spec = ContainerSpec {
            config: json!([{"key": "boot.autostart", "value": true}]),
            ..ContainerSpec::new("web", "ubuntu")
        };
        let body = spec.to_body().unwrap();
        assert_eq!(body["config"]["boot.autostart"], "true");
    }

    #[test]
    fn test_create_returns_resource() {
        let mock = MockBackend::new();
        let client = client_with(&mock);
        let created = client
            .containers()
            .create(&ContainerSpec::new("web", "ubuntu"), true)
            .unwrap()
            .done()
            .unwrap();
        assert_eq!(created.name, "web");
        assert_eq!(created.profiles, vec!["default"]);
    }

    #[test]
    fn test_create_profile() {
        let mock = MockBackend::new();
        let client = client_with(&mock);
        let spec = ProfileSpec {
            description: Some("autostart everything".into()),
            config: [("boot.autostart".to_string(), "1".to_string())].into(),
            ..ProfileSpec::new("autostart")
        };
        let profile = client.profiles().create_profile(&spec).unwrap();
        assert_eq!(profile.description, "autostart everything");
        assert_eq!(profile.config["boot.autostart"], "1");
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let client = client_with(&MockBackend::new());
        let err = client.profiles().get("nope").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(!client.profiles().exists("nope").unwrap());
    }

    #[test]
    fn test_list_names_and_full() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Container, container("b", 102));
        mock.insert(ResourceKind::Container, container("a", 103));
        let client = client_with(&mock);

        assert_eq!(
            client.containers().list(true).unwrap(),
            Listing::Names(vec!["a".into(), "b".into()])
        );
        assert_eq!(client.containers().list(false).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_missing_succeeds() {
        let mock = MockBackend::new();
        let client = client_with(&mock);
        client.containers().delete("ghost").unwrap();
        client.containers().delete("ghost").unwrap();
        assert_eq!(mock.count(|c| matches!(c, Call::Delete(..))), 0);
    }

    #[test]
    fn test_delete_tolerates_concurrent_removal() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Profile, Resource::new("web"));
        mock.reject_with_status(MockOp::Delete, "not found", 404);
        let client = client_with(&mock);

        client.profiles().delete("web").unwrap();
        assert_eq!(mock.count(|c| matches!(c, Call::Delete(..))), 1);
    }

    #[test]
    fn test_delete_rejection_propagates() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Profile, Resource::new("default"));
        mock.reject(MockOp::Delete, "profile is in use");
        let client = client_with(&mock);

        let err = client.profiles().delete("default").unwrap_err();
        assert!(matches!(err, Error::RemoteRejected { status: Some(400), .. }));
    }

    #[test]
    fn test_rename_running_refused_without_call() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Container, container("web", 103));
        let client = client_with(&mock);

        let err = client.containers().rename("web", "www", true).err().unwrap();
        assert!(matches!(err, Error::InvalidOperation(_)));
        assert_eq!(mock.count(|c| matches!(c, Call::Rename(..))), 0);
    }

    #[test]
    fn test_rename_stopped() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Container, container("web", 102));
        let client = client_with(&mock);

        let renamed = client
            .containers()
            .rename("web", "www", true)
            .unwrap()
            .done()
            .unwrap();
        assert_eq!(renamed.name, "www");
    }

    #[test]
    fn test_start_when_running_is_noop() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Container, container("web", 103));
        let client = client_with(&mock);

        let web = client.containers().start("web").unwrap();
        assert!(web.is_running());
        assert_eq!(mock.count(|c| matches!(c, Call::ChangeState(..))), 0);
    }

    #[test]
    fn test_stop_and_freeze() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Container, container("web", 103));
        let client = client_with(&mock);

        let frozen = client.containers().freeze("web").unwrap();
        assert_eq!(frozen.lifecycle(), Some(LifecycleStatus::Frozen));
        let stopped = client
            .containers()
            .stop("web", StopOptions::forced())
            .unwrap();
        assert_eq!(stopped.lifecycle(), Some(LifecycleStatus::Stopped));
    }

    #[test]
    fn test_restart_always_issued() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Container, container("web", 103));
        let client = client_with(&mock);

        client.containers().restart("web").unwrap();
        assert_eq!(
            mock.count(|c| *c == Call::ChangeState("web".into(), StateAction::Restart)),
            1
        );
    }

    #[test]
    fn test_lifecycle_on_profile_refused() {
        let client = client_with(&MockBackend::new());
        let err = client.profiles().start("default").unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_save_failure_is_rejection() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Profile, Resource::new("default"));
        mock.reject(MockOp::Update, "Invalid devices");
        let client = client_with(&mock);

        let err = client
            .profiles()
            .save(&Resource::new("default"))
            .unwrap_err();
        assert!(matches!(err, Error::RemoteRejected { .. }));
        assert_eq!(err.to_string(), "Invalid devices");
    }

    #[test]
    fn test_config_roundtrip() {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Container, container("web", 102));
        let client = client_with(&mock);

        client
            .containers()
            .config_set("web", "limits.cpu", &json!(2))
            .unwrap();
        assert_eq!(client.containers().config_get("web", "limits.cpu").unwrap(), "2");
        client.containers().config_delete("web", "limits.cpu").unwrap();
        assert!(client.containers().config_get("web", "limits.cpu").is_err());
    }

    /// Serves a fixed backend per address.
    struct FixedConnector(HashMap<String, MockBackend>);

    impl Connector for FixedConnector {
        fn connect(
            &self,
            identity: &EndpointIdentity,
            _endpoint: &Endpoint,
        ) -> Result<Box<dyn Backend>> {
            self.0
                .get(identity.label())
                .map(|m| Box::new(m.clone()) as Box<dyn Backend>)
                .ok_or_else(|| Error::ConnectionFailed {
                    endpoint: identity.label().to_string(),
                    message: "unknown".into(),
                })
        }
    }

    fn two_daemons() -> (ClientPool, MockBackend, MockBackend, EndpointIdentity, EndpointIdentity) {
        let src = MockBackend::new().with_url("https://src:8443");
        let dst = MockBackend::new().with_url("https://dst:8443");
        let src_id = EndpointIdentity::socket("/run/src.socket");
        let dst_id = EndpointIdentity::socket("/run/dst.socket");
        let pool = ClientPool::with_connector(Box::new(FixedConnector(HashMap::from([
            (src_id.label().to_string(), src.clone()),
            (dst_id.label().to_string(), dst.clone()),
        ]))));
        (pool, src, dst, src_id, dst_id)
    }

    #[test]
    fn test_migrate_stop_and_start() {
        let (pool, src, dst, src_id, dst_id) = two_daemons();
        src.insert(ResourceKind::Container, container("web", 103));

        let moved = migrate(&pool, "web", &src_id, &dst_id, true).unwrap();
        assert!(moved.is_running());
        assert!(src.resource(ResourceKind::Container, "web").is_none());
        assert_eq!(
            src.count(|c| *c == Call::ChangeState("web".into(), StateAction::Stop)),
            1
        );
        assert!(dst.resource(ResourceKind::Container, "web").is_some());
    }

    #[test]
    fn test_migrate_failure_keeps_source() {
        let (pool, src, dst, src_id, dst_id) = two_daemons();
        src.insert(ResourceKind::Container, container("web", 102));
        dst.reject(MockOp::Migrate, "Error transferring container data");

        let err = migrate(&pool, "web", &src_id, &dst_id, true).unwrap_err();
        assert!(matches!(err, Error::RemoteRejected { .. }));
        assert!(src.resource(ResourceKind::Container, "web").is_some());
        assert_eq!(src.count(|c| matches!(c, Call::Delete(..))), 0);
    }
}
