//! Core types for LXD resources.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Flat string-to-string settings of a resource.
pub type ConfigMap = BTreeMap<String, String>;

/// Raw entries of one device.
pub type DeviceMap = BTreeMap<String, String>;

/// All devices of a resource, by device name.
pub type DeviceMaps = BTreeMap<String, DeviceMap>;

/// Config key prefix owned by the daemon.
pub const MANAGED_CONFIG_PREFIX: &str = "volatile.";

/// Device name owned by the daemon.
pub const MANAGED_ROOT_DEVICE: &str = "root";

/// Kind of resource managed by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A container instance.
    Container,
    /// A reusable profile.
    Profile,
}

impl ResourceKind {
    /// REST collection path.
    #[must_use]
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Container => "/1.0/containers",
            Self::Profile => "/1.0/profiles",
        }
    }

    /// REST path of a named resource.
    #[must_use]
    pub fn path(&self, name: &str) -> String {
        format!("{}/{}", self.collection(), name)
    }

    /// Lowercase name for messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Profile => "profile",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// CPU architectures known to the daemon.
///
/// Keep in sync with the daemon's own architecture table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// Code 0.
    Unknown,
    /// Code 1.
    I686,
    /// Code 2.
    X86_64,
    /// Code 3.
    Armv7l,
    /// Code 4.
    Aarch64,
    /// Code 5.
    Ppc,
    /// Code 6.
    Ppc64,
    /// Code 7.
    Ppc64le,
    /// Code 8.
    S390x,
}

impl Architecture {
    /// All known architectures.
    #[must_use]
    pub fn all() -> &'static [Architecture] {
        &[
            Self::Unknown,
            Self::I686,
            Self::X86_64,
            Self::Armv7l,
            Self::Aarch64,
            Self::Ppc,
            Self::Ppc64,
            Self::Ppc64le,
            Self::S390x,
        ]
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::I686 => "i686",
            Self::X86_64 => "x86_64",
            Self::Armv7l => "armv7l",
            Self::Aarch64 => "aarch64",
            Self::Ppc => "ppc",
            Self::Ppc64 => "ppc64",
            Self::Ppc64le => "ppc64le",
            Self::S390x => "s390x",
        }
    }

    /// Daemon-internal code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unknown => "0",
            Self::I686 => "1",
            Self::X86_64 => "2",
            Self::Armv7l => "3",
            Self::Aarch64 => "4",
            Self::Ppc => "5",
            Self::Ppc64 => "6",
            Self::Ppc64le => "7",
            Self::S390x => "8",
        }
    }
}

impl Default for Architecture {
    fn default() -> Self {
        Self::X86_64
    }
}

impl FromStr for Architecture {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|a| a.name() == s)
            .ok_or_else(|| Error::invalid(format!("unknown architecture '{s}'")))
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lifecycle status of a container, from its status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStatus {
    /// Code 102.
    Stopped,
    /// Code 103.
    Running,
    /// Code 110.
    Frozen,
    /// Any code without lifecycle meaning here (transitions, errors).
    Other(i64),
}

impl LifecycleStatus {
    /// Daemon code for a stopped container.
    pub const STOPPED_CODE: i64 = 102;
    /// Daemon code for a running container.
    pub const RUNNING_CODE: i64 = 103;
    /// Daemon code for a frozen container.
    pub const FROZEN_CODE: i64 = 110;

    /// Classify a status code.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            Self::STOPPED_CODE => Self::Stopped,
            Self::RUNNING_CODE => Self::Running,
            Self::FROZEN_CODE => Self::Frozen,
            other => Self::Other(other),
        }
    }
}

/// State change requested from the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    /// Boot a stopped container.
    Start,
    /// Shut down, optionally forced.
    Stop,
    /// Stop then start.
    Restart,
    /// Suspend all processes.
    Freeze,
    /// Resume a frozen container.
    Unfreeze,
}

impl StateAction {
    /// Action name on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Freeze => "freeze",
            Self::Unfreeze => "unfreeze",
        }
    }

    /// Status that makes the action a no-op, if any.
    #[must_use]
    pub fn target(&self) -> Option<LifecycleStatus> {
        match self {
            Self::Start | Self::Unfreeze => Some(LifecycleStatus::Running),
            Self::Stop => Some(LifecycleStatus::Stopped),
            Self::Freeze => Some(LifecycleStatus::Frozen),
            Self::Restart => None,
        }
    }
}

impl fmt::Display for StateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Options forwarded with a stop action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOptions {
    /// Seconds the daemon waits for a clean shutdown (-1 means its default).
    pub timeout: i64,
    /// Kill instead of a clean shutdown.
    pub force: bool,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            timeout: 30,
            force: false,
        }
    }
}

impl StopOptions {
    /// Forced stop.
    #[must_use]
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

/// A container or profile as reported by the daemon.
///
/// This is a disconnected snapshot: mutating it changes nothing remotely
/// until it is saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique per endpoint within its kind.
    pub name: String,
    /// Flat config map.
    #[serde(default)]
    pub config: ConfigMap,
    /// Devices keyed by name.
    #[serde(default)]
    pub devices: DeviceMaps,
    /// Human-readable status, containers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Lifecycle code, containers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i64>,
    /// Deleted by the daemon when stopped.
    #[serde(default)]
    pub ephemeral: bool,
    /// Architecture name or code, as the daemon reports it.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub architecture: Option<String>,
    /// Applied profiles in order, containers only.
    #[serde(default)]
    pub profiles: Vec<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

impl Resource {
    /// Create an empty resource snapshot.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Lifecycle status derived from the status code.
    #[must_use]
    pub fn lifecycle(&self) -> Option<LifecycleStatus> {
        self.status_code.map(LifecycleStatus::from_code)
    }

    /// Whether the container is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle() == Some(LifecycleStatus::Running)
    }

    /// Body sent when saving the resource.
    #[must_use]
    pub fn save_body(&self, kind: ResourceKind) -> Value {
        match kind {
            ResourceKind::Container => json!({
                "architecture": self.architecture,
                "config": self.config,
                "devices": self.devices,
                "ephemeral": self.ephemeral,
                "profiles": self.profiles,
                "description": self.description,
            }),
            ResourceKind::Profile => json!({
                "config": self.config,
                "devices": self.devices,
                "description": self.description,
            }),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// A background operation on the daemon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation UUID.
    pub id: String,
    /// `task`, `websocket` or `token`.
    #[serde(default)]
    pub class: String,
    /// Human-readable status.
    #[serde(default)]
    pub status: String,
    /// Status code; 200 is success.
    #[serde(default)]
    pub status_code: i64,
    /// Failure message, empty on success.
    #[serde(default)]
    pub err: String,
    /// Operation-specific payload.
    #[serde(default)]
    pub metadata: Value,
}

impl Operation {
    /// Operation status code for success.
    pub const SUCCESS: i64 = 200;

    /// REST path of the operation.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/1.0/operations/{}", self.id)
    }

    /// Turn a finished operation into a result.
    pub fn into_result(self) -> Result<Self> {
        if self.status_code != 0 && self.status_code != Self::SUCCESS {
            let message = if self.err.is_empty() {
                format!("operation {} ended with status '{}'", self.id, self.status)
            } else {
                self.err.clone()
            };
            return Err(Error::rejected(message, None));
        }
        Ok(self)
    }
}

/// Outcome of a request that may run in the background.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion<T> {
    /// The request finished.
    Done(T),
    /// The request is still running on the daemon.
    Pending(Operation),
}

impl<T> Completion<T> {
    /// The finished value, if any.
    pub fn done(self) -> Option<T> {
        match self {
            Self::Done(value) => Some(value),
            Self::Pending(_) => None,
        }
    }
}

/// Server information from `/1.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// `trusted` or `untrusted`.
    #[serde(default)]
    pub auth: String,
    /// API version, e.g. `1.0`.
    #[serde(default)]
    pub api_version: String,
    /// Server environment, including its certificate.
    #[serde(default)]
    pub environment: Value,
}

impl ServerInfo {
    /// Whether the client certificate is trusted.
    #[must_use]
    pub fn trusted(&self) -> bool {
        self.auth == "trusted"
    }

    /// Server certificate (PEM), when exposed.
    #[must_use]
    pub fn certificate(&self) -> Option<&str> {
        self.environment.get("certificate").and_then(Value::as_str)
    }
}

/// What a destination daemon needs to pull a resource from a source daemon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationTicket {
    /// Absolute URL of the source migration operation.
    pub operation_url: String,
    /// Source server certificate (PEM).
    pub certificate: String,
    /// Websocket secrets keyed by channel name.
    pub secrets: BTreeMap<String, String>,
}

/// Listing result.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    /// Names only.
    Names(Vec<String>),
    /// Full snapshots.
    Full(Vec<Resource>),
}

impl Listing {
    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Names(names) => names.len(),
            Self::Full(resources) => resources.len(),
        }
    }

    /// Whether nothing was listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_architecture_table() {
        assert_eq!("x86_64".parse::<Architecture>().unwrap().code(), "2");
        assert_eq!("s390x".parse::<Architecture>().unwrap().code(), "8");
        assert_eq!(Architecture::default(), Architecture::X86_64);
        assert_eq!(Architecture::all().len(), 9);
    }

    #[test]
    fn test_unknown_architecture_names_value() {
        let err = "amd64".parse::<Architecture>().unwrap_err();
        assert!(err.is_invocation());
        assert!(err.to_string().contains("amd64"));
    }

    #[test]
    fn test_lifecycle_codes() {
        assert_eq!(LifecycleStatus::from_code(103), LifecycleStatus::Running);
        assert_eq!(LifecycleStatus::from_code(102), LifecycleStatus::Stopped);
        assert_eq!(LifecycleStatus::from_code(110), LifecycleStatus::Frozen);
        assert_eq!(LifecycleStatus::from_code(106), LifecycleStatus::Other(106));
    }

    #[test]
    fn test_action_targets() {
        assert_eq!(StateAction::Start.target(), Some(LifecycleStatus::Running));
        assert_eq!(StateAction::Unfreeze.target(), Some(LifecycleStatus::Running));
        assert_eq!(StateAction::Stop.target(), Some(LifecycleStatus::Stopped));
        assert_eq!(StateAction::Freeze.target(), Some(LifecycleStatus::Frozen));
        assert_eq!(StateAction::Restart.target(), None);
    }

    #[test]
    fn test_resource_deserialize_daemon_shape() {
        let json = r#"{
            "name": "web",
            "architecture": "x86_64",
            "config": {"limits.cpu": "2", "volatile.base_image": "abc"},
            "devices": {"root": {"type": "disk", "path": "/", "pool": "default"}},
            "ephemeral": false,
            "profiles": ["default"],
            "status": "Running",
            "status_code": 103,
            "stateful": false
        }"#;
        let resource: Resource = serde_json::from_str(json).unwrap();
        assert_eq!(resource.name, "web");
        assert!(resource.is_running());
        assert_eq!(resource.devices["root"]["path"], "/");
        assert_eq!(resource.architecture.as_deref(), Some("x86_64"));
    }

    #[test]
    fn test_resource_numeric_architecture() {
        let resource: Resource = serde_json::from_str(r#"{"name":"a","architecture":2}"#).unwrap();
        assert_eq!(resource.architecture.as_deref(), Some("2"));
    }

    #[test]
    fn test_profile_save_body_omits_container_fields() {
        let mut profile = Resource::new("autostart");
        profile.config.insert("boot.autostart".into(), "1".into());
        let body = profile.save_body(ResourceKind::Profile);
        assert_eq!(body["config"]["boot.autostart"], "1");
        assert!(body.get("profiles").is_none());
        assert!(body.get("ephemeral").is_none());
    }

    #[test]
    fn test_operation_into_result() {
        let ok = Operation {
            id: "1".into(),
            status_code: 200,
            ..Default::default()
        };
        assert!(ok.into_result().is_ok());

        let failed = Operation {
            id: "2".into(),
            status_code: 400,
            err: "Failed to start".into(),
            ..Default::default()
        };
        let err = failed.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Failed to start");
    }

    #[test]
    fn test_server_info_trusted() {
        let info: ServerInfo = serde_json::from_str(
            r#"{"auth":"trusted","environment":{"certificate":"PEM"}}"#,
        )
        .unwrap();
        assert!(info.trusted());
        assert_eq!(info.certificate(), Some("PEM"));
    }

    #[test]
    fn test_kind_paths() {
        assert_eq!(ResourceKind::Container.path("web"), "/1.0/containers/web");
        assert_eq!(ResourceKind::Profile.collection(), "/1.0/profiles");
    }
}
