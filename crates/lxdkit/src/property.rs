//! Single-entry edits of a resource's config or device map.
//!
//! Each mutation validates first, then persists with exactly one save.

use crate::accessor::Resources;
use crate::device::{Device, strip_internal_keys};
use crate::error::{Error, Result};
use crate::normalize::{coerce_string, normalize_device};
use crate::types::{DeviceMap, Resource};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Which map of a resource to edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapName {
    /// The flat config map.
    Config,
    /// The named device map.
    Devices,
}

impl MapName {
    /// Field name in the resource body.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Devices => "devices",
        }
    }
}

impl fmt::Display for MapName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MapName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "config" => Ok(Self::Config),
            "devices" => Ok(Self::Devices),
            other => Err(Error::invalid(format!(
                "unknown property map '{other}', expected config or devices"
            ))),
        }
    }
}

/// A value read from one of the maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// A config value.
    Config(String),
    /// A whole device entry.
    Device(DeviceMap),
}

fn missing(map: MapName, key: &str) -> Error {
    match map {
        MapName::Config => Error::not_found(format!("config key '{key}'")),
        MapName::Devices => Error::not_found(format!("device '{key}'")),
    }
}

/// Read one entry.
pub fn get(resource: &Resource, map: MapName, key: &str) -> Result<PropertyValue> {
    let value = match map {
        MapName::Config => resource
            .config
            .get(key)
            .cloned()
            .map(PropertyValue::Config),
        MapName::Devices => resource
            .devices
            .get(key)
            .cloned()
            .map(PropertyValue::Device),
    };
    value.ok_or_else(|| missing(map, key))
}

/// Set one entry and save the resource.
///
/// Devices must carry a valid `type` (and `source`/`path` for disks) and
/// must not exist yet. Keys starting with `__` are dropped. Config values
/// are coerced to strings.
pub fn set(
    resources: &Resources<'_>,
    resource: &mut Resource,
    map: MapName,
    key: &str,
    value: &Value,
) -> Result<Resource> {
    match map {
        MapName::Config => {
            resource.config.insert(key.to_string(), coerce_string(value));
        }
        MapName::Devices => {
            let mut entry = normalize_device(key, value)?;
            strip_internal_keys(&mut entry);
            let device = Device::from_map(&entry)?;
            if resource.devices.contains_key(key) {
                return Err(Error::AlreadyExists {
                    what: format!("device '{key}'"),
                });
            }
            resource.devices.insert(key.to_string(), device.into_map());
        }
    }

    resources.save(resource)?;
    Ok(resource.clone())
}

/// Remove one entry and save the resource.
pub fn delete(
    resources: &Resources<'_>,
    resource: &mut Resource,
    map: MapName,
    key: &str,
) -> Result<()> {
    let removed = match map {
        MapName::Config => resource.config.remove(key).is_some(),
        MapName::Devices => resource.devices.remove(key).is_some(),
    };
    if !removed {
        return Err(missing(map, key));
    }
    resources.save(resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Call, MockBackend, MockOp};
    use crate::pool::Client;
    use crate::types::ResourceKind;
    use serde_json::json;

    fn setup() -> (MockBackend, Client) {
        let mock = MockBackend::new();
        mock.insert(ResourceKind::Container, Resource::new("web"));
        let client = Client::with_backend(Box::new(mock.clone()));
        (mock, client)
    }

    fn saves(mock: &MockBackend) -> usize {
        mock.count(|c| matches!(c, Call::Update(..)))
    }

    #[test]
    fn test_disk_without_source_rejected_before_save() {
        let (mock, client) = setup();
        let containers = client.containers();
        let mut web = containers.get("web").unwrap();

        let err = set(
            &containers,
            &mut web,
            MapName::Devices,
            "disk0",
            &json!({"type": "disk"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref m) if m.contains("source")));
        assert_eq!(saves(&mock), 0);
    }

    #[test]
    fn test_device_without_type_rejected() {
        let (mock, client) = setup();
        let containers = client.containers();
        let mut web = containers.get("web").unwrap();

        let err = set(
            &containers,
            &mut web,
            MapName::Devices,
            "eth0",
            &json!({"nictype": "bridged"}),
        )
        .unwrap_err();
        assert!(err.is_invocation());
        assert_eq!(saves(&mock), 0);
    }

    #[test]
    fn test_existing_device_refused() {
        let (mock, client) = setup();
        let containers = client.containers();
        let mut web = containers.get("web").unwrap();
        web.devices
            .insert("eth0".into(), [("type".to_string(), "nic".to_string())].into());

        let err = set(
            &containers,
            &mut web,
            MapName::Devices,
            "eth0",
            &json!({"type": "nic"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert_eq!(saves(&mock), 0);
    }

    #[test]
    fn test_add_device_strips_internal_keys() {
        let (mock, client) = setup();
        let containers = client.containers();
        let mut web = containers.get("web").unwrap();

        let updated = set(
            &containers,
            &mut web,
            MapName::Devices,
            "shared",
            &json!({
                "type": "disk",
                "source": "/srv/shared",
                "path": "/shared",
                "__pub_fun": "lxd.container_device_add",
            }),
        )
        .unwrap();

        let shared = &updated.devices["shared"];
        let expected: DeviceMap = [("type", "disk"), ("source", "/srv/shared"), ("path", "/shared")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(*shared, expected);
        assert_eq!(saves(&mock), 1);
        assert_eq!(
            mock.resource(ResourceKind::Container, "web").unwrap().devices["shared"],
            *shared
        );
    }

    #[test]
    fn test_config_value_coerced() {
        let (_mock, client) = setup();
        let containers = client.containers();
        let mut web = containers.get("web").unwrap();

        let updated = set(
            &containers,
            &mut web,
            MapName::Config,
            "boot.autostart",
            &json!(true),
        )
        .unwrap();
        assert_eq!(updated.config["boot.autostart"], "true");
    }

    #[test]
    fn test_get_and_delete_missing() {
        let (mock, client) = setup();
        let containers = client.containers();
        let mut web = containers.get("web").unwrap();

        assert!(matches!(
            get(&web, MapName::Config, "nope"),
            Err(Error::NotFound { .. })
        ));
        let err = delete(&containers, &mut web, MapName::Devices, "nope").unwrap_err();
        assert_eq!(err.to_string(), "device 'nope' not found");
        assert_eq!(saves(&mock), 0);
    }

    #[test]
    fn test_save_failure_surfaces() {
        let (mock, client) = setup();
        mock.reject(MockOp::Update, "Invalid config key");
        let containers = client.containers();
        let mut web = containers.get("web").unwrap();

        let err = set(&containers, &mut web, MapName::Config, "bogus", &json!("x")).unwrap_err();
        assert!(matches!(err, Error::RemoteRejected { .. }));
    }

    #[test]
    fn test_map_name_parse() {
        assert_eq!("devices".parse::<MapName>().unwrap(), MapName::Devices);
        assert!("profiles".parse::<MapName>().is_err());
    }
}
