//! Normalization of loosely-shaped config and device input.
//!
//! Declarative callers write config either as a map or as a list of
//! `{key, value}` pairs, and scalars of any type. Everything is turned into
//! string maps before it reaches the daemon or the reconciler.

use crate::error::{Error, Result};
use crate::types::{ConfigMap, DeviceMap, DeviceMaps};
use serde_json::Value;

/// Normalized desired state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedInput {
    /// `None` when config was not given at all.
    pub config: Option<ConfigMap>,
    /// `None` when devices were not given at all.
    pub devices: Option<DeviceMaps>,
    /// Empty when not given.
    pub description: String,
}

/// Render a scalar as the daemon expects it.
///
/// Strings are kept verbatim, null becomes empty, anything else uses its
/// JSON rendering (`true`, `2`, `1.5`).
#[must_use]
pub fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Normalize config input.
///
/// A list of `{key, value}` pairs becomes a map. A list of anything else
/// becomes an empty map.
pub fn normalize_config(value: &Value) -> Result<Option<ConfigMap>> {
    match value {
        Value::Null => Ok(None),
        Value::String(_) => Err(Error::invalid(
            "config can't be a string, validate your input",
        )),
        Value::Object(map) => Ok(Some(
            map.iter()
                .map(|(k, v)| (k.clone(), coerce_string(v)))
                .collect(),
        )),
        Value::Array(items) => Ok(Some(pairs_to_map(items))),
        _ => Err(Error::invalid(
            "config must be a map or a list of key/value pairs",
        )),
    }
}

fn pairs_to_map(items: &[Value]) -> ConfigMap {
    let is_pair = |item: &Value| item.get("key").is_some() && item.get("value").is_some();

    if !items.first().is_some_and(is_pair) {
        if !items.is_empty() {
            log::warn!("ignoring config list without key/value pairs");
        }
        return ConfigMap::new();
    }

    items
        .iter()
        .filter_map(|item| {
            if !is_pair(item) {
                log::warn!("ignoring config entry without key/value: {item}");
                return None;
            }
            let key = coerce_string(&item["key"]);
            Some((key, coerce_string(&item["value"])))
        })
        .collect()
}

/// Normalize device input: a map of device name to entry map.
pub fn normalize_devices(value: &Value) -> Result<Option<DeviceMaps>> {
    match value {
        Value::Null => Ok(None),
        Value::String(_) => Err(Error::invalid(
            "devices can't be a string, validate your input",
        )),
        Value::Object(map) => {
            let mut devices = DeviceMaps::new();
            for (name, entry) in map {
                devices.insert(name.clone(), normalize_device(name, entry)?);
            }
            Ok(Some(devices))
        }
        _ => Err(Error::invalid("devices must be a map of device entries")),
    }
}

/// Normalize one device entry.
pub fn normalize_device(name: &str, entry: &Value) -> Result<DeviceMap> {
    let Value::Object(fields) = entry else {
        return Err(Error::invalid(format!(
            "device '{name}' must be a map of settings"
        )));
    };
    Ok(fields
        .iter()
        .map(|(k, v)| (k.clone(), coerce_string(v)))
        .collect())
}

/// Normalize a full desired state. A missing description becomes empty.
pub fn normalize_input(
    config: &Value,
    devices: &Value,
    description: Option<&str>,
) -> Result<NormalizedInput> {
    Ok(NormalizedInput {
        config: normalize_config(config)?,
        devices: normalize_devices(devices)?,
        description: description.unwrap_or_default().to_string(),
    })
}
