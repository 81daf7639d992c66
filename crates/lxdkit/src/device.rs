//! Typed device entries.
//!
//! Devices travel as flat string maps with a `type` discriminator. Parsing
//! into [`Device`] checks the fields each known kind requires; unknown kinds
//! are kept opaque and only need `type`.

use crate::error::{Error, Result};
use crate::types::DeviceMap;

/// Prefix of caller-internal keys that never reach the daemon.
pub const INTERNAL_KEY_PREFIX: &str = "__";

/// A device attached to a container or profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
    /// Host path or storage volume mounted into the instance.
    Disk {
        /// Host path or volume.
        source: String,
        /// Mount point inside the instance.
        path: String,
        /// Remaining keys.
        options: DeviceMap,
    },
    /// Network interface.
    Nic {
        /// Keys besides `type`.
        options: DeviceMap,
    },
    /// Any other device kind.
    Other {
        /// Value of `type`.
        kind: String,
        /// Keys besides `type`.
        options: DeviceMap,
    },
}

impl Device {
    /// Fields a device kind cannot do without, besides `type`.
    #[must_use]
    pub fn required_fields(kind: &str) -> &'static [&'static str] {
        match kind {
            "disk" => &["source", "path"],
            _ => &[],
        }
    }

    /// Validate and parse a raw device map.
    pub fn from_map(map: &DeviceMap) -> Result<Self> {
        let kind = map
            .get("type")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::invalid("type must be given as parameter"))?;

        for field in Self::required_fields(kind) {
            if !map.contains_key(*field) {
                return Err(Error::invalid(format!("{field} must be given as parameter")));
            }
        }

        let mut options = map.clone();
        options.remove("type");

        Ok(match kind.as_str() {
            "disk" => {
                let source = options.remove("source").unwrap_or_default();
                let path = options.remove("path").unwrap_or_default();
                Self::Disk {
                    source,
                    path,
                    options,
                }
            }
            "nic" => Self::Nic { options },
            other => Self::Other {
                kind: other.to_string(),
                options,
            },
        })
    }

    /// Device kind as sent on the wire.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Disk { .. } => "disk",
            Self::Nic { .. } => "nic",
            Self::Other { kind, .. } => kind,
        }
    }

    /// Flatten back into a raw device map.
    #[must_use]
    pub fn into_map(self) -> DeviceMap {
        let kind = self.kind().to_string();
        let mut map = match self {
            Self::Disk {
                source,
                path,
                mut options,
            } => {
                options.insert("source".into(), source);
                options.insert("path".into(), path);
                options
            }
            Self::Nic { options } | Self::Other { options, .. } => options,
        };
        map.insert("type".into(), kind);
        map
    }
}

/// Drop caller-internal keys from a device map.
pub fn strip_internal_keys(map: &mut DeviceMap) {
    map.retain(|key, _| !key.starts_with(INTERNAL_KEY_PREFIX));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(pairs: &[(&str, &str)]) -> DeviceMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_disk_requires_source() {
        let err = Device::from_map(&device(&[("type", "disk")])).unwrap_err();
        assert!(err.is_invocation());
        assert!(err.to_string().contains("source"));
    }

    #[test]
    fn test_disk_requires_path() {
        let err = Device::from_map(&device(&[("type", "disk"), ("source", "/srv")])).unwrap_err();
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn test_missing_type() {
        let err = Device::from_map(&device(&[("path", "/mnt")])).unwrap_err();
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn test_disk_roundtrip_keeps_options() {
        let raw = device(&[
            ("type", "disk"),
            ("source", "/home/shared"),
            ("path", "/home/shared"),
            ("readonly", "true"),
        ]);
        let parsed = Device::from_map(&raw).unwrap();
        assert!(matches!(parsed, Device::Disk { ref source, .. } if source == "/home/shared"));
        assert_eq!(parsed.into_map(), raw);
    }

    #[test]
    fn test_nic_and_unknown_kinds() {
        let nic = Device::from_map(&device(&[("type", "nic"), ("nictype", "bridged")])).unwrap();
        assert_eq!(nic.kind(), "nic");

        let gpu = Device::from_map(&device(&[("type", "gpu")])).unwrap();
        assert_eq!(gpu.kind(), "gpu");
        assert_eq!(gpu.into_map(), device(&[("type", "gpu")]));
    }

    #[test]
    fn test_strip_internal_keys() {
        let mut raw = device(&[("type", "nic"), ("__pub_fun", "x"), ("parent", "br0")]);
        strip_internal_keys(&mut raw);
        assert_eq!(raw, device(&[("type", "nic"), ("parent", "br0")]));
    }
}
