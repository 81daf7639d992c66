//! Reconciliation of a resource's config and devices against a desired state.
//!
//! The diffing and apply logic lives in the `declarative` crate; this module
//! supplies the managed-key policies and the change messages, and groups the
//! results under `config` and `devices`.

use crate::types::{
    ConfigMap, DeviceMap, DeviceMaps, MANAGED_CONFIG_PREFIX, MANAGED_ROOT_DEVICE, Resource,
};
use declarative::{
    ApplyContext, ChangeKind, ChangeReport, Describe, KeyPrefix, ManagedKeys, MapDiff,
    ReservedNames, reconcile_map,
};

/// Report group for config changes.
pub const CONFIG_GROUP: &str = "config";

/// Report group for device changes.
pub const DEVICES_GROUP: &str = "devices";

struct ConfigMessages;

impl Describe<String> for ConfigMessages {
    fn describe(&self, diff: &MapDiff<String>, dry_run: bool) -> String {
        let key = &diff.key;
        let current = diff.current.as_deref().unwrap_or_default();
        let desired = diff.desired.as_deref().unwrap_or_default();
        match (diff.kind, dry_run) {
            (ChangeKind::Removed, false) => {
                format!("Removed config key \"{key}\", its value was \"{current}\"")
            }
            (ChangeKind::Removed, true) => {
                format!("Would remove config key \"{key}\" with value \"{current}\"")
            }
            (ChangeKind::Changed, false) => format!(
                "Changed config key \"{key}\" to \"{desired}\", its value was \"{current}\""
            ),
            (ChangeKind::Changed, true) => format!(
                "Would change config key \"{key}\" to \"{desired}\", its current value is \"{current}\""
            ),
            (ChangeKind::Added, false) => format!("Added config key \"{key}\" = \"{desired}\""),
            (ChangeKind::Added, true) => {
                format!("Would add config key \"{key}\" = \"{desired}\"")
            }
        }
    }
}

struct DeviceMessages;

impl Describe<DeviceMap> for DeviceMessages {
    fn describe(&self, diff: &MapDiff<DeviceMap>, dry_run: bool) -> String {
        let verb = match (diff.kind, dry_run) {
            (ChangeKind::Removed, false) => "Removed",
            (ChangeKind::Removed, true) => "Would remove",
            (ChangeKind::Changed, false) => "Changed",
            (ChangeKind::Changed, true) => "Would change",
            (ChangeKind::Added, false) => "Added",
            (ChangeKind::Added, true) => "Would add",
        };
        format!("{verb} device \"{}\"", diff.key)
    }
}

/// Reconciles resources, leaving daemon-managed entries alone.
pub struct Reconciler {
    managed_config: Box<dyn ManagedKeys>,
    managed_devices: Box<dyn ManagedKeys>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    /// Reconciler with the daemon's own reserved entries: config keys under
    /// `volatile.` and the `root` device.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policies(
            KeyPrefix::new(MANAGED_CONFIG_PREFIX),
            ReservedNames::new([MANAGED_ROOT_DEVICE]),
        )
    }

    /// Reconciler with custom managed-key policies.
    pub fn with_policies(
        config: impl ManagedKeys + 'static,
        devices: impl ManagedKeys + 'static,
    ) -> Self {
        Self {
            managed_config: Box::new(config),
            managed_devices: Box::new(devices),
        }
    }

    /// Whether a config key belongs to the daemon.
    #[must_use]
    pub fn is_managed_key(&self, key: &str) -> bool {
        self.managed_config.is_managed(key)
    }

    /// Whether a device belongs to the daemon.
    #[must_use]
    pub fn is_managed_device(&self, name: &str) -> bool {
        self.managed_devices.is_managed(name)
    }

    /// Bring `resource` in line with the desired maps.
    ///
    /// Absent desired maps count as empty. Outside of a dry run the
    /// in-memory resource is mutated; saving it is up to the caller.
    pub fn reconcile(
        &self,
        resource: &mut Resource,
        desired_config: Option<&ConfigMap>,
        desired_devices: Option<&DeviceMaps>,
        dry_run: bool,
    ) -> ChangeReport {
        let ctx = ApplyContext::new(dry_run);
        let empty_config = ConfigMap::new();
        let empty_devices = DeviceMaps::new();

        let mut report = ChangeReport::new();
        report.insert(
            CONFIG_GROUP,
            reconcile_map(
                &mut resource.config,
                desired_config.unwrap_or(&empty_config),
                self.managed_config.as_ref(),
                &ctx,
                &ConfigMessages,
            ),
        );
        report.insert(
            DEVICES_GROUP,
            reconcile_map(
                &mut resource.devices,
                desired_devices.unwrap_or(&empty_devices),
                self.managed_devices.as_ref(),
                &ctx,
                &DeviceMessages,
            ),
        );

        if !dry_run && !report.is_empty() {
            log::info!(
                "reconciled '{}': {} change(s)",
                resource.name,
                report.summary().total()
            );
        }
        report
    }
}

/// Reconcile with the default policies.
pub fn reconcile(
    resource: &mut Resource,
    desired_config: Option<&ConfigMap>,
    desired_devices: Option<&DeviceMaps>,
    dry_run: bool,
) -> ChangeReport {
    Reconciler::new().reconcile(resource, desired_config, desired_devices, dry_run)
}
