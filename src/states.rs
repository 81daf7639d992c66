//! Idempotent states for containers and profiles.
//!
//! Each state compares the daemon against what is asked for, acts only on
//! differences, and reports what it did (or would do, in a dry run) as a
//! [`StateResult`]. Running a state twice in a row reports no changes the
//! second time.

use declarative::{Change, ChangeKind, ChangeReport};
use lxdkit::{
    Client, ClientPool, ContainerSpec, EndpointIdentity, Error, LifecycleStatus, ProfileSpec,
    Reconciler, Resource, Result, StopOptions, migrate, normalize_config, normalize_devices,
};
use serde::Serialize;
use serde_json::Value;

/// Outcome of one state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateResult {
    pub name: String,
    /// `Some(true)` converged, `Some(false)` refused, `None` changes pending
    /// in a dry run.
    pub result: Option<bool>,
    pub comment: String,
    pub changes: ChangeReport,
}

impl StateResult {
    fn new(name: &str, result: Option<bool>, comment: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            result,
            comment: comment.into(),
            changes: ChangeReport::new(),
        }
    }

    fn ok(name: &str, comment: impl Into<String>) -> Self {
        Self::new(name, Some(true), comment)
    }

    fn refused(name: &str, comment: impl Into<String>) -> Self {
        Self::new(name, Some(false), comment)
    }

    fn with_change(mut self, group: &str, change: Change) -> Self {
        self.changes.push(group, change);
        self
    }

    /// Whether the state converged or would converge.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result != Some(false)
    }
}

/// Desired state of a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerState {
    pub name: String,
    /// Image alias or source object, used only when creating.
    pub source: Option<Value>,
    pub profiles: Option<Vec<String>>,
    pub config: Value,
    pub devices: Value,
    pub architecture: Option<String>,
    pub ephemeral: bool,
    /// `Some(true)` keeps it running, `Some(false)` keeps it stopped.
    pub running: Option<bool>,
}

impl ContainerState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn spec(&self) -> ContainerSpec {
        ContainerSpec {
            name: self.name.clone(),
            source: self.source.clone(),
            profiles: self
                .profiles
                .as_ref()
                .map(|p| Value::from(p.clone())),
            architecture: self.architecture.clone(),
            config: self.config.clone(),
            devices: self.devices.clone(),
            ephemeral: self.ephemeral,
            description: None,
        }
    }
}

const CONTAINER: &str = "container";
const PROFILE: &str = "profile";
const PROFILES: &str = "profiles";
const STATE: &str = "state";

fn change(field: &str, kind: ChangeKind, message: String, applied: bool) -> Change {
    Change::new(field, kind, message, applied)
}

fn would(dry_run: bool, done: &str, pending: &str) -> String {
    if dry_run {
        pending.to_string()
    } else {
        done.to_string()
    }
}

/// Runs states against one daemon.
pub struct StateRunner<'a> {
    client: &'a Client,
    reconciler: Reconciler,
    dry_run: bool,
}

impl<'a> StateRunner<'a> {
    /// Runner with the default managed-entry policy.
    pub fn new(client: &'a Client) -> Self {
        Self {
            client,
            reconciler: Reconciler::new(),
            dry_run: false,
        }
    }

    /// Use a custom reconciler.
    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Report what would change without changing anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn get_container(&self, name: &str) -> Result<Option<Resource>> {
        match self.client.containers().get(name) {
            Ok(resource) => Ok(Some(resource)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn get_profile(&self, name: &str) -> Result<Option<Resource>> {
        match self.client.profiles().get(name) {
            Ok(resource) => Ok(Some(resource)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn finish(&self, mut result: StateResult, subject: &str) -> StateResult {
        if result.changes.is_empty() {
            result.comment = format!("{subject} is up to date");
        } else if self.dry_run {
            result.result = None;
            result.comment = format!("{subject} would be updated");
        } else {
            result.comment = format!("{subject} updated");
        }
        result
    }

    /// Ensure a container exists with the given config, devices and
    /// profiles, optionally converging its running state.
    pub fn container_present(&self, desired: &ContainerState) -> Result<StateResult> {
        let name = desired.name.as_str();
        let subject = format!("Container '{name}'");

        let Some(mut resource) = self.get_container(name)? else {
            let spec = desired.spec();
            spec.to_body()?;
            if self.dry_run {
                return Ok(
                    StateResult::new(name, None, format!("{subject} would be created"))
                        .with_change(
                            CONTAINER,
                            change(name, ChangeKind::Added, format!("Would create {subject}"), false),
                        ),
                );
            }

            self.client.containers().create(&spec, true)?;
            let mut result = StateResult::ok(name, format!("{subject} created")).with_change(
                CONTAINER,
                change(name, ChangeKind::Added, format!("Created {subject}"), true),
            );
            if desired.running == Some(true) {
                self.client.containers().start(name)?;
                result.changes.push(
                    STATE,
                    change("status", ChangeKind::Changed, "Started".to_string(), true),
                );
            }
            return Ok(result);
        };

        let config = normalize_config(&desired.config)?;
        let devices = normalize_devices(&desired.devices)?;
        let mut changes = self.reconciler.reconcile(
            &mut resource,
            config.as_ref(),
            devices.as_ref(),
            self.dry_run,
        );

        if let Some(profiles) = &desired.profiles
            && *profiles != resource.profiles
        {
            let message = if self.dry_run {
                format!(
                    "Would change profiles from {:?} to {:?}",
                    resource.profiles, profiles
                )
            } else {
                format!(
                    "Changed profiles from {:?} to {:?}",
                    resource.profiles, profiles
                )
            };
            changes.push(
                PROFILES,
                change(PROFILES, ChangeKind::Changed, message, !self.dry_run),
            );
            if !self.dry_run {
                resource.profiles = profiles.clone();
            }
        }

        if changes.any_applied() {
            self.client.containers().save(&resource)?;
        }

        let mut result = StateResult::ok(name, "");
        result.changes = changes;

        match desired.running {
            Some(true) if !resource.is_running() => {
                if !self.dry_run {
                    self.client.containers().start(name)?;
                }
                result.changes.push(
                    STATE,
                    change(
                        "status",
                        ChangeKind::Changed,
                        would(self.dry_run, "Started", "Would start"),
                        !self.dry_run,
                    ),
                );
            }
            Some(false) if resource.lifecycle() != Some(LifecycleStatus::Stopped) => {
                if !self.dry_run {
                    self.client.containers().stop(name, StopOptions::default())?;
                }
                result.changes.push(
                    STATE,
                    change(
                        "status",
                        ChangeKind::Changed,
                        would(self.dry_run, "Stopped", "Would stop"),
                        !self.dry_run,
                    ),
                );
            }
            _ => {}
        }

        Ok(self.finish(result, &subject))
    }

    /// Ensure a container does not exist. A running container is only
    /// removed when `stop` is set.
    pub fn container_absent(&self, name: &str, stop: bool) -> Result<StateResult> {
        let subject = format!("Container '{name}'");
        let Some(resource) = self.get_container(name)? else {
            return Ok(StateResult::ok(name, format!("{subject} not found")));
        };

        let running = resource.is_running();
        if running && !stop {
            return Ok(StateResult::refused(
                name,
                format!("{subject} is running, set stop to remove it"),
            ));
        }

        if self.dry_run {
            return Ok(
                StateResult::new(name, None, format!("{subject} would be deleted")).with_change(
                    CONTAINER,
                    change(name, ChangeKind::Removed, format!("Would delete {subject}"), false),
                ),
            );
        }

        if resource.lifecycle() != Some(LifecycleStatus::Stopped) {
            self.client.containers().stop(name, StopOptions::forced())?;
        }
        self.client.containers().delete(name)?;
        Ok(
            StateResult::ok(name, format!("{subject} deleted")).with_change(
                CONTAINER,
                change(name, ChangeKind::Removed, format!("Deleted {subject}"), true),
            ),
        )
    }

    fn lifecycle_change(&self, name: &str, subject: &str, done: &str, pending: &str) -> StateResult {
        let (result, comment) = if self.dry_run {
            (None, format!("{subject} would be changed"))
        } else {
            (Some(true), format!("{subject} changed"))
        };
        StateResult::new(name, result, comment).with_change(
            STATE,
            change(
                "status",
                ChangeKind::Changed,
                would(self.dry_run, done, pending),
                !self.dry_run,
            ),
        )
    }

    /// Ensure a container is running. `restart` restarts it even when it
    /// already runs.
    pub fn container_running(&self, name: &str, restart: bool) -> Result<StateResult> {
        let subject = format!("Container '{name}'");
        let Some(resource) = self.get_container(name)? else {
            return Ok(StateResult::refused(name, format!("{subject} not found")));
        };
        let containers = self.client.containers();

        let (done, pending) = match resource.lifecycle() {
            Some(LifecycleStatus::Running) if !restart => {
                return Ok(StateResult::ok(name, format!("{subject} is already running")));
            }
            Some(LifecycleStatus::Running) => {
                if !self.dry_run {
                    containers.restart(name)?;
                }
                ("Restarted", "Would restart")
            }
            Some(LifecycleStatus::Frozen) => {
                if !self.dry_run {
                    containers.unfreeze(name)?;
                }
                ("Unfrozen", "Would unfreeze")
            }
            _ => {
                if !self.dry_run {
                    containers.start(name)?;
                }
                ("Started", "Would start")
            }
        };
        Ok(self.lifecycle_change(name, &subject, done, pending))
    }

    /// Ensure a container is frozen. A stopped container is only started
    /// and frozen when `start` is set.
    pub fn container_frozen(&self, name: &str, start: bool) -> Result<StateResult> {
        let subject = format!("Container '{name}'");
        let Some(resource) = self.get_container(name)? else {
            return Ok(StateResult::refused(name, format!("{subject} not found")));
        };
        let containers = self.client.containers();

        let (done, pending) = match resource.lifecycle() {
            Some(LifecycleStatus::Frozen) => {
                return Ok(StateResult::ok(name, format!("{subject} is already frozen")));
            }
            Some(LifecycleStatus::Running) => {
                if !self.dry_run {
                    containers.freeze(name)?;
                }
                ("Frozen", "Would freeze")
            }
            _ if !start => {
                return Ok(StateResult::refused(
                    name,
                    format!("{subject} is not running, set start to freeze it"),
                ));
            }
            _ => {
                if !self.dry_run {
                    containers.start(name)?;
                    containers.freeze(name)?;
                }
                ("Started and frozen", "Would start and freeze")
            }
        };
        Ok(self.lifecycle_change(name, &subject, done, pending))
    }

    /// Ensure a container is stopped. `kill` forces the stop.
    pub fn container_stopped(&self, name: &str, kill: bool) -> Result<StateResult> {
        let subject = format!("Container '{name}'");
        let Some(resource) = self.get_container(name)? else {
            return Ok(StateResult::refused(name, format!("{subject} not found")));
        };

        if resource.lifecycle() == Some(LifecycleStatus::Stopped) {
            return Ok(StateResult::ok(name, format!("{subject} is already stopped")));
        }

        if !self.dry_run {
            let options = if kill {
                StopOptions::forced()
            } else {
                StopOptions::default()
            };
            self.client.containers().stop(name, options)?;
        }
        let (done, pending) = if kill {
            ("Killed", "Would kill")
        } else {
            ("Stopped", "Would stop")
        };
        Ok(self.lifecycle_change(name, &subject, done, pending))
    }

    /// Ensure a container lives on this runner's daemon, moving it from
    /// `source` if needed.
    pub fn container_migrated(
        &self,
        pool: &ClientPool,
        name: &str,
        source: &EndpointIdentity,
        stop_and_start: bool,
    ) -> Result<StateResult> {
        let subject = format!("Container '{name}'");
        if self.get_container(name)?.is_some() {
            return Ok(StateResult::ok(
                name,
                format!("{subject} already exists on {}", self.client.identity().label()),
            ));
        }

        let src = pool.acquire(source)?;
        if !src.containers().exists(name)? {
            return Ok(StateResult::refused(
                name,
                format!("{subject} not found on {}", source.label()),
            ));
        }

        let from = source.label();
        let to = self.client.identity().label();
        if self.dry_run {
            return Ok(
                StateResult::new(name, None, format!("{subject} would be migrated")).with_change(
                    CONTAINER,
                    change(
                        name,
                        ChangeKind::Added,
                        format!("Would migrate {subject} from {from} to {to}"),
                        false,
                    ),
                ),
            );
        }

        migrate(pool, name, source, self.client.identity(), stop_and_start)?;
        Ok(
            StateResult::ok(name, format!("{subject} migrated")).with_change(
                CONTAINER,
                change(
                    name,
                    ChangeKind::Added,
                    format!("Migrated {subject} from {from} to {to}"),
                    true,
                ),
            ),
        )
    }

    /// Ensure a profile exists with the given config, devices and
    /// description.
    pub fn profile_present(
        &self,
        name: &str,
        config: &Value,
        devices: &Value,
        description: Option<&str>,
    ) -> Result<StateResult> {
        let subject = format!("Profile '{name}'");
        let desired_config = normalize_config(config)?;
        let desired_devices = normalize_devices(devices)?;

        let Some(mut resource) = self.get_profile(name)? else {
            if self.dry_run {
                return Ok(
                    StateResult::new(name, None, format!("{subject} would be created"))
                        .with_change(
                            PROFILE,
                            change(name, ChangeKind::Added, format!("Would create {subject}"), false),
                        ),
                );
            }

            let spec = ProfileSpec {
                name: name.to_string(),
                config: desired_config.unwrap_or_default(),
                devices: desired_devices.unwrap_or_default(),
                description: description.map(str::to_string),
            };
            self.client.profiles().create_profile(&spec)?;
            return Ok(
                StateResult::ok(name, format!("{subject} created")).with_change(
                    PROFILE,
                    change(name, ChangeKind::Added, format!("Created {subject}"), true),
                ),
            );
        };

        let mut changes = self.reconciler.reconcile(
            &mut resource,
            desired_config.as_ref(),
            desired_devices.as_ref(),
            self.dry_run,
        );

        let description = description.unwrap_or_default();
        if resource.description != description {
            let message = if self.dry_run {
                format!(
                    "Would change description from \"{}\" to \"{description}\"",
                    resource.description
                )
            } else {
                format!(
                    "Changed description from \"{}\" to \"{description}\"",
                    resource.description
                )
            };
            changes.push(
                PROFILE,
                change("description", ChangeKind::Changed, message, !self.dry_run),
            );
            if !self.dry_run {
                resource.description = description.to_string();
            }
        }

        if changes.any_applied() {
            self.client.profiles().save(&resource)?;
        }

        let mut result = StateResult::ok(name, "");
        result.changes = changes;
        Ok(self.finish(result, &subject))
    }

    /// Ensure a profile does not exist.
    pub fn profile_absent(&self, name: &str) -> Result<StateResult> {
        let subject = format!("Profile '{name}'");
        if self.get_profile(name)?.is_none() {
            return Ok(StateResult::ok(name, format!("{subject} not found")));
        }

        if self.dry_run {
            return Ok(
                StateResult::new(name, None, format!("{subject} would be deleted")).with_change(
                    PROFILE,
                    change(name, ChangeKind::Removed, format!("Would delete {subject}"), false),
                ),
            );
        }

        self.client.profiles().delete(name)?;
        Ok(
            StateResult::ok(name, format!("{subject} deleted")).with_change(
                PROFILE,
                change(name, ChangeKind::Removed, format!("Deleted {subject}"), true),
            ),
        )
    }
}
