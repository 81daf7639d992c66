//! # lxdkit
//!
//! Pure Rust client for the LXD REST API.
//!
//! This crate provides:
//! - A client pool keyed by endpoint identity (unix socket or HTTPS with a
//!   client certificate)
//! - Container and profile operations: list, get, create, delete, rename,
//!   lifecycle changes, migration between daemons
//! - Single-entry edits of config and devices
//! - Declarative reconciliation of config and devices against a desired
//!   state, leaving daemon-managed entries alone
//! - Local daemon control (`lxd init`, `lxc config`)
//!
//! ## Example
//!
//! ```
//! use lxdkit::backend::MockBackend;
//! use lxdkit::{Client, Resource, ResourceKind, reconcile};
//! use std::collections::BTreeMap;
//!
//! let mock = MockBackend::new();
//! mock.insert(ResourceKind::Profile, Resource::new("default"));
//! let client = Client::with_backend(Box::new(mock));
//!
//! let profiles = client.profiles();
//! let mut profile = profiles.get("default").unwrap();
//! let desired = BTreeMap::from([("boot.autostart".to_string(), "1".to_string())]);
//!
//! let report = reconcile(&mut profile, Some(&desired), None, false);
//! if report.any_applied() {
//!     profiles.save(&profile).unwrap();
//! }
//! assert_eq!(profiles.get("default").unwrap().config["boot.autostart"], "1");
//! ```
//!
//! ## Connecting
//!
//! ```no_run
//! use lxdkit::{ClientPool, EndpointIdentity};
//!
//! let pool = ClientPool::new();
//! let local = pool.acquire(&EndpointIdentity::local()).unwrap();
//! let remote = pool
//!     .acquire(&EndpointIdentity::remote(
//!         "https://lxd.lan:8443",
//!         "~/.config/lxc/client.crt",
//!         "~/.config/lxc/client.key",
//!     ))
//!     .unwrap();
//! println!("{:?}", local.containers().list(true).unwrap());
//! println!("{:?}", remote.profiles().list(true).unwrap());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accessor;
pub mod backend;
pub mod daemon;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod normalize;
pub mod pool;
pub mod property;
pub mod sync;
pub mod types;

pub use accessor::{ContainerSpec, ProfileSpec, Resources, migrate};
pub use daemon::{CommandRunner, DaemonControl, InitOptions, SystemRunner};
pub use device::Device;
pub use endpoint::{Endpoint, EndpointIdentity};
pub use error::{Error, ErrorCategory, Result};
pub use normalize::{NormalizedInput, normalize_config, normalize_devices, normalize_input};
pub use pool::{Client, ClientPool, Connector, DefaultConnector};
pub use property::{MapName, PropertyValue};
pub use sync::{Reconciler, reconcile};
pub use types::{
    Architecture, Completion, ConfigMap, DeviceMap, DeviceMaps, LifecycleStatus, Listing,
    MigrationTicket, Operation, Resource, ResourceKind, ServerInfo, StateAction, StopOptions,
};

pub use declarative::{Change, ChangeKind, ChangeReport};
