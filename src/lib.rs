//! # lxdstate
//!
//! Declarative states for LXD containers and profiles.
//!
//! Built on [`lxdkit`] for the daemon API and [`declarative`] for map
//! reconciliation. Remotes and the managed-entry policy come from a TOML
//! config file (see [`config`]).
//!
//! ## Example
//!
//! ```no_run
//! use lxdstate::config::Config;
//! use lxdstate::states::{ContainerState, StateRunner};
//! use lxdkit::ClientPool;
//! use serde_json::json;
//!
//! let config = Config::load().unwrap();
//! let pool = ClientPool::new();
//! let client = pool.acquire(&config.identity(None).unwrap()).unwrap();
//!
//! let web = ContainerState {
//!     source: Some(json!("ubuntu/22.04")),
//!     config: json!({"limits.cpu": 2}),
//!     running: Some(true),
//!     ..ContainerState::new("web")
//! };
//! let result = StateRunner::new(&client)
//!     .with_reconciler(config.reconciler())
//!     .container_present(&web)
//!     .unwrap();
//! println!("{}", result.comment);
//! ```

pub mod config;
pub mod paths;
pub mod states;

pub use config::{Config, Remote};
pub use states::{ContainerState, StateResult, StateRunner};
