//! Local daemon control through the `lxd` and `lxc` commands.
//!
//! The commands report failures in their output rather than reliably via
//! exit status, so every output is scanned for an `error:` marker.

use crate::error::{Error, Result};
use std::process::Command;

/// Marker the commands print in front of a failure.
pub const ERROR_MARKER: &str = "error:";

/// Executes a program and returns its combined output.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> Result<String>;
}

/// Runs real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String> {
        log::debug!("running {program} {}", args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::CommandFailed {
                message: format!("failed to execute {program}: {e}"),
                output: String::new(),
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        if !output.status.success() && scan_error(&text).is_none() {
            return Err(Error::CommandFailed {
                message: format!("{program} exited with {}", output.status),
                output: text,
            });
        }
        Ok(text.trim_end().to_string())
    }
}

/// Detail following the first error marker, up to the end of its line.
#[must_use]
pub fn scan_error(output: &str) -> Option<String> {
    let start = output.find(ERROR_MARKER)? + ERROR_MARKER.len();
    let rest = &output[start..];
    let line = rest.lines().next().unwrap_or_default();
    Some(line.trim().to_string())
}

/// Options for `lxd init --auto`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    /// `dir` or `zfs`.
    pub storage_backend: String,
    /// Password remote clients use to become trusted.
    pub trust_password: Option<String>,
    /// Address to listen on for the network API.
    pub network_address: Option<String>,
    /// Port for the network API.
    pub network_port: Option<u16>,
    /// Block device for device-based storage.
    pub storage_create_device: Option<String>,
    /// Loop file size in GB.
    pub storage_create_loop: Option<u64>,
    /// Existing pool or dataset to use.
    pub storage_pool: Option<String>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            storage_backend: "dir".to_string(),
            trust_password: None,
            network_address: None,
            network_port: None,
            storage_create_device: None,
            storage_create_loop: None,
            storage_pool: None,
        }
    }
}

impl InitOptions {
    /// Arguments passed to `lxd`.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "init".to_string(),
            "--auto".to_string(),
            format!("--storage-backend={}", self.storage_backend),
        ];
        if let Some(password) = &self.trust_password {
            args.push(format!("--trust-password={password}"));
        }
        if let Some(address) = &self.network_address {
            args.push(format!("--network-address={address}"));
        }
        if let Some(port) = self.network_port {
            args.push(format!("--network-port={port}"));
        }
        if let Some(device) = &self.storage_create_device {
            args.push(format!("--storage-create-device={device}"));
        }
        if let Some(size) = self.storage_create_loop {
            args.push(format!("--storage-create-loop={size}"));
        }
        if let Some(pool) = &self.storage_pool {
            args.push(format!("--storage-pool={pool}"));
        }
        args
    }
}

/// Control of the daemon on this host.
pub struct DaemonControl {
    runner: Box<dyn CommandRunner>,
}

impl Default for DaemonControl {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonControl {
    /// Control the local daemon with real commands.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runner(Box::new(SystemRunner))
    }

    /// Control through a custom runner.
    pub fn with_runner(runner: Box<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn run_checked(&self, program: &str, args: Vec<String>) -> Result<String> {
        let output = self.runner.run(program, &args)?;
        if let Some(message) = scan_error(&output) {
            return Err(Error::CommandFailed { message, output });
        }
        Ok(output)
    }

    /// Installed daemon version.
    pub fn version(&self) -> Result<String> {
        self.run_checked("lxd", vec!["--version".to_string()])
    }

    /// Initialize the daemon non-interactively.
    pub fn init(&self, options: &InitOptions) -> Result<String> {
        log::info!("initializing daemon with {} storage", options.storage_backend);
        self.run_checked("lxd", options.args())
    }

    /// Read a server config value.
    pub fn config_get(&self, key: &str) -> Result<String> {
        self.run_checked(
            "lxc",
            vec!["config".to_string(), "get".to_string(), key.to_string()],
        )
    }

    /// Set a server config value.
    pub fn config_set(&self, key: &str, value: &str) -> Result<String> {
        self.run_checked(
            "lxc",
            vec![
                "config".to_string(),
                "set".to_string(),
                key.to_string(),
                value.to_string(),
            ],
        )?;
        Ok(format!("Config value \"{key}\" successfully set."))
    }
}
