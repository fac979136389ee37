// SPDX-License-Identifier: GPL-3.0-only

//! v4l2loopback device provisioning
//!
//! [`DeviceManager::ensure_device`] makes sure `/dev/video<N>` exists before
//! the pipeline starts, loading the kernel module through `sudo modprobe` if
//! needed. All system access goes through [`DeviceHost`].

mod v4l2;

pub use v4l2::{LOOPBACK_DRIVER, query_driver};

use crate::constants::{device, tools};
use crate::errors::{AppError, AppResult};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Target virtual video sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub index: u32,
    pub label: String,
}

impl DeviceSpec {
    pub fn new(index: u32, label: impl Into<String>) -> Self {
        Self {
            index,
            label: label.into(),
        }
    }

    /// `/dev/video<index>`
    pub fn node_path(&self) -> PathBuf {
        Path::new(device::DEV_DIR).join(format!("video{}", self.index))
    }
}

impl Default for DeviceSpec {
    fn default() -> Self {
        Self::new(device::DEFAULT_INDEX, device::DEFAULT_LABEL)
    }
}

/// Outcome of the privileged module load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The command exited 0
    Loaded,
    /// The command exited non-zero or could not be run
    Failed(String),
}

/// System operations the device manager depends on
pub trait DeviceHost {
    /// Whether the loopback kernel module is installed
    fn module_available(&self) -> bool;

    /// Whether a device node exists at `path`
    fn node_exists(&self, path: &Path) -> bool;

    /// Load the loopback module creating `spec`'s node
    fn load_module(&self, spec: &DeviceSpec) -> LoadOutcome;

    /// Driver name of an existing node, if it can be queried
    fn node_driver(&self, _path: &Path) -> Option<String> {
        None
    }
}

/// Real host: modinfo, sudo modprobe, the filesystem and VIDIOC_QUERYCAP
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl SystemHost {
    /// modprobe options creating one labelled node at the requested index
    pub fn modprobe_args(spec: &DeviceSpec) -> Vec<String> {
        vec![
            tools::MODPROBE.to_string(),
            device::LOOPBACK_MODULE.to_string(),
            "exclusive_caps=1".to_string(),
            "max_buffers=2".to_string(),
            format!("card_label={}", spec.label),
            format!("video_nr={}", spec.index),
        ]
    }
}

impl DeviceHost for SystemHost {
    fn module_available(&self) -> bool {
        match Command::new(tools::MODINFO)
            .arg(device::LOOPBACK_MODULE)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => status.success(),
            Err(e) => {
                warn!(error = %e, "Failed to run {}", tools::MODINFO);
                false
            }
        }
    }

    fn node_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn load_module(&self, spec: &DeviceSpec) -> LoadOutcome {
        let args = Self::modprobe_args(spec);
        info!(command = %args.join(" "), "Loading loopback module (may prompt for password)");

        // stdin stays attached so sudo can ask for a password
        match Command::new(tools::SUDO)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
        {
            Ok(output) if output.status.success() => LoadOutcome::Loaded,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let reason = if stderr.is_empty() {
                    format!("{} exited with {}", tools::MODPROBE, output.status)
                } else {
                    stderr
                };
                LoadOutcome::Failed(reason)
            }
            Err(e) => LoadOutcome::Failed(format!("failed to run {}: {}", tools::SUDO, e)),
        }
    }

    fn node_driver(&self, path: &Path) -> Option<String> {
        query_driver(path).map(|(driver, _card)| driver)
    }
}

/// Provisions the loopback node, attempting the privileged load at most once
pub struct DeviceManager<H: DeviceHost = SystemHost> {
    host: H,
    load_attempted: Cell<bool>,
}

impl DeviceManager<SystemHost> {
    pub fn system() -> Self {
        Self::new(SystemHost)
    }
}

impl<H: DeviceHost> DeviceManager<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            load_attempted: Cell::new(false),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Whether the privileged module load has been attempted
    pub fn load_attempted(&self) -> bool {
        self.load_attempted.get()
    }

    /// Make sure the device node for `spec` exists
    ///
    /// An existing node short-circuits with no other host call. Otherwise the
    /// module must be installed, is loaded once, and the node must appear.
    pub fn ensure_device(&self, spec: &DeviceSpec) -> AppResult<()> {
        let path = spec.node_path();

        if self.host.node_exists(&path) {
            debug!(path = %path.display(), "Device node already exists");
            if let Some(driver) = self.host.node_driver(&path)
                && driver != LOOPBACK_DRIVER
            {
                warn!(path = %path.display(), driver = %driver, "Device node is not a v4l2loopback device");
            }
            return Ok(());
        }

        if !self.host.module_available() {
            return Err(AppError::ModuleMissing);
        }

        if self.load_attempted.replace(true) {
            debug!("Module load already attempted this run, not retrying");
        } else if let LoadOutcome::Failed(reason) = self.host.load_module(spec) {
            return Err(AppError::ProvisioningFailed(reason));
        }

        if !self.host.node_exists(&path) {
            return Err(AppError::ProvisioningVerificationFailed(path));
        }

        info!(path = %path.display(), label = %spec.label, "Virtual video device created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_path_uses_index() {
        assert_eq!(DeviceSpec::new(7, "x").node_path(), PathBuf::from("/dev/video7"));
    }

    #[test]
    fn modprobe_args_carry_label_and_index() {
        let args = SystemHost::modprobe_args(&DeviceSpec::new(2, "My Cam"));
        assert_eq!(args[0], "modprobe");
        assert_eq!(args[1], "v4l2loopback");
        assert!(args.contains(&"card_label=My Cam".to_string()));
        assert!(args.contains(&"video_nr=2".to_string()));
    }
}
