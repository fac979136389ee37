// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for loopback device provisioning

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tethercam::backends::loopback::{DeviceHost, DeviceManager, DeviceSpec, LoadOutcome};
use tethercam::AppError;

/// In-memory host recording every privileged load
struct FakeHost {
    module: bool,
    nodes: RefCell<HashSet<PathBuf>>,
    /// What the next load reports
    load_result: LoadOutcome,
    /// Whether a successful load actually creates the node
    load_creates_node: bool,
    loads: Cell<usize>,
    module_checks: Cell<usize>,
}

impl FakeHost {
    fn new() -> Self {
        Self {
            module: true,
            nodes: RefCell::new(HashSet::new()),
            load_result: LoadOutcome::Loaded,
            load_creates_node: true,
            loads: Cell::new(0),
            module_checks: Cell::new(0),
        }
    }

    fn with_node(self, index: u32) -> Self {
        self.nodes
            .borrow_mut()
            .insert(DeviceSpec::new(index, "test").node_path());
        self
    }
}

impl DeviceHost for FakeHost {
    fn module_available(&self) -> bool {
        self.module_checks.set(self.module_checks.get() + 1);
        self.module
    }

    fn node_exists(&self, path: &Path) -> bool {
        self.nodes.borrow().contains(path)
    }

    fn load_module(&self, spec: &DeviceSpec) -> LoadOutcome {
        self.loads.set(self.loads.get() + 1);
        if self.load_result == LoadOutcome::Loaded && self.load_creates_node {
            self.nodes.borrow_mut().insert(spec.node_path());
        }
        self.load_result.clone()
    }
}

#[test]
fn test_existing_node_has_no_side_effects() {
    let manager = DeviceManager::new(FakeHost::new().with_node(5));
    let spec = DeviceSpec::new(5, "GPhoto2 Webcam");

    assert!(manager.ensure_device(&spec).is_ok());
    assert_eq!(manager.host().loads.get(), 0);
    assert_eq!(manager.host().module_checks.get(), 0);
    assert!(!manager.load_attempted());
}

#[test]
fn test_missing_node_is_created_once() {
    let manager = DeviceManager::new(FakeHost::new());
    let spec = DeviceSpec::new(2, "GPhoto2 Webcam");

    assert!(manager.ensure_device(&spec).is_ok());
    assert_eq!(manager.host().loads.get(), 1);
}

#[test]
fn test_ensure_device_is_idempotent() {
    for index in [0, 1, 7, 63] {
        let manager = DeviceManager::new(FakeHost::new());
        let spec = DeviceSpec::new(index, "GPhoto2 Webcam");

        assert!(manager.ensure_device(&spec).is_ok());
        assert!(manager.ensure_device(&spec).is_ok());
        assert_eq!(manager.host().loads.get(), 1, "index {}", index);
    }
}

#[test]
fn test_missing_module() {
    let host = FakeHost {
        module: false,
        ..FakeHost::new()
    };
    let manager = DeviceManager::new(host);

    let err = manager.ensure_device(&DeviceSpec::new(2, "x")).unwrap_err();
    assert!(matches!(err, AppError::ModuleMissing));
    assert_eq!(manager.host().loads.get(), 0);
}

#[test]
fn test_failed_load_is_provisioning_failure() {
    let host = FakeHost {
        load_result: LoadOutcome::Failed("modprobe: ERROR: could not insert".into()),
        ..FakeHost::new()
    };
    let manager = DeviceManager::new(host);

    let err = manager.ensure_device(&DeviceSpec::new(2, "x")).unwrap_err();
    match err {
        AppError::ProvisioningFailed(reason) => assert!(reason.contains("could not insert")),
        other => panic!("expected ProvisioningFailed, got {:?}", other),
    }
    assert_eq!(manager.host().loads.get(), 1);
}

#[test]
fn test_successful_load_without_node_is_verification_failure() {
    let host = FakeHost {
        load_creates_node: false,
        ..FakeHost::new()
    };
    let manager = DeviceManager::new(host);
    let spec = DeviceSpec::new(2, "x");

    match manager.ensure_device(&spec).unwrap_err() {
        AppError::ProvisioningVerificationFailed(path) => {
            assert_eq!(path, PathBuf::from("/dev/video2"))
        }
        other => panic!("expected ProvisioningVerificationFailed, got {:?}", other),
    }

    // A second call re-verifies without loading again
    assert!(matches!(
        manager.ensure_device(&spec),
        Err(AppError::ProvisioningVerificationFailed(_))
    ));
    assert_eq!(manager.host().loads.get(), 1);
}
