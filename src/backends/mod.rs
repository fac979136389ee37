// SPDX-License-Identifier: GPL-3.0-only

//! System-facing backends
//!
//! - [`camera`]: tethered camera detection via gphoto2
//! - [`loopback`]: v4l2loopback device provisioning

pub mod camera;
pub mod loopback;
