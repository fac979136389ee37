// SPDX-License-Identifier: GPL-3.0-only

//! Minimal V4L2 capability query for existing device nodes

use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use tracing::debug;

/// VIDIOC_QUERYCAP ioctl number
const VIDIOC_QUERYCAP: libc::c_ulong = 0x80685600;

/// Driver name v4l2loopback reports through VIDIOC_QUERYCAP
pub const LOOPBACK_DRIVER: &str = "v4l2 loopback";

/// V4L2 capability structure for VIDIOC_QUERYCAP ioctl
#[allow(dead_code)]
#[repr(C)]
struct V4l2Capability {
    driver: [u8; 16],
    card: [u8; 32],
    bus_info: [u8; 32],
    version: u32,
    capabilities: u32,
    device_caps: u32,
    reserved: [u32; 3],
}

fn query_v4l2_cap(fd: RawFd) -> Option<V4l2Capability> {
    // SAFETY: V4l2Capability is plain old data; all-zero is a valid value
    let mut cap: V4l2Capability = unsafe { std::mem::zeroed() };
    // SAFETY: fd is open for the duration of the call and cap matches the
    // kernel's struct v4l2_capability layout the ioctl writes into
    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCAP as _, &mut cap as *mut V4l2Capability) };
    if result < 0 { None } else { Some(cap) }
}

fn c_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).to_string()
}

/// Driver and card name of a V4L2 node, `None` if it cannot be opened or queried
pub fn query_driver(path: &Path) -> Option<(String, String)> {
    let file = std::fs::File::open(path).ok()?;
    let cap = query_v4l2_cap(file.as_raw_fd())?;

    let driver = c_string(&cap.driver);
    let card = c_string(&cap.card);
    debug!(path = %path.display(), driver = %driver, card = %card, "Queried V4L2 node");
    Some((driver, card))
}
