// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Prefix on every line written to stderr by the binary
pub const PROGRAM_NAME: &str = "tethercam";

/// Version string baked in by build.rs
pub const VERSION: &str = env!("GIT_VERSION");

/// Device defaults
pub mod device {
    /// Loopback index used when `--device` is not given
    pub const DEFAULT_INDEX: u32 = 0;
    /// Card label shown to applications enumerating cameras
    pub const DEFAULT_LABEL: &str = "GPhoto2 Webcam";
    /// Directory holding the video device nodes
    pub const DEV_DIR: &str = "/dev";
    /// Kernel module providing the loopback sink
    pub const LOOPBACK_MODULE: &str = "v4l2loopback";
}

/// External programs the pipeline is built from
pub mod tools {
    /// Producer: captures the movie stream from the camera
    pub const PRODUCER: &str = "gphoto2";
    /// Consumer: transcodes into the loopback device
    pub const CONSUMER: &str = "ffmpeg";
    /// Privileged execution helper
    pub const SUDO: &str = "sudo";
    pub const MODPROBE: &str = "modprobe";
    pub const MODINFO: &str = "modinfo";

    /// Everything that must be on PATH before anything is spawned
    pub const REQUIRED: [&str; 5] = [PRODUCER, CONSUMER, SUDO, MODPROBE, MODINFO];
}

/// Pipeline supervision timing
pub mod timing {
    use super::Duration;

    /// Grace period before the first liveness check
    pub const WARMUP: Duration = Duration::from_secs(5);
    /// Interval between liveness polls once started
    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
    /// How long exiting processes get before the next escalation step
    pub const REAP_GRACE: Duration = Duration::from_secs(3);
    /// Blocking wait after SIGTERM when a pipeline is dropped mid-run
    pub const DROP_GRACE: Duration = Duration::from_millis(500);
    pub const DROP_POLL: Duration = Duration::from_millis(20);
}

/// Arguments the consumer always receives around the user's extra arguments
pub mod consumer {
    /// Placed before the user's arguments: quiet logging, read stdin
    pub const INPUT_ARGS: [&str; 5] = ["-hide_banner", "-loglevel", "error", "-i", "-"];
    /// Placed after the user's arguments, followed by the device node path
    pub const OUTPUT_ARGS: [&str; 8] = [
        "-vcodec", "rawvideo", "-pix_fmt", "yuv420p", "-threads", "0", "-f", "v4l2",
    ];
}

/// Arguments the producer always receives
pub mod producer {
    pub const CAPTURE_ARGS: [&str; 2] = ["--stdout", "--capture-movie"];
    pub const CAMERA_FLAG: &str = "--camera";
    pub const AUTO_DETECT_ARGS: [&str; 1] = ["--auto-detect"];
}
