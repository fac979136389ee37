// SPDX-License-Identifier: GPL-3.0-only

//! tethercam - use a tethered camera as a virtual webcam
//!
//! Streams `gphoto2 --capture-movie` through `ffmpeg` into a v4l2loopback
//! device and supervises the two processes until the stream ends.
//!
//! # Architecture
//!
//! - [`backends`]: loopback device provisioning and camera detection
//! - [`pipelines`]: the supervised producer → consumer pipeline
//! - [`config`]: run configuration
//! - [`dependencies`]: required program checks
//! - [`errors`]: application error type
//!
//! # Example
//!
//! ```ignore
//! let config = Config::default();
//! DeviceManager::system().ensure_device(&config.device)?;
//! let report = Supervisor::new(config.timing)
//!     .run(
//!         &config.pipeline.producer_spec(&config.producer_program),
//!         &config.pipeline.consumer_spec(&config.consumer_program, &config.device),
//!     )
//!     .await;
//! report.into_result()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod dependencies;
pub mod errors;
pub mod pipelines;

// Re-export commonly used types
pub use backends::loopback::{DeviceHost, DeviceManager, DeviceSpec};
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use pipelines::webcam::{PipelineConfig, PipelineReport, PipelineState, Supervisor};
