// SPDX-License-Identifier: GPL-3.0-only

//! Run configuration, assembled from command-line arguments over defaults

use crate::backends::loopback::DeviceSpec;
use crate::constants::{device, tools};
use crate::errors::{AppError, AppResult};
use crate::pipelines::webcam::{PipelineConfig, SupervisorTiming};

/// Everything one run needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Loopback node to provision and write into
    pub device: DeviceSpec,
    /// Camera selector and extra arguments for both processes
    pub pipeline: PipelineConfig,
    /// Producer executable
    pub producer_program: String,
    /// Consumer executable
    pub consumer_program: String,
    /// Warm-up, poll and reap timing
    pub timing: SupervisorTiming,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceSpec::default(),
            pipeline: PipelineConfig::default(),
            producer_program: tools::PRODUCER.to_string(),
            consumer_program: tools::CONSUMER.to_string(),
            timing: SupervisorTiming::default(),
        }
    }
}

impl Config {
    /// Build from raw argument values
    ///
    /// `producer_args` and `consumer_args` are split with shell quoting rules.
    pub fn from_args(
        device_index: u32,
        label: Option<&str>,
        camera: Option<&str>,
        producer_args: Option<&str>,
        consumer_args: Option<&str>,
    ) -> AppResult<Self> {
        let label = match label.map(str::trim) {
            Some("") => return Err(AppError::ArgumentInvalid("device label is empty".into())),
            Some(label) => label,
            None => device::DEFAULT_LABEL,
        };
        let camera = match camera.map(str::trim) {
            Some("") => return Err(AppError::ArgumentInvalid("camera name is empty".into())),
            other => other.map(str::to_string),
        };

        Ok(Self {
            device: DeviceSpec::new(device_index, label),
            pipeline: PipelineConfig {
                camera,
                producer_args: split_args("gphoto-args", producer_args)?,
                consumer_args: split_args("ffmpeg-args", consumer_args)?,
            },
            ..Self::default()
        })
    }

    /// Programs that must be on PATH for this configuration
    pub fn required_tools(&self) -> Vec<&str> {
        let mut required = vec![self.producer_program.as_str(), self.consumer_program.as_str()];
        required.extend(
            tools::REQUIRED
                .iter()
                .copied()
                .filter(|tool| *tool != tools::PRODUCER && *tool != tools::CONSUMER),
        );
        required
    }
}

/// Parse a `--device` value; only non-negative integers are accepted
pub fn parse_device_index(value: &str) -> Result<u32, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{}' is not a non-negative integer", value));
    }
    trimmed
        .parse::<u32>()
        .map_err(|_| format!("'{}' is out of range", value))
}

fn split_args(flag: &str, value: Option<&str>) -> AppResult<Vec<String>> {
    match value {
        None => Ok(Vec::new()),
        Some(value) => shlex::split(value).ok_or_else(|| {
            AppError::ArgumentInvalid(format!("--{}: unbalanced quotes in '{}'", flag, value))
        }),
    }
}
