// SPDX-License-Identifier: GPL-3.0-only

//! Tethered camera detection through `gphoto2 --auto-detect`

use crate::constants::producer;
use crate::errors::{AppError, AppResult};
use std::process::{Command, Output};
use tracing::{debug, info, warn};

/// A camera reported by the producer tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedCamera {
    /// Model name, the value accepted by `--camera`
    pub model: String,
    /// Port, e.g. "usb:001,005"
    pub port: String,
}

/// Run the auto-detect query and parse its table
pub fn detect_cameras(program: &str) -> AppResult<Vec<DetectedCamera>> {
    debug!(program, "Detecting cameras");

    let output = Command::new(program)
        .args(producer::AUTO_DETECT_ARGS)
        .output()
        .map_err(|e| AppError::DependencyMissing(format!("{} ({})", program, e)))?;

    let cameras = parse_auto_detect(&auto_detect_stdout(program, &output)?);
    info!(count = cameras.len(), "Found cameras");
    Ok(cameras)
}

/// Stdout of a successful auto-detect run; a failed run carries its stderr
fn auto_detect_stdout(program: &str, output: &Output) -> AppResult<String> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr.trim(), "Camera auto-detect failed");
        return Err(AppError::Other(format!(
            "{} {} failed ({}): {}",
            program,
            producer::AUTO_DETECT_ARGS.join(" "),
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse auto-detect output
///
/// Example format:
/// ```text
/// Model                          Port
/// ----------------------------------------------------------
/// Canon EOS 80D                  usb:001,005
/// ```
pub fn parse_auto_detect(stdout: &str) -> Vec<DetectedCamera> {
    stdout
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let trimmed = line.trim();
            let split = trimmed.rfind(char::is_whitespace)?;
            let model = trimmed[..split].trim();
            let port = trimmed[split..].trim();
            if model.is_empty() || port.is_empty() {
                return None;
            }
            debug!(model, port, "Found camera");
            Some(DetectedCamera {
                model: model.to_string(),
                port: port.to_string(),
            })
        })
        .collect()
}

/// Check the requested camera against what is attached
///
/// With no selector the producer picks the first camera itself; the
/// selector is returned unchanged when it names a detected model.
pub fn resolve_camera(
    selector: Option<&str>,
    cameras: &[DetectedCamera],
) -> AppResult<Option<String>> {
    if cameras.is_empty() {
        return Err(AppError::CameraNotDetected(selector.map(str::to_string)));
    }

    match selector {
        None => {
            info!(model = %cameras[0].model, port = %cameras[0].port, "Using first detected camera");
            Ok(None)
        }
        Some(wanted) => {
            let found = cameras.iter().find(|camera| camera.model == wanted);
            match found {
                Some(camera) => {
                    info!(model = %camera.model, port = %camera.port, "Using requested camera");
                    Ok(Some(wanted.to_string()))
                }
                None => Err(AppError::CameraNotDetected(Some(wanted.to_string()))),
            }
        }
    }
}
