// SPDX-License-Identifier: GPL-3.0-only

//! Error types for tethercam
//!
//! Every variant is terminal for the run: nothing is retried, the binary
//! reports the error and exits with status 1.

use crate::pipelines::webcam::DiagnosticReport;
use std::fmt;
use std::path::PathBuf;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Command line could not be parsed or failed validation
    ArgumentInvalid(String),
    /// A required external tool is not on PATH
    DependencyMissing(String),
    /// No camera found, or the requested one is not attached
    CameraNotDetected(Option<String>),
    /// The v4l2loopback kernel module is not installed
    ModuleMissing,
    /// The privileged module load reported failure
    ProvisioningFailed(String),
    /// The module load reported success but the device node never appeared
    ProvisioningVerificationFailed(PathBuf),
    /// The consumer exited with a non-zero code
    PipelineFailed {
        exit_code: i32,
        diagnostics: Vec<DiagnosticReport>,
    },
    /// The pipeline was stopped by a signal before finishing on its own
    PipelineTerminated,
    /// Generic error with message
    Other(String),
}

impl AppError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Diagnostic reports attached to a pipeline failure, empty otherwise
    pub fn diagnostics(&self) -> &[DiagnosticReport] {
        match self {
            AppError::PipelineFailed { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ArgumentInvalid(msg) => write!(f, "Invalid argument: {}", msg),
            AppError::DependencyMissing(tool) => {
                write!(f, "Required program '{}' not found in PATH", tool)
            }
            AppError::CameraNotDetected(None) => write!(f, "No camera detected"),
            AppError::CameraNotDetected(Some(model)) => {
                write!(f, "Camera '{}' not detected", model)
            }
            AppError::ModuleMissing => write!(
                f,
                "Kernel module v4l2loopback is not available, install v4l2loopback first"
            ),
            AppError::ProvisioningFailed(msg) => {
                write!(f, "Failed to create virtual video device: {}", msg)
            }
            AppError::ProvisioningVerificationFailed(path) => write!(
                f,
                "Module loaded but {} does not exist, check the v4l2loopback options",
                path.display()
            ),
            AppError::PipelineFailed { exit_code, .. } => {
                write!(f, "Pipeline failed with exit code {}", exit_code)
            }
            AppError::PipelineTerminated => write!(f, "Pipeline terminated"),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AppError {}
