// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for the webcam pipeline

use crate::errors::{AppError, AppResult};
use std::fmt;

/// Which side of the pipeline a process is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// Captures raw video from the camera
    Producer,
    /// Transcodes the stream into the loopback device
    Consumer,
}

impl ProcessRole {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessRole::Producer => "producer",
            ProcessRole::Consumer => "consumer",
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of the single pipeline in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    NotStarted,
    Launching,
    Running,
    Succeeded,
    Failed,
    Terminated,
}

impl PipelineState {
    /// Succeeded, Failed and Terminated are final for the run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Succeeded | PipelineState::Failed | PipelineState::Terminated
        )
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (NotStarted, Launching)
                | (Launching, Running)
                | (Launching, Failed)
                | (Launching, Terminated)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Terminated)
        )
    }
}

/// Drained stderr of one pipeline process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub source: ProcessRole,
    pub content: Vec<u8>,
    pub non_empty: bool,
}

impl DiagnosticReport {
    pub fn new(source: ProcessRole, content: Vec<u8>) -> Self {
        let non_empty = !content.is_empty();
        Self {
            source,
            content,
            non_empty,
        }
    }

    /// Content as text, with invalid UTF-8 replaced and trailing whitespace trimmed
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).trim_end().to_string()
    }
}

/// Outcome of one supervised pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Always terminal once returned by the supervisor
    pub state: PipelineState,
    /// Whether the "started successfully" notification fired
    pub started: bool,
    /// Consumer exit code, `None` when it was killed or never ran
    pub consumer_exit: Option<i32>,
    /// Non-empty diagnostics, only populated on failure
    pub diagnostics: Vec<DiagnosticReport>,
}

impl PipelineReport {
    /// Map the terminal state onto the application error taxonomy
    pub fn into_result(self) -> AppResult<()> {
        match self.state {
            PipelineState::Succeeded => Ok(()),
            PipelineState::Failed => Err(AppError::PipelineFailed {
                exit_code: self.consumer_exit.unwrap_or(1),
                diagnostics: self.diagnostics,
            }),
            _ => Err(AppError::PipelineTerminated),
        }
    }
}
