// SPDX-License-Identifier: GPL-3.0-only

//! Child processes of the webcam pipeline
//!
//! [`Pipeline`] owns both [`ProcessHandle`]s and their diagnostic buffers.
//! Dropping it runs [`Pipeline::cleanup`], so the process group is signalled
//! and the temporary files released on every exit path. Whatever ignores
//! SIGTERM is killed with SIGKILL through the same group.

use super::types::{DiagnosticReport, PipelineState, ProcessRole};
use crate::constants;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Fully resolved command line for one side of the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub role: ProcessRole,
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessSpec {
    pub fn new(role: ProcessRole, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            role,
            program: program.into(),
            args,
        }
    }

    /// Command line joined for log output
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Scratch storage for one process's stderr
///
/// Backed by an anonymous temporary file that the OS deletes once the last
/// descriptor is closed. The child writes through a duplicate of the same
/// descriptor, so the file offset is shared.
pub struct DiagnosticBuffer {
    file: File,
}

impl DiagnosticBuffer {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            file: tempfile::tempfile()?,
        })
    }

    /// A `Stdio` that writes into this buffer
    fn stdio(&self) -> io::Result<Stdio> {
        Ok(Stdio::from(self.file.try_clone()?))
    }

    /// Everything written so far
    pub fn drain(&mut self) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut content = Vec::new();
        self.file.read_to_end(&mut content)?;
        Ok(content)
    }
}

/// Failure to bring up one side of the pipeline
#[derive(Debug)]
pub struct LaunchError {
    pub role: ProcessRole,
    pub program: String,
    pub source: io::Error,
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to start {} '{}': {}", self.role, self.program, self.source)
    }
}

impl std::error::Error for LaunchError {}

/// A spawned pipeline process
pub struct ProcessHandle {
    role: ProcessRole,
    pid: Option<u32>,
    child: Child,
    buffer: Option<DiagnosticBuffer>,
    status: Option<ExitStatus>,
}

impl ProcessHandle {
    fn new(role: ProcessRole, child: Child, buffer: DiagnosticBuffer) -> Self {
        Self {
            role,
            pid: child.id(),
            child,
            buffer: Some(buffer),
            status: None,
        }
    }

    pub fn role(&self) -> ProcessRole {
        self.role
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Non-blocking liveness check; reaps the process if it has exited
    pub fn is_alive(&mut self) -> bool {
        if self.status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(role = %self.role, ?status, "Process exited");
                self.status = Some(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(role = %self.role, error = %e, "Failed to query process status");
                false
            }
        }
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.status = Some(status);
        Ok(status)
    }

    /// Wait up to `grace`; returns `None` if the process is still running
    pub async fn wait_timeout(&mut self, grace: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(grace, self.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                warn!(role = %self.role, error = %e, "Failed to wait for process");
                None
            }
            Err(_) => None,
        }
    }

    /// Drain the diagnostic buffer; empty once the buffer was released
    pub fn diagnostics(&mut self) -> DiagnosticReport {
        let content = match self.buffer.as_mut().map(DiagnosticBuffer::drain) {
            Some(Ok(content)) => content,
            Some(Err(e)) => {
                warn!(role = %self.role, error = %e, "Failed to read diagnostic buffer");
                Vec::new()
            }
            None => Vec::new(),
        };
        DiagnosticReport::new(self.role, content)
    }

    fn release_buffer(&mut self) -> bool {
        self.buffer.take().is_some()
    }
}

/// The producer → consumer process pair and its supervision state
pub struct Pipeline {
    state: PipelineState,
    producer: Option<ProcessHandle>,
    consumer: Option<ProcessHandle>,
    process_group: Option<i32>,
    started: bool,
    cleaned_up: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            state: PipelineState::NotStarted,
            producer: None,
            consumer: None,
            process_group: None,
            started: false,
            cleaned_up: false,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Move to `next`; illegal transitions are logged and ignored
    pub(crate) fn transition(&mut self, next: PipelineState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(from = ?self.state, to = ?next, "Ignoring illegal pipeline transition");
            return false;
        }
        debug!(from = ?self.state, to = ?next, "Pipeline state changed");
        self.state = next;
        true
    }

    /// Spawn producer then consumer, with producer stdout piped into consumer stdin
    ///
    /// Both processes share a process group led by the producer. On error the
    /// pipeline stays in `Launching` with whatever was spawned so far; the
    /// caller decides the terminal state.
    pub fn launch(
        &mut self,
        producer: &ProcessSpec,
        consumer: &ProcessSpec,
    ) -> Result<(), LaunchError> {
        self.transition(PipelineState::Launching);

        let launch_error = |spec: &ProcessSpec| {
            let role = spec.role;
            let program = spec.program.clone();
            move |source: io::Error| LaunchError {
                role,
                program,
                source,
            }
        };

        let producer_buffer = DiagnosticBuffer::new().map_err(launch_error(producer))?;
        let consumer_buffer = DiagnosticBuffer::new().map_err(launch_error(consumer))?;

        debug!(command = %producer.command_line(), "Spawning producer");
        let mut producer_child = Command::new(&producer.program)
            .args(&producer.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(producer_buffer.stdio().map_err(launch_error(producer))?)
            .process_group(0)
            .spawn()
            .map_err(launch_error(producer))?;

        let stream = producer_child.stdout.take();
        let producer_handle = ProcessHandle::new(producer.role, producer_child, producer_buffer);
        let group = producer_handle.pid().map(|pid| pid as i32);
        self.process_group = group;
        self.producer = Some(producer_handle);

        let stream: Stdio = stream
            .ok_or_else(|| io::Error::other("producer stdout was not captured"))
            .and_then(|stdout| stdout.try_into())
            .map_err(launch_error(producer))?;

        debug!(command = %consumer.command_line(), "Spawning consumer");
        let consumer_child = Command::new(&consumer.program)
            .args(&consumer.args)
            .stdin(stream)
            .stdout(Stdio::null())
            .stderr(consumer_buffer.stdio().map_err(launch_error(consumer))?)
            .process_group(group.unwrap_or(0))
            .spawn()
            .map_err(launch_error(consumer))?;

        self.consumer = Some(ProcessHandle::new(consumer.role, consumer_child, consumer_buffer));
        self.transition(PipelineState::Running);

        info!(
            producer_pid = ?self.producer.as_ref().and_then(ProcessHandle::pid),
            consumer_pid = ?self.consumer.as_ref().and_then(ProcessHandle::pid),
            "Pipeline launched"
        );
        Ok(())
    }

    pub fn producer_mut(&mut self) -> Option<&mut ProcessHandle> {
        self.producer.as_mut()
    }

    pub fn consumer_mut(&mut self) -> Option<&mut ProcessHandle> {
        self.consumer.as_mut()
    }

    /// Whether both processes are spawned and still running
    pub fn all_alive(&mut self) -> bool {
        let producer = self.producer.as_mut().is_some_and(ProcessHandle::is_alive);
        let consumer = self.consumer.as_mut().is_some_and(ProcessHandle::is_alive);
        producer && consumer
    }

    /// Whether the last stage of the pipeline is still running
    pub fn consumer_alive(&mut self) -> bool {
        self.consumer.as_mut().is_some_and(ProcessHandle::is_alive)
    }

    fn any_alive(&mut self) -> bool {
        let producer = self.producer.as_mut().is_some_and(ProcessHandle::is_alive);
        let consumer = self.consumer.as_mut().is_some_and(ProcessHandle::is_alive);
        producer || consumer
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// Drain both diagnostic buffers, producer first
    pub fn drain_diagnostics(&mut self) -> Vec<DiagnosticReport> {
        [self.producer.as_mut(), self.consumer.as_mut()]
            .into_iter()
            .flatten()
            .map(ProcessHandle::diagnostics)
            .collect()
    }

    /// Wait up to `grace` for every spawned process to exit
    pub async fn reap(&mut self, grace: Duration) {
        for handle in [self.producer.as_mut(), self.consumer.as_mut()]
            .into_iter()
            .flatten()
        {
            if handle.wait_timeout(grace).await.is_none() {
                debug!(role = %handle.role(), "Process still running after grace period");
            }
        }
    }

    /// Signal the process group if anything is still alive and release both buffers
    ///
    /// Only the first call does anything; returns whether this was that call.
    pub fn cleanup(&mut self) -> bool {
        if self.cleaned_up {
            return false;
        }
        self.cleaned_up = true;

        if self.any_alive()
            && let Some(group) = self.process_group
        {
            self.signal_group(group, libc::SIGTERM);
        }

        let released = [self.producer.as_mut(), self.consumer.as_mut()]
            .into_iter()
            .flatten()
            .map(ProcessHandle::release_buffer)
            .filter(|released| *released)
            .count();
        debug!(released, "Diagnostic buffers released");
        true
    }

    /// SIGKILL the process group if a spawned process outlived cleanup
    ///
    /// Descendants the processes started share the group, so they go too.
    pub fn kill_remaining(&mut self) -> bool {
        if !self.any_alive() {
            return false;
        }
        match self.process_group {
            Some(group) => {
                self.signal_group(group, libc::SIGKILL);
                true
            }
            None => false,
        }
    }

    /// Poll without an async runtime until nothing is alive or `grace` passes
    fn wait_blocking(&mut self, grace: Duration) {
        let deadline = std::time::Instant::now() + grace;
        while self.any_alive() && std::time::Instant::now() < deadline {
            std::thread::sleep(constants::timing::DROP_POLL);
        }
    }

    fn signal_group(&self, group: i32, signal: libc::c_int) {
        // SAFETY: killpg has no memory-safety preconditions
        let result = unsafe { libc::killpg(group, signal) };
        if result == 0 {
            info!(group, signal, "Signalled pipeline process group");
            return;
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            debug!(group, "Pipeline process group already gone");
        } else {
            warn!(group, error = %err, "Failed to signal pipeline process group");
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.cleanup() {
            debug!(state = ?self.state, "Pipeline cleaned up on drop");
            self.wait_blocking(constants::timing::DROP_GRACE);
            if self.kill_remaining() {
                warn!("Pipeline processes ignored SIGTERM, killed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sh(role: ProcessRole, script: &str) -> ProcessSpec {
        ProcessSpec::new(role, "sh", vec!["-c".into(), script.into()])
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let spec = ProcessSpec::new(
            ProcessRole::Producer,
            "gphoto2",
            vec!["--stdout".into(), "--capture-movie".into()],
        );
        assert_eq!(spec.command_line(), "gphoto2 --stdout --capture-movie");
    }

    #[test]
    fn buffer_drains_from_the_start() {
        let mut buffer = DiagnosticBuffer::new().unwrap();
        buffer.file.write_all(b"first\nsecond\n").unwrap();
        assert_eq!(buffer.drain().unwrap(), b"first\nsecond\n");
        // Draining twice returns the same content
        assert_eq!(buffer.drain().unwrap(), b"first\nsecond\n");
    }

    #[tokio::test]
    async fn stream_and_stderr_are_wired() {
        let mut pipeline = Pipeline::new();
        pipeline
            .launch(
                &sh(ProcessRole::Producer, "printf frames; echo capturing >&2"),
                &sh(ProcessRole::Consumer, "cat >&2"),
            )
            .unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);

        pipeline.reap(Duration::from_secs(5)).await;
        let reports = pipeline.drain_diagnostics();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].source, ProcessRole::Producer);
        assert_eq!(reports[0].text(), "capturing");
        assert_eq!(reports[1].source, ProcessRole::Consumer);
        assert_eq!(reports[1].text(), "frames");
    }

    #[tokio::test]
    async fn cleanup_runs_once_and_stops_children() {
        let mut pipeline = Pipeline::new();
        pipeline
            .launch(
                &sh(ProcessRole::Producer, "sleep 30"),
                &sh(ProcessRole::Consumer, "sleep 30"),
            )
            .unwrap();
        assert!(pipeline.all_alive());

        assert!(pipeline.cleanup());
        assert!(!pipeline.cleanup());
        pipeline.reap(Duration::from_secs(5)).await;
        assert!(!pipeline.consumer_alive());
        assert!(pipeline.drain_diagnostics().iter().all(|r| !r.non_empty));
    }

    #[tokio::test]
    async fn missing_program_fails_launch_for_its_role() {
        let mut pipeline = Pipeline::new();
        let err = pipeline
            .launch(
                &sh(ProcessRole::Producer, "sleep 30"),
                &ProcessSpec::new(ProcessRole::Consumer, "/nonexistent/ffmpeg", Vec::new()),
            )
            .unwrap_err();
        assert_eq!(err.role, ProcessRole::Consumer);
        assert_eq!(pipeline.state(), PipelineState::Launching);
        assert!(pipeline.cleanup());
    }
}
