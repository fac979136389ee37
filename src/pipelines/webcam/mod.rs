// SPDX-License-Identifier: GPL-3.0-only

//! Camera → loopback webcam pipeline
//!
//! ```text
//!   gphoto2 --stdout --capture-movie
//!        │  stdout (raw movie stream)
//!        ▼
//!   ffmpeg -i - ... -f v4l2 /dev/videoN
//!        │
//!        ▼
//!   Video Apps (Zoom, Teams, etc.)
//! ```
//!
//! Each process writes stderr into its own [`DiagnosticBuffer`]. The
//! [`Supervisor`] launches the pair, hands it to the [`LivenessMonitor`],
//! and classifies the outcome from the consumer's exit status.

mod monitor;
mod process;
mod types;

pub use monitor::{LivenessMonitor, StartedHook};
pub use process::{DiagnosticBuffer, LaunchError, Pipeline, ProcessHandle, ProcessSpec};
pub use types::{DiagnosticReport, PipelineReport, PipelineState, ProcessRole};

use crate::backends::loopback::DeviceSpec;
use crate::constants;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How the producer and consumer are invoked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Camera model passed to the producer, auto-selected when `None`
    pub camera: Option<String>,
    /// Extra producer arguments, appended after the capture request
    pub producer_args: Vec<String>,
    /// Extra consumer arguments, placed between input and output options
    pub consumer_args: Vec<String>,
}

impl PipelineConfig {
    /// Producer command line: capture request, camera selector, extra args
    pub fn producer_spec(&self, program: &str) -> ProcessSpec {
        let mut args: Vec<String> = constants::producer::CAPTURE_ARGS
            .iter()
            .map(|arg| arg.to_string())
            .collect();
        if let Some(camera) = &self.camera {
            args.push(constants::producer::CAMERA_FLAG.to_string());
            args.push(camera.clone());
        }
        args.extend(self.producer_args.iter().cloned());
        ProcessSpec::new(ProcessRole::Producer, program, args)
    }

    /// Consumer command line: stdin input, extra args, v4l2 output to the device node
    pub fn consumer_spec(&self, program: &str, device: &DeviceSpec) -> ProcessSpec {
        let mut args: Vec<String> = constants::consumer::INPUT_ARGS
            .iter()
            .map(|arg| arg.to_string())
            .collect();
        args.extend(self.consumer_args.iter().cloned());
        args.extend(
            constants::consumer::OUTPUT_ARGS
                .iter()
                .map(|arg| arg.to_string()),
        );
        args.push(device.node_path().display().to_string());
        ProcessSpec::new(ProcessRole::Consumer, program, args)
    }
}

/// Timing knobs for one supervised run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTiming {
    /// Grace period before the startup check
    pub warmup: Duration,
    /// Liveness poll interval after warm-up
    pub poll_interval: Duration,
    /// How long to wait for processes to exit after the consumer ends or after SIGTERM
    pub reap_grace: Duration,
}

impl Default for SupervisorTiming {
    fn default() -> Self {
        Self {
            warmup: constants::timing::WARMUP,
            poll_interval: constants::timing::POLL_INTERVAL,
            reap_grace: constants::timing::REAP_GRACE,
        }
    }
}

/// Runs exactly one pipeline to a terminal state
pub struct Supervisor {
    monitor: LivenessMonitor,
    reap_grace: Duration,
}

impl Supervisor {
    pub fn new(timing: SupervisorTiming) -> Self {
        Self {
            monitor: LivenessMonitor::new(timing.warmup, timing.poll_interval),
            reap_grace: timing.reap_grace,
        }
    }

    /// Call `hook` once when the pipeline survives its warm-up
    pub fn with_started_hook(mut self, hook: StartedHook) -> Self {
        self.monitor = self.monitor.with_started_hook(hook);
        self
    }

    /// Run until the pipeline ends or SIGINT/SIGTERM arrives
    pub async fn run(&self, producer: &ProcessSpec, consumer: &ProcessSpec) -> PipelineReport {
        self.run_until(producer, consumer, shutdown_signal()).await
    }

    /// Run until the pipeline ends or `shutdown` completes
    ///
    /// The returned report is always in a terminal state. Dropping this future
    /// early still cleans up, through the pipeline's `Drop`.
    pub async fn run_until<F>(
        &self,
        producer: &ProcessSpec,
        consumer: &ProcessSpec,
        shutdown: F,
    ) -> PipelineReport
    where
        F: Future<Output = ()>,
    {
        let mut pipeline = Pipeline::new();

        if let Err(err) = pipeline.launch(producer, consumer) {
            error!(error = %err, "Pipeline launch failed");
            return self.finish_launch_failure(pipeline, err).await;
        }

        let interrupted = tokio::select! {
            _ = shutdown => true,
            _ = self.monitor.run(&mut pipeline) => false,
        };

        if interrupted {
            self.finish_terminated(pipeline).await
        } else {
            self.finish_exited(pipeline).await
        }
    }

    /// SIGTERM, wait out the grace period, then SIGKILL whatever is left
    async fn stop(&self, pipeline: &mut Pipeline) {
        pipeline.cleanup();
        pipeline.reap(self.reap_grace).await;
        if pipeline.kill_remaining() {
            warn!("Pipeline processes ignored SIGTERM, killed");
            pipeline.reap(self.reap_grace).await;
        }
    }

    async fn finish_launch_failure(
        &self,
        mut pipeline: Pipeline,
        err: LaunchError,
    ) -> PipelineReport {
        pipeline.transition(PipelineState::Failed);

        let mut diagnostics: Vec<DiagnosticReport> = pipeline
            .drain_diagnostics()
            .into_iter()
            .filter(|report| report.non_empty)
            .collect();
        diagnostics.push(DiagnosticReport::new(err.role, err.to_string().into_bytes()));

        self.stop(&mut pipeline).await;

        PipelineReport {
            state: pipeline.state(),
            started: false,
            consumer_exit: None,
            diagnostics,
        }
    }

    async fn finish_terminated(&self, mut pipeline: Pipeline) -> PipelineReport {
        info!("Shutdown requested, stopping pipeline");
        pipeline.transition(PipelineState::Terminated);
        self.stop(&mut pipeline).await;

        PipelineReport {
            state: pipeline.state(),
            started: pipeline.started(),
            consumer_exit: None,
            diagnostics: Vec::new(),
        }
    }

    async fn finish_exited(&self, mut pipeline: Pipeline) -> PipelineReport {
        let consumer_status = match pipeline.consumer_mut() {
            Some(consumer) => consumer.wait_timeout(self.reap_grace).await,
            None => None,
        };
        // The producer normally follows on its own once its stdout reader is gone
        if let Some(producer) = pipeline.producer_mut()
            && producer.wait_timeout(self.reap_grace).await.is_none()
        {
            debug!("Producer outlived the consumer");
        }

        let exit_code = consumer_status.and_then(|status| status.code());
        let next = match exit_code {
            Some(0) => PipelineState::Succeeded,
            Some(_) => PipelineState::Failed,
            None => PipelineState::Terminated,
        };

        let diagnostics = if next == PipelineState::Failed {
            pipeline
                .drain_diagnostics()
                .into_iter()
                .filter(|report| report.non_empty)
                .collect()
        } else {
            Vec::new()
        };

        pipeline.transition(next);
        self.stop(&mut pipeline).await;

        match next {
            PipelineState::Succeeded => info!("Pipeline finished"),
            PipelineState::Failed => {
                warn!(?exit_code, reports = diagnostics.len(), "Pipeline failed")
            }
            _ => warn!(status = ?consumer_status, "Consumer was killed"),
        }

        PipelineReport {
            state: pipeline.state(),
            started: pipeline.started(),
            consumer_exit: exit_code,
            diagnostics,
        }
    }
}

/// Completes on SIGINT or SIGTERM
///
/// The handlers are installed when this is called rather than on first poll,
/// so a signal arriving while the pipeline is being spawned is not lost.
/// Must be called from within a tokio runtime.
pub fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{SignalKind, signal};

    let interrupt = signal(SignalKind::interrupt());
    let terminate = signal(SignalKind::terminate());

    async move {
        let interrupt = async {
            match interrupt {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to listen for SIGINT");
                    std::future::pending::<()>().await;
                }
            }
        };
        let terminate = async {
            match terminate {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = interrupt => debug!("Received SIGINT"),
            _ = terminate => debug!("Received SIGTERM"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(index: u32) -> DeviceSpec {
        DeviceSpec::new(index, "GPhoto2 Webcam")
    }

    #[test]
    fn producer_spec_places_camera_before_extra_args() {
        let config = PipelineConfig {
            camera: Some("Nikon DSC D5300".into()),
            producer_args: vec!["--debug".into()],
            consumer_args: Vec::new(),
        };
        let spec = config.producer_spec("gphoto2");
        assert_eq!(spec.role, ProcessRole::Producer);
        assert_eq!(
            spec.args,
            ["--stdout", "--capture-movie", "--camera", "Nikon DSC D5300", "--debug"]
        );
    }

    #[test]
    fn producer_spec_without_camera() {
        let spec = PipelineConfig::default().producer_spec("gphoto2");
        assert_eq!(spec.command_line(), "gphoto2 --stdout --capture-movie");
    }

    #[test]
    fn consumer_spec_targets_the_device_node() {
        let config = PipelineConfig {
            consumer_args: vec!["-vf".into(), "hflip".into()],
            ..Default::default()
        };
        let spec = config.consumer_spec("ffmpeg", &device(3));
        assert_eq!(spec.role, ProcessRole::Consumer);
        assert_eq!(spec.args.last().map(String::as_str), Some("/dev/video3"));

        let input = spec.args.iter().position(|a| a == "-i").unwrap();
        let extra = spec.args.iter().position(|a| a == "hflip").unwrap();
        let format = spec.args.iter().position(|a| a == "v4l2").unwrap();
        assert!(input < extra && extra < format);
        assert_eq!(spec.args[input + 1], "-");
    }
}
