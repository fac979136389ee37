// SPDX-License-Identifier: GPL-3.0-only

//! Liveness monitoring for a running pipeline

use super::process::Pipeline;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Hook invoked once when the pipeline survives its warm-up
pub type StartedHook = Box<dyn Fn() + Send + Sync>;

/// Watches the pipeline processes after launch
pub struct LivenessMonitor {
    warmup: Duration,
    poll_interval: Duration,
    on_started: Option<StartedHook>,
}

impl LivenessMonitor {
    pub fn new(warmup: Duration, poll_interval: Duration) -> Self {
        Self {
            warmup,
            poll_interval,
            on_started: None,
        }
    }

    pub fn with_started_hook(mut self, hook: StartedHook) -> Self {
        self.on_started = Some(hook);
        self
    }

    /// Wait out the warm-up, then report whether both processes survived it
    ///
    /// A `true` result marks the pipeline as started and fires the hook.
    /// This is observational only and never stops the pipeline.
    pub async fn await_startup(&self, pipeline: &mut Pipeline) -> bool {
        tokio::time::sleep(self.warmup).await;

        if !pipeline.all_alive() {
            warn!(warmup = ?self.warmup, "Pipeline did not survive warm-up");
            return false;
        }

        if !pipeline.started() {
            pipeline.mark_started();
            info!("Pipeline started successfully");
            if let Some(hook) = &self.on_started {
                hook();
            }
        }
        true
    }

    /// Poll until the consumer is gone
    pub async fn watch(&self, pipeline: &mut Pipeline) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut polls: u64 = 0;
        loop {
            interval.tick().await;
            polls += 1;
            if !pipeline.consumer_alive() {
                debug!(polls, "Consumer no longer alive");
                return;
            }
        }
    }

    /// Warm-up check followed by the indefinite watch
    pub async fn run(&self, pipeline: &mut Pipeline) {
        self.await_startup(pipeline).await;
        self.watch(pipeline).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::webcam::{ProcessRole, ProcessSpec};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sh(role: ProcessRole, script: &str) -> ProcessSpec {
        ProcessSpec::new(role, "sh", vec!["-c".into(), script.into()])
    }

    fn counting_monitor(counter: &Arc<AtomicUsize>) -> LivenessMonitor {
        let counter = Arc::clone(counter);
        LivenessMonitor::new(Duration::from_millis(100), Duration::from_millis(20))
            .with_started_hook(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
    }

    #[tokio::test]
    async fn notifies_once_when_both_survive_warmup() {
        let count = Arc::new(AtomicUsize::new(0));
        let monitor = counting_monitor(&count);
        let mut pipeline = Pipeline::new();
        pipeline
            .launch(
                &sh(ProcessRole::Producer, "sleep 30"),
                &sh(ProcessRole::Consumer, "sleep 30"),
            )
            .unwrap();

        assert!(monitor.await_startup(&mut pipeline).await);
        assert!(monitor.await_startup(&mut pipeline).await);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(pipeline.started());
    }

    #[tokio::test]
    async fn no_notification_when_consumer_dies_early() {
        let count = Arc::new(AtomicUsize::new(0));
        let monitor = counting_monitor(&count);
        let mut pipeline = Pipeline::new();
        pipeline
            .launch(
                &sh(ProcessRole::Producer, "sleep 30"),
                &sh(ProcessRole::Consumer, "exit 1"),
            )
            .unwrap();

        assert!(!monitor.await_startup(&mut pipeline).await);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!pipeline.started());
    }

    #[tokio::test]
    async fn watch_returns_once_consumer_exits() {
        let monitor = LivenessMonitor::new(Duration::ZERO, Duration::from_millis(20));
        let mut pipeline = Pipeline::new();
        pipeline
            .launch(
                &sh(ProcessRole::Producer, "sleep 30"),
                &sh(ProcessRole::Consumer, "sleep 0.2"),
            )
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), monitor.watch(&mut pipeline))
            .await
            .expect("watch should end when the consumer exits");
        assert!(!pipeline.consumer_alive());
    }
}
