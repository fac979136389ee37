// SPDX-License-Identifier: GPL-3.0-only

//! Command-line run of the webcam pipeline
//!
//! Order of operations:
//! - Check that every required program is installed
//! - Detect the camera
//! - Provision the loopback device
//! - Supervise the pipeline until it ends or a signal arrives

use tethercam::backends::camera::{detect_cameras, resolve_camera};
use tethercam::backends::loopback::DeviceManager;
use tethercam::config::Config;
use tethercam::constants::PROGRAM_NAME;
use tethercam::dependencies::check_dependencies;
use tethercam::errors::{AppError, AppResult};
use tethercam::pipelines::webcam::{PipelineConfig, Supervisor};
use tracing::info;

/// Run one pipeline to completion
pub fn run(config: Config) -> AppResult<()> {
    check_dependencies(config.required_tools())?;

    let cameras = detect_cameras(&config.producer_program)?;
    let camera = resolve_camera(config.pipeline.camera.as_deref(), &cameras)?;
    let pipeline = PipelineConfig {
        camera,
        ..config.pipeline.clone()
    };

    DeviceManager::system().ensure_device(&config.device)?;

    let producer = pipeline.producer_spec(&config.producer_program);
    let consumer = pipeline.consumer_spec(&config.consumer_program, &config.device);
    info!(producer = %producer.command_line(), consumer = %consumer.command_line(), "Starting pipeline");

    let device_path = config.device.node_path();
    println!("Streaming to {} (press Ctrl+C to stop)", device_path.display());

    let supervisor = Supervisor::new(config.timing).with_started_hook(Box::new(move || {
        println!("Started successfully, {} is live", device_path.display());
    }));

    // Create async runtime for the supervisor
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| AppError::Other(format!("Failed to start async runtime: {}", e)))?;
    let report = rt.block_on(supervisor.run(&producer, &consumer));

    report.into_result()
}

/// Write `err` and any attached diagnostics to stderr
pub fn report_error(err: &AppError) {
    eprintln!("{}: {}", PROGRAM_NAME, err);
    for report in err.diagnostics() {
        for line in report.text().lines() {
            eprintln!("{}: [{}] {}", PROGRAM_NAME, report.source, line);
        }
    }
}
