// SPDX-License-Identifier: GPL-3.0-only

use clap::error::ErrorKind;
use clap::{Arg, ArgAction, CommandFactory, FromArgMatches, Parser};
use std::process::ExitCode;
use tethercam::config::{Config, parse_device_index};
use tethercam::constants::{self, device};

mod cli;

#[derive(Parser)]
#[command(name = "tethercam")]
#[command(about = "Use a tethered camera as a virtual webcam")]
#[command(
    long_about = "Streams the camera's movie capture through ffmpeg into a v4l2loopback \
                  device, creating the device first if needed."
)]
struct Cli {
    /// Camera model to use (as listed by 'gphoto2 --auto-detect')
    #[arg(short, long)]
    camera: Option<String>,

    /// Loopback device index, the stream goes to /dev/video<N>
    #[arg(short, long, default_value_t = device::DEFAULT_INDEX, value_parser = parse_device_index)]
    device: u32,

    /// Card label for a newly created loopback device
    #[arg(short, long)]
    label: Option<String>,

    /// Extra gphoto2 arguments, e.g. "--set-config iso=800"
    #[arg(short, long = "gphoto-args", allow_hyphen_values = true)]
    gphoto_args: Option<String>,

    /// Extra ffmpeg arguments, e.g. "-vf hflip"
    #[arg(short, long = "ffmpeg-args", allow_hyphen_values = true)]
    ffmpeg_args: Option<String>,
}

fn parse_cli() -> Result<Cli, ExitCode> {
    // -v instead of clap's default -V, matching the short flags above
    let command = Cli::command()
        .version(constants::VERSION)
        .disable_version_flag(true)
        .arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .help("Print version")
                .action(ArgAction::Version),
        );

    let parsed = command
        .try_get_matches()
        .and_then(|matches| Cli::from_arg_matches(&matches));

    match parsed {
        Ok(cli) => Ok(cli),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            Err(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprint!("{}: {}", constants::PROGRAM_NAME, e);
            Err(ExitCode::FAILURE)
        }
    }
}

fn main() -> ExitCode {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=tethercam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();

    let cli = match parse_cli() {
        Ok(cli) => cli,
        Err(code) => return code,
    };

    let config = match Config::from_args(
        cli.device,
        cli.label.as_deref(),
        cli.camera.as_deref(),
        cli.gphoto_args.as_deref(),
        cli.ffmpeg_args.as_deref(),
    ) {
        Ok(config) => config,
        Err(err) => {
            cli::report_error(&err);
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    match cli::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            cli::report_error(&err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
