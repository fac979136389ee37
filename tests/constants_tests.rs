// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use std::time::Duration;
use tethercam::constants::{consumer, producer, timing, tools};

#[test]
fn test_consumer_reads_stdin() {
    let input = consumer::INPUT_ARGS;
    let position = input.iter().position(|arg| *arg == "-i").unwrap();
    assert_eq!(input[position + 1], "-");
}

#[test]
fn test_consumer_writes_v4l2() {
    let output = consumer::OUTPUT_ARGS;
    assert_eq!(output[output.len() - 2..], ["-f", "v4l2"]);
}

#[test]
fn test_producer_streams_to_stdout() {
    assert!(producer::CAPTURE_ARGS.contains(&"--stdout"));
    assert!(producer::CAPTURE_ARGS.contains(&"--capture-movie"));
}

#[test]
fn test_poll_is_shorter_than_warmup() {
    assert!(timing::POLL_INTERVAL < timing::WARMUP);
    assert!(timing::REAP_GRACE > Duration::ZERO);
    assert!(timing::DROP_POLL < timing::DROP_GRACE);
}

#[test]
fn test_required_tools_are_unique() {
    let mut required = tools::REQUIRED.to_vec();
    required.sort_unstable();
    required.dedup();
    assert_eq!(required.len(), tools::REQUIRED.len());
}
