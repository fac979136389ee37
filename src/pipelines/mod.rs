// SPDX-License-Identifier: GPL-3.0-only

//! Supervised process pipelines
//!
//! ```text
//! ┌──────────────┐  stdout → stdin  ┌───────────────────┐     ┌──────────────┐
//! │   Producer   │ ───────────────▶ │     Consumer      │ ──▶ │ /dev/videoN  │
//! │  (gphoto2)   │                  │     (ffmpeg)      │     │ (loopback)   │
//! └──────┬───────┘                  └─────────┬─────────┘     └──────────────┘
//!        │ stderr                             │ stderr
//!        ▼                                    ▼
//!  diagnostic buffer                   diagnostic buffer
//! ```
//!
//! # Modules
//!
//! - [`webcam`]: camera → loopback pipeline, liveness monitor and cleanup

pub mod webcam;
