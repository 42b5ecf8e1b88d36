// SPDX-License-Identifier: GPL-3.0-only

//! Tethered camera controller
//!
//! This library drives a camera attached to the host: it opens a device
//! session, streams decoded live-view frames to a display surface, records
//! the same frames into a paced video file and ingests pictures the device
//! hands over.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Device gateway contract, device lock and the virtual device
//! - [`media`]: Frame buffers, decoders and video writers
//! - [`pipelines`]: Capture loop, display bridge and recording sink
//! - [`session`]: The [`Camera`] controller and transfer ingestor
//! - [`ui`]: UI-affinity task queue
//! - [`config`]: User configuration handling
//! - [`storage`]: Output directories and file naming
//!
//! # Example
//!
//! ```ignore
//! let (ui, dispatcher) = tether_camera::ui::channel();
//! dispatcher.spawn()?;
//! let camera = Camera::builder(DeviceLock::new(VirtualDevice::default()), ui).build();
//! camera.play()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod session;
pub mod storage;
pub mod terminal;
pub mod ui;

// Re-export commonly used types
pub use backends::camera::{DeviceGateway, DeviceLock};
pub use backends::virtual_camera::VirtualDevice;
pub use config::Config;
pub use errors::{CameraError, CameraResult};
pub use session::{Camera, CameraBuilder, SessionState};
