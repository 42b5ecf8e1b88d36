// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for tethered devices
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Session / Pipelines              │
//! └────────────────────┬────────────────────────┘
//!                      │  DeviceLock
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                  │
//! │  ┌──────────────────┐  ┌────────────────┐   │
//! │  │  DeviceGateway   │◀─│ VirtualDevice  │   │
//! │  │     (trait)      │  │  (in process)  │   │
//! │  └──────────────────┘  └────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Gateway contract, device lock, property mirror and capture thread
//! - [`virtual_camera`]: Simulated device for tests and the command-line demo

pub mod camera;
pub mod virtual_camera;
