// SPDX-License-Identifier: GPL-3.0-only

//! Live-view frame pipeline
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌────────────────┐
//! │ Capture loop │ ──▶ │ Display bridge│ ──▶ │ Refresh tick   │
//! │ (own thread) │     │ (latest wins) │     │ (UI thread)    │
//! └──────┬───────┘     └───────────────┘     └────────────────┘
//!        │
//!        │             ┌───────────────┐     ┌────────────────┐
//!        └───────────▶ │ Recording sink│ ──▶ │ Video writer   │
//!                      │ (paced)       │     │                │
//!                      └───────────────┘     └────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`capture`]: Live-view capture loop
//! - [`display`]: Display surface and single-slot frame handoff
//! - [`video`]: Paced recording sink

pub mod capture;
pub mod display;
pub mod video;
