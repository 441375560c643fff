// SPDX-License-Identifier: GPL-3.0-only

//! Host adapters
//!
//! - [`pipewire`]: snapshot of sinks, sources, cards and playback streams
//! - [`pactl`]: helper module loading for the module coordinator

pub mod pactl;
pub mod pipewire;

pub use pactl::PactlModuleHost;
pub use pipewire::{ClientSnapshot, HostSnapshot, StreamSnapshot};
