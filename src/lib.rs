// SPDX-License-Identifier: GPL-3.0-only

//! Audio policy classification engine
//!
//! Sorts the audio objects of a sound server into policy categories: sinks and
//! sources get device type labels, cards get type labels with a preferred
//! profile, and playback streams are assigned to a policy group.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`classify`]: Rule tables, predicates and the [`Classifier`] façade
//! - [`config`]: Engine settings and the JSON rule set loader
//! - [`backends`]: PipeWire snapshot and `pactl` module host
//! - [`constants`]: Rule flag sets and fixed names
//! - [`variables`]: Configuration variable substitution
//!
//! # Example
//!
//! ```
//! use audio_policy::classify::{Classifier, ClientInfo, Proplist, StaticGroups};
//!
//! let mut classifier = Classifier::default();
//! classifier.register_app_id("org.example.Player", None, "player").unwrap();
//!
//! let client = ClientInfo {
//!     name: "player",
//!     app_id: Some("org.example.Player"),
//!     ..ClientInfo::default()
//! };
//! let mut properties = Proplist::new();
//! let group = classifier.resolve_stream_group(Some(&client), &mut properties, &StaticGroups);
//! assert_eq!(group.group, "player");
//! ```

pub mod backends;
pub mod classify;
pub mod config;
pub mod constants;
pub mod errors;
pub mod variables;

// Re-export commonly used types
pub use classify::{Classifier, ClassificationResult, Direction, PolicyObject, StreamGroup};
pub use config::{EngineConfig, LoadReport, RuleSet};
pub use errors::{PolicyError, PolicyResult};
