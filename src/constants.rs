// SPDX-License-Identifier: GPL-3.0-only

//! Engine-wide constants and rule flag sets

use bitflags::bitflags;
use tracing::warn;

/// Group assigned to streams that no rule claims
pub const DEFAULT_GROUP_NAME: &str = "othermedia";

/// Number of priority slots a card rule can carry
pub const CARD_MAX_SLOTS: usize = 2;

/// Target key that selects the object's own name instead of a property
pub const NAME_TARGET: &str = "(name)";

/// Property used as the display name of streams
pub const PROP_MEDIA_NAME: &str = "media.name";

/// Property carrying the client binary for client-less streams
pub const PROP_PROCESS_BINARY: &str = "application.process.binary";

/// Property carrying the application id of a stream
pub const PROP_APPLICATION_ID: &str = "application.id";

bitflags! {
    /// Flags of a `[device]` rule
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFlags: u32 {
        /// Do not publish state changes of this type
        const DISABLE_NOTIFY = 0x0001;
        /// Set the port even when it looks unchanged
        const REFRESH_PORT_ALWAYS = 0x0002;
        /// Apply port changes after the rule's delay
        const DELAYED_PORT_CHANGE = 0x0004;
        /// Unload the helper module synchronously instead of requesting it
        const MODULE_UNLOAD_IMMEDIATELY = 0x0008;
    }
}

bitflags! {
    /// Flags of a `[card]` rule slot
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CardFlags: u32 {
        const DISABLE_NOTIFY = 0x0001;
        const NOTIFY_PROFILE_CHANGED = 0x0002;
    }
}

bitflags! {
    /// Flags of a `[stream]` rule, handed back with the resolved group
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamFlags: u32 {
        /// The group routes to its own port
        const LOCAL_ROUTE = 0x0001;
        const LOCAL_MUTE = 0x0002;
        const LOCAL_VOLMAX = 0x0004;
    }
}

const DEVICE_FLAG_NAMES: &[(&str, DeviceFlags)] = &[
    ("disable_notify", DeviceFlags::DISABLE_NOTIFY),
    ("refresh_always", DeviceFlags::REFRESH_PORT_ALWAYS),
    ("delayed_port_change", DeviceFlags::DELAYED_PORT_CHANGE),
    (
        "module_unload_immediately",
        DeviceFlags::MODULE_UNLOAD_IMMEDIATELY,
    ),
];

const CARD_FLAG_NAMES: &[(&str, CardFlags)] = &[
    ("disable_notify", CardFlags::DISABLE_NOTIFY),
    ("notify_profile_changed", CardFlags::NOTIFY_PROFILE_CHANGED),
];

const STREAM_FLAG_NAMES: &[(&str, StreamFlags)] = &[
    ("mute_if_active", StreamFlags::LOCAL_MUTE),
    ("max_volume", StreamFlags::LOCAL_VOLMAX),
];

/// Fold flag names into a flag set, skipping unknown names with a warning
fn parse_names<F, I, S>(names: I, table: &[(&str, F)], section: &str) -> F
where
    F: Copy + Default + std::ops::BitOr<Output = F>,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().fold(F::default(), |flags, name| {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return flags;
        }
        match table.iter().find(|(n, _)| *n == name) {
            Some((_, flag)) => flags | *flag,
            None => {
                warn!(flag = %name, section, "invalid flag");
                flags
            }
        }
    })
}

impl DeviceFlags {
    /// Parse `[device]` flag names (e.g. `delayed_port_change`)
    pub fn from_names<I: IntoIterator<Item = S>, S: AsRef<str>>(names: I) -> Self {
        parse_names(names, DEVICE_FLAG_NAMES, "device")
    }
}

impl CardFlags {
    /// Parse `[card]` flag names (e.g. `notify_profile_changed`)
    pub fn from_names<I: IntoIterator<Item = S>, S: AsRef<str>>(names: I) -> Self {
        parse_names(names, CARD_FLAG_NAMES, "card")
    }
}

impl StreamFlags {
    /// Parse `[stream]` flag names (e.g. `mute_if_active`)
    pub fn from_names<I: IntoIterator<Item = S>, S: AsRef<str>>(names: I) -> Self {
        parse_names(names, STREAM_FLAG_NAMES, "stream")
    }
}
