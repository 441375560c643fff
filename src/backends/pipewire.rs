// SPDX-License-Identifier: GPL-3.0-only

//! Host object snapshot from PipeWire
//!
//! Reads the `pw-dump` JSON and turns audio nodes, devices and clients into
//! the engine's host objects.

use crate::classify::{Availability, CardNode, ClientInfo, DeviceNode, DeviceState, Proplist, StreamNode};
use crate::constants::PROP_APPLICATION_ID;
use crate::errors::{PolicyError, PolicyResult};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

const TYPE_NODE: &str = "PipeWire:Interface:Node";
const TYPE_DEVICE: &str = "PipeWire:Interface:Device";
const TYPE_CLIENT: &str = "PipeWire:Interface:Client";

/// Client owning a stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub name: String,
    pub app_id: Option<String>,
    pub uid: Option<u32>,
    pub exe: Option<String>,
}

impl ClientSnapshot {
    pub fn info(&self) -> ClientInfo<'_> {
        ClientInfo {
            name: &self.name,
            app_id: self.app_id.as_deref(),
            uid: self.uid,
            exe: self.exe.as_deref(),
        }
    }
}

/// Playback stream with its client, if any
#[derive(Debug, Clone)]
pub struct StreamSnapshot {
    pub id: u64,
    pub node: StreamNode,
    pub client: Option<ClientSnapshot>,
}

/// Audio objects known to the server at one point in time
#[derive(Debug, Clone, Default)]
pub struct HostSnapshot {
    pub sinks: Vec<DeviceNode>,
    pub sources: Vec<DeviceNode>,
    pub cards: Vec<CardNode>,
    pub streams: Vec<StreamSnapshot>,
}

impl HostSnapshot {
    /// Run `pw-dump` and parse its output
    pub fn capture() -> PolicyResult<Self> {
        let output = Command::new("pw-dump")
            .output()
            .map_err(|e| PolicyError::Io(format!("Failed to run pw-dump: {}", e)))?;

        if !output.status.success() {
            return Err(PolicyError::Other(format!(
                "pw-dump exited with {}",
                output.status
            )));
        }

        let stdout = std::str::from_utf8(&output.stdout)
            .map_err(|e| PolicyError::Other(format!("Failed to read pw-dump output: {}", e)))?;

        parse_dump(stdout)
    }

    /// Parse a saved `pw-dump` file
    pub fn from_file(path: &Path) -> PolicyResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PolicyError::Io(format!("{}: {}", path.display(), e)))?;
        parse_dump(&text)
    }
}

fn props_of(object: &Value) -> Option<&serde_json::Map<String, Value>> {
    object.get("info")?.get("props")?.as_object()
}

fn proplist_from(props: &serde_json::Map<String, Value>) -> Proplist {
    props
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), value))
        })
        .collect()
}

fn str_prop<'a>(props: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    props.get(key).and_then(Value::as_str)
}

fn number_prop(props: &serde_json::Map<String, Value>, key: &str) -> Option<u64> {
    match props.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn device_state(object: &Value) -> DeviceState {
    match object
        .get("info")
        .and_then(|info| info.get("state"))
        .and_then(Value::as_str)
    {
        Some("running") => DeviceState::Running,
        Some("suspended") => DeviceState::Suspended,
        _ => DeviceState::Idle,
    }
}

fn card_profiles(object: &Value) -> Vec<(String, Availability)> {
    let Some(profiles) = object
        .get("info")
        .and_then(|info| info.get("params"))
        .and_then(|params| params.get("EnumProfile"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    profiles
        .iter()
        .filter_map(|profile| {
            let name = profile.get("name").and_then(Value::as_str)?;
            let available = profile
                .get("available")
                .and_then(Value::as_str)
                .map(Availability::from_host)
                .unwrap_or_default();
            Some((name.to_string(), available))
        })
        .collect()
}

fn client_from(props: &serde_json::Map<String, Value>) -> ClientSnapshot {
    ClientSnapshot {
        name: str_prop(props, "application.name")
            .or_else(|| str_prop(props, "client.name"))
            .unwrap_or("")
            .to_string(),
        app_id: str_prop(props, PROP_APPLICATION_ID).map(str::to_string),
        uid: number_prop(props, "pipewire.sec.uid").and_then(|uid| u32::try_from(uid).ok()),
        exe: str_prop(props, "application.process.binary").map(str::to_string),
    }
}

/// Parse `pw-dump` output
pub fn parse_dump(text: &str) -> PolicyResult<HostSnapshot> {
    let objects: Vec<Value> = serde_json::from_str(text)?;
    let mut snapshot = HostSnapshot::default();

    // First pass: clients, so streams can be linked to them
    let mut clients: HashMap<u64, ClientSnapshot> = HashMap::new();
    for object in &objects {
        if object.get("type").and_then(Value::as_str) != Some(TYPE_CLIENT) {
            continue;
        }
        let (Some(id), Some(props)) = (object.get("id").and_then(Value::as_u64), props_of(object))
        else {
            continue;
        };
        clients.insert(id, client_from(props));
    }

    for object in &objects {
        let Some(kind) = object.get("type").and_then(Value::as_str) else {
            continue;
        };
        let Some(props) = props_of(object) else {
            continue;
        };
        let media_class = str_prop(props, "media.class").unwrap_or("");

        match kind {
            TYPE_NODE => {
                let Some(name) = str_prop(props, "node.name") else {
                    warn!(?object, "audio node without a name");
                    continue;
                };

                match media_class {
                    "Audio/Sink" => {
                        let mut sink = DeviceNode::sink(name).with_state(device_state(object));
                        sink.properties = proplist_from(props);
                        debug!(sink = %sink.name, state = ?sink.state, "found sink");
                        snapshot.sinks.push(sink);
                    }
                    "Audio/Source" => {
                        let mut source = DeviceNode::source(name).with_state(device_state(object));
                        source.properties = proplist_from(props);
                        debug!(source = %source.name, state = ?source.state, "found source");
                        snapshot.sources.push(source);
                    }
                    "Stream/Output/Audio" => {
                        let client = number_prop(props, "client.id")
                            .and_then(|id| clients.get(&id))
                            .cloned();
                        let id = object.get("id").and_then(Value::as_u64).unwrap_or_default();
                        debug!(stream = id, client = ?client, "found playback stream");
                        snapshot.streams.push(StreamSnapshot {
                            id,
                            node: StreamNode::playback(proplist_from(props)),
                            client,
                        });
                    }
                    _ => {}
                }
            }
            TYPE_DEVICE if media_class == "Audio/Device" => {
                let Some(name) = str_prop(props, "device.name") else {
                    continue;
                };
                let mut card = CardNode::new(name);
                card.properties = proplist_from(props);
                for (profile, available) in card_profiles(object) {
                    card = card.with_profile(profile, available);
                }
                debug!(card = %card.name, profiles = card.profiles.len(), "found card");
                snapshot.cards.push(card);
            }
            _ => {}
        }
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ProfileCatalog;

    const DUMP: &str = r#"[
        { "id": 30, "type": "PipeWire:Interface:Client",
          "info": { "props": { "application.name": "mpv", "pipewire.sec.uid": 1000,
                               "application.process.binary": "mpv" } } },
        { "id": 41, "type": "PipeWire:Interface:Device",
          "info": { "props": { "device.name": "bluez_card.XX", "media.class": "Audio/Device" },
                    "params": { "EnumProfile": [
                        { "index": 1, "name": "a2dp-sink", "available": "no" },
                        { "index": 2, "name": "headset-head-unit", "available": "yes" } ] } } },
        { "id": 52, "type": "PipeWire:Interface:Node",
          "info": { "state": "running",
                    "props": { "node.name": "alsa_output.pci.analog-stereo", "media.class": "Audio/Sink" } } },
        { "id": 53, "type": "PipeWire:Interface:Node",
          "info": { "state": "suspended",
                    "props": { "node.name": "alsa_input.pci.analog-stereo", "media.class": "Audio/Source" } } },
        { "id": 60, "type": "PipeWire:Interface:Node",
          "info": { "props": { "media.class": "Stream/Output/Audio", "node.name": "mpv",
                               "media.role": "Music", "client.id": 30 } } }
    ]"#;

    #[test]
    fn test_parse_dump() {
        let snapshot = parse_dump(DUMP).unwrap();

        assert_eq!(snapshot.sinks.len(), 1);
        assert!(snapshot.sinks[0].is_running());
        assert_eq!(snapshot.sources[0].state, DeviceState::Suspended);

        let card = &snapshot.cards[0];
        assert_eq!(card.availability("a2dp-sink"), Some(Availability::No));
        assert_eq!(card.availability("off"), None);

        let stream = &snapshot.streams[0];
        let client = stream.client.as_ref().unwrap();
        assert_eq!(client.name, "mpv");
        assert_eq!(client.uid, Some(1000));
        assert_eq!(stream.node.properties.get("media.role"), Some("Music"));
    }

    #[test]
    fn test_parse_dump_rejects_garbage() {
        assert!(matches!(parse_dump("not json"), Err(PolicyError::Config(_))));
    }
}
