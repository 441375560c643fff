// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for rule set loading

use audio_policy::classify::{CardNode, ClientInfo, DeviceNode, Direction, Proplist};
use audio_policy::config::{EngineConfig, RuleSet, default_rules_path};
use audio_policy::constants::{CardFlags, DeviceFlags, StreamFlags};
use audio_policy::errors::PolicyError;
use std::path::PathBuf;

const RULES: &str = r#"{
    "engine": { "default_group": "othermedia" },
    "variables": { "$bt": "bluez_card.XX" },
    "groups": [
        { "name": "player" },
        { "name": "btplayer", "dynamic": true, "running": true }
    ],
    "sinks": [
        {
            "type": "headset",
            "predicate": "startswith:alsa_output.headset",
            "module": { "name": "module-loopback" },
            "flags": ["delayed_port_change"],
            "port_change_delay_ms": 200
        },
        {
            "type": "ihf",
            "predicate": "matches:alsa_output\\.(ihf|speaker).*",
            "ports": [ { "port": "output-speaker", "predicate": "equals:alsa_output.speaker" } ]
        },
        { "type": "broken", "predicate": "matches:(" }
    ],
    "sources": [
        { "type": "mic", "predicate": "device.form_factor@equals:microphone" }
    ],
    "cards": [
        {
            "type": "bt",
            "slots": [
                { "predicate": "equals:$bt", "profile": "a2dp" },
                { "predicate": "equals:$bt", "profile": "hsp", "flags": ["notify_profile_changed"] }
            ]
        },
        { "type": "wildcard", "slots": [ { "predicate": "true" } ] }
    ],
    "streams": [
        {
            "predicate": "media.role@equals:music",
            "group": "player",
            "flags": ["mute_if_active"],
            "properties": "policy.tag=music"
        },
        { "exe": "/usr/bin/navi", "group": "navigator" },
        { "client": "nothing-else", "group": "invalid" }
    ],
    "app_ids": [
        { "app_id": "org.example.Dialer", "predicate": "media.role@equals:phone", "group": "call" },
        { "app_id": "org.example.Bad", "predicate": "nonsense", "group": "call" }
    ]
}"#;

fn write_fixture(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "audio-policy-{}-{}.json",
        name,
        std::process::id()
    ));
    std::fs::write(&path, contents).expect("fixture should be writable");
    path
}

#[test]
fn test_engine_config_default() {
    let config = EngineConfig::default();
    assert_eq!(
        config.default_group, "othermedia",
        "Default group should be othermedia"
    );
}

#[test]
fn test_default_rules_path() {
    let path = default_rules_path();
    assert!(
        path.ends_with("audio-policy/rules.json"),
        "Rule set should live under the audio-policy config folder"
    );
}

#[test]
fn test_load_and_apply() {
    let path = write_fixture("apply", RULES);
    let rules = RuleSet::load(&path).expect("rule set should load");
    let _ = std::fs::remove_file(&path);

    let (classifier, report) = rules.build();

    let rejected: Vec<(&str, &str)> = report
        .rejected
        .iter()
        .map(|r| (r.section, r.label.as_str()))
        .collect();
    assert_eq!(
        rejected,
        vec![
            ("sink", "broken"),
            ("card", "wildcard"),
            ("stream", "invalid"),
            ("app-id", "org.example.Bad"),
        ]
    );
    assert_eq!(report.applied, 7);

    let headset = DeviceNode::sink("alsa_output.headset.0");
    assert_eq!(
        classifier.classify_sink(&headset, DeviceFlags::empty(), DeviceFlags::empty()),
        ["headset"]
    );
    let data = classifier.is_sink_typeof(&headset, "headset").unwrap();
    assert_eq!(data.flags(), DeviceFlags::DELAYED_PORT_CHANGE);
    assert_eq!(data.port_change_delay().as_millis(), 200);

    let speaker = DeviceNode::sink("alsa_output.speaker");
    assert!(classifier.is_port_sink_typeof(&speaker, "ihf").is_some());

    let mic = DeviceNode::source("alsa_input.0").with_property("device.form_factor", "microphone");
    assert_eq!(
        classifier.classify_source(&mic, DeviceFlags::empty(), DeviceFlags::empty()),
        ["mic"]
    );

    let card = CardNode::new("bluez_card.XX");
    let (slot, priority) = classifier.is_card_typeof(&card, "bt").unwrap();
    assert_eq!((slot.profile(), priority), (Some("a2dp"), 0));
    let slots = classifier.cards().get("bt").unwrap().slots();
    assert_eq!(slots[1].flags(), CardFlags::NOTIFY_PROFILE_CHANGED);

    let groups = rules.group_table();
    let mut props = Proplist::new().with("media.role", "music");
    let client = ClientInfo {
        name: "mpd",
        ..ClientInfo::default()
    };
    let resolved = classifier.resolve_stream_group(Some(&client), &mut props, &groups);
    assert_eq!(resolved.group, "player");
    assert_eq!(resolved.flags, StreamFlags::LOCAL_MUTE);
    assert_eq!(props.get("policy.tag"), Some("music"));

    // navigator is not a declared group
    let mut props = Proplist::new().with("application.process.binary", "/usr/bin/navi");
    assert_eq!(
        classifier.resolve_stream_group(None, &mut props, &groups).group,
        "othermedia"
    );
}

#[test]
fn test_load_missing_file() {
    let path = std::env::temp_dir().join("audio-policy-does-not-exist.json");
    assert!(matches!(RuleSet::load(&path), Err(PolicyError::Io(_))));
}

#[test]
fn test_load_malformed_document() {
    let path = write_fixture("malformed", "{ \"sinks\": 3 }");
    let result = RuleSet::load(&path);
    let _ = std::fs::remove_file(&path);
    assert!(matches!(result, Err(PolicyError::Config(_))));
}

#[test]
fn test_empty_document() {
    let rules: RuleSet = serde_json::from_str("{}").unwrap();
    let (classifier, report) = rules.build();
    assert_eq!(report.applied, 0);
    assert!(report.is_clean());
    assert!(classifier.sink_types().is_empty());
    assert_eq!(classifier.config().default_group, "othermedia");
    assert_eq!(classifier.devices(Direction::Source).len(), 0);
}
