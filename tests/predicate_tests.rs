// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for predicates

use audio_policy::classify::{
    CardNode, DeviceNode, MethodKind, ObjectKind, Predicate, PredicateSpec, Proplist, StreamNode,
    TargetSpec,
};
use audio_policy::errors::MatchError;

fn compile(kind: ObjectKind, text: &str) -> Predicate {
    let spec: PredicateSpec = text.parse().expect("predicate text should parse");
    Predicate::new(kind, &spec).expect("predicate should compile")
}

#[test]
fn test_text_form_targets() {
    let spec: PredicateSpec = "startswith:alsa_".parse().unwrap();
    assert_eq!(spec.target, TargetSpec::Name);

    let spec: PredicateSpec = "(name)@equals:foo".parse().unwrap();
    assert_eq!(spec.target, TargetSpec::Name);

    let spec: PredicateSpec = "device.bus@equals:bluetooth".parse().unwrap();
    assert_eq!(spec.target, TargetSpec::Property("device.bus".to_string()));
    assert_eq!(spec.to_string(), "device.bus@equals:bluetooth");

    let spec: PredicateSpec = "true".parse().unwrap();
    assert_eq!(spec.method, MethodKind::Always);
}

#[test]
fn test_always_matches_any_object() {
    let predicate = compile(ObjectKind::Sink, "true");

    assert!(predicate.matches(&DeviceNode::sink("anything")));
    assert!(predicate.matches(&CardNode::new("card")));
    assert!(!predicate.evaluate(None), "Absent objects never match");
}

#[test]
fn test_missing_property_is_no_match() {
    let predicate = compile(ObjectKind::Sink, "device.bus@equals:usb");

    assert!(!predicate.matches(&DeviceNode::sink("alsa_output.0")));
    assert!(predicate.matches(&DeviceNode::sink("alsa_output.0").with_property("device.bus", "usb")));
}

#[test]
fn test_regex_is_anchored() {
    let predicate = compile(ObjectKind::Sink, "matches:alsa_output\\..*");

    assert!(predicate.matches(&DeviceNode::sink("alsa_output.pci")));
    assert!(
        !predicate.matches(&DeviceNode::sink("x.alsa_output.pci")),
        "Match must cover the whole name"
    );
}

#[test]
fn test_invalid_regex_fails_to_build() {
    let spec = PredicateSpec::name(MethodKind::Matches, "alsa_(");
    let err = Predicate::new(ObjectKind::Sink, &spec).unwrap_err();
    assert!(matches!(err, MatchError::InvalidRegex { pattern, .. } if pattern == "alsa_("));
}

#[test]
fn test_proplist_requires_property_target() {
    let spec = PredicateSpec::name(MethodKind::Equals, "x");
    assert!(matches!(
        Predicate::new(ObjectKind::Proplist, &spec),
        Err(MatchError::InvalidTarget(_))
    ));

    let predicate = compile(ObjectKind::Proplist, "media.role@startswith:mus");
    assert!(predicate.matches(&Proplist::new().with("media.role", "music")));

    let predicate = compile(ObjectKind::Proplist, "true");
    assert!(
        predicate.matches(&Proplist::new()),
        "An unconditional match needs no target"
    );
}

#[test]
fn test_stream_name_is_media_name() {
    let predicate = compile(ObjectKind::SinkInput, "equals:Playback");
    let stream = StreamNode::playback(Proplist::new().with("media.name", "Playback"));
    assert!(predicate.matches(&stream));
}

#[test]
fn test_literal_target() {
    let predicate = Predicate::new(
        ObjectKind::Literal,
        &PredicateSpec::literal(MethodKind::StartsWith, "output-"),
    )
    .unwrap();

    assert!(predicate.matches(&"output-speaker"));
    assert!(
        !predicate.matches(&DeviceNode::sink("output-speaker")),
        "Only plain strings have a literal value"
    );
}

#[test]
fn test_predicate_display() {
    let predicate = compile(ObjectKind::Sink, "startswith:alsa_");
    assert_eq!(predicate.to_string(), "(name) startswith:alsa_");

    let predicate = compile(ObjectKind::Proplist, "media.role@equals:music");
    assert_eq!(predicate.to_string(), "(property) media.role equals:music");
}
