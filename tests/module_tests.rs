// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for helper module bookkeeping

use audio_policy::classify::{
    Classifier, DeviceRuleDef, Direction, MethodKind, ModuleHost, ModuleIndex, ModuleSpec,
    PredicateSpec,
};
use audio_policy::constants::DeviceFlags;
use audio_policy::errors::{ModuleError, PolicyError};

/// Records every call instead of talking to a server
#[derive(Default)]
struct RecordingHost {
    next_index: u32,
    refuse: bool,
    loaded: Vec<(String, Option<String>)>,
    unloaded: Vec<ModuleIndex>,
    unload_requests: Vec<ModuleIndex>,
}

impl ModuleHost for RecordingHost {
    fn load(&mut self, name: &str, args: Option<&str>) -> Result<ModuleIndex, ModuleError> {
        if self.refuse {
            return Err(ModuleError::LoadFailed {
                name: name.to_string(),
                reason: "module initialization failed".to_string(),
            });
        }
        self.next_index += 1;
        self.loaded
            .push((name.to_string(), args.map(str::to_string)));
        Ok(ModuleIndex(self.next_index))
    }

    fn unload(&mut self, index: ModuleIndex) {
        self.unloaded.push(index);
    }

    fn request_unload(&mut self, index: ModuleIndex) {
        self.unload_requests.push(index);
    }
}

fn classifier() -> Classifier {
    let mut classifier = Classifier::default();
    classifier
        .add_device_rule(
            Direction::Sink,
            DeviceRuleDef::new(
                "headset",
                PredicateSpec::name(MethodKind::StartsWith, "alsa_output.headset"),
            )
            .with_module(ModuleSpec::new("module-loopback", Some("latency_msec=20"))),
        )
        .unwrap();
    classifier
        .add_device_rule(
            Direction::Sink,
            DeviceRuleDef::new(
                "headphone",
                PredicateSpec::name(MethodKind::StartsWith, "alsa_output.headphone"),
            )
            .with_module(ModuleSpec::new("module-loopback", Some("latency_msec=20"))),
        )
        .unwrap();
    classifier
        .add_device_rule(
            Direction::Sink,
            DeviceRuleDef::new(
                "bthsp",
                PredicateSpec::name(MethodKind::StartsWith, "bluez_sink"),
            )
            .with_module(ModuleSpec::new("module-null-sink", None))
            .with_flags(DeviceFlags::MODULE_UNLOAD_IMMEDIATELY),
        )
        .unwrap();
    classifier
        .add_device_rule(
            Direction::Sink,
            DeviceRuleDef::new("ihf", PredicateSpec::name(MethodKind::StartsWith, "alsa_output.ihf")),
        )
        .unwrap();
    classifier
}

#[test]
fn test_load_once_per_direction() {
    let mut classifier = classifier();
    let mut host = RecordingHost::default();

    let index = classifier
        .update_module(Direction::Sink, "headset", &mut host)
        .unwrap();
    assert_eq!(index, Some(ModuleIndex(1)));

    // Same module and arguments: nothing to do
    classifier
        .update_module(Direction::Sink, "headphone", &mut host)
        .unwrap();
    assert_eq!(host.loaded.len(), 1);
    assert_eq!(
        host.loaded[0],
        ("module-loopback".to_string(), Some("latency_msec=20".to_string()))
    );
    assert!(classifier.modules().loaded(Direction::Source).is_none());
}

#[test]
fn test_swap_uses_stored_unload_mode() {
    let mut classifier = classifier();
    let mut host = RecordingHost::default();

    classifier
        .update_module(Direction::Sink, "headset", &mut host)
        .unwrap();
    classifier
        .update_module(Direction::Sink, "bthsp", &mut host)
        .unwrap();
    assert_eq!(host.unload_requests, vec![ModuleIndex(1)]);

    classifier
        .update_module(Direction::Sink, "ihf", &mut host)
        .unwrap();
    assert_eq!(
        host.unloaded,
        vec![ModuleIndex(2)],
        "module_unload_immediately is taken from the loaded rule"
    );
    assert!(classifier.modules().loaded(Direction::Sink).is_none());
}

#[test]
fn test_failed_load_can_be_retried() {
    let mut classifier = classifier();
    let mut host = RecordingHost {
        refuse: true,
        ..RecordingHost::default()
    };

    let err = classifier
        .update_module(Direction::Sink, "headset", &mut host)
        .unwrap_err();
    assert!(matches!(err, PolicyError::Module(ModuleError::LoadFailed { .. })));
    assert!(classifier.modules().loaded(Direction::Sink).is_none());
    assert_eq!(classifier.sink_types().len(), 4, "Tables are untouched");

    host.refuse = false;
    assert!(classifier
        .update_module(Direction::Sink, "headset", &mut host)
        .unwrap()
        .is_some());
}

#[test]
fn test_unlinked_module_is_forgotten() {
    let mut classifier = classifier();
    let mut host = RecordingHost::default();

    classifier
        .update_module(Direction::Sink, "headset", &mut host)
        .unwrap();
    assert_eq!(classifier.module_unlinked(ModuleIndex(7)), None);
    assert_eq!(
        classifier.module_unlinked(ModuleIndex(1)),
        Some(Direction::Sink)
    );

    classifier
        .update_module(Direction::Sink, "headset", &mut host)
        .unwrap();
    assert_eq!(host.loaded.len(), 2, "Next update loads again");
    assert!(host.unloaded.is_empty() && host.unload_requests.is_empty());
}

#[test]
fn test_reconcile_on_type_change() {
    let mut classifier = classifier();
    let mut host = RecordingHost::default();

    classifier
        .update_module(Direction::Sink, "headset", &mut host)
        .unwrap();

    assert!(
        !classifier.reconcile_modules(Direction::Sink, "headphone", &mut host),
        "New type uses the same module"
    );
    assert!(!classifier.reconcile_modules(Direction::Sink, "unknown", &mut host));
    assert!(classifier.reconcile_modules(Direction::Sink, "ihf", &mut host));
    assert_eq!(host.unload_requests, vec![ModuleIndex(1)]);
    assert!(classifier.modules().loaded(Direction::Sink).is_none());
}

#[test]
fn test_shutdown_unloads_everything() {
    let mut classifier = classifier();
    let mut host = RecordingHost::default();

    classifier
        .update_module(Direction::Sink, "headset", &mut host)
        .unwrap();
    classifier.shutdown(&mut host);

    assert_eq!(host.unloaded, vec![ModuleIndex(1)]);
    assert!(classifier.modules().loaded(Direction::Sink).is_none());
}
