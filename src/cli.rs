// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the policy engine
//!
//! This module provides command-line functionality for:
//! - Validating a rule set
//! - Classifying the objects of the running server
//! - Resolving the group of a single stream

use audio_policy::backends::{HostSnapshot, PactlModuleHost};
use audio_policy::classify::{
    ClientInfo, Classifier, DeviceNode, Direction, ModuleHost, PolicyObject, Proplist,
};
use audio_policy::config::RuleSet;
use audio_policy::constants::{CardFlags, DeviceFlags};
use std::path::Path;
use tracing::warn;

/// Options of the `classify` command
pub struct ClassifyOptions {
    pub reclassify: bool,
    pub load_modules: bool,
    pub dry_run: bool,
}

/// Stream described on the command line
pub struct StreamDescription {
    pub app_id: Option<String>,
    pub client: Option<String>,
    pub uid: Option<u32>,
    pub exe: Option<String>,
    pub props: Vec<String>,
    pub route: Option<String>,
}

fn load(rules: &Path) -> Result<(RuleSet, Classifier), Box<dyn std::error::Error>> {
    let rule_set = RuleSet::load(rules)?;
    let (classifier, report) = rule_set.build();

    for rejection in &report.rejected {
        eprintln!("rejected {}", rejection);
    }

    Ok((rule_set, classifier))
}

/// Load the rule set and print what ended up in each table
pub fn check(rules: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let rule_set = RuleSet::load(rules)?;
    let (classifier, report) = rule_set.build();

    println!("Rule set: {}", rules.display());
    println!();
    println!("  sink types:   {}", classifier.sink_types());
    println!("  source types: {}", classifier.source_types());
    println!("  card types:   {}", classifier.card_types());
    println!("  stream rules: {}", classifier.streams().len());
    println!("  app ids:      {}", classifier.app_ids().len());
    println!("  groups:       {}", rule_set.groups.len());
    println!();
    println!(
        "{} rules applied, {} rejected",
        report.applied,
        report.rejected.len()
    );

    if report.is_clean() {
        return Ok(());
    }

    for rejection in &report.rejected {
        println!("  {}", rejection);
    }
    Err(format!("{} rules rejected", report.rejected.len()).into())
}

fn print_devices(
    classifier: &Classifier,
    direction: Direction,
    devices: &[DeviceNode],
) {
    let table = classifier.devices(direction);
    for device in devices {
        let types = table.classify(device, DeviceFlags::empty(), DeviceFlags::empty());
        let running = if device.is_running() { " (running)" } else { "" };
        println!("  {}{}: {}", device.name, running, types);

        for type_label in types.iter() {
            if let Some(port) = classifier
                .devices(direction)
                .is_port_typeof(device, type_label)
                .and_then(|data| data.find_port(device))
            {
                println!("      {} -> port {}", type_label, port.port_name());
            }
        }
    }
}

/// Active type of a direction: first label of the first running device
fn active_type<'a>(
    classifier: &'a Classifier,
    direction: Direction,
    devices: &[DeviceNode],
) -> Option<(&'a str, String)> {
    devices
        .iter()
        .filter(|device| device.is_running())
        .find_map(|device| {
            classifier
                .devices(direction)
                .classify(device, DeviceFlags::empty(), DeviceFlags::empty())
                .iter()
                .next()
                .map(|type_label| (type_label, device.name.clone()))
        })
}

fn load_modules(
    classifier: &mut Classifier,
    snapshot: &HostSnapshot,
    host: &mut dyn ModuleHost,
) {
    for (direction, devices) in [
        (Direction::Sink, &snapshot.sinks),
        (Direction::Source, &snapshot.sources),
    ] {
        let Some((type_label, device)) =
            active_type(classifier, direction, devices).map(|(t, d)| (t.to_string(), d))
        else {
            continue;
        };

        classifier.reconcile_modules(direction, &type_label, host);
        match classifier.update_module(direction, &type_label, host) {
            Ok(Some(index)) => println!("{} {} ({}): module {}", direction, device, type_label, index),
            Ok(None) => {}
            Err(e) => warn!(%direction, %type_label, "Failed to update module: {}", e),
        }
    }
}

/// Classify everything the server currently knows about
pub fn classify(
    rules: &Path,
    dump: Option<&Path>,
    options: ClassifyOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let (rule_set, mut classifier) = load(rules)?;
    let groups = rule_set.group_table();

    let snapshot = match dump {
        Some(path) => HostSnapshot::from_file(path)?,
        None => HostSnapshot::capture()?,
    };

    let active_sink = active_type(&classifier, Direction::Sink, &snapshot.sinks).map(|(_, sink)| sink);
    if let Some(sink) = active_sink {
        classifier.update_stream_route(&sink);
    }

    if options.load_modules {
        let mut host = if options.dry_run {
            PactlModuleHost::dry_run()
        } else {
            PactlModuleHost::new()
        };
        load_modules(&mut classifier, &snapshot, &mut host);
    }

    println!("Sinks:");
    print_devices(&classifier, Direction::Sink, &snapshot.sinks);
    println!();

    println!("Sources:");
    print_devices(&classifier, Direction::Source, &snapshot.sources);
    println!();

    println!("Cards:");
    for card in &snapshot.cards {
        let types = classifier.classify_card(
            card,
            card,
            CardFlags::empty(),
            CardFlags::empty(),
            options.reclassify,
        );
        println!("  {}: {}", card.name, types);

        for type_label in types.iter() {
            if let Some((slot, priority)) = classifier.is_card_typeof(card, type_label) {
                println!(
                    "      {} -> profile {} (priority {})",
                    type_label,
                    slot.profile().unwrap_or("<current>"),
                    priority
                );
            }
        }
    }
    println!();

    println!("Streams:");
    for stream in &snapshot.streams {
        let mut properties = stream.node.properties.clone();
        let client = stream.client.as_ref().map(|c| c.info());
        let group = classifier.resolve_stream_group(client.as_ref(), &mut properties, &groups);
        println!(
            "  [{}] {}: {} ({:?})",
            stream.id,
            stream.node.name().unwrap_or("<unnamed>"),
            group.group,
            group.origin
        );
    }

    Ok(())
}

/// Resolve the group of a stream described on the command line
pub fn group(rules: &Path, stream: StreamDescription) -> Result<(), Box<dyn std::error::Error>> {
    let (rule_set, mut classifier) = load(rules)?;
    let groups = rule_set.group_table();

    if let Some(route) = &stream.route {
        classifier.update_stream_route(route);
    }

    let mut properties = Proplist::new();
    for prop in &stream.props {
        let Some((key, value)) = prop.split_once('=') else {
            return Err(format!("Invalid property '{}', expected key=value", prop).into());
        };
        properties.set(key, value);
    }

    if stream.client.is_none() && stream.app_id.is_some() {
        warn!("--app-id is ignored for client-less streams");
    }

    let client = stream.client.as_deref().map(|name| ClientInfo {
        name,
        app_id: stream.app_id.as_deref(),
        uid: stream.uid,
        exe: stream.exe.as_deref(),
    });

    if client.is_none() {
        if let Some(exe) = &stream.exe {
            properties.set(audio_policy::constants::PROP_PROCESS_BINARY, exe.clone());
        }
    }

    let resolved = classifier.resolve_stream_group(client.as_ref(), &mut properties, &groups);

    println!("group:  {}", resolved.group);
    println!("flags:  {:?}", resolved.flags);
    println!("origin: {:?}", resolved.origin);
    if !properties.is_empty() {
        let props: Vec<String> = properties
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        println!("properties: {}", props.join(" "));
    }

    Ok(())
}
