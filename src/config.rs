// SPDX-License-Identifier: GPL-3.0-only

use crate::classify::{
    CardRuleDef, CardSlotDef, Classifier, DeviceRuleDef, Direction, GroupTable, ModuleSpec,
    PredicateSpec, StreamRuleDef,
};
use crate::constants::{CardFlags, DEFAULT_GROUP_NAME, DeviceFlags, StreamFlags};
use crate::errors::{PolicyError, PolicyResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Folder name under the user configuration directory
const CONFIG_FOLDER: &str = "audio-policy";

/// Rule set file name
const RULES_FILE: &str = "rules.json";

/// Engine wide settings
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Group handed out when no rule claims a stream
    pub default_group: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_group: DEFAULT_GROUP_NAME.to_string(),
        }
    }
}

/// Get default rule set path
pub fn default_rules_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(CONFIG_FOLDER)
        .join(RULES_FILE)
}

/// Policy group declaration
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub name: String,
    /// The group's sink changes at run time
    #[serde(default)]
    pub dynamic: bool,
    /// Initial running state of a dynamic group's sink
    #[serde(default)]
    pub running: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PortEntrySettings {
    pub port: String,
    pub predicate: String,
}

/// `[sink]` / `[source]` entry
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(rename = "type")]
    pub type_label: String,
    pub predicate: String,
    #[serde(default)]
    pub ports: Vec<PortEntrySettings>,
    #[serde(default)]
    pub module: Option<ModuleSpec>,
    #[serde(default)]
    pub flags: Vec<String>,
    /// Milliseconds, used with `delayed_port_change`
    #[serde(default)]
    pub port_change_delay_ms: u64,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CardSlotEntry {
    pub predicate: String,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// `[card]` entry
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CardEntry {
    #[serde(rename = "type")]
    pub type_label: String,
    pub slots: Vec<CardSlotEntry>,
}

/// `[stream]` entry
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamEntry {
    pub predicate: Option<String>,
    pub client: Option<String>,
    pub sink: Option<String>,
    pub uid: Option<u32>,
    pub exe: Option<String>,
    pub group: String,
    pub flags: Vec<String>,
    /// `key=value` pairs merged into matching streams
    pub properties: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AppIdEntrySettings {
    pub app_id: String,
    #[serde(default)]
    pub predicate: Option<String>,
    pub group: String,
}

/// Rule set document
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub engine: EngineConfig,
    pub variables: BTreeMap<String, String>,
    pub groups: Vec<GroupEntry>,
    pub sinks: Vec<DeviceEntry>,
    pub sources: Vec<DeviceEntry>,
    pub cards: Vec<CardEntry>,
    pub streams: Vec<StreamEntry>,
    pub app_ids: Vec<AppIdEntrySettings>,
}

/// A rule `apply` could not install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub section: &'static str,
    pub label: String,
    pub error: PolicyError,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.section, self.label, self.error)
    }
}

/// Outcome of [`RuleSet::apply`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub applied: usize,
    pub rejected: Vec<Rejection>,
}

impl LoadReport {
    fn record(&mut self, section: &'static str, label: &str, result: PolicyResult<()>) {
        match result {
            Ok(()) => self.applied += 1,
            Err(error) => {
                warn!(section, label, %error, "rule rejected");
                self.rejected.push(Rejection {
                    section,
                    label: label.to_string(),
                    error,
                });
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl RuleSet {
    /// Read a rule set from a JSON file
    pub fn load(path: &Path) -> PolicyResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PolicyError::Io(format!("{}: {}", path.display(), e)))?;
        let rules: RuleSet = serde_json::from_str(&text)?;

        debug!(
            path = %path.display(),
            sinks = rules.sinks.len(),
            sources = rules.sources.len(),
            cards = rules.cards.len(),
            streams = rules.streams.len(),
            "rule set loaded"
        );
        Ok(rules)
    }

    /// Fresh classifier with this rule set applied
    pub fn build(&self) -> (Classifier, LoadReport) {
        let mut classifier = Classifier::new(self.engine.clone());
        let report = self.apply(&mut classifier);
        (classifier, report)
    }

    /// Register every rule with `classifier`. Rejected rules are logged and
    /// counted; the remaining rules are still applied.
    pub fn apply(&self, classifier: &mut Classifier) -> LoadReport {
        let mut report = LoadReport::default();

        for (name, value) in &self.variables {
            classifier.set_variable(name, value);
        }

        for (direction, entries, section) in [
            (Direction::Sink, &self.sinks, "sink"),
            (Direction::Source, &self.sources, "source"),
        ] {
            for entry in entries {
                let result = device_rule(classifier, entry)
                    .and_then(|def| classifier.add_device_rule(direction, def).map(|_| ()));
                report.record(section, &entry.type_label, result);
            }
        }

        for entry in &self.cards {
            let result =
                card_rule(classifier, entry).and_then(|def| classifier.add_card_rule(def).map(|_| ()));
            report.record("card", &entry.type_label, result);
        }

        for entry in &self.streams {
            let result = stream_rule(classifier, entry)
                .and_then(|def| classifier.add_stream_rule(def).map(|_| ()));
            report.record("stream", &entry.group, result);
        }

        for entry in &self.app_ids {
            let result = parse_predicate_opt(entry.predicate.as_deref()).and_then(|predicate| {
                classifier.register_app_id(&entry.app_id, predicate.as_ref(), &entry.group)
            });
            report.record("app-id", &entry.app_id, result);
        }

        info!(
            applied = report.applied,
            rejected = report.rejected.len(),
            "rule set applied"
        );
        report
    }

    /// Group directory for the declared groups
    pub fn group_table(&self) -> GroupTable {
        let mut table = GroupTable::new();
        for group in &self.groups {
            if group.dynamic {
                table.add_dynamic(group.name.clone(), group.running);
            } else {
                table.add_static(group.name.clone());
            }
        }
        table
    }
}

fn parse_predicate(text: &str) -> PolicyResult<PredicateSpec> {
    text.parse::<PredicateSpec>().map_err(Into::into)
}

fn parse_predicate_opt(text: Option<&str>) -> PolicyResult<Option<PredicateSpec>> {
    text.map(parse_predicate).transpose()
}

fn flag_names<'a>(classifier: &'a Classifier, names: &'a [String]) -> impl Iterator<Item = &'a str> {
    names
        .iter()
        .map(move |name| classifier.variables().resolve(name.as_str()))
}

fn device_rule(classifier: &Classifier, entry: &DeviceEntry) -> PolicyResult<DeviceRuleDef> {
    let mut def = DeviceRuleDef::new(entry.type_label.clone(), parse_predicate(&entry.predicate)?)
        .with_flags(DeviceFlags::from_names(flag_names(classifier, &entry.flags)))
        .with_port_change_delay(Duration::from_millis(entry.port_change_delay_ms));

    for port in &entry.ports {
        def = def.with_port(port.port.clone(), parse_predicate(&port.predicate)?);
    }
    if let Some(module) = &entry.module {
        def = def.with_module(module.clone());
    }

    Ok(def)
}

fn card_rule(classifier: &Classifier, entry: &CardEntry) -> PolicyResult<CardRuleDef> {
    let mut def = CardRuleDef::new(entry.type_label.clone());
    for slot in &entry.slots {
        def = def.with_slot(
            CardSlotDef::new(parse_predicate(&slot.predicate)?, slot.profile.as_deref())
                .with_flags(CardFlags::from_names(flag_names(classifier, &slot.flags))),
        );
    }
    Ok(def)
}

fn stream_rule(classifier: &Classifier, entry: &StreamEntry) -> PolicyResult<StreamRuleDef> {
    Ok(StreamRuleDef {
        predicate: parse_predicate_opt(entry.predicate.as_deref())?,
        client_name: entry.client.clone(),
        sink_name: entry.sink.clone(),
        uid: entry.uid,
        exe: entry.exe.clone(),
        group: entry.group.clone(),
        flags: StreamFlags::from_names(flag_names(classifier, &entry.flags)),
        overlay: entry.properties.clone(),
    })
}
