// SPDX-License-Identifier: GPL-3.0-only

//! Classification engine
//!
//! [`Classifier`] owns every rule table and is passed by reference to each
//! query and mutation. It is single threaded: the host serializes callbacks,
//! so no locking happens here.
//!
//! ```
//! use audio_policy::classify::{Classifier, DeviceNode, DeviceRuleDef, MethodKind, PredicateSpec};
//! use audio_policy::constants::DeviceFlags;
//!
//! let mut classifier = Classifier::default();
//! classifier
//!     .add_device_rule(
//!         audio_policy::classify::Direction::Sink,
//!         DeviceRuleDef::new("ihf", PredicateSpec::name(MethodKind::StartsWith, "alsa_output")),
//!     )
//!     .unwrap();
//!
//! let sink = DeviceNode::sink("alsa_output.0");
//! let types = classifier.classify_sink(&sink, DeviceFlags::empty(), DeviceFlags::empty());
//! assert_eq!(types.to_string(), "ihf");
//! ```

pub mod app_id;
pub mod card;
pub mod device;
pub mod module;
pub mod object;
pub mod predicate;
pub mod stream;
pub mod types;

pub use app_id::{AppIdEntry, AppIdRegistry};
pub use card::{CardRule, CardRuleDef, CardRuleTable, CardSlot, CardSlotDef};
pub use device::{DeviceData, DeviceRule, DeviceRuleDef, DeviceRuleTable, PortEntry, PortSpec};
pub use module::{LoadedModule, ModuleHost, ModuleIndex, ModuleLoadCoordinator};
pub use object::{
    Availability, CardNode, CardProfile, DeviceNode, DeviceState, ObjectKind, PolicyObject,
    ProfileCatalog, Proplist, StreamNode,
};
pub use predicate::{MethodKind, Predicate, PredicateSpec, Target, TargetSpec};
pub use stream::{
    GroupDirectory, GroupSinkState, GroupTable, SinkActivity, StaticGroups, StreamQuery,
    StreamRule, StreamRuleDef, StreamRuleList,
};
pub use types::{ClassificationResult, Direction, ModuleSpec, RuleChange};

use crate::config::EngineConfig;
use crate::constants::{CardFlags, DeviceFlags, PROP_PROCESS_BINARY, StreamFlags};
use crate::errors::PolicyResult;
use crate::variables::Variables;
use tracing::{debug, warn};

/// Client of a stream being resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientInfo<'a> {
    pub name: &'a str,
    pub app_id: Option<&'a str>,
    pub uid: Option<u32>,
    pub exe: Option<&'a str>,
}

/// Which table decided a stream's group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOrigin {
    AppId,
    StreamRule,
    Default,
}

/// Outcome of stream group resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamGroup<'a> {
    pub group: &'a str,
    pub flags: StreamFlags,
    pub origin: GroupOrigin,
}

/// Every rule table of the engine
#[derive(Debug, Clone)]
pub struct Classifier {
    config: EngineConfig,
    variables: Variables,
    sinks: DeviceRuleTable,
    sources: DeviceRuleTable,
    cards: CardRuleTable,
    streams: StreamRuleList,
    app_ids: AppIdRegistry,
    modules: ModuleLoadCoordinator,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Classifier {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            variables: Variables::new(),
            sinks: DeviceRuleTable::new(Direction::Sink),
            sources: DeviceRuleTable::new(Direction::Source),
            cards: CardRuleTable::new(),
            streams: StreamRuleList::new(),
            app_ids: AppIdRegistry::new(),
            modules: ModuleLoadCoordinator::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.set(name, value);
    }

    pub fn devices(&self, direction: Direction) -> &DeviceRuleTable {
        match direction {
            Direction::Sink => &self.sinks,
            Direction::Source => &self.sources,
        }
    }

    fn devices_mut(&mut self, direction: Direction) -> &mut DeviceRuleTable {
        match direction {
            Direction::Sink => &mut self.sinks,
            Direction::Source => &mut self.sources,
        }
    }

    pub fn cards(&self) -> &CardRuleTable {
        &self.cards
    }

    pub fn streams(&self) -> &StreamRuleList {
        &self.streams
    }

    pub fn app_ids(&self) -> &AppIdRegistry {
        &self.app_ids
    }

    pub fn modules(&self) -> &ModuleLoadCoordinator {
        &self.modules
    }

    // Registration

    pub fn add_device_rule(
        &mut self,
        direction: Direction,
        mut def: DeviceRuleDef,
    ) -> PolicyResult<RuleChange> {
        self.variables.apply(&mut def.type_label);
        self.substitute_predicate(&mut def.predicate);
        for port in &mut def.ports {
            self.variables.apply(&mut port.port);
            self.substitute_predicate(&mut port.predicate);
        }
        if let Some(module) = def.module.as_mut() {
            self.variables.apply(&mut module.name);
            self.variables.apply_opt(&mut module.args);
        }

        let type_label = def.type_label.clone();
        self.devices_mut(direction)
            .add_or_replace(def)
            .inspect_err(|err| warn!(%direction, %type_label, %err, "device rule rejected"))
            .map_err(Into::into)
    }

    pub fn add_card_rule(&mut self, mut def: CardRuleDef) -> PolicyResult<RuleChange> {
        self.variables.apply(&mut def.type_label);
        for slot in &mut def.slots {
            self.substitute_predicate(&mut slot.predicate);
            self.variables.apply_opt(&mut slot.profile);
        }

        let type_label = def.type_label.clone();
        self.cards
            .add_or_replace(def)
            .inspect_err(|err| warn!(%type_label, %err, "card rule rejected"))
            .map_err(Into::into)
    }

    pub fn add_stream_rule(&mut self, mut def: StreamRuleDef) -> PolicyResult<RuleChange> {
        if let Some(predicate) = def.predicate.as_mut() {
            self.substitute_predicate(predicate);
        }
        self.variables.apply_opt(&mut def.client_name);
        self.variables.apply_opt(&mut def.sink_name);
        self.variables.apply_opt(&mut def.exe);
        self.variables.apply(&mut def.group);
        self.variables.apply_opt(&mut def.overlay);

        let group = def.group.clone();
        self.streams
            .add(def)
            .inspect_err(|err| warn!(%group, %err, "stream rule rejected"))
            .map_err(Into::into)
    }

    pub fn register_app_id(
        &mut self,
        app_id: &str,
        predicate: Option<&PredicateSpec>,
        group: &str,
    ) -> PolicyResult<()> {
        self.app_ids
            .register(app_id, predicate, group)
            .inspect_err(|err| warn!(app_id, %err, "app id rejected"))
            .map_err(Into::into)
    }

    /// Drop the registration of `app_id`. The entry is looked up by app id
    /// alone; `predicate` is only reported.
    pub fn unregister_app_id(
        &mut self,
        app_id: &str,
        predicate: Option<&PredicateSpec>,
    ) -> Option<String> {
        debug!(
            app_id,
            predicate = %predicate.map(|p| p.to_string()).unwrap_or_default(),
            "unregister app id"
        );
        self.app_ids.unregister(app_id)
    }

    pub fn remove_device_rule(&mut self, direction: Direction, type_label: &str) -> bool {
        self.devices_mut(direction).remove(type_label)
    }

    pub fn remove_card_rule(&mut self, type_label: &str) -> bool {
        self.cards.remove(type_label)
    }

    fn substitute_predicate(&self, spec: &mut PredicateSpec) {
        if let TargetSpec::Property(key) = &mut spec.target {
            self.variables.apply(key);
        }
        self.variables.apply_opt(&mut spec.arg);
    }

    // Queries

    pub fn classify_sink(
        &self,
        sink: &dyn PolicyObject,
        flag_mask: DeviceFlags,
        flag_value: DeviceFlags,
    ) -> ClassificationResult<'_> {
        self.sinks.classify(sink, flag_mask, flag_value)
    }

    pub fn classify_source(
        &self,
        source: &dyn PolicyObject,
        flag_mask: DeviceFlags,
        flag_value: DeviceFlags,
    ) -> ClassificationResult<'_> {
        self.sources.classify(source, flag_mask, flag_value)
    }

    pub fn classify_card(
        &self,
        card: &dyn PolicyObject,
        profiles: &dyn ProfileCatalog,
        flag_mask: CardFlags,
        flag_value: CardFlags,
        reclassify: bool,
    ) -> ClassificationResult<'_> {
        self.cards
            .classify(card, profiles, flag_mask, flag_value, reclassify)
    }

    pub fn is_sink_typeof(&self, sink: &dyn PolicyObject, type_label: &str) -> Option<&DeviceData> {
        self.sinks.is_typeof(sink, type_label)
    }

    pub fn is_source_typeof(
        &self,
        source: &dyn PolicyObject,
        type_label: &str,
    ) -> Option<&DeviceData> {
        self.sources.is_typeof(source, type_label)
    }

    pub fn is_port_sink_typeof(
        &self,
        sink: &dyn PolicyObject,
        type_label: &str,
    ) -> Option<&DeviceData> {
        self.sinks.is_port_typeof(sink, type_label)
    }

    pub fn is_port_source_typeof(
        &self,
        source: &dyn PolicyObject,
        type_label: &str,
    ) -> Option<&DeviceData> {
        self.sources.is_port_typeof(source, type_label)
    }

    pub fn is_card_typeof(
        &self,
        card: &dyn PolicyObject,
        type_label: &str,
    ) -> Option<(&CardSlot, usize)> {
        self.cards.is_typeof_with_priority(card, type_label)
    }

    pub fn sink_types(&self) -> ClassificationResult<'_> {
        self.sinks.all_types()
    }

    pub fn source_types(&self) -> ClassificationResult<'_> {
        self.sources.all_types()
    }

    pub fn card_types(&self) -> ClassificationResult<'_> {
        self.cards.all_types()
    }

    /// Policy group of a stream.
    ///
    /// A stream with a client is looked up by app id first, then against the
    /// stream rules. A client-less stream only goes through the stream rules,
    /// with its executable taken from the property list. Falls back to the
    /// configured default group.
    pub fn resolve_stream_group(
        &self,
        client: Option<&ClientInfo<'_>>,
        properties: &mut Proplist,
        groups: &dyn GroupDirectory,
    ) -> StreamGroup<'_> {
        let resolved = match client {
            Some(client) => {
                let by_app_id = client
                    .app_id
                    .and_then(|app_id| self.app_ids.group_for(app_id, properties));

                match by_app_id {
                    Some(group) => Some((group, StreamFlags::empty(), GroupOrigin::AppId)),
                    None => {
                        let query = StreamQuery::new(Some(client.name), client.uid, client.exe);
                        self.streams
                            .resolve(properties, &query, groups)
                            .map(|(group, flags)| (group, flags, GroupOrigin::StreamRule))
                    }
                }
            }
            None => {
                let exe = properties.get(PROP_PROCESS_BINARY).map(str::to_string);
                let query = StreamQuery::new(None, None, exe.as_deref());
                self.streams
                    .resolve(properties, &query, groups)
                    .map(|(group, flags)| (group, flags, GroupOrigin::StreamRule))
            }
        };

        let (group, flags, origin) = resolved.unwrap_or((
            self.config.default_group.as_str(),
            StreamFlags::empty(),
            GroupOrigin::Default,
        ));

        debug!(
            client = client.map(|c| c.name).unwrap_or("<null>"),
            app_id = client.and_then(|c| c.app_id).unwrap_or("<null>"),
            uid = ?client.and_then(|c| c.uid),
            group,
            ?flags,
            ?origin,
            "resolved stream group"
        );

        StreamGroup {
            group,
            flags,
            origin,
        }
    }

    /// The route now points at `sink_name`
    pub fn update_stream_route(&mut self, sink_name: &str) {
        self.streams.update_route(sink_name);
    }

    // Helper modules

    /// Load or swap the helper module of `direction` for the rule labelled `type_label`
    pub fn update_module(
        &mut self,
        direction: Direction,
        type_label: &str,
        host: &mut dyn ModuleHost,
    ) -> PolicyResult<Option<ModuleIndex>> {
        let table = match direction {
            Direction::Sink => &self.sinks,
            Direction::Source => &self.sources,
        };
        let Some(rule) = table.get(type_label) else {
            return Ok(self.modules.loaded(direction).map(LoadedModule::index));
        };

        self.modules
            .update(direction, rule.data(), host)
            .map_err(Into::into)
    }

    /// Active type of `direction` changed to `type_label`
    pub fn reconcile_modules(
        &mut self,
        direction: Direction,
        type_label: &str,
        host: &mut dyn ModuleHost,
    ) -> bool {
        let table = match direction {
            Direction::Sink => &self.sinks,
            Direction::Source => &self.sources,
        };
        self.modules
            .reconcile_on_type_change(direction, type_label, table, host)
    }

    pub fn invalidate_module(&mut self, direction: Direction) -> Option<LoadedModule> {
        self.modules.invalidate(direction)
    }

    pub fn module_unlinked(&mut self, index: ModuleIndex) -> Option<Direction> {
        self.modules.module_unlinked(index)
    }

    pub fn shutdown(&mut self, host: &mut dyn ModuleHost) {
        self.modules.shutdown(host);
    }
}
