// SPDX-License-Identifier: GPL-3.0-only

//! Stream rule chain
//!
//! Streams without an app-id hit are matched against an ordered chain of rules;
//! the first rule whose filters all accept the stream decides its group.
//!
//! A rule may be bound to a target sink. Such a rule only takes part while its
//! sink is the active route (see [`StreamRuleList::update_route`]) and, for
//! groups with a dynamic sink, while that sink is running.

use super::object::{ObjectKind, Proplist};
use super::predicate::{Predicate, PredicateSpec};
use super::types::RuleChange;
use crate::constants::StreamFlags;
use crate::errors::RuleError;
use std::collections::HashMap;
use tracing::{debug, info};

/// Sink state of a policy group, as known to the group subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSinkState {
    /// The group always routes to the same sink
    Static,
    /// The group's sink changes at run time
    Dynamic { running: bool },
}

/// Lookup of policy group sink state
pub trait GroupDirectory {
    /// `None` for groups the subsystem does not know
    fn sink_state(&self, group: &str) -> Option<GroupSinkState>;
}

/// Treats every group as known and statically routed
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticGroups;

impl GroupDirectory for StaticGroups {
    fn sink_state(&self, _group: &str) -> Option<GroupSinkState> {
        Some(GroupSinkState::Static)
    }
}

/// In-memory group directory
#[derive(Debug, Clone, Default)]
pub struct GroupTable {
    groups: HashMap<String, GroupSinkState>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_static(&mut self, group: impl Into<String>) {
        self.groups.insert(group.into(), GroupSinkState::Static);
    }

    pub fn add_dynamic(&mut self, group: impl Into<String>, running: bool) {
        self.groups
            .insert(group.into(), GroupSinkState::Dynamic { running });
    }

    /// Update the running state of a dynamic group; static groups are left alone
    pub fn set_running(&mut self, group: &str, running: bool) {
        if let Some(GroupSinkState::Dynamic { running: r }) = self.groups.get_mut(group) {
            *r = running;
        }
    }

    pub fn contains(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl GroupDirectory for GroupTable {
    fn sink_state(&self, group: &str) -> Option<GroupSinkState> {
        self.groups.get(group).copied()
    }
}

/// Whether a sink-bound rule currently takes part in matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkActivity {
    /// The rule is not bound to a sink
    NotApplicable,
    Inactive,
    Active,
}

/// Uncompiled stream rule
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamRuleDef {
    pub predicate: Option<PredicateSpec>,
    pub client_name: Option<String>,
    pub sink_name: Option<String>,
    pub uid: Option<u32>,
    pub exe: Option<String>,
    pub group: String,
    pub flags: StreamFlags,
    /// Properties merged into matching streams, in `key=value` text form
    pub overlay: Option<String>,
}

impl StreamRuleDef {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            ..Self::default()
        }
    }

    pub fn with_predicate(mut self, predicate: PredicateSpec) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_client(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = Some(client_name.into());
        self
    }

    pub fn with_sink(mut self, sink_name: impl Into<String>) -> Self {
        self.sink_name = Some(sink_name.into());
        self
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn with_exe(mut self, exe: impl Into<String>) -> Self {
        self.exe = Some(exe.into());
        self
    }

    pub fn with_flags(mut self, flags: StreamFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_overlay(mut self, overlay: impl Into<String>) -> Self {
        self.overlay = Some(overlay.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct StreamRule {
    predicate: Option<Predicate>,
    client_name: Option<String>,
    sink_name: Option<String>,
    uid: Option<u32>,
    exe: Option<String>,
    activity: SinkActivity,
    group: String,
    flags: StreamFlags,
    overlay: Option<Proplist>,
}

impl StreamRule {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn flags(&self) -> StreamFlags {
        self.flags
    }

    pub fn sink_name(&self) -> Option<&str> {
        self.sink_name.as_deref()
    }

    pub fn activity(&self) -> SinkActivity {
        self.activity
    }

    pub fn overlay(&self) -> Option<&Proplist> {
        self.overlay.as_ref()
    }

    fn has_filters_of(&self, def: &StreamRuleDef) -> bool {
        let same_predicate = match (&self.predicate, &def.predicate) {
            (None, None) => true,
            (Some(predicate), Some(spec)) => predicate.is_same_as(spec),
            _ => false,
        };

        same_predicate
            && self.client_name == def.client_name
            && self.sink_name == def.sink_name
            && self.uid == def.uid
            && self.exe == def.exe
    }

    fn accepts(
        &self,
        properties: &Proplist,
        query: &StreamQuery<'_>,
        groups: &dyn GroupDirectory,
    ) -> bool {
        fn string_filter(filter: &Option<String>, value: Option<&str>) -> bool {
            match filter {
                None => true,
                Some(expected) => value == Some(expected.as_str()),
            }
        }

        let property_match = self
            .predicate
            .as_ref()
            .is_none_or(|p| p.matches(properties));

        let uid_match = self.uid.is_none() || self.uid == query.uid;

        property_match
            && string_filter(&self.client_name, query.client_name)
            && uid_match
            && self.activity != SinkActivity::Inactive
            && group_sink_is_active(groups, &self.group)
            && string_filter(&self.exe, query.exe)
    }
}

fn group_sink_is_active(groups: &dyn GroupDirectory, group: &str) -> bool {
    match groups.sink_state(group) {
        Some(GroupSinkState::Static) => true,
        Some(GroupSinkState::Dynamic { running }) => {
            debug!(group, running, "dynamic group sink state");
            running
        }
        None => false,
    }
}

/// Client attributes of a stream being resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamQuery<'a> {
    pub client_name: Option<&'a str>,
    pub uid: Option<u32>,
    pub exe: Option<&'a str>,
}

impl<'a> StreamQuery<'a> {
    pub fn new(client_name: Option<&'a str>, uid: Option<u32>, exe: Option<&'a str>) -> Self {
        Self {
            client_name,
            uid,
            exe,
        }
    }
}

/// Ordered stream rules
#[derive(Debug, Clone, Default)]
pub struct StreamRuleList {
    rules: Vec<StreamRule>,
}

impl StreamRuleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &StreamRule> {
        self.rules.iter()
    }

    /// Append a rule; a rule with an identical filter set is replaced in place
    pub fn add(&mut self, def: StreamRuleDef) -> Result<RuleChange, RuleError> {
        if def.group.is_empty() {
            return Err(RuleError::EmptyType);
        }
        if def.predicate.is_none() && def.uid.is_none() && def.exe.is_none() {
            return Err(RuleError::MissingStreamFilter(def.group));
        }

        let overlay = def
            .overlay
            .as_deref()
            .map(|text| {
                text.parse::<Proplist>()
                    .map_err(|_| RuleError::InvalidProperties(text.to_string()))
            })
            .transpose()?;

        if let Some(rule) = self.rules.iter_mut().find(|r| r.has_filters_of(&def)) {
            info!(from = %rule.group, to = %def.group, "stream rule redefined");
            rule.group = def.group;
            rule.flags = def.flags;
            rule.overlay = overlay;
            return Ok(RuleChange::Updated);
        }

        let predicate = def
            .predicate
            .as_ref()
            .map(|spec| Predicate::new(ObjectKind::Proplist, spec))
            .transpose()?;

        let activity = if def.sink_name.is_some() {
            SinkActivity::Inactive
        } else {
            SinkActivity::NotApplicable
        };

        info!(
            uid = ?def.uid,
            exe = def.exe.as_deref().unwrap_or("<null>"),
            client = def.client_name.as_deref().unwrap_or("<null>"),
            predicate = %predicate.as_ref().map(|p| p.to_string()).unwrap_or_default(),
            group = %def.group,
            ?activity,
            "stream rule added"
        );

        self.rules.push(StreamRule {
            predicate,
            client_name: def.client_name,
            sink_name: def.sink_name,
            uid: def.uid,
            exe: def.exe,
            activity,
            group: def.group,
            flags: def.flags,
            overlay,
        });

        Ok(RuleChange::Added)
    }

    /// First rule accepting the stream
    pub fn find(
        &self,
        properties: &Proplist,
        query: &StreamQuery<'_>,
        groups: &dyn GroupDirectory,
    ) -> Option<&StreamRule> {
        self.rules
            .iter()
            .find(|rule| rule.accepts(properties, query, groups))
    }

    /// Group and flags of the first accepting rule. The rule's property
    /// overlay is merged into `properties`.
    pub fn resolve(
        &self,
        properties: &mut Proplist,
        query: &StreamQuery<'_>,
        groups: &dyn GroupDirectory,
    ) -> Option<(&str, StreamFlags)> {
        let rule = self.find(properties, query, groups)?;

        if let Some(overlay) = &rule.overlay {
            properties.update_replace(overlay);
        }

        Some((rule.group.as_str(), rule.flags))
    }

    /// Mark rules bound to `sink_name` active and every other sink-bound rule inactive
    pub fn update_route(&mut self, sink_name: &str) {
        for rule in &mut self.rules {
            if let Some(sink) = &rule.sink_name {
                rule.activity = if sink == sink_name {
                    SinkActivity::Active
                } else {
                    SinkActivity::Inactive
                };
                debug!(
                    group = %rule.group,
                    active = rule.activity == SinkActivity::Active,
                    "stream group route state changed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::predicate::MethodKind;

    fn role(value: &str) -> PredicateSpec {
        PredicateSpec::property("media.role", MethodKind::Equals, value)
    }

    #[test]
    fn test_rule_needs_a_filter() {
        let mut list = StreamRuleList::new();
        let err = list.add(StreamRuleDef::new("player").with_client("mpd"));
        assert!(matches!(err, Err(RuleError::MissingStreamFilter(_))));
        assert!(list.add(StreamRuleDef::new("player").with_uid(1000)).is_ok());
    }

    #[test]
    fn test_equal_filters_replace_in_place() {
        let mut list = StreamRuleList::new();
        list.add(StreamRuleDef::new("player").with_predicate(role("music")))
            .unwrap();
        list.add(StreamRuleDef::new("call").with_predicate(role("phone")))
            .unwrap();
        let change = list
            .add(StreamRuleDef::new("media").with_predicate(role("music")))
            .unwrap();

        assert_eq!(change, RuleChange::Updated);
        assert_eq!(list.len(), 2);
        let groups: Vec<&str> = list.rules().map(|r| r.group()).collect();
        assert_eq!(groups, vec!["media", "call"]);
    }

    #[test]
    fn test_first_match_wins_and_overlay_merges() {
        let mut list = StreamRuleList::new();
        list.add(
            StreamRuleDef::new("player")
                .with_predicate(role("music"))
                .with_overlay("policy.tag=music media.role=x"),
        )
        .unwrap();
        list.add(StreamRuleDef::new("other").with_exe("/usr/bin/mpv"))
            .unwrap();

        let mut props = Proplist::new().with("media.role", "music");
        let query = StreamQuery::new(None, None, Some("/usr/bin/mpv"));
        let (group, _) = list.resolve(&mut props, &query, &StaticGroups).unwrap();
        assert_eq!(group, "player");
        assert_eq!(props.get("policy.tag"), Some("music"));
        assert_eq!(props.get("media.role"), Some("x"));
    }

    #[test]
    fn test_unknown_group_never_matches() {
        let mut list = StreamRuleList::new();
        list.add(StreamRuleDef::new("player").with_uid(1000)).unwrap();

        let query = StreamQuery::new(None, Some(1000), None);
        let groups = GroupTable::new();
        assert!(list.find(&Proplist::new(), &query, &groups).is_none());
    }

    #[test]
    fn test_sink_bound_rule_follows_route() {
        let mut list = StreamRuleList::new();
        list.add(
            StreamRuleDef::new("btplayer")
                .with_predicate(role("music"))
                .with_sink("bluez_sink.XX"),
        )
        .unwrap();
        let props = Proplist::new().with("media.role", "music");
        let query = StreamQuery::default();

        assert!(list.find(&props, &query, &StaticGroups).is_none());
        list.update_route("bluez_sink.XX");
        assert!(list.find(&props, &query, &StaticGroups).is_some());
        list.update_route("alsa_output.0");
        assert!(list.find(&props, &query, &StaticGroups).is_none());
    }
}
