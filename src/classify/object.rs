// SPDX-License-Identifier: GPL-3.0-only

//! Host object capabilities
//!
//! Predicates never look inside host structures directly. Every host object
//! type exposes its kind, its display name and a property lookup through
//! [`PolicyObject`]; cards additionally expose their profile catalog.

use crate::constants::PROP_MEDIA_NAME;
use crate::errors::PolicyError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

/// Kind of host object a predicate is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectKind {
    Module,
    Card,
    Sink,
    Source,
    SinkInput,
    SourceOutput,
    /// Sink or source port
    Port,
    /// Card profile
    Profile,
    /// Bare property list (streams, app-id lookups)
    Proplist,
    /// Plain string compared as-is
    Literal,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectKind::Module => "module",
            ObjectKind::Card => "card",
            ObjectKind::Sink => "sink",
            ObjectKind::Source => "source",
            ObjectKind::SinkInput => "sink-input",
            ObjectKind::SourceOutput => "source-output",
            ObjectKind::Port => "port",
            ObjectKind::Profile => "profile",
            ObjectKind::Proplist => "proplist",
            ObjectKind::Literal => "string",
        };
        write!(f, "{}", s)
    }
}

/// Accessors a predicate needs from a live host object
pub trait PolicyObject {
    fn kind(&self) -> ObjectKind;

    /// Display name, if the object has one
    fn name(&self) -> Option<&str>;

    /// Property value by key
    fn property(&self, key: &str) -> Option<&str>;

    /// The object itself when it is a plain string
    fn literal(&self) -> Option<&str> {
        None
    }
}

impl PolicyObject for &str {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Literal
    }

    fn name(&self) -> Option<&str> {
        Some(*self)
    }

    fn property(&self, _key: &str) -> Option<&str> {
        None
    }

    fn literal(&self) -> Option<&str> {
        Some(*self)
    }
}

impl PolicyObject for String {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Literal
    }

    fn name(&self) -> Option<&str> {
        Some(self.as_str())
    }

    fn property(&self, _key: &str) -> Option<&str> {
        None
    }

    fn literal(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

/// Ordered key/value property list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Proplist(BTreeMap<String, String>);

impl Proplist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder form of [`Proplist::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge `other` into this list; `other` wins on key conflicts
    pub fn update_replace(&mut self, other: &Proplist) {
        for (key, value) in other.iter() {
            self.0.insert(key.to_string(), value.to_string());
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Proplist {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Parses `key=value` pairs separated by whitespace or commas.
/// Values may be double-quoted to carry separators.
impl FromStr for Proplist {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut list = Proplist::new();
        let mut chars = s.chars().peekable();

        loop {
            while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
                chars.next();
            }
            if chars.peek().is_none() {
                break;
            }

            let mut key = String::new();
            while let Some(&c) = chars.peek() {
                if c == '=' || c.is_whitespace() || c == ',' {
                    break;
                }
                key.push(c);
                chars.next();
            }

            if chars.next() != Some('=') || key.is_empty() {
                return Err(PolicyError::Config(format!(
                    "invalid property definition '{}'",
                    s
                )));
            }

            let mut value = String::new();
            if chars.peek() == Some(&'"') {
                chars.next();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    value.push(c);
                }
                if !closed {
                    return Err(PolicyError::Config(format!(
                        "unterminated quote in '{}'",
                        s
                    )));
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == ',' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
            }

            list.set(key, value);
        }

        Ok(list)
    }
}

impl PolicyObject for Proplist {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Proplist
    }

    fn name(&self) -> Option<&str> {
        None
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.get(key)
    }
}

/// Hardware availability of a card profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    #[default]
    Unknown,
    Yes,
    No,
}

impl Availability {
    /// Parse the host's textual availability ("yes", "no", anything else is unknown)
    pub fn from_host(value: &str) -> Self {
        match value {
            "yes" => Availability::Yes,
            "no" => Availability::No,
            _ => Availability::Unknown,
        }
    }
}

/// Profiles offered by a card
pub trait ProfileCatalog {
    /// Availability of `profile`, `None` when the card does not offer it
    fn availability(&self, profile: &str) -> Option<Availability>;
}

impl ProfileCatalog for HashMap<String, Availability> {
    fn availability(&self, profile: &str) -> Option<Availability> {
        self.get(profile).copied()
    }
}

impl ProfileCatalog for [CardProfile] {
    fn availability(&self, profile: &str) -> Option<Availability> {
        self.iter()
            .find(|p| p.name == profile)
            .map(|p| p.available)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardProfile {
    pub name: String,
    pub available: Availability,
}

impl CardProfile {
    pub fn new(name: impl Into<String>, available: Availability) -> Self {
        Self {
            name: name.into(),
            available,
        }
    }
}

/// Running state of a sink or source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    Running,
    #[default]
    Idle,
    Suspended,
}

/// A sink or source as seen by the engine
#[derive(Debug, Clone)]
pub struct DeviceNode {
    kind: ObjectKind,
    pub name: String,
    pub properties: Proplist,
    pub state: DeviceState,
}

impl DeviceNode {
    pub fn sink(name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::Sink,
            name: name.into(),
            properties: Proplist::new(),
            state: DeviceState::default(),
        }
    }

    pub fn source(name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::Source,
            name: name.into(),
            properties: Proplist::new(),
            state: DeviceState::default(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.set(key, value);
        self
    }

    pub fn with_state(mut self, state: DeviceState) -> Self {
        self.state = state;
        self
    }

    pub fn is_running(&self) -> bool {
        self.state == DeviceState::Running
    }
}

impl PolicyObject for DeviceNode {
    fn kind(&self) -> ObjectKind {
        self.kind
    }

    fn name(&self) -> Option<&str> {
        Some(self.name.as_str())
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key)
    }
}

/// A card with its profile catalog
#[derive(Debug, Clone)]
pub struct CardNode {
    pub name: String,
    pub properties: Proplist,
    pub profiles: Vec<CardProfile>,
}

impl CardNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Proplist::new(),
            profiles: Vec::new(),
        }
    }

    pub fn with_profile(mut self, name: impl Into<String>, available: Availability) -> Self {
        self.profiles.push(CardProfile::new(name, available));
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.set(key, value);
        self
    }
}

impl PolicyObject for CardNode {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Card
    }

    fn name(&self) -> Option<&str> {
        Some(self.name.as_str())
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key)
    }
}

impl ProfileCatalog for CardNode {
    fn availability(&self, profile: &str) -> Option<Availability> {
        self.profiles.as_slice().availability(profile)
    }
}

/// A playback or capture stream; its name is the `media.name` property
#[derive(Debug, Clone)]
pub struct StreamNode {
    kind: ObjectKind,
    pub properties: Proplist,
}

impl StreamNode {
    pub fn playback(properties: Proplist) -> Self {
        Self {
            kind: ObjectKind::SinkInput,
            properties,
        }
    }

    pub fn capture(properties: Proplist) -> Self {
        Self {
            kind: ObjectKind::SourceOutput,
            properties,
        }
    }
}

impl PolicyObject for StreamNode {
    fn kind(&self) -> ObjectKind {
        self.kind
    }

    fn name(&self) -> Option<&str> {
        self.properties.get(PROP_MEDIA_NAME)
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key)
    }
}
