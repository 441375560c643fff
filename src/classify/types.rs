// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for the rule tables

use super::object::ObjectKind;
use serde::{Deserialize, Serialize};

/// Device direction; each has its own rule table and module slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sink,
    Source,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Sink, Direction::Source];

    /// Kind of host object this direction classifies
    pub fn object_kind(&self) -> ObjectKind {
        match self {
            Direction::Sink => ObjectKind::Sink,
            Direction::Source => ObjectKind::Source,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Direction::Sink => 0,
            Direction::Source => 1,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Sink => write!(f, "sink"),
            Direction::Source => write!(f, "source"),
        }
    }
}

/// Helper module loaded while a device type is the active route
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    #[serde(default)]
    pub args: Option<String>,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>, args: Option<&str>) -> Self {
        Self {
            name: name.into(),
            args: args.map(str::to_string),
        }
    }

    /// Parse the `name@args` form; `%20` in the arguments stands for a space
    pub fn parse(def: &str) -> Option<Self> {
        let (name, args) = match def.split_once('@') {
            Some((name, args)) => (name, Some(args.replace("%20", " "))),
            None => (def, None),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            args,
        })
    }
}

impl std::fmt::Display for ModuleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.args {
            Some(args) => write!(f, "{} {}", self.name, args),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Whether an add created a new label or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleChange {
    Added,
    Updated,
}

impl RuleChange {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            RuleChange::Added => "added",
            RuleChange::Updated => "updated",
        }
    }
}

/// Type labels an object was classified into, in rule declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationResult<'a> {
    types: Vec<&'a str>,
}

impl<'a> ClassificationResult<'a> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            types: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, type_label: &'a str) {
        self.types.push(type_label);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains(&self, type_label: &str) -> bool {
        self.types.iter().any(|t| *t == type_label)
    }

    pub fn as_slice(&self) -> &[&'a str] {
        &self.types
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.types.iter().copied()
    }

    /// Owned copy of the labels
    pub fn to_vec(&self) -> Vec<String> {
        self.types.iter().map(|t| t.to_string()).collect()
    }
}

/// Renders the space separated type list
impl std::fmt::Display for ClassificationResult<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.types.join(" "))
    }
}

impl<'a> IntoIterator for ClassificationResult<'a> {
    type Item = &'a str;
    type IntoIter = std::vec::IntoIter<&'a str>;

    fn into_iter(self) -> Self::IntoIter {
        self.types.into_iter()
    }
}

impl PartialEq<[&str]> for ClassificationResult<'_> {
    fn eq(&self, other: &[&str]) -> bool {
        self.types.as_slice() == other
    }
}

impl<const N: usize> PartialEq<[&str; N]> for ClassificationResult<'_> {
    fn eq(&self, other: &[&str; N]) -> bool {
        self.types.as_slice() == other.as_slice()
    }
}
