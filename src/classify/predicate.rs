// SPDX-License-Identifier: GPL-3.0-only

//! Compiled boolean tests against a single host object
//!
//! A predicate resolves one comparison string from the object (its name, one
//! of its properties, or the object itself when it is a plain string) and
//! applies a method to it:
//!
//! - `equals` - exact match
//! - `startswith` - prefix match
//! - `matches` - regular expression that must cover the whole string
//! - `true` - always matches
//!
//! The text form consumed from configuration is `[key@]method:value`, where a
//! missing key (or the key `(name)`) selects the object's name.

use super::object::{ObjectKind, PolicyObject};
use crate::constants::NAME_TARGET;
use crate::errors::MatchError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comparison method as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Equals,
    StartsWith,
    Matches,
    Always,
}

impl MethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Equals => "equals",
            MethodKind::StartsWith => "startswith",
            MethodKind::Matches => "matches",
            MethodKind::Always => "true",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MethodKind {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(MethodKind::Equals),
            "startswith" => Ok(MethodKind::StartsWith),
            "matches" => Ok(MethodKind::Matches),
            "true" => Ok(MethodKind::Always),
            other => Err(MatchError::UnknownMethod(other.to_string())),
        }
    }
}

/// What the comparison string is taken from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetSpec {
    /// The object's display name
    Name,
    /// One property of the object
    Property(String),
    /// The object itself, which must be a plain string
    Literal,
}

/// Uncompiled predicate, as split out of the configuration text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PredicateSpec {
    pub target: TargetSpec,
    pub method: MethodKind,
    pub arg: Option<String>,
}

impl PredicateSpec {
    pub fn name(method: MethodKind, arg: impl Into<String>) -> Self {
        Self {
            target: TargetSpec::Name,
            method,
            arg: Some(arg.into()),
        }
    }

    pub fn property(key: impl Into<String>, method: MethodKind, arg: impl Into<String>) -> Self {
        Self {
            target: TargetSpec::Property(key.into()),
            method,
            arg: Some(arg.into()),
        }
    }

    pub fn literal(method: MethodKind, arg: impl Into<String>) -> Self {
        Self {
            target: TargetSpec::Literal,
            method,
            arg: Some(arg.into()),
        }
    }

    /// Unconditional match on the object's name
    pub fn always() -> Self {
        Self {
            target: TargetSpec::Name,
            method: MethodKind::Always,
            arg: None,
        }
    }

    /// Target key, `(name)` for the name target
    pub fn key(&self) -> &str {
        match &self.target {
            TargetSpec::Name => NAME_TARGET,
            TargetSpec::Property(key) => key.as_str(),
            TargetSpec::Literal => "(string)",
        }
    }
}

impl FromStr for PredicateSpec {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, arg) = match s.split_once(':') {
            Some((head, arg)) => (head, Some(arg.to_string())),
            None => (s, None),
        };

        let (key, method) = match head.split_once('@') {
            Some((key, method)) => (Some(key), method),
            None => (None, head),
        };

        let method: MethodKind = method.trim().parse()?;
        if arg.is_none() && method != MethodKind::Always {
            return Err(MatchError::Malformed(s.to_string()));
        }

        let target = match key {
            None => TargetSpec::Name,
            Some(k) if k == NAME_TARGET => TargetSpec::Name,
            Some("") => return Err(MatchError::Malformed(s.to_string())),
            Some(k) => TargetSpec::Property(k.to_string()),
        };

        Ok(Self {
            target,
            method,
            arg,
        })
    }
}

impl TryFrom<String> for PredicateSpec {
    type Error = MatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PredicateSpec> for String {
    fn from(spec: PredicateSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for PredicateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let TargetSpec::Property(key) = &self.target {
            write!(f, "{}@", key)?;
        }
        match &self.arg {
            Some(arg) if self.method != MethodKind::Always => write!(f, "{}:{}", self.method, arg),
            _ => write!(f, "{}", self.method),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Name,
    Property(String),
    Literal,
}

#[derive(Debug, Clone)]
enum Method {
    Equals(String),
    StartsWith(String),
    Matches { regex: Regex, source: String },
    Always,
}

/// A compiled predicate
#[derive(Debug, Clone)]
pub struct Predicate {
    kind: ObjectKind,
    target: Target,
    method: Method,
}

impl Predicate {
    /// Compile `spec` for objects of `kind`
    pub fn new(kind: ObjectKind, spec: &PredicateSpec) -> Result<Self, MatchError> {
        let target = match &spec.target {
            TargetSpec::Name => Target::Name,
            TargetSpec::Property(key) => Target::Property(key.clone()),
            TargetSpec::Literal => Target::Literal,
        };

        if kind == ObjectKind::Proplist
            && spec.method != MethodKind::Always
            && !matches!(target, Target::Property(_))
        {
            return Err(MatchError::InvalidTarget(format!(
                "property list can only be matched by property, got '{}'",
                spec.key()
            )));
        }

        let required_arg = || {
            spec.arg
                .clone()
                .ok_or_else(|| MatchError::MissingArgument(spec.method.to_string()))
        };

        let method = match spec.method {
            MethodKind::Equals => Method::Equals(required_arg()?),
            MethodKind::StartsWith => Method::StartsWith(required_arg()?),
            MethodKind::Matches => {
                let source = required_arg()?;
                let regex = Regex::new(&format!("^(?:{})$", source)).map_err(|e| {
                    MatchError::InvalidRegex {
                        pattern: source.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Method::Matches { regex, source }
            }
            MethodKind::Always => Method::Always,
        };

        Ok(Self {
            kind,
            target,
            method,
        })
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn method(&self) -> MethodKind {
        match self.method {
            Method::Equals(_) => MethodKind::Equals,
            Method::StartsWith(_) => MethodKind::StartsWith,
            Method::Matches { .. } => MethodKind::Matches,
            Method::Always => MethodKind::Always,
        }
    }

    /// Argument as it was written
    pub fn arg(&self) -> Option<&str> {
        match &self.method {
            Method::Equals(arg) | Method::StartsWith(arg) => Some(arg.as_str()),
            Method::Matches { source, .. } => Some(source.as_str()),
            Method::Always => None,
        }
    }

    /// Uncompiled form of this predicate
    pub fn spec(&self) -> PredicateSpec {
        PredicateSpec {
            target: match &self.target {
                Target::Name => TargetSpec::Name,
                Target::Property(key) => TargetSpec::Property(key.clone()),
                Target::Literal => TargetSpec::Literal,
            },
            method: self.method(),
            arg: self.arg().map(str::to_string),
        }
    }

    /// Whether this predicate was built from `spec`
    pub fn is_same_as(&self, spec: &PredicateSpec) -> bool {
        let own = self.spec();
        own.target == spec.target
            && own.method == spec.method
            && (own.method == MethodKind::Always || own.arg == spec.arg)
    }

    /// Apply the method to an already resolved string
    pub fn test(&self, value: &str) -> bool {
        match &self.method {
            Method::Equals(arg) => value == arg,
            Method::StartsWith(arg) => value.starts_with(arg.as_str()),
            Method::Matches { regex, .. } => regex.is_match(value),
            Method::Always => true,
        }
    }

    /// Evaluate against a possibly absent object
    pub fn evaluate(&self, object: Option<&dyn PolicyObject>) -> bool {
        let Some(object) = object else {
            return false;
        };

        if matches!(self.method, Method::Always) {
            return true;
        }

        let value = match &self.target {
            Target::Literal => object.literal(),
            Target::Name => object.name(),
            Target::Property(key) => object.property(key),
        };

        value.is_some_and(|v| self.test(v))
    }

    pub fn matches(&self, object: &dyn PolicyObject) -> bool {
        self.evaluate(Some(object))
    }

    /// Like [`Predicate::matches`], but only for objects of `expected` kind
    pub fn matches_kind(&self, expected: ObjectKind, object: &dyn PolicyObject) -> bool {
        self.kind == expected && object.kind() == expected && self.matches(object)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Literal => write!(f, "(string) ")?,
            Target::Name => write!(f, "(name) ")?,
            Target::Property(key) => write!(f, "(property) {} ", key)?,
        }
        write!(f, "{}:{}", self.method(), self.arg().unwrap_or(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::object::{DeviceNode, Proplist};

    fn compile(kind: ObjectKind, text: &str) -> Predicate {
        Predicate::new(kind, &text.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_parse_name_and_property_forms() {
        let spec: PredicateSpec = "startswith:alsa_output".parse().unwrap();
        assert_eq!(spec.target, TargetSpec::Name);
        assert_eq!(spec.method, MethodKind::StartsWith);
        assert_eq!(spec.arg.as_deref(), Some("alsa_output"));

        let spec: PredicateSpec = "media.role@equals:music".parse().unwrap();
        assert_eq!(spec.target, TargetSpec::Property("media.role".into()));

        let spec: PredicateSpec = "(name)@equals:foo".parse().unwrap();
        assert_eq!(spec.target, TargetSpec::Name);

        let spec: PredicateSpec = "true".parse().unwrap();
        assert_eq!(spec, PredicateSpec::always());
    }

    #[test]
    fn test_parse_rejects_bad_text() {
        assert!(matches!(
            "contains:x".parse::<PredicateSpec>(),
            Err(MatchError::UnknownMethod(_))
        ));
        assert!(matches!(
            "equals".parse::<PredicateSpec>(),
            Err(MatchError::Malformed(_))
        ));
        assert!("@equals:x".parse::<PredicateSpec>().is_err());
    }

    #[test]
    fn test_display_round_trips_text_form() {
        for text in ["equals:a", "media.role@matches:mu.*", "true"] {
            let spec: PredicateSpec = text.parse().unwrap();
            assert_eq!(spec.to_string(), text);
        }
    }

    #[test]
    fn test_regex_is_anchored() {
        let p = compile(ObjectKind::Sink, "matches:headset");
        assert!(p.matches(&DeviceNode::sink("headset")));
        assert!(!p.matches(&DeviceNode::sink("alsa_output.headset.0")));

        let p = compile(ObjectKind::Sink, "matches:.*headset.*");
        assert!(p.matches(&DeviceNode::sink("alsa_output.headset.0")));

        // Alternation must not escape the anchors
        let p = compile(ObjectKind::Sink, "matches:a|b");
        assert!(p.matches(&DeviceNode::sink("a")));
        assert!(!p.matches(&DeviceNode::sink("ab")));
    }

    #[test]
    fn test_invalid_regex_fails() {
        let spec = PredicateSpec::name(MethodKind::Matches, "(unclosed");
        assert!(matches!(
            Predicate::new(ObjectKind::Sink, &spec),
            Err(MatchError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_missing_argument_fails() {
        let spec = PredicateSpec {
            target: TargetSpec::Name,
            method: MethodKind::Equals,
            arg: None,
        };
        assert!(matches!(
            Predicate::new(ObjectKind::Sink, &spec),
            Err(MatchError::MissingArgument(_))
        ));
    }

    #[test]
    fn test_always_ignores_argument() {
        let spec = PredicateSpec {
            target: TargetSpec::Property("missing".into()),
            method: MethodKind::Always,
            arg: Some("whatever".into()),
        };
        let p = Predicate::new(ObjectKind::Sink, &spec).unwrap();
        assert!(p.matches(&DeviceNode::sink("any")));
        assert!(!p.evaluate(None));
    }

    #[test]
    fn test_missing_property_does_not_match() {
        let p = compile(ObjectKind::Sink, "device.bus@equals:usb");
        assert!(!p.matches(&DeviceNode::sink("s")));
        assert!(p.matches(&DeviceNode::sink("s").with_property("device.bus", "usb")));
    }

    #[test]
    fn test_proplist_requires_property_target() {
        let spec = PredicateSpec::name(MethodKind::Equals, "x");
        assert!(matches!(
            Predicate::new(ObjectKind::Proplist, &spec),
            Err(MatchError::InvalidTarget(_))
        ));

        let p = compile(ObjectKind::Proplist, "media.role@equals:phone");
        assert!(p.matches(&Proplist::new().with("media.role", "phone")));
    }

    #[test]
    fn test_literal_target() {
        let p = Predicate::new(
            ObjectKind::Literal,
            &PredicateSpec::literal(MethodKind::StartsWith, "ihf"),
        )
        .unwrap();
        assert!(p.matches(&"ihfandheadset"));
        // Non-string objects have nothing to compare
        assert!(!p.matches(&DeviceNode::sink("ihf")));
    }

    #[test]
    fn test_matches_kind_checks_object_kind() {
        let p = compile(ObjectKind::Sink, "equals:out");
        assert!(p.matches_kind(ObjectKind::Sink, &DeviceNode::sink("out")));
        assert!(!p.matches_kind(ObjectKind::Sink, &DeviceNode::source("out")));
        assert!(!p.matches_kind(ObjectKind::Source, &DeviceNode::source("out")));
    }

    #[test]
    fn test_definition_display() {
        let p = compile(ObjectKind::Sink, "startswith:alsa_");
        assert_eq!(p.to_string(), "(name) startswith:alsa_");
        let p = compile(ObjectKind::Proplist, "media.role@equals:music");
        assert_eq!(p.to_string(), "(property) media.role equals:music");
    }
}
