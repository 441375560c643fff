// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the policy engine

use std::fmt;

/// Result type alias using PolicyError
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Main error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Predicate construction errors
    Match(MatchError),
    /// Rejected rule definitions
    Rule(RuleError),
    /// Helper module load errors
    Module(ModuleError),
    /// Configuration errors
    Config(String),
    /// Filesystem errors
    Io(String),
    /// Generic error with message
    Other(String),
}

/// Predicate construction errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// The method needs an argument but none was given
    MissingArgument(String),
    /// A "matches" argument did not compile
    InvalidRegex { pattern: String, reason: String },
    /// The target is not valid for the object kind (e.g. a name match on a property list)
    InvalidTarget(String),
    /// Unknown method token
    UnknownMethod(String),
    /// Text form could not be split into target, method and argument
    Malformed(String),
}

/// Rule definition errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Type label or group name is empty
    EmptyType,
    /// Card rule without any slot
    NoCardSlots(String),
    /// Card rule with more slots than supported
    TooManyCardSlots { type_label: String, count: usize },
    /// Card slots must name a concrete predicate
    AlwaysNotAllowed(String),
    /// Stream rule without property, uid or executable filter
    MissingStreamFilter(String),
    /// Port entry with an empty port name
    InvalidPort(String),
    /// Stream property overlay that is not `key=value` text
    InvalidProperties(String),
    /// The rule's predicate failed to build
    Predicate(MatchError),
}

/// Helper module errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// The host refused or failed to load the module
    LoadFailed { name: String, reason: String },
    /// The host tooling could not be reached
    HostUnavailable(String),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::Match(e) => write!(f, "Match error: {}", e),
            PolicyError::Rule(e) => write!(f, "Rule error: {}", e),
            PolicyError::Module(e) => write!(f, "Module error: {}", e),
            PolicyError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PolicyError::Io(msg) => write!(f, "I/O error: {}", msg),
            PolicyError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::MissingArgument(method) => {
                write!(f, "Method '{}' requires an argument", method)
            }
            MatchError::InvalidRegex { pattern, reason } => {
                write!(f, "Failed to compile regex from '{}': {}", pattern, reason)
            }
            MatchError::InvalidTarget(msg) => write!(f, "Invalid match target: {}", msg),
            MatchError::UnknownMethod(method) => write!(f, "Invalid method '{}'", method),
            MatchError::Malformed(def) => write!(f, "Invalid definition '{}'", def),
        }
    }
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::EmptyType => write!(f, "Empty type or group name"),
            RuleError::NoCardSlots(ty) => write!(f, "Card '{}' has no definitions", ty),
            RuleError::TooManyCardSlots { type_label, count } => write!(
                f,
                "Card '{}' has {} definitions, at most {} allowed",
                type_label,
                count,
                crate::constants::CARD_MAX_SLOTS
            ),
            RuleError::AlwaysNotAllowed(ty) => {
                write!(f, "Card '{}' can not use an unconditional match", ty)
            }
            RuleError::MissingStreamFilter(group) => write!(
                f,
                "Stream for group '{}' needs a property, uid or exe filter",
                group
            ),
            RuleError::InvalidPort(msg) => write!(f, "Invalid port entry: {}", msg),
            RuleError::InvalidProperties(def) => {
                write!(f, "Invalid property definition '{}'", def)
            }
            RuleError::Predicate(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleError::LoadFailed { name, reason } => {
                write!(f, "Failed to load {}: {}", name, reason)
            }
            ModuleError::HostUnavailable(msg) => write!(f, "Module host not available: {}", msg),
        }
    }
}

impl std::error::Error for PolicyError {}
impl std::error::Error for MatchError {}
impl std::error::Error for RuleError {}
impl std::error::Error for ModuleError {}

impl From<MatchError> for PolicyError {
    fn from(err: MatchError) -> Self {
        PolicyError::Match(err)
    }
}

impl From<RuleError> for PolicyError {
    fn from(err: RuleError) -> Self {
        PolicyError::Rule(err)
    }
}

impl From<ModuleError> for PolicyError {
    fn from(err: ModuleError) -> Self {
        PolicyError::Module(err)
    }
}

impl From<MatchError> for RuleError {
    fn from(err: MatchError) -> Self {
        RuleError::Predicate(err)
    }
}

impl From<String> for PolicyError {
    fn from(msg: String) -> Self {
        PolicyError::Other(msg)
    }
}

impl From<&str> for PolicyError {
    fn from(msg: &str) -> Self {
        PolicyError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for PolicyError {
    fn from(err: std::io::Error) -> Self {
        PolicyError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        PolicyError::Config(err.to_string())
    }
}
