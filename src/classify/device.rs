// SPDX-License-Identifier: GPL-3.0-only

//! Sink and source rule tables
//!
//! One table exists per [`Direction`]. Rules are kept in declaration order and
//! keyed by their type label: adding a rule under a known label replaces the
//! old rule in place, a new label is appended.

use super::object::PolicyObject;
use super::predicate::{Predicate, PredicateSpec};
use super::types::{ClassificationResult, Direction, ModuleSpec, RuleChange};
use crate::constants::DeviceFlags;
use crate::errors::RuleError;
use std::time::Duration;
use tracing::{debug, info};

/// Port selection entry of a rule definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub port: String,
    pub predicate: PredicateSpec,
}

impl PortSpec {
    pub fn new(port: impl Into<String>, predicate: PredicateSpec) -> Self {
        Self {
            port: port.into(),
            predicate,
        }
    }
}

/// Uncompiled device rule, as handed to the registration API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRuleDef {
    pub type_label: String,
    pub predicate: PredicateSpec,
    pub ports: Vec<PortSpec>,
    pub module: Option<ModuleSpec>,
    pub flags: DeviceFlags,
    /// Only meaningful together with `DELAYED_PORT_CHANGE`
    pub port_change_delay: Duration,
}

impl DeviceRuleDef {
    pub fn new(type_label: impl Into<String>, predicate: PredicateSpec) -> Self {
        Self {
            type_label: type_label.into(),
            predicate,
            ports: Vec::new(),
            module: None,
            flags: DeviceFlags::empty(),
            port_change_delay: Duration::ZERO,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>, predicate: PredicateSpec) -> Self {
        self.ports.push(PortSpec::new(port, predicate));
        self
    }

    pub fn with_module(mut self, module: ModuleSpec) -> Self {
        self.module = Some(module);
        self
    }

    pub fn with_flags(mut self, flags: DeviceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_port_change_delay(mut self, delay: Duration) -> Self {
        self.port_change_delay = delay;
        self
    }
}

/// A port the device switches to when its type becomes the route target
#[derive(Debug, Clone)]
pub struct PortEntry {
    port_name: String,
    predicate: Predicate,
}

impl PortEntry {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

/// Per-rule data handed back by type lookups
#[derive(Debug, Clone)]
pub struct DeviceData {
    ports: Vec<PortEntry>,
    module: Option<ModuleSpec>,
    flags: DeviceFlags,
    port_change_delay: Duration,
}

impl DeviceData {
    pub fn ports(&self) -> &[PortEntry] {
        &self.ports
    }

    pub fn module(&self) -> Option<&ModuleSpec> {
        self.module.as_ref()
    }

    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    pub fn port_change_delay(&self) -> Duration {
        self.port_change_delay
    }

    /// First port entry whose predicate matches `object`
    pub fn find_port(&self, object: &dyn PolicyObject) -> Option<&PortEntry> {
        self.ports
            .iter()
            .find(|entry| entry.predicate.matches_kind(object.kind(), object))
    }
}

#[derive(Debug, Clone)]
pub struct DeviceRule {
    type_label: String,
    predicate: Predicate,
    data: DeviceData,
}

impl DeviceRule {
    pub fn type_label(&self) -> &str {
        &self.type_label
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn data(&self) -> &DeviceData {
        &self.data
    }
}

/// Ordered rules for one direction
#[derive(Debug, Clone)]
pub struct DeviceRuleTable {
    direction: Direction,
    rules: Vec<DeviceRule>,
}

impl DeviceRuleTable {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            rules: Vec::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &DeviceRule> {
        self.rules.iter()
    }

    pub fn get(&self, type_label: &str) -> Option<&DeviceRule> {
        self.rules.iter().find(|r| r.type_label == type_label)
    }

    /// Insert a rule, or replace the rule with the same type label.
    ///
    /// The whole rule is compiled before the table is touched, so a failing
    /// definition leaves the table as it was.
    pub fn add_or_replace(&mut self, def: DeviceRuleDef) -> Result<RuleChange, RuleError> {
        let rule = self.build(def)?;

        let (index, change) = match self
            .rules
            .iter()
            .position(|r| r.type_label == rule.type_label)
        {
            Some(index) => {
                self.rules[index] = rule;
                (index, RuleChange::Updated)
            }
            None => {
                self.rules.push(rule);
                (self.rules.len() - 1, RuleChange::Added)
            }
        };

        let rule = &self.rules[index];
        let ports: Vec<String> = rule
            .data
            .ports
            .iter()
            .map(|p| format!("{}:{}", p.predicate, p.port_name))
            .collect();
        info!(
            direction = %self.direction,
            type_label = %rule.type_label,
            predicate = %rule.predicate,
            ports = %ports.join(","),
            module = ?rule.data.module,
            flags = ?rule.data.flags,
            "device rule {}",
            change.as_str()
        );

        Ok(change)
    }

    fn build(&self, def: DeviceRuleDef) -> Result<DeviceRule, RuleError> {
        if def.type_label.is_empty() {
            return Err(RuleError::EmptyType);
        }

        let kind = self.direction.object_kind();
        let predicate = Predicate::new(kind, &def.predicate)?;

        let ports = def
            .ports
            .into_iter()
            .map(|port| {
                if port.port.is_empty() {
                    return Err(RuleError::InvalidPort(format!(
                        "empty port name in '{}'",
                        def.type_label
                    )));
                }
                Ok(PortEntry {
                    port_name: port.port,
                    predicate: Predicate::new(kind, &port.predicate)?,
                })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;

        Ok(DeviceRule {
            type_label: def.type_label,
            predicate,
            data: DeviceData {
                ports,
                module: def.module,
                flags: def.flags,
                port_change_delay: def.port_change_delay,
            },
        })
    }

    /// Drop the rule with `type_label`; returns whether one existed
    pub fn remove(&mut self, type_label: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.type_label != type_label);
        let removed = self.rules.len() != before;
        if removed {
            info!(direction = %self.direction, type_label, "device rule removed");
        }
        removed
    }

    /// Labels of all rules matching `object` whose flags satisfy
    /// `flags & mask == value`, in declaration order
    pub fn classify(
        &self,
        object: &dyn PolicyObject,
        flag_mask: DeviceFlags,
        flag_value: DeviceFlags,
    ) -> ClassificationResult<'_> {
        let mut result = ClassificationResult::with_capacity(self.rules.len());

        for rule in &self.rules {
            if rule.predicate.matches(object) && (rule.data.flags & flag_mask) == flag_value {
                result.push(&rule.type_label);
            }
        }

        debug!(
            direction = %self.direction,
            object = object.name().unwrap_or("<unnamed>"),
            types = %result,
            "classified device"
        );

        result
    }

    /// Data of the first rule labelled `type_label` that matches `object`
    pub fn is_typeof(&self, object: &dyn PolicyObject, type_label: &str) -> Option<&DeviceData> {
        self.rules
            .iter()
            .find(|r| r.type_label == type_label && r.predicate.matches(object))
            .map(|r| &r.data)
    }

    /// Data of the first rule labelled `type_label` with a port entry for `object`
    pub fn is_port_typeof(
        &self,
        object: &dyn PolicyObject,
        type_label: &str,
    ) -> Option<&DeviceData> {
        self.rules
            .iter()
            .filter(|r| r.type_label == type_label && !r.data.ports.is_empty())
            .find(|r| r.data.find_port(object).is_some())
            .map(|r| &r.data)
    }

    /// Every label in declaration order
    pub fn all_types(&self) -> ClassificationResult<'_> {
        let mut result = ClassificationResult::with_capacity(self.rules.len());
        for rule in &self.rules {
            result.push(&rule.type_label);
        }
        result
    }
}
