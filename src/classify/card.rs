// SPDX-License-Identifier: GPL-3.0-only

//! Card rule table
//!
//! A card rule carries up to [`CARD_MAX_SLOTS`] priority slots. Each slot names
//! the profile the card should run when its predicate matches; slot 0 has the
//! highest priority. During reclassification (after a profile availability
//! change) a slot only counts while its profile is not reported unavailable.

use super::object::{Availability, ObjectKind, PolicyObject, ProfileCatalog};
use super::predicate::{MethodKind, Predicate, PredicateSpec};
use super::types::{ClassificationResult, RuleChange};
use crate::constants::{CARD_MAX_SLOTS, CardFlags};
use crate::errors::RuleError;
use tracing::{debug, info};

/// Uncompiled card slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSlotDef {
    pub predicate: PredicateSpec,
    pub profile: Option<String>,
    pub flags: CardFlags,
}

impl CardSlotDef {
    pub fn new(predicate: PredicateSpec, profile: Option<&str>) -> Self {
        Self {
            predicate,
            profile: profile.map(str::to_string),
            flags: CardFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: CardFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Uncompiled card rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRuleDef {
    pub type_label: String,
    pub slots: Vec<CardSlotDef>,
}

impl CardRuleDef {
    pub fn new(type_label: impl Into<String>) -> Self {
        Self {
            type_label: type_label.into(),
            slots: Vec::new(),
        }
    }

    pub fn with_slot(mut self, slot: CardSlotDef) -> Self {
        self.slots.push(slot);
        self
    }
}

#[derive(Debug, Clone)]
pub struct CardSlot {
    predicate: Predicate,
    profile: Option<String>,
    flags: CardFlags,
}

impl CardSlot {
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Profile to switch to, `None` to keep the current one
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn flags(&self) -> CardFlags {
        self.flags
    }

    fn supports_profile(&self, profiles: &dyn ProfileCatalog, reclassify: bool) -> bool {
        match &self.profile {
            None => true,
            Some(profile) => match profiles.availability(profile) {
                None => false,
                Some(available) => !reclassify || available != Availability::No,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct CardRule {
    type_label: String,
    slots: Vec<CardSlot>,
}

impl CardRule {
    pub fn type_label(&self) -> &str {
        &self.type_label
    }

    /// Slots in priority order
    pub fn slots(&self) -> &[CardSlot] {
        &self.slots
    }
}

#[derive(Debug, Clone, Default)]
pub struct CardRuleTable {
    rules: Vec<CardRule>,
}

impl CardRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &CardRule> {
        self.rules.iter()
    }

    pub fn get(&self, type_label: &str) -> Option<&CardRule> {
        self.rules.iter().find(|r| r.type_label == type_label)
    }

    /// Insert a rule, or replace the rule with the same type label
    pub fn add_or_replace(&mut self, def: CardRuleDef) -> Result<RuleChange, RuleError> {
        let rule = Self::build(def)?;

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
        for (priority, slot) in rule.slots.iter().enumerate() {
            info!(
                type_label = %rule.type_label,
                priority,
                predicate = %slot.predicate,
                profile = slot.profile.as_deref().unwrap_or(""),
                flags = ?slot.flags,
                "card rule {}",
                change.as_str()
            );
        }

        Ok(change)
    }

    fn build(def: CardRuleDef) -> Result<CardRule, RuleError> {
        if def.type_label.is_empty() {
            return Err(RuleError::EmptyType);
        }
        if def.slots.is_empty() {
            return Err(RuleError::NoCardSlots(def.type_label));
        }
        if def.slots.len() > CARD_MAX_SLOTS {
            return Err(RuleError::TooManyCardSlots {
                count: def.slots.len(),
                type_label: def.type_label,
            });
        }

        let mut slots = Vec::with_capacity(def.slots.len());
        for slot in def.slots {
            if slot.predicate.method == MethodKind::Always {
                return Err(RuleError::AlwaysNotAllowed(def.type_label));
            }
            slots.push(CardSlot {
                predicate: Predicate::new(ObjectKind::Card, &slot.predicate)?,
                profile: slot.profile,
                flags: slot.flags,
            });
        }

        Ok(CardRule {
            type_label: def.type_label,
            slots,
        })
    }

    pub fn remove(&mut self, type_label: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.type_label != type_label);
        let removed = self.rules.len() != before;
        if removed {
            info!(type_label, "card rule removed");
        }
        removed
    }

    /// Labels contributed by every slot that matches `card`, supports its
    /// profile and satisfies `flags & mask == value`.
    ///
    /// A label is contributed once per qualifying slot.
    pub fn classify(
        &self,
        card: &dyn PolicyObject,
        profiles: &dyn ProfileCatalog,
        flag_mask: CardFlags,
        flag_value: CardFlags,
        reclassify: bool,
    ) -> ClassificationResult<'_> {
        let mut result = ClassificationResult::with_capacity(self.rules.len() * CARD_MAX_SLOTS);

        for rule in &self.rules {
            for slot in &rule.slots {
                if slot.predicate.matches(card)
                    && slot.supports_profile(profiles, reclassify)
                    && (slot.flags & flag_mask) == flag_value
                {
                    result.push(&rule.type_label);
                }
            }
        }

        debug!(
            card = card.name().unwrap_or("<unnamed>"),
            reclassify,
            types = %result,
            "classified card"
        );

        result
    }

    /// First slot of the rule labelled `type_label` whose predicate matches
    /// `card`, with its priority (0 is highest)
    pub fn is_typeof_with_priority(
        &self,
        card: &dyn PolicyObject,
        type_label: &str,
    ) -> Option<(&CardSlot, usize)> {
        self.rules
            .iter()
            .filter(|r| r.type_label == type_label)
            .find_map(|r| {
                r.slots
                    .iter()
                    .enumerate()
                    .find(|(_, slot)| slot.predicate.matches(card))
                    .map(|(priority, slot)| (slot, priority))
            })
    }

    pub fn all_types(&self) -> ClassificationResult<'_> {
        let mut result = ClassificationResult::with_capacity(self.rules.len());
        for rule in &self.rules {
            result.push(&rule.type_label);
        }
        result
    }
}
