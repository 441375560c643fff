// SPDX-License-Identifier: GPL-3.0-only

//! Application id to policy group mapping
//!
//! Registrations arrive at run time from the control plane. An entry may carry
//! a property predicate that the stream's property list must also satisfy.

use super::object::{ObjectKind, Proplist};
use super::predicate::{Predicate, PredicateSpec};
use crate::errors::MatchError;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AppIdEntry {
    predicate: Option<Predicate>,
    group: String,
}

impl AppIdEntry {
    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    fn is_registered_with(&self, spec: Option<&PredicateSpec>) -> bool {
        match (&self.predicate, spec) {
            (None, None) => true,
            (Some(predicate), Some(spec)) => predicate.is_same_as(spec),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppIdRegistry {
    entries: HashMap<String, AppIdEntry>,
}

impl AppIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, app_id: &str) -> Option<&AppIdEntry> {
        self.entries.get(app_id)
    }

    /// Map `app_id` to `group`.
    ///
    /// Registering the same app id with the same predicate only moves it to
    /// the new group; any other registration replaces the entry.
    pub fn register(
        &mut self,
        app_id: &str,
        predicate: Option<&PredicateSpec>,
        group: &str,
    ) -> Result<(), MatchError> {
        if let Some(entry) = self.entries.get_mut(app_id) {
            if entry.is_registered_with(predicate) {
                debug!(
                    app_id,
                    from = %entry.group,
                    to = group,
                    "app id group changed"
                );
                entry.group = group.to_string();
                return Ok(());
            }
        }

        let predicate = predicate
            .map(|spec| Predicate::new(ObjectKind::Proplist, spec))
            .transpose()?;

        debug!(
            app_id,
            predicate = %predicate.as_ref().map(|p| p.to_string()).unwrap_or_default(),
            group,
            "app id added"
        );

        self.entries.insert(
            app_id.to_string(),
            AppIdEntry {
                predicate,
                group: group.to_string(),
            },
        );

        Ok(())
    }

    /// Forget `app_id`; returns the group it was mapped to
    pub fn unregister(&mut self, app_id: &str) -> Option<String> {
        let entry = self.entries.remove(app_id)?;
        debug!(app_id, group = %entry.group, "app id removed");
        Some(entry.group)
    }

    /// Group for a stream of `app_id` with `properties`
    pub fn group_for(&self, app_id: &str, properties: &Proplist) -> Option<&str> {
        let entry = self.entries.get(app_id)?;
        match &entry.predicate {
            None => Some(entry.group.as_str()),
            Some(predicate) if predicate.matches(properties) => Some(entry.group.as_str()),
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::predicate::MethodKind;

    #[test]
    fn test_unconditional_entry() {
        let mut registry = AppIdRegistry::new();
        registry.register("app.Foo", None, "player").unwrap();
        assert_eq!(registry.group_for("app.Foo", &Proplist::new()), Some("player"));
        assert_eq!(registry.group_for("app.Bar", &Proplist::new()), None);
    }

    #[test]
    fn test_predicate_entry_requires_match() {
        let mut registry = AppIdRegistry::new();
        let spec = PredicateSpec::property("media.role", MethodKind::Equals, "phone");
        registry.register("app.Dialer", Some(&spec), "call").unwrap();

        let phone = Proplist::new().with("media.role", "phone");
        assert_eq!(registry.group_for("app.Dialer", &phone), Some("call"));
        assert_eq!(registry.group_for("app.Dialer", &Proplist::new()), None);
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut registry = AppIdRegistry::new();
        let spec = PredicateSpec::property("media.role", MethodKind::Equals, "phone");
        registry.register("app.Foo", Some(&spec), "call").unwrap();
        registry.register("app.Foo", Some(&spec), "ringtone").unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("app.Foo").map(|e| e.group()), Some("ringtone"));

        registry.register("app.Foo", None, "player").unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("app.Foo").unwrap().predicate().is_none());
    }

    #[test]
    fn test_bad_predicate_keeps_previous_entry() {
        let mut registry = AppIdRegistry::new();
        registry.register("app.Foo", None, "player").unwrap();

        let bad = PredicateSpec::property("media.role", MethodKind::Matches, "[");
        assert!(registry.register("app.Foo", Some(&bad), "call").is_err());
        assert_eq!(registry.group_for("app.Foo", &Proplist::new()), Some("player"));
    }

    #[test]
    fn test_unregister() {
        let mut registry = AppIdRegistry::new();
        registry.register("app.Foo", None, "player").unwrap();
        assert_eq!(registry.unregister("app.Foo").as_deref(), Some("player"));
        assert!(registry.unregister("app.Foo").is_none());
    }
}
