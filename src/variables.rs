// SPDX-License-Identifier: GPL-3.0-only

//! Configuration variables
//!
//! A rule field whose whole text equals a variable name is replaced by the
//! variable's value before the rule is built.

use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: HashMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite a variable
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        if self.values.contains_key(&name) {
            debug!(variable = %name, value = %value, "variable updated");
        } else {
            debug!(variable = %name, value = %value, "variable added");
        }

        self.values.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Value of `text` after substitution
    pub fn resolve<'a>(&'a self, text: &'a str) -> &'a str {
        self.get(text).unwrap_or(text)
    }

    /// Substitute in place
    pub fn apply(&self, text: &mut String) {
        if let Some(value) = self.values.get(text.as_str()) {
            *text = value.clone();
        }
    }

    /// Substitute an optional field in place
    pub fn apply_opt(&self, text: &mut Option<String>) {
        if let Some(text) = text.as_mut() {
            self.apply(text);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_whole_field_only() {
        let mut vars = Variables::new();
        vars.set("$headset", "alsa_output.headset");

        assert_eq!(vars.resolve("$headset"), "alsa_output.headset");
        assert_eq!(vars.resolve("$headset.0"), "$headset.0");

        let mut field = Some("$headset".to_string());
        vars.apply_opt(&mut field);
        assert_eq!(field.as_deref(), Some("alsa_output.headset"));
    }

    #[test]
    fn test_set_overwrites() {
        let mut vars = Variables::new();
        vars.set("a", "1");
        vars.set("a", "2");
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("a"), Some("2"));
    }
}
