//! In-memory policy model contract and reference implementation.
//!
//! # Responsibility
//! - Describe the slice of the authorization engine's model the adapter needs.
//! - Provide `MemoryModel`, an ordered rule set used by the CLI and tests.
//!
//! # Invariants
//! - Rules are kept per section (`p`, `g`) and per ptype in insertion order.
//! - A rule appears at most once per ptype.

use crate::model::rule::{section_of, validate_field_range};
use std::collections::BTreeMap;

/// Sections persisted by whole-policy saves, in save order.
pub const POLICY_SECTIONS: [&str; 2] = ["p", "g"];

/// Policy model owned and mutated by the authorization engine.
pub trait PolicyModel {
    /// Adds one rule line read from storage.
    fn load_policy_line(&mut self, sec: &str, ptype: &str, rule: Vec<String>);

    /// Enumerates `(ptype, rule)` pairs of one section in model order.
    fn policy_rules(&self, sec: &str) -> Vec<(String, Vec<String>)>;
}

/// Ordered rule set keyed by section then ptype.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryModel {
    sections: BTreeMap<String, BTreeMap<String, Vec<Vec<String>>>>,
}

impl MemoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule; returns `false` when it is already present.
    pub fn add_rule(&mut self, sec: &str, ptype: &str, rule: Vec<String>) -> bool {
        let rules = self
            .sections
            .entry(sec.to_string())
            .or_default()
            .entry(ptype.to_string())
            .or_default();
        if rules.contains(&rule) {
            return false;
        }
        rules.push(rule);
        true
    }

    /// Removes a rule; returns `false` when it was absent.
    pub fn remove_rule(&mut self, sec: &str, ptype: &str, rule: &[String]) -> bool {
        let Some(rules) = self.rules_mut(sec, ptype) else {
            return false;
        };
        let before = rules.len();
        rules.retain(|existing| existing.as_slice() != rule);
        before != rules.len()
    }

    /// Removes every rule whose fields match `field_values` starting at
    /// `field_index`. Empty values match anything. Returns the removed rules.
    pub fn remove_filtered_rules(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Vec<Vec<String>> {
        if validate_field_range(field_index, field_values.len()).is_err() {
            return Vec::new();
        }
        let Some(rules) = self.rules_mut(sec, ptype) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        rules.retain(|rule| {
            let hit = field_values.iter().enumerate().all(|(offset, value)| {
                value.is_empty()
                    || rule.get(field_index + offset).map(String::as_str) == Some(value.as_str())
            });
            if hit {
                removed.push(rule.clone());
            }
            !hit
        });
        removed
    }

    pub fn has_rule(&self, sec: &str, ptype: &str, rule: &[String]) -> bool {
        self.rules(sec, ptype)
            .iter()
            .any(|existing| existing.as_slice() == rule)
    }

    /// Returns the rules of one ptype, or an empty slice.
    pub fn rules(&self, sec: &str, ptype: &str) -> &[Vec<String>] {
        self.sections
            .get(sec)
            .and_then(|by_ptype| by_ptype.get(ptype))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Drops every rule of every section.
    pub fn clear(&mut self) {
        self.sections.clear();
    }

    pub fn len(&self) -> usize {
        self.sections
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rules_mut(&mut self, sec: &str, ptype: &str) -> Option<&mut Vec<Vec<String>>> {
        self.sections
            .get_mut(sec)
            .and_then(|by_ptype| by_ptype.get_mut(ptype))
    }
}

impl PolicyModel for MemoryModel {
    fn load_policy_line(&mut self, sec: &str, ptype: &str, rule: Vec<String>) {
        let sec = if sec.is_empty() { section_of(ptype) } else { sec };
        self.add_rule(sec, ptype, rule);
    }

    fn policy_rules(&self, sec: &str) -> Vec<(String, Vec<String>)> {
        self.sections
            .get(sec)
            .map(|by_ptype| {
                by_ptype
                    .iter()
                    .flat_map(|(ptype, rules)| {
                        rules.iter().map(move |rule| (ptype.clone(), rule.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
