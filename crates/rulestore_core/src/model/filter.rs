//! Row filter used by filtered policy loading.

use crate::model::rule::{PolicyRow, FIELD_COUNT};
use serde::{Deserialize, Serialize};

/// Selects a subset of stored rows.
///
/// Every non-empty list constrains its column to one of the listed values;
/// empty lists leave the column unconstrained. A default filter matches all rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFilter {
    #[serde(default)]
    pub ptype: Vec<String>,
    #[serde(default)]
    pub fields: [Vec<String>; FIELD_COUNT],
}

impl RuleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the filter to the given rule types.
    pub fn with_ptypes<I, S>(mut self, ptypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ptype = ptypes.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts column `v{index}` to the given values. Out-of-range indexes are ignored.
    pub fn with_field<I, S>(mut self, index: usize, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(slot) = self.fields.get_mut(index) {
            *slot = values.into_iter().map(Into::into).collect();
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ptype.is_empty() && self.fields.iter().all(Vec::is_empty)
    }

    /// In-memory equivalent of the SQL predicate built by the repository.
    pub fn matches(&self, row: &PolicyRow) -> bool {
        if !self.ptype.is_empty() && !self.ptype.contains(&row.ptype) {
            return false;
        }
        self.fields
            .iter()
            .zip(row.fields.iter())
            .all(|(allowed, value)| allowed.is_empty() || allowed.contains(value))
    }
}
