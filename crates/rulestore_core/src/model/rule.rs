//! Policy row model and token conversion helpers.
//!
//! # Responsibility
//! - Define the flat record persisted for one policy line.
//! - Translate between engine token lists and fixed-width rows.
//!
//! # Invariants
//! - A row carries exactly `FIELD_COUNT` positional fields; unused trailing
//!   fields are stored as empty strings.
//! - `(ptype, fields)` is the rule identity. `id` never takes part in equality
//!   checks done by the adapter.
//! - Re-expanding a row drops trailing empty fields only, so interior empty
//!   fields keep their position.
//!
//! # See also
//! - src/db/schema.rs

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Number of positional value columns (`v0..v5`).
pub const FIELD_COUNT: usize = 6;

/// Column names of the positional value fields, in order.
pub const FIELD_COLUMNS: [&str; FIELD_COUNT] = ["v0", "v1", "v2", "v3", "v4", "v5"];

/// Validation failures raised before any store work is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleValidationError {
    /// Rule type discriminator was empty or whitespace.
    EmptyPtype,
    /// Rule carried more tokens than the table has columns.
    TooManyFields { count: usize },
    /// Filtered removal anchored outside `v0..v5` or overflowing it.
    FieldIndexOutOfRange { field_index: usize, value_count: usize },
    /// Table name or prefix is not a plain SQL identifier.
    InvalidTableName(String),
    /// Whole-table save attempted after a filtered load.
    FilteredSave,
}

impl Display for RuleValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPtype => write!(f, "ptype must not be empty"),
            Self::TooManyFields { count } => write!(
                f,
                "rule has {count} fields; at most {FIELD_COUNT} are supported"
            ),
            Self::FieldIndexOutOfRange {
                field_index,
                value_count,
            } => write!(
                f,
                "field index {field_index} with {value_count} values exceeds {FIELD_COUNT} fields"
            ),
            Self::InvalidTableName(name) => write!(f, "invalid table name `{name}`"),
            Self::FilteredSave => {
                write!(f, "cannot save a filtered policy; load the full policy first")
            }
        }
    }
}

impl Error for RuleValidationError {}

/// One persisted policy line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyRow {
    /// Store-assigned surrogate key. `None` until the row is inserted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Discriminates policy rules (`p`, `p2`, ...) from grouping rules (`g`, ...).
    pub ptype: String,
    /// Positional rule values `v0..v5`.
    pub fields: [String; FIELD_COUNT],
}

impl PolicyRow {
    /// Builds a row from an engine rule, padding missing trailing tokens.
    ///
    /// # Errors
    /// - `EmptyPtype` when `ptype` is blank.
    /// - `TooManyFields` when `rule` has more than `FIELD_COUNT` tokens.
    pub fn from_rule<S: AsRef<str>>(ptype: &str, rule: &[S]) -> Result<Self, RuleValidationError> {
        validate_ptype(ptype)?;
        if rule.len() > FIELD_COUNT {
            return Err(RuleValidationError::TooManyFields { count: rule.len() });
        }

        let mut fields: [String; FIELD_COUNT] = Default::default();
        for (slot, token) in fields.iter_mut().zip(rule) {
            *slot = token.as_ref().to_string();
        }

        Ok(Self {
            id: None,
            ptype: ptype.to_string(),
            fields,
        })
    }

    /// Expands the row back into engine tokens, dropping trailing empty fields.
    pub fn to_rule(&self) -> Vec<String> {
        let len = self
            .fields
            .iter()
            .rposition(|field| !field.is_empty())
            .map_or(0, |last| last + 1);
        self.fields[..len].to_vec()
    }

    /// Returns whether both rows describe the same rule, ignoring `id`.
    pub fn same_rule(&self, other: &Self) -> bool {
        self.ptype == other.ptype && self.fields == other.fields
    }

    /// Renders `ptype, v0, v1, ...` without trailing empty fields.
    pub fn to_line(&self) -> String {
        let mut parts = Vec::with_capacity(FIELD_COUNT + 1);
        parts.push(self.ptype.clone());
        parts.extend(self.to_rule());
        parts.join(", ")
    }
}

/// Rejects blank rule type discriminators.
pub fn validate_ptype(ptype: &str) -> Result<(), RuleValidationError> {
    if ptype.trim().is_empty() {
        return Err(RuleValidationError::EmptyPtype);
    }
    Ok(())
}

/// Checks that `field_index` plus `value_count` stays inside `v0..v5`.
pub fn validate_field_range(
    field_index: usize,
    value_count: usize,
) -> Result<(), RuleValidationError> {
    if field_index >= FIELD_COUNT || field_index + value_count > FIELD_COUNT {
        return Err(RuleValidationError::FieldIndexOutOfRange {
            field_index,
            value_count,
        });
    }
    Ok(())
}

/// Returns the policy section a ptype belongs to (`p2` -> `p`, `g` -> `g`).
pub fn section_of(ptype: &str) -> &str {
    ptype.get(..1).unwrap_or("")
}
