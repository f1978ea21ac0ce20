//! Dashboard ad-hoc filters

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Tag-value picker entry standing for a NULL column value
pub const SYNTHETIC_NULL: &str = "__null__";

/// Tag-value picker entry standing for the empty string
pub const SYNTHETIC_EMPTY: &str = "__empty__";

/// A `key <operator> value` predicate supplied by the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdHocFilter {
    pub key: String,

    pub operator: FilterOperator,

    #[serde(default)]
    pub value: String,

    /// Operands of the multi-value operators (`=|`, `!=|`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

impl AdHocFilter {
    pub fn new(key: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator,
            value: value.into(),
            values: None,
        }
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Operands for a multi-value operator, falling back to `value`
    pub fn operands(&self) -> Vec<&str> {
        match &self.values {
            Some(values) if !values.is_empty() => values.iter().map(String::as_str).collect(),
            _ => vec![self.value.as_str()],
        }
    }
}

/// Ad-hoc filter operators, named by their dashboard symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "=~")]
    RegexMatch,
    #[serde(rename = "!~")]
    RegexNotMatch,
    #[serde(rename = "=|")]
    OneOf,
    #[serde(rename = "!=|")]
    NotOneOf,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 10] = [
        Self::Equal,
        Self::NotEqual,
        Self::Less,
        Self::Greater,
        Self::LessOrEqual,
        Self::GreaterOrEqual,
        Self::RegexMatch,
        Self::RegexNotMatch,
        Self::OneOf,
        Self::NotOneOf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessOrEqual => "<=",
            Self::GreaterOrEqual => ">=",
            Self::RegexMatch => "=~",
            Self::RegexNotMatch => "!~",
            Self::OneOf => "=|",
            Self::NotOneOf => "!=|",
        }
    }

    /// Whether the operator takes the `values` list
    pub fn is_multi_value(&self) -> bool {
        matches!(self, Self::OneOf | Self::NotOneOf)
    }

    /// Whether the operator negates its match
    pub fn is_negated(&self) -> bool {
        matches!(self, Self::NotEqual | Self::RegexNotMatch | Self::NotOneOf)
    }
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOperator(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ad-hoc filter operator: {0}")]
pub struct UnknownOperator(pub String);
