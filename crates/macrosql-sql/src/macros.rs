//! Macro catalog
//!
//! Every recognized macro is one row of [`CATALOG`], keyed by name and
//! arity. The walker only asks the catalog to classify nodes, so adding a
//! macro means adding a row here and a rendering rule in
//! [`crate::render`].

use serde::Serialize;
use sqlparser::ast::Expr;
use macrosql_core::Location;

/// Prefix shared by all macro names
pub const MACRO_PREFIX: &str = "$__";

/// Timestamp precision of a macro's rendered literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Precision {
    Seconds,
    Millis,
}

/// Time range macros
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimeFilterKind {
    /// `col >= from AND col <= to`
    Range(Precision),
    /// Date-only bounds on a date column
    Date,
    /// Date bounds on the first column, time bounds on the second
    DateTime,
    /// The range start as a time value
    From(Precision),
    /// The range end as a time value
    To(Precision),
}

/// Interval macros
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IntervalKind {
    /// Bucket a time column by the interval
    Bucket(Precision),
    /// The interval as whole seconds
    Seconds,
    /// The interval as whole milliseconds
    Millis,
}

/// What a macro site expands to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MacroKind {
    TimeFilter(TimeFilterKind),
    Interval(IntervalKind),
    AdHocFilter,
    Round,
    /// `WITH $__name AS (...)`; never expanded by the interpolator
    CtePlaceholder,
}

/// One catalog row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroSpec {
    pub name: &'static str,
    pub arity: usize,
    pub kind: MacroKind,
}

const fn entry(name: &'static str, arity: usize, kind: MacroKind) -> MacroSpec {
    MacroSpec { name, arity, kind }
}

/// Registered expression macros
pub static CATALOG: &[MacroSpec] = &[
    entry("$__timeFilter", 1, MacroKind::TimeFilter(TimeFilterKind::Range(Precision::Seconds))),
    entry("$__timeFilter_ms", 1, MacroKind::TimeFilter(TimeFilterKind::Range(Precision::Millis))),
    entry("$__dateFilter", 1, MacroKind::TimeFilter(TimeFilterKind::Date)),
    entry("$__dateTimeFilter", 2, MacroKind::TimeFilter(TimeFilterKind::DateTime)),
    entry("$__dt", 2, MacroKind::TimeFilter(TimeFilterKind::DateTime)),
    entry("$__fromTime", 0, MacroKind::TimeFilter(TimeFilterKind::From(Precision::Seconds))),
    entry("$__toTime", 0, MacroKind::TimeFilter(TimeFilterKind::To(Precision::Seconds))),
    entry("$__fromTime_ms", 0, MacroKind::TimeFilter(TimeFilterKind::From(Precision::Millis))),
    entry("$__toTime_ms", 0, MacroKind::TimeFilter(TimeFilterKind::To(Precision::Millis))),
    entry("$__timeInterval", 1, MacroKind::Interval(IntervalKind::Bucket(Precision::Seconds))),
    entry("$__timeInterval_ms", 1, MacroKind::Interval(IntervalKind::Bucket(Precision::Millis))),
    entry("$__interval_s", 0, MacroKind::Interval(IntervalKind::Seconds)),
    entry("$__interval_ms", 0, MacroKind::Interval(IntervalKind::Millis)),
    entry("$__adHocFilter", 0, MacroKind::AdHocFilter),
    entry("$__round", 1, MacroKind::Round),
];

/// Result of looking a name up in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(&'static MacroSpec),
    /// The name is registered, but not with this arity
    ArityMismatch { expected: Vec<usize> },
    Unknown,
}

/// Resolve `(name, arity)` against the catalog
pub fn resolve(name: &str, arity: usize) -> Resolution {
    let mut expected = Vec::new();
    for entry in CATALOG.iter().filter(|entry| entry.name == name) {
        if entry.arity == arity {
            return Resolution::Found(entry);
        }
        expected.push(entry.arity);
    }

    if expected.is_empty() {
        Resolution::Unknown
    } else {
        Resolution::ArityMismatch { expected }
    }
}

/// Whether `name` is a registered expression macro (any arity)
pub fn is_registered(name: &str) -> bool {
    CATALOG.iter().any(|entry| entry.name == name)
}

/// A classified macro call, recomputed on every walk
#[derive(Debug, Clone, PartialEq)]
pub struct MacroInvocation {
    pub name: String,
    pub kind: MacroKind,
    pub args: Vec<Expr>,
    pub location: Option<Location>,
}

impl MacroInvocation {
    pub fn arg(&self, index: usize) -> Option<&Expr> {
        self.args.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_keys_are_unique() {
        let mut seen = HashSet::new();
        for entry in CATALOG {
            assert!(entry.name.starts_with(MACRO_PREFIX), "{} lacks prefix", entry.name);
            assert!(seen.insert((entry.name, entry.arity)), "duplicate row {}", entry.name);
        }
    }

    #[test]
    fn resolves_registered_macro() {
        match resolve("$__timeFilter", 1) {
            Resolution::Found(entry) => assert_eq!(
                entry.kind,
                MacroKind::TimeFilter(TimeFilterKind::Range(Precision::Seconds))
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reports_arity_mismatch() {
        assert_eq!(
            resolve("$__dateTimeFilter", 1),
            Resolution::ArityMismatch { expected: vec![2] }
        );
    }

    #[test]
    fn unknown_names_are_not_errors() {
        assert_eq!(resolve("$__cte1", 0), Resolution::Unknown);
        assert_eq!(resolve("toStartOfHour", 1), Resolution::Unknown);
        assert!(!is_registered("$__cte1"));
        assert!(is_registered("$__adHocFilter"));
    }
}
