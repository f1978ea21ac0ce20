//! CTE placeholder extraction
//!
//! A CTE whose alias starts with the macro prefix (`WITH $__logs AS (...)`)
//! marks a sub-query the query editor can run and inspect on its own.
//! Extraction is read-only and follows the walker's order, so when a name
//! is declared twice the later declaration wins.

use macrosql_core::{Diagnostic, DiagnosticCode, Location, Severity};
use serde::{Serialize, Serializer};
use sqlparser::ast::{Query, Statement};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use tracing::warn;
use crate::error::Error;
use crate::parser::ParsedSql;
use crate::walker::{walk, CtePlaceholder, ShapeTarget, SiteRef};

/// One CTE placeholder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cte {
    /// Alias without the macro prefix
    pub name: String,

    /// Alias as written
    #[serde(rename = "macro")]
    pub macro_name: String,

    /// Character offset of the alias in the source text
    #[serde(rename = "macroPos")]
    pub macro_pos: Option<usize>,

    #[serde(skip)]
    pub location: Option<Location>,

    /// CTE body, serialized as SQL text
    #[serde(rename = "cte", serialize_with = "serialize_sql")]
    pub body: Query,
}

fn serialize_sql<S: Serializer>(query: &Query, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(query)
}

/// Result of an extraction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CteExtraction {
    pub ctes: BTreeMap<String, Cte>,

    /// Names declared more than once, in the order the overwrites happened
    pub duplicates: Vec<String>,
}

impl CteExtraction {
    pub fn is_empty(&self) -> bool {
        self.ctes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ctes.len()
    }

    pub fn get(&self, name: &str) -> Option<&Cte> {
        self.ctes.get(name)
    }

    /// One warning per name declared more than once, pointing at the
    /// declaration that was kept
    pub fn duplicate_diagnostics(&self) -> Vec<Diagnostic> {
        self.duplicates
            .iter()
            .map(|name| {
                let kept = self.ctes.get(name);
                let macro_name = kept.map_or(name.as_str(), |cte| cte.macro_name.as_str());
                let diag = Diagnostic::new(
                    DiagnosticCode::CteDuplicateName,
                    Severity::Warn,
                    format!("{macro_name} declared more than once, using the last declaration"),
                )
                .with_subject(name.clone());

                match kept.and_then(|cte| cte.location) {
                    Some(location) => diag.with_location(location),
                    None => diag,
                }
            })
            .collect()
    }

    /// CTEs ordered by name
    pub fn into_vec(self) -> Vec<Cte> {
        self.ctes.into_values().collect()
    }
}

/// Collects CTE placeholders from parsed statements
#[derive(Debug, Clone, Copy, Default)]
pub struct CteExtractor<'s> {
    source: Option<&'s str>,
}

impl<'s> CteExtractor<'s> {
    pub fn new() -> Self {
        Self { source: None }
    }

    /// Resolve `macroPos` against the text the statements were parsed from
    pub fn with_source(source: &'s str) -> Self {
        Self { source: Some(source) }
    }

    pub fn extract(&self, statements: &[Statement]) -> Result<CteExtraction, Error> {
        let mut extraction = CteExtraction::default();

        let flow = walk(statements, |site| match site {
            SiteRef::Cte(placeholder) => {
                let cte = self.describe(&placeholder);
                if extraction.ctes.insert(cte.name.clone(), cte).is_some() {
                    warn!(name = placeholder.name, "duplicate CTE placeholder, keeping the last declaration");
                    extraction.duplicates.push(placeholder.name.to_string());
                }
                ControlFlow::Continue(())
            }
            SiteRef::Malformed(error) if error.target == ShapeTarget::Cte => ControlFlow::Break(Error::from(error)),
            SiteRef::Call { .. } | SiteRef::Malformed(_) => ControlFlow::Continue(()),
        });

        match flow {
            ControlFlow::Break(error) => Err(error),
            ControlFlow::Continue(()) => Ok(extraction),
        }
    }

    fn describe(&self, placeholder: &CtePlaceholder<'_>) -> Cte {
        let macro_pos = match (self.source, placeholder.location) {
            (Some(source), Some(location)) => char_offset(source, location),
            _ => None,
        };

        Cte {
            name: placeholder.name.to_string(),
            macro_name: placeholder.macro_text().to_string(),
            macro_pos,
            location: placeholder.location,
            body: (*placeholder.cte.query).clone(),
        }
    }
}

/// Extract the CTE placeholders of `parsed`, keyed by name
pub fn extract_ctes(parsed: &ParsedSql) -> Result<BTreeMap<String, Cte>, Error> {
    CteExtractor::with_source(&parsed.sql)
        .extract(&parsed.statements)
        .map(|extraction| extraction.ctes)
}

/// Zero-based character offset of a one-based line/column position
fn char_offset(source: &str, location: Location) -> Option<usize> {
    let column = usize::try_from(location.column.checked_sub(1)?).ok()?;
    let mut offset = 0;

    for (index, line) in source.split('\n').enumerate() {
        let width = line.chars().count();
        if index as u64 + 1 == location.line {
            return (column <= width).then_some(offset + column);
        }
        offset += width + 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parser::SqlParser;
    use pretty_assertions::assert_eq;

    fn extract(sql: &str) -> Result<CteExtraction, Error> {
        let parsed = SqlParser::new().parse(sql).unwrap();
        CteExtractor::with_source(&parsed.sql).extract(&parsed.statements)
    }

    #[test]
    fn collects_placeholder_ctes_only() {
        let extraction = extract(
            "WITH $__cte1 AS (SELECT * FROM t WHERE $__timeFilter(ts)), plain AS (SELECT 1) SELECT * FROM $__cte1",
        )
        .unwrap();

        assert_eq!(extraction.len(), 1);
        let cte = extraction.get("cte1").unwrap();
        assert_eq!(cte.macro_name, "$__cte1");
        assert_eq!(cte.macro_pos, Some(5));
        assert_eq!(cte.body.to_string(), "SELECT * FROM t WHERE $__timeFilter(ts)");
    }

    #[test]
    fn finds_ctes_in_subqueries() {
        let extraction = extract(
            "SELECT * FROM (WITH $__inner AS (SELECT 2) SELECT * FROM $__inner) AS s",
        )
        .unwrap();
        assert!(extraction.get("inner").is_some());
    }

    #[test]
    fn last_duplicate_wins() {
        let extraction = extract(
            "WITH $__a AS (SELECT 1) SELECT * FROM (WITH $__a AS (SELECT 2) SELECT * FROM $__a) AS s",
        )
        .unwrap();

        assert_eq!(extraction.get("a").unwrap().body.to_string(), "SELECT 2");
        assert_eq!(extraction.duplicates, vec!["a".to_string()]);

        let diagnostics = extraction.duplicate_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::CteDuplicateName);
        assert_eq!(diagnostics[0].severity, Severity::Warn);
        assert_eq!(diagnostics[0].subject.as_deref(), Some("a"));
        assert!(diagnostics[0].message.starts_with("$__a declared more than once"));
    }

    #[test]
    fn unique_names_have_no_duplicate_diagnostics() {
        let extraction = extract("WITH $__a AS (SELECT 1), $__b AS (SELECT 2) SELECT 1").unwrap();
        assert!(extraction.duplicate_diagnostics().is_empty());
    }

    #[test]
    fn extraction_is_idempotent() {
        let parsed = SqlParser::new()
            .parse("WITH $__x AS (SELECT 1), $__y AS (SELECT 2) SELECT * FROM $__x, $__y")
            .unwrap();

        let first = extract_ctes(&parsed).unwrap();
        let second = extract_ctes(&parsed).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.keys().cloned().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn rejects_malformed_placeholders() {
        let error = extract("WITH $__adHocFilter AS (SELECT 1) SELECT 1").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidCte);
    }

    #[test]
    fn macro_calls_do_not_fail_extraction() {
        let extraction = extract("WITH $__c AS (SELECT $__timeFilter()) SELECT * FROM $__c").unwrap();
        assert_eq!(extraction.len(), 1);
    }

    #[test]
    fn serializes_like_the_editor_expects() {
        let extraction = extract("WITH\n  $__logs AS (SELECT 1)\nSELECT * FROM $__logs").unwrap();
        let value = serde_json::to_value(extraction.into_vec()).unwrap();

        assert_eq!(
            value,
            serde_json::json!([{
                "name": "logs",
                "macro": "$__logs",
                "macroPos": 7,
                "cte": "SELECT 1"
            }])
        );
    }

    #[test]
    fn offsets_count_characters() {
        assert_eq!(char_offset("ab\ncd", Location::new(2, 2)), Some(4));
        assert_eq!(char_offset("é\nx", Location::new(2, 1)), Some(2));
        assert_eq!(char_offset("ab", Location::new(3, 1)), None);
    }
}
