//! Macro fragment rendering
//!
//! Turns a classified macro invocation into the SQL text that replaces it.
//! Fragments are plain SQL; the interpolator parses them back into
//! expressions so the rewritten tree is re-serialized by sqlparser like the
//! rest of the statement.

use chrono::{DateTime, Duration, Utc};
use macrosql_core::{AdHocFilter, DialectConfig, FilterOperator, InterpolationRequest, SYNTHETIC_EMPTY, SYNTHETIC_NULL};
use regex::Regex;
use sqlparser::ast::Expr;
use sqlparser::keywords::{Keyword, RESERVED_FOR_COLUMN_ALIAS};
use sqlparser::tokenizer::Token;
use std::sync::OnceLock;
use crate::macros::{IntervalKind, MacroInvocation, MacroKind, Precision, TimeFilterKind};

const SECONDS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MILLIS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const DATE_FORMAT: &str = "%Y-%m-%d";
const EPOCH: &str = "1970-01-01 00:00:00";

/// Keywords that cannot stand for a column name in expression position
const EXPRESSION_KEYWORDS: &[Keyword] = &[
    Keyword::AND,
    Keyword::OR,
    Keyword::NOT,
    Keyword::NULL,
    Keyword::TRUE,
    Keyword::FALSE,
    Keyword::IS,
    Keyword::IN,
    Keyword::LIKE,
    Keyword::BETWEEN,
    Keyword::CASE,
    Keyword::WHEN,
    Keyword::THEN,
    Keyword::ELSE,
    Keyword::EXISTS,
    Keyword::INTERVAL,
    Keyword::CAST,
];

/// Replacement for one macro site
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// SQL text to be parsed as an expression
    Sql(String),
    /// An expression taken over as is
    Expr(Expr),
}

/// Failure to render a macro
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("missing argument {0}")]
    MissingArgument(usize),

    #[error("ad-hoc filter has an empty key")]
    EmptyFilterKey,

    #[error("CTE placeholders are not expression macros")]
    NotExpandable,
}

/// Renders macro fragments for one SQL dialect
#[derive(Debug, Clone, Copy)]
pub struct FragmentRenderer {
    dialect: DialectConfig,
}

impl FragmentRenderer {
    pub fn new(dialect: DialectConfig) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> DialectConfig {
        self.dialect
    }

    /// Render the replacement of `invocation`
    ///
    /// `request.time_range` is used as given; rounding happens before.
    pub fn render(&self, invocation: &MacroInvocation, request: &InterpolationRequest) -> Result<Fragment, RenderError> {
        let from = request.time_range.from();
        let to = request.time_range.to();

        let sql = match invocation.kind {
            MacroKind::TimeFilter(kind) => self.time_filter(kind, invocation, from, to)?,
            MacroKind::Interval(kind) => self.interval(kind, invocation, request.interval)?,
            MacroKind::AdHocFilter => self.ad_hoc_filters(&request.filters)?,
            MacroKind::Round => {
                let arg = argument(invocation, 0)?;
                match self.round(&arg.to_string(), request.round) {
                    Some(sql) => sql,
                    None => return Ok(Fragment::Expr(arg.clone())),
                }
            }
            MacroKind::CtePlaceholder => return Err(RenderError::NotExpandable),
        };

        Ok(Fragment::Sql(sql))
    }

    fn time_filter(
        &self,
        kind: TimeFilterKind,
        invocation: &MacroInvocation,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<String, RenderError> {
        let sql = match kind {
            TimeFilterKind::Range(precision) => {
                let column = operand(argument(invocation, 0)?);
                format!(
                    "({column} >= {} AND {column} <= {})",
                    self.timestamp(from, precision),
                    self.timestamp(to, precision)
                )
            }
            TimeFilterKind::Date => {
                let column = operand(argument(invocation, 0)?);
                format!("({column} >= {} AND {column} <= {})", self.date(from), self.date(to))
            }
            TimeFilterKind::DateTime => {
                let date = operand(argument(invocation, 0)?);
                let time = operand(argument(invocation, 1)?);
                format!(
                    "({date} >= {} AND {date} <= {} AND {time} >= {} AND {time} <= {})",
                    self.date(from),
                    self.date(to),
                    self.timestamp(from, Precision::Seconds),
                    self.timestamp(to, Precision::Seconds)
                )
            }
            TimeFilterKind::From(precision) => self.time_value(from, precision),
            TimeFilterKind::To(precision) => self.time_value(to, precision),
        };
        Ok(sql)
    }

    fn interval(&self, kind: IntervalKind, invocation: &MacroInvocation, interval: Duration) -> Result<String, RenderError> {
        let seconds = interval.num_seconds().max(1);
        let millis = interval.num_milliseconds().max(1);

        let sql = match kind {
            IntervalKind::Seconds => seconds.to_string(),
            IntervalKind::Millis => millis.to_string(),
            IntervalKind::Bucket(precision) => {
                let column = argument(invocation, 0)?;
                match (self.dialect, precision) {
                    (DialectConfig::ClickHouse, Precision::Seconds) => {
                        format!("toStartOfInterval(toDateTime({column}), INTERVAL {seconds} SECOND)")
                    }
                    (DialectConfig::ClickHouse, Precision::Millis) => {
                        format!("toStartOfInterval(toDateTime64({column}, 3), INTERVAL {millis} MILLISECOND)")
                    }
                    (DialectConfig::Generic, Precision::Seconds) => date_bin(seconds, "seconds", &column.to_string()),
                    (DialectConfig::Generic, Precision::Millis) => date_bin(millis, "milliseconds", &column.to_string()),
                }
            }
        };
        Ok(sql)
    }

    /// `None` when the unit is below one millisecond, which disables rounding
    fn round(&self, expr: &str, unit: Duration) -> Option<String> {
        let (count, unit) = round_unit(unit)?;
        Some(match self.dialect {
            DialectConfig::ClickHouse => format!("toStartOfInterval({expr}, INTERVAL {count} {unit})"),
            DialectConfig::Generic => date_bin(count, &format!("{}s", unit.to_lowercase()), expr),
        })
    }

    /// Conjunction of all filters, or a tautology when there are none
    pub fn ad_hoc_filters(&self, filters: &[AdHocFilter]) -> Result<String, RenderError> {
        if filters.is_empty() {
            return Ok("1 = 1".to_string());
        }

        let conjuncts = filters
            .iter()
            .map(|filter| self.ad_hoc_filter(filter))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(format!("({})", conjuncts.join(" AND ")))
    }

    /// A single filter predicate
    pub fn ad_hoc_filter(&self, filter: &AdHocFilter) -> Result<String, RenderError> {
        let key = self.quote_key(&filter.key)?;

        let sql = match filter.operator {
            FilterOperator::Equal | FilterOperator::NotEqual if filter.value == SYNTHETIC_NULL => {
                let negation = if filter.operator.is_negated() { "NOT " } else { "" };
                format!("{key} IS {negation}NULL")
            }
            FilterOperator::Equal | FilterOperator::NotEqual if filter.value == SYNTHETIC_EMPTY => {
                format!("{key} {} ''", filter.operator)
            }
            FilterOperator::RegexMatch | FilterOperator::RegexNotMatch => {
                let function = match self.dialect {
                    DialectConfig::ClickHouse => "match",
                    DialectConfig::Generic => "REGEXP_LIKE",
                };
                let negation = if filter.operator.is_negated() { "NOT " } else { "" };
                format!("{negation}{function}({key}, {})", self.string_literal(&filter.value))
            }
            FilterOperator::OneOf | FilterOperator::NotOneOf => {
                let list = filter
                    .operands()
                    .into_iter()
                    .map(|value| self.string_literal(value))
                    .collect::<Vec<_>>()
                    .join(", ");
                let negation = if filter.operator.is_negated() { "NOT " } else { "" };
                format!("{key} {negation}IN ({list})")
            }
            operator => format!("{key} {operator} {}", self.string_literal(&filter.value)),
        };

        Ok(sql)
    }

    /// Single-quoted string literal in the dialect's escaping
    pub fn string_literal(&self, value: &str) -> String {
        let mut escaped = String::with_capacity(value.len() + 2);
        escaped.push('\'');
        for c in value.chars() {
            match c {
                '\'' => escaped.push_str("''"),
                '\\' if self.dialect == DialectConfig::ClickHouse => escaped.push_str("\\\\"),
                c => escaped.push(c),
            }
        }
        escaped.push('\'');
        escaped
    }

    /// Filter key as a column reference, quoted unless it is a plain
    /// (possibly dotted) identifier
    pub fn quote_key(&self, key: &str) -> Result<String, RenderError> {
        if key.is_empty() {
            return Err(RenderError::EmptyFilterKey);
        }
        if is_plain_identifier(key) {
            return Ok(key.to_string());
        }

        let quote = match self.dialect {
            DialectConfig::ClickHouse => '`',
            DialectConfig::Generic => '"',
        };
        let doubled = format!("{quote}{quote}");
        Ok(format!("{quote}{}{quote}", key.replace(quote, &doubled)))
    }

    fn time_value(&self, ts: DateTime<Utc>, precision: Precision) -> String {
        match (self.dialect, precision) {
            (DialectConfig::ClickHouse, Precision::Seconds) => {
                format!("toDateTime('{}')", ts.format(SECONDS_FORMAT))
            }
            (DialectConfig::ClickHouse, Precision::Millis) => {
                format!("toDateTime64('{}', 3)", ts.format(MILLIS_FORMAT))
            }
            (DialectConfig::Generic, _) => self.timestamp(ts, precision),
        }
    }

    fn timestamp(&self, ts: DateTime<Utc>, precision: Precision) -> String {
        let format = match precision {
            Precision::Seconds => SECONDS_FORMAT,
            Precision::Millis => MILLIS_FORMAT,
        };
        match self.dialect {
            DialectConfig::ClickHouse => format!("'{}'", ts.format(format)),
            DialectConfig::Generic => format!("TIMESTAMP '{}'", ts.format(format)),
        }
    }

    fn date(&self, ts: DateTime<Utc>) -> String {
        match self.dialect {
            DialectConfig::ClickHouse => format!("'{}'", ts.format(DATE_FORMAT)),
            DialectConfig::Generic => format!("DATE '{}'", ts.format(DATE_FORMAT)),
        }
    }
}

fn argument(invocation: &MacroInvocation, index: usize) -> Result<&Expr, RenderError> {
    invocation.arg(index).ok_or(RenderError::MissingArgument(index + 1))
}

/// Argument text safe to place next to a comparison operator
///
/// Anything that is not a single term is parenthesized, so `a OR b` cannot
/// bleed into the surrounding predicate.
fn operand(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(_)
        | Expr::CompoundIdentifier(_)
        | Expr::Function(_)
        | Expr::Value(_)
        | Expr::Nested(_) => expr.to_string(),
        _ => format!("({expr})"),
    }
}

fn date_bin(count: i64, unit: &str, expr: &str) -> String {
    format!("date_bin(INTERVAL '{count} {unit}', {expr}, TIMESTAMP '{EPOCH}')")
}

/// Largest unit that divides `unit` exactly
fn round_unit(unit: Duration) -> Option<(i64, &'static str)> {
    let millis = unit.num_milliseconds();
    if millis <= 0 {
        return None;
    }

    const UNITS: [(i64, &str); 4] = [
        (3_600_000, "HOUR"),
        (60_000, "MINUTE"),
        (1_000, "SECOND"),
        (1, "MILLISECOND"),
    ];
    UNITS
        .iter()
        .find(|(size, _)| millis % size == 0)
        .map(|(size, name)| (millis / size, *name))
}

fn is_plain_identifier(key: &str) -> bool {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    let re = IDENTIFIER.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid identifier regex")
    });

    re.is_match(key) && key.split('.').all(|segment| !is_reserved(segment))
}

fn is_reserved(word: &str) -> bool {
    match Token::make_word(word, None) {
        Token::Word(w) => {
            RESERVED_FOR_COLUMN_ALIAS.contains(&w.keyword) || EXPRESSION_KEYWORDS.contains(&w.keyword)
        }
        _ => false,
    }
}
