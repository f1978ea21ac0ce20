//! SQL parsing using datafusion-sqlparser-rs
//!
//! Parses SQL templates into an AST. The dialect tokenizer reads `$__name`
//! as a placeholder token, which the grammar only accepts where a value is
//! expected, so a `$__timeFilter(ts)` call would not parse. Placeholders
//! with the macro prefix are therefore promoted to plain words before the
//! token stream reaches the parser.

use macrosql_core::{DialectConfig, Diagnostic, DiagnosticCode, Location, Severity};
use regex::Regex;
use sqlparser::ast::{Expr, Statement};
use sqlparser::dialect::{ClickHouseDialect, Dialect, GenericDialect};
use sqlparser::parser::{Parser, ParserError, ParserOptions};
use sqlparser::tokenizer::{Token, TokenWithSpan, Tokenizer, TokenizerError};
use std::sync::OnceLock;
use crate::macros::MACRO_PREFIX;

/// SQL parser with configurable dialect
pub struct SqlParser {
    dialect: Box<dyn Dialect + Send + Sync>,
    config: DialectConfig,
}

impl SqlParser {
    /// Create a new SQL parser with the default (ClickHouse) dialect
    pub fn new() -> Self {
        Self::clickhouse()
    }

    /// Create a SQL parser for ClickHouse
    pub fn clickhouse() -> Self {
        Self {
            dialect: Box::new(ClickHouseDialect {}),
            config: DialectConfig::ClickHouse,
        }
    }

    /// Create a SQL parser for generic SQL
    pub fn generic() -> Self {
        Self {
            dialect: Box::new(GenericDialect {}),
            config: DialectConfig::Generic,
        }
    }

    /// Create a parser from a dialect config
    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        match dialect {
            DialectConfig::ClickHouse => Self::clickhouse(),
            DialectConfig::Generic => Self::generic(),
        }
    }

    pub fn dialect_config(&self) -> DialectConfig {
        self.config
    }

    /// Parse SQL string into AST
    ///
    /// Returns ParsedSql on success, or ParseError with position on failure.
    pub fn parse(&self, sql: &str) -> Result<ParsedSql, ParseError> {
        let tokens = self.tokenize(sql)?;
        let end = end_of_input(&tokens);
        let statements = self
            .parser()
            .with_tokens_with_locations(tokens)
            .parse_statements()
            .map_err(|e| ParseError::from_parser(sql, e, end))?;

        Ok(ParsedSql {
            sql: sql.to_string(),
            statements,
        })
    }

    /// Parse a single expression, e.g. a rendered macro fragment
    pub fn parse_expression(&self, sql: &str) -> Result<Expr, ParseError> {
        let tokens = self.tokenize(sql)?;
        let end = end_of_input(&tokens);
        let mut parser = self.parser().with_tokens_with_locations(tokens);

        let expr = parser
            .parse_expr()
            .map_err(|e| ParseError::from_parser(sql, e, end))?;

        let trailing = parser.peek_token();
        if trailing.token != Token::EOF {
            return Err(ParseError {
                sql: sql.to_string(),
                message: format!("Expected: end of expression, found: {}", trailing.token),
                location: to_location(trailing.span.start).or(end),
            });
        }

        Ok(expr)
    }

    fn parser(&self) -> Parser<'_> {
        // Keep string literals exactly as written so re-rendering does not
        // change escapes.
        Parser::new(&*self.dialect).with_options(ParserOptions::new().with_unescape(false))
    }

    fn tokenize(&self, sql: &str) -> Result<Vec<TokenWithSpan>, ParseError> {
        let mut tokens = Tokenizer::new(&*self.dialect, sql)
            .with_unescape(false)
            .tokenize_with_location()
            .map_err(|e| ParseError::from_tokenizer(sql, e))?;

        promote_macro_placeholders(&mut tokens);
        Ok(tokens)
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite `$__name` placeholder tokens into unquoted words
fn promote_macro_placeholders(tokens: &mut [TokenWithSpan]) {
    for token in tokens.iter_mut() {
        let promoted = match &token.token {
            Token::Placeholder(text) if text.starts_with(MACRO_PREFIX) => {
                Some(Token::make_word(text, None))
            }
            _ => None,
        };

        if let Some(word) = promoted {
            token.token = word;
        }
    }
}

fn to_location(location: sqlparser::tokenizer::Location) -> Option<Location> {
    // The tokenizer reports line 0 for synthetic positions (e.g. EOF).
    if location.line == 0 {
        None
    } else {
        Some(Location::new(location.line, location.column))
    }
}

/// End of the last non-whitespace token, where errors at EOF point
fn end_of_input(tokens: &[TokenWithSpan]) -> Option<Location> {
    tokens
        .iter()
        .rev()
        .find(|token| !matches!(token.token, Token::Whitespace(_)))
        .and_then(|token| to_location(token.span.end))
}

/// Successfully parsed SQL with AST
#[derive(Debug, Clone)]
pub struct ParsedSql {
    /// Original SQL string
    pub sql: String,

    /// Parsed statements
    pub statements: Vec<Statement>,
}

impl ParsedSql {
    /// Render statements back to SQL text
    pub fn render(&self) -> String {
        render_statements(&self.statements)
    }
}

/// Render statements back to SQL, one per line
pub fn render_statements(statements: &[Statement]) -> String {
    statements
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";\n")
}

/// SQL parsing error with position information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Original SQL string
    pub sql: String,

    /// Parser message without the position suffix
    pub message: String,

    /// Line/column of the offending token, when known
    pub location: Option<Location>,
}

impl ParseError {
    fn from_tokenizer(sql: &str, error: TokenizerError) -> Self {
        Self {
            sql: sql.to_string(),
            message: error.message,
            location: to_location(error.location),
        }
    }

    /// `end` stands in for the position of errors reported at EOF, which
    /// sqlparser leaves unpositioned
    fn from_parser(sql: &str, error: ParserError, end: Option<Location>) -> Self {
        let raw = match error {
            ParserError::TokenizerError(message) | ParserError::ParserError(message) => message,
            ParserError::RecursionLimitExceeded => "recursion limit exceeded".to_string(),
        };
        let (message, location) = split_position(&raw);

        Self {
            sql: sql.to_string(),
            message,
            location: location.or(end),
        }
    }

    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::new(
            DiagnosticCode::SqlParseError,
            Severity::Error,
            format!("Failed to parse SQL: {}", self.message),
        );

        if let Some(location) = self.location {
            diag = diag.with_location(location);
        }

        diag
    }
}

/// Split sqlparser's ` at Line: L, Column: C` suffix off a message
fn split_position(message: &str) -> (String, Option<Location>) {
    static POSITION: OnceLock<Regex> = OnceLock::new();
    let re = POSITION.get_or_init(|| {
        Regex::new(r"(?s)^(.*?)\s*at Line: (\d+), Column: (\d+)\s*$").expect("valid position regex")
    });

    match re.captures(message) {
        Some(caps) => {
            let line = caps[2].parse().ok();
            let column = caps[3].parse().ok();
            let location = match (line, column) {
                (Some(line), Some(column)) if line > 0 => Some(Location::new(line, column)),
                _ => None,
            };
            (caps[1].to_string(), location)
        }
        None => (message.to_string(), None),
    }
}

/// Rendered as `line L:C message` with zero-based positions, the shape the
/// query editor parses to point at the failing line.
impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.location {
            Some(location) => write!(
                f,
                "line {}:{} {}",
                location.line.saturating_sub(1),
                location.column.saturating_sub(1),
                self.message
            ),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ParseError {}
