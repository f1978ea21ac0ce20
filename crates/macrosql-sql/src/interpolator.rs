//! Macro interpolation
//!
//! Parses a template, expands every macro call against the request's time
//! range, filters and interval, and renders the rewritten statements. The
//! rewrite happens on a clone of the parsed statements, so a [`ParsedSql`]
//! handed to [`Interpolator::interpolate_parsed`] can be reused afterwards.

use macrosql_core::{DialectConfig, InterpolationRequest, QueryContext};
use sqlparser::ast::Expr;
use std::ops::ControlFlow;
use tracing::{debug, trace};
use crate::error::Error;
use crate::macros::MacroInvocation;
use crate::parser::{render_statements, ParsedSql, SqlParser};
use crate::render::{Fragment, FragmentRenderer};
use crate::walker::{walk_statement_mut, ShapeTarget, SiteMut};

/// Expands macros for one SQL dialect
pub struct Interpolator {
    parser: SqlParser,
    renderer: FragmentRenderer,
}

impl Interpolator {
    pub fn new(dialect: DialectConfig) -> Self {
        Self {
            parser: SqlParser::from_dialect(&dialect),
            renderer: FragmentRenderer::new(dialect),
        }
    }

    pub fn parser(&self) -> &SqlParser {
        &self.parser
    }

    pub fn dialect(&self) -> DialectConfig {
        self.renderer.dialect()
    }

    /// Parse `request.raw_sql` and expand its macros
    pub fn interpolate(&self, request: &InterpolationRequest, ctx: &QueryContext) -> Result<String, Error> {
        ctx.check()?;
        let parsed = self.parser.parse(&request.raw_sql)?;
        self.interpolate_parsed(&parsed, request, ctx)
    }

    /// Expand the macros of already parsed SQL
    ///
    /// `parsed` is left untouched; the result never contains partial output.
    pub fn interpolate_parsed(
        &self,
        parsed: &ParsedSql,
        request: &InterpolationRequest,
        ctx: &QueryContext,
    ) -> Result<String, Error> {
        let request = InterpolationRequest {
            time_range: request.time_range.round(request.round)?,
            ..request.clone()
        };

        let mut statements = parsed.statements.clone();
        let mut expanded = 0usize;

        for statement in statements.iter_mut() {
            ctx.check()?;

            let flow = walk_statement_mut(statement, |site| match site {
                SiteMut::Call(call) => match self.expand(&call.invocation, &request) {
                    Ok(expr) => {
                        trace!(name = %call.invocation.name, replacement = %expr, "expanded macro");
                        call.replace(expr);
                        expanded += 1;
                        ControlFlow::Continue(())
                    }
                    Err(error) => ControlFlow::Break(error),
                },
                SiteMut::Malformed(error) if error.target == ShapeTarget::Call => {
                    ControlFlow::Break(Error::from(error))
                }
                // CTE placeholders belong to the extraction path and are
                // kept as written here.
                SiteMut::Cte(_) | SiteMut::Malformed(_) => ControlFlow::Continue(()),
            });

            if let ControlFlow::Break(error) = flow {
                debug!(%error, "interpolation failed");
                return Err(error);
            }
        }

        ctx.check()?;
        debug!(
            dialect = %self.dialect(),
            statements = statements.len(),
            expanded,
            "interpolated query"
        );

        Ok(render_statements(&statements))
    }

    fn expand(&self, invocation: &MacroInvocation, request: &InterpolationRequest) -> Result<Expr, Error> {
        let fail = |message: String| Error::Interpolation {
            macro_name: invocation.name.clone(),
            message,
            location: invocation.location,
        };

        match self.renderer.render(invocation, request).map_err(|e| fail(e.to_string()))? {
            Fragment::Expr(expr) => Ok(expr),
            Fragment::Sql(sql) => self
                .parser
                .parse_expression(&sql)
                .map_err(|e| fail(format!("rendered `{sql}` is not a valid expression: {}", e.message))),
        }
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new(DialectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::{Duration, TimeZone, Utc};
    use macrosql_core::{AdHocFilter, Cancelled, FilterOperator, TimeRange};
    use pretty_assertions::assert_eq;

    fn request(sql: &str) -> InterpolationRequest {
        let range = TimeRange::new(
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap(),
        )
        .unwrap();
        InterpolationRequest::new(sql, range)
    }

    fn interpolate(request: &InterpolationRequest) -> Result<String, Error> {
        Interpolator::default().interpolate(request, &QueryContext::new())
    }

    #[test]
    fn expands_time_filter() {
        let sql = interpolate(&request("SELECT * FROM t WHERE $__timeFilter(ts)")).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM t WHERE (ts >= '2023-01-01 00:00:00' AND ts <= '2023-01-02 00:00:00')"
        );
    }

    #[test]
    fn time_filter_on_a_disjunction_stays_grouped() {
        let sql = interpolate(&request("SELECT * FROM t WHERE $__timeFilter(a OR b)")).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM t WHERE ((a OR b) >= '2023-01-01 00:00:00' AND (a OR b) <= '2023-01-02 00:00:00')"
        );
    }

    #[test]
    fn macro_free_sql_is_unchanged() {
        let sql = "SELECT a, count(*) FROM t WHERE b = 'x''y' GROUP BY a ORDER BY a DESC LIMIT 10";
        assert_eq!(interpolate(&request(sql)).unwrap(), sql);
    }

    #[test]
    fn expands_nested_macros_inner_first() {
        let request = request("SELECT $__round($__fromTime) AS start").with_round(Duration::hours(1));
        assert_eq!(
            interpolate(&request).unwrap(),
            "SELECT toStartOfInterval(toDateTime('2023-01-01 00:00:00'), INTERVAL 1 HOUR) AS start"
        );
    }

    #[test]
    fn rounds_the_range_before_rendering() {
        let range = TimeRange::new(
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 20, 30).unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 41, 10).unwrap(),
        )
        .unwrap();
        let request = InterpolationRequest::new("SELECT $__fromTime, $__toTime", range)
            .with_round(Duration::minutes(5));

        assert_eq!(
            interpolate(&request).unwrap(),
            "SELECT toDateTime('2023-01-01 00:20:00'), toDateTime('2023-01-01 00:40:00')"
        );
    }

    #[test]
    fn expands_ad_hoc_filters_in_subqueries() {
        let request = request("SELECT * FROM (SELECT * FROM logs WHERE $__adHocFilter()) AS l")
            .with_filters(vec![AdHocFilter::new("level", FilterOperator::Equal, "error")]);

        assert_eq!(
            interpolate(&request).unwrap(),
            "SELECT * FROM (SELECT * FROM logs WHERE (level = 'error')) AS l"
        );
    }

    #[test]
    fn keeps_cte_placeholders() {
        let sql = "WITH $__cte1 AS (SELECT * FROM t WHERE $__timeFilter(ts)) SELECT * FROM $__cte1";
        let out = interpolate(&request(sql)).unwrap();

        assert!(out.starts_with("WITH $__cte1 AS (SELECT * FROM t WHERE (ts >= "));
        assert!(out.ends_with("SELECT * FROM $__cte1"));
    }

    #[test]
    fn wrong_arity_names_the_macro() {
        let error = interpolate(&request("SELECT * FROM t WHERE $__dateTimeFilter(ts)")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Interpolation);
        assert!(error.to_string().contains("$__dateTimeFilter"));
    }

    #[test]
    fn parse_errors_are_reported() {
        let error = interpolate(&request("SELECT * FROM t WHERE (a = 1")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Parse);
    }

    #[test]
    fn cancelled_context_yields_no_output() {
        let ctx = QueryContext::new();
        ctx.cancel();

        let error = Interpolator::default()
            .interpolate(&request("SELECT $__fromTime"), &ctx)
            .unwrap_err();
        assert_eq!(error, Error::Cancelled(Cancelled::Canceled));
    }

    #[test]
    fn parsed_input_is_reusable() {
        let interpolator = Interpolator::default();
        let parsed = interpolator.parser().parse("SELECT $__interval_s").unwrap();
        let ctx = QueryContext::new();

        let first = interpolator
            .interpolate_parsed(&parsed, &request("").with_interval(Duration::seconds(10)), &ctx)
            .unwrap();
        let second = interpolator
            .interpolate_parsed(&parsed, &request("").with_interval(Duration::seconds(20)), &ctx)
            .unwrap();

        assert_eq!(first, "SELECT 10");
        assert_eq!(second, "SELECT 20");
        assert_eq!(parsed.render(), "SELECT $__interval_s");
    }

    #[test]
    fn multiple_statements() {
        let sql = interpolate(&request("SELECT $__interval_s; SELECT $__interval_ms")).unwrap();
        assert_eq!(sql, "SELECT 1;\nSELECT 1");
    }
}
