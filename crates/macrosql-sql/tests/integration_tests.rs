//! Integration tests for parsing, interpolation and CTE extraction

use chrono::{Duration, TimeZone, Utc};
use macrosql_core::{AdHocFilter, DialectConfig, FilterOperator, InterpolationRequest, QueryContext, TimeRange};
use macrosql_sql::{extract_ctes, ErrorKind, Interpolator, SqlParser};
use pretty_assertions::assert_eq;

const DASHBOARD_QUERY: &str = r#"
WITH $__errors AS (
    SELECT ts, host, message
    FROM logs
    WHERE $__timeFilter(ts) AND level = 'error'
)
SELECT
    $__timeInterval(ts) AS bucket,
    host,
    count() AS errors
FROM $__errors
WHERE $__adHocFilter()
GROUP BY bucket, host
ORDER BY bucket
"#;

fn day_range() -> TimeRange {
    TimeRange::new(
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

#[test]
fn interpolates_a_dashboard_query() {
    let request = InterpolationRequest::new(DASHBOARD_QUERY, day_range())
        .with_interval(Duration::minutes(1))
        .with_filters(vec![
            AdHocFilter::new("host", FilterOperator::NotEqual, "db-1"),
            AdHocFilter::new("message", FilterOperator::RegexMatch, "time(out|d out)"),
        ]);

    let sql = Interpolator::new(DialectConfig::ClickHouse)
        .interpolate(&request, &QueryContext::new())
        .unwrap();

    assert!(sql.contains("ts >= '2023-01-01 00:00:00' AND ts <= '2023-01-02 00:00:00'"));
    assert!(sql.contains("toStartOfInterval(toDateTime(ts), INTERVAL 60 SECOND) AS bucket"));
    assert!(sql.contains("(host <> 'db-1' AND match(message, 'time(out|d out)'))"));
    assert!(sql.contains("WITH $__errors AS ("));
    assert!(!sql.contains("$__timeFilter"));
    assert!(!sql.contains("$__adHocFilter"));

    // The output is valid SQL for the same dialect.
    assert!(SqlParser::clickhouse().parse(&sql).is_ok());
}

#[test]
fn conjunct_count_matches_filter_count() {
    for count in 0..4 {
        let filters = (0..count)
            .map(|i| AdHocFilter::new(format!("k{i}"), FilterOperator::Equal, "v"))
            .collect::<Vec<_>>();
        let request = InterpolationRequest::new("SELECT * FROM t WHERE $__adHocFilter()", day_range())
            .with_filters(filters);

        let sql = Interpolator::default()
            .interpolate(&request, &QueryContext::new())
            .unwrap();

        if count == 0 {
            assert_eq!(sql, "SELECT * FROM t WHERE 1 = 1");
        } else {
            assert_eq!(sql.matches(" = 'v'").count(), count);
            assert_eq!(sql.matches(" AND ").count(), count - 1);
        }
    }
}

#[test]
fn filter_values_cannot_break_out_of_literals() {
    let request = InterpolationRequest::new("SELECT * FROM t WHERE $__adHocFilter()", day_range())
        .with_filters(vec![AdHocFilter::new("name", FilterOperator::Equal, "x' OR 1 = 1 --")]);

    let sql = Interpolator::default()
        .interpolate(&request, &QueryContext::new())
        .unwrap();

    assert_eq!(sql, "SELECT * FROM t WHERE (name = 'x'' OR 1 = 1 --')");
}

#[test]
fn generic_dialect_uses_typed_literals() {
    let request = InterpolationRequest::new(
        "SELECT $__timeInterval(ts) FROM t WHERE $__timeFilter(ts)",
        day_range(),
    )
    .with_interval(Duration::seconds(10));

    let sql = Interpolator::new(DialectConfig::Generic)
        .interpolate(&request, &QueryContext::new())
        .unwrap();

    assert_eq!(
        sql,
        "SELECT date_bin(INTERVAL '10 seconds', ts, TIMESTAMP '1970-01-01 00:00:00') FROM t \
         WHERE (ts >= TIMESTAMP '2023-01-01 00:00:00' AND ts <= TIMESTAMP '2023-01-02 00:00:00')"
    );
}

#[test]
fn extracts_placeholder_ctes() {
    let parsed = SqlParser::new()
        .parse("WITH $__cte1 AS (SELECT * FROM t) SELECT * FROM $__cte1")
        .unwrap();

    let ctes = extract_ctes(&parsed).unwrap();
    assert_eq!(ctes.len(), 1);
    assert_eq!(ctes["cte1"].body.to_string(), "SELECT * FROM t");
}

#[test]
fn extraction_and_interpolation_share_a_parse() {
    let interpolator = Interpolator::default();
    let parsed = interpolator.parser().parse(DASHBOARD_QUERY).unwrap();
    let request = InterpolationRequest::new(DASHBOARD_QUERY, day_range());

    let before = extract_ctes(&parsed).unwrap();
    interpolator
        .interpolate_parsed(&parsed, &request, &QueryContext::new())
        .unwrap();
    let after = extract_ctes(&parsed).unwrap();

    assert_eq!(before, after);
    assert!(after["errors"].body.to_string().contains("$__timeFilter(ts)"));
}

#[test]
fn unbalanced_parentheses_fail_to_parse() {
    let request = InterpolationRequest::new("SELECT * FROM t WHERE (a = 1", day_range());
    let error = Interpolator::default()
        .interpolate(&request, &QueryContext::new())
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Parse);
    assert!(!error.to_string().is_empty());
}
