//! Glue between sea-query builders and rusqlite.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};

pub type Built = (String, sea_query::Values);

/// Convert sea-query bind values into rusqlite values.
pub fn values_to_sql(values: &sea_query::Values) -> Vec<SqlValue> {
    values
        .0
        .iter()
        .map(|v| match v {
            sea_query::Value::Bool(Some(b)) => SqlValue::Integer(i64::from(*b)),
            sea_query::Value::TinyInt(Some(i)) => SqlValue::Integer(i64::from(*i)),
            sea_query::Value::SmallInt(Some(i)) => SqlValue::Integer(i64::from(*i)),
            sea_query::Value::Int(Some(i)) => SqlValue::Integer(i64::from(*i)),
            sea_query::Value::BigInt(Some(i)) => SqlValue::Integer(*i),
            sea_query::Value::TinyUnsigned(Some(i)) => SqlValue::Integer(i64::from(*i)),
            sea_query::Value::SmallUnsigned(Some(i)) => SqlValue::Integer(i64::from(*i)),
            sea_query::Value::Unsigned(Some(i)) => SqlValue::Integer(i64::from(*i)),
            sea_query::Value::BigUnsigned(Some(i)) => {
                SqlValue::Integer(i64::try_from(*i).unwrap_or(i64::MAX))
            }
            sea_query::Value::Float(Some(f)) => SqlValue::Real(f64::from(*f)),
            sea_query::Value::Double(Some(f)) => SqlValue::Real(*f),
            sea_query::Value::String(Some(s)) => SqlValue::Text(s.to_string()),
            sea_query::Value::Char(Some(c)) => SqlValue::Text(c.to_string()),
            sea_query::Value::Bytes(Some(b)) => SqlValue::Blob(b.to_vec()),
            _ => SqlValue::Null,
        })
        .collect()
}

/// Execute a built statement, returning the number of affected rows.
pub fn execute(conn: &Connection, (sql, values): Built) -> rusqlite::Result<usize> {
    conn.execute(&sql, params_from_iter(values_to_sql(&values)))
}

/// Run a built query expected to return at most one row.
pub fn query_opt<T, F>(conn: &Connection, (sql, values): Built, f: F) -> rusqlite::Result<Option<T>>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    conn.query_row(&sql, params_from_iter(values_to_sql(&values)), f)
        .optional()
}

/// Run a built query and map every row.
pub fn query_all<T, F>(conn: &Connection, (sql, values): Built, f: F) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values_to_sql(&values)), f)?;
    rows.collect()
}

/// Single integer result, e.g. `COUNT(*)`.
pub fn query_count(conn: &Connection, built: Built) -> rusqlite::Result<i64> {
    Ok(query_opt(conn, built, |row| row.get::<_, i64>(0))?.unwrap_or(0))
}

// ── Timestamps ─────────────────────────────────────────────────────────

/// RFC 3339 UTC with millisecond precision; sorts lexically in time order.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Read a required timestamp column.
pub fn ts_col(row: &Row<'_>, col: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(col)?;
    parse_ts(&raw).ok_or_else(|| bad_text(row, col, format!("invalid timestamp '{raw}'")))
}

/// Read a nullable timestamp column.
pub fn opt_ts_col(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(col)?;
    match raw {
        None => Ok(None),
        Some(raw) => parse_ts(&raw)
            .map(Some)
            .ok_or_else(|| bad_text(row, col, format!("invalid timestamp '{raw}'"))),
    }
}

/// Read a text column and parse it with `FromStr`.
pub fn parsed_col<T>(row: &Row<'_>, col: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(col)?;
    raw.parse::<T>()
        .map_err(|e| bad_text(row, col, e.to_string()))
}

fn bad_text(row: &Row<'_>, col: &str, msg: String) -> rusqlite::Error {
    let idx = row.as_ref().column_index(col).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn converts_common_values() {
        let values = sea_query::Values(vec![
            7i64.into(),
            true.into(),
            "x".into(),
            Option::<i64>::None.into(),
            500u64.into(),
        ]);
        assert_eq!(
            values_to_sql(&values),
            vec![
                SqlValue::Integer(7),
                SqlValue::Integer(1),
                SqlValue::Text("x".into()),
                SqlValue::Null,
                SqlValue::Integer(500),
            ]
        );
    }

    #[test]
    fn timestamps_round_trip_and_sort() {
        let a = Utc.with_ymd_and_hms(2026, 3, 14, 9, 5, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(1);
        assert_eq!(fmt_ts(a), "2026-03-14T09:05:00.000Z");
        assert_eq!(parse_ts(&fmt_ts(b)), Some(b));
        assert!(fmt_ts(a) < fmt_ts(b));
    }

    #[test]
    fn executes_built_statements() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER, name TEXT);")
            .unwrap();
        let inserted = execute(
            &conn,
            (
                "INSERT INTO t (id, name) VALUES (?, ?)".to_string(),
                sea_query::Values(vec![1i64.into(), "a".into()]),
            ),
        )
        .unwrap();
        assert_eq!(inserted, 1);
        let count = query_count(
            &conn,
            ("SELECT COUNT(*) FROM t".to_string(), sea_query::Values(vec![])),
        )
        .unwrap();
        assert_eq!(count, 1);
    }
}
