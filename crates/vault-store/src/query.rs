//! SQLite rendering of [`QueryPlan`]s.
//!
//! Filters are collected as `column op ?N` clauses with their bind values
//! kept separately, so no value is ever interpolated into the statement.
//! Column names come from `&'static str` constants in this crate.

use rusqlite::types::ToSql;
use rusqlite::{Connection, Row};

use crate::error::Result;
use crate::paginator::{
    BatchInfo, Comparison, FilterValue, Page, Predicate, QueryPlan, SortOrder, CURSOR_COLUMN,
};

/// SQL expression yielding the next cursor value for `table`.
///
/// Evaluated inside the INSERT itself, so the read of `MAX(cursor)` and the
/// write happen under the same SQLite write lock.
pub(crate) fn next_cursor(table: &str) -> String {
    format!("(SELECT COALESCE(MAX({CURSOR_COLUMN}), 0) + 1 FROM {table})")
}

struct Rendered {
    where_clause: String,
    params: Vec<Box<dyn ToSql>>,
}

fn render_filters(filters: &[Predicate]) -> Rendered {
    let mut clauses = Vec::with_capacity(filters.len());
    let mut params: Vec<Box<dyn ToSql>> = Vec::with_capacity(filters.len());

    for (i, filter) in filters.iter().enumerate() {
        let op = match filter.comparison {
            Comparison::Equal => "=",
            Comparison::NotEqual => "!=",
            Comparison::Greater => ">",
            Comparison::Less => "<",
        };
        clauses.push(format!("{} {} ?{}", filter.column, op, i + 1));
        match &filter.value {
            FilterValue::Text(s) => params.push(Box::new(s.clone())),
            FilterValue::Integer(n) => params.push(Box::new(*n)),
        }
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    Rendered {
        where_clause,
        params,
    }
}

fn select_sql(columns: &str, table: &str, plan: &QueryPlan, where_clause: &str) -> String {
    let order = match plan.order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    };
    let limit = plan
        .limit
        .map(|n| format!(" LIMIT {n}"))
        .unwrap_or_default();
    format!("SELECT {columns} FROM {table} {where_clause} ORDER BY {CURSOR_COLUMN} {order}{limit}")
}

/// Runs `plan` against `table`, mapping each row with `map_row`.
pub(crate) fn fetch<T>(
    conn: &Connection,
    table: &str,
    columns: &str,
    plan: &QueryPlan,
    map_row: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let rendered = render_filters(&plan.filters);
    let sql = select_sql(columns, table, plan, &rendered.where_clause);
    let params: Vec<&dyn ToSql> = rendered.params.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), map_row)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

/// Counts the rows of `table` matched by `plan`'s filters.
pub(crate) fn count(conn: &Connection, table: &str, plan: &QueryPlan) -> Result<usize> {
    let rendered = render_filters(&plan.filters);
    let sql = format!("SELECT COUNT(*) FROM {table} {}", rendered.where_clause);
    let params: Vec<&dyn ToSql> = rendered.params.iter().map(|p| p.as_ref()).collect();

    let n: i64 = conn.query_row(&sql, params.as_slice(), |row| row.get(0))?;
    Ok(usize::try_from(n).unwrap_or_default())
}

/// Fetches one page of `table` scoped by `filters`.
pub(crate) fn page<T>(
    conn: &Connection,
    table: &str,
    columns: &str,
    batch: &BatchInfo,
    filters: Vec<Predicate>,
    map_row: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Page<T>> {
    let plan = QueryPlan::batch(batch, filters)?;
    let rows = fetch(conn, table, columns, &plan, map_row)?;
    tracing::trace!(
        table,
        count = batch.count,
        fetched = rows.len(),
        tail = batch.tail,
        "fetched page"
    );
    Ok(Page::from_batch(batch, rows))
}

/// Parses a TEXT column holding an enum label.
pub(crate) fn parse_label<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let label: String = row.get(idx)?;
    label.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parses a TEXT column holding JSON.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let json: String = row.get(idx)?;
    serde_json::from_str(&json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
