//! SQL synthesis for single-table CRUD statements.
//!
//! Every builder returns a [`SqlQuery`] whose named placeholders match the
//! column names (`col = :col`), so the caller's field mapping doubles as the
//! parameter mapping. Only equality filters joined by `AND` are supported.

use crate::error::{CrudError, Result};
use crate::params::{Params, Row};
use crate::value::Value;
use std::fmt;

/// SQL Query with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Params,
}

impl SqlQuery {
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// Return shape of a statement, decided by its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `SELECT` / `SHOW`: the full result set.
    Rows,
    /// `INSERT` / `REPLACE` / `UPDATE` / `DELETE`: the affected row count.
    /// With a `RETURNING` clause this is the number of rows returned.
    Affected,
    /// Anything else; executed for its side effects.
    Other,
}

impl StatementKind {
    pub fn classify(sql: &str) -> Self {
        let keyword = sql.split_whitespace().next().unwrap_or_default();
        match keyword.to_ascii_lowercase().as_str() {
            "select" | "show" => StatementKind::Rows,
            "insert" | "replace" | "update" | "delete" => StatementKind::Affected,
            _ => StatementKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Min,
    Max,
    Avg,
    Sum,
    Count,
}

impl Aggregate {
    fn function(self) -> &'static str {
        match self {
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
            Aggregate::Avg => "AVG",
            Aggregate::Sum => "SUM",
            Aggregate::Count => "COUNT",
        }
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, the names that are safe both as bare
/// column names and as `:name` placeholders.
pub fn validate_identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(CrudError::InvalidIdentifier(name.to_string()))
    }
}

fn table_name(table: &str) -> Result<String> {
    validate_identifier(table).map(|t| format!("\"{t}\""))
}

fn equality(column: &str) -> Result<String> {
    validate_identifier(column).map(|c| format!("{c} = :{c}"))
}

fn order_by(sort: &[(&str, SortOrder)]) -> Result<String> {
    if sort.is_empty() {
        return Ok(String::new());
    }
    let clauses = sort
        .iter()
        .map(|(column, order)| validate_identifier(column).map(|c| format!("{c} {order}")))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(" ORDER BY {}", clauses.join(", ")))
}

fn key_params(primary_key: &str, id: Value) -> Params {
    Params::new().with_value(primary_key, id)
}

/// `INSERT` over every field, in field order.
pub fn insert(table: &str, fields: &Row) -> Result<SqlQuery> {
    let table = table_name(table)?;
    if fields.is_empty() {
        return Ok(SqlQuery::new(&format!("INSERT INTO {table} DEFAULT VALUES")));
    }
    let columns = fields
        .keys()
        .map(|c| validate_identifier(c))
        .collect::<Result<Vec<_>>>()?;
    let statement = format!(
        "INSERT INTO {table} ({}) VALUES (:{})",
        columns.join(", "),
        columns.join(", :")
    );
    Ok(SqlQuery::new(&statement).with_params(fields.into()))
}

/// `UPDATE ... SET` every non-key field, restricted to the row whose primary
/// key matches.
///
/// Returns `None` when there is nothing besides the key to write. An empty
/// primary key is an error; this never emits an unrestricted `UPDATE`.
pub fn update(table: &str, primary_key: &str, fields: &Row) -> Result<Option<SqlQuery>> {
    let quoted = table_name(table)?;
    let pk = validate_identifier(primary_key)?;
    if fields.get(pk).map_or(true, Value::is_empty) {
        return Err(CrudError::MissingPrimaryKey {
            table: table.to_string(),
        });
    }
    let assignments = fields
        .keys()
        .filter(|c| c.as_str() != pk)
        .map(|c| equality(c))
        .collect::<Result<Vec<_>>>()?;
    if assignments.is_empty() {
        return Ok(None);
    }
    let statement = format!(
        "UPDATE {quoted} SET {} WHERE {pk} = :{pk}",
        assignments.join(", ")
    );
    Ok(Some(SqlQuery::new(&statement).with_params(fields.into())))
}

pub fn select_by_key(table: &str, primary_key: &str, id: Value) -> Result<SqlQuery> {
    let table = table_name(table)?;
    let pk = validate_identifier(primary_key)?;
    let statement = format!("SELECT * FROM {table} WHERE {pk} = :{pk} LIMIT 1");
    Ok(SqlQuery::new(&statement).with_params(key_params(pk, id)))
}

/// Selects only the key column, for existence probes.
pub fn select_key(table: &str, primary_key: &str, id: Value) -> Result<SqlQuery> {
    let table = table_name(table)?;
    let pk = validate_identifier(primary_key)?;
    let statement = format!("SELECT {pk} FROM {table} WHERE {pk} = :{pk} LIMIT 1");
    Ok(SqlQuery::new(&statement).with_params(key_params(pk, id)))
}

/// Deletes the row with the given key; the key is unique, so at most one row.
pub fn delete_by_key(table: &str, primary_key: &str, id: Value) -> Result<SqlQuery> {
    let table = table_name(table)?;
    let pk = validate_identifier(primary_key)?;
    let statement = format!("DELETE FROM {table} WHERE {pk} = :{pk}");
    Ok(SqlQuery::new(&statement).with_params(key_params(pk, id)))
}

/// `SELECT *` with an `AND` of equality filters, optional ordering and an
/// optional limit. A limit of zero means no limit.
pub fn select_where(
    table: &str,
    filter: &Row,
    sort: &[(&str, SortOrder)],
    limit: Option<u32>,
) -> Result<SqlQuery> {
    let mut statement = format!("SELECT * FROM {}", table_name(table)?);
    if !filter.is_empty() {
        let clauses = filter
            .keys()
            .map(|c| equality(c))
            .collect::<Result<Vec<_>>>()?;
        statement.push_str(" WHERE ");
        statement.push_str(&clauses.join(" AND "));
    }
    statement.push_str(&order_by(sort)?);
    if let Some(limit) = limit.filter(|l| *l > 0) {
        statement.push_str(&format!(" LIMIT {limit}"));
    }
    Ok(SqlQuery::new(&statement).with_params(filter.into()))
}

pub fn select_all(table: &str, sort: &[(&str, SortOrder)]) -> Result<SqlQuery> {
    select_where(table, &Row::new(), sort, None)
}

pub fn aggregate(table: &str, function: Aggregate, field: &str) -> Result<SqlQuery> {
    let table = table_name(table)?;
    let field = validate_identifier(field)?;
    Ok(SqlQuery::new(&format!(
        "SELECT {}({field}) FROM {table}",
        function.function()
    )))
}
