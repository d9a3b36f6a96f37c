use crate::config::DbConfig;
use crate::error::{CrudError, Result};
use crate::params::{ParamBinder, Params, Row};
use crate::settings::{Settings, DEFAULT_SETTINGS_TABLE};
use crate::statement::{SqlQuery, StatementKind};
use crate::value::Value;
use rusqlite::{Connection, Statement};
use std::path::Path;
use tracing::{debug, info, warn};

/// What a statement produced, decided by its leading keyword.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Every row of a `SELECT`/`SHOW`, possibly none.
    Rows(Vec<Row>),
    /// Rows changed by an `INSERT`/`REPLACE`/`UPDATE`/`DELETE`.
    Affected(usize),
    /// Any other statement ran to completion.
    Done,
}

impl QueryResult {
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn affected(&self) -> Option<usize> {
        match self {
            QueryResult::Affected(n) => Some(*n),
            _ => None,
        }
    }
}

/// A single SQLite connection plus the bound-parameter list for its next
/// statement.
///
/// Statements run one at a time through `&mut self`. A failing statement is
/// logged and returned as [`CrudError::Statement`]; the connection stays
/// usable afterwards.
#[derive(Debug)]
pub struct Database {
    config: DbConfig,
    conn: Option<Connection>,
    parameters: ParamBinder,
    debug: bool,
    last_row_count: Option<usize>,
    settings_table: String,
}

impl Database {
    /// Opens the database described by `config`.
    pub fn connect(config: DbConfig) -> Result<Self> {
        let conn = open(&config)?;
        Ok(Self {
            config,
            conn: Some(conn),
            parameters: ParamBinder::new(),
            debug: false,
            last_row_count: None,
            settings_table: DEFAULT_SETTINGS_TABLE.to_string(),
        })
    }

    /// Opens the database named by an INI init file, see
    /// [`DbConfig::from_ini_file`].
    pub fn from_ini_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(DbConfig::from_ini_file(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::connect(DbConfig::in_memory())
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Closes the connection. Further statements fail with
    /// [`CrudError::NotConnected`] until [`Database::reconnect`].
    pub fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if let Err((conn, source)) = conn.close() {
            self.conn = Some(conn);
            return Err(CrudError::Connection {
                dbname: self.config.dbname.clone(),
                source,
            });
        }
        info!(dbname = %self.config.dbname, "database connection closed");
        Ok(())
    }

    /// Reopens a closed connection; a no-op while connected.
    pub fn reconnect(&mut self) -> Result<()> {
        if self.conn.is_none() {
            self.conn = Some(open(&self.config)?);
        }
        Ok(())
    }

    /// In debug mode statement errors carry the failing query text.
    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    /// The underlying connection, for anything this wrapper does not cover.
    pub fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(CrudError::NotConnected)
    }

    /// Queues one named parameter for the next statement.
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.parameters.bind(name, value);
        self
    }

    /// Queues a whole mapping for the next statement, unless parameters are
    /// already queued.
    pub fn bind_more(&mut self, params: &Params) -> &mut Self {
        self.parameters.bind_more(params);
        self
    }

    /// Runs `query` and shapes the result by its leading keyword: rows for
    /// `SELECT`/`SHOW`, a row count for `INSERT`/`REPLACE`/`UPDATE`/`DELETE`,
    /// [`QueryResult::Done`] otherwise.
    pub fn query(&mut self, query: &str, params: &Params) -> Result<QueryResult> {
        let query = query.replace('\r', " ");
        let query = query.trim();
        let kind = StatementKind::classify(query);
        debug!(?kind, params = params.len(), "executing statement");

        let result = self.prepare_and_run(query, params, |stmt| match kind {
            StatementKind::Rows => collect_rows(stmt, None).map(QueryResult::Rows),
            StatementKind::Affected => execute_counting(stmt).map(QueryResult::Affected),
            StatementKind::Other => run_to_completion(stmt).map(|()| QueryResult::Done),
        })?;

        self.last_row_count = Some(match &result {
            QueryResult::Rows(rows) => rows.len(),
            QueryResult::Affected(n) => *n,
            QueryResult::Done => 0,
        });
        Ok(result)
    }

    /// Runs a synthesized statement with its own parameters.
    pub fn run(&mut self, query: &SqlQuery) -> Result<QueryResult> {
        self.query(&query.statement, &query.params)
    }

    /// The first row of the result set, if any.
    pub fn row(&mut self, query: &str, params: &Params) -> Result<Option<Row>> {
        let mut rows = self.prepare_and_run(query.trim(), params, |stmt| collect_rows(stmt, Some(1)))?;
        self.last_row_count = Some(rows.len());
        Ok(rows.pop())
    }

    /// The first column of the first row, if any.
    pub fn single(&mut self, query: &str, params: &Params) -> Result<Option<Value>> {
        let row = self.row(query, params)?;
        Ok(row.and_then(|r| r.into_values().next()))
    }

    /// The first column of every row.
    pub fn column(&mut self, query: &str, params: &Params) -> Result<Vec<Value>> {
        let rows = self.prepare_and_run(query.trim(), params, |stmt| collect_rows(stmt, None))?;
        self.last_row_count = Some(rows.len());
        Ok(rows
            .into_iter()
            .filter_map(|r| r.into_values().next())
            .collect())
    }

    /// Rowid of the most recent successful insert on this connection.
    pub fn last_insert_id(&self) -> Result<i64> {
        Ok(self.connection()?.last_insert_rowid())
    }

    /// Rows returned or changed by the last statement, `None` before the first.
    pub fn num_rows(&self) -> Option<usize> {
        self.last_row_count
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        self.execute_batch("BEGIN")
    }

    pub fn commit(&mut self) -> Result<()> {
        self.execute_batch("COMMIT")
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.execute_batch("ROLLBACK")
    }

    pub fn in_transaction(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| !c.is_autocommit())
    }

    /// The key-value settings store kept in this database.
    pub fn settings(&mut self) -> Settings<'_> {
        let table = self.settings_table.clone();
        Settings::new(self, table)
    }

    /// Renames the table [`Database::settings`] works on.
    pub fn set_settings_table(&mut self, table: impl Into<String>) -> &mut Self {
        self.settings_table = table.into();
        self
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(sql)
            .map_err(|source| self.statement_error(sql, source))?;
        debug!(sql, "transaction control");
        Ok(())
    }

    /// Prepares `query`, binds the queued parameters plus `params`, then
    /// hands the statement to `step`. The parameter list is emptied before
    /// anything can fail, so nothing leaks into the next statement.
    fn prepare_and_run<T>(
        &mut self,
        query: &str,
        params: &Params,
        step: impl FnOnce(&mut Statement<'_>) -> rusqlite::Result<T>,
    ) -> Result<T> {
        self.parameters.bind_more(params);
        let bound = self.parameters.take();
        let conn = self.conn.as_ref().ok_or(CrudError::NotConnected)?;

        conn.prepare(query)
            .and_then(|mut stmt| {
                bound.apply(&mut stmt)?;
                step(&mut stmt)
            })
            .map_err(|source| self.statement_error(query, source))
    }

    fn statement_error(&self, query: &str, source: rusqlite::Error) -> CrudError {
        if self.debug {
            warn!(error = %source, query, "statement failed");
        } else {
            warn!(error = %source, "statement failed");
        }
        CrudError::Statement {
            query: self.debug.then(|| query.to_string()),
            source,
        }
    }
}

fn open(config: &DbConfig) -> Result<Connection> {
    let opened = if config.is_in_memory() {
        Connection::open_in_memory()
    } else {
        Connection::open(&config.dbname)
    };
    let conn = opened.map_err(|source| {
        warn!(dbname = %config.dbname, error = %source, "failed to open database");
        CrudError::Connection {
            dbname: config.dbname.clone(),
            source,
        }
    })?;
    info!(
        host = %config.host,
        user = %config.user,
        dbname = %config.dbname,
        "database connection opened"
    );
    Ok(conn)
}

/// Reads up to `limit` rows, keyed by column name.
fn collect_rows(stmt: &mut Statement<'_>, limit: Option<usize>) -> rusqlite::Result<Vec<Row>> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while limit.map_or(true, |l| out.len() < l) {
        let Some(row) = rows.next()? else {
            break;
        };
        let mut record = Row::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            record.insert(name.clone(), row.get::<_, Value>(i)?);
        }
        out.push(record);
    }
    Ok(out)
}

/// Runs a write and reports how many rows it touched. A `RETURNING` clause
/// yields one row per changed row, so those are counted instead.
fn execute_counting(stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
    if stmt.column_count() == 0 {
        return stmt.raw_execute();
    }
    let mut rows = stmt.raw_query();
    let mut changed = 0;
    while rows.next()?.is_some() {
        changed += 1;
    }
    Ok(changed)
}

/// Steps a statement of unknown shape until it is done, discarding rows.
fn run_to_completion(stmt: &mut Statement<'_>) -> rusqlite::Result<()> {
    if stmt.column_count() == 0 {
        return stmt.raw_execute().map(|_| ());
    }
    let mut rows = stmt.raw_query();
    while rows.next()?.is_some() {}
    Ok(())
}
