use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrudError>;

#[derive(Debug, Error)]
pub enum CrudError {
    /// The database could not be opened.
    #[error("failed to connect to database {dbname}: {source}")]
    Connection {
        dbname: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Preparing, binding or executing a statement failed. `query` is only
    /// filled in when the wrapper runs in debug mode.
    #[error("statement failed: {source}{}", query_suffix(.query))]
    Statement {
        query: Option<String>,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database connection is closed")]
    NotConnected,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("no primary key value for table {table}")]
    MissingPrimaryKey { table: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn query_suffix(query: &Option<String>) -> String {
    query
        .as_deref()
        .map(|q| format!(", query: \"{q}\""))
        .unwrap_or_default()
}
