//! Generic CRUD records and a prepared-statement wrapper over SQLite.
//!
//! # Intention
//!
//! - Provide one small API for single-table create/read/update/delete.
//! - Keep SQL synthesis, parameter binding and execution in separate layers.
//! - Store application settings in the same database.
//!
//! # Architectural Boundaries
//!
//! - One connection per [`Database`], one statement at a time.
//! - Equality filters only: no joins, no `OR`, no comparison operators.
//! - No pooling, migrations or dialects other than SQLite.

pub mod config;
pub mod crud;
pub mod db;
pub mod error;
pub mod params;
pub mod settings;
pub mod statement;
pub mod value;

pub use config::DbConfig;
pub use crud::{Entity, EntityConfig, Record};
pub use db::{Database, QueryResult};
pub use error::{CrudError, Result};
pub use params::{Params, Row};
pub use settings::Settings;
pub use statement::{Aggregate, SortOrder, SqlQuery, StatementKind};
pub use value::Value;
