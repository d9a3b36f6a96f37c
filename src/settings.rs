//! Application settings stored as name/value rows.
//!
//! Scalars are stored as plain text. Objects and arrays are stored as JSON
//! with the `serialize` flag set and decoded again on read.

use crate::db::{Database, QueryResult};
use crate::error::Result;
use crate::params::Params;
use crate::statement::validate_identifier;
use crate::value::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::debug;

pub const DEFAULT_SETTINGS_TABLE: &str = "variable";

/// A stored setting before decoding.
#[derive(Debug, Clone, PartialEq)]
struct Stored {
    text: String,
    serialized: bool,
}

impl Stored {
    fn decode(self) -> Result<JsonValue> {
        if self.serialized {
            Ok(serde_json::from_str(&self.text)?)
        } else {
            Ok(JsonValue::String(self.text))
        }
    }
}

/// The settings table of one [`Database`], see [`Database::settings`].
pub struct Settings<'a> {
    db: &'a mut Database,
    table: String,
}

impl<'a> Settings<'a> {
    pub(crate) fn new(db: &'a mut Database, table: String) -> Self {
        Self { db, table }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the settings table if it does not exist yet.
    pub fn ensure_table(&mut self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                name VARCHAR(100) NOT NULL PRIMARY KEY,
                value TEXT,
                serialize TINYINT NOT NULL DEFAULT 0,
                dateUpdate TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            self.quoted_table()?
        );
        self.db.query(&sql, &Params::new())?;
        Ok(())
    }

    /// The stored value, or `None` when the name is absent or its value is NULL.
    pub fn find(&mut self, name: &str) -> Result<Option<JsonValue>> {
        self.load(name)?.map(Stored::decode).transpose()
    }

    /// The stored value, or `default` when there is none.
    pub fn get(&mut self, name: &str, default: impl Into<JsonValue>) -> Result<JsonValue> {
        Ok(self.find(name)?.unwrap_or_else(|| default.into()))
    }

    /// Decodes the stored value into `T`. Unserialized text that does not
    /// fit `T` as a string is parsed as JSON, so `"42"` reads back as a number.
    pub fn get_as<T: DeserializeOwned>(&mut self, name: &str) -> Result<Option<T>> {
        let Some(stored) = self.load(name)? else {
            return Ok(None);
        };
        if stored.serialized {
            return Ok(Some(serde_json::from_str(&stored.text)?));
        }
        match serde_json::from_value(JsonValue::String(stored.text.clone())) {
            Ok(value) => Ok(Some(value)),
            Err(_) => Ok(Some(serde_json::from_str(&stored.text)?)),
        }
    }

    /// Upserts a setting, replacing any previous row with the same name.
    /// Returns the affected row count.
    pub fn set(&mut self, name: &str, value: impl Into<JsonValue>) -> Result<usize> {
        let value = value.into();
        let serialized = value.is_object() || value.is_array();
        let stored = match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Text(if b { "1" } else { "0" }.to_string()),
            JsonValue::Number(n) => Value::Text(n.to_string()),
            JsonValue::String(s) => Value::Text(s),
            structured => Value::Text(serde_json::to_string(&structured)?),
        };

        let sql = format!(
            "REPLACE INTO {} (name, value, serialize) VALUES (:name, :value, :serialize)",
            self.quoted_table()?
        );
        let params = Params::new()
            .with_value("name", name)
            .with_value("value", stored)
            .with_value("serialize", serialized);
        let affected = self.affected(&sql, &params)?;
        debug!(name, serialized, "setting saved");
        Ok(affected)
    }

    /// Serializes `value` with serde and stores it like [`Settings::set`].
    pub fn set_serialized<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<usize> {
        let value = serde_json::to_value(value)?;
        self.set(name, value)
    }

    /// Removes the setting; returns 1 if it existed, 0 otherwise.
    pub fn delete(&mut self, name: &str) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE name = :name", self.quoted_table()?);
        self.affected(&sql, &Params::new().with_value("name", name))
    }

    fn load(&mut self, name: &str) -> Result<Option<Stored>> {
        let sql = format!(
            "SELECT value, serialize FROM {} WHERE name = :name LIMIT 1",
            self.quoted_table()?
        );
        let row = self.db.row(&sql, &Params::new().with_value("name", name))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let text = match row.get("value") {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => value.to_string(),
        };
        let serialized = row
            .get("serialize")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(Some(Stored { text, serialized }))
    }

    fn affected(&mut self, sql: &str, params: &Params) -> Result<usize> {
        Ok(match self.db.query(sql, params)? {
            QueryResult::Affected(n) => n,
            _ => 0,
        })
    }

    fn quoted_table(&self) -> Result<String> {
        validate_identifier(&self.table).map(|t| format!("\"{t}\""))
    }
}
