use crate::db::Database;
use crate::error::{CrudError, Result};
use crate::params::Row;
use crate::statement::{self, Aggregate, SortOrder, SqlQuery};
use crate::value::Value;
use indexmap::IndexMap;
use tracing::debug;

/// Table identity and optional field rules for one kind of record.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityConfig {
    pub table: String,
    pub primary_key: String,
    /// Columns a record may carry, checked by [`Record::check_fields`].
    pub fields: Vec<String>,
    /// Columns that must be non-empty for [`Record::check_fields`] to pass.
    pub required: Vec<String>,
}

impl EntityConfig {
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            fields: Vec::new(),
            required: Vec::new(),
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_required<I, S>(mut self, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = required.into_iter().map(Into::into).collect();
        self
    }
}

/// One table row held in memory as column name to value.
///
/// Nothing is written until [`Record::create`] or [`Record::save`] runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    config: EntityConfig,
    fields: Row,
}

impl Record {
    pub fn new(config: EntityConfig) -> Self {
        Self::with_fields(config, Row::new())
    }

    pub fn with_fields(config: EntityConfig, fields: Row) -> Self {
        Self { config, fields }
    }

    pub fn config(&self) -> &EntityConfig {
        &self.config
    }

    pub fn fields(&self) -> &Row {
        &self.fields
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Removes a field, keeping the order of the others.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// The primary key value, unless it is absent or empty.
    pub fn primary_key_value(&self) -> Option<&Value> {
        self.fields
            .get(&self.config.primary_key)
            .filter(|v| !v.is_empty())
    }

    /// Inserts every field as a new row. Returns the affected row count.
    pub fn create(&mut self, db: &mut Database) -> Result<usize> {
        let query = statement::insert(&self.config.table, &self.fields)?;
        let affected = affected(db, &query)?;
        debug!(table = %self.config.table, affected, "record created");
        Ok(affected)
    }

    /// Writes every non-key field to the row with this record's primary key.
    ///
    /// `id` fills the primary key when the record has none. Returns `None`
    /// when the record holds nothing besides its key. A record without a
    /// key is rejected with [`CrudError::MissingPrimaryKey`] rather than
    /// updating the whole table.
    pub fn save(&mut self, db: &mut Database, id: Option<Value>) -> Result<Option<usize>> {
        if self.primary_key_value().is_none() {
            if let Some(id) = id.filter(|v| !v.is_empty()) {
                self.fields.insert(self.config.primary_key.clone(), id);
            }
        }
        let update = statement::update(&self.config.table, &self.config.primary_key, &self.fields)?;
        let Some(query) = update else {
            return Ok(None);
        };
        let affected = affected(db, &query)?;
        debug!(table = %self.config.table, affected, "record saved");
        Ok(Some(affected))
    }

    /// Deletes the row with `id`, or with this record's own key, and clears
    /// the record. Returns the affected row count.
    pub fn delete(&mut self, db: &mut Database, id: Option<Value>) -> Result<usize> {
        let id = self.resolve_id(id)?;
        let query = statement::delete_by_key(&self.config.table, &self.config.primary_key, id)?;
        let affected = affected(db, &query)?;
        self.fields.clear();
        debug!(table = %self.config.table, affected, "record deleted");
        Ok(affected)
    }

    /// Loads the row with `id`, or with this record's own key, replacing
    /// every field. Columns matching the primary key or a configured field
    /// (ignoring case) take the configured spelling; other column names are
    /// lower-cased. When no row matches the record is left empty and `false`
    /// is returned.
    pub fn find(&mut self, db: &mut Database, id: Option<Value>) -> Result<bool> {
        let id = match self.resolve_id(id) {
            Ok(id) => id,
            Err(e) => {
                self.fields.clear();
                return Err(e);
            }
        };
        let query = statement::select_by_key(&self.config.table, &self.config.primary_key, id)?;
        let row = db.row(&query.statement, &query.params)?;
        self.fields = row
            .map(|r| r.into_iter().map(|(k, v)| (self.field_name(&k), v)).collect())
            .unwrap_or_default();
        Ok(!self.fields.is_empty())
    }

    /// Rows matching every `filter` column by equality. An empty filter
    /// uses this record's own fields instead.
    pub fn search(
        &self,
        db: &mut Database,
        filter: &Row,
        sort: &[(&str, SortOrder)],
        limit: Option<u32>,
    ) -> Result<Vec<Row>> {
        let filter = if filter.is_empty() { &self.fields } else { filter };
        let query = statement::select_where(&self.config.table, filter, sort, limit)?;
        rows(db, &query)
    }

    pub fn all(&self, db: &mut Database, sort: &[(&str, SortOrder)]) -> Result<Vec<Row>> {
        let query = statement::select_all(&self.config.table, sort)?;
        rows(db, &query)
    }

    /// Every row keyed by the text form of its primary key. Later rows win
    /// on duplicate keys.
    pub fn all_by_primary_key(
        &self,
        db: &mut Database,
        sort: &[(&str, SortOrder)],
    ) -> Result<IndexMap<String, Row>> {
        let pk = &self.config.primary_key;
        Ok(self
            .all(db, sort)?
            .into_iter()
            .map(|row| {
                let key = row.get(pk).map(Value::to_string).unwrap_or_default();
                (key, row)
            })
            .collect())
    }

    pub fn aggregate(&self, db: &mut Database, function: Aggregate, field: &str) -> Result<Option<Value>> {
        let query = statement::aggregate(&self.config.table, function, field)?;
        db.single(&query.statement, &query.params)
    }

    pub fn min(&self, db: &mut Database, field: &str) -> Result<Option<Value>> {
        self.aggregate(db, Aggregate::Min, field)
    }

    pub fn max(&self, db: &mut Database, field: &str) -> Result<Option<Value>> {
        self.aggregate(db, Aggregate::Max, field)
    }

    pub fn avg(&self, db: &mut Database, field: &str) -> Result<Option<Value>> {
        self.aggregate(db, Aggregate::Avg, field)
    }

    pub fn sum(&self, db: &mut Database, field: &str) -> Result<Option<Value>> {
        self.aggregate(db, Aggregate::Sum, field)
    }

    pub fn count(&self, db: &mut Database, field: &str) -> Result<Option<Value>> {
        self.aggregate(db, Aggregate::Count, field)
    }

    /// Checks the record against the configured field list and required
    /// fields before it is written.
    pub fn check_fields(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(CrudError::Validation("no fields filled".into()));
        }
        if self.config.fields.is_empty() {
            return Err(CrudError::Validation(format!(
                "no field list configured for table {}",
                self.config.table
            )));
        }

        let unsupported: Vec<&str> = self
            .fields
            .keys()
            .filter(|k| !self.config.fields.contains(*k))
            .map(String::as_str)
            .collect();
        if !unsupported.is_empty() {
            return Err(CrudError::Validation(format!(
                "unsupported fields: {}",
                unsupported.join(", ")
            )));
        }

        let missing: Vec<&str> = self
            .config
            .required
            .iter()
            .filter(|r| self.fields.get(r.as_str()).map_or(true, Value::is_empty))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(CrudError::Validation(format!(
                "required fields not filled: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Whether a row with this record's primary key exists.
    pub fn exists(&self, db: &mut Database) -> Result<bool> {
        let Some(id) = self.primary_key_value() else {
            return Ok(false);
        };
        let query = statement::select_key(&self.config.table, &self.config.primary_key, id.clone())?;
        Ok(db.row(&query.statement, &query.params)?.is_some())
    }

    fn field_name(&self, column: &str) -> String {
        std::iter::once(&self.config.primary_key)
            .chain(&self.config.fields)
            .find(|name| name.eq_ignore_ascii_case(column))
            .cloned()
            .unwrap_or_else(|| column.to_lowercase())
    }

    fn resolve_id(&self, id: Option<Value>) -> Result<Value> {
        id.filter(|v| !v.is_empty())
            .or_else(|| self.primary_key_value().cloned())
            .ok_or_else(|| CrudError::MissingPrimaryKey {
                table: self.config.table.clone(),
            })
    }
}

/// A typed row wrapper with hooks around writes.
///
/// Implementors hold a [`Record`], expose typed accessors over it, and may
/// adjust fields right before a create or save.
pub trait Entity {
    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    fn before_create(&mut self) {}

    fn before_save(&mut self) {}

    fn create(&mut self, db: &mut Database) -> Result<usize> {
        self.before_create();
        self.record_mut().create(db)
    }

    fn save(&mut self, db: &mut Database, id: Option<Value>) -> Result<Option<usize>> {
        self.before_save();
        self.record_mut().save(db, id)
    }

    fn find(&mut self, db: &mut Database, id: Option<Value>) -> Result<bool> {
        self.record_mut().find(db, id)
    }

    fn delete(&mut self, db: &mut Database, id: Option<Value>) -> Result<usize> {
        self.record_mut().delete(db, id)
    }
}

fn affected(db: &mut Database, query: &SqlQuery) -> Result<usize> {
    Ok(db.run(query)?.affected().unwrap_or(0))
}

fn rows(db: &mut Database, query: &SqlQuery) -> Result<Vec<Row>> {
    Ok(db.run(query)?.into_rows().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;

    fn config() -> EntityConfig {
        EntityConfig::new("persons", "id")
            .with_fields(["id", "firstname", "age", "sex"])
            .with_required(["firstname"])
    }

    fn db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        db.query(
            "CREATE TABLE persons (id INTEGER PRIMARY KEY, firstname TEXT, age INTEGER, sex TEXT)",
            &Params::new(),
        )
        .unwrap();
        db
    }

    fn person(db: &mut Database, name: &str, age: i64, sex: &str) -> i64 {
        let mut record = Record::new(config());
        record.set("firstname", name).set("age", age).set("sex", sex);
        record.create(db).unwrap();
        db.last_insert_id().unwrap()
    }

    #[test]
    fn create_then_find_round_trips() {
        let mut db = db();
        let mut record = Record::new(config());
        record.set("id", 5).set("firstname", "Ada").set("age", 36);
        assert_eq!(record.create(&mut db).unwrap(), 1);

        let mut loaded = Record::new(config());
        assert!(loaded.find(&mut db, Some(5.into())).unwrap());
        assert_eq!(loaded.get("firstname"), Some(&Value::from("Ada")));
        assert_eq!(loaded.get("age"), Some(&Value::Integer(36)));
        assert_eq!(loaded.get("sex"), Some(&Value::Null));
    }

    #[test]
    fn find_lowercases_column_names() {
        let mut db = db();
        person(&mut db, "Ada", 36, "F");
        db.query("ALTER TABLE persons ADD COLUMN NickName TEXT", &Params::new())
            .unwrap();
        let mut record = Record::new(config());
        record.find(&mut db, Some(1.into())).unwrap();
        assert!(record.contains("nickname"));
    }

    #[test]
    fn find_keeps_configured_mixed_case_names() {
        let mut db = Database::open_in_memory().unwrap();
        db.query(
            "CREATE TABLE people (personId INTEGER PRIMARY KEY, firstName TEXT)",
            &Params::new(),
        )
        .unwrap();
        let config = EntityConfig::new("people", "personId")
            .with_fields(["personId", "firstName"])
            .with_required(["firstName"]);

        let mut record = Record::new(config.clone());
        record.set("firstName", "Ada");
        record.create(&mut db).unwrap();

        let mut loaded = Record::new(config);
        assert!(loaded.find(&mut db, Some(1.into())).unwrap());
        assert_eq!(loaded.get("firstName"), Some(&Value::from("Ada")));
        assert_eq!(loaded.primary_key_value(), Some(&Value::Integer(1)));
        assert!(loaded.check_fields().is_ok());

        loaded.set("firstName", "Grace");
        assert_eq!(loaded.save(&mut db, None).unwrap(), Some(1));
        assert_eq!(loaded.delete(&mut db, None).unwrap(), 1);
        assert!(!loaded.find(&mut db, Some(1.into())).unwrap());
    }

    #[test]
    fn delete_works_on_tables_without_rowid() {
        let mut db = Database::open_in_memory().unwrap();
        db.query(
            "CREATE TABLE codes (code TEXT PRIMARY KEY, label TEXT) WITHOUT ROWID",
            &Params::new(),
        )
        .unwrap();
        let config = EntityConfig::new("codes", "code").with_fields(["code", "label"]);

        let mut record = Record::new(config);
        record.set("code", "eur").set("label", "Euro");
        record.create(&mut db).unwrap();
        assert!(record.exists(&mut db).unwrap());

        assert_eq!(record.delete(&mut db, None).unwrap(), 1);
        assert!(!record.find(&mut db, Some("eur".into())).unwrap());
    }

    #[test]
    fn save_updates_by_key() {
        let mut db = db();
        let id = person(&mut db, "Ada", 36, "F");
        let mut record = Record::new(config());
        record.set("age", 37);
        assert_eq!(record.save(&mut db, Some(id.into())).unwrap(), Some(1));

        let mut loaded = Record::new(config());
        loaded.find(&mut db, Some(id.into())).unwrap();
        assert_eq!(loaded.get("age"), Some(&Value::Integer(37)));
        assert_eq!(loaded.get("firstname"), Some(&Value::from("Ada")));
    }

    #[test]
    fn save_without_key_is_rejected() {
        let mut db = db();
        person(&mut db, "Ada", 36, "F");
        person(&mut db, "Bob", 40, "M");

        let mut record = Record::new(config());
        record.set("age", 1);
        let err = record.save(&mut db, None).unwrap_err();
        assert!(matches!(err, CrudError::MissingPrimaryKey { .. }));

        let ages = db.column("SELECT age FROM persons ORDER BY id", &Params::new()).unwrap();
        assert_eq!(ages, vec![Value::Integer(36), Value::Integer(40)]);
    }

    #[test]
    fn save_with_only_a_key_writes_nothing() {
        let mut db = db();
        let mut record = Record::new(config());
        record.set("id", 1);
        assert_eq!(record.save(&mut db, None).unwrap(), None);
    }

    #[test]
    fn delete_then_find_is_empty() {
        let mut db = db();
        let id = person(&mut db, "Ada", 36, "F");
        let mut record = Record::new(config());
        record.find(&mut db, Some(id.into())).unwrap();
        assert_eq!(record.delete(&mut db, None).unwrap(), 1);
        assert!(record.fields().is_empty());

        assert!(!record.find(&mut db, Some(id.into())).unwrap());
        assert!(record.fields().is_empty());
    }

    #[test]
    fn delete_and_find_need_a_key() {
        let mut db = db();
        let mut record = Record::new(config());
        record.set("firstname", "nobody");
        assert!(matches!(
            record.delete(&mut db, None),
            Err(CrudError::MissingPrimaryKey { .. })
        ));
        assert!(record.find(&mut db, Some(Value::Null)).is_err());
        assert!(record.fields().is_empty());
    }

    #[test]
    fn search_filters_sorts_and_limits() {
        let mut db = db();
        person(&mut db, "Ada", 36, "F");
        person(&mut db, "Bob", 40, "M");
        person(&mut db, "Cleo", 29, "F");

        let record = Record::new(config());
        let filter: Row = [("sex".to_string(), Value::from("F"))].into_iter().collect();
        let rows = record
            .search(&mut db, &filter, &[("age", SortOrder::Asc)], None)
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["firstname"].to_string()).collect();
        assert_eq!(names, ["Cleo", "Ada"]);

        let rows = record
            .search(&mut db, &filter, &[("age", SortOrder::Desc)], Some(1))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["firstname"], Value::from("Ada"));
    }

    #[test]
    fn search_falls_back_to_own_fields() {
        let mut db = db();
        person(&mut db, "Ada", 36, "F");
        person(&mut db, "Bob", 40, "M");

        let mut record = Record::new(config());
        record.set("sex", "M");
        let rows = record.search(&mut db, &Row::new(), &[], None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["firstname"], Value::from("Bob"));
    }

    #[test]
    fn all_and_keyed_all() {
        let mut db = db();
        person(&mut db, "Ada", 36, "F");
        person(&mut db, "Bob", 40, "M");

        let record = Record::new(config());
        let rows = record.all(&mut db, &[("firstname", SortOrder::Desc)]).unwrap();
        assert_eq!(rows[0]["firstname"], Value::from("Bob"));

        let keyed = record.all_by_primary_key(&mut db, &[]).unwrap();
        assert_eq!(keyed.keys().collect::<Vec<_>>(), ["1", "2"]);
        assert_eq!(keyed["2"]["firstname"], Value::from("Bob"));
    }

    #[test]
    fn aggregates() {
        let mut db = db();
        person(&mut db, "Ada", 36, "F");
        person(&mut db, "Bob", 40, "M");

        let record = Record::new(config());
        assert_eq!(record.min(&mut db, "age").unwrap(), Some(Value::Integer(36)));
        assert_eq!(record.max(&mut db, "age").unwrap(), Some(Value::Integer(40)));
        assert_eq!(record.sum(&mut db, "age").unwrap(), Some(Value::Integer(76)));
        assert_eq!(record.avg(&mut db, "age").unwrap(), Some(Value::Real(38.0)));
        assert_eq!(record.count(&mut db, "id").unwrap(), Some(Value::Integer(2)));
    }

    #[test]
    fn exists_probes_by_key() {
        let mut db = db();
        let id = person(&mut db, "Ada", 36, "F");
        let mut record = Record::new(config());
        assert!(!record.exists(&mut db).unwrap());
        record.set("id", id);
        assert!(record.exists(&mut db).unwrap());
        record.set("id", id + 1);
        assert!(!record.exists(&mut db).unwrap());
    }

    #[test]
    fn check_fields_rules() {
        let mut record = Record::new(config());
        assert!(matches!(record.check_fields(), Err(CrudError::Validation(m)) if m.contains("no fields")));

        record.set("age", 3).set("shoe_size", 44);
        assert!(matches!(record.check_fields(), Err(CrudError::Validation(m)) if m.contains("shoe_size")));

        record.unset("shoe_size");
        assert!(matches!(record.check_fields(), Err(CrudError::Validation(m)) if m.contains("firstname")));

        record.set("firstname", "Ada");
        assert!(record.check_fields().is_ok());

        let mut bare = Record::new(EntityConfig::new("persons", "id"));
        bare.set("age", 1);
        assert!(bare.check_fields().is_err());
    }

    #[test]
    fn unset_keeps_field_order() {
        let mut record = Record::new(config());
        record.set("a", 1).set("b", 2).set("c", 3);
        assert_eq!(record.unset("b"), Some(Value::Integer(2)));
        assert_eq!(record.fields().keys().collect::<Vec<_>>(), ["a", "c"]);
        assert_eq!(record.unset("b"), None);
    }
}
