use crate::value::Value;
use indexmap::IndexMap;
use rusqlite::Statement;

/// One result row, or one record's fields: column name to value, in column order.
pub type Row = IndexMap<String, Value>;

/// Parameter bindings for SQL queries, kept in insertion order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    pub values: IndexMap<String, Value>,
}

impl Params {
    /// Create a new Params object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add or replace a named value; a replaced name keeps its position.
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

impl From<Row> for Params {
    fn from(values: Row) -> Self {
        Self { values }
    }
}

impl From<&Row> for Params {
    fn from(values: &Row) -> Self {
        Self {
            values: values.clone(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Adds the `:` prefix SQLite expects unless the name already carries one.
pub(crate) fn placeholder(name: &str) -> String {
    if name.starts_with(&[':', '@', '$'][..]) {
        name.to_string()
    } else {
        format!(":{name}")
    }
}

/// The bound-parameter list for the next statement.
///
/// Parameters accumulate in encounter order until a statement runs; the
/// executor takes the whole list before preparing, so it is empty afterwards
/// whether the statement succeeded or not.
#[derive(Debug, Default)]
pub struct ParamBinder {
    bound: Vec<(String, Value)>,
}

impl ParamBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: &str, value: impl Into<Value>) {
        self.bound.push((placeholder(name), value.into()));
    }

    /// Binds a whole mapping, but only when nothing is bound yet.
    pub fn bind_more(&mut self, params: &Params) {
        if !self.bound.is_empty() {
            return;
        }
        for (name, value) in params.iter() {
            self.bind(name, value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    pub fn clear(&mut self) {
        self.bound.clear();
    }

    /// Takes every bound parameter, leaving the binder empty.
    pub fn take(&mut self) -> BoundParams {
        BoundParams(std::mem::take(&mut self.bound))
    }
}

/// Parameters detached from a [`ParamBinder`], ready to apply to one statement.
#[derive(Debug)]
pub struct BoundParams(Vec<(String, Value)>);

impl BoundParams {
    /// Binds every parameter by name. A name the statement does not declare
    /// is an error, like any other bind failure.
    pub fn apply(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<()> {
        for (name, value) in &self.0 {
            let index = stmt
                .parameter_index(name)?
                .ok_or_else(|| rusqlite::Error::InvalidParameterName(name.clone()))?;
            stmt.raw_bind_parameter(index, value)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
