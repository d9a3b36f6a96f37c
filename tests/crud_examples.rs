use anyhow::Result;
use sqlite_crud::{Database, DbConfig, EntityConfig, Params, QueryResult, Record, SortOrder, Value};
use serde_json::json;
use std::io::Write;
use tempfile::NamedTempFile;

#[derive(Debug)]
struct User {
    name: String,
    email: String,
    age: Option<i64>,
}

impl User {
    fn from_record(record: &Record) -> Self {
        Self {
            name: record.get("name").map(Value::to_string).unwrap_or_default(),
            email: record.get("email").map(Value::to_string).unwrap_or_default(),
            age: record.get("age").and_then(Value::as_i64),
        }
    }
}

fn users() -> EntityConfig {
    EntityConfig::new("users", "id").with_fields(["id", "name", "email", "age"])
}

// Helper function to create an in-memory database for testing
fn create_test_db() -> Result<Database> {
    let mut db = Database::open_in_memory()?;
    initialize_schema(&mut db)?;
    Ok(db)
}

// Helper function to create a temporary file-based database
fn create_temp_db() -> Result<(Database, NamedTempFile)> {
    let temp_file = NamedTempFile::new()?;
    let path = temp_file.path().to_string_lossy().into_owned();
    let mut db = Database::connect(DbConfig::new("localhost", "test", "", path))?;
    initialize_schema(&mut db)?;
    Ok((db, temp_file))
}

// Initialize the database schema
fn initialize_schema(db: &mut Database) -> Result<()> {
    db.query(
        r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            age INTEGER
        )
        "#,
        &Params::new(),
    )?;
    db.query("CREATE INDEX idx_users_email ON users(email)", &Params::new())?;
    db.settings().ensure_table()?;
    Ok(())
}

#[test]
fn test_basic_operations() {
    test_basic_operations_impl().unwrap();
}

fn test_basic_operations_impl() -> Result<()> {
    let mut db = create_test_db()?;

    // Insert a new user
    let mut record = Record::new(users());
    record
        .set("name", "John Doe")
        .set("email", "john@example.com")
        .set("age", 30);
    assert_eq!(record.create(&mut db)?, 1);
    let id = db.last_insert_id()?;

    // Query a user
    let mut found = Record::new(users());
    assert!(found.find(&mut db, Some(id.into()))?);
    let user = User::from_record(&found);
    assert_eq!(user.name, "John Doe");
    assert_eq!(user.email, "john@example.com");
    assert_eq!(user.age, Some(30));

    // Update the user
    found.set("age", 31);
    assert_eq!(found.save(&mut db, None)?, Some(1));
    let updated_age = db.single(
        "SELECT age FROM users WHERE id = :id",
        &Params::new().with_value("id", id),
    )?;
    assert_eq!(updated_age, Some(Value::Integer(31)));

    // Delete the user
    assert_eq!(found.delete(&mut db, None)?, 1);
    let mut deleted = Record::new(users());
    assert!(!deleted.find(&mut db, Some(id.into()))?);
    assert!(deleted.fields().is_empty());

    Ok(())
}

#[test]
fn test_query_return_shapes() {
    test_query_return_shapes_impl().unwrap();
}

fn test_query_return_shapes_impl() -> Result<()> {
    let mut db = create_test_db()?;

    let inserted = db.query(
        "INSERT INTO users (name, email) VALUES (:name, :email)",
        &Params::new()
            .with_value("name", "Ann")
            .with_value("email", "ann@example.com"),
    )?;
    assert_eq!(inserted, QueryResult::Affected(1));

    let selected = db.query("SELECT name FROM users", &Params::new())?;
    assert_eq!(selected.rows().map(<[_]>::len), Some(1));

    let nothing = db.query(
        "SELECT * FROM users WHERE email = :email",
        &Params::new().with_value("email", "nobody@example.com"),
    )?;
    assert_eq!(nothing, QueryResult::Rows(Vec::new()));

    let deleted = db.query("DELETE FROM users WHERE name = 'nobody'", &Params::new())?;
    assert_eq!(deleted, QueryResult::Affected(0));

    // Unique constraint violation is reported but the connection survives.
    let duplicate = db.query(
        "INSERT INTO users (name, email) VALUES (:name, :email)",
        &Params::new()
            .with_value("name", "Ann again")
            .with_value("email", "ann@example.com"),
    );
    assert!(duplicate.is_err());
    assert_eq!(
        db.single("SELECT COUNT(*) FROM users", &Params::new())?,
        Some(Value::Integer(1))
    );

    Ok(())
}

#[test]
fn test_search_users() {
    test_search_users_impl().unwrap();
}

fn test_search_users_impl() -> Result<()> {
    let mut db = create_test_db()?;
    for (name, email, age) in [
        ("Ann", "ann@example.com", 30),
        ("Ben", "ben@example.com", 30),
        ("Cat", "cat@example.com", 41),
    ] {
        Record::new(users())
            .set("name", name)
            .set("email", email)
            .set("age", age)
            .create(&mut db)?;
    }

    let filter = Params::new().with_value("age", 30).values;
    let thirty = Record::new(users()).search(&mut db, &filter, &[("name", SortOrder::Desc)], None)?;
    let names: Vec<String> = thirty.iter().map(|r| r["name"].to_string()).collect();
    assert_eq!(names, ["Ben", "Ann"]);

    let oldest = Record::new(users()).max(&mut db, "age")?;
    assert_eq!(oldest, Some(Value::Integer(41)));

    Ok(())
}

#[test]
fn test_file_database_persists() {
    test_file_database_persists_impl().unwrap();
}

fn test_file_database_persists_impl() -> Result<()> {
    let (mut db, temp_file) = create_temp_db()?;
    Record::new(users())
        .set("id", 7)
        .set("name", "Dee")
        .set("email", "dee@example.com")
        .create(&mut db)?;
    db.settings().set("theme", json!({"dark": true, "accent": "teal"}))?;
    db.close()?;

    let mut ini = tempfile::Builder::new().suffix(".ini").tempfile()?;
    writeln!(
        ini,
        "host = localhost\nuser = test\npassword = secret\ndbname = {}",
        temp_file.path().display()
    )?;
    let mut reopened = Database::from_ini_file(ini.path())?;
    assert_eq!(reopened.config().port, 3306);

    let mut record = Record::new(users());
    assert!(record.find(&mut reopened, Some(7.into()))?);
    assert_eq!(record.get("name"), Some(&Value::from("Dee")));
    assert_eq!(
        reopened.settings().get("theme", json!(null))?,
        json!({"dark": true, "accent": "teal"})
    );

    Ok(())
}
