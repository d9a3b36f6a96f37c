use crate::error::{CrudError, Result};
use std::path::Path;

pub const DEFAULT_PORT: u16 = 3306;

/// Path SQLite treats as a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Connection parameters for [`crate::Database`].
///
/// SQLite only uses `dbname`, the database file path. The network fields are
/// kept so the same init files work across deployments and show up in logs.
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub port: u16,
}

impl DbConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        dbname: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            dbname: dbname.into(),
            port: DEFAULT_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Config for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::new("localhost", "", "", IN_MEMORY)
    }

    pub fn is_in_memory(&self) -> bool {
        self.dbname == IN_MEMORY
    }

    /// Reads an INI init file with the keys `host`, `user`, `password`,
    /// `dbname` and an optional `port`.
    ///
    /// A missing required key is an [`CrudError::InvalidArgument`]; an
    /// unreadable or malformed file is a [`CrudError::Config`].
    pub fn from_ini_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Ini,
            ))
            .build()?;

        let required = |key: &str| -> Result<String> {
            match settings.get_string(key) {
                Ok(value) => Ok(value),
                Err(config::ConfigError::NotFound(_)) => Err(CrudError::InvalidArgument(format!(
                    "missing required field `{key}` in {}",
                    path.display()
                ))),
                Err(e) => Err(e.into()),
            }
        };

        let mut db_config = Self::new(
            required("host")?,
            required("user")?,
            required("password")?,
            required("dbname")?,
        );

        match settings.get_int("port") {
            Ok(port) => {
                db_config.port = u16::try_from(port).map_err(|_| {
                    CrudError::InvalidArgument(format!("port {port} is out of range"))
                })?;
            }
            Err(config::ConfigError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(
            host = %db_config.host,
            dbname = %db_config.dbname,
            port = db_config.port,
            "loaded database config from {}",
            path.display()
        );
        Ok(db_config)
    }
}
