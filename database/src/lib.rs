use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use ballot_utils::Resource;
use futures::{future::BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};

pub use crate::error::{DatabaseError, Result};
use crate::{
    sqlite::SqliteDatabase,
    volatile::{VolatileDatabase, VolatileEnvironment},
};

mod error;
pub mod sqlite;
pub mod volatile;

/// Layout of a database: its version and the collections it holds.
///
/// Opening a database written with an older version drops all collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schema {
    pub version: u32,
    pub collections: &'static [&'static str],
}

#[derive(Clone, Debug)]
pub enum Environment {
    Volatile(VolatileEnvironment),
    Persistent(PathBuf),
}

impl Environment {
    pub fn volatile() -> Self {
        Environment::Volatile(VolatileEnvironment::new())
    }

    pub fn persistent<P: Into<PathBuf>>(dir: P) -> Self {
        Environment::Persistent(dir.into())
    }

    /// Opens (creating if needed) the database `name` with the given schema.
    ///
    /// The persistent backend does blocking file I/O.
    pub fn open_database(&self, name: &str, schema: &Schema) -> Result<Database> {
        log::debug!(name, version = schema.version, "Opening database");
        match self {
            Environment::Volatile(env) => Ok(Database::Volatile(env.open_database(name, schema)?)),
            Environment::Persistent(dir) => {
                fs::create_dir_all(dir).map_err(DatabaseError::CreateDirectory)?;
                let path = Self::database_path(dir, name);
                Ok(Database::Sqlite(SqliteDatabase::open(path, name, schema)?))
            }
        }
    }

    fn database_path(dir: &Path, name: &str) -> PathBuf {
        let file: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        dir.join(format!("{file}.sqlite3"))
    }
}

/// A handle on one named database.
///
/// Values are stored as JSON, keys as strings.
pub enum Database {
    Volatile(VolatileDatabase),
    Sqlite(SqliteDatabase),
}

impl Database {
    pub fn name(&self) -> &str {
        match self {
            Database::Volatile(db) => db.name(),
            Database::Sqlite(db) => db.name(),
        }
    }

    pub fn get_all<V: DeserializeOwned>(&self, collection: &str) -> Result<BTreeMap<String, V>> {
        let raw = match self {
            Database::Volatile(db) => db.get_all(collection)?,
            Database::Sqlite(db) => db.get_all(collection)?,
        };
        raw.into_iter()
            .map(|(key, value)| Ok((key, serde_json::from_str(&value)?)))
            .collect()
    }

    pub fn get<V: DeserializeOwned>(&self, collection: &str, key: &str) -> Result<Option<V>> {
        let raw = match self {
            Database::Volatile(db) => db.get(collection, key)?,
            Database::Sqlite(db) => db.get(collection, key)?,
        };
        raw.map(|value| serde_json::from_str(&value))
            .transpose()
            .map_err(DatabaseError::from)
    }

    pub fn put<V: Serialize + ?Sized>(&self, collection: &str, key: &str, value: &V) -> Result<()> {
        let value = serde_json::to_string(value)?;
        match self {
            Database::Volatile(db) => db.put(collection, key, &value),
            Database::Sqlite(db) => db.put(collection, key, &value),
        }
    }

    pub fn delete(&self, collection: &str, key: &str) -> Result<()> {
        match self {
            Database::Volatile(db) => db.delete(collection, key),
            Database::Sqlite(db) => db.delete(collection, key),
        }
    }

    pub fn clear(&self, collection: &str) -> Result<()> {
        match self {
            Database::Volatile(db) => db.clear(collection),
            Database::Sqlite(db) => db.clear(collection),
        }
    }

    pub fn close(&self) -> Result<()> {
        log::debug!(name = self.name(), "Closing database");
        match self {
            Database::Volatile(db) => db.close(),
            Database::Sqlite(db) => db.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Database::Volatile(db) => db.is_closed(),
            Database::Sqlite(db) => db.is_closed(),
        }
    }
}

impl Resource for Database {
    fn teardown(&self) -> Option<BoxFuture<'_, ()>> {
        Some(
            async move {
                if let Err(error) = self.close() {
                    log::warn!(name = self.name(), %error, "Failed to close database");
                }
            }
            .boxed(),
        )
    }
}
