use std::io;

use thiserror::Error;

pub type Result<T, E = DatabaseError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("couldn't create directory for database: {0}")]
    CreateDirectory(#[source] io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("database `{0}` is closed")]
    Closed(String),
    #[error("collection `{0}` is not part of the schema")]
    UnknownCollection(String),
    #[error(
        "database `{name}` has schema version {found}, newer than supported version {supported}"
    )]
    NewerSchema {
        name: String,
        found: u32,
        supported: u32,
    },
}
