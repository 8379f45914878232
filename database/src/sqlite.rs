use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{named_params, Connection, OptionalExtension};

use crate::{DatabaseError, Result, Schema};

/// One SQLite file per database, one table per collection.
pub struct SqliteDatabase {
    name: String,
    collections: Vec<String>,
    conn: Mutex<Option<Connection>>,
}

impl SqliteDatabase {
    pub fn open<P: AsRef<Path>>(path: P, name: &str, schema: &Schema) -> Result<Self> {
        let conn = Connection::open(path)?;

        let found: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if found > schema.version {
            return Err(DatabaseError::NewerSchema {
                name: name.to_owned(),
                found,
                supported: schema.version,
            });
        }
        if found != 0 && found < schema.version {
            log::info!(name, found, version = schema.version, "Resetting outdated database");
            for collection in schema.collections {
                conn.execute(&format!(r#"DROP TABLE IF EXISTS "{}""#, collection), [])?;
            }
        }

        for collection in schema.collections {
            conn.execute(
                &format!(
                    r#"
                    CREATE TABLE IF NOT EXISTS "{}" (
                        "key" TEXT NOT NULL PRIMARY KEY,
                        "value" TEXT NOT NULL
                    ) STRICT"#,
                    collection
                ),
                [],
            )?;
        }
        conn.pragma_update(None, "user_version", schema.version)?;

        Ok(SqliteDatabase {
            name: name.to_owned(),
            collections: schema.collections.iter().map(|c| c.to_string()).collect(),
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn with_conn<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R> {
        // Table names are interpolated into SQL, so only schema collections get through.
        if !self.collections.iter().any(|c| c == collection) {
            return Err(DatabaseError::UnknownCollection(collection.to_owned()));
        }
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| DatabaseError::Closed(self.name.clone()))?;
        Ok(f(conn)?)
    }

    pub fn get_all(&self, collection: &str) -> Result<Vec<(String, String)>> {
        self.with_conn(collection, |conn| {
            let mut stmt = conn.prepare(&format!(
                r#"SELECT "key", "value" FROM "{}" ORDER BY "key""#,
                collection
            ))?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
    }

    pub fn get(&self, collection: &str, key: &str) -> Result<Option<String>> {
        self.with_conn(collection, |conn| {
            conn.query_row(
                &format!(r#"SELECT "value" FROM "{}" WHERE "key" = :key"#, collection),
                named_params! { ":key": key },
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn put(&self, collection: &str, key: &str, value: &str) -> Result<()> {
        self.with_conn(collection, |conn| {
            conn.execute(
                &format!(
                    r#"
                    INSERT INTO "{}" ("key", "value") VALUES (:key, :value)
                    ON CONFLICT("key") DO UPDATE SET "value" = excluded."value"
                    "#,
                    collection
                ),
                named_params! { ":key": key, ":value": value },
            )
        })?;
        Ok(())
    }

    pub fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.with_conn(collection, |conn| {
            conn.execute(
                &format!(r#"DELETE FROM "{}" WHERE "key" = :key"#, collection),
                named_params! { ":key": key },
            )
        })?;
        Ok(())
    }

    pub fn clear(&self, collection: &str) -> Result<()> {
        self.with_conn(collection, |conn| {
            conn.execute(&format!(r#"DELETE FROM "{}""#, collection), [])
        })?;
        Ok(())
    }

    /// Closes the connection. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, error)| DatabaseError::Sqlite(error))
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}
