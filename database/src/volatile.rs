use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};

use crate::{DatabaseError, Result, Schema};

#[derive(Debug, Default)]
struct Tables {
    version: u32,
    collections: HashMap<String, BTreeMap<String, String>>,
}

/// In-memory databases that survive being closed and reopened by name for as long
/// as the environment lives.
#[derive(Clone, Debug, Default)]
pub struct VolatileEnvironment {
    databases: Arc<Mutex<HashMap<String, Arc<RwLock<Tables>>>>>,
}

impl VolatileEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_database(&self, name: &str, schema: &Schema) -> Result<VolatileDatabase> {
        let tables = Arc::clone(self.databases.lock().entry(name.to_owned()).or_default());
        {
            let mut tables = tables.write();
            if tables.version > schema.version {
                return Err(DatabaseError::NewerSchema {
                    name: name.to_owned(),
                    found: tables.version,
                    supported: schema.version,
                });
            }
            if tables.version < schema.version {
                tables.collections.clear();
                tables.version = schema.version;
            }
            for collection in schema.collections {
                tables
                    .collections
                    .entry(collection.to_string())
                    .or_default();
            }
        }

        Ok(VolatileDatabase {
            name: name.to_owned(),
            tables,
            closed: AtomicBool::new(false),
        })
    }
}

#[derive(Debug)]
pub struct VolatileDatabase {
    name: String,
    tables: Arc<RwLock<Tables>>,
    closed: AtomicBool,
}

impl VolatileDatabase {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DatabaseError::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn with_collection<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> R,
    ) -> Result<R> {
        self.check_open()?;
        let mut tables = self.tables.write();
        let entries = tables
            .collections
            .get_mut(collection)
            .ok_or_else(|| DatabaseError::UnknownCollection(collection.to_owned()))?;
        Ok(f(entries))
    }

    pub fn get_all(&self, collection: &str) -> Result<Vec<(String, String)>> {
        self.with_collection(collection, |entries| {
            entries
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
    }

    pub fn get(&self, collection: &str, key: &str) -> Result<Option<String>> {
        self.with_collection(collection, |entries| entries.get(key).cloned())
    }

    pub fn put(&self, collection: &str, key: &str, value: &str) -> Result<()> {
        self.with_collection(collection, |entries| {
            entries.insert(key.to_owned(), value.to_owned());
        })
    }

    pub fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.with_collection(collection, |entries| {
            entries.remove(key);
        })
    }

    pub fn clear(&self, collection: &str) -> Result<()> {
        self.with_collection(collection, BTreeMap::clear)
    }

    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
