/// In-memory backend for tests and offline replay.
///
/// Holds named tables of `Record`s and answers `select_in` the way the
/// database would, with two differences worth knowing: rows come back
/// grouped in key order (storage order within a key), and key comparison
/// ignores trailing spaces like `char(n)` columns do.
///
/// Every issued query is logged, and the number of currently open
/// connections is tracked so callers can check that a connection was
/// released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{BackendError, Connection, Connector, Record, validate_identifier};

/// One `select_in` call as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedQuery {
    pub table: String,
    pub key_column: String,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<HashMap<String, Vec<Record>>>,
    unreachable: bool,
    log: Arc<Mutex<Vec<IssuedQuery>>>,
    open: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose `connect` always fails.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Adds (or extends) a table. Table names are case-insensitive.
    pub fn with_table(mut self, name: &str, rows: Vec<Record>) -> Self {
        Arc::make_mut(&mut self.tables)
            .entry(name.to_ascii_lowercase())
            .or_default()
            .extend(rows);
        self
    }

    pub fn query_log(&self) -> Vec<IssuedQuery> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn queries_on(&self, table: &str) -> Vec<IssuedQuery> {
        let table = table.to_ascii_lowercase();
        self.query_log()
            .into_iter()
            .filter(|q| q.table == table)
            .collect()
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryBackend {
    type Connection = MemoryConnection;

    fn connect(&self, data_source: &str) -> Result<MemoryConnection, BackendError> {
        if self.unreachable {
            return Err(BackendError::Connect(format!(
                "data source '{}' is unreachable",
                data_source
            )));
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            tables: Arc::clone(&self.tables),
            log: Arc::clone(&self.log),
            open: Arc::clone(&self.open),
        })
    }
}

pub struct MemoryConnection {
    tables: Arc<HashMap<String, Vec<Record>>>,
    log: Arc<Mutex<Vec<IssuedQuery>>>,
    open: Arc<AtomicUsize>,
}

impl Connection for MemoryConnection {
    fn select_in(
        &mut self,
        table: &str,
        key_column: &str,
        keys: &[String],
    ) -> Result<Vec<Record>, BackendError> {
        validate_identifier(table)?;
        validate_identifier(key_column)?;
        let table = table.to_ascii_lowercase();

        if let Ok(mut log) = self.log.lock() {
            log.push(IssuedQuery {
                table: table.clone(),
                key_column: key_column.to_ascii_lowercase(),
                keys: keys.to_vec(),
            });
        }

        let rows = self
            .tables
            .get(&table)
            .ok_or_else(|| BackendError::MissingTable(table.clone()))?;

        let mut matched = Vec::new();
        for key in keys {
            let key = key.trim();
            matched.extend(
                rows.iter()
                    .filter(|row| row.text(key_column).as_deref() == Some(key))
                    .cloned(),
            );
        }
        Ok(matched)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}
